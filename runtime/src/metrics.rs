//! Metric descriptions for the dispatch pipeline
//!
//! The Store records through the [`metrics`] facade; which exporter (if
//! any) collects them is the application's choice. Call
//! [`register_metrics`] once after installing a recorder so the metrics
//! carry descriptions.
//!
//! | Name | Kind | Labels |
//! |---|---|---|
//! | `store.dispatch.total` | counter | `store` |
//! | `store.dispatch.failed` | counter | `store`, `reason` |
//! | `store.reduce.duration_seconds` | histogram | `store` |
//! | `store.listener.failures` | counter | `store` |
//! | `thunk.settled` | counter | `operation`, `outcome` |

use metrics::{Unit, describe_counter, describe_histogram};

// Re-export metrics macros for use in applications
pub use metrics::{counter, gauge, histogram};

/// Describe every metric the runtime emits
pub fn register_metrics() {
    // Dispatch
    describe_counter!(
        "store.dispatch.total",
        Unit::Count,
        "Total number of actions dispatched into a store"
    );
    describe_counter!(
        "store.dispatch.failed",
        Unit::Count,
        "Dispatches that returned an error (reentrant calls, rejected transitions, middleware refusals)"
    );
    describe_histogram!(
        "store.reduce.duration_seconds",
        Unit::Seconds,
        "Time spent inside the root reducer per transition"
    );

    // Listeners
    describe_counter!(
        "store.listener.failures",
        Unit::Count,
        "Listeners that returned an error or panicked during notification"
    );

    // Thunks
    describe_counter!(
        "thunk.settled",
        Unit::Count,
        "Async requests settled, labelled by outcome (fulfilled or rejected)"
    );
}
