//! # Tideway Runtime
//!
//! Runtime implementation for the Tideway state container.
//!
//! This crate provides the [`Store`]: the single mutable cell that owns the
//! current state, the assembled middleware chain, the root reducer, and the
//! listener registry.
//!
//! ## Core Components
//!
//! - **Store**: Owns state, dispatches actions, notifies listeners
//! - **Middleware chain**: Interceptors between `dispatch` and the reducer
//! - **Listener registry**: Callbacks notified after every commit, in subscription order
//! - **Thunks**: Deferred computations bridged into plain actions
//!
//! ## Dispatch pipeline
//!
//! ```text
//! dispatch(action)
//!   → middleware[0] → middleware[1] → … → reducer (guarded, atomic commit)
//!   → listeners notified in subscription order
//!   → action returned to the caller
//! ```
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use tideway_core::{Action, Lifecycle, ReducerError, reducer_fn};
//! use tideway_runtime::Store;
//!
//! #[derive(Clone, Debug)]
//! enum CounterAction {
//!     Increment(i64),
//!     Lifecycle(Lifecycle),
//! }
//!
//! impl Action for CounterAction {
//!     fn action_type(&self) -> &str {
//!         match self {
//!             Self::Increment(_) => "counter/increment",
//!             Self::Lifecycle(l) => l.action_type(),
//!         }
//!     }
//! }
//!
//! impl From<Lifecycle> for CounterAction {
//!     fn from(l: Lifecycle) -> Self {
//!         Self::Lifecycle(l)
//!     }
//! }
//!
//! let reducer = reducer_fn(0_i64, |state: &Arc<i64>, action: &CounterAction| {
//!     Ok::<_, ReducerError>(match action {
//!         CounterAction::Increment(n) => Arc::new(**state + n),
//!         CounterAction::Lifecycle(_) => Arc::clone(state),
//!     })
//! });
//!
//! let store = Store::new(reducer)?;
//! store.dispatch(CounterAction::Increment(3))?;
//! assert_eq!(*store.get_state(), 3);
//! # Ok::<(), tideway_runtime::StoreError>(())
//! ```

/// Listener registry and the listener error side channel
pub mod listener;

/// Metric descriptions for the dispatch pipeline
pub mod metrics;

/// Middleware chain: interceptors between dispatch and the reducer
pub mod middleware;

/// The Store and its builder
pub mod store;

/// Deferred computations and the pending/fulfilled/rejected protocol
pub mod thunk;

/// Error types for the Store runtime
pub mod error {
    use tideway_core::ReducerError;
    use thiserror::Error;

    /// Errors that can occur during Store operations
    #[derive(Error, Debug, Clone, PartialEq, Eq)]
    pub enum StoreError {
        /// A dispatch (or listener registry change) was attempted while the
        /// reducer is running on the same thread
        ///
        /// The Store keeps its last committed state.
        #[error("Invalid dispatch state: {0}")]
        InvalidDispatchState(&'static str),

        /// The root reducer failed; nothing was committed
        #[error("Transition function failed: {0}")]
        TransitionFunction(#[from] ReducerError),

        /// A middleware refused the action
        #[error("Action rejected by middleware: {0}")]
        Rejected(String),

        /// [`Store::teardown`](crate::Store::teardown) has been called
        #[error("Store has been torn down")]
        ShutDown,

        /// Every handle to the Store has been dropped
        ///
        /// Returned by middleware API handles and thunks that outlive their
        /// Store.
        #[error("Store has been dropped")]
        Dropped,
    }
}

pub use error::StoreError;
pub use listener::{ListenerError, ListenerId, Subscription};
pub use middleware::{LoggingMiddleware, Middleware, MiddlewareApi, Next, middleware_fn};
pub use store::{Store, StoreBuilder};
pub use thunk::{AsyncPhase, AsyncRequest, AsyncThunk, Deferrable, RequestId, Thunk, ThunkMiddleware};

/// Store configuration
///
/// # Example
///
/// ```
/// use tideway_runtime::StoreConfig;
///
/// let config = StoreConfig::default()
///     .with_name("settings")
///     .with_listener_error_capacity(16)
///     .with_catch_listener_panics(false);
/// assert_eq!(config.name, "settings");
/// ```
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Name attached to log records and metric labels
    pub name: String,
    /// Buffer size of the listener error broadcast channel
    pub listener_error_capacity: usize,
    /// Convert reducer panics into [`ReducerError::Panicked`](tideway_core::ReducerError::Panicked)
    pub catch_reducer_panics: bool,
    /// Isolate listener panics the same way as listener errors
    pub catch_listener_panics: bool,
}

impl StoreConfig {
    /// Set the store name
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the listener error channel capacity
    #[must_use]
    pub const fn with_listener_error_capacity(mut self, capacity: usize) -> Self {
        self.listener_error_capacity = capacity;
        self
    }

    /// Enable or disable catching reducer panics
    #[must_use]
    pub const fn with_catch_reducer_panics(mut self, enabled: bool) -> Self {
        self.catch_reducer_panics = enabled;
        self
    }

    /// Enable or disable catching listener panics
    #[must_use]
    pub const fn with_catch_listener_panics(mut self, enabled: bool) -> Self {
        self.catch_listener_panics = enabled;
        self
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            name: "store".to_string(),
            listener_error_capacity: 64,
            catch_reducer_panics: true,
            catch_listener_panics: true,
        }
    }
}

/// Render a caught panic payload as text
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
