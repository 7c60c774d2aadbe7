//! # Tideway Testing
//!
//! Testing utilities and helpers for the Tideway state container.
//!
//! This crate provides:
//! - [`ReducerTest`]: Given-When-Then harness for reducers
//! - [`RecordingMiddleware`] and [`History`]: record every commit and replay it
//! - [`NotificationProbe`]: observe listener notifications, sync or async
//! - Shared fixtures and property-based testing utilities
//!
//! ## Example
//!
//! ```
//! use tideway_testing::fixtures::{SampleAction, counter_reducer};
//! use tideway_testing::properties::assert_dispatch_matches_fold;
//!
//! assert_dispatch_matches_fold(counter_reducer, &[
//!     SampleAction::Increment(1),
//!     SampleAction::Flip,
//!     SampleAction::Decrement(1),
//! ]);
//! ```

/// Given-When-Then reducer harness
pub mod reducer_test;

/// Commit recording and replay
pub mod recorder;

/// Listener notification probe
pub mod probe;

/// Shared fixtures: the counter and flag slices
///
/// The canonical scenario: a `counter` slice that adds and subtracts, and a
/// `flag` slice that toggles a boolean.
pub mod fixtures {
    use serde::{Deserialize, Serialize};
    use tideway_core::{
        Action, CombinedReducer, Draft, Lifecycle, ReducerError, Slice, SliceReducer,
        combine_reducers,
    };

    /// Actions understood by the fixture slices
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub enum SampleAction {
        /// Add to the counter
        Increment(i64),
        /// Subtract from the counter
        Decrement(i64),
        /// Toggle the flag
        Flip,
        /// Recognized by nobody
        Unknown,
        /// Store sentinel
        Lifecycle(Lifecycle),
    }

    impl Action for SampleAction {
        fn action_type(&self) -> &str {
            match self {
                Self::Increment(_) => "counter/increment",
                Self::Decrement(_) => "counter/decrement",
                Self::Flip => "flag/flip",
                Self::Unknown => "unknown",
                Self::Lifecycle(l) => l.action_type(),
            }
        }

        fn lifecycle(&self) -> Option<Lifecycle> {
            match self {
                Self::Lifecycle(l) => Some(*l),
                _ => None,
            }
        }
    }

    impl From<Lifecycle> for SampleAction {
        fn from(l: Lifecycle) -> Self {
            Self::Lifecycle(l)
        }
    }

    /// State of the counter slice
    #[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
    pub struct CounterState {
        /// Current count
        pub value: i64,
    }

    /// The `counter` slice
    #[derive(Debug, Clone, Copy, Default)]
    pub struct CounterSlice;

    impl Slice for CounterSlice {
        type State = CounterState;
        type Action = SampleAction;

        fn name(&self) -> &str {
            "counter"
        }

        fn initial_state(&self) -> CounterState {
            CounterState::default()
        }

        fn reduce(
            &self,
            draft: &mut Draft<CounterState>,
            action: &SampleAction,
        ) -> Result<(), ReducerError> {
            match action {
                SampleAction::Increment(n) => draft.get_mut().value += n,
                SampleAction::Decrement(n) => draft.get_mut().value -= n,
                SampleAction::Flip | SampleAction::Unknown | SampleAction::Lifecycle(_) => {},
            }
            Ok(())
        }
    }

    /// The `flag` slice
    #[derive(Debug, Clone, Copy, Default)]
    pub struct FlagSlice;

    impl Slice for FlagSlice {
        type State = bool;
        type Action = SampleAction;

        fn name(&self) -> &str {
            "flag"
        }

        fn initial_state(&self) -> bool {
            false
        }

        fn reduce(&self, draft: &mut Draft<bool>, action: &SampleAction) -> Result<(), ReducerError> {
            if matches!(action, SampleAction::Flip) {
                let flipped = !**draft;
                draft.set(flipped);
            }
            Ok(())
        }
    }

    /// The counter slice alone, as a reducer over `CounterState`
    #[must_use]
    pub fn counter_reducer() -> SliceReducer<CounterSlice> {
        SliceReducer::new(CounterSlice)
    }

    /// Both slices combined under `counter` and `flag`
    #[must_use]
    pub fn sample_root() -> CombinedReducer<SampleAction> {
        combine_reducers().slice(CounterSlice).slice(FlagSlice)
    }
}

/// Property-based testing utilities using proptest
pub mod properties {
    use crate::fixtures::SampleAction;
    use proptest::prelude::*;
    use std::fmt::Debug;
    use std::sync::Arc;
    use tideway_core::{Action, Lifecycle, Reducer, ReducerError, reduce_all};
    use tideway_runtime::{Store, StoreError};

    /// Strategy over the fixture actions (sentinels excluded)
    pub fn sample_action() -> impl Strategy<Value = SampleAction> {
        prop_oneof![
            (-100_i64..100).prop_map(SampleAction::Increment),
            (-100_i64..100).prop_map(SampleAction::Decrement),
            Just(SampleAction::Flip),
            Just(SampleAction::Unknown),
        ]
    }

    /// Sequences of up to `max_len` elements drawn from `element`
    pub fn action_sequences<T: Strategy>(
        element: T,
        max_len: usize,
    ) -> impl Strategy<Value = Vec<T::Value>> {
        proptest::collection::vec(element, 0..=max_len)
    }

    /// Dispatch `actions` in order, stopping at the first error
    ///
    /// # Errors
    ///
    /// Returns the first [`StoreError`] a dispatch produced.
    pub fn dispatch_all<S, A, I>(store: &Store<S, A>, actions: I) -> Result<Arc<S>, StoreError>
    where
        S: Send + Sync + 'static,
        A: Action + From<Lifecycle>,
        I: IntoIterator<Item = A>,
    {
        for action in actions {
            store.dispatch(action)?;
        }
        Ok(store.get_state())
    }

    /// Assert that dispatching through a Store equals a direct left-fold
    ///
    /// `make_reducer` is called twice: once for the Store and once for the
    /// fold, which starts from the Store's post-`Init` state.
    ///
    /// # Panics
    ///
    /// Panics if the Store cannot be built or the two results differ.
    #[allow(clippy::panic, clippy::expect_used)] // Test assertion
    pub fn assert_dispatch_matches_fold<R, F>(make_reducer: F, actions: &[R::Action])
    where
        F: Fn() -> R,
        R: Reducer + 'static,
        R::State: PartialEq + Debug,
        R::Action: Action + From<Lifecycle>,
    {
        let store = Store::new(make_reducer()).expect("store should build");
        let start = store.get_state();

        let folded: Result<Arc<R::State>, ReducerError> =
            reduce_all(&make_reducer(), start, actions);
        let dispatched = dispatch_all(&store, actions.iter().cloned());

        match (folded, dispatched) {
            (Ok(folded), Ok(dispatched)) => assert_eq!(
                *folded, *dispatched,
                "dispatching {actions:?} diverged from the left-fold"
            ),
            (Err(fold_error), Err(StoreError::TransitionFunction(store_error))) => {
                assert_eq!(fold_error, store_error);
            },
            (folded, dispatched) => panic!(
                "fold and dispatch disagree on {actions:?}: fold={folded:?} dispatch={dispatched:?}"
            ),
        }
    }
}

/// Install a tracing subscriber that writes through the test harness
///
/// Honors `RUST_LOG`; defaults to `warn`. Safe to call from every test.
pub fn init_test_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    // Another test may have installed one already
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

// Re-export commonly used items
pub use probe::NotificationProbe;
pub use recorder::{Commit, History, RecordingMiddleware};
pub use reducer_test::ReducerTest;

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::fixtures::*;
    use super::*;
    use proptest::prelude::*;
    use std::sync::Arc;
    use tideway_core::{CombinedState, Reducer};

    #[test]
    fn test_flag_slice_toggles() {
        ReducerTest::new(sample_root())
            .given_state(CombinedState::new())
            .when_action(SampleAction::Flip)
            .then_state(|state: &CombinedState| {
                assert_eq!(state.get::<bool>("flag").as_deref(), Some(&true));
            })
            .run();
    }

    #[test]
    fn test_counter_ignores_unknown() {
        ReducerTest::new(counter_reducer())
            .given_state(CounterState { value: 4 })
            .when_action(SampleAction::Unknown)
            .then_unchanged()
            .run();
    }

    #[test]
    fn test_fixture_initial_state() {
        let root = sample_root();
        let state = root.initial_state();
        assert_eq!(
            state.get::<CounterState>("counter").as_deref(),
            Some(&CounterState::default())
        );
        assert_eq!(state.get::<bool>("flag").as_deref(), Some(&false));
        assert!(Arc::ptr_eq(&state, &state));
    }

    proptest! {
        #[test]
        fn prop_counter_dispatch_matches_fold(actions in properties::action_sequences(properties::sample_action(), 24)) {
            properties::assert_dispatch_matches_fold(counter_reducer, &actions);
        }
    }
}
