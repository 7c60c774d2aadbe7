//! Ergonomic testing utilities for reducers
//!
//! This module provides a fluent API for testing reducers with readable Given-When-Then syntax.

#![allow(clippy::module_name_repetitions)] // ReducerTest is the natural name

use std::sync::Arc;
use tideway_core::{Reducer, ReducerError, reduce_all};

/// Type alias for state assertion functions
type StateAssertion<S> = Box<dyn FnOnce(&S)>;

/// Type alias for error assertion functions
type ErrorAssertion = Box<dyn FnOnce(&ReducerError)>;

/// Fluent API for testing reducers with Given-When-Then syntax
///
/// Actions are folded in order through the reducer, with no Store involved.
///
/// # Example
///
/// ```
/// use tideway_testing::ReducerTest;
/// use tideway_testing::fixtures::{CounterState, SampleAction, counter_reducer};
///
/// ReducerTest::new(counter_reducer())
///     .given_state(CounterState { value: 1 })
///     .when_action(SampleAction::Increment(2))
///     .when_action(SampleAction::Decrement(1))
///     .then_state(|state: &CounterState| assert_eq!(state.value, 2))
///     .run();
/// ```
pub struct ReducerTest<R: Reducer> {
    reducer: R,
    initial_state: Option<Arc<R::State>>,
    actions: Vec<R::Action>,
    state_assertions: Vec<StateAssertion<R::State>>,
    expect_unchanged: bool,
    error_assertion: Option<ErrorAssertion>,
}

impl<R: Reducer> ReducerTest<R> {
    /// Create a new reducer test with the given reducer
    #[must_use]
    pub const fn new(reducer: R) -> Self {
        Self {
            reducer,
            initial_state: None,
            actions: Vec::new(),
            state_assertions: Vec::new(),
            expect_unchanged: false,
            error_assertion: None,
        }
    }

    /// Set the initial state (Given)
    ///
    /// Defaults to the reducer's own initial state.
    #[must_use]
    pub fn given_state(mut self, state: impl Into<Arc<R::State>>) -> Self {
        self.initial_state = Some(state.into());
        self
    }

    /// Append an action to apply (When)
    #[must_use]
    pub fn when_action(mut self, action: R::Action) -> Self {
        self.actions.push(action);
        self
    }

    /// Append several actions to apply in order (When)
    #[must_use]
    pub fn when_actions(mut self, actions: impl IntoIterator<Item = R::Action>) -> Self {
        self.actions.extend(actions);
        self
    }

    /// Add an assertion about the resulting state (Then)
    #[must_use]
    pub fn then_state<F>(mut self, assertion: F) -> Self
    where
        F: FnOnce(&R::State) + 'static,
    {
        self.state_assertions.push(Box::new(assertion));
        self
    }

    /// Expect the resulting state to be the very same `Arc` as the given one (Then)
    #[must_use]
    pub const fn then_unchanged(mut self) -> Self {
        self.expect_unchanged = true;
        self
    }

    /// Expect the fold to fail, and inspect the error (Then)
    #[must_use]
    pub fn then_error<F>(mut self, assertion: F) -> Self
    where
        F: FnOnce(&ReducerError) + 'static,
    {
        self.error_assertion = Some(Box::new(assertion));
        self
    }

    /// Run the test and execute all assertions
    ///
    /// # Panics
    ///
    /// Panics if the outcome (success or failure) is not the expected one,
    /// or if any assertion fails.
    #[allow(clippy::panic)] // Test code can panic
    pub fn run(self) {
        let initial = self
            .initial_state
            .unwrap_or_else(|| self.reducer.initial_state());

        let outcome = reduce_all(&self.reducer, Arc::clone(&initial), &self.actions);

        match (outcome, self.error_assertion) {
            (Err(error), Some(assertion)) => assertion(&error),
            (Ok(_), Some(_)) => panic!("Expected the reducer to fail, but it succeeded"),
            (Err(error), None) => panic!("Reducer failed unexpectedly: {error}"),
            (Ok(state), None) => {
                if self.expect_unchanged {
                    assert!(
                        Arc::ptr_eq(&initial, &state),
                        "Expected the state to be returned unchanged (same Arc)"
                    );
                }
                for assertion in self.state_assertions {
                    assertion(&state);
                }
            },
        }
    }
}

/// Helper assertions for state identity
pub mod assertions {
    use std::sync::Arc;

    /// Assert that two snapshots are the same allocation
    ///
    /// # Panics
    ///
    /// Panics if the pointers differ.
    #[allow(clippy::panic)] // Test assertion
    pub fn assert_same_state<S>(before: &Arc<S>, after: &Arc<S>) {
        assert!(
            Arc::ptr_eq(before, after),
            "Expected the same state reference, but a new one was produced"
        );
    }

    /// Assert that a new snapshot was produced
    ///
    /// # Panics
    ///
    /// Panics if the pointers are equal.
    #[allow(clippy::panic)] // Test assertion
    pub fn assert_new_state<S>(before: &Arc<S>, after: &Arc<S>) {
        assert!(
            !Arc::ptr_eq(before, after),
            "Expected a new state reference, but the previous one was returned"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{CounterState, SampleAction, counter_reducer};
    use tideway_core::reducer_fn;

    #[test]
    fn test_defaults_to_initial_state() {
        ReducerTest::new(counter_reducer())
            .when_action(SampleAction::Increment(5))
            .then_state(|state: &CounterState| assert_eq!(state.value, 5))
            .run();
    }

    #[test]
    fn test_multiple_actions_fold_in_order() {
        ReducerTest::new(counter_reducer())
            .given_state(CounterState { value: 10 })
            .when_actions([SampleAction::Decrement(3), SampleAction::Increment(1)])
            .then_state(|state: &CounterState| assert_eq!(state.value, 8))
            .run();
    }

    #[test]
    fn test_error_assertion() {
        let strict = reducer_fn(0_u8, |_: &Arc<u8>, _: &SampleAction| {
            Err(ReducerError::invalid("read-only"))
        });
        ReducerTest::new(strict)
            .when_action(SampleAction::Flip)
            .then_error(|error| assert_eq!(*error, ReducerError::invalid("read-only")))
            .run();
    }

    #[test]
    #[should_panic(expected = "same Arc")]
    fn test_then_unchanged_detects_new_state() {
        ReducerTest::new(counter_reducer())
            .when_action(SampleAction::Increment(1))
            .then_unchanged()
            .run();
    }

    #[test]
    fn test_identity_helpers() {
        let a = Arc::new(1);
        let b = Arc::new(1);
        assertions::assert_same_state(&a, &a);
        assertions::assert_new_state(&a, &b);
    }
}
