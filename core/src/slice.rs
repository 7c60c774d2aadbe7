//! Named state partitions
//!
//! A [`Slice`] bundles a name, an initial sub-state, and the transition logic
//! for that sub-state. Transition logic is written against a [`Draft`], so a
//! slice that ignores an action automatically preserves identity.
//!
//! The slice's action enum variants are its action creators: building an
//! action is just constructing a value.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use tideway_core::{Draft, Reducer, ReducerError, Slice, SliceReducer};
//!
//! #[derive(Clone, Debug)]
//! enum CounterAction {
//!     Increment(i64),
//!     Reset,
//! }
//!
//! struct CounterSlice;
//!
//! impl Slice for CounterSlice {
//!     type State = i64;
//!     type Action = CounterAction;
//!
//!     fn name(&self) -> &str {
//!         "counter"
//!     }
//!
//!     fn initial_state(&self) -> i64 {
//!         0
//!     }
//!
//!     fn reduce(&self, draft: &mut Draft<i64>, action: &CounterAction) -> Result<(), ReducerError> {
//!         match action {
//!             CounterAction::Increment(n) => *draft.get_mut() += n,
//!             CounterAction::Reset => draft.set(0),
//!         }
//!         Ok(())
//!     }
//! }
//!
//! let reducer = SliceReducer::new(CounterSlice);
//! let next = reducer.reduce(&reducer.initial_state(), &CounterAction::Increment(4)).unwrap();
//! assert_eq!(*next, 4);
//! ```

use crate::draft::Draft;
use crate::reducer::{Reducer, ReducerError};
use std::sync::Arc;

/// A named partition of the state tree and the logic that owns it
pub trait Slice: Send + Sync + 'static {
    /// The sub-state owned by this slice
    type State: Clone + Send + Sync + 'static;

    /// The action type this slice responds to
    type Action;

    /// Key under which this slice is mounted when combined
    fn name(&self) -> &str;

    /// Sub-state before any action has been seen
    fn initial_state(&self) -> Self::State;

    /// Apply `action` to the draft
    ///
    /// Leave the draft untouched for actions the slice does not handle.
    ///
    /// # Errors
    ///
    /// Returns a [`ReducerError`] to reject the action; the draft is then
    /// discarded.
    fn reduce(
        &self,
        draft: &mut Draft<Self::State>,
        action: &Self::Action,
    ) -> Result<(), ReducerError>;
}

/// Adapts a [`Slice`] into a [`Reducer`]
pub struct SliceReducer<T: Slice> {
    slice: T,
    initial: Arc<T::State>,
}

impl<T: Slice> SliceReducer<T> {
    /// Wrap a slice, computing its initial state once
    #[must_use]
    pub fn new(slice: T) -> Self {
        let initial = Arc::new(slice.initial_state());
        Self { slice, initial }
    }

    /// Name of the wrapped slice
    #[must_use]
    pub fn name(&self) -> &str {
        self.slice.name()
    }
}

impl<T: Slice> Reducer for SliceReducer<T> {
    type State = T::State;
    type Action = T::Action;

    fn initial_state(&self) -> Arc<T::State> {
        Arc::clone(&self.initial)
    }

    fn reduce(
        &self,
        state: &Arc<T::State>,
        action: &T::Action,
    ) -> Result<Arc<T::State>, ReducerError> {
        let mut draft = Draft::new(state);
        self.slice.reduce(&mut draft, action)?;
        Ok(draft.finish())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[derive(Clone, Debug, Default)]
    struct Inventory {
        items: Vec<String>,
    }

    #[derive(Clone, Debug)]
    enum InventoryAction {
        Stock(String),
        Sell(String),
        Audit,
    }

    struct InventorySlice;

    impl Slice for InventorySlice {
        type State = Inventory;
        type Action = InventoryAction;

        fn name(&self) -> &str {
            "inventory"
        }

        fn initial_state(&self) -> Inventory {
            Inventory::default()
        }

        fn reduce(
            &self,
            draft: &mut Draft<Inventory>,
            action: &InventoryAction,
        ) -> Result<(), ReducerError> {
            match action {
                InventoryAction::Stock(item) => draft.get_mut().items.push(item.clone()),
                InventoryAction::Sell(item) => {
                    let position = draft
                        .items
                        .iter()
                        .position(|i| i == item)
                        .ok_or_else(|| ReducerError::invalid(format!("{item} not in stock")))?;
                    draft.get_mut().items.remove(position);
                },
                InventoryAction::Audit => {},
            }
            Ok(())
        }
    }

    #[test]
    fn test_slice_reducer_applies_draft() {
        let reducer = SliceReducer::new(InventorySlice);
        let state = reducer.initial_state();
        let next = reducer
            .reduce(&state, &InventoryAction::Stock("bolt".into()))
            .unwrap();
        assert_eq!(next.items, vec!["bolt".to_string()]);
        assert!(state.items.is_empty());
    }

    #[test]
    fn test_ignored_action_preserves_identity() {
        let reducer = SliceReducer::new(InventorySlice);
        let state = reducer.initial_state();
        let next = reducer.reduce(&state, &InventoryAction::Audit).unwrap();
        assert!(Arc::ptr_eq(&state, &next));
    }

    #[test]
    fn test_rejected_action_leaves_input_alone() {
        let reducer = SliceReducer::new(InventorySlice);
        let state = Arc::new(Inventory {
            items: vec!["nut".into()],
        });
        let err = reducer
            .reduce(&state, &InventoryAction::Sell("bolt".into()))
            .unwrap_err();
        assert_eq!(err, ReducerError::invalid("bolt not in stock"));
        assert_eq!(state.items, vec!["nut".to_string()]);
    }

    #[test]
    fn test_initial_state_is_stable() {
        let reducer = SliceReducer::new(InventorySlice);
        assert!(Arc::ptr_eq(&reducer.initial_state(), &reducer.initial_state()));
        assert_eq!(reducer.name(), "inventory");
    }
}
