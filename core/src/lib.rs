//! # Tideway Core
//!
//! Core traits and types for the Tideway state container.
//!
//! This crate holds the pure half of the architecture: everything here is
//! deterministic and free of side effects. The runtime crate owns the single
//! mutable cell (the Store) and drives these abstractions.
//!
//! ## Core Concepts
//!
//! - **State**: Application-defined value, held behind an `Arc` and replaced, never mutated
//! - **Action**: Plain data describing something that happened, tagged by [`Action::action_type`]
//! - **Reducer**: Pure function `(Arc<State>, &Action) → Arc<State>`
//! - **Slice**: A named partition of the state tree owned by exactly one reducer
//! - **Selector**: Memoized derived value computed from state
//!
//! ## Reference Identity
//!
//! A reducer signals "nothing changed" by returning the very same `Arc` it
//! was given. Composition utilities preserve that identity all the way up, so
//! observers can detect no-op transitions with [`Arc::ptr_eq`].
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use tideway_core::{Action, Lifecycle, Reducer, ReducerError, reducer_fn};
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
//! let counter = reducer_fn(0_i64, |state: &Arc<i64>, action: &CounterAction| {
//!     Ok::<_, ReducerError>(match action {
//!         CounterAction::Increment(n) => Arc::new(**state + n),
//!         CounterAction::Lifecycle(_) => Arc::clone(state),
//!     })
//! });
//!
//! let start = counter.initial_state();
//! let next = counter.reduce(&start, &CounterAction::Increment(2)).unwrap();
//! assert_eq!(*next, 2);
//! ```

// Re-export commonly used types
pub use serde::{Deserialize, Serialize};

/// Reducer composition utilities (keyed slices, scoping, chaining)
pub mod composition;

/// Copy-on-write draft builder for ergonomic "mutating" reducers
pub mod draft;

/// Memoized derived-value computation
pub mod selector;

/// Named state partitions
pub mod slice;

/// Action module - the data that drives every state transition
///
/// Actions are plain values. They carry a discriminant (the action type)
/// and an arbitrary payload, and have no behavior of their own. Applications
/// model them as an enum so each reducer can `match` exhaustively.
pub mod action {
    use serde::{Deserialize, Serialize};
    use std::fmt;

    /// Sentinel actions dispatched by the Store itself
    ///
    /// - `Init` runs once when a Store is built, so every reducer can settle
    ///   its initial state.
    /// - `Replace` runs after the root reducer is hot-swapped, so newly
    ///   loaded slices can initialize.
    ///
    /// Application action enums wrap these in a variant and implement
    /// `From<Lifecycle>`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub enum Lifecycle {
        /// Store construction
        Init,
        /// Root reducer replacement
        Replace,
    }

    impl Lifecycle {
        /// Reserved action type of [`Lifecycle::Init`]
        pub const INIT_TYPE: &'static str = "@@tideway/INIT";

        /// Reserved action type of [`Lifecycle::Replace`]
        pub const REPLACE_TYPE: &'static str = "@@tideway/REPLACE";

        /// The reserved action type for this sentinel
        #[must_use]
        pub const fn action_type(self) -> &'static str {
            match self {
                Self::Init => Self::INIT_TYPE,
                Self::Replace => Self::REPLACE_TYPE,
            }
        }
    }

    impl fmt::Display for Lifecycle {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str(self.action_type())
        }
    }

    /// The Action trait - a tagged, immutable piece of data
    ///
    /// # Example
    ///
    /// ```
    /// use tideway_core::{Action, Lifecycle};
    ///
    /// #[derive(Clone, Debug)]
    /// enum TodoAction {
    ///     Added { title: String },
    ///     Toggled { index: usize },
    ///     Lifecycle(Lifecycle),
    /// }
    ///
    /// impl Action for TodoAction {
    ///     fn action_type(&self) -> &str {
    ///         match self {
    ///             Self::Added { .. } => "todos/added",
    ///             Self::Toggled { .. } => "todos/toggled",
    ///             Self::Lifecycle(l) => l.action_type(),
    ///         }
    ///     }
    ///
    ///     fn lifecycle(&self) -> Option<Lifecycle> {
    ///         match self {
    ///             Self::Lifecycle(l) => Some(*l),
    ///             _ => None,
    ///         }
    ///     }
    /// }
    ///
    /// assert_eq!(TodoAction::Toggled { index: 0 }.action_type(), "todos/toggled");
    /// ```
    pub trait Action: Clone + fmt::Debug + Send + Sync + 'static {
        /// The discriminant of this action (conventionally `"<slice>/<case>"`)
        fn action_type(&self) -> &str;

        /// The store sentinel this action represents, if any
        fn lifecycle(&self) -> Option<Lifecycle> {
            None
        }
    }
}

/// Reducer module - the core trait for state transitions
///
/// Reducers are pure functions: `(State, Action) → State`.
///
/// They are deterministic, perform no side effects, and never read ambient
/// Store state. This is what makes replaying a recorded action history
/// faithful.
pub mod reducer {
    use std::borrow::Borrow;
    use std::marker::PhantomData;
    use std::sync::Arc;
    use thiserror::Error;

    /// Errors raised by a reducer while computing a transition
    ///
    /// Any of these aborts the dispatch that triggered it; the Store keeps its
    /// previous state.
    #[derive(Error, Debug, Clone, PartialEq, Eq)]
    pub enum ReducerError {
        /// The reducer refused the action (domain validation)
        #[error("Action rejected: {0}")]
        Invalid(String),

        /// A keyed slice failed; wraps the slice's own error
        #[error("Slice `{key}` failed: {source}")]
        Slice {
            /// Key of the failing slice
            key: String,
            /// What went wrong inside the slice
            #[source]
            source: Box<ReducerError>,
        },

        /// A keyed slice holds a value of a different type than its reducer expects
        #[error("Slice `{key}` does not hold a `{expected}` value")]
        SliceTypeMismatch {
            /// Key of the mismatched slice
            key: String,
            /// Type name the reducer expected
            expected: &'static str,
        },

        /// The reducer panicked; the panic was caught by the Store
        #[error("Reducer panicked: {0}")]
        Panicked(String),
    }

    impl ReducerError {
        /// Build an [`ReducerError::Invalid`] from any message
        #[must_use]
        pub fn invalid(message: impl Into<String>) -> Self {
            Self::Invalid(message.into())
        }

        /// Attribute this error to the slice stored under `key`
        #[must_use]
        pub fn in_slice(self, key: impl Into<String>) -> Self {
            Self::Slice {
                key: key.into(),
                source: Box::new(self),
            }
        }
    }

    /// The Reducer trait - pure state transition function
    ///
    /// # Contract
    ///
    /// - Total over `(State, Action)`.
    /// - Returns the **same `Arc`** for actions it does not recognize.
    /// - Never mutates the value behind `state`; a changed state is a new `Arc`.
    /// - No observable side effects.
    ///
    /// # Example
    ///
    /// ```
    /// use std::sync::Arc;
    /// use tideway_core::{Reducer, ReducerError};
    ///
    /// #[derive(Clone, Debug)]
    /// enum FlagAction {
    ///     Flip,
    ///     Other,
    /// }
    ///
    /// struct FlagReducer;
    ///
    /// impl Reducer for FlagReducer {
    ///     type State = bool;
    ///     type Action = FlagAction;
    ///
    ///     fn initial_state(&self) -> Arc<bool> {
    ///         Arc::new(false)
    ///     }
    ///
    ///     fn reduce(&self, state: &Arc<bool>, action: &FlagAction) -> Result<Arc<bool>, ReducerError> {
    ///         match action {
    ///             FlagAction::Flip => Ok(Arc::new(!**state)),
    ///             FlagAction::Other => Ok(Arc::clone(state)),
    ///         }
    ///     }
    /// }
    ///
    /// let state = FlagReducer.initial_state();
    /// let same = FlagReducer.reduce(&state, &FlagAction::Other).unwrap();
    /// assert!(Arc::ptr_eq(&state, &same));
    /// ```
    pub trait Reducer: Send + Sync {
        /// The state type this reducer operates on
        type State: Send + Sync + 'static;

        /// The action type this reducer processes
        type Action;

        /// State used when no prior state exists
        fn initial_state(&self) -> Arc<Self::State>;

        /// Compute the next state
        ///
        /// # Errors
        ///
        /// Returns a [`ReducerError`] when the transition cannot be computed.
        /// The caller must then discard the transition entirely.
        fn reduce(
            &self,
            state: &Arc<Self::State>,
            action: &Self::Action,
        ) -> Result<Arc<Self::State>, ReducerError>;
    }

    impl<R: Reducer + ?Sized> Reducer for Box<R> {
        type State = R::State;
        type Action = R::Action;

        fn initial_state(&self) -> Arc<Self::State> {
            (**self).initial_state()
        }

        fn reduce(
            &self,
            state: &Arc<Self::State>,
            action: &Self::Action,
        ) -> Result<Arc<Self::State>, ReducerError> {
            (**self).reduce(state, action)
        }
    }

    impl<R: Reducer + ?Sized> Reducer for Arc<R> {
        type State = R::State;
        type Action = R::Action;

        fn initial_state(&self) -> Arc<Self::State> {
            (**self).initial_state()
        }

        fn reduce(
            &self,
            state: &Arc<Self::State>,
            action: &Self::Action,
        ) -> Result<Arc<Self::State>, ReducerError> {
            (**self).reduce(state, action)
        }
    }

    /// A reducer built from a closure and an initial state
    ///
    /// Created by [`reducer_fn`].
    pub struct FnReducer<S, A, F> {
        initial: Arc<S>,
        f: F,
        _action: PhantomData<fn(&A)>,
    }

    /// Adapt a closure into a [`Reducer`]
    ///
    /// # Example
    ///
    /// ```
    /// use std::sync::Arc;
    /// use tideway_core::{Reducer, ReducerError, reducer_fn};
    ///
    /// let doubler = reducer_fn(1_u32, |state: &Arc<u32>, _action: &()| {
    ///     Ok::<_, ReducerError>(Arc::new(**state * 2))
    /// });
    /// let next = doubler.reduce(&doubler.initial_state(), &()).unwrap();
    /// assert_eq!(*next, 2);
    /// ```
    pub fn reducer_fn<S, A, F>(initial: S, f: F) -> FnReducer<S, A, F>
    where
        S: Send + Sync + 'static,
        F: Fn(&Arc<S>, &A) -> Result<Arc<S>, ReducerError> + Send + Sync,
    {
        FnReducer {
            initial: Arc::new(initial),
            f,
            _action: PhantomData,
        }
    }

    impl<S, A, F> Reducer for FnReducer<S, A, F>
    where
        S: Send + Sync + 'static,
        F: Fn(&Arc<S>, &A) -> Result<Arc<S>, ReducerError> + Send + Sync,
    {
        type State = S;
        type Action = A;

        fn initial_state(&self) -> Arc<S> {
            Arc::clone(&self.initial)
        }

        fn reduce(&self, state: &Arc<S>, action: &A) -> Result<Arc<S>, ReducerError> {
            (self.f)(state, action)
        }
    }

    /// Fold a sequence of actions through a reducer, bypassing any Store
    ///
    /// This is the reference semantics of dispatch: replaying the same actions
    /// through a Store from the same initial state must produce the same
    /// final state.
    ///
    /// # Errors
    ///
    /// Stops at and returns the first [`ReducerError`].
    pub fn reduce_all<R, I>(
        reducer: &R,
        initial: Arc<R::State>,
        actions: I,
    ) -> Result<Arc<R::State>, ReducerError>
    where
        R: Reducer + ?Sized,
        I: IntoIterator,
        I::Item: Borrow<R::Action>,
    {
        actions
            .into_iter()
            .try_fold(initial, |state, action| reducer.reduce(&state, action.borrow()))
    }
}

pub use action::{Action, Lifecycle};
pub use composition::{
    CombinedReducer, CombinedState, SliceState, UnknownKeyWarning, chain_reducers,
    combine_reducers, scope_reducer,
};
pub use draft::{Draft, produce};
pub use reducer::{FnReducer, Reducer, ReducerError, reduce_all, reducer_fn};
pub use selector::{Selector, SelectorInputs, create_selector};
pub use slice::{Slice, SliceReducer};
