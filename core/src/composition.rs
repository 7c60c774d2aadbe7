//! Reducer composition utilities
//!
//! This module provides utilities for composing reducers in various ways:
//! - **`combine_reducers`**: Mount reducers under string keys of a [`CombinedState`]
//! - **`scope_reducer`**: Focus a reducer on one `Arc` field of a struct state
//! - **`chain_reducers`**: Run multiple reducers on the same state/action
//!
//! Every combinator preserves reference identity: when none of the inner
//! reducers changed anything, the outer reducer returns the exact `Arc` it
//! was given.
//!
//! # Examples
//!
//! ## Combining Slices
//!
//! ```
//! use std::sync::Arc;
//! use tideway_core::{Action, Reducer, ReducerError, combine_reducers, reducer_fn};
//!
//! #[derive(Clone, Debug)]
//! enum AppAction {
//!     Increment,
//!     Flip,
//! }
//!
//! impl Action for AppAction {
//!     fn action_type(&self) -> &str {
//!         match self {
//!             Self::Increment => "counter/increment",
//!             Self::Flip => "flag/flip",
//!         }
//!     }
//! }
//!
//! let counter = reducer_fn(0_i64, |state: &Arc<i64>, action: &AppAction| {
//!     Ok::<_, ReducerError>(match action {
//!         AppAction::Increment => Arc::new(**state + 1),
//!         AppAction::Flip => Arc::clone(state),
//!     })
//! });
//! let flag = reducer_fn(false, |state: &Arc<bool>, action: &AppAction| {
//!     Ok::<_, ReducerError>(match action {
//!         AppAction::Flip => Arc::new(!**state),
//!         AppAction::Increment => Arc::clone(state),
//!     })
//! });
//!
//! let root = combine_reducers().reducer("counter", counter).reducer("flag", flag);
//!
//! let state = root.initial_state();
//! let next = root.reduce(&state, &AppAction::Flip).unwrap();
//! assert_eq!(next.get::<bool>("flag").as_deref(), Some(&true));
//! assert!(Arc::ptr_eq(
//!     &state.get::<i64>("counter").unwrap(),
//!     &next.get::<i64>("counter").unwrap(),
//! ));
//! ```

use crate::action::{Action, Lifecycle};
use crate::reducer::{Reducer, ReducerError};
use crate::slice::{Slice, SliceReducer};
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::any::Any;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// A value that can live under a key of a [`CombinedState`]
///
/// Implemented automatically for every `Serialize + Debug + Send + Sync + 'static`
/// type. Serialization keeps the whole tree exportable to external inspectors.
pub trait SliceState: Any + Send + Sync + fmt::Debug {
    /// Serialize to a plain JSON tree
    ///
    /// # Errors
    ///
    /// Returns the serializer's error if the value cannot be represented.
    fn to_json(&self) -> Result<serde_json::Value, serde_json::Error>;

    /// Type-erased reference for downcasting
    fn as_any(&self) -> &dyn Any;

    /// Type-erased `Arc` for downcasting without losing pointer identity
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;

    /// Name of the concrete type, for diagnostics
    fn type_name(&self) -> &'static str;
}

impl<T> SliceState for T
where
    T: Serialize + Any + Send + Sync + fmt::Debug,
{
    fn to_json(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::to_value(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }
}

fn same_slice(a: &Arc<dyn SliceState>, b: &Arc<dyn SliceState>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

/// State tree made of named slices
///
/// Cloning is shallow: slices are shared by `Arc`, so a transition that
/// changes one slice shares every other slice with the previous state.
#[derive(Clone, Default)]
pub struct CombinedState {
    slices: BTreeMap<String, Arc<dyn SliceState>>,
}

impl CombinedState {
    /// An empty state tree
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert, used to assemble preloaded state
    #[must_use]
    pub fn with_slice<T: SliceState>(mut self, key: impl Into<String>, value: T) -> Self {
        self.slices.insert(key.into(), Arc::new(value));
        self
    }

    /// Insert an already shared slice value
    pub fn insert_arc(&mut self, key: impl Into<String>, value: Arc<dyn SliceState>) {
        self.slices.insert(key.into(), value);
    }

    /// Typed read of a slice
    ///
    /// Returns `None` if the key is absent or holds another type. The returned
    /// `Arc` points at the stored value, so identity checks keep working.
    #[must_use]
    pub fn get<T>(&self, key: &str) -> Option<Arc<T>>
    where
        T: Any + Send + Sync,
    {
        let entry = self.slices.get(key)?;
        <dyn SliceState as SliceState>::into_any(Arc::clone(entry))
            .downcast::<T>()
            .ok()
    }

    /// Type-erased read of a slice
    #[must_use]
    pub fn get_raw(&self, key: &str) -> Option<&Arc<dyn SliceState>> {
        self.slices.get(key)
    }

    /// Whether a slice is mounted under `key`
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.slices.contains_key(key)
    }

    /// Keys present in this state, in sorted order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.slices.keys().map(String::as_str)
    }

    /// Number of slices
    #[must_use]
    pub fn len(&self) -> usize {
        self.slices.len()
    }

    /// Whether the tree has no slices
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slices.is_empty()
    }

    /// Export the whole tree as plain JSON
    ///
    /// # Errors
    ///
    /// Returns the first slice serialization error.
    pub fn to_json(&self) -> Result<serde_json::Value, serde_json::Error> {
        let mut map = serde_json::Map::with_capacity(self.slices.len());
        for (key, value) in &self.slices {
            map.insert(key.clone(), value.to_json()?);
        }
        Ok(serde_json::Value::Object(map))
    }
}

impl fmt::Debug for CombinedState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.slices.iter()).finish()
    }
}

impl Serialize for CombinedState {
    fn serialize<Ser: Serializer>(&self, serializer: Ser) -> Result<Ser::Ok, Ser::Error> {
        let mut map = serializer.serialize_map(Some(self.slices.len()))?;
        for (key, value) in &self.slices {
            let json = value
                .to_json()
                .map_err(<Ser::Error as serde::ser::Error>::custom)?;
            map.serialize_entry(key, &json)?;
        }
        map.end()
    }
}

/// Advisory raised when a combined state carries keys no reducer owns
///
/// Non-fatal: the unknown slices are passed through untouched.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error(
    "Unexpected keys {keys:?} found in state; expected one of {expected:?}. \
     Unexpected keys are passed through untouched"
)]
pub struct UnknownKeyWarning {
    /// Keys present in state without a registered reducer
    pub keys: Vec<String>,
    /// Keys that do have a registered reducer
    pub expected: Vec<String>,
}

/// Type-erased reducer mounted under a key
trait KeyedReducer<A>: Send + Sync {
    fn initial(&self) -> Arc<dyn SliceState>;

    fn reduce(
        &self,
        key: &str,
        state: &Arc<dyn SliceState>,
        action: &A,
    ) -> Result<Arc<dyn SliceState>, ReducerError>;
}

struct Keyed<R>(R);

impl<A, R> KeyedReducer<A> for Keyed<R>
where
    R: Reducer<Action = A>,
    R::State: SliceState,
{
    fn initial(&self) -> Arc<dyn SliceState> {
        self.0.initial_state()
    }

    fn reduce(
        &self,
        key: &str,
        state: &Arc<dyn SliceState>,
        action: &A,
    ) -> Result<Arc<dyn SliceState>, ReducerError> {
        let typed = <dyn SliceState as SliceState>::into_any(Arc::clone(state))
            .downcast::<R::State>()
            .map_err(|_| ReducerError::SliceTypeMismatch {
                key: key.to_owned(),
                expected: std::any::type_name::<R::State>(),
            })?;

        let next = self.0.reduce(&typed, action).map_err(|e| e.in_slice(key))?;

        if Arc::ptr_eq(&typed, &next) {
            Ok(Arc::clone(state))
        } else {
            Ok(next)
        }
    }
}

/// Create an empty [`CombinedReducer`]; mount reducers with
/// [`CombinedReducer::reducer`] or [`CombinedReducer::slice`]
///
/// Every mounted reducer sees every action, with only its own sub-state.
#[must_use]
pub fn combine_reducers<A: Action>() -> CombinedReducer<A> {
    CombinedReducer::new()
}

/// Root reducer made of keyed slice reducers
///
/// Created by [`combine_reducers`].
pub struct CombinedReducer<A> {
    slices: Vec<(String, Box<dyn KeyedReducer<A>>)>,
    warned: Mutex<BTreeSet<String>>,
}

impl<A: Action> CombinedReducer<A> {
    /// An empty combined reducer
    #[must_use]
    pub fn new() -> Self {
        Self {
            slices: Vec::new(),
            warned: Mutex::new(BTreeSet::new()),
        }
    }

    /// Mount `reducer` under `key`
    ///
    /// Mounting a second reducer under the same key replaces the first.
    #[must_use]
    pub fn reducer<R>(mut self, key: impl Into<String>, reducer: R) -> Self
    where
        R: Reducer<Action = A> + 'static,
        R::State: SliceState,
    {
        let key = key.into();
        let keyed: Box<dyn KeyedReducer<A>> = Box::new(Keyed(reducer));

        if let Some(existing) = self.slices.iter_mut().find(|(k, _)| *k == key) {
            tracing::warn!(key = %key, "Replacing reducer already mounted under this key");
            existing.1 = keyed;
        } else {
            self.slices.push((key, keyed));
        }
        self
    }

    /// Mount a [`Slice`] under its own name
    #[must_use]
    pub fn slice<T>(self, slice: T) -> Self
    where
        T: Slice<Action = A>,
        T::State: SliceState,
    {
        let key = slice.name().to_owned();
        self.reducer(key, SliceReducer::new(slice))
    }

    /// Keys with a mounted reducer, in registration order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.slices.iter().map(|(k, _)| k.as_str())
    }

    /// Report keys of `state` that no mounted reducer owns
    #[must_use]
    pub fn unexpected_keys(&self, state: &CombinedState) -> Option<UnknownKeyWarning> {
        let keys: Vec<String> = state
            .keys()
            .filter(|key| !self.slices.iter().any(|(k, _)| k == key))
            .map(str::to_owned)
            .collect();

        if keys.is_empty() {
            None
        } else {
            Some(UnknownKeyWarning {
                keys,
                expected: self.keys().map(str::to_owned).collect(),
            })
        }
    }

    /// Log the advisory once per unexpected key
    fn warn_unexpected(&self, state: &CombinedState) {
        let Some(warning) = self.unexpected_keys(state) else {
            return;
        };

        let mut warned = self
            .warned
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let fresh: Vec<&String> = warning
            .keys
            .iter()
            .filter(|key| !warned.contains(*key))
            .collect();

        if !fresh.is_empty() {
            tracing::warn!(unexpected = ?fresh, "{warning}");
            warned.extend(fresh.into_iter().cloned());
        }
    }
}

impl<A: Action> Default for CombinedReducer<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: Action> Reducer for CombinedReducer<A> {
    type State = CombinedState;
    type Action = A;

    fn initial_state(&self) -> Arc<CombinedState> {
        let slices = self
            .slices
            .iter()
            .map(|(key, reducer)| (key.clone(), reducer.initial()))
            .collect();
        Arc::new(CombinedState { slices })
    }

    fn reduce(
        &self,
        state: &Arc<CombinedState>,
        action: &A,
    ) -> Result<Arc<CombinedState>, ReducerError> {
        if action.lifecycle() != Some(Lifecycle::Replace) {
            self.warn_unexpected(state);
        }

        let mut next: Option<BTreeMap<String, Arc<dyn SliceState>>> = None;

        for (key, reducer) in &self.slices {
            let (prior, missing) = match state.slices.get(key) {
                Some(existing) => (Arc::clone(existing), false),
                None => (reducer.initial(), true),
            };

            let reduced = reducer.reduce(key, &prior, action)?;

            if missing || !same_slice(&prior, &reduced) {
                next.get_or_insert_with(|| state.slices.clone())
                    .insert(key.clone(), reduced);
            }
        }

        Ok(match next {
            Some(slices) => Arc::new(CombinedState { slices }),
            None => Arc::clone(state),
        })
    }
}

/// Combines multiple reducers that operate on the same state and action types.
///
/// Each reducer is run in sequence, each one seeing the previous one's output.
/// This is useful when you want to split reducer logic across multiple implementations.
///
/// The chain's initial state is the first reducer's (or `S::default()` for an
/// empty chain).
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use tideway_core::{Reducer, ReducerError, chain_reducers, reducer_fn};
///
/// let add_one = reducer_fn(0_i32, |s: &Arc<i32>, _: &()| Ok::<_, ReducerError>(Arc::new(**s + 1)));
/// let double = reducer_fn(0_i32, |s: &Arc<i32>, _: &()| Ok::<_, ReducerError>(Arc::new(**s * 2)));
///
/// let chained = chain_reducers(vec![Box::new(add_one), Box::new(double)]);
/// let next = chained.reduce(&Arc::new(3), &()).unwrap();
/// assert_eq!(*next, 8);
/// ```
#[must_use]
pub fn chain_reducers<S, A>(
    reducers: Vec<Box<dyn Reducer<State = S, Action = A>>>,
) -> ChainedReducer<S, A>
where
    S: Default + Send + Sync + 'static,
{
    ChainedReducer { reducers }
}

/// A reducer that runs multiple reducers in sequence.
///
/// Created by [`chain_reducers`].
pub struct ChainedReducer<S, A> {
    reducers: Vec<Box<dyn Reducer<State = S, Action = A>>>,
}

impl<S, A> Reducer for ChainedReducer<S, A>
where
    S: Default + Send + Sync + 'static,
{
    type State = S;
    type Action = A;

    fn initial_state(&self) -> Arc<S> {
        self.reducers
            .first()
            .map_or_else(|| Arc::new(S::default()), |r| r.initial_state())
    }

    fn reduce(&self, state: &Arc<S>, action: &A) -> Result<Arc<S>, ReducerError> {
        self.reducers
            .iter()
            .try_fold(Arc::clone(state), |current, reducer| {
                reducer.reduce(&current, action)
            })
    }
}

/// Scopes a reducer to operate on one `Arc` field of a larger state.
///
/// This allows you to reuse reducers designed for smaller state types
/// within a larger application state. When the child reducer returns its
/// input unchanged, the parent state is returned unchanged as well.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use tideway_core::{Reducer, ReducerError, reducer_fn, scope_reducer};
///
/// #[derive(Clone, Default)]
/// struct AppState {
///     counter: Arc<i32>,
///     title: String,
/// }
///
/// let counter = reducer_fn(0_i32, |s: &Arc<i32>, by: &i32| {
///     Ok::<_, ReducerError>(if *by == 0 { Arc::clone(s) } else { Arc::new(**s + by) })
/// });
///
/// let scoped = scope_reducer(
///     counter,
///     |app: &AppState| &app.counter,
///     |app: &mut AppState, counter| app.counter = counter,
/// );
///
/// let state = Arc::new(AppState::default());
/// let next = scoped.reduce(&state, &5).unwrap();
/// assert_eq!(*next.counter, 5);
///
/// let same = scoped.reduce(&next, &0).unwrap();
/// assert!(Arc::ptr_eq(&next, &same));
/// ```
pub fn scope_reducer<S, Sub, R>(
    reducer: R,
    get_state: fn(&S) -> &Arc<Sub>,
    set_state: fn(&mut S, Arc<Sub>),
) -> ScopedReducer<S, Sub, R>
where
    S: Clone + Default + Send + Sync + 'static,
    Sub: Send + Sync + 'static,
    R: Reducer<State = Sub>,
{
    ScopedReducer {
        reducer,
        get_state,
        set_state,
    }
}

/// A scoped reducer that operates on a subset of state.
///
/// Created by [`scope_reducer`].
pub struct ScopedReducer<S, Sub, R> {
    reducer: R,
    get_state: fn(&S) -> &Arc<Sub>,
    set_state: fn(&mut S, Arc<Sub>),
}

impl<S, Sub, R> Reducer for ScopedReducer<S, Sub, R>
where
    S: Clone + Default + Send + Sync + 'static,
    Sub: Send + Sync + 'static,
    R: Reducer<State = Sub>,
{
    type State = S;
    type Action = R::Action;

    fn initial_state(&self) -> Arc<S> {
        let mut parent = S::default();
        (self.set_state)(&mut parent, self.reducer.initial_state());
        Arc::new(parent)
    }

    fn reduce(&self, state: &Arc<S>, action: &R::Action) -> Result<Arc<S>, ReducerError> {
        let sub_state = (self.get_state)(state);
        let next_sub = self.reducer.reduce(sub_state, action)?;

        if Arc::ptr_eq(sub_state, &next_sub) {
            return Ok(Arc::clone(state));
        }

        let mut parent = S::clone(state);
        (self.set_state)(&mut parent, next_sub);
        Ok(Arc::new(parent))
    }
}
