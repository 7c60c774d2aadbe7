//! Memoized derived values
//!
//! A [`Selector`] derives a value from state through one or more input
//! functions and a combiner. Inputs return `Arc`s; the combiner only runs
//! again when at least one input returns a different `Arc` (pointer
//! comparison) than on the previous call. The cache holds exactly one entry.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use tideway_core::create_selector;
//!
//! struct AppState {
//!     todos: Arc<Vec<(String, bool)>>,
//!     show_done: Arc<bool>,
//! }
//!
//! let visible = create_selector(
//!     (
//!         |s: &AppState| Arc::clone(&s.todos),
//!         |s: &AppState| Arc::clone(&s.show_done),
//!     ),
//!     |(todos, show_done): &(Arc<Vec<(String, bool)>>, Arc<bool>)| {
//!         todos
//!             .iter()
//!             .filter(|(_, done)| **show_done || !done)
//!             .count()
//!     },
//! );
//!
//! let state = Arc::new(AppState {
//!     todos: Arc::new(vec![("a".into(), true), ("b".into(), false)]),
//!     show_done: Arc::new(false),
//! });
//!
//! assert_eq!(*visible.select(&state), 1);
//! assert_eq!(*visible.select(&state), 1);
//! assert_eq!(visible.recomputations(), 1);
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// A tuple of input functions whose outputs are compared by pointer
///
/// Implemented for tuples of one to four `Fn(&S) -> Arc<T>` closures.
pub trait SelectorInputs<S>: Send + Sync {
    /// Tuple of the inputs' outputs
    type Output;

    /// Run every input against `state`
    fn select(&self, state: &S) -> Self::Output;

    /// Whether every output of `a` is the same allocation as in `b`
    fn same(a: &Self::Output, b: &Self::Output) -> bool;
}

macro_rules! impl_selector_inputs {
    ($(($f:ident, $t:ident, $idx:tt)),+) => {
        impl<S, $($f, $t),+> SelectorInputs<S> for ($($f,)+)
        where
            $($f: Fn(&S) -> Arc<$t> + Send + Sync,)+
        {
            type Output = ($(Arc<$t>,)+);

            fn select(&self, state: &S) -> Self::Output {
                ($((self.$idx)(state),)+)
            }

            fn same(a: &Self::Output, b: &Self::Output) -> bool {
                true $(&& Arc::ptr_eq(&a.$idx, &b.$idx))+
            }
        }
    };
}

impl_selector_inputs!((F0, T0, 0));
impl_selector_inputs!((F0, T0, 0), (F1, T1, 1));
impl_selector_inputs!((F0, T0, 0), (F1, T1, 1), (F2, T2, 2));
impl_selector_inputs!((F0, T0, 0), (F1, T1, 1), (F2, T2, 2), (F3, T3, 3));

struct Memo<S, In, O> {
    state: Arc<S>,
    inputs: In,
    output: Arc<O>,
}

/// Last-call memoized derived value
///
/// Created by [`create_selector`].
pub struct Selector<S, I, O, F>
where
    I: SelectorInputs<S>,
{
    inputs: I,
    combiner: F,
    cache: Mutex<Option<Memo<S, I::Output, O>>>,
    recomputations: AtomicUsize,
}

/// Build a memoized selector from input functions and a combiner
pub fn create_selector<S, I, O, F>(inputs: I, combiner: F) -> Selector<S, I, O, F>
where
    I: SelectorInputs<S>,
    F: Fn(&I::Output) -> O + Send + Sync,
{
    Selector {
        inputs,
        combiner,
        cache: Mutex::new(None),
        recomputations: AtomicUsize::new(0),
    }
}

impl<S, I, O, F> Selector<S, I, O, F>
where
    I: SelectorInputs<S>,
    F: Fn(&I::Output) -> O + Send + Sync,
{
    /// Compute (or recall) the derived value for `state`
    ///
    /// Identical `state` skips the inputs entirely; identical input outputs
    /// skip the combiner. Inputs and combiner run without the cache lock
    /// held, so concurrent callers may both compute; the last one stored wins.
    pub fn select(&self, state: &Arc<S>) -> Arc<O> {
        if let Some(memo) = self.lock_cache().as_ref() {
            if Arc::ptr_eq(&memo.state, state) {
                return Arc::clone(&memo.output);
            }
        }

        let inputs = self.inputs.select(state);

        if let Some(memo) = self.lock_cache().as_mut() {
            if I::same(&memo.inputs, &inputs) {
                memo.state = Arc::clone(state);
                return Arc::clone(&memo.output);
            }
        }

        let output = Arc::new((self.combiner)(&inputs));
        self.recomputations.fetch_add(1, Ordering::Relaxed);
        *self.lock_cache() = Some(Memo {
            state: Arc::clone(state),
            inputs,
            output: Arc::clone(&output),
        });
        output
    }

    /// How many times the combiner has run
    pub fn recomputations(&self) -> usize {
        self.recomputations.load(Ordering::Relaxed)
    }

    /// Drop the cached entry and zero the counter
    pub fn reset(&self) {
        *self.lock_cache() = None;
        self.recomputations.store(0, Ordering::Relaxed);
    }

    fn lock_cache(&self) -> MutexGuard<'_, Option<Memo<S, I::Output, O>>> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
