//! Middleware chain
//!
//! A middleware sits between [`Store::dispatch`](crate::Store::dispatch) and
//! the root reducer. Each one receives the action and a [`Next`] handle to the
//! rest of the chain, and may:
//!
//! - call `next` once (pass through, possibly with a transformed action),
//! - not call it at all (swallow the action),
//! - call it several times (fan-out or replay),
//! - dispatch new actions through the [`MiddlewareApi`] (depth-first).
//!
//! The chain is composed right-to-left once, when the Store is built. The
//! first registered middleware sees the raw action first and the final
//! result last.

use crate::error::StoreError;
use crate::store::StoreInner;
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Instant;
use tideway_core::Action;

/// The rest of the chain, ending at the reducer
pub struct Next<A> {
    run: Arc<dyn Fn(A) -> Result<A, StoreError> + Send + Sync>,
}

impl<A> Next<A> {
    /// Wrap a continuation
    ///
    /// Mostly useful for driving a middleware in isolation from tests.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(A) -> Result<A, StoreError> + Send + Sync + 'static,
    {
        Self { run: Arc::new(f) }
    }

    /// Pass `action` to the rest of the chain
    ///
    /// # Errors
    ///
    /// Propagates whatever the downstream middleware or the reducer returns.
    pub fn run(&self, action: A) -> Result<A, StoreError> {
        (self.run)(action)
    }
}

impl<A> Clone for Next<A> {
    fn clone(&self) -> Self {
        Self {
            run: Arc::clone(&self.run),
        }
    }
}

impl<A> fmt::Debug for Next<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Next(..)")
    }
}

/// Store capabilities handed to middleware and thunks
///
/// Holds a weak reference, so a handle kept alive by a spawned task never
/// keeps the Store itself alive.
pub struct MiddlewareApi<S, A> {
    inner: Weak<StoreInner<S, A>>,
}

impl<S, A> MiddlewareApi<S, A> {
    pub(crate) const fn new(inner: Weak<StoreInner<S, A>>) -> Self {
        Self { inner }
    }

    /// Whether the Store still exists
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.inner.strong_count() > 0
    }
}

impl<S, A> MiddlewareApi<S, A>
where
    S: Send + Sync + 'static,
    A: Action + From<tideway_core::Lifecycle>,
{
    /// Dispatch through the full chain, starting from the first middleware
    ///
    /// When called synchronously from inside a middleware, the nested action
    /// is fully processed (including listener notification) before this
    /// returns.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Dropped`] if the Store no longer exists, and
    /// otherwise the same errors as [`Store::dispatch`](crate::Store::dispatch).
    pub fn dispatch(&self, action: A) -> Result<A, StoreError> {
        self.inner
            .upgrade()
            .ok_or(StoreError::Dropped)?
            .dispatch(action)
    }

    /// The last committed state
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Dropped`] if the Store no longer exists.
    pub fn get_state(&self) -> Result<Arc<S>, StoreError> {
        Ok(self.inner.upgrade().ok_or(StoreError::Dropped)?.observe_state())
    }
}

impl<S, A> Clone for MiddlewareApi<S, A> {
    fn clone(&self) -> Self {
        Self {
            inner: Weak::clone(&self.inner),
        }
    }
}

impl<S, A> fmt::Debug for MiddlewareApi<S, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MiddlewareApi")
            .field("alive", &(self.inner.strong_count() > 0))
            .finish()
    }
}

/// An interceptor on the dispatch path
///
/// # Example
///
/// ```
/// use tideway_core::Action;
/// use tideway_runtime::{Middleware, MiddlewareApi, Next, StoreError};
///
/// /// Drops every action whose type starts with `debug/`
/// struct DropDebug;
///
/// impl<S, A: Action> Middleware<S, A> for DropDebug {
///     fn handle(&self, _api: &MiddlewareApi<S, A>, action: A, next: &Next<A>) -> Result<A, StoreError> {
///         if action.action_type().starts_with("debug/") {
///             Ok(action)
///         } else {
///             next.run(action)
///         }
///     }
/// }
/// ```
pub trait Middleware<S, A>: Send + Sync + 'static {
    /// Handle one action
    ///
    /// The returned action is what the caller of `dispatch` receives.
    ///
    /// # Errors
    ///
    /// Propagate errors from `next`, or return
    /// [`StoreError::Rejected`] to refuse the action.
    fn handle(&self, api: &MiddlewareApi<S, A>, action: A, next: &Next<A>)
    -> Result<A, StoreError>;
}

impl<S, A, M> Middleware<S, A> for Arc<M>
where
    M: Middleware<S, A> + ?Sized,
{
    fn handle(
        &self,
        api: &MiddlewareApi<S, A>,
        action: A,
        next: &Next<A>,
    ) -> Result<A, StoreError> {
        (**self).handle(api, action, next)
    }
}

/// A middleware built from a closure
///
/// Created by [`middleware_fn`].
pub struct FnMiddleware<F> {
    f: F,
}

/// Adapt a closure into a [`Middleware`]
///
/// ```
/// use tideway_runtime::{MiddlewareApi, Next, middleware_fn};
///
/// let passthrough = middleware_fn(|_api: &MiddlewareApi<i64, String>, action: String, next: &Next<String>| {
///     next.run(action)
/// });
/// # let _ = passthrough;
/// ```
pub const fn middleware_fn<S, A, F>(f: F) -> FnMiddleware<F>
where
    F: Fn(&MiddlewareApi<S, A>, A, &Next<A>) -> Result<A, StoreError> + Send + Sync + 'static,
{
    FnMiddleware { f }
}

impl<S, A, F> Middleware<S, A> for FnMiddleware<F>
where
    F: Fn(&MiddlewareApi<S, A>, A, &Next<A>) -> Result<A, StoreError> + Send + Sync + 'static,
{
    fn handle(
        &self,
        api: &MiddlewareApi<S, A>,
        action: A,
        next: &Next<A>,
    ) -> Result<A, StoreError> {
        (self.f)(api, action, next)
    }
}

/// Compose `middleware` around `terminal`, right to left
pub(crate) fn compose<S, A>(
    api: &MiddlewareApi<S, A>,
    middleware: Vec<Arc<dyn Middleware<S, A>>>,
    terminal: Next<A>,
) -> Next<A>
where
    S: Send + Sync + 'static,
    A: 'static,
{
    middleware.into_iter().rev().fold(terminal, |next, layer| {
        let api = api.clone();
        Next::new(move |action| layer.handle(&api, action, &next))
    })
}

/// Logs every action passing through, with timing and whether state changed
///
/// Register it first to time the whole chain.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingMiddleware;

impl LoggingMiddleware {
    /// Create a logging middleware
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl<S, A> Middleware<S, A> for LoggingMiddleware
where
    S: Send + Sync + 'static,
    A: Action + From<tideway_core::Lifecycle>,
{
    fn handle(
        &self,
        api: &MiddlewareApi<S, A>,
        action: A,
        next: &Next<A>,
    ) -> Result<A, StoreError> {
        let action_type = action.action_type().to_string();
        let before = api.get_state()?;
        let start = Instant::now();

        let result = next.run(action);

        let elapsed_us = u64::try_from(start.elapsed().as_micros()).unwrap_or(u64::MAX);
        match &result {
            Ok(_) => {
                let changed = !Arc::ptr_eq(&before, &api.get_state()?);
                tracing::info!(action_type = %action_type, changed, elapsed_us, "Action dispatched");
            },
            Err(error) => {
                tracing::warn!(action_type = %action_type, %error, elapsed_us, "Action failed");
            },
        }
        result
    }
}
