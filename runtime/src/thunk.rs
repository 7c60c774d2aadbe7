//! Deferred computations
//!
//! Reducers stay synchronous and pure. Anything asynchronous or externally
//! sourced enters the Store as a [`Thunk`]: an action whose payload is a unit
//! of work. [`ThunkMiddleware`] recognizes such actions, runs the work with a
//! [`MiddlewareApi`], and does not forward the action to the reducer.
//!
//! [`AsyncThunk`] layers the three-action protocol on top:
//!
//! ```text
//! start(arg) ──► Pending { request_id, arg }            (dispatched synchronously)
//!            └─► Fulfilled { request_id, arg, value }   (on success)
//!             or Rejected { request_id, arg, reason }   (on failure or panic)
//! ```
//!
//! Exactly one settlement follows every `Pending`. Overlapping requests are
//! not deduplicated and nothing is cancelled; slices decide what to do with
//! stale settlements by comparing request ids.

use crate::error::StoreError;
use crate::middleware::{Middleware, MiddlewareApi, Next};
use futures::FutureExt;
use futures::future::{self, BoxFuture};
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tideway_core::{Action, Lifecycle};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

/// A unit of deferred work carried inside an action
pub struct Thunk<S, A> {
    work: Arc<dyn Fn(&MiddlewareApi<S, A>) + Send + Sync>,
}

impl<S, A> Thunk<S, A> {
    /// Wrap a closure
    pub fn new<F>(work: F) -> Self
    where
        F: Fn(&MiddlewareApi<S, A>) + Send + Sync + 'static,
    {
        Self {
            work: Arc::new(work),
        }
    }

    /// Run the work
    pub fn run(&self, api: &MiddlewareApi<S, A>) {
        (self.work)(api);
    }
}

impl<S, A> Clone for Thunk<S, A> {
    fn clone(&self) -> Self {
        Self {
            work: Arc::clone(&self.work),
        }
    }
}

impl<S, A> fmt::Debug for Thunk<S, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Thunk(..)")
    }
}

/// Implemented by action types that can carry a [`Thunk`]
///
/// # Example
///
/// ```
/// use tideway_core::{Action, Lifecycle};
/// use tideway_runtime::{Deferrable, Thunk};
///
/// #[derive(Clone, Debug)]
/// enum Msg {
///     Set(u32),
///     Deferred(Thunk<u32, Msg>),
///     Lifecycle(Lifecycle),
/// }
///
/// impl Action for Msg {
///     fn action_type(&self) -> &str {
///         match self {
///             Self::Set(_) => "value/set",
///             Self::Deferred(_) => "value/deferred",
///             Self::Lifecycle(l) => l.action_type(),
///         }
///     }
/// }
///
/// impl Deferrable<u32> for Msg {
///     fn thunk(&self) -> Option<&Thunk<u32, Self>> {
///         match self {
///             Self::Deferred(thunk) => Some(thunk),
///             _ => None,
///         }
///     }
/// }
/// ```
pub trait Deferrable<S>: Sized {
    /// The deferred work, if this action carries one
    fn thunk(&self) -> Option<&Thunk<S, Self>>;
}

/// Runs thunk actions instead of forwarding them
///
/// Plain actions pass through untouched.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThunkMiddleware;

impl ThunkMiddleware {
    /// Create a thunk middleware
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl<S, A> Middleware<S, A> for ThunkMiddleware
where
    S: Send + Sync + 'static,
    A: Action + From<Lifecycle> + Deferrable<S>,
{
    fn handle(
        &self,
        api: &MiddlewareApi<S, A>,
        action: A,
        next: &Next<A>,
    ) -> Result<A, StoreError> {
        let Some(thunk) = action.thunk().cloned() else {
            return next.run(action);
        };
        tracing::trace!(action_type = action.action_type(), "Running thunk");
        thunk.run(api);
        Ok(action)
    }
}

/// Correlates the settlement of an async request with its `Pending` action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(u64);

impl RequestId {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Numeric value
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "req-{}", self.0)
    }
}

/// The three actions of one async request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AsyncPhase<Arg, T> {
    /// The request started
    Pending {
        /// Request correlation id
        request_id: RequestId,
        /// Argument the request was started with
        arg: Arg,
    },
    /// The request succeeded
    Fulfilled {
        /// Request correlation id
        request_id: RequestId,
        /// Argument the request was started with
        arg: Arg,
        /// The produced value
        value: T,
    },
    /// The request failed
    Rejected {
        /// Request correlation id
        request_id: RequestId,
        /// Argument the request was started with
        arg: Arg,
        /// Failure description
        reason: String,
    },
}

impl<Arg, T> AsyncPhase<Arg, T> {
    /// Request id shared by all three phases
    #[must_use]
    pub const fn request_id(&self) -> RequestId {
        match self {
            Self::Pending { request_id, .. }
            | Self::Fulfilled { request_id, .. }
            | Self::Rejected { request_id, .. } => *request_id,
        }
    }

    /// Argument shared by all three phases
    #[must_use]
    pub const fn arg(&self) -> &Arg {
        match self {
            Self::Pending { arg, .. } | Self::Fulfilled { arg, .. } | Self::Rejected { arg, .. } => {
                arg
            },
        }
    }

    /// `"pending"`, `"fulfilled"`, or `"rejected"`
    #[must_use]
    pub const fn suffix(&self) -> &'static str {
        match self {
            Self::Pending { .. } => "pending",
            Self::Fulfilled { .. } => "fulfilled",
            Self::Rejected { .. } => "rejected",
        }
    }
}

type Payload<S, A, Arg, T> =
    Arc<dyn Fn(Arg, MiddlewareApi<S, A>) -> BoxFuture<'static, anyhow::Result<T>> + Send + Sync>;

/// An async operation following the pending/fulfilled/rejected protocol
///
/// `wrap` embeds each [`AsyncPhase`] into the application's action type;
/// `payload` produces the future doing the actual work.
///
/// # Example
///
/// ```
/// use tideway_core::{Action, Lifecycle};
/// use tideway_runtime::{AsyncPhase, AsyncThunk};
///
/// #[derive(Clone, Debug)]
/// enum Msg {
///     Fetch(AsyncPhase<u32, String>),
///     Lifecycle(Lifecycle),
/// }
/// # impl Action for Msg {
/// #     fn action_type(&self) -> &str { "msg" }
/// # }
/// # impl From<Lifecycle> for Msg {
/// #     fn from(l: Lifecycle) -> Self { Self::Lifecycle(l) }
/// # }
///
/// let fetch_user: AsyncThunk<(), Msg, u32, String> = AsyncThunk::new(
///     "users/fetch",
///     Msg::Fetch,
///     |id, _api| async move { Ok::<_, anyhow::Error>(format!("user #{id}")) },
/// );
/// assert_eq!(fetch_user.type_prefix(), "users/fetch");
/// ```
pub struct AsyncThunk<S, A, Arg, T> {
    type_prefix: Arc<str>,
    wrap: Arc<dyn Fn(AsyncPhase<Arg, T>) -> A + Send + Sync>,
    payload: Payload<S, A, Arg, T>,
}

impl<S, A, Arg, T> Clone for AsyncThunk<S, A, Arg, T> {
    fn clone(&self) -> Self {
        Self {
            type_prefix: Arc::clone(&self.type_prefix),
            wrap: Arc::clone(&self.wrap),
            payload: Arc::clone(&self.payload),
        }
    }
}

impl<S, A, Arg, T> fmt::Debug for AsyncThunk<S, A, Arg, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncThunk")
            .field("type_prefix", &self.type_prefix)
            .finish_non_exhaustive()
    }
}

/// Handle to a started async request
#[derive(Debug)]
pub struct AsyncRequest {
    /// Id carried by all three phase actions
    pub request_id: RequestId,
    task: Option<JoinHandle<()>>,
}

impl AsyncRequest {
    /// Whether the request finished synchronously
    ///
    /// True when no runtime was available (settled as `Rejected`) or when
    /// `Pending` could not be dispatched (nothing ran).
    #[must_use]
    pub const fn settled_synchronously(&self) -> bool {
        self.task.is_none()
    }

    /// Wait until the settlement action has been dispatched
    pub async fn settled(self) -> RequestId {
        if let Some(task) = self.task {
            if let Err(error) = task.await {
                tracing::error!(request_id = %self.request_id, %error, "Async request task failed");
            }
        }
        self.request_id
    }
}

impl<S, A, Arg, T> AsyncThunk<S, A, Arg, T>
where
    S: Send + Sync + 'static,
    A: Action + From<Lifecycle>,
    Arg: Clone + Send + Sync + 'static,
    T: Send + 'static,
{
    /// Define an async operation
    ///
    /// # Arguments
    ///
    /// - `type_prefix`: Used in logs and metrics (`"<slice>/<operation>"`)
    /// - `wrap`: Embeds a phase into the action type
    /// - `payload`: Builds the future for one request
    pub fn new<W, F, Fut>(type_prefix: &str, wrap: W, payload: F) -> Self
    where
        W: Fn(AsyncPhase<Arg, T>) -> A + Send + Sync + 'static,
        F: Fn(Arg, MiddlewareApi<S, A>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        Self {
            type_prefix: Arc::from(type_prefix),
            wrap: Arc::new(wrap),
            payload: Arc::new(move |arg, api| payload(arg, api).boxed()),
        }
    }

    /// Operation name
    #[must_use]
    pub fn type_prefix(&self) -> &str {
        &self.type_prefix
    }

    /// A thunk action payload that starts this operation with `arg`
    #[must_use]
    pub fn thunk(&self, arg: Arg) -> Thunk<S, A> {
        let operation = self.clone();
        Thunk::new(move |api| {
            operation.start(api, arg.clone());
        })
    }

    /// Dispatch `Pending` now and run the payload on the ambient tokio runtime
    ///
    /// Without a runtime the request settles immediately as `Rejected`.
    /// Failures (including a payload that panics while building or polling
    /// its future) are reported through the `Rejected` action, never as an
    /// error to the caller. If `Pending` cannot be dispatched (the reducer
    /// rejects it, or the Store is gone) the payload is not run and no
    /// settlement follows.
    pub fn start(&self, api: &MiddlewareApi<S, A>, arg: Arg) -> AsyncRequest {
        let request_id = RequestId::next();
        tracing::debug!(operation = %self.type_prefix, %request_id, "Async request started");
        let pending = AsyncPhase::Pending {
            request_id,
            arg: arg.clone(),
        };
        if !self.settle_dispatch(api, pending) {
            metrics::counter!(
                "thunk.abandoned",
                "operation" => self.type_prefix.to_string()
            )
            .increment(1);
            return AsyncRequest {
                request_id,
                task: None,
            };
        }

        let Ok(runtime) = Handle::try_current() else {
            self.settle_dispatch(
                api,
                AsyncPhase::Rejected {
                    request_id,
                    arg,
                    reason: "no async runtime available".to_string(),
                },
            );
            return AsyncRequest {
                request_id,
                task: None,
            };
        };

        let operation = self.clone();
        let api = api.clone();
        let task = runtime.spawn(async move {
            let work = {
                let payload = Arc::clone(&operation.payload);
                let (arg, api) = (arg.clone(), api.clone());
                future::lazy(move |_| payload(arg, api)).flatten()
            };
            let phase = match AssertUnwindSafe(work).catch_unwind().await {
                Ok(Ok(value)) => AsyncPhase::Fulfilled {
                    request_id,
                    arg,
                    value,
                },
                Ok(Err(error)) => AsyncPhase::Rejected {
                    request_id,
                    arg,
                    reason: format!("{error:#}"),
                },
                Err(payload) => AsyncPhase::Rejected {
                    request_id,
                    arg,
                    reason: crate::panic_message(payload.as_ref()),
                },
            };
            operation.settle_dispatch(&api, phase);
        });

        AsyncRequest {
            request_id,
            task: Some(task),
        }
    }

    /// Dispatch one phase; `false` if it did not reach the Store
    fn settle_dispatch(&self, api: &MiddlewareApi<S, A>, phase: AsyncPhase<Arg, T>) -> bool {
        let suffix = phase.suffix();
        let request_id = phase.request_id();
        if suffix != "pending" {
            metrics::counter!(
                "thunk.settled",
                "operation" => self.type_prefix.to_string(),
                "outcome" => suffix
            )
            .increment(1);
        }
        if let AsyncPhase::Rejected { reason, .. } = &phase {
            tracing::error!(operation = %self.type_prefix, %request_id, %reason, "Async request rejected");
        }
        if let Err(error) = api.dispatch((self.wrap)(phase)) {
            tracing::warn!(
                operation = %self.type_prefix,
                %request_id,
                phase = suffix,
                %error,
                "Could not dispatch async phase"
            );
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_ids_increase() {
        let first = RequestId::next();
        let second = RequestId::next();
        assert!(second > first);
        assert_eq!(first.to_string(), format!("req-{}", first.get()));
    }

    #[test]
    fn test_phase_accessors() {
        let request_id = RequestId::next();
        let phase: AsyncPhase<u8, ()> = AsyncPhase::Rejected {
            request_id,
            arg: 9,
            reason: "timeout".into(),
        };
        assert_eq!(phase.request_id(), request_id);
        assert_eq!(*phase.arg(), 9);
        assert_eq!(phase.suffix(), "rejected");
    }

    #[test]
    fn test_thunk_debug_is_opaque() {
        let thunk: Thunk<(), ()> = Thunk::new(|_| {});
        assert_eq!(format!("{thunk:?}"), "Thunk(..)");
    }
}
