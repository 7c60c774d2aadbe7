//! The Store
//!
//! The Store is the only mutable entity. It owns:
//!
//! - the current state (`Arc<S>`, replaced on every changing commit),
//! - the root reducer (hot-swappable through [`Store::replace_reducer`]),
//! - the middleware chain (composed once, immutable afterwards),
//! - the listener registry.
//!
//! # Atomicity
//!
//! The reducer runs under a per-store commit lock and a re-entrancy marker.
//! Either the whole transition is committed or nothing is: a reducer error or
//! panic leaves the previous state in place. Listeners run after the lock is
//! released and always observe a fully committed state.
//!
//! # Re-entrancy
//!
//! The marker only covers the reducer call. Middleware can dispatch further
//! actions synchronously; those are processed depth-first, listeners
//! included, before the outer middleware continues. A reducer that tries to
//! dispatch on its own thread gets [`StoreError::InvalidDispatchState`].
//! Dispatches from other threads wait for the commit lock.

use crate::error::StoreError;
use crate::listener::{ListenerError, ListenerRegistry, ReducingMarker, Subscription};
use crate::middleware::{Middleware, MiddlewareApi, Next, compose};
use crate::{StoreConfig, panic_message};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};
use std::time::Instant;
use tideway_core::{Action, Lifecycle, Reducer, ReducerError};
use tokio::sync::broadcast;

type RootReducer<S, A> = Arc<dyn Reducer<State = S, Action = A>>;

/// Shared Store internals
///
/// Middleware API handles hold a `Weak` to this.
pub(crate) struct StoreInner<S, A> {
    config: StoreConfig,
    state: RwLock<Arc<S>>,
    reducer: RwLock<RootReducer<S, A>>,
    chain: Next<A>,
    listeners: Arc<ListenerRegistry>,
    marker: Arc<ReducingMarker>,
    commit: Mutex<()>,
    closed: AtomicBool,
    listener_errors: broadcast::Sender<ListenerError>,
}

impl<S, A> StoreInner<S, A>
where
    S: Send + Sync + 'static,
    A: Action + From<Lifecycle>,
{
    pub(crate) fn get_state(&self) -> Arc<S> {
        Arc::clone(&self.state.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Snapshot for callers outside the commit path
    ///
    /// Reading from inside the reducer returns the prior state and is logged.
    pub(crate) fn observe_state(&self) -> Arc<S> {
        if self.marker.is_current_thread() {
            metrics::counter!(
                "store.get_state.reentrant",
                "store" => self.config.name.clone()
            )
            .increment(1);
            tracing::warn!(store = %self.config.name, "State read from inside the reducer");
        }
        self.get_state()
    }

    fn current_reducer(&self) -> RootReducer<S, A> {
        Arc::clone(&self.reducer.read().unwrap_or_else(PoisonError::into_inner))
    }

    fn ensure_dispatchable(&self) -> Result<(), StoreError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StoreError::ShutDown);
        }
        if self.marker.is_current_thread() {
            metrics::counter!(
                "store.dispatch.failed",
                "store" => self.config.name.clone(),
                "reason" => "reentrant"
            )
            .increment(1);
            tracing::warn!(store = %self.config.name, "Dispatch attempted from inside the reducer");
            return Err(StoreError::InvalidDispatchState(
                "cannot dispatch while the reducer is running",
            ));
        }
        Ok(())
    }

    /// Entry point of the chain
    pub(crate) fn dispatch(&self, action: A) -> Result<A, StoreError> {
        self.ensure_dispatchable()?;
        metrics::counter!("store.dispatch.total", "store" => self.config.name.clone()).increment(1);

        let result = self.chain.run(action);
        if result.is_err() {
            metrics::counter!(
                "store.dispatch.failed",
                "store" => self.config.name.clone(),
                "reason" => "error"
            )
            .increment(1);
        }
        result
    }

    /// Terminal step of the chain: reduce, commit, notify
    fn reduce_and_commit(&self, action: A) -> Result<A, StoreError> {
        self.ensure_dispatchable()?;
        {
            let _commit = self.commit.lock().unwrap_or_else(PoisonError::into_inner);
            let reducer = self.current_reducer();
            let prior = self.get_state();
            let next = self
                .guarded_reduce(reducer.as_ref(), &prior, &action)
                .map_err(|error| {
                    tracing::warn!(
                        store = %self.config.name,
                        action_type = action.action_type(),
                        %error,
                        "Transition rejected, state left unchanged"
                    );
                    StoreError::from(error)
                })?;
            self.commit_state(&prior, next, action.action_type());
        }
        self.notify();
        Ok(action)
    }

    /// Run `Lifecycle::Init` over the starting state; listeners are not notified
    fn initialize(&self) -> Result<(), StoreError> {
        let _commit = self.commit.lock().unwrap_or_else(PoisonError::into_inner);
        let reducer = self.current_reducer();
        let prior = self.get_state();
        let next = self.guarded_reduce(reducer.as_ref(), &prior, &A::from(Lifecycle::Init))?;
        self.commit_state(&prior, next, Lifecycle::INIT_TYPE);
        Ok(())
    }

    fn replace_reducer(&self, reducer: RootReducer<S, A>) -> Result<(), StoreError> {
        self.ensure_dispatchable()?;
        {
            let _commit = self.commit.lock().unwrap_or_else(PoisonError::into_inner);
            let prior = self.get_state();
            let next = self
                .guarded_reduce(reducer.as_ref(), &prior, &A::from(Lifecycle::Replace))
                .map_err(|error| {
                    tracing::warn!(store = %self.config.name, %error, "Replacement reducer rejected, keeping previous");
                    StoreError::from(error)
                })?;
            *self.reducer.write().unwrap_or_else(PoisonError::into_inner) = reducer;
            self.commit_state(&prior, next, Lifecycle::REPLACE_TYPE);
        }
        tracing::info!(store = %self.config.name, "Root reducer replaced");
        self.notify();
        Ok(())
    }

    /// Call the reducer with the re-entrancy marker held
    fn guarded_reduce(
        &self,
        reducer: &dyn Reducer<State = S, Action = A>,
        prior: &Arc<S>,
        action: &A,
    ) -> Result<Arc<S>, ReducerError> {
        let _reducing = self.marker.enter();
        let start = Instant::now();

        let result = if self.config.catch_reducer_panics {
            panic::catch_unwind(AssertUnwindSafe(|| reducer.reduce(prior, action))).unwrap_or_else(
                |payload| Err(ReducerError::Panicked(panic_message(payload.as_ref()))),
            )
        } else {
            reducer.reduce(prior, action)
        };

        metrics::histogram!("store.reduce.duration_seconds", "store" => self.config.name.clone())
            .record(start.elapsed().as_secs_f64());
        result
    }

    fn commit_state(&self, prior: &Arc<S>, next: Arc<S>, action_type: &str) {
        if Arc::ptr_eq(prior, &next) {
            tracing::debug!(store = %self.config.name, action_type, "Transition left state unchanged");
        } else {
            *self.state.write().unwrap_or_else(PoisonError::into_inner) = next;
            tracing::trace!(store = %self.config.name, action_type, "State committed");
        }
    }

    /// Run every listener registered before this call, in subscription order
    fn notify(&self) {
        for (id, listener) in self.listeners.snapshot() {
            let outcome = if self.config.catch_listener_panics {
                panic::catch_unwind(AssertUnwindSafe(|| listener()))
            } else {
                Ok(listener())
            };

            let failure = match outcome {
                Ok(Ok(())) => continue,
                Ok(Err(error)) => ListenerError::failed(id, &error),
                Err(payload) => ListenerError::panicked(id, panic_message(payload.as_ref())),
            };
            self.report_listener_error(failure);
        }
    }

    fn report_listener_error(&self, error: ListenerError) {
        metrics::counter!("store.listener.failures", "store" => self.config.name.clone())
            .increment(1);
        tracing::error!(
            store = %self.config.name,
            listener = %error.listener,
            panicked = error.panicked,
            message = %error.message,
            "Listener failed"
        );
        // Nobody listening on the side channel is fine
        let _ = self.listener_errors.send(error);
    }
}

/// The state container
///
/// A cheap, cloneable handle; every clone refers to the same Store.
///
/// # Type Parameters
///
/// - `S`: State type
/// - `A`: Action type; must be buildable from the [`Lifecycle`] sentinels
pub struct Store<S, A> {
    inner: Arc<StoreInner<S, A>>,
}

impl<S, A> Clone for Store<S, A> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S, A> fmt::Debug for Store<S, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("name", &self.inner.config.name)
            .field("listeners", &self.inner.listeners.len())
            .field("closed", &self.inner.closed.load(Ordering::Acquire))
            .finish_non_exhaustive()
    }
}

impl<S, A> Store<S, A>
where
    S: Send + Sync + 'static,
    A: Action + From<Lifecycle>,
{
    /// Build a Store with no middleware, starting from the reducer's initial state
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::TransitionFunction`] if the reducer rejects
    /// [`Lifecycle::Init`].
    pub fn new<R>(reducer: R) -> Result<Self, StoreError>
    where
        R: Reducer<State = S, Action = A> + 'static,
    {
        Self::builder(reducer).build()
    }

    /// Start configuring a Store
    #[must_use]
    pub fn builder<R>(reducer: R) -> StoreBuilder<S, A>
    where
        R: Reducer<State = S, Action = A> + 'static,
    {
        StoreBuilder {
            reducer: Arc::new(reducer),
            preloaded: None,
            middleware: Vec::new(),
            config: StoreConfig::default(),
        }
    }

    /// The last committed state
    ///
    /// An `Arc` clone; never waits on a running reducer for longer than the
    /// pointer swap.
    ///
    /// Reducers must not call this. Unlike [`Store::dispatch`] it cannot fail,
    /// so a call from inside the reducer returns the state the reducer was
    /// given and logs a warning.
    #[must_use]
    pub fn get_state(&self) -> Arc<S> {
        self.inner.observe_state()
    }

    /// Dispatch an action through the middleware chain to the reducer
    ///
    /// Returns the action as it came out of the chain (middleware may
    /// transform or swallow it).
    ///
    /// # Errors
    ///
    /// - [`StoreError::InvalidDispatchState`] when called from inside the reducer
    /// - [`StoreError::TransitionFunction`] when the reducer fails; nothing is committed
    /// - [`StoreError::ShutDown`] after [`Store::teardown`]
    /// - whatever a middleware chooses to return
    #[tracing::instrument(
        skip(self, action),
        name = "store_dispatch",
        fields(store = %self.inner.config.name, action_type = action.action_type())
    )]
    pub fn dispatch(&self, action: A) -> Result<A, StoreError> {
        self.inner.dispatch(action)
    }

    /// Register a listener, run after every commit
    ///
    /// A listener added while a notification is in progress is first run on
    /// the next dispatch. Returning `Err` (or panicking) is reported on
    /// [`Store::listener_errors`] and does not stop later listeners.
    ///
    /// # Errors
    ///
    /// - [`StoreError::InvalidDispatchState`] when called from inside the reducer
    /// - [`StoreError::ShutDown`] after [`Store::teardown`]
    pub fn subscribe<F>(&self, listener: F) -> Result<Subscription, StoreError>
    where
        F: Fn() -> anyhow::Result<()> + Send + Sync + 'static,
    {
        if self.is_closed() {
            return Err(StoreError::ShutDown);
        }
        let id = self.inner.listeners.add(Arc::new(listener))?;
        tracing::trace!(store = %self.inner.config.name, listener = %id, "Listener subscribed");
        Ok(Subscription::new(id, &self.inner.listeners))
    }

    /// Hot-swap the root reducer
    ///
    /// Runs [`Lifecycle::Replace`] through the new reducer (bypassing
    /// middleware), commits, and notifies listeners. If that transition
    /// fails, the previous reducer and state stay in place.
    ///
    /// # Errors
    ///
    /// Same as [`Store::dispatch`].
    pub fn replace_reducer<R>(&self, reducer: R) -> Result<(), StoreError>
    where
        R: Reducer<State = S, Action = A> + 'static,
    {
        self.inner.replace_reducer(Arc::new(reducer))
    }

    /// Clear every listener and refuse further dispatches
    pub fn teardown(&self) {
        self.inner.closed.store(true, Ordering::Release);
        self.inner.listeners.clear();
        tracing::info!(store = %self.inner.config.name, "Store torn down");
    }

    /// Whether [`Store::teardown`] has been called
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Dispatch and state access for collaborators outside the chain
    #[must_use]
    pub fn api(&self) -> MiddlewareApi<S, A> {
        MiddlewareApi::new(Arc::downgrade(&self.inner))
    }

    /// Receive every listener failure from now on
    #[must_use]
    pub fn listener_errors(&self) -> broadcast::Receiver<ListenerError> {
        self.inner.listener_errors.subscribe()
    }

    /// Number of registered listeners
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.inner.listeners.len()
    }

    /// The configured store name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.config.name
    }
}

/// Builder for [`Store`]
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use tideway_core::{Action, Lifecycle, ReducerError, reducer_fn};
/// use tideway_runtime::{LoggingMiddleware, Store, StoreConfig};
///
/// #[derive(Clone, Debug)]
/// enum Msg {
///     Add(u32),
///     Lifecycle(Lifecycle),
/// }
///
/// impl Action for Msg {
///     fn action_type(&self) -> &str {
///         match self {
///             Self::Add(_) => "total/add",
///             Self::Lifecycle(l) => l.action_type(),
///         }
///     }
/// }
///
/// impl From<Lifecycle> for Msg {
///     fn from(l: Lifecycle) -> Self {
///         Self::Lifecycle(l)
///     }
/// }
///
/// let reducer = reducer_fn(0_u32, |state: &Arc<u32>, msg: &Msg| {
///     Ok::<_, ReducerError>(match msg {
///         Msg::Add(n) => Arc::new(**state + n),
///         Msg::Lifecycle(_) => Arc::clone(state),
///     })
/// });
///
/// let store = Store::builder(reducer)
///     .preloaded_state(10)
///     .middleware(LoggingMiddleware::new())
///     .config(StoreConfig::default().with_name("totals"))
///     .build()?;
///
/// store.dispatch(Msg::Add(5))?;
/// assert_eq!(*store.get_state(), 15);
/// # Ok::<(), tideway_runtime::StoreError>(())
/// ```
pub struct StoreBuilder<S, A> {
    reducer: RootReducer<S, A>,
    preloaded: Option<Arc<S>>,
    middleware: Vec<Arc<dyn Middleware<S, A>>>,
    config: StoreConfig,
}

impl<S, A> StoreBuilder<S, A>
where
    S: Send + Sync + 'static,
    A: Action + From<Lifecycle>,
{
    /// Start from `state` instead of the reducer's initial state
    #[must_use]
    pub fn preloaded_state(mut self, state: impl Into<Arc<S>>) -> Self {
        self.preloaded = Some(state.into());
        self
    }

    /// Append a middleware; the first one added sees actions first
    #[must_use]
    pub fn middleware<M>(mut self, middleware: M) -> Self
    where
        M: Middleware<S, A>,
    {
        self.middleware.push(Arc::new(middleware));
        self
    }

    /// Use a custom configuration
    #[must_use]
    pub fn config(mut self, config: StoreConfig) -> Self {
        self.config = config;
        self
    }

    /// Compose the chain and run [`Lifecycle::Init`]
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::TransitionFunction`] if the reducer rejects
    /// `Init`.
    pub fn build(self) -> Result<Store<S, A>, StoreError> {
        let Self {
            reducer,
            preloaded,
            middleware,
            config,
        } = self;

        let start = preloaded.unwrap_or_else(|| reducer.initial_state());
        let (listener_errors, _) = broadcast::channel(config.listener_error_capacity.max(1));
        let marker = Arc::new(ReducingMarker::default());
        let listeners = Arc::new(ListenerRegistry::new(Arc::clone(&marker)));
        let layers = middleware.len();

        let inner = Arc::new_cyclic(|weak: &Weak<StoreInner<S, A>>| {
            let target = Weak::clone(weak);
            let terminal = Next::new(move |action: A| {
                target
                    .upgrade()
                    .ok_or(StoreError::Dropped)?
                    .reduce_and_commit(action)
            });

            StoreInner {
                chain: compose(&MiddlewareApi::new(Weak::clone(weak)), middleware, terminal),
                config,
                state: RwLock::new(start),
                reducer: RwLock::new(reducer),
                listeners,
                marker,
                commit: Mutex::new(()),
                closed: AtomicBool::new(false),
                listener_errors,
            }
        });

        inner.initialize()?;
        tracing::debug!(store = %inner.config.name, middleware = layers, "Store initialized");
        Ok(Store { inner })
    }
}
