//! Listener notification probe
//!
//! A [`NotificationProbe`] subscribes to a Store and captures the state seen
//! at every notification. Async tests can wait for a given number of
//! notifications (for example a thunk's `Pending` then its settlement).

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tideway_core::{Action, Lifecycle};
use tideway_runtime::{Store, StoreError, Subscription};
use tokio::sync::Notify;

/// Captures every state a listener observes
pub struct NotificationProbe<S> {
    seen: Arc<Mutex<Vec<Arc<S>>>>,
    notify: Arc<Notify>,
    subscription: Subscription,
}

impl<S> NotificationProbe<S>
where
    S: Send + Sync + 'static,
{
    /// Subscribe a capturing listener to `store`
    ///
    /// # Errors
    ///
    /// Returns the error of [`Store::subscribe`].
    pub fn attach<A>(store: &Store<S, A>) -> Result<Self, StoreError>
    where
        A: Action + From<Lifecycle>,
    {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let notify = Arc::new(Notify::new());
        let api = store.api();

        let sink = Arc::clone(&seen);
        let wake = Arc::clone(&notify);
        let subscription = store.subscribe(move || {
            let state = api.get_state()?;
            sink.lock().unwrap_or_else(PoisonError::into_inner).push(state);
            wake.notify_waiters();
            Ok(())
        })?;

        Ok(Self {
            seen,
            notify,
            subscription,
        })
    }

    /// Number of notifications observed
    #[must_use]
    pub fn count(&self) -> usize {
        self.seen.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// State observed at each notification, in order
    #[must_use]
    pub fn states(&self) -> Vec<Arc<S>> {
        self.seen.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// State observed at the latest notification
    #[must_use]
    pub fn last(&self) -> Option<Arc<S>> {
        self.seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .cloned()
    }

    /// Wait until at least `count` notifications have been observed
    ///
    /// Returns `false` if `timeout` elapsed first.
    pub async fn wait_for(&self, count: usize, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notified = self.notify.notified();
            if self.count() >= count {
                return true;
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.count() >= count;
            }
        }
    }

    /// Stop observing
    ///
    /// # Errors
    ///
    /// Returns the error of [`Subscription::unsubscribe`].
    pub fn detach(&self) -> Result<bool, StoreError> {
        self.subscription.unsubscribe()
    }
}
