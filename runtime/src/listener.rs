//! Listener registry
//!
//! Listeners are zero-argument callbacks run after every commit. They read
//! state themselves through [`Store::get_state`](crate::Store::get_state).
//! Failures are isolated per listener and published on a side channel
//! instead of reaching the dispatch caller.

use crate::error::StoreError;
use chrono::{DateTime, Utc};
use smallvec::SmallVec;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::thread::{self, ThreadId};
use thiserror::Error;

/// A registered callback
pub(crate) type Listener = Arc<dyn Fn() -> anyhow::Result<()> + Send + Sync>;

/// Identity of one registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}

/// A listener failure, surfaced on [`Store::listener_errors`](crate::Store::listener_errors)
#[derive(Error, Debug, Clone)]
#[error("{listener} failed: {message}")]
pub struct ListenerError {
    /// Which registration failed
    pub listener: ListenerId,
    /// The returned error or panic message
    pub message: String,
    /// Whether the listener panicked rather than returning `Err`
    pub panicked: bool,
    /// When the failure was observed
    pub timestamp: DateTime<Utc>,
}

impl ListenerError {
    pub(crate) fn failed(listener: ListenerId, error: &anyhow::Error) -> Self {
        Self {
            listener,
            message: format!("{error:#}"),
            panicked: false,
            timestamp: Utc::now(),
        }
    }

    pub(crate) fn panicked(listener: ListenerId, message: String) -> Self {
        Self {
            listener,
            message,
            panicked: true,
            timestamp: Utc::now(),
        }
    }
}

/// Marks the thread currently running the root reducer
///
/// Checked by dispatch and by listener registry changes so a reducer cannot
/// mutate the Store it is being run by.
#[derive(Debug, Default)]
pub(crate) struct ReducingMarker {
    owner: Mutex<Option<ThreadId>>,
}

impl ReducingMarker {
    pub(crate) fn is_current_thread(&self) -> bool {
        let owner = self.owner.lock().unwrap_or_else(PoisonError::into_inner);
        *owner == Some(thread::current().id())
    }

    pub(crate) fn enter(&self) -> ReducingGuard<'_> {
        *self.owner.lock().unwrap_or_else(PoisonError::into_inner) = Some(thread::current().id());
        ReducingGuard { marker: self }
    }
}

/// Clears the marker on drop, including when a reducer panic unwinds
pub(crate) struct ReducingGuard<'a> {
    marker: &'a ReducingMarker,
}

impl Drop for ReducingGuard<'_> {
    fn drop(&mut self) {
        *self
            .marker
            .owner
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = None;
    }
}

#[derive(Default)]
struct Entries {
    next_id: u64,
    listeners: Vec<(ListenerId, Listener)>,
}

/// Ordered listener set shared between a Store and its subscriptions
#[derive(Default)]
pub(crate) struct ListenerRegistry {
    entries: Mutex<Entries>,
    marker: Arc<ReducingMarker>,
}

impl ListenerRegistry {
    pub(crate) fn new(marker: Arc<ReducingMarker>) -> Self {
        Self {
            entries: Mutex::default(),
            marker,
        }
    }

    fn ensure_not_reducing(&self) -> Result<(), StoreError> {
        if self.marker.is_current_thread() {
            return Err(StoreError::InvalidDispatchState(
                "listeners cannot change while the reducer is running",
            ));
        }
        Ok(())
    }

    pub(crate) fn add(&self, listener: Listener) -> Result<ListenerId, StoreError> {
        self.ensure_not_reducing()?;
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let id = ListenerId(entries.next_id);
        entries.next_id += 1;
        entries.listeners.push((id, listener));
        Ok(id)
    }

    pub(crate) fn remove(&self, id: ListenerId) -> Result<bool, StoreError> {
        self.ensure_not_reducing()?;
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let before = entries.listeners.len();
        entries.listeners.retain(|(existing, _)| *existing != id);
        Ok(entries.listeners.len() != before)
    }

    /// Copy of the current set, in subscription order
    pub(crate) fn snapshot(&self) -> SmallVec<[(ListenerId, Listener); 8]> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries
            .listeners
            .iter()
            .map(|(id, listener)| (*id, Arc::clone(listener)))
            .collect()
    }

    pub(crate) fn clear(&self) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .listeners
            .clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .listeners
            .len()
    }
}

/// Handle returned by [`Store::subscribe`](crate::Store::subscribe)
///
/// Dropping the handle does **not** unsubscribe; call
/// [`Subscription::unsubscribe`].
#[must_use = "dropping a Subscription leaves the listener registered"]
#[derive(Clone)]
pub struct Subscription {
    id: ListenerId,
    registry: Weak<ListenerRegistry>,
}

impl Subscription {
    pub(crate) fn new(id: ListenerId, registry: &Arc<ListenerRegistry>) -> Self {
        Self {
            id,
            registry: Arc::downgrade(registry),
        }
    }

    /// Identity of the registration
    #[must_use]
    pub const fn id(&self) -> ListenerId {
        self.id
    }

    /// Remove exactly this listener
    ///
    /// Idempotent: returns `Ok(false)` when the listener was already gone or
    /// the Store no longer exists. A notification already in progress still
    /// runs this listener; later ones do not.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidDispatchState`] when called from inside a
    /// reducer.
    pub fn unsubscribe(&self) -> Result<bool, StoreError> {
        match self.registry.upgrade() {
            Some(registry) => registry.remove(self.id),
            None => Ok(false),
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}
