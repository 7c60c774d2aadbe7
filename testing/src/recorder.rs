//! Commit recording and replay
//!
//! [`RecordingMiddleware`] wraps `dispatch` and records every
//! `(prior, action, next)` triple into a shared [`History`]. Because reducers
//! are deterministic, [`History::replay`] can re-derive each recorded state
//! from the first prior state alone.
//!
//! Register the recorder **last** so it sits right in front of the reducer:
//! it then sees exactly the actions that reach the reducer, and each triple
//! brackets a single transition.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Value, json};
use std::sync::{Arc, Mutex, PoisonError};
use tideway_core::{Action, Lifecycle, Reducer, ReducerError};
use tideway_runtime::{Middleware, MiddlewareApi, Next, StoreError};

/// One recorded transition
#[derive(Debug)]
pub struct Commit<S, A> {
    /// State before the action
    pub prior: Arc<S>,
    /// The action as it reached the reducer
    pub action: A,
    /// State after the action
    pub next: Arc<S>,
    /// When the transition was recorded
    pub recorded_at: DateTime<Utc>,
}

impl<S, A: Clone> Clone for Commit<S, A> {
    fn clone(&self) -> Self {
        Self {
            prior: Arc::clone(&self.prior),
            action: self.action.clone(),
            next: Arc::clone(&self.next),
            recorded_at: self.recorded_at,
        }
    }
}

impl<S, A> Commit<S, A> {
    /// Whether the transition produced a new state
    #[must_use]
    pub fn changed(&self) -> bool {
        !Arc::ptr_eq(&self.prior, &self.next)
    }
}

/// Shared, append-only log of commits
pub struct History<S, A> {
    commits: Arc<Mutex<Vec<Commit<S, A>>>>,
}

impl<S, A> Clone for History<S, A> {
    fn clone(&self) -> Self {
        Self {
            commits: Arc::clone(&self.commits),
        }
    }
}

impl<S, A> Default for History<S, A> {
    fn default() -> Self {
        Self {
            commits: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl<S, A: Clone> History<S, A> {
    /// Create an empty history
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, commit: Commit<S, A>) {
        self.commits
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(commit);
    }

    /// Copy of every recorded commit
    #[must_use]
    pub fn commits(&self) -> Vec<Commit<S, A>> {
        self.commits
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Recorded actions, in order
    #[must_use]
    pub fn actions(&self) -> Vec<A> {
        self.commits().into_iter().map(|commit| commit.action).collect()
    }

    /// State after each recorded action
    #[must_use]
    pub fn states(&self) -> Vec<Arc<S>> {
        self.commits().into_iter().map(|commit| commit.next).collect()
    }

    /// State after the `index`-th recorded action
    #[must_use]
    pub fn state_at(&self, index: usize) -> Option<Arc<S>> {
        self.commits
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(index)
            .map(|commit| Arc::clone(&commit.next))
    }

    /// Number of recorded commits
    #[must_use]
    pub fn len(&self) -> usize {
        self.commits
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether nothing has been recorded
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forget every recorded commit
    pub fn clear(&self) {
        self.commits
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Re-derive every recorded state by folding the recorded actions
    /// through `reducer`, starting from the first recorded prior state
    ///
    /// Returns one state per commit. An empty history replays to an empty
    /// list.
    ///
    /// # Errors
    ///
    /// Returns the first [`ReducerError`] the reducer produces.
    pub fn replay<R>(&self, reducer: &R) -> Result<Vec<Arc<S>>, ReducerError>
    where
        R: Reducer<State = S, Action = A> + ?Sized,
    {
        let commits = self.commits();
        let Some(first) = commits.first() else {
            return Ok(Vec::new());
        };

        let mut state = Arc::clone(&first.prior);
        let mut states = Vec::with_capacity(commits.len());
        for commit in &commits {
            state = reducer.reduce(&state, &commit.action)?;
            states.push(Arc::clone(&state));
        }
        Ok(states)
    }

    /// Export the history as a JSON array of `{action, prior, next, recorded_at}`
    ///
    /// # Errors
    ///
    /// Returns an error if a state or action fails to serialize.
    pub fn to_json(&self) -> Result<Value, serde_json::Error>
    where
        S: Serialize,
        A: Serialize,
    {
        self.commits()
            .iter()
            .map(|commit| {
                Ok(json!({
                    "action": serde_json::to_value(&commit.action)?,
                    "prior": serde_json::to_value(&*commit.prior)?,
                    "next": serde_json::to_value(&*commit.next)?,
                    "recorded_at": commit.recorded_at.to_rfc3339(),
                }))
            })
            .collect::<Result<Vec<_>, serde_json::Error>>()
            .map(Value::Array)
    }
}

/// Middleware that records every transition into a [`History`]
pub struct RecordingMiddleware<S, A> {
    history: History<S, A>,
}

impl<S, A: Clone> RecordingMiddleware<S, A> {
    /// A recorder and the history it writes to
    #[must_use]
    pub fn new() -> (Self, History<S, A>) {
        let history = History::new();
        (
            Self {
                history: history.clone(),
            },
            history,
        )
    }

    /// A recorder appending to an existing history
    #[must_use]
    pub const fn with_history(history: History<S, A>) -> Self {
        Self { history }
    }
}

impl<S, A> Middleware<S, A> for RecordingMiddleware<S, A>
where
    S: Send + Sync + 'static,
    A: Action + From<Lifecycle>,
{
    fn handle(
        &self,
        api: &MiddlewareApi<S, A>,
        action: A,
        next: &Next<A>,
    ) -> Result<A, StoreError> {
        let prior = api.get_state()?;
        let handled = next.run(action.clone())?;
        self.history.push(Commit {
            prior,
            action,
            next: api.get_state()?,
            recorded_at: Utc::now(),
        });
        Ok(handled)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::fixtures::{CounterState, SampleAction, counter_reducer, sample_root};
    use tideway_runtime::Store;

    #[test]
    fn test_records_each_transition() {
        let (recorder, history) = RecordingMiddleware::new();
        let store = Store::builder(counter_reducer())
            .middleware(recorder)
            .build()
            .unwrap();

        store.dispatch(SampleAction::Increment(2)).unwrap();
        store.dispatch(SampleAction::Unknown).unwrap();

        let commits = history.commits();
        assert_eq!(commits.len(), 2);
        assert_eq!(commits[0].next.value, 2);
        assert!(commits[0].changed());
        assert!(!commits[1].changed());
        assert_eq!(history.actions(), vec![SampleAction::Increment(2), SampleAction::Unknown]);
    }

    #[test]
    fn test_failed_transitions_are_not_recorded() {
        let (recorder, history) = RecordingMiddleware::new();
        let strict = tideway_core::reducer_fn(
            CounterState::default(),
            |state: &Arc<CounterState>, action: &SampleAction| match action {
                SampleAction::Unknown => Err(ReducerError::invalid("unknown action")),
                _ => Ok(Arc::clone(state)),
            },
        );
        let store = Store::builder(strict).middleware(recorder).build().unwrap();

        assert!(store.dispatch(SampleAction::Unknown).is_err());
        assert!(history.is_empty());
    }

    #[test]
    fn test_replay_reproduces_states() {
        let (recorder, history) = RecordingMiddleware::new();
        let store = Store::builder(sample_root())
            .middleware(recorder)
            .build()
            .unwrap();

        for action in [
            SampleAction::Increment(3),
            SampleAction::Flip,
            SampleAction::Decrement(1),
        ] {
            store.dispatch(action).unwrap();
        }

        let replayed = history.replay(&sample_root()).unwrap();
        let recorded = history.states();
        assert_eq!(replayed.len(), recorded.len());
        for (replayed, recorded) in replayed.iter().zip(&recorded) {
            assert_eq!(replayed.to_json().unwrap(), recorded.to_json().unwrap());
        }
        assert_eq!(
            history.state_at(2).unwrap().get::<CounterState>("counter").unwrap().value,
            2
        );
    }

    #[test]
    fn test_exports_json() {
        let (recorder, history) = RecordingMiddleware::new();
        let store = Store::builder(counter_reducer())
            .middleware(recorder)
            .build()
            .unwrap();
        store.dispatch(SampleAction::Increment(1)).unwrap();

        let exported = history.to_json().unwrap();
        assert_eq!(exported[0]["action"], json!({ "Increment": 1 }));
        assert_eq!(exported[0]["prior"], json!({ "value": 0 }));
        assert_eq!(exported[0]["next"], json!({ "value": 1 }));

        history.clear();
        assert!(history.is_empty());
        assert_eq!(history.to_json().unwrap(), json!([]));
    }
}
