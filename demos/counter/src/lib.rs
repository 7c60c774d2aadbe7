//! # Counter Demo
//!
//! A counter and a theme toggle mounted side by side in one Store.
//!
//! This demo showcases:
//! - Two slices combined under `counter` and `theme`
//! - Middleware: thunks first, then logging
//! - An async thunk loading a remote count (pending, then fulfilled or rejected)
//! - A memoized selector deriving a label from the counter slice
//!
//! ## Example
//!
//! ```
//! use counter_demo::{CounterAction, build_store, count};
//!
//! let store = build_store()?;
//! store.dispatch(CounterAction::Increment)?;
//! store.dispatch(CounterAction::IncrementBy(4))?;
//! assert_eq!(count(&store.get_state()).value, 5);
//! # Ok::<(), tideway_runtime::StoreError>(())
//! ```

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tideway_core::{
    Action, CombinedReducer, CombinedState, Draft, Lifecycle, ReducerError, Selector, Slice,
    combine_reducers, create_selector,
};
use tideway_runtime::{
    AsyncPhase, AsyncThunk, Deferrable, LoggingMiddleware, Store, StoreConfig, StoreError, Thunk,
    ThunkMiddleware,
};

/// Store state handled by this demo
pub type AppStore = Store<CombinedState, CounterAction>;

/// Counter slice state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CounterState {
    /// Current count value
    pub value: i64,
    /// A remote load is in flight
    pub loading: bool,
    /// Request id of the latest remote load
    pub latest_request: Option<u64>,
    /// Reason the latest remote load failed
    pub error: Option<String>,
}

/// Color theme
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum Theme {
    /// Light background
    #[default]
    Light,
    /// Dark background
    Dark,
}

/// Every action the demo understands
#[derive(Debug, Clone)]
pub enum CounterAction {
    /// Add one
    Increment,
    /// Subtract one
    Decrement,
    /// Add an arbitrary amount
    IncrementBy(i64),
    /// Back to zero
    Reset,
    /// Switch between light and dark
    ToggleTheme,
    /// Remote count load, keyed by the seed it was started with
    LoadRemote(AsyncPhase<u32, i64>),
    /// Deferred work run by the thunk middleware
    Deferred(Thunk<CombinedState, CounterAction>),
    /// Store sentinel
    Lifecycle(Lifecycle),
}

impl Action for CounterAction {
    fn action_type(&self) -> &str {
        match self {
            Self::Increment => "counter/increment",
            Self::Decrement => "counter/decrement",
            Self::IncrementBy(_) => "counter/incrementBy",
            Self::Reset => "counter/reset",
            Self::ToggleTheme => "theme/toggle",
            Self::LoadRemote(AsyncPhase::Pending { .. }) => "counter/loadRemote/pending",
            Self::LoadRemote(AsyncPhase::Fulfilled { .. }) => "counter/loadRemote/fulfilled",
            Self::LoadRemote(AsyncPhase::Rejected { .. }) => "counter/loadRemote/rejected",
            Self::Deferred(_) => "thunk",
            Self::Lifecycle(l) => l.action_type(),
        }
    }

    fn lifecycle(&self) -> Option<Lifecycle> {
        match self {
            Self::Lifecycle(l) => Some(*l),
            _ => None,
        }
    }
}

impl From<Lifecycle> for CounterAction {
    fn from(l: Lifecycle) -> Self {
        Self::Lifecycle(l)
    }
}

impl Deferrable<CombinedState> for CounterAction {
    fn thunk(&self) -> Option<&Thunk<CombinedState, Self>> {
        match self {
            Self::Deferred(thunk) => Some(thunk),
            _ => None,
        }
    }
}

/// The `counter` slice
///
/// Settlements of anything but the latest remote load are ignored.
#[derive(Debug, Clone, Copy, Default)]
pub struct CounterSlice;

impl Slice for CounterSlice {
    type State = CounterState;
    type Action = CounterAction;

    fn name(&self) -> &str {
        "counter"
    }

    fn initial_state(&self) -> CounterState {
        CounterState::default()
    }

    fn reduce(
        &self,
        draft: &mut Draft<CounterState>,
        action: &CounterAction,
    ) -> Result<(), ReducerError> {
        match action {
            CounterAction::Increment => draft.get_mut().value += 1,
            CounterAction::Decrement => draft.get_mut().value -= 1,
            CounterAction::IncrementBy(amount) => {
                let value = draft
                    .value
                    .checked_add(*amount)
                    .ok_or_else(|| ReducerError::invalid("counter overflow"))?;
                draft.get_mut().value = value;
            },
            CounterAction::Reset => {
                if draft.value != 0 {
                    draft.get_mut().value = 0;
                }
            },
            CounterAction::LoadRemote(phase) => apply_remote(draft, phase),
            CounterAction::ToggleTheme
            | CounterAction::Deferred(_)
            | CounterAction::Lifecycle(_) => {},
        }
        Ok(())
    }
}

fn apply_remote(draft: &mut Draft<CounterState>, phase: &AsyncPhase<u32, i64>) {
    let request = phase.request_id().get();
    match phase {
        AsyncPhase::Pending { .. } => {
            let state = draft.get_mut();
            state.loading = true;
            state.latest_request = Some(request);
            state.error = None;
        },
        _ if draft.latest_request != Some(request) => {
            tracing::debug!(request, "Ignoring stale remote load");
        },
        AsyncPhase::Fulfilled { value, .. } => {
            let state = draft.get_mut();
            state.loading = false;
            state.value = *value;
        },
        AsyncPhase::Rejected { reason, .. } => {
            let state = draft.get_mut();
            state.loading = false;
            state.error = Some(reason.clone());
        },
    }
}

/// The `theme` slice
#[derive(Debug, Clone, Copy, Default)]
pub struct ThemeSlice;

impl Slice for ThemeSlice {
    type State = Theme;
    type Action = CounterAction;

    fn name(&self) -> &str {
        "theme"
    }

    fn initial_state(&self) -> Theme {
        Theme::Light
    }

    fn reduce(&self, draft: &mut Draft<Theme>, action: &CounterAction) -> Result<(), ReducerError> {
        if matches!(action, CounterAction::ToggleTheme) {
            let next = match **draft {
                Theme::Light => Theme::Dark,
                Theme::Dark => Theme::Light,
            };
            draft.set(next);
        }
        Ok(())
    }
}

/// Both slices combined
#[must_use]
pub fn app_reducer() -> CombinedReducer<CounterAction> {
    combine_reducers().slice(CounterSlice).slice(ThemeSlice)
}

/// Store with thunk and logging middleware
///
/// # Errors
///
/// Returns the error of [`tideway_runtime::StoreBuilder::build`].
pub fn build_store() -> Result<AppStore, StoreError> {
    Store::builder(app_reducer())
        .middleware(ThunkMiddleware::new())
        .middleware(LoggingMiddleware::new())
        .config(StoreConfig::default().with_name("counter-demo"))
        .build()
}

/// The counter slice of `state`
#[must_use]
pub fn count(state: &CombinedState) -> Arc<CounterState> {
    state.get::<CounterState>("counter").unwrap_or_default()
}

/// The theme slice of `state`
#[must_use]
pub fn theme(state: &CombinedState) -> Arc<Theme> {
    state.get::<Theme>("theme").unwrap_or_default()
}

/// Simulated remote count: ten times the seed, after `latency`
///
/// A zero seed fails.
#[must_use]
pub fn load_remote_count(latency: Duration) -> AsyncThunk<CombinedState, CounterAction, u32, i64> {
    AsyncThunk::new("counter/loadRemote", CounterAction::LoadRemote, move |seed: u32, _api| async move {
        tokio::time::sleep(latency).await;
        if seed == 0 {
            anyhow::bail!("remote counter unavailable");
        }
        Ok(i64::from(seed) * 10)
    })
}

type LabelInputs = (fn(&CombinedState) -> Arc<CounterState>, fn(&CombinedState) -> Arc<Theme>);
type LabelCombiner = fn(&(Arc<CounterState>, Arc<Theme>)) -> String;

/// Memoized status line, recomputed only when a slice it reads changes
pub type LabelSelector = Selector<CombinedState, LabelInputs, String, LabelCombiner>;

/// Build the status-line selector
#[must_use]
pub fn status_label() -> LabelSelector {
    create_selector(
        (count as fn(&CombinedState) -> Arc<CounterState>, theme as fn(&CombinedState) -> Arc<Theme>),
        render_label as LabelCombiner,
    )
}

fn render_label((counter, theme): &(Arc<CounterState>, Arc<Theme>)) -> String {
    let mode = match **theme {
        Theme::Light => "light",
        Theme::Dark => "dark",
    };
    if counter.loading {
        format!("count {} (loading) [{mode}]", counter.value)
    } else {
        format!("count {} [{mode}]", counter.value)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use tideway_core::Reducer;
    use tideway_testing::ReducerTest;

    #[test]
    fn test_increment() {
        ReducerTest::new(tideway_core::SliceReducer::new(CounterSlice))
            .when_action(CounterAction::Increment)
            .then_state(|state: &CounterState| assert_eq!(state.value, 1))
            .run();
    }

    #[test]
    fn test_reset_at_zero_keeps_identity() {
        ReducerTest::new(tideway_core::SliceReducer::new(CounterSlice))
            .when_action(CounterAction::Reset)
            .then_unchanged()
            .run();
    }

    #[test]
    fn test_overflow_is_rejected() {
        ReducerTest::new(tideway_core::SliceReducer::new(CounterSlice))
            .given_state(CounterState {
                value: i64::MAX,
                ..CounterState::default()
            })
            .when_action(CounterAction::IncrementBy(1))
            .then_error(|error| assert_eq!(*error, ReducerError::invalid("counter overflow")))
            .run();
    }

    #[test]
    fn test_toggle_theme_leaves_counter() {
        let root = app_reducer();
        let before = root.initial_state();
        let after = root.reduce(&before, &CounterAction::ToggleTheme).unwrap();
        assert_eq!(*theme(&after), Theme::Dark);
        assert!(Arc::ptr_eq(&count(&before), &count(&after)));
    }

    #[test]
    fn test_status_label_is_memoized() {
        let store = build_store().unwrap();
        let label = status_label();

        assert_eq!(label.select(&store.get_state()).as_str(), "count 0 [light]");
        store.dispatch(CounterAction::Increment).unwrap();
        store.dispatch(CounterAction::ToggleTheme).unwrap();
        assert_eq!(label.select(&store.get_state()).as_str(), "count 1 [dark]");
        label.select(&store.get_state());
        assert_eq!(label.recomputations(), 2);
    }
}
