//! Integration tests for the listener registry
//!
//! Notification order, snapshot semantics when the listener set changes
//! mid-notification, and isolation of failing listeners.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic

use std::sync::{Arc, Mutex, OnceLock};
use tideway_runtime::{Store, StoreConfig, Subscription};
use tideway_testing::NotificationProbe;
use tideway_testing::fixtures::{CounterState, SampleAction, counter_reducer};

// ============================================================================
// Test Fixtures
// ============================================================================

type Log = Arc<Mutex<Vec<String>>>;

fn store() -> Store<CounterState, SampleAction> {
    Store::new(counter_reducer()).unwrap()
}

fn recording(log: &Log, name: &'static str) -> impl Fn() -> anyhow::Result<()> + Send + Sync + 'static {
    let log = Arc::clone(log);
    move || {
        log.lock().unwrap().push(name.to_string());
        Ok(())
    }
}

fn drain(log: &Log) -> Vec<String> {
    std::mem::take(&mut *log.lock().unwrap())
}

// ============================================================================
// Tests
// ============================================================================

#[test]
fn test_notification_order_matches_subscription_order() {
    let store = store();
    let log: Log = Arc::default();
    let _a = store.subscribe(recording(&log, "a")).unwrap();
    let _b = store.subscribe(recording(&log, "b")).unwrap();
    let _c = store.subscribe(recording(&log, "c")).unwrap();

    store.dispatch(SampleAction::Increment(1)).unwrap();
    assert_eq!(drain(&log), vec!["a", "b", "c"]);
}

#[test]
fn test_listeners_notified_even_for_unchanged_state() {
    let store = store();
    let probe = NotificationProbe::attach(&store).unwrap();
    store.dispatch(SampleAction::Unknown).unwrap();
    assert_eq!(probe.count(), 1);
}

#[test]
fn test_listener_reads_committed_state() {
    let store = store();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let api = store.api();
    let sink = Arc::clone(&seen);
    let _subscription = store
        .subscribe(move || {
            sink.lock().unwrap().push(api.get_state()?.value);
            Ok(())
        })
        .unwrap();

    store.dispatch(SampleAction::Increment(3)).unwrap();
    store.dispatch(SampleAction::Decrement(1)).unwrap();
    assert_eq!(*seen.lock().unwrap(), vec![3, 2]);
}

#[test]
fn test_unsubscribe_during_notification_applies_next_time() {
    let store = store();
    let log: Log = Arc::default();
    let victim: Arc<OnceLock<Subscription>> = Arc::new(OnceLock::new());

    let killer_log = Arc::clone(&log);
    let target = Arc::clone(&victim);
    let _killer = store
        .subscribe(move || {
            killer_log.lock().unwrap().push("killer".to_string());
            if let Some(subscription) = target.get() {
                subscription.unsubscribe()?;
            }
            Ok(())
        })
        .unwrap();
    victim.set(store.subscribe(recording(&log, "victim")).unwrap()).unwrap();

    store.dispatch(SampleAction::Increment(1)).unwrap();
    // The in-progress notification still reaches the victim
    assert_eq!(drain(&log), vec!["killer", "victim"]);

    store.dispatch(SampleAction::Increment(1)).unwrap();
    assert_eq!(drain(&log), vec!["killer"]);
    assert_eq!(store.listener_count(), 1);
}

#[test]
fn test_subscribe_during_notification_applies_next_time() {
    let store = store();
    let log: Log = Arc::default();
    let late: Arc<Mutex<Vec<Subscription>>> = Arc::default();

    let handle = store.clone();
    let adder_log = Arc::clone(&log);
    let added = Arc::clone(&late);
    let _adder = store
        .subscribe(move || {
            adder_log.lock().unwrap().push("adder".to_string());
            let mut added = added.lock().unwrap();
            if added.is_empty() {
                added.push(handle.subscribe(recording(&adder_log, "late"))?);
            }
            Ok(())
        })
        .unwrap();

    store.dispatch(SampleAction::Increment(1)).unwrap();
    assert_eq!(drain(&log), vec!["adder"]);

    store.dispatch(SampleAction::Increment(1)).unwrap();
    assert_eq!(drain(&log), vec!["adder", "late"]);
    store.teardown();
}

#[test]
fn test_failing_listener_does_not_stop_the_rest() {
    let store = store();
    let mut errors = store.listener_errors();
    let log: Log = Arc::default();

    let _first = store.subscribe(recording(&log, "first")).unwrap();
    let failing = store
        .subscribe(|| Err(anyhow::anyhow!("render failed")))
        .unwrap();
    let _last = store.subscribe(recording(&log, "last")).unwrap();

    let returned = store.dispatch(SampleAction::Increment(1)).unwrap();
    assert_eq!(returned, SampleAction::Increment(1));
    assert_eq!(store.get_state().value, 1);
    assert_eq!(drain(&log), vec!["first", "last"]);

    let error = errors.try_recv().unwrap();
    assert_eq!(error.listener, failing.id());
    assert_eq!(error.message, "render failed");
    assert!(!error.panicked);
}

#[test]
fn test_panicking_listener_is_isolated() {
    let store = store();
    let mut errors = store.listener_errors();
    let log: Log = Arc::default();

    let _boom = store.subscribe(|| panic!("listener exploded")).unwrap();
    let _after = store.subscribe(recording(&log, "after")).unwrap();

    store.dispatch(SampleAction::Increment(2)).unwrap();
    assert_eq!(drain(&log), vec!["after"]);
    assert_eq!(store.get_state().value, 2);

    let error = errors.try_recv().unwrap();
    assert!(error.panicked);
    assert_eq!(error.message, "listener exploded");
}

#[test]
fn test_errors_without_receivers_are_dropped_quietly() {
    let store = Store::builder(counter_reducer())
        .config(StoreConfig::default().with_listener_error_capacity(0))
        .build()
        .unwrap();
    let _failing = store.subscribe(|| Err(anyhow::anyhow!("nobody hears"))).unwrap();
    store.dispatch(SampleAction::Increment(1)).unwrap();
    assert_eq!(store.get_state().value, 1);
}

#[test]
fn test_listener_may_dispatch() {
    let store = store();
    let handle = store.clone();
    let _echo = store
        .subscribe(move || {
            if handle.get_state().value == 1 {
                handle.dispatch(SampleAction::Increment(10))?;
            }
            Ok(())
        })
        .unwrap();

    store.dispatch(SampleAction::Increment(1)).unwrap();
    assert_eq!(store.get_state().value, 11);
    store.teardown();
}
