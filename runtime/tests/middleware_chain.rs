//! Integration tests for the middleware chain
//!
//! Registration order, transformation, swallowing, fan-out, and nested
//! dispatch from inside a middleware.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic

use std::sync::{Arc, Mutex};
use tideway_runtime::{
    LoggingMiddleware, Middleware, MiddlewareApi, Next, Store, StoreError, middleware_fn,
};
use tideway_testing::fixtures::{CounterState, SampleAction, counter_reducer};
use tideway_testing::{NotificationProbe, RecordingMiddleware, init_test_tracing};

// ============================================================================
// Test Fixtures
// ============================================================================

type Api = MiddlewareApi<CounterState, SampleAction>;
type Log = Arc<Mutex<Vec<String>>>;

/// Appends `<name>:before` and `<name>:after` around `next`
struct Tracer {
    name: &'static str,
    log: Log,
}

impl Middleware<CounterState, SampleAction> for Tracer {
    fn handle(&self, _api: &Api, action: SampleAction, next: &Next<SampleAction>) -> Result<SampleAction, StoreError> {
        self.log.lock().unwrap().push(format!("{}:before", self.name));
        let result = next.run(action);
        self.log.lock().unwrap().push(format!("{}:after", self.name));
        result
    }
}

fn tracer(name: &'static str, log: &Log) -> Tracer {
    Tracer {
        name,
        log: Arc::clone(log),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[test]
fn test_first_registered_sees_action_first() {
    let log: Log = Arc::default();
    let store = Store::builder(counter_reducer())
        .middleware(tracer("outer", &log))
        .middleware(tracer("inner", &log))
        .build()
        .unwrap();

    store.dispatch(SampleAction::Increment(1)).unwrap();
    assert_eq!(
        *log.lock().unwrap(),
        vec!["outer:before", "inner:before", "inner:after", "outer:after"]
    );
}

#[test]
fn test_init_bypasses_middleware() {
    let log: Log = Arc::default();
    let _store = Store::builder(counter_reducer())
        .middleware(tracer("only", &log))
        .build()
        .unwrap();
    assert!(log.lock().unwrap().is_empty());
}

#[test]
fn test_middleware_can_transform_actions() {
    let doubler = middleware_fn(|_api: &Api, action: SampleAction, next: &Next<SampleAction>| match action {
        SampleAction::Increment(n) => next.run(SampleAction::Increment(n * 2)),
        other => next.run(other),
    });
    let store = Store::builder(counter_reducer()).middleware(doubler).build().unwrap();

    let returned = store.dispatch(SampleAction::Increment(3)).unwrap();
    assert_eq!(returned, SampleAction::Increment(6));
    assert_eq!(store.get_state().value, 6);
}

#[test]
fn test_middleware_can_swallow_actions() {
    let gate = middleware_fn(|_api: &Api, action: SampleAction, next: &Next<SampleAction>| {
        if matches!(action, SampleAction::Decrement(_)) {
            return Ok(action);
        }
        next.run(action)
    });
    let store = Store::builder(counter_reducer()).middleware(gate).build().unwrap();
    let probe = NotificationProbe::attach(&store).unwrap();

    store.dispatch(SampleAction::Increment(2)).unwrap();
    let returned = store.dispatch(SampleAction::Decrement(10)).unwrap();

    assert_eq!(returned, SampleAction::Decrement(10));
    assert_eq!(store.get_state().value, 2);
    // The swallowed action never reached the reducer, so nobody was notified
    assert_eq!(probe.count(), 1);
}

#[test]
fn test_middleware_can_fan_out() {
    let splitter = middleware_fn(|_api: &Api, action: SampleAction, next: &Next<SampleAction>| match action {
        SampleAction::Increment(n) if n > 1 => {
            for _ in 0..n {
                next.run(SampleAction::Increment(1))?;
            }
            Ok(action)
        },
        other => next.run(other),
    });
    let (recorder, history) = RecordingMiddleware::new();
    let store = Store::builder(counter_reducer())
        .middleware(splitter)
        .middleware(recorder)
        .build()
        .unwrap();
    let probe = NotificationProbe::attach(&store).unwrap();

    store.dispatch(SampleAction::Increment(3)).unwrap();
    assert_eq!(store.get_state().value, 3);
    assert_eq!(history.len(), 3);
    assert_eq!(probe.count(), 3);
}

#[test]
fn test_nested_dispatch_is_depth_first() {
    let log: Log = Arc::default();
    let seen = Arc::clone(&log);
    let bonus = middleware_fn(move |api: &Api, action: SampleAction, next: &Next<SampleAction>| {
        let is_increment = matches!(action, SampleAction::Increment(_));
        let handled = next.run(action)?;
        if is_increment && api.get_state()?.value == 1 {
            seen.lock().unwrap().push("bonus:start".to_string());
            api.dispatch(SampleAction::Increment(100))?;
            seen.lock().unwrap().push(format!("bonus:end:{}", api.get_state()?.value));
        }
        Ok(handled)
    });
    let store = Store::builder(counter_reducer()).middleware(bonus).build().unwrap();

    let listener_log = Arc::clone(&log);
    let api = store.api();
    let _subscription = store
        .subscribe(move || {
            listener_log
                .lock()
                .unwrap()
                .push(format!("listener:{}", api.get_state()?.value));
            Ok(())
        })
        .unwrap();

    store.dispatch(SampleAction::Increment(1)).unwrap();
    assert_eq!(
        *log.lock().unwrap(),
        vec!["listener:1", "bonus:start", "listener:101", "bonus:end:101"]
    );
}

#[test]
fn test_middleware_can_reject() {
    let guard = middleware_fn(|_api: &Api, action: SampleAction, next: &Next<SampleAction>| {
        if let SampleAction::Increment(n) = action {
            if n < 0 {
                return Err(StoreError::Rejected(format!("negative increment {n}")));
            }
        }
        next.run(action)
    });
    let store = Store::builder(counter_reducer()).middleware(guard).build().unwrap();

    let err = store.dispatch(SampleAction::Increment(-4)).unwrap_err();
    assert_eq!(err, StoreError::Rejected("negative increment -4".to_string()));
    assert_eq!(store.get_state().value, 0);
}

#[test]
fn test_logging_middleware_passes_everything_through() {
    init_test_tracing();
    let store = Store::builder(counter_reducer())
        .middleware(LoggingMiddleware::new())
        .build()
        .unwrap();

    let returned = store.dispatch(SampleAction::Increment(5)).unwrap();
    assert_eq!(returned, SampleAction::Increment(5));
    store.dispatch(SampleAction::Unknown).unwrap();
    assert_eq!(store.get_state().value, 5);
}

#[test]
fn test_shared_middleware_instance() {
    let log: Log = Arc::default();
    let shared = Arc::new(tracer("shared", &log));
    let first = Store::builder(counter_reducer())
        .middleware(Arc::clone(&shared))
        .build()
        .unwrap();
    let second = Store::builder(counter_reducer())
        .middleware(shared)
        .build()
        .unwrap();

    first.dispatch(SampleAction::Increment(1)).unwrap();
    second.dispatch(SampleAction::Increment(1)).unwrap();
    assert_eq!(log.lock().unwrap().len(), 4);
}
