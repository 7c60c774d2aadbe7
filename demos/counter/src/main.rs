//! Counter demo binary
//!
//! Dispatches a few actions, loads a remote count through an async thunk,
//! and prints the state tree along the way.

use counter_demo::{CounterAction, build_store, load_remote_count, status_label};
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "counter_demo=debug,tideway_runtime=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
    tideway_runtime::metrics::register_metrics();

    println!("=== Counter Demo: Tideway Store ===\n");

    let store = build_store()?;
    let label = status_label();

    let api = store.api();
    let printer = store.subscribe(move || {
        let state = api.get_state()?;
        println!("  [listener] {}", label.select(&state));
        Ok(())
    })?;

    println!("Initial state: {}", serde_json::to_string(&*store.get_state())?);

    for action in [
        CounterAction::Increment,
        CounterAction::Increment,
        CounterAction::IncrementBy(5),
        CounterAction::Decrement,
        CounterAction::ToggleTheme,
    ] {
        println!("\n>>> Dispatching: {}", tideway_core::Action::action_type(&action));
        store.dispatch(action)?;
    }

    println!("\n>>> Dispatching: counter/loadRemote (seed 4)");
    let remote = load_remote_count(Duration::from_millis(50));
    let request = remote.start(&store.api(), 4);
    let request_id = request.settled().await;
    println!("Remote load {request_id} settled");

    println!("\n>>> Dispatching: counter/loadRemote (seed 0, fails)");
    store.dispatch(CounterAction::Deferred(remote.thunk(0)))?;
    tokio::time::sleep(Duration::from_millis(100)).await;

    println!("\n>>> Dispatching: counter/reset");
    store.dispatch(CounterAction::Reset)?;

    println!("\nFinal state: {}", serde_json::to_string_pretty(&*store.get_state())?);

    printer.unsubscribe()?;
    store.teardown();

    println!("\n=== Demo Complete ===");
    println!("\nKey concepts demonstrated:");
    println!("  • Slices: counter and theme, combined under their names");
    println!("  • Middleware: thunks run first, every action is logged");
    println!("  • Async thunk: pending, then fulfilled or rejected");
    println!("  • Selector: the status line recomputes only when its inputs change");
    Ok(())
}
