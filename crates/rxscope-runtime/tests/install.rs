//! Process-wide instrumentation: installed once, then used by every plain
//! `pipe` call.
//!
//! Kept in its own test binary so the installation starts out empty, and
//! kept to a single test so nothing else races the installation.

use std::sync::Arc;
use std::time::Duration;

use rxscope_core::{OperatorIdentifier, TelemetryEvent};
use rxscope_protocol::AGENT_ADDRESS_ENV;
use rxscope_runtime::stream::{from_iter, map, Notification};
use rxscope_runtime::{
    compose, init_from_env, install, CallSite, Direct, Instrumented, Observable, Operator,
    PathResolver, RuntimeBridge, RuntimeConfig, RuntimeContext, RuntimeError,
};
use tokio::sync::mpsc;
use tokio::time::timeout;

/// Pipes through whatever is installed and reports the call site `pipe`
/// captured.
#[track_caller]
fn pipe_here(source: &Observable<i32>, operators: Vec<Operator<i32>>) -> (Observable<i32>, CallSite) {
    (source.pipe(operators), CallSite::caller())
}

async fn collect(rx: &mut mpsc::UnboundedReceiver<TelemetryEvent>, count: usize) -> Vec<TelemetryEvent> {
    let mut events = Vec::new();
    while events.len() < count {
        match timeout(Duration::from_secs(1), rx.recv()).await {
            Ok(Some(event)) => events.push(event),
            _ => break,
        }
    }
    events
}

#[tokio::test]
async fn test_installed_once_and_used_by_plain_pipe() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let runtime = RuntimeBridge::init(move |event: &TelemetryEvent| {
        let _ = tx.send(event.clone());
    });
    let composer =
        Instrumented::new(Direct, runtime.clone(), Arc::new(PathResolver::unmapped())).unwrap();

    assert!(!compose::is_installed());
    install(composer).unwrap();
    assert!(compose::is_installed());

    let line = line!() + 1;
    let (piped, site) = pipe_here(&from_iter(vec![5, 6]), vec![map(|x: i32| x + 1), map(|x: i32| x * 3)]);
    assert!(site.file.ends_with("install.rs"));
    assert_eq!(site.line, line);

    // Keys are zero-based; the second operator of that call.
    let operator = OperatorIdentifier::new(site.file, line - 1, site.column - 1, 1);
    runtime.enable_operator_log_point(operator.clone());

    let (out_tx, out_rx) = std::sync::mpsc::channel();
    piped.subscribe(out_tx);
    let values: Vec<_> = out_rx.try_iter().collect();
    assert_eq!(
        values,
        vec![Notification::Next(18), Notification::Next(21), Notification::Completed]
    );

    assert_eq!(
        collect(&mut rx, 5).await,
        vec![
            TelemetryEvent::subscribe(operator.clone()),
            TelemetryEvent::next(operator.clone(), "18"),
            TelemetryEvent::next(operator.clone(), "21"),
            TelemetryEvent::completed(operator.clone()),
            TelemetryEvent::unsubscribe(operator),
        ]
    );

    // The first composer stays; later installations are refused.
    let again =
        Instrumented::new(Direct, runtime.clone(), Arc::new(PathResolver::unmapped())).unwrap();
    assert!(matches!(install(again), Err(RuntimeError::AlreadyInstalled)));

    let context = RuntimeContext::start(RuntimeConfig::new("127.0.0.1:0"))
        .await
        .unwrap();
    assert!(matches!(context.install(), Err(RuntimeError::AlreadyInstalled)));
    context.shutdown().await;

    std::env::set_var(AGENT_ADDRESS_ENV, "127.0.0.1:0");
    assert!(matches!(init_from_env().await, Err(RuntimeError::AlreadyInstalled)));
}
