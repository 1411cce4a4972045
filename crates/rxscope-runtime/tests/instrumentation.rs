//! Integration tests for pipeline instrumentation.
//!
//! These tests run real pipelines through an `Instrumented` composer and
//! observe what reaches the runtime bridge's sink.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rxscope_core::{OperatorIdentifier, TelemetryEvent};
use rxscope_runtime::stream::{from_iter, map, take, Notification};
use rxscope_runtime::{
    CallSite, Direct, Instrumented, PathResolver, RuntimeBridge, RuntimeHandle, SourceResolver,
};
use tokio::sync::mpsc;
use tokio::time::timeout;

// ============================================================================
// Test Helpers
// ============================================================================

fn capture() -> (RuntimeHandle, mpsc::UnboundedReceiver<TelemetryEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let runtime = RuntimeBridge::init(move |event: &TelemetryEvent| {
        let _ = tx.send(event.clone());
    });
    (runtime, rx)
}

/// Collects events until `count` arrived or nothing came for a second.
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

/// Resolver that takes its time, like a slow filesystem.
struct SlowResolver;

#[async_trait]
impl SourceResolver for SlowResolver {
    async fn resolve(&self, site: &CallSite, operator_index: u32) -> OperatorIdentifier {
        tokio::time::sleep(Duration::from_millis(50)).await;
        OperatorIdentifier::from_caller_location(site.file, site.line, site.column, operator_index)
    }
}

fn expected_lifecycle(operator: &OperatorIdentifier, values: &[&str]) -> Vec<TelemetryEvent> {
    let mut events = vec![TelemetryEvent::subscribe(operator.clone())];
    events.extend(values.iter().map(|v| TelemetryEvent::next(operator.clone(), *v)));
    events.push(TelemetryEvent::completed(operator.clone()));
    events.push(TelemetryEvent::unsubscribe(operator.clone()));
    events
}

// ============================================================================
// Pipeline Tests
// ============================================================================

#[tokio::test]
async fn test_only_enabled_operator_reports() {
    let (runtime, mut rx) = capture();
    let site = CallSite::new("src/pipeline.rs", 12, 9);
    let enabled = OperatorIdentifier::new("src/pipeline.rs", 11, 8, 1);
    runtime.enable_operator_log_point(enabled.clone());

    let composer =
        Instrumented::new(Direct, runtime.clone(), Arc::new(PathResolver::unmapped())).unwrap();

    let (out_tx, out_rx) = std::sync::mpsc::channel();
    from_iter(vec![1, 2, 3, 4])
        .pipe_at(
            &composer,
            &site,
            vec![take(4), map(|x: i32| x * 2), map(|x: i32| x * 20)],
        )
        .subscribe(out_tx);

    let values: Vec<_> = out_rx.try_iter().collect();
    assert_eq!(
        values,
        vec![
            Notification::Next(40),
            Notification::Next(80),
            Notification::Next(120),
            Notification::Next(160),
            Notification::Completed,
        ]
    );

    let events = collect(&mut rx, 7).await;
    assert_eq!(events, expected_lifecycle(&enabled, &["2", "4", "6", "8"]));

    // Nothing else trails behind.
    assert!(collect(&mut rx, 1).await.is_empty());
}

#[tokio::test]
async fn test_nothing_reported_when_disabled() {
    let (runtime, mut rx) = capture();
    let composer =
        Instrumented::new(Direct, runtime, Arc::new(PathResolver::unmapped())).unwrap();

    let (out_tx, out_rx) = std::sync::mpsc::channel();
    from_iter(vec![1, 2])
        .pipe_with(&composer, vec![map(|x: i32| x + 1)])
        .subscribe(out_tx);

    assert_eq!(out_rx.try_iter().count(), 3);
    assert!(collect(&mut rx, 1).await.is_empty());
}

#[tokio::test]
async fn test_order_kept_while_resolution_is_pending() {
    let (runtime, mut rx) = capture();
    let site = CallSite::new("src/slow.rs", 1, 1);
    let operator = OperatorIdentifier::new("src/slow.rs", 0, 0, 0);
    runtime.enable_operator_log_point(operator.clone());

    let composer = Instrumented::new(Direct, runtime, Arc::new(SlowResolver)).unwrap();

    let (out_tx, _out_rx) = std::sync::mpsc::channel();
    from_iter(vec!["a", "b", "c"])
        .pipe_at(&composer, &site, vec![map(|s: &'static str| s)])
        .subscribe(out_tx);

    let events = collect(&mut rx, 6).await;
    assert_eq!(
        events,
        expected_lifecycle(&operator, &["\"a\"", "\"b\"", "\"c\""])
    );
}

#[tokio::test]
async fn test_each_subscription_reports_separately() {
    let (runtime, mut rx) = capture();
    let site = CallSite::new("src/twice.rs", 3, 5);
    let operator = OperatorIdentifier::new("src/twice.rs", 2, 4, 0);
    runtime.enable_operator_log_point(operator.clone());

    let composer =
        Instrumented::new(Direct, runtime, Arc::new(PathResolver::unmapped())).unwrap();
    let pipeline = from_iter(vec![5]).pipe_at(&composer, &site, vec![map(|x: i32| x)]);

    let (out_tx, _out_rx) = std::sync::mpsc::channel();
    pipeline.subscribe(out_tx.clone());
    pipeline.subscribe(out_tx);

    let events = collect(&mut rx, 8).await;
    let mut expected = expected_lifecycle(&operator, &["5"]);
    expected.extend(expected_lifecycle(&operator, &["5"]));
    assert_eq!(events, expected);
}

#[tokio::test]
async fn test_disable_stops_reporting() {
    let (runtime, mut rx) = capture();
    let site = CallSite::new("src/toggle.rs", 1, 1);
    let operator = OperatorIdentifier::new("src/toggle.rs", 0, 0, 0);
    runtime.enable_operator_log_point(operator.clone());

    let composer =
        Instrumented::new(Direct, runtime.clone(), Arc::new(PathResolver::unmapped())).unwrap();
    let pipeline = from_iter(vec![1]).pipe_at(&composer, &site, vec![map(|x: i32| x)]);

    let (out_tx, _out_rx) = std::sync::mpsc::channel();
    pipeline.subscribe(out_tx.clone());
    assert_eq!(collect(&mut rx, 4).await.len(), 4);

    runtime.disable_operator_log_point(&operator);
    pipeline.subscribe(out_tx);
    assert!(collect(&mut rx, 1).await.is_empty());
}
