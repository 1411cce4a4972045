//! End-to-end tests for debug sessions against a real runtime agent.

use std::time::Duration;

use rxscope_controller::{
    spawn_log_point_manager, spawn_session_manager, ControllerConfig, DebugSessionStarted,
    LogPointHandle, SessionError, SessionManagerHandle, SessionNotification, SessionState,
};
use rxscope_core::{
    LogPoint, OperatorIdentifier, Position, RuntimeFlavor, SourceLocation, TelemetryEvent,
};
use rxscope_runtime::{RuntimeConfig, RuntimeContext, RuntimeHandle};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::time::{sleep, timeout};

// ============================================================================
// Test Helpers
// ============================================================================

struct Fixture {
    context: RuntimeContext,
    runtime: RuntimeHandle,
    log_points: LogPointHandle,
    sessions: SessionManagerHandle,
    notifications: broadcast::Receiver<SessionNotification>,
}

impl Fixture {
    async fn start() -> Self {
        let context = RuntimeContext::start(RuntimeConfig::new("127.0.0.1:0"))
            .await
            .unwrap();
        let config = ControllerConfig {
            agent_address: context.local_addr().to_string(),
            ..ControllerConfig::default()
        };
        let log_points = spawn_log_point_manager(None);
        let sessions = spawn_session_manager(config, log_points.clone());
        let notifications = sessions.subscribe();

        Self {
            runtime: context.handle(),
            context,
            log_points,
            sessions,
            notifications,
        }
    }

    async fn next_notification(&mut self) -> SessionNotification {
        timeout(Duration::from_secs(2), self.notifications.recv())
            .await
            .expect("notification should arrive in time")
            .unwrap()
    }

    async fn runtime_has(&self, expected: &[OperatorIdentifier]) -> bool {
        for _ in 0..50 {
            if self.runtime.enabled_identifiers() == expected {
                return true;
            }
            sleep(Duration::from_millis(20)).await;
        }
        false
    }
}

/// Accepts connections and never answers on them.
async fn silent_peer() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap().to_string();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((stream, _)) = listener.accept().await {
            held.push(stream);
        }
    });
    address
}

fn log_point(index: u32) -> LogPoint {
    LogPoint::recommendation(
        SourceLocation::new("src/main.rs", Position::new(4 + index, 8)),
        OperatorIdentifier::new("src/main.rs", 3, 10, index),
        Some("map".to_string()),
    )
}

// ============================================================================
// Lifecycle Tests
// ============================================================================

#[tokio::test]
async fn test_ready_pushes_snapshot() {
    let mut fixture = Fixture::start().await;
    fixture.log_points.enable(log_point(1)).await.unwrap();

    let created = fixture
        .sessions
        .session_started(DebugSessionStarted::new("s1", "lldb"))
        .await
        .unwrap();
    assert!(created);

    let flavor = fixture.sessions.attach("s1").await.unwrap();
    assert_eq!(flavor, Some(RuntimeFlavor::current()));

    // The snapshot is pushed before attach resolves.
    assert_eq!(
        fixture.runtime.enabled_identifiers(),
        vec![log_point(1).identifier]
    );
    assert_eq!(
        fixture.next_notification().await,
        SessionNotification::Ready {
            session_id: "s1".to_string(),
            flavor: Some(RuntimeFlavor::current()),
        }
    );

    fixture.context.shutdown().await;
}

#[tokio::test]
async fn test_changes_are_pushed_while_ready() {
    let fixture = Fixture::start().await;
    fixture
        .sessions
        .session_started(DebugSessionStarted::new("s1", "rust"))
        .await
        .unwrap();
    fixture.sessions.attach("s1").await.unwrap();
    assert!(fixture.runtime.enabled_identifiers().is_empty());

    fixture.log_points.enable(log_point(0)).await.unwrap();
    fixture.log_points.enable(log_point(2)).await.unwrap();
    assert!(
        fixture
            .runtime_has(&[log_point(0).identifier, log_point(2).identifier])
            .await
    );

    fixture
        .log_points
        .disable(log_point(0).identifier)
        .await
        .unwrap();
    assert!(fixture.runtime_has(&[log_point(2).identifier]).await);

    fixture.context.shutdown().await;
}

#[tokio::test]
async fn test_telemetry_notifications() {
    let mut fixture = Fixture::start().await;
    fixture.log_points.enable(log_point(1)).await.unwrap();
    fixture
        .sessions
        .session_started(DebugSessionStarted::new("s1", "lldb"))
        .await
        .unwrap();
    fixture.sessions.attach("s1").await.unwrap();
    assert!(matches!(
        fixture.next_notification().await,
        SessionNotification::Ready { .. }
    ));

    let event = TelemetryEvent::next(log_point(1).identifier, "42");
    fixture.runtime.forward(&event);

    match fixture.next_notification().await {
        SessionNotification::Telemetry {
            session_id,
            event: received,
            ..
        } => {
            assert_eq!(session_id, "s1");
            assert_eq!(received, event);
        }
        other => panic!("expected telemetry, got {other:?}"),
    }

    fixture.context.shutdown().await;
}

#[tokio::test]
async fn test_terminate_removes_session() {
    let mut fixture = Fixture::start().await;
    fixture
        .sessions
        .session_started(DebugSessionStarted::new("s1", "lldb"))
        .await
        .unwrap();
    fixture.sessions.attach("s1").await.unwrap();
    fixture.next_notification().await;

    let active = fixture.sessions.active_sessions().await.unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].state, SessionState::Ready(Some(RuntimeFlavor::current())));

    fixture.sessions.session_terminated("s1").await.unwrap();
    assert_eq!(
        fixture.next_notification().await,
        SessionNotification::Terminated {
            session_id: "s1".to_string()
        }
    );
    assert!(fixture.sessions.active_sessions().await.unwrap().is_empty());
    assert_eq!(
        fixture.sessions.attach("s1").await,
        Err(SessionError::SessionNotFound("s1".to_string()))
    );
    assert_eq!(
        fixture.sessions.session_terminated("s1").await,
        Err(SessionError::SessionNotFound("s1".to_string()))
    );

    fixture.context.shutdown().await;
}

#[tokio::test]
async fn test_ignored_sessions() {
    let fixture = Fixture::start().await;

    let unsupported = fixture
        .sessions
        .session_started(DebugSessionStarted::new("py", "python"))
        .await
        .unwrap();
    let child = fixture
        .sessions
        .session_started(DebugSessionStarted::new("child", "lldb").with_parent("s0"))
        .await
        .unwrap();

    assert!(!unsupported);
    assert!(!child);
    assert!(fixture.sessions.active_sessions().await.unwrap().is_empty());

    fixture.context.shutdown().await;
}

#[tokio::test]
async fn test_attach_failure_is_reported() {
    let mut fixture = Fixture::start().await;
    fixture
        .sessions
        .session_started(DebugSessionStarted::new("s1", "lldb").with_address("127.0.0.1:1"))
        .await
        .unwrap();

    let result = fixture.sessions.attach("s1").await;
    assert!(matches!(result, Err(SessionError::AttachFailed(_))));
    assert!(matches!(
        fixture.next_notification().await,
        SessionNotification::AttachFailed { .. }
    ));

    fixture.context.shutdown().await;
}

#[tokio::test]
async fn test_concurrent_attach_shares_one_connection() {
    let fixture = Fixture::start().await;
    fixture
        .sessions
        .session_started(DebugSessionStarted::new("s1", "lldb"))
        .await
        .unwrap();

    let (first, second) = tokio::join!(fixture.sessions.attach("s1"), fixture.sessions.attach("s1"));
    assert_eq!(first, Ok(Some(RuntimeFlavor::current())));
    assert_eq!(first, second);
    assert_eq!(fixture.context.controller_connections(), 1);

    fixture.context.shutdown().await;
}

#[tokio::test]
async fn test_second_session_on_same_process_fails() {
    let mut fixture = Fixture::start().await;
    fixture
        .sessions
        .session_started(DebugSessionStarted::new("s1", "lldb"))
        .await
        .unwrap();
    fixture.sessions.attach("s1").await.unwrap();
    fixture.next_notification().await;

    fixture
        .sessions
        .session_started(DebugSessionStarted::new("s2", "lldb"))
        .await
        .unwrap();
    let result = timeout(Duration::from_secs(2), fixture.sessions.attach("s2"))
        .await
        .expect("second session should fail instead of waiting");
    assert!(matches!(result, Err(SessionError::AttachFailed(_))));

    timeout(Duration::from_secs(2), fixture.sessions.session_terminated("s2"))
        .await
        .expect("terminating a failed session should not wait")
        .unwrap();
    assert_eq!(fixture.context.controller_connections(), 1);

    fixture.context.shutdown().await;
}

#[tokio::test]
async fn test_terminate_while_attaching() {
    let mut fixture = Fixture::start().await;
    let address = silent_peer().await;
    fixture
        .sessions
        .session_started(DebugSessionStarted::new("s1", "lldb").with_address(address))
        .await
        .unwrap();

    let attaching = {
        let sessions = fixture.sessions.clone();
        tokio::spawn(async move { sessions.attach("s1").await })
    };
    sleep(Duration::from_millis(100)).await;

    timeout(Duration::from_secs(2), fixture.sessions.session_terminated("s1"))
        .await
        .expect("terminate should not wait for the stuck attach")
        .unwrap();
    assert_eq!(
        fixture.next_notification().await,
        SessionNotification::Terminated {
            session_id: "s1".to_string()
        }
    );

    let result = timeout(Duration::from_secs(2), attaching)
        .await
        .expect("pending attach should resolve")
        .unwrap();
    assert_eq!(result, Err(SessionError::Terminated));
    assert!(fixture.sessions.active_sessions().await.unwrap().is_empty());

    fixture.context.shutdown().await;
}
