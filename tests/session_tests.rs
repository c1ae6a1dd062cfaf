// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for the session lifecycle state machine

use std::sync::Arc;
use std::time::Duration;
use tethercam::backends::camera::simulated::DeviceCall;
use tethercam::{
    CameraSession, CaptureModes, ErrorKind, SessionConfig, SessionEvent, SessionState,
    SessionStatus, SimulatedProtocol,
};

const TIMEOUT: Duration = Duration::from_secs(5);

fn session_with(protocol: &Arc<SimulatedProtocol>, config: SessionConfig) -> CameraSession {
    CameraSession::new(protocol.clone(), protocol.descriptors(), config)
}

fn new_session(count: usize) -> (Arc<SimulatedProtocol>, CameraSession) {
    let protocol = Arc::new(SimulatedProtocol::new(count).unwrap());
    let session = session_with(&protocol, SessionConfig::default());
    (protocol, session)
}

/// Request `target` and return every event raised until the worker is idle
async fn drive(session: &mut CameraSession, target: SessionState) -> Vec<SessionEvent> {
    session.set_state(target);
    session.wait_idle().await;
    let mut events = Vec::new();
    while let Some(event) = session.try_next_event() {
        events.push(event);
    }
    events
}

fn statuses(events: &[SessionEvent]) -> Vec<SessionStatus> {
    events
        .iter()
        .filter_map(|e| match e {
            SessionEvent::StatusChanged(status) => Some(*status),
            _ => None,
        })
        .collect()
}

fn states(events: &[SessionEvent]) -> Vec<SessionState> {
    events
        .iter()
        .filter_map(|e| match e {
            SessionEvent::StateChanged(state) => Some(*state),
            _ => None,
        })
        .collect()
}

/// Every status change is followed by readiness computed from that status
fn assert_readiness_follows_status(events: &[SessionEvent]) {
    let relevant: Vec<&SessionEvent> = events
        .iter()
        .filter(|e| {
            matches!(
                e,
                SessionEvent::StatusChanged(_) | SessionEvent::ReadyForCaptureChanged(_)
            )
        })
        .collect();

    for pair in relevant.chunks(2) {
        match pair {
            [SessionEvent::StatusChanged(status), SessionEvent::ReadyForCaptureChanged(ready)] => {
                let expected = matches!(status, SessionStatus::Active | SessionStatus::Loaded);
                assert_eq!(*ready, expected, "readiness after {:?}", status);
            }
            other => panic!("status and readiness out of step: {:?}", other),
        }
    }
}

async fn wait_for<F>(session: &mut CameraSession, mut predicate: F) -> Vec<SessionEvent>
where
    F: FnMut(&SessionEvent) -> bool,
{
    let mut seen = Vec::new();
    loop {
        let event = tokio::time::timeout(TIMEOUT, session.next_event())
            .await
            .expect("timed out waiting for event")
            .expect("session has no events");
        let done = predicate(&event);
        seen.push(event);
        if done {
            return seen;
        }
    }
}

#[tokio::test]
async fn test_unloaded_to_loaded_and_back() {
    let (_protocol, mut session) = new_session(1);

    let events = drive(&mut session, SessionState::Loaded).await;
    assert_eq!(
        statuses(&events),
        vec![SessionStatus::Loading, SessionStatus::Loaded]
    );
    assert_eq!(states(&events), vec![SessionState::Loaded]);
    assert_readiness_follows_status(&events);
    assert!(session.is_ready_for_capture());

    let events = drive(&mut session, SessionState::Unloaded).await;
    assert_eq!(
        statuses(&events),
        vec![SessionStatus::Unloading, SessionStatus::Unloaded]
    );
    assert_eq!(states(&events), vec![SessionState::Unloaded]);
    assert_readiness_follows_status(&events);
    assert!(!session.is_ready_for_capture());
}

#[tokio::test]
async fn test_unloaded_to_active_opens_then_starts() {
    let (_protocol, mut session) = new_session(1);

    let events = drive(&mut session, SessionState::Active).await;

    assert_eq!(
        statuses(&events),
        vec![
            SessionStatus::Loading,
            SessionStatus::Loaded,
            SessionStatus::Starting,
            SessionStatus::Active,
        ]
    );
    assert_eq!(
        states(&events),
        vec![SessionState::Loaded, SessionState::Active]
    );
    assert_readiness_follows_status(&events);
    assert_eq!(session.state(), SessionState::Active);

    drive(&mut session, SessionState::Unloaded).await;
}

#[tokio::test]
async fn test_active_to_loaded_stops_viewfinder() {
    let (protocol, mut session) = new_session(1);
    drive(&mut session, SessionState::Active).await;

    let events = drive(&mut session, SessionState::Loaded).await;

    assert_eq!(
        statuses(&events),
        vec![SessionStatus::Stopping, SessionStatus::Loaded]
    );
    assert_eq!(states(&events), vec![SessionState::Loaded]);
    assert_readiness_follows_status(&events);
    assert_eq!(protocol.device(0).unwrap().open_connections(), 1);
}

#[tokio::test]
async fn test_active_to_unloaded_stops_then_closes() {
    let (protocol, mut session) = new_session(1);
    drive(&mut session, SessionState::Active).await;

    let events = drive(&mut session, SessionState::Unloaded).await;

    assert_eq!(
        statuses(&events),
        vec![
            SessionStatus::Stopping,
            SessionStatus::Loaded,
            SessionStatus::Unloading,
            SessionStatus::Unloaded,
        ]
    );
    assert_eq!(
        states(&events),
        vec![SessionState::Loaded, SessionState::Unloaded]
    );
    assert_readiness_follows_status(&events);
    assert_eq!(protocol.device(0).unwrap().open_connections(), 0);
}

#[tokio::test]
async fn test_loaded_to_active_raises_mirror() {
    let (protocol, mut session) = new_session(1);
    drive(&mut session, SessionState::Loaded).await;
    let device = protocol.device(0).unwrap();
    device.clear_calls();

    let events = drive(&mut session, SessionState::Active).await;

    assert_eq!(
        statuses(&events),
        vec![SessionStatus::Starting, SessionStatus::Active]
    );
    assert!(
        device
            .calls()
            .contains(&DeviceCall::SetConfig { viewfinder: Some(true) })
    );

    drive(&mut session, SessionState::Unloaded).await;
}

#[tokio::test]
async fn test_same_state_requests_are_ignored() {
    let (protocol, mut session) = new_session(1);

    assert!(statuses(&drive(&mut session, SessionState::Unloaded).await).is_empty());

    drive(&mut session, SessionState::Loaded).await;
    let device = protocol.device(0).unwrap();
    device.clear_calls();

    assert!(statuses(&drive(&mut session, SessionState::Loaded).await).is_empty());
    assert!(device.calls().is_empty());
}

#[tokio::test]
async fn test_open_failure_leaves_unavailable() {
    let (protocol, mut session) = new_session(1);
    protocol.device(0).unwrap().set_fail_open(true);

    let events = drive(&mut session, SessionState::Active).await;

    assert_eq!(
        statuses(&events),
        vec![SessionStatus::Loading, SessionStatus::Unavailable]
    );
    assert!(events.iter().any(|e| matches!(
        e,
        SessionEvent::Error { kind: ErrorKind::Camera, .. }
    )));
    assert_eq!(session.state(), SessionState::Unloaded);
    assert!(!session.is_ready_for_capture());
}

#[tokio::test]
async fn test_capture_mode_change_updates_readiness() {
    let (_protocol, mut session) = new_session(1);
    drive(&mut session, SessionState::Loaded).await;
    assert!(session.is_ready_for_capture());

    session.set_capture_mode(CaptureModes::VIDEO);

    assert!(matches!(
        session.try_next_event(),
        Some(SessionEvent::CaptureModeChanged(CaptureModes::VIDEO))
    ));
    assert!(matches!(
        session.try_next_event(),
        Some(SessionEvent::ReadyForCaptureChanged(false))
    ));
    assert!(!session.is_ready_for_capture());
}

#[tokio::test]
async fn test_eleven_preview_failures_unload_session() {
    let (protocol, mut session) = new_session(1);
    let device = protocol.device(0).unwrap();
    device.fail_next_previews(11);

    session.set_state(SessionState::Active);
    let events = wait_for(&mut session, |e| {
        matches!(e, SessionEvent::StatusChanged(SessionStatus::Unloaded))
    })
    .await;

    let fatal = events
        .iter()
        .filter(|e| matches!(e, SessionEvent::Error { kind: ErrorKind::Camera, .. }))
        .count();
    assert_eq!(fatal, 1);
    assert!(!events
        .iter()
        .any(|e| matches!(e, SessionEvent::VideoFrameProbed(_))));
    assert_eq!(session.state(), SessionState::Unloaded);
    assert_eq!(device.open_connections(), 0);
}

#[tokio::test]
async fn test_ten_preview_failures_then_success_keep_running() {
    let (protocol, mut session) = new_session(1);
    protocol.device(0).unwrap().fail_next_previews(10);

    session.set_state(SessionState::Active);
    let events = wait_for(&mut session, |e| matches!(e, SessionEvent::VideoFrameProbed(_))).await;

    assert!(!events
        .iter()
        .any(|e| matches!(e, SessionEvent::Error { .. })));
    assert_eq!(session.state(), SessionState::Active);

    drive(&mut session, SessionState::Unloaded).await;
}

#[tokio::test]
async fn test_no_frames_after_stop() {
    let (_protocol, mut session) = new_session(1);
    session.set_state(SessionState::Active);
    wait_for(&mut session, |e| matches!(e, SessionEvent::VideoFrameProbed(_))).await;

    let events = drive(&mut session, SessionState::Loaded).await;
    let stopped_at = events
        .iter()
        .position(|e| matches!(e, SessionEvent::StatusChanged(SessionStatus::Stopping)))
        .unwrap();
    assert!(!events[stopped_at..]
        .iter()
        .any(|e| matches!(e, SessionEvent::VideoFrameProbed(_))));

    tokio::time::sleep(Duration::from_millis(50)).await;
    session.wait_idle().await;
    while let Some(event) = session.try_next_event() {
        assert!(!matches!(event, SessionEvent::VideoFrameProbed(_)));
    }
}

#[tokio::test]
async fn test_custom_fail_limit() {
    let protocol = Arc::new(SimulatedProtocol::new(1).unwrap());
    let config = SessionConfig {
        preview_fail_limit: 2,
        ..SessionConfig::default()
    };
    let mut session = session_with(&protocol, config);
    protocol.device(0).unwrap().fail_next_previews(3);

    session.set_state(SessionState::Active);
    let events = wait_for(&mut session, |e| {
        matches!(e, SessionEvent::StatusChanged(SessionStatus::Unloaded))
    })
    .await;

    assert!(events
        .iter()
        .any(|e| matches!(e, SessionEvent::Error { kind: ErrorKind::Camera, .. })));
}

#[tokio::test]
async fn test_set_camera_rebinds_to_new_device() {
    let (protocol, mut session) = new_session(2);
    drive(&mut session, SessionState::Loaded).await;

    session.set_camera(1).await.unwrap();
    session.wait_idle().await;
    while session.try_next_event().is_some() {}

    assert_eq!(session.camera_index(), Some(1));
    assert_eq!(session.state(), SessionState::Loaded);
    assert_eq!(protocol.device(1).unwrap().open_connections(), 1);

    let first = protocol.device(0).unwrap();
    let deadline = std::time::Instant::now() + TIMEOUT;
    while first.open_connections() > 0 && std::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(first.open_connections(), 0);
}

#[tokio::test]
async fn test_drop_does_not_wait_for_device() {
    let (protocol, mut session) = new_session(1);
    let device = protocol.device(0).unwrap();
    device.set_capture_delay(Duration::from_millis(400));
    drive(&mut session, SessionState::Loaded).await;

    session.capture("slow.jpg");
    let start = std::time::Instant::now();
    drop(session);
    assert!(start.elapsed() < Duration::from_millis(200));

    let deadline = std::time::Instant::now() + TIMEOUT;
    while device.open_connections() > 0 {
        assert!(std::time::Instant::now() < deadline, "device never closed");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(device.calls().last(), Some(&DeviceCall::Exit));
}

#[tokio::test]
async fn test_shutdown_closes_every_device() {
    let (protocol, mut session) = new_session(2);
    drive(&mut session, SessionState::Active).await;
    session.set_camera(1).await.unwrap();
    session.wait_idle().await;

    session.shutdown().await;

    for index in 0..2 {
        assert_eq!(protocol.device(index).unwrap().open_connections(), 0);
    }
}
