//! Failure-path behavior: early exits, mid-stream crashes, races
//! between stop and a pending start.

use crate::*;

use perch_stream::manager::SessionEvent;
use perch_stream::StreamError;

/// The stop sentinel (255) before any output still fails the pending
/// start — nothing may hang — and the session is fully cleaned up.
#[tokio::test]
async fn sentinel_exit_before_output_fails_start() {
    let script = write_script("fail-sentinel.sh", SILENT_SENTINEL_EXIT);
    let source = FakeSource::new();
    let (manager, _events) = manager_with(script, source.clone());

    manager.prepare("s1", &prepare_request()).unwrap();
    let err = within(manager.start("s1", video_params())).await.unwrap_err();
    assert!(matches!(err, StreamError::Subprocess(_)));
    assert_eq!(manager.session_counts(), (0, 0));
    // The source was engaged and then released.
    assert_eq!(source.stopped_sessions(), vec!["s1".to_string()]);
}

#[tokio::test]
async fn crash_before_output_fails_start() {
    let script = write_script("fail-crash.sh", SILENT_CRASH);
    let source = FakeSource::new();
    let (manager, _events) = manager_with(script, source);

    manager.prepare("s1", &prepare_request()).unwrap();
    let err = within(manager.start("s1", video_params())).await.unwrap_err();
    assert!(matches!(err, StreamError::Subprocess(_)));
    assert_eq!(manager.session_counts(), (0, 0));
}

/// A transcoder dying after its first output forces the session down
/// exactly once: one event, one source stop, empty registries.
#[tokio::test]
async fn crash_after_output_forces_stop_exactly_once() {
    let script = write_script("fail-late-crash.sh", CRASH_AFTER_OUTPUT);
    let source = FakeSource::new();
    let (manager, mut events) = manager_with(script, source.clone());

    manager.prepare("s1", &prepare_request()).unwrap();
    within(manager.start("s1", video_params())).await.unwrap();

    let event = within(events.recv()).await.expect("forced-stop event");
    assert_eq!(
        event,
        SessionEvent::ForcedStop {
            camera_uuid: "cam-1".to_string(),
            session_id: "s1".to_string(),
        }
    );
    assert_eq!(manager.session_counts(), (0, 0));
    assert_eq!(source.stopped_sessions(), vec!["s1".to_string()]);

    // No second event, and a late controller stop stays a no-op that
    // touches neither the source nor any process.
    within(manager.stop("s1")).await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    assert!(events.try_recv().is_err());
    assert_eq!(source.stopped_sessions().len(), 1);
}

/// The stop sentinel after output also ends the session through the
/// forced-stop path — once, with a clean registry afterwards.
#[tokio::test]
async fn sentinel_exit_after_output_forces_stop_exactly_once() {
    let script = write_script("fail-late-sentinel.sh", SENTINEL_AFTER_OUTPUT);
    let source = FakeSource::new();
    let (manager, mut events) = manager_with(script, source.clone());

    manager.prepare("s1", &prepare_request()).unwrap();
    within(manager.start("s1", video_params())).await.unwrap();

    let event = within(events.recv()).await.expect("forced-stop event");
    assert!(matches!(event, SessionEvent::ForcedStop { .. }));
    assert_eq!(manager.session_counts(), (0, 0));
    assert_eq!(source.stopped_sessions(), vec!["s1".to_string()]);

    tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    assert!(events.try_recv().is_err());
}

/// A stop racing a pending start must fail the start (never hang it)
/// and leave no orphaned subprocess or source.
#[tokio::test]
async fn stop_during_pending_start_fails_the_start() {
    let script = write_script("fail-pending.sh", SILENT_LINGER);
    let source = FakeSource::new();
    let (manager, _events) = manager_with(script, source.clone());

    manager.prepare("s1", &prepare_request()).unwrap();

    let pending = {
        let manager = manager.clone();
        tokio::spawn(async move { manager.start("s1", video_params()).await })
    };
    // Let the start spawn its subprocess and begin waiting for output.
    tokio::time::sleep(std::time::Duration::from_millis(300)).await;
    within(manager.stop("s1")).await.unwrap();

    let result = within(pending).await.unwrap();
    assert!(matches!(result, Err(StreamError::Subprocess(_))));
    assert_eq!(manager.session_counts(), (0, 0));
    assert!(source.stopped_sessions().contains(&"s1".to_string()));
}

/// A refusing stream source fails the start and releases everything.
#[tokio::test]
async fn upstream_refusal_fails_start() {
    let script = write_script("fail-upstream.sh", READY_THEN_LINGER);
    let source = FakeSource::refusing();
    let (manager, _events) = manager_with(script, source);

    manager.prepare("s1", &prepare_request()).unwrap();
    let err = within(manager.start("s1", video_params())).await.unwrap_err();
    assert!(matches!(err, StreamError::Upstream(_)));
    assert_eq!(manager.session_counts(), (0, 0));
}

/// Starting a session that was never prepared spawns nothing.
#[tokio::test]
async fn start_unknown_session_spawns_nothing() {
    let script = write_script("fail-unknown.sh", READY_THEN_LINGER);
    let source = FakeSource::new();
    let (manager, _events) = manager_with(script, source.clone());

    let err = within(manager.start("ghost", video_params()))
        .await
        .unwrap_err();
    assert!(matches!(err, StreamError::UnknownSession(_)));
    assert!(source.started_sessions().is_empty());
}
