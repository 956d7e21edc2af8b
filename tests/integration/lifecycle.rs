//! Happy-path session lifecycle against a real fake transcoder.

use crate::*;

/// prepare echoes the requested ports, start resolves only after the
/// transcoder's first stderr output, stop kills it and leaves both
/// registries empty.
#[tokio::test]
async fn full_lifecycle_prepare_start_stop() {
    let script = write_script("lifecycle-ready.sh", READY_THEN_LINGER);
    let source = FakeSource::new();
    let (manager, _events) = manager_with(script, source.clone());

    let response = manager.prepare("s1", &prepare_request()).unwrap();
    assert_eq!(response.video.port, 50000);
    assert_eq!(response.audio.port, 50002);
    assert_ne!(response.video.ssrc, response.audio.ssrc);
    assert_eq!(manager.session_counts(), (1, 0));

    within(manager.start("s1", video_params())).await.unwrap();
    assert_eq!(manager.session_counts(), (0, 1));
    assert_eq!(source.started_sessions(), vec!["s1".to_string()]);
    assert!(source.stopped_sessions().is_empty());

    within(manager.stop("s1")).await.unwrap();
    assert_eq!(manager.session_counts(), (0, 0));
    assert_eq!(source.stopped_sessions(), vec!["s1".to_string()]);
}

/// After a stop the ID is free for a fresh negotiation.
#[tokio::test]
async fn session_id_is_reusable_after_stop() {
    let script = write_script("lifecycle-reuse.sh", READY_THEN_LINGER);
    let source = FakeSource::new();
    let (manager, _events) = manager_with(script, source);

    for _ in 0..3 {
        manager.prepare("s1", &prepare_request()).unwrap();
        within(manager.start("s1", video_params())).await.unwrap();
        within(manager.stop("s1")).await.unwrap();
    }
    assert_eq!(manager.session_counts(), (0, 0));
}

/// Stopping IDs this process never knew (or already cleaned up) is a
/// no-op, not an error, and touches no processes.
#[tokio::test]
async fn stop_unknown_session_is_a_noop() {
    let script = write_script("lifecycle-unknown.sh", READY_THEN_LINGER);
    let source = FakeSource::new();
    let (manager, _events) = manager_with(script, source.clone());

    within(manager.stop("never-prepared")).await.unwrap();
    assert!(source.stopped_sessions().is_empty());
}

/// Concurrent sessions are independent: two IDs run two transcoders.
#[tokio::test]
async fn two_sessions_run_concurrently() {
    let script = write_script("lifecycle-two.sh", READY_THEN_LINGER);
    let source = FakeSource::new();
    let (manager, _events) = manager_with(script, source.clone());

    manager.prepare("a", &prepare_request()).unwrap();
    manager.prepare("b", &prepare_request()).unwrap();
    within(manager.start("a", video_params())).await.unwrap();
    within(manager.start("b", video_params())).await.unwrap();
    assert_eq!(manager.session_counts(), (0, 2));

    within(manager.stop("a")).await.unwrap();
    assert_eq!(manager.session_counts(), (0, 1));
    within(manager.stop("b")).await.unwrap();
    assert_eq!(manager.session_counts(), (0, 0));
    assert_eq!(source.stopped_sessions().len(), 2);
}
