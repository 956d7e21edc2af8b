//! perch integration test harness.
//!
//! Tests drive the streaming session manager end-to-end against real
//! subprocesses: fake transcoders are /bin/sh scripts written at test
//! time, and a recording stream source stands in for the vendor
//! backend. Unix only.
//!
//! Each test owns its manager, its scripts, and whatever it spawns;
//! nothing is shared between tests.

mod failures;
mod lifecycle;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use perch_core::media::{H264Level, H264Profile, MediaRequest, PrepareRequest, VideoParams};
use perch_core::srtp::{SRTP_KEY_LEN, SRTP_SALT_LEN};
use perch_core::{CameraInfo, CryptoSuite};
use perch_stream::manager::SessionEvent;
use perch_stream::source::{StreamSink, StreamSource};
use perch_stream::{StreamError, StreamManager, TokenStore, TranscoderSettings};

// ── Fake transcoders ──────────────────────────────────────────────────────────

/// Emits output immediately, then lingers until killed.
pub const READY_THEN_LINGER: &str = "#!/bin/sh\necho ready >&2\nexec sleep 30\n";

/// Never emits output, lingers until killed.
pub const SILENT_LINGER: &str = "#!/bin/sh\nexec sleep 30\n";

/// Dies with the stop sentinel before producing any output.
pub const SILENT_SENTINEL_EXIT: &str = "#!/bin/sh\nexit 255\n";

/// Dies abnormally before producing any output.
pub const SILENT_CRASH: &str = "#!/bin/sh\nexit 7\n";

/// Produces output, then dies abnormally.
pub const CRASH_AFTER_OUTPUT: &str = "#!/bin/sh\necho go >&2\nsleep 0.2\nexit 1\n";

/// Produces output, then exits with the stop sentinel.
pub const SENTINEL_AFTER_OUTPUT: &str = "#!/bin/sh\necho go >&2\nsleep 0.2\nexit 255\n";

/// Write a fake transcoder script and make it executable. `name` must
/// be unique per test so parallel tests never share a file.
pub fn write_script(name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;
    let dir = std::env::temp_dir().join(format!("perch-itest-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join(name);
    std::fs::write(&path, body).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

// ── Fake stream source ────────────────────────────────────────────────────────

/// Records start/stop calls and pushes a few bytes into each sink.
pub struct FakeSource {
    fail_start: bool,
    pub started: Mutex<Vec<String>>,
    pub stopped: Mutex<Vec<String>>,
    sinks: Mutex<HashMap<String, StreamSink>>,
}

impl FakeSource {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            fail_start: false,
            started: Mutex::new(Vec::new()),
            stopped: Mutex::new(Vec::new()),
            sinks: Mutex::new(HashMap::new()),
        })
    }

    pub fn refusing() -> Arc<Self> {
        Arc::new(Self {
            fail_start: true,
            started: Mutex::new(Vec::new()),
            stopped: Mutex::new(Vec::new()),
            sinks: Mutex::new(HashMap::new()),
        })
    }

    pub fn started_sessions(&self) -> Vec<String> {
        self.started.lock().unwrap().clone()
    }

    pub fn stopped_sessions(&self) -> Vec<String> {
        self.stopped.lock().unwrap().clone()
    }
}

#[async_trait]
impl StreamSource for FakeSource {
    async fn start(
        &self,
        _camera: &CameraInfo,
        _token: &str,
        session_id: &str,
        sink: StreamSink,
    ) -> Result<(), StreamError> {
        if self.fail_start {
            return Err(StreamError::Upstream("backend refused".to_string()));
        }
        self.started.lock().unwrap().push(session_id.to_string());
        // A taste of elementary stream; the fake transcoders ignore stdin.
        let _ = sink.send(Bytes::from_static(&[0, 0, 0, 1])).await;
        self.sinks
            .lock()
            .unwrap()
            .insert(session_id.to_string(), sink);
        Ok(())
    }

    async fn stop(&self, session_id: &str) {
        self.stopped.lock().unwrap().push(session_id.to_string());
        self.sinks.lock().unwrap().remove(session_id);
    }
}

// ── Manager construction ──────────────────────────────────────────────────────

pub fn camera() -> CameraInfo {
    CameraInfo {
        uuid: "cam-1".into(),
        name: "Porch".into(),
        serial_number: "123".into(),
        software_version: "1.0".into(),
        model_type: 8,
        structure_name: "Home".into(),
        capabilities: vec!["detectors.on_camera".into()],
        api_host: "api.example.test".into(),
        stream_host: "stream.example.test".into(),
        streaming_enabled: true,
    }
}

pub fn manager_with(
    transcoder: PathBuf,
    source: Arc<FakeSource>,
) -> (Arc<StreamManager>, mpsc::UnboundedReceiver<SessionEvent>) {
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let manager = StreamManager::new(
        camera(),
        TranscoderSettings {
            binary: transcoder,
            codec: "libx264".into(),
            verbose: false,
        },
        source,
        Arc::new(TokenStore::new("itest-token")),
        events_tx,
    );
    (Arc::new(manager), events_rx)
}

pub fn prepare_request() -> PrepareRequest {
    let video = MediaRequest {
        port: 50000,
        crypto_suite: CryptoSuite::AesCm128HmacSha1_80,
        srtp_key: vec![1; SRTP_KEY_LEN],
        srtp_salt: vec![2; SRTP_SALT_LEN],
    };
    PrepareRequest {
        peer_address: "127.0.0.1".parse().unwrap(),
        audio: MediaRequest {
            port: 50002,
            ..video.clone()
        },
        video,
    }
}

pub fn video_params() -> VideoParams {
    VideoParams {
        width: 1280,
        height: 720,
        fps: 30,
        max_bitrate: 300,
        payload_type: 99,
        mtu: 1378,
        profile: H264Profile::Main,
        level: H264Level::L3_1,
    }
}

/// Bound every wait so a regression hangs the test, not the suite.
pub async fn within<T>(fut: impl std::future::Future<Output = T>) -> T {
    tokio::time::timeout(Duration::from_secs(10), fut)
        .await
        .expect("test step timed out")
}
