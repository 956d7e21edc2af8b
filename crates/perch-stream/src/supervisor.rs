//! Transcoder subprocess supervisor.
//!
//! Builds the transcoder invocation for a negotiated session, spawns it,
//! and supervises its lifetime through three composed signals:
//!
//!   ready — fired once on the first stderr output (the transcoder has
//!           begun producing), acknowledging the pending start
//!   exit  — the classified exit outcome, observed by whoever holds the
//!           watch receiver (the start call before ready, the session
//!           monitor after)
//!   kill  — a oneshot trigger owned by the registry entry; firing it
//!           terminates the subprocess
//!
//! The stdin feed is an mpsc channel drained by a writer task. A broken
//! pipe on write is expected noise during teardown and only logged at
//! debug; any other write error is logged and closes the feed.

use std::path::PathBuf;
use std::process::Stdio;

use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStderr, ChildStdin, Command};
use tokio::sync::{mpsc, oneshot, watch};

use perch_core::media::VideoParams;

use crate::error::StreamError;
use crate::registry::{KillSwitch, PreparedSession};

/// Exit code the transcoder uses for an operator-requested stop.
const STOP_SENTINEL: i32 = 255;

/// Depth of the stdin feed channel, in stream-source reads.
const FEED_DEPTH: usize = 64;

/// Resolved transcoder invocation settings, injected by the daemon.
#[derive(Debug, Clone)]
pub struct TranscoderSettings {
    /// Absolute path or bare name of the transcoder binary.
    pub binary: PathBuf,
    /// Video encoder name, e.g. `libx264`.
    pub codec: String,
    /// Forward post-ready stderr to debug logs, log command lines.
    pub verbose: bool,
}

/// How the subprocess ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitOutcome {
    /// Signal-terminated or the stop sentinel — normal teardown.
    Expected(String),
    /// Anything else.
    Abnormal(String),
}

impl std::fmt::Display for ExitOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExitOutcome::Expected(detail) | ExitOutcome::Abnormal(detail) => {
                write!(f, "{detail}")
            }
        }
    }
}

/// A spawned transcoder. The kill switch moves into the registry entry;
/// the feed sender goes to the stream source; ready/exit stay with the
/// start call.
pub struct Transcoder {
    pub feed: mpsc::Sender<Bytes>,
    pub ready: oneshot::Receiver<()>,
    pub exit: watch::Receiver<Option<ExitOutcome>>,
    pub kill: KillSwitch,
}

// ── Command construction ──────────────────────────────────────────────────────

/// Build the transcoder argument list for one session.
///
/// Reads the raw elementary stream from stdin, transcodes to the
/// requested resolution/frame-rate/bitrate, tags packets with the
/// negotiated payload type and synchronization source, and emits RTP —
/// SRTP with the stored key material when the session negotiated the
/// supported cipher suite, plaintext RTP for the explicit `none` suite.
pub fn command_args(
    session: &PreparedSession,
    video: &VideoParams,
    codec: &str,
) -> Vec<String> {
    let endpoint = &session.video;
    let mut args: Vec<String> = vec![
        "-use_wallclock_as_timestamps".into(),
        "1".into(),
        "-i".into(),
        "-".into(),
        "-map".into(),
        "0:0".into(),
        "-c:v".into(),
        codec.into(),
        "-pix_fmt".into(),
        "yuv420p".into(),
    ];
    if codec == "libx264" {
        args.extend([
            "-preset".into(),
            "ultrafast".into(),
            "-tune".into(),
            "zerolatency".into(),
        ]);
    }
    args.extend([
        "-r".into(),
        video.fps.to_string(),
        "-an".into(),
        "-sn".into(),
        "-dn".into(),
        "-b:v".into(),
        format!("{}k", video.max_bitrate),
        "-bufsize".into(),
        format!("{}k", 2 * video.max_bitrate),
        "-maxrate".into(),
        format!("{}k", video.max_bitrate),
        "-payload_type".into(),
        video.payload_type.to_string(),
        "-ssrc".into(),
        endpoint.ssrc.to_string(),
        "-f".into(),
        "rtp".into(),
    ]);

    let scheme = match endpoint.crypto_suite.transcoder_name() {
        Some(suite) => {
            args.extend([
                "-srtp_out_suite".into(),
                suite.into(),
                "-srtp_out_params".into(),
                endpoint.srtp.to_base64(),
            ]);
            "srtp"
        }
        None => "rtp",
    };
    args.push(format!(
        "{scheme}://{}:{}?rtcpport={}&localrtcpport={}&pkt_size={}",
        session.peer_address, endpoint.port, endpoint.port, endpoint.port, video.mtu
    ));
    args
}

/// The command line with key material blanked, for verbose logging.
fn redacted_command(binary: &std::path::Path, args: &[String]) -> String {
    let mut redacted = args.to_vec();
    for i in 0..redacted.len() {
        if redacted[i] == "-srtp_out_params" && i + 1 < redacted.len() {
            redacted[i + 1] = "<redacted>".into();
        }
    }
    format!("{} {}", binary.display(), redacted.join(" "))
}

// ── Spawning ──────────────────────────────────────────────────────────────────

/// Spawn one transcoder subprocess for a session.
pub fn spawn(
    session_id: &str,
    session: &PreparedSession,
    video: &VideoParams,
    settings: &TranscoderSettings,
) -> Result<Transcoder, StreamError> {
    let args = command_args(session, video, &settings.codec);
    if settings.verbose {
        tracing::debug!(
            session_id,
            command = %redacted_command(&settings.binary, &args),
            "spawning transcoder"
        );
    }

    let mut child = Command::new(&settings.binary)
        .args(&args)
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| {
            StreamError::Subprocess(format!(
                "failed to spawn {}: {e}",
                settings.binary.display()
            ))
        })?;

    let stdin = child.stdin.take().ok_or_else(|| {
        StreamError::Subprocess("transcoder stdin was not captured".to_string())
    })?;
    let stderr = child.stderr.take().ok_or_else(|| {
        StreamError::Subprocess("transcoder stderr was not captured".to_string())
    })?;

    let (feed_tx, feed_rx) = mpsc::channel::<Bytes>(FEED_DEPTH);
    let (ready_tx, ready_rx) = oneshot::channel();
    let (exit_tx, exit_rx) = watch::channel(None);
    let (kill_tx, kill_rx) = oneshot::channel();

    tokio::spawn(feed_writer(session_id.to_string(), stdin, feed_rx));
    tokio::spawn(stderr_reader(
        session_id.to_string(),
        stderr,
        ready_tx,
        settings.verbose,
    ));
    tokio::spawn(exit_watcher(session_id.to_string(), child, kill_rx, exit_tx));

    Ok(Transcoder {
        feed: feed_tx,
        ready: ready_rx,
        exit: exit_rx,
        kill: kill_tx,
    })
}

/// Drain the feed channel into the subprocess stdin.
async fn feed_writer(
    session_id: String,
    mut stdin: ChildStdin,
    mut feed_rx: mpsc::Receiver<Bytes>,
) {
    while let Some(buf) = feed_rx.recv().await {
        if let Err(e) = stdin.write_all(&buf).await {
            if e.kind() == std::io::ErrorKind::BrokenPipe {
                // Expected while the transcoder is shutting down.
                tracing::debug!(%session_id, "transcoder stdin closed");
            } else {
                tracing::error!(%session_id, error = %e, "transcoder stdin write failed");
            }
            break;
        }
    }
    // Dropping the receiver closes the feed; the stream source sees its
    // sends fail and ceases delivery.
}

/// Watch stderr: the first chunk means the transcoder has begun
/// producing output. Keep draining afterwards so the subprocess never
/// blocks on a full pipe.
async fn stderr_reader(
    session_id: String,
    mut stderr: ChildStderr,
    ready_tx: oneshot::Sender<()>,
    verbose: bool,
) {
    let mut buf = [0u8; 4096];
    let mut ready_tx = Some(ready_tx);
    loop {
        match stderr.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                if let Some(tx) = ready_tx.take() {
                    tracing::debug!(%session_id, "transcoder produced first output");
                    let _ = tx.send(());
                }
                if verbose {
                    tracing::debug!(
                        %session_id,
                        output = %String::from_utf8_lossy(&buf[..n]).trim_end(),
                        "transcoder"
                    );
                }
            }
        }
    }
}

/// Own the child: kill it when the switch fires, and publish the
/// classified exit outcome either way.
async fn exit_watcher(
    session_id: String,
    mut child: Child,
    mut kill_rx: oneshot::Receiver<()>,
    exit_tx: watch::Sender<Option<ExitOutcome>>,
) {
    let status = tokio::select! {
        _ = &mut kill_rx => {
            if let Err(e) = child.start_kill() {
                tracing::debug!(%session_id, error = %e, "transcoder kill failed");
            }
            child.wait().await
        }
        status = child.wait() => status,
    };
    let outcome = classify(status);
    match &outcome {
        ExitOutcome::Expected(detail) => {
            tracing::debug!(%session_id, %detail, "transcoder exited");
        }
        ExitOutcome::Abnormal(detail) => {
            tracing::warn!(%session_id, %detail, "transcoder exited abnormally");
        }
    }
    let _ = exit_tx.send(Some(outcome));
}

fn classify(status: std::io::Result<std::process::ExitStatus>) -> ExitOutcome {
    match status {
        Ok(status) => match status.code() {
            None => ExitOutcome::Expected("terminated by signal".to_string()),
            Some(STOP_SENTINEL) => ExitOutcome::Expected(format!("code {STOP_SENTINEL}")),
            Some(code) => ExitOutcome::Abnormal(format!("code {code}")),
        },
        Err(e) => ExitOutcome::Abnormal(format!("wait failed: {e}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use perch_core::media::{H264Level, H264Profile};
    use perch_core::srtp::{SrtpMaterial, SRTP_KEY_LEN, SRTP_SALT_LEN};
    use perch_core::CryptoSuite;

    use crate::registry::PreparedEndpoint;

    fn session(suite: CryptoSuite) -> PreparedSession {
        PreparedSession {
            peer_address: "192.168.1.20".parse().unwrap(),
            local_address: "192.168.1.5".parse().unwrap(),
            video: PreparedEndpoint {
                port: 50000,
                crypto_suite: suite,
                srtp: SrtpMaterial::new(vec![7; SRTP_KEY_LEN], vec![9; SRTP_SALT_LEN])
                    .unwrap(),
                ssrc: 1234,
            },
            audio: PreparedEndpoint {
                port: 50002,
                crypto_suite: suite,
                srtp: SrtpMaterial::new(vec![1; SRTP_KEY_LEN], vec![2; SRTP_SALT_LEN])
                    .unwrap(),
                ssrc: 5678,
            },
        }
    }

    fn video() -> VideoParams {
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

    #[test]
    fn encrypted_command_targets_srtp() {
        let args = command_args(&session(CryptoSuite::AesCm128HmacSha1_80), &video(), "libx264");
        let joined = args.join(" ");
        assert!(joined.contains("-srtp_out_suite AES_CM_128_HMAC_SHA1_80"));
        assert!(joined
            .contains("srtp://192.168.1.20:50000?rtcpport=50000&localrtcpport=50000&pkt_size=1378"));
        // Bitrate triple with doubled buffer.
        assert!(joined.contains("-b:v 300k -bufsize 600k -maxrate 300k"));
        assert!(joined.contains("-payload_type 99 -ssrc 1234"));
    }

    #[test]
    fn plaintext_command_targets_rtp() {
        let args = command_args(&session(CryptoSuite::None), &video(), "libx264");
        let joined = args.join(" ");
        assert!(!joined.contains("srtp_out_suite"));
        assert!(joined.contains(" rtp://192.168.1.20:50000"));
    }

    #[test]
    fn x264_gets_latency_tuning_other_codecs_do_not() {
        let x264 = command_args(&session(CryptoSuite::None), &video(), "libx264").join(" ");
        assert!(x264.contains("-preset ultrafast -tune zerolatency"));
        let vt = command_args(&session(CryptoSuite::None), &video(), "h264_videotoolbox").join(" ");
        assert!(!vt.contains("-preset"));
    }

    #[test]
    fn redaction_blanks_key_material() {
        let session = session(CryptoSuite::AesCm128HmacSha1_80);
        let args = command_args(&session, &video(), "libx264");
        let line = redacted_command(&PathBuf::from("ffmpeg"), &args);
        assert!(line.contains("<redacted>"));
        assert!(!line.contains(&session.video.srtp.to_base64()));
    }

    #[test]
    fn exit_classification() {
        use std::os::unix::process::ExitStatusExt;
        let status = |code: i32| std::process::ExitStatus::from_raw(code << 8);
        assert!(matches!(classify(Ok(status(0))), ExitOutcome::Abnormal(_)));
        assert!(matches!(classify(Ok(status(1))), ExitOutcome::Abnormal(_)));
        assert!(matches!(classify(Ok(status(255))), ExitOutcome::Expected(_)));
        // Raw signal termination (SIGKILL).
        assert!(matches!(
            classify(Ok(std::process::ExitStatus::from_raw(9))),
            ExitOutcome::Expected(_)
        ));
    }
}
