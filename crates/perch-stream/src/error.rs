//! Error kinds surfaced by the streaming session manager.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StreamError {
    /// A session with this ID is already prepared or active.
    #[error("session {0} already exists")]
    Conflict(String),

    /// No prepared or active session with this ID.
    #[error("no session {0}")]
    UnknownSession(String),

    /// Malformed or unsupported media parameters at prepare/start.
    #[error("stream negotiation failed: {0}")]
    Negotiation(String),

    /// Transcoder spawn failure, or exit before the first output.
    #[error("transcoder failed: {0}")]
    Subprocess(String),

    /// The stream source refused to start delivery.
    #[error("stream source unavailable: {0}")]
    Upstream(String),

    /// Streaming is switched off for this camera.
    #[error("streaming is disabled for camera {0}")]
    Disabled(String),
}
