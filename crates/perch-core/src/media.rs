//! Stream negotiation wire types.
//!
//! These are the request/response bodies exchanged with the consuming
//! controller. perch echoes the caller-chosen ports and key material and
//! contributes the synchronization sources plus the local address to
//! advertise as the media source.

use std::net::IpAddr;

use serde::{Deserialize, Serialize};

use crate::srtp::{b64_serde, CryptoSuite};

// ── Negotiation (prepare) ─────────────────────────────────────────────────────

/// Controller-chosen transport parameters for one media stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaRequest {
    /// Port on the peer the transport must send to.
    pub port: u16,
    pub crypto_suite: CryptoSuite,
    #[serde(with = "b64_serde")]
    pub srtp_key: Vec<u8>,
    #[serde(with = "b64_serde")]
    pub srtp_salt: Vec<u8>,
}

/// A session negotiation request. The session ID travels alongside
/// (it is the registry key, not part of the negotiated parameters).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrepareRequest {
    /// Address of the viewer's controller; its IP version also selects
    /// which local address perch advertises back.
    pub peer_address: IpAddr,
    pub video: MediaRequest,
    pub audio: MediaRequest,
}

/// Negotiated parameters for one media stream, echoed back with the
/// chosen synchronization source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreparedMedia {
    pub port: u16,
    pub ssrc: u32,
    #[serde(with = "b64_serde")]
    pub srtp_key: Vec<u8>,
    #[serde(with = "b64_serde")]
    pub srtp_salt: Vec<u8>,
}

/// Response to a successful `prepare`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrepareResponse {
    /// Local address to advertise as the media source.
    pub address: IpAddr,
    pub video: PreparedMedia,
    pub audio: PreparedMedia,
}

// ── Start parameters ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum H264Profile {
    Baseline,
    Main,
    High,
}

impl H264Profile {
    pub fn as_str(self) -> &'static str {
        match self {
            H264Profile::Baseline => "baseline",
            H264Profile::Main => "main",
            H264Profile::High => "high",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum H264Level {
    #[serde(rename = "3.1")]
    L3_1,
    #[serde(rename = "3.2")]
    L3_2,
    #[serde(rename = "4.0")]
    L4_0,
}

impl H264Level {
    pub fn as_str(self) -> &'static str {
        match self {
            H264Level::L3_1 => "3.1",
            H264Level::L3_2 => "3.2",
            H264Level::L4_0 => "4.0",
        }
    }
}

/// Video parameters carried by a start (or reconfigure) request.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct VideoParams {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    /// Target bitrate in kbit/s.
    pub max_bitrate: u32,
    /// RTP payload type negotiated by the controller.
    pub payload_type: u8,
    /// Maximum transmission unit for outgoing packets.
    pub mtu: u16,
    pub profile: H264Profile,
    pub level: H264Level,
}
