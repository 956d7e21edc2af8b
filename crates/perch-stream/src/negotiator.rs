//! Session parameter negotiator.
//!
//! Validates controller-chosen media parameters, allocates per-stream
//! synchronization sources, selects the local address to advertise, and
//! stores the resulting Prepared session. Never starts a subprocess.
//!
//! perch does not originate key material — it range-checks and stores
//! what the controller chose, and echoes it in the response.

use std::net::{IpAddr, SocketAddr, UdpSocket};

use perch_core::media::{MediaRequest, PrepareRequest, PrepareResponse, PreparedMedia};
use perch_core::srtp::SrtpMaterial;
use perch_core::CryptoSuite;

use crate::error::StreamError;
use crate::registry::{PreparedEndpoint, PreparedSession, SessionRegistry};

/// Discard-protocol port; the probe never sends a packet.
const PROBE_PORT: u16 = 9;

/// Negotiate and store one session. Fails without side effects: a
/// conflicting or invalid request leaves the registry untouched and no
/// synchronization source allocated.
pub fn prepare_session(
    registry: &SessionRegistry,
    session_id: &str,
    request: &PrepareRequest,
) -> Result<PrepareResponse, StreamError> {
    let video_srtp = validate_media(session_id, "video", &request.video)?;
    let audio_srtp = validate_media(session_id, "audio", &request.audio)?;
    let local_address = local_source_address(request.peer_address)?;

    let video_ssrc = registry.allocate_ssrc();
    let audio_ssrc = registry.allocate_ssrc();

    let session = PreparedSession {
        peer_address: request.peer_address,
        local_address,
        video: PreparedEndpoint {
            port: request.video.port,
            crypto_suite: request.video.crypto_suite,
            srtp: video_srtp,
            ssrc: video_ssrc,
        },
        audio: PreparedEndpoint {
            port: request.audio.port,
            crypto_suite: request.audio.crypto_suite,
            srtp: audio_srtp,
            ssrc: audio_ssrc,
        },
    };

    if let Err(e) = registry.insert_prepared(session_id, session) {
        registry.release_ssrc(video_ssrc);
        registry.release_ssrc(audio_ssrc);
        return Err(e);
    }

    Ok(PrepareResponse {
        address: local_address,
        video: echo(&request.video, video_ssrc),
        audio: echo(&request.audio, audio_ssrc),
    })
}

fn echo(request: &MediaRequest, ssrc: u32) -> PreparedMedia {
    PreparedMedia {
        port: request.port,
        ssrc,
        srtp_key: request.srtp_key.clone(),
        srtp_salt: request.srtp_salt.clone(),
    }
}

fn validate_media(
    session_id: &str,
    stream: &str,
    request: &MediaRequest,
) -> Result<SrtpMaterial, StreamError> {
    if !request.crypto_suite.is_supported() {
        return Err(StreamError::Negotiation(format!(
            "{stream}: cipher suite {} is not supported",
            request.crypto_suite
        )));
    }
    if request.crypto_suite == CryptoSuite::None {
        tracing::warn!(session_id, stream, "plaintext media negotiated (suite none)");
    }
    SrtpMaterial::new(request.srtp_key.clone(), request.srtp_salt.clone())
        .map_err(|e| StreamError::Negotiation(format!("{stream}: {e}")))
}

/// Pick the local address to advertise as the media source, matching
/// the IP version of the peer. A connected UDP socket never transmits;
/// it only asks the kernel which source address routing would choose.
fn local_source_address(peer: IpAddr) -> Result<IpAddr, StreamError> {
    let bind: SocketAddr = match peer {
        IpAddr::V4(_) => "0.0.0.0:0".parse().unwrap(),
        IpAddr::V6(_) => "[::]:0".parse().unwrap(),
    };
    let probe = UdpSocket::bind(bind)
        .and_then(|socket| socket.connect((peer, PROBE_PORT)).map(|_| socket))
        .and_then(|socket| socket.local_addr())
        .map_err(|e| {
            StreamError::Negotiation(format!("failed to select local source address: {e}"))
        })?;
    Ok(probe.ip())
}
