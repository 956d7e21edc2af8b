//! Camera identity and capabilities as reported by the vendor directory.

use serde::{Deserialize, Serialize};

/// One camera from the vendor directory listing.
///
/// perch treats every field as opaque vendor data; only `capabilities`
/// and `streaming_enabled` influence behavior (the streaming gate).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraInfo {
    pub uuid: String,
    pub name: String,
    #[serde(default)]
    pub serial_number: String,
    #[serde(default)]
    pub software_version: String,
    /// Vendor model index, resolved via [`model_name`].
    #[serde(default)]
    pub model_type: usize,
    #[serde(default)]
    pub structure_name: String,
    #[serde(default)]
    pub capabilities: Vec<String>,
    /// Host serving snapshots and property updates for this camera.
    pub api_host: String,
    /// Host delivering the live elementary stream.
    pub stream_host: String,
    #[serde(rename = "is_streaming_enabled", default)]
    pub streaming_enabled: bool,
}

impl CameraInfo {
    pub fn has_capability(&self, name: &str) -> bool {
        self.capabilities.iter().any(|c| c == name)
    }

    /// On-camera motion detector present.
    pub fn has_motion_detection(&self) -> bool {
        self.has_capability("detectors.on_camera")
    }

    /// Doorbell chime present.
    pub fn has_chime(&self) -> bool {
        self.has_capability("indoor_chime")
    }

    pub fn has_microphone(&self) -> bool {
        self.has_capability("audio.microphone")
    }

    pub fn model_name(&self) -> &'static str {
        MODEL_TYPES.get(self.model_type).copied().unwrap_or("Unknown")
    }
}

/// Vendor model index → display name.
pub const MODEL_TYPES: &[&str] = &[
    "Unknown",
    "Unknown",
    "Unknown",
    "Unknown",
    "Unknown",
    "Unknown",
    "Unknown",
    "Unknown",
    "Camera (1st gen)",
    "Camera (2nd gen)",
    "Unknown",
    "Camera IQ",
    "Doorbell",
    "Outdoor Camera IQ",
];

/// Resolutions advertised to the controller as `(width, height, fps)`.
/// The 320x240@15 entry exists for small-screen viewers.
pub const SUPPORTED_RESOLUTIONS: &[(u32, u32, u32)] = &[
    (320, 180, 30),
    (320, 240, 15),
    (320, 240, 30),
    (480, 270, 30),
    (480, 360, 30),
    (640, 360, 30),
    (640, 480, 30),
    (1280, 720, 30),
    (1280, 960, 30),
    (1920, 1080, 30),
    (1600, 1200, 30),
];

/// Audio advertisement: AAC-ELD at 16 kHz.
pub const AUDIO_CODEC: &str = "aac_eld";
pub const AUDIO_SAMPLE_RATE_KHZ: u32 = 16;
