//! Transcoder binary resolution.
//!
//! Resolved once at startup and injected into the stream managers as a
//! plain path: operator override → packaged binary → whatever `ffmpeg`
//! the execution environment provides.

use std::path::PathBuf;

use perch_core::config::StreamingConfig;

/// Where the packaged transcoder lands when installed from a bundle.
const PACKAGED_TRANSCODER: &str = "/usr/lib/perch/ffmpeg";

pub fn resolve(config: &StreamingConfig) -> PathBuf {
    if let Some(path) = &config.transcoder_path {
        return path.clone();
    }
    let packaged = PathBuf::from(PACKAGED_TRANSCODER);
    if packaged.exists() {
        return packaged;
    }
    PathBuf::from("ffmpeg")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operator_override_wins() {
        let config = StreamingConfig {
            transcoder_path: Some(PathBuf::from("/opt/ffmpeg/bin/ffmpeg")),
            ..StreamingConfig::default()
        };
        assert_eq!(resolve(&config), PathBuf::from("/opt/ffmpeg/bin/ffmpeg"));
    }

    #[test]
    fn falls_back_to_path_lookup() {
        let config = StreamingConfig::default();
        // No packaged binary on the test machine.
        assert_eq!(resolve(&config), PathBuf::from("ffmpeg"));
    }
}
