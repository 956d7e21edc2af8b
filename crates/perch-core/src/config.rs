//! Configuration system for perch.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $PERCH_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/perch/config.toml
//!   3. ~/.config/perch/config.toml

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PerchConfig {
    pub vendor: VendorConfig,
    pub streaming: StreamingConfig,
    pub snapshot: SnapshotConfig,
    pub api: ApiConfig,
    pub directory: DirectoryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VendorConfig {
    /// Use the vendor's field-test hosts instead of production.
    pub field_test: bool,
    /// URL that issues short-lived access tokens.
    pub issue_token_url: String,
    /// Session cookies presented to the issue-token endpoint.
    pub cookies: String,
    /// Vendor API key.
    pub api_key: String,
    /// Only bridge cameras in these structures. Empty = all.
    pub structures: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamingConfig {
    /// Transcoder binary override. None = packaged default, then $PATH.
    pub transcoder_path: Option<PathBuf>,
    /// Video encoder passed to the transcoder.
    pub codec: String,
    /// Forward transcoder stderr to debug logs and log command lines.
    pub verbose_transcoder: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotConfig {
    /// Placeholder image served when a camera is offline.
    pub offline_image: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Control API port on 127.0.0.1.
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectoryConfig {
    /// Camera directory poll interval in seconds.
    pub refresh_secs: u64,
    /// Access-token refresh interval in seconds. Tokens last ~1h.
    pub token_refresh_secs: u64,
}

// ── Defaults ──────────────────────────────────────────────────────────────────

impl Default for PerchConfig {
    fn default() -> Self {
        Self {
            vendor: VendorConfig::default(),
            streaming: StreamingConfig::default(),
            snapshot: SnapshotConfig::default(),
            api: ApiConfig::default(),
            directory: DirectoryConfig::default(),
        }
    }
}

impl Default for VendorConfig {
    fn default() -> Self {
        Self {
            field_test: false,
            issue_token_url: String::new(),
            cookies: String::new(),
            api_key: String::new(),
            structures: Vec::new(),
        }
    }
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            transcoder_path: None,
            codec: "libx264".to_string(),
            verbose_transcoder: false,
        }
    }
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            offline_image: data_dir().join("offline.jpg"),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self { port: 9390 }
    }
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            refresh_secs: 60,
            token_refresh_secs: 3480, // 58 minutes
        }
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".config"))
        .join("perch")
}

pub fn data_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".local").join("share"))
        .join("perch")
}

fn dirs_or_home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {}: {}", .0.display(), .1)]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {}: {}", .0.display(), .1)]
    ParseFailed(PathBuf, toml::de::Error),
    #[error("failed to write {}: {}", .0.display(), .1)]
    WriteFailed(PathBuf, std::io::Error),
    #[error("failed to serialize: {0}")]
    SerializeFailed(toml::ser::Error),
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl PerchConfig {
    /// Load config: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::file_path();
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadFailed(path.clone(), e))?;
            toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(path.clone(), e))?
        } else {
            PerchConfig::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("PERCH_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    /// Write default config if none exists. Returns the path.
    pub fn write_default_if_missing() -> Result<PathBuf, ConfigError> {
        let path = Self::file_path();
        if !path.exists() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
            }
            let text = toml::to_string_pretty(&PerchConfig::default())
                .map_err(ConfigError::SerializeFailed)?;
            std::fs::write(&path, text)
                .map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
        }
        Ok(path)
    }

    /// Apply PERCH_* env var overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("PERCH_API__PORT") {
            if let Ok(p) = v.parse() {
                self.api.port = p;
            }
        }
        if let Ok(v) = std::env::var("PERCH_VENDOR__FIELD_TEST") {
            self.vendor.field_test = v == "true" || v == "1";
        }
        if let Ok(v) = std::env::var("PERCH_STREAMING__TRANSCODER_PATH") {
            self.streaming.transcoder_path = Some(PathBuf::from(v));
        }
        if let Ok(v) = std::env::var("PERCH_STREAMING__CODEC") {
            self.streaming.codec = v;
        }
        if let Ok(v) = std::env::var("PERCH_STREAMING__VERBOSE_TRANSCODER") {
            self.streaming.verbose_transcoder = v == "true" || v == "1";
        }
        if let Ok(v) = std::env::var("PERCH_SNAPSHOT__OFFLINE_IMAGE") {
            self.snapshot.offline_image = PathBuf::from(v);
        }
    }
}
