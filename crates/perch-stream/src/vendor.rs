//! Vendor directory and auth client.
//!
//! A thin HTTP layer over the vendor's camera web API: camera listing,
//! the streaming toggle, snapshots, and access-token issuance. Tokens
//! last about an hour; the daemon refreshes them on a timer and swaps
//! the shared [`TokenStore`] — sessions in flight keep the token they
//! started with.

use std::sync::RwLock;

use bytes::Bytes;
use serde::Deserialize;
use thiserror::Error;

use perch_core::config::VendorConfig;
use perch_core::CameraInfo;

const API_HOST: &str = "https://webapi.camera.home.nest.com";
const API_HOST_FIELD_TEST: &str = "https://webapi.camera.home.ft.nest.com";

const DIRECTORY_PATH: &str = "/api/cameras.get_owned_and_member_of_with_properties";

#[derive(Debug, Error)]
pub enum VendorError {
    #[error("vendor request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("vendor returned status {0}")]
    Status(reqwest::StatusCode),
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("offline image unavailable: {0}")]
    OfflineImage(std::io::Error),
}

impl VendorError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, VendorError::Status(s) if *s == reqwest::StatusCode::NOT_FOUND)
    }
}

// ── Token store ───────────────────────────────────────────────────────────────

/// The shared access token, refreshed in place by the daemon.
pub struct TokenStore {
    token: RwLock<String>,
}

impl TokenStore {
    pub fn new(initial: impl Into<String>) -> Self {
        Self {
            token: RwLock::new(initial.into()),
        }
    }

    pub fn get(&self) -> String {
        match self.token.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn set(&self, token: String) {
        match self.token.write() {
            Ok(mut guard) => *guard = token,
            Err(poisoned) => *poisoned.into_inner() = token,
        }
    }
}

// ── Client ────────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct DirectoryResponse {
    items: Vec<CameraInfo>,
}

#[derive(Deserialize)]
struct IssueTokenResponse {
    access_token: String,
}

pub struct VendorClient {
    http: reqwest::Client,
    api_base: String,
}

impl VendorClient {
    pub fn new(field_test: bool) -> Self {
        let api_base = if field_test {
            API_HOST_FIELD_TEST
        } else {
            API_HOST
        };
        Self {
            http: reqwest::Client::new(),
            api_base: api_base.to_string(),
        }
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    /// Obtain a fresh access token from the operator-configured
    /// issue-token endpoint.
    pub async fn issue_token(&self, config: &VendorConfig) -> Result<String, VendorError> {
        if config.issue_token_url.is_empty() {
            return Err(VendorError::Auth(
                "vendor.issue_token_url is not configured".to_string(),
            ));
        }
        let response = self
            .http
            .get(&config.issue_token_url)
            .header("Cookie", &config.cookies)
            .header("x-api-key", &config.api_key)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(VendorError::Status(status));
        }
        let body: IssueTokenResponse = response.json().await?;
        Ok(body.access_token)
    }

    /// List all cameras the account owns or is a member of.
    pub async fn list_cameras(&self, token: &str) -> Result<Vec<CameraInfo>, VendorError> {
        let response = self
            .http
            .get(format!("{}{DIRECTORY_PATH}", self.api_base))
            .header("Cookie", format!("user_token={token}"))
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(VendorError::Status(status));
        }
        let body: DirectoryResponse = response.json().await?;
        Ok(body.items)
    }

    /// Flip the camera's streaming.enabled property.
    pub async fn set_streaming(
        &self,
        token: &str,
        camera: &CameraInfo,
        enabled: bool,
    ) -> Result<(), VendorError> {
        let response = self
            .http
            .post(format!("https://{}/api/dropcams.set_properties", camera.api_host))
            .header("Cookie", format!("user_token={token}"))
            .form(&[
                ("uuid", camera.uuid.as_str()),
                ("streaming.enabled", if enabled { "true" } else { "false" }),
            ])
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(VendorError::Status(status));
        }
        Ok(())
    }

    /// Fetch a still image from the camera at the requested width.
    pub async fn snapshot(
        &self,
        token: &str,
        camera: &CameraInfo,
        width: u32,
    ) -> Result<Bytes, VendorError> {
        let response = self
            .http
            .get(format!("https://{}/get_image", camera.api_host))
            .query(&[("uuid", camera.uuid.as_str()), ("width", &width.to_string())])
            .header("Cookie", format!("user_token={token}"))
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(VendorError::Status(status));
        }
        Ok(response.bytes().await?)
    }
}
