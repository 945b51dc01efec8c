// toastate-sdk/src/config.rs

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

use crate::upload::UploadOptions;

pub const DEFAULT_API_URL: &str = "https://api.cloud.toastate.com";
pub const DEFAULT_API_VERSION: &str = "v1";

/// Settings of one client session. Every field has a default, so an empty
/// YAML document is a valid config.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ClientConfig {
    pub api_url: String,
    pub api_version: String,
    /// Timeout of plain JSON requests.
    pub request_timeout_secs: u64,
    /// Upper bound for uploads and streamed downloads, which may take hours.
    pub streaming_timeout_secs: u64,
    pub upload_chunk_size: usize,
    pub pipe_capacity: usize,
    pub auth_token: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            api_version: DEFAULT_API_VERSION.to_string(),
            request_timeout_secs: 30,
            streaming_timeout_secs: 3600 * 3600,
            upload_chunk_size: 5 * 1024 * 1024,
            pipe_capacity: 1,
            auth_token: None,
        }
    }
}

// Hand-written so the token never ends up in logs.
impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("api_url", &self.api_url)
            .field("api_version", &self.api_version)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("streaming_timeout_secs", &self.streaming_timeout_secs)
            .field("upload_chunk_size", &self.upload_chunk_size)
            .field("pipe_capacity", &self.pipe_capacity)
            .field("auth_token", &self.auth_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl ClientConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn streaming_timeout(&self) -> Duration {
        Duration::from_secs(self.streaming_timeout_secs)
    }

    pub fn upload_options(&self) -> UploadOptions {
        UploadOptions {
            chunk_size: self.upload_chunk_size.max(1),
            pipe_capacity: self.pipe_capacity.max(1),
        }
    }

    pub fn trace_loaded(&self) {
        info!(
            api_url = %self.api_url,
            api_version = %self.api_version,
            auth_token_set = self.auth_token.is_some(),
            "Loaded ClientConfig"
        );
        debug!(?self, "ClientConfig loaded (full debug)");
    }
}
