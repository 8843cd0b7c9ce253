//! Client configuration.
//!
//! Loaded from JSON (camelCase or snake_case keys both accepted for the URL
//! fields) with defaults matching the host platform's iframe limits.

use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

use crate::error::SdkError;

pub const DEFAULT_API_VERSION: &str = "5.71";

/// The host rejects more than three calls per second.
pub const DEFAULT_MIN_INTERVAL_MS: u64 = 333;

/// Vertical offset of the app iframe inside the host page.
pub const DEFAULT_IFRAME_TOP: i64 = 112;

pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SdkConfig {
    pub api_version: String,
    pub min_interval_ms: u64,
    pub iframe_top: i64,
    /// Set when the app page is served over https; adds `https=1` to calls.
    pub secure_origin: bool,
    /// Allow multipart uploads. When `false` every upload uses the base64 proxy.
    pub binary_upload: bool,
    /// Cap on transient-error retries. `None` retries forever.
    pub max_retries: Option<u32>,
    #[serde(alias = "proxyUrl")]
    pub proxy_url: String,
    #[serde(alias = "base64ProxyUrl")]
    pub base64_proxy_url: String,
    pub request_timeout_secs: u64,
}

impl Default for SdkConfig {
    fn default() -> Self {
        Self {
            api_version: DEFAULT_API_VERSION.to_string(),
            min_interval_ms: DEFAULT_MIN_INTERVAL_MS,
            iframe_top: DEFAULT_IFRAME_TOP,
            secure_origin: false,
            binary_upload: true,
            max_retries: None,
            proxy_url: String::new(),
            base64_proxy_url: String::new(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

impl SdkConfig {
    /// Parse and validate a JSON config object.
    pub fn from_json(value: &Value) -> Result<Self, SdkError> {
        let mut config: SdkConfig = serde_json::from_value(value.clone())
            .map_err(|e| SdkError::Config(e.to_string()))?;
        config.proxy_url = normalize_proxy_url(&config.proxy_url);
        config.base64_proxy_url = normalize_proxy_url(&config.base64_proxy_url);
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), SdkError> {
        if self.api_version.trim().is_empty() {
            return Err(SdkError::Config("api_version must not be empty".into()));
        }
        if self.base64_proxy_url.is_empty() {
            return Err(SdkError::Config("base64_proxy_url is required".into()));
        }
        if self.binary_upload && self.proxy_url.is_empty() {
            return Err(SdkError::Config(
                "proxy_url is required when binary_upload is enabled".into(),
            ));
        }
        Ok(())
    }

    pub fn min_interval(&self) -> Duration {
        Duration::from_millis(self.min_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Normalise a proxy URL:
/// - trim surrounding whitespace
/// - ensure a scheme is present (https, or http for localhost)
///
/// Trailing slashes and query strings are kept: the binary proxy URL is used
/// as a prefix that the upload URL is appended to.
pub fn normalize_proxy_url(url: &str) -> String {
    let url = url.trim();
    if url.is_empty() {
        return String::new();
    }
    if url.starts_with("http://") || url.starts_with("https://") {
        return url.to_string();
    }
    if url.starts_with("localhost") || url.starts_with("127.0.0.1") {
        format!("http://{url}")
    } else {
        format!("https://{url}")
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
