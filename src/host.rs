//! Host platform seams.
//!
//! The host exposes three channels to embedded content: an RPC facility
//! (`HostApi`), client-side window methods (`HostUi`) and a stream of
//! notifications (`HostEvent`) that the embedding code feeds into
//! [`crate::session::Session::handle_event`].
//!
//! `HttpHostApi` is a concrete RPC channel that reaches the platform's public
//! REST endpoint directly, for apps running outside the host page.

use reqwest::{Client, StatusCode};
use serde_json::{Map, Value};
use std::future::Future;
use std::time::Duration;
use tracing::debug;

use crate::error::SdkError;

/// RPC parameters: string keys to JSON values.
pub type Params = Map<String, Value>;

pub const DEFAULT_API_BASE: &str = "https://api.vk.com";

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Host remote procedure facility.
///
/// Resolves with the raw reply envelope, either `{"response": ...}` or
/// `{"error": {"error_code": ..., ...}}`. `Err` is reserved for failures to
/// reach the host at all.
pub trait HostApi: Send + Sync {
    fn api(
        &self,
        method: &str,
        params: &Params,
    ) -> impl Future<Output = Result<Value, SdkError>> + Send;
}

/// Client-side host methods (window control, dialogs) plus SDK init.
pub trait HostUi: Send + Sync {
    /// Initialise the host SDK for the given API version.
    fn init(&self, api_version: &str) -> impl Future<Output = Result<(), SdkError>> + Send;

    /// Fire-and-forget call of a host window method (`scrollWindow`,
    /// `showOrderBox`, `resizeWindow`, ...).
    fn call_method(&self, name: &str, args: Vec<Value>);
}

/// Notification delivered by the host page.
#[derive(Debug, Clone, PartialEq)]
pub enum HostEvent {
    /// Parent page scrolled; `position` is relative to the host page.
    Scroll { position: i64, window_height: i64 },
    OrderCancel,
    OrderFail { error_code: i64 },
    OrderSuccess { order_id: i64 },
}

// ---------------------------------------------------------------------------
// REST channel
// ---------------------------------------------------------------------------

/// `HostApi` over the platform's REST endpoint (`POST {base}/method/{name}`).
pub struct HttpHostApi {
    client: Client,
    api_base: String,
    access_token: String,
}

impl HttpHostApi {
    pub fn new(api_base: &str, access_token: &str, timeout: Duration) -> Result<Self, SdkError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SdkError::Transport(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            api_base: api_base.trim().trim_end_matches('/').to_string(),
            access_token: access_token.to_string(),
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/method/{method}", self.api_base)
    }
}

impl HostApi for HttpHostApi {
    async fn api(&self, method: &str, params: &Params) -> Result<Value, SdkError> {
        let url = self.method_url(method);
        let mut form = form_fields(params);
        form.push(("access_token".to_string(), self.access_token.clone()));

        debug!(method, "host rest call");
        let resp = self
            .client
            .post(&url)
            .form(&form)
            .send()
            .await
            .map_err(|e| SdkError::Transport(friendly_error(&self.api_base, &e)))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(SdkError::Transport(status_error(status)));
        }
        let body = resp
            .text()
            .await
            .map_err(|e| SdkError::Transport(friendly_error(&self.api_base, &e)))?;
        Ok(serde_json::from_str(&body)?)
    }
}

/// Flatten params into form fields the way the REST endpoint expects:
/// strings verbatim, booleans as `1`/`0`, arrays comma-joined, objects as
/// JSON text. Nulls are dropped.
pub fn form_fields(params: &Params) -> Vec<(String, String)> {
    params
        .iter()
        .filter_map(|(k, v)| form_value(v).map(|s| (k.clone(), s)))
        .collect()
}

fn form_value(v: &Value) -> Option<String> {
    match v {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(if *b { "1" } else { "0" }.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Array(items) => Some(
            items
                .iter()
                .filter_map(form_value)
                .collect::<Vec<_>>()
                .join(","),
        ),
        Value::Object(_) => Some(v.to_string()),
    }
}

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

/// Convert a `reqwest::Error` into a readable message.
pub(crate) fn friendly_error(url: &str, err: &reqwest::Error) -> String {
    if err.is_connect() {
        return format!("Cannot reach {url}");
    }
    if err.is_timeout() {
        return format!("Connection to {url} timed out");
    }
    if err.is_builder() {
        return format!("Invalid URL: {url}");
    }
    if err.is_decode() {
        return format!("Malformed response from {url}: {err}");
    }
    format!("Network error communicating with {url}: {err}")
}

/// Convert an HTTP status code into a readable message.
pub(crate) fn status_error(status: StatusCode) -> String {
    match status.as_u16() {
        404 => "Endpoint not found (HTTP 404)".to_string(),
        413 => "Payload too large (HTTP 413)".to_string(),
        429 => "Too many requests (HTTP 429)".to_string(),
        s if s >= 500 => format!("Server error (HTTP {s})"),
        s => format!("Unexpected response (HTTP {s})"),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
