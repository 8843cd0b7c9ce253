//! Photo upload through the proxy.
//!
//! Uploads go out as a multipart file when the transport supports it. Any
//! failure on that path (decode, network, non-JSON reply) is followed by
//! exactly one retry through the base64 proxy, which takes the photo as a
//! url-encoded form field. A failure there is returned to the caller.

use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde_json::Value;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::blob::{self, Blob, JPEG_CONTENT_TYPE};
use crate::config::SdkConfig;
use crate::error::SdkError;
use crate::host::{friendly_error, status_error};

pub const DEFAULT_PHOTO_NAME: &str = "photo";

// ---------------------------------------------------------------------------
// Transport seam
// ---------------------------------------------------------------------------

/// HTTP primitives the uploader needs. Both posts resolve with the parsed
/// JSON reply body.
pub trait UploadTransport: Send + Sync {
    /// Whether multipart file uploads can be sent at all.
    fn supports_binary(&self) -> bool;

    fn post_multipart(
        &self,
        url: &str,
        field: &str,
        file_name: &str,
        blob: Blob,
    ) -> impl Future<Output = Result<Value, SdkError>> + Send;

    fn post_form(&self, url: &str, body: String)
        -> impl Future<Output = Result<Value, SdkError>> + Send;
}

/// `UploadTransport` backed by `reqwest`.
pub struct HttpUploadTransport {
    client: Client,
}

impl HttpUploadTransport {
    pub fn new(timeout: Duration) -> Result<Self, SdkError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SdkError::Transport(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self { client })
    }

    async fn read_json(url: &str, resp: reqwest::Response) -> Result<Value, SdkError> {
        let status = resp.status();
        if !status.is_success() {
            // The proxy reports upload errors as JSON too; keep parsing.
            warn!(url, status = status.as_u16(), "{}", status_error(status));
        }
        let body = resp
            .text()
            .await
            .map_err(|e| SdkError::Transport(friendly_error(url, &e)))?;
        serde_json::from_str(&body)
            .map_err(|e| SdkError::InvalidResponse(format!("non-JSON reply from {url}: {e}")))
    }
}

impl UploadTransport for HttpUploadTransport {
    fn supports_binary(&self) -> bool {
        true
    }

    async fn post_multipart(
        &self,
        url: &str,
        field: &str,
        file_name: &str,
        blob: Blob,
    ) -> Result<Value, SdkError> {
        let content_type = blob.content_type.clone();
        let part = Part::bytes(blob.into_bytes())
            .file_name(file_name.to_string())
            .mime_str(&content_type)
            .map_err(|e| SdkError::Transport(format!("Invalid content type {content_type}: {e}")))?;
        let form = Form::new().part(field.to_string(), part);

        let resp = self
            .client
            .post(url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| SdkError::Transport(friendly_error(url, &e)))?;
        Self::read_json(url, resp).await
    }

    async fn post_form(&self, url: &str, body: String) -> Result<Value, SdkError> {
        let resp = self
            .client
            .post(url)
            .header("content-type", "application/x-www-form-urlencoded")
            .body(body)
            .send()
            .await
            .map_err(|e| SdkError::Transport(friendly_error(url, &e)))?;
        Self::read_json(url, resp).await
    }
}

// ---------------------------------------------------------------------------
// Uploader
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Binary,
    Base64Form,
}

/// One upload try against one transport.
#[derive(Debug, Clone, Copy)]
pub struct UploadAttempt<'a> {
    pub url: &'a str,
    pub photo_base64: &'a str,
    pub photo_name: &'a str,
    pub transport: TransportKind,
}

pub struct PhotoUploader<T> {
    transport: T,
    proxy_url: String,
    base64_proxy_url: String,
    /// Decided once at construction.
    binary: bool,
}

impl<T: UploadTransport> PhotoUploader<T> {
    pub fn new(transport: T, config: &SdkConfig) -> Self {
        let binary = config.binary_upload && transport.supports_binary();
        if !binary {
            info!("binary uploads unavailable, using base64 proxy only");
        }
        Self {
            transport,
            proxy_url: config.proxy_url.clone(),
            base64_proxy_url: config.base64_proxy_url.clone(),
            binary,
        }
    }

    pub fn binary_enabled(&self) -> bool {
        self.binary
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Upload a base64 photo (data URI or bare base64) to `url` and return
    /// the proxy's JSON reply unchanged.
    pub async fn upload(
        &self,
        url: &str,
        photo_base64: &str,
        photo_name: Option<&str>,
    ) -> Result<Value, SdkError> {
        let photo_name = photo_name.unwrap_or(DEFAULT_PHOTO_NAME);
        let mut attempt = UploadAttempt {
            url,
            photo_base64,
            photo_name,
            transport: if self.binary {
                TransportKind::Binary
            } else {
                TransportKind::Base64Form
            },
        };

        if attempt.transport == TransportKind::Binary {
            match self.send(&attempt).await {
                Ok(result) => return Ok(result),
                Err(e) => {
                    warn!(error = %e, "binary upload failed, retrying as base64");
                    attempt.transport = TransportKind::Base64Form;
                }
            }
        }
        self.send(&attempt).await
    }

    async fn send(&self, attempt: &UploadAttempt<'_>) -> Result<Value, SdkError> {
        match attempt.transport {
            TransportKind::Binary => {
                let blob = blob::decode_to_blob(
                    blob::strip_data_uri(attempt.photo_base64),
                    JPEG_CONTENT_TYPE,
                )?;
                let target = format!("{}{}", self.proxy_url, attempt.url);
                let file_name = format!("{}.jpg", attempt.photo_name);
                debug!(bytes = blob.len(), %target, "binary upload");
                self.transport
                    .post_multipart(&target, attempt.photo_name, &file_name, blob)
                    .await
            }
            TransportKind::Base64Form => {
                let body = base64_form_body(attempt.url, attempt.photo_base64);
                debug!(bytes = body.len(), target = %self.base64_proxy_url, "base64 upload");
                self.transport.post_form(&self.base64_proxy_url, body).await
            }
        }
    }
}

/// `upload_url=<url>&file=<base64>`, both component-encoded.
pub fn base64_form_body(url: &str, photo_base64: &str) -> String {
    format!(
        "upload_url={}&file={}",
        encode_uri_component(url),
        encode_uri_component(photo_base64)
    )
}

/// Percent-encode everything outside `A-Z a-z 0-9 - _ . ! ~ * ' ( )`.
pub fn encode_uri_component(input: &str) -> String {
    let mut encoded = String::with_capacity(input.len());
    for b in input.bytes() {
        let is_unreserved = b.is_ascii_alphanumeric()
            || matches!(b, b'-' | b'_' | b'.' | b'!' | b'~' | b'*' | b'\'' | b'(' | b')');
        if is_unreserved {
            encoded.push(b as char);
        } else {
            encoded.push_str(&format!("%{b:02X}"));
        }
    }
    encoded
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
