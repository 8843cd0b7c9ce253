//! Error types shared by the scheduler, the uploader and the session layer.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Too many requests per second.
pub const ERROR_RATE_LIMITED: i64 = 6;
/// Request signature rejected by the host; usually clears on resend.
pub const ERROR_INVALID_SIGNATURE: i64 = 4;
/// The user dismissed the wall-post confirmation.
pub const ERROR_CANCELLED_BY_USER: i64 = 10007;

/// Error object carried in a host RPC envelope (`{"error": {...}}`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Error)]
#[error("host api error {error_code}: {}", .error_msg.as_deref().unwrap_or("no message"))]
pub struct ApiError {
    pub error_code: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_msg: Option<String>,
    /// Everything else the host attached (request params echo, captcha data...).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ApiError {
    pub fn new(error_code: i64, error_msg: impl Into<String>) -> Self {
        Self {
            error_code,
            error_msg: Some(error_msg.into()),
            extra: Map::new(),
        }
    }

    /// Codes that are retried unchanged by the scheduler.
    pub fn is_transient(&self) -> bool {
        matches!(
            self.error_code,
            ERROR_RATE_LIMITED | ERROR_INVALID_SIGNATURE
        )
    }
}

#[derive(Debug, Error)]
pub enum SdkError {
    /// Terminal error reported by the host platform.
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("Canceled by user")]
    Cancelled,

    #[error("{0} is not defined")]
    MissingParameter(&'static str),

    #[error("invalid base64 payload: {0}")]
    Decode(String),

    #[error("{0}")]
    Transport(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("order failed with code {code}")]
    OrderFailed { code: i64 },

    #[error("order dialog superseded by a newer request")]
    OrderSuperseded,

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl SdkError {
    /// `true` when the user backed out of a confirmation dialog.
    pub fn is_cancel(&self) -> bool {
        matches!(self, SdkError::Cancelled)
    }

    /// Host error code, when this error came from the host.
    pub fn api_code(&self) -> Option<i64> {
        match self {
            SdkError::Api(e) => Some(e.error_code),
            SdkError::OrderFailed { code } => Some(*code),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for SdkError {
    fn from(e: serde_json::Error) -> Self {
        SdkError::InvalidResponse(e.to_string())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
