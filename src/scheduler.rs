//! Rate-limited RPC scheduler.
//!
//! Every call to the host goes through one [`Scheduler`] per host
//! connection. Calls are spaced at least `min_interval` apart (the host
//! rejects more than three per second) and replies carrying a transient
//! error code are resent unchanged.
//!
//! The throttle slot is reserved synchronously when `invoke` is entered,
//! before the first suspension point, so back-to-back callers queue behind
//! each other instead of all observing a free slot. Dispatch order therefore
//! follows reservation order; replies may still complete out of order.

use serde::Deserialize;
use serde_json::Value;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::SdkConfig;
use crate::error::{ApiError, SdkError};
use crate::host::{HostApi, Params};

/// Bound on transient-error retries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryPolicy {
    /// `None` keeps retrying for as long as the host answers with a
    /// transient code.
    pub max_retries: Option<u32>,
}

impl RetryPolicy {
    pub fn unbounded() -> Self {
        Self { max_retries: None }
    }

    pub fn capped(max_retries: u32) -> Self {
        Self {
            max_retries: Some(max_retries),
        }
    }

    fn allows(&self, retries_so_far: u32) -> bool {
        self.max_retries.map_or(true, |max| retries_so_far < max)
    }
}

/// One in-flight invocation.
#[derive(Debug, Clone)]
pub struct PendingCall {
    pub method: String,
    pub params: Params,
    pub issued_at: Instant,
}

/// Reply envelope produced by the host RPC facility.
#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    response: Option<Value>,
    #[serde(default)]
    error: Option<ApiError>,
}

enum Reply {
    Ok(Value),
    Transient(ApiError),
    Failed(ApiError),
}

fn classify(raw: Value) -> Result<Reply, SdkError> {
    let envelope: Envelope = serde_json::from_value(raw)?;
    Ok(match envelope.error {
        Some(err) if err.is_transient() => Reply::Transient(err),
        Some(err) => Reply::Failed(err),
        None => Reply::Ok(envelope.response.unwrap_or(Value::Null)),
    })
}

pub struct Scheduler<H> {
    host: H,
    api_version: String,
    secure_origin: bool,
    min_interval: Duration,
    retry: RetryPolicy,
    /// Instant of the most recently reserved dispatch slot.
    last_dispatch: Mutex<Option<Instant>>,
}

impl<H: HostApi> Scheduler<H> {
    pub fn new(host: H, config: &SdkConfig) -> Self {
        Self {
            host,
            api_version: config.api_version.clone(),
            secure_origin: config.secure_origin,
            min_interval: config.min_interval(),
            retry: RetryPolicy {
                max_retries: config.max_retries,
            },
            last_dispatch: Mutex::new(None),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn api_version(&self) -> &str {
        &self.api_version
    }

    /// Call a host method, resolving with the `response` payload.
    pub async fn invoke(&self, method: &str, params: Params) -> Result<Value, SdkError> {
        if method.trim().is_empty() {
            return Err(SdkError::MissingParameter("method"));
        }
        let call = PendingCall {
            method: method.to_string(),
            params: self.prepare_params(params),
            issued_at: Instant::now(),
        };

        let mut retries: u32 = 0;
        loop {
            let slot = self.reserve_slot();
            if slot > Instant::now() {
                tokio::time::sleep_until(slot).await;
            }

            let raw = self.host.api(&call.method, &call.params).await?;
            match classify(raw)? {
                Reply::Ok(response) => {
                    debug!(
                        method = %call.method,
                        retries,
                        elapsed_ms = call.issued_at.elapsed().as_millis() as u64,
                        "host call complete"
                    );
                    return Ok(response);
                }
                Reply::Failed(err) => {
                    debug!(method = %call.method, code = err.error_code, "host call failed");
                    return Err(SdkError::Api(err));
                }
                Reply::Transient(err) => {
                    if !self.retry.allows(retries) {
                        warn!(
                            method = %call.method,
                            code = err.error_code,
                            retries,
                            "retry budget exhausted"
                        );
                        return Err(SdkError::Api(err));
                    }
                    retries = retries.saturating_add(1);
                    warn!(
                        method = %call.method,
                        code = err.error_code,
                        attempt = retries,
                        "transient host error, retrying"
                    );
                }
            }
        }
    }

    /// Inject the API version (caller's non-empty value wins) and the https
    /// flag.
    fn prepare_params(&self, mut params: Params) -> Params {
        let has_version = match params.get("v") {
            None | Some(Value::Null) => false,
            Some(Value::String(s)) => !s.is_empty(),
            Some(_) => true,
        };
        if !has_version {
            params.insert("v".to_string(), Value::String(self.api_version.clone()));
        }
        if self.secure_origin {
            params.insert("https".to_string(), Value::from(1));
        }
        params
    }

    /// Reserve the next dispatch slot and return the instant it opens.
    ///
    /// The read and the write of `last_dispatch` happen under one lock that is
    /// never held across an await.
    fn reserve_slot(&self) -> Instant {
        let now = Instant::now();
        let mut last = self
            .last_dispatch
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let slot = match *last {
            Some(prev) => {
                let earliest = prev + self.min_interval;
                if earliest > now {
                    earliest
                } else {
                    now
                }
            }
            None => now,
        };
        *last = Some(slot);
        slot
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
