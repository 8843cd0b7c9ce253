//! VK iframe SDK bridge.
//!
//! Lets an embedded (iframe) app call the host platform's API through a
//! single rate-limited, retrying channel and upload photos through a proxy
//! that accepts either multipart files or base64 form fields.
//!
//! - [`scheduler::Scheduler`] spaces host calls at least 333 ms apart and
//!   resends calls rejected with a transient error code.
//! - [`upload::PhotoUploader`] tries a multipart upload first and falls back
//!   to the base64 proxy once.
//! - [`session::Session`] builds the wall-share, album-save, order-dialog and
//!   scroll-tracking workflows on top of both.

pub mod blob;
pub mod config;
pub mod error;
pub mod events;
pub mod host;
pub mod logging;
pub mod scheduler;
pub mod session;
pub mod upload;

pub use config::SdkConfig;
pub use error::{ApiError, SdkError};
pub use events::{Lifecycle, ScrollEvent, Subscription};
pub use host::{HostApi, HostEvent, HostUi, HttpHostApi, Params};
pub use scheduler::{RetryPolicy, Scheduler};
pub use session::{OrderOutcome, SavePhoto, Session, SharePhoto, WindowSize};
pub use upload::{HttpUploadTransport, PhotoUploader, UploadTransport};

/// Session whose uploads go through `reqwest`.
pub fn http_session<H>(
    host: H,
    config: &SdkConfig,
) -> Result<Session<H, HttpUploadTransport>, SdkError>
where
    H: HostApi + HostUi,
{
    config.validate()?;
    let transport = HttpUploadTransport::new(config.request_timeout())?;
    Ok(Session::new(host, transport, config))
}

/// Scheduler talking to the platform's REST endpoint with `access_token`.
pub fn rest_scheduler(
    config: &SdkConfig,
    api_base: &str,
    access_token: &str,
) -> Result<Scheduler<HttpHostApi>, SdkError> {
    let host = HttpHostApi::new(api_base, access_token, config.request_timeout())?;
    Ok(Scheduler::new(host, config))
}
