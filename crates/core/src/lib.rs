pub mod audit;
pub mod channel;
pub mod classifier;
pub mod config;
pub mod dedupe;
pub mod extract;
pub mod metrics;
pub mod secrets;
pub mod service;
pub mod types;
pub mod verify;

use thiserror::Error;

/// Request-level webhook failures. Per-event problems are reported as
/// [`service::EventOutcome`] values instead.
#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("webhook verification failed")]
    VerificationFailed,
    #[error("webhook signature mismatch")]
    SignatureMismatch,
    #[error("malformed payload: {0}")]
    MalformedPayload(String),
}

impl WebhookError {
    /// HTTP status shared by every transport adapter.
    pub fn status_code(&self) -> u16 {
        match self {
            WebhookError::VerificationFailed => 403,
            WebhookError::SignatureMismatch => 401,
            WebhookError::MalformedPayload(_) => 500,
        }
    }
}
