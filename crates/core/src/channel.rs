use async_trait::async_trait;
use thiserror::Error;

/// Platform limit on outbound DM length, in characters.
pub const MAX_MESSAGE_CHARS: usize = 1000;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum SendError {
    #[error("API error (status {status}, code {code}): {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },
    #[error("request timed out")]
    Timeout,
    #[error("network error: {0}")]
    Network(String),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("sender not configured: {0}")]
    NotConfigured(String),
}

/// Successful send, with the platform's id for the new message.
#[derive(Debug, Clone, PartialEq)]
pub struct SendReceipt {
    pub message_id: Option<String>,
}

/// Outbound side of the messaging platform.
///
/// Implementations make exactly one attempt per call and report every failure
/// as a [`SendError`]; retry policy belongs to the caller.
#[async_trait]
pub trait MessageSender: Send + Sync {
    /// Short name for logs (e.g. "instagram").
    fn name(&self) -> &str;

    async fn send_text(&self, recipient_id: &str, text: &str) -> Result<SendReceipt, SendError>;
}

/// Cuts `text` to at most `max_chars` characters (not bytes).
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
