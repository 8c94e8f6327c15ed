use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One inbound direct message pulled out of a webhook delivery.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InboundEvent {
    /// Platform id of the human sender; replies go here.
    #[serde(default)]
    pub sender_id: String,
    /// Account that received the message.
    #[serde(default)]
    pub recipient_id: String,
    /// `mid`, unique per physical message but redelivered by the transport.
    #[serde(default)]
    pub message_id: String,
    /// Absent for attachment-only messages, reactions, read receipts.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Platform timestamp (epoch millis) when present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
    #[serde(default)]
    pub has_attachments: bool,
}

/// Why an inbound event was dropped without a reply.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DiscardReason {
    WrongRecipient,
    NoText,
    MissingMessageId,
    MissingSender,
    Duplicate,
}

impl DiscardReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiscardReason::WrongRecipient => "wrong_recipient",
            DiscardReason::NoText => "no_text",
            DiscardReason::MissingMessageId => "missing_message_id",
            DiscardReason::MissingSender => "missing_sender",
            DiscardReason::Duplicate => "duplicate",
        }
    }
}

impl InboundEvent {
    pub fn new(sender_id: &str, recipient_id: &str, message_id: &str) -> Self {
        Self {
            sender_id: sender_id.to_string(),
            recipient_id: recipient_id.to_string(),
            message_id: message_id.to_string(),
            text: None,
            timestamp: None,
            has_attachments: false,
        }
    }

    /// Builder-style method to set text
    pub fn with_text(mut self, text: &str) -> Self {
        self.text = Some(text.to_string());
        self
    }

    /// Returns the message text if the event should be answered on behalf of
    /// `account_id`. Does not consult the dedupe ledger.
    pub fn actionable_text(&self, account_id: &str) -> Result<&str, DiscardReason> {
        if self.recipient_id != account_id {
            return Err(DiscardReason::WrongRecipient);
        }
        let text = match self.text.as_deref() {
            Some(t) if !t.is_empty() => t,
            _ => return Err(DiscardReason::NoText),
        };
        if self.message_id.is_empty() {
            return Err(DiscardReason::MissingMessageId);
        }
        if self.sender_id.is_empty() {
            return Err(DiscardReason::MissingSender);
        }
        Ok(text)
    }
}

/// Audit entry for one handled event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConversationRecord {
    pub timestamp: DateTime<Utc>,
    pub sender_id: String,
    pub message_id: String,
    pub inbound: String,
    pub reply: String,
    pub category: String,
    pub sent: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
