use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::audit::ConversationLog;
use crate::channel::{MessageSender, SendError};
use crate::classifier::{classify_detailed, Category};
use crate::config::AppConfig;
use crate::dedupe::{DedupeLedger, DedupePolicy};
use crate::extract::{events, parse_payload};
use crate::metrics::{MetricsSnapshot, MetricsStore};
use crate::types::{ConversationRecord, DiscardReason, InboundEvent};
use crate::verify::{verify_signature, verify_subscription, VerifyQuery};
use crate::WebhookError;

/// Terminal state of one inbound event.
#[derive(Debug, Clone, PartialEq)]
pub enum EventOutcome {
    Discarded(DiscardReason),
    Replied { category: Category },
    SendFailed { category: Category, error: SendError },
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct DeliveryReport {
    pub delivery_id: String,
    pub events: usize,
    pub replied: usize,
    pub failed: usize,
    pub discarded: usize,
    pub duplicates: usize,
}

impl DeliveryReport {
    fn record(&mut self, outcome: &EventOutcome) {
        self.events += 1;
        match outcome {
            EventOutcome::Discarded(DiscardReason::Duplicate) => self.duplicates += 1,
            EventOutcome::Discarded(_) => self.discarded += 1,
            EventOutcome::Replied { .. } => self.replied += 1,
            EventOutcome::SendFailed { .. } => self.failed += 1,
        }
    }
}

pub const TOKEN_TYPE: &str = "Instagram User Access Token";

/// `config` section of `/stats`. `ig_id` duplicates `account_id` for
/// dashboards that read the older field name.
#[derive(Debug, Clone, Serialize)]
pub struct StatsConfigView {
    pub account_id: String,
    pub ig_id: String,
    pub brand: String,
    pub api_version: String,
    pub token_type: &'static str,
}

/// Body of `GET /stats`.
#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    pub timestamp: DateTime<Utc>,
    pub uptime_seconds: f64,
    pub config: StatsConfigView,
    pub stats: MetricsSnapshot,
    pub conversations: u64,
    pub messages_processed: usize,
    pub recent_conversations: Vec<ConversationRecord>,
}

/// Webhook pipeline: verify → extract → dedupe → classify → send → record.
///
/// Owns all mutable process state (ledger, counters, conversation log). Both
/// transport adapters hold it behind an `Arc` and call into it per request.
pub struct AutoReplyService {
    config: AppConfig,
    sender: Arc<dyn MessageSender>,
    ledger: DedupeLedger,
    metrics: MetricsStore,
    conversations: ConversationLog,
}

impl AutoReplyService {
    pub fn new(config: AppConfig, sender: Arc<dyn MessageSender>) -> Self {
        let ledger = DedupeLedger::new(DedupePolicy {
            ttl_secs: config.dedupe_ttl_secs,
            max_entries: config.dedupe_max_entries,
        });
        let conversations = ConversationLog::new(config.conversation_log_capacity);
        Self {
            config,
            sender,
            ledger,
            metrics: MetricsStore::new(),
            conversations,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Subscription handshake. Mutates nothing.
    pub fn verify(&self, query: &VerifyQuery) -> Result<String, WebhookError> {
        verify_subscription(query, &self.config.verify_token)
    }

    /// Handles one webhook delivery. Events are processed sequentially in
    /// payload order; a failure on one event never stops its siblings.
    pub async fn handle_delivery(
        &self,
        body: &[u8],
        signature: Option<&str>,
    ) -> Result<DeliveryReport, WebhookError> {
        let delivery_id = Uuid::new_v4().to_string();
        let span = info_span!("delivery", delivery_id = %delivery_id);
        self.handle_delivery_inner(delivery_id, body, signature)
            .instrument(span)
            .await
    }

    async fn handle_delivery_inner(
        &self,
        delivery_id: String,
        body: &[u8],
        signature: Option<&str>,
    ) -> Result<DeliveryReport, WebhookError> {
        self.metrics.inc_received();
        info!(bytes = body.len(), "webhook delivery received");

        if let Some(secret) = self.config.app_secret.as_deref().filter(|s| !s.is_empty()) {
            if !verify_signature(signature, body, secret) {
                self.metrics.inc_errors();
                warn!("webhook signature mismatch, delivery rejected");
                return Err(WebhookError::SignatureMismatch);
            }
        }

        let payload = match parse_payload(body) {
            Ok(p) => p,
            Err(e) => {
                self.metrics.inc_errors();
                error!(error = %e, "failed to parse webhook delivery");
                return Err(e);
            }
        };

        let mut report = DeliveryReport {
            delivery_id,
            ..DeliveryReport::default()
        };
        for event in events(&payload) {
            let outcome = self.process_event(event).await;
            report.record(&outcome);
        }

        info!(
            events = report.events,
            replied = report.replied,
            failed = report.failed,
            discarded = report.discarded,
            duplicates = report.duplicates,
            "webhook delivery processed"
        );
        Ok(report)
    }

    /// Runs a single event through dedupe, classification and send.
    pub async fn process_event(&self, event: InboundEvent) -> EventOutcome {
        let text = match event.actionable_text(&self.config.account_id) {
            Ok(t) => t,
            Err(reason) => {
                debug!(
                    message_id = %event.message_id,
                    sender = %event.sender_id,
                    recipient = %event.recipient_id,
                    timestamp = ?event.timestamp,
                    has_attachments = event.has_attachments,
                    reason = reason.as_str(),
                    "event skipped"
                );
                return EventOutcome::Discarded(reason);
            }
        };

        // Marked before sending: a failed send is not retried by redelivery.
        if !self.ledger.check_and_mark(&event.message_id).await {
            info!(message_id = %event.message_id, "duplicate delivery skipped");
            return EventOutcome::Discarded(DiscardReason::Duplicate);
        }

        let classification = classify_detailed(text, &self.config.brand_name);
        info!(
            message_id = %event.message_id,
            sender = %event.sender_id,
            category = %classification.category,
            "reply generated"
        );

        let result = self
            .sender
            .send_text(&event.sender_id, &classification.reply)
            .await;

        let (outcome, sent, error_detail) = match result {
            Ok(receipt) => {
                self.metrics.inc_sent();
                info!(
                    message_id = %event.message_id,
                    sender = %event.sender_id,
                    reply_id = receipt.message_id.as_deref().unwrap_or("unknown"),
                    "reply sent"
                );
                (
                    EventOutcome::Replied {
                        category: classification.category,
                    },
                    true,
                    None,
                )
            }
            Err(err) => {
                self.metrics.inc_errors();
                error!(
                    message_id = %event.message_id,
                    sender = %event.sender_id,
                    channel = self.sender.name(),
                    error = %err,
                    "reply send failed"
                );
                let detail = err.to_string();
                (
                    EventOutcome::SendFailed {
                        category: classification.category,
                        error: err,
                    },
                    false,
                    Some(detail),
                )
            }
        };

        self.conversations
            .append(ConversationRecord {
                timestamp: Utc::now(),
                sender_id: event.sender_id.clone(),
                message_id: event.message_id.clone(),
                inbound: text.to_string(),
                reply: classification.reply,
                category: classification.category.as_str().to_string(),
                sent,
                error: error_detail,
            })
            .await;

        outcome
    }

    pub async fn stats(&self) -> StatsSnapshot {
        let stats = self.metrics.snapshot();
        StatsSnapshot {
            timestamp: Utc::now(),
            uptime_seconds: stats.uptime_secs,
            config: StatsConfigView {
                account_id: self.config.account_id.clone(),
                ig_id: self.config.account_id.clone(),
                brand: self.config.brand_name.clone(),
                api_version: self.config.api_version.clone(),
                token_type: TOKEN_TYPE,
            },
            stats,
            conversations: self.conversations.total(),
            messages_processed: self.ledger.len().await,
            recent_conversations: self.conversations.recent(self.config.stats_recent).await,
        }
    }

    pub fn health(&self) -> Value {
        json!({
            "status": "healthy",
            "service": "autodm",
            "timestamp": Utc::now().to_rfc3339(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::SendReceipt;
    use crate::verify::sign_body;
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    const ACCOUNT: &str = "1784";

    /// Records every call; fails when `fail` is set.
    #[derive(Default)]
    struct RecordingSender {
        calls: StdMutex<Vec<(String, String)>>,
        fail: bool,
        delay_ms: u64,
    }

    impl RecordingSender {
        fn calls(&self) -> Vec<(String, String)> {
            self.calls.lock().expect("lock").clone()
        }
    }

    #[async_trait]
    impl MessageSender for RecordingSender {
        fn name(&self) -> &str {
            "recording"
        }

        async fn send_text(&self, recipient_id: &str, text: &str) -> Result<SendReceipt, SendError> {
            self.calls
                .lock()
                .expect("lock")
                .push((recipient_id.to_string(), text.to_string()));
            if self.delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
            }
            if self.fail {
                return Err(SendError::Api {
                    status: 400,
                    code: "10".into(),
                    message: "Application does not have permission".into(),
                });
            }
            Ok(SendReceipt {
                message_id: Some("out.1".into()),
            })
        }
    }

    fn config() -> AppConfig {
        AppConfig {
            access_token: "token".into(),
            account_id: ACCOUNT.into(),
            verify_token: "verify-me".into(),
            brand_name: "Acme".into(),
            ..AppConfig::default()
        }
    }

    fn service_with(sender: Arc<RecordingSender>, config: AppConfig) -> AutoReplyService {
        AutoReplyService::new(config, sender)
    }

    fn delivery(items: Vec<Value>) -> Vec<u8> {
        serde_json::to_vec(&json!({
            "object": "instagram",
            "entry": [{"id": ACCOUNT, "messaging": items}]
        }))
        .expect("serialize")
    }

    fn message(sender: &str, mid: &str, text: &str) -> Value {
        json!({
            "sender": {"id": sender},
            "recipient": {"id": ACCOUNT},
            "message": {"mid": mid, "text": text}
        })
    }

    #[tokio::test]
    async fn replies_to_actionable_event() {
        let sender = Arc::new(RecordingSender::default());
        let svc = service_with(sender.clone(), config());

        let report = svc
            .handle_delivery(&delivery(vec![message("u1", "mid.1", "how much?")]), None)
            .await
            .expect("delivery");

        assert_eq!(report.replied, 1);
        let calls = sender.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "u1");
        assert!(calls[0].1.starts_with("Great question!"));

        let stats = svc.stats().await;
        assert_eq!(stats.stats.total_received, 1);
        assert_eq!(stats.stats.total_sent, 1);
        assert_eq!(stats.stats.total_errors, 0);
        assert_eq!(stats.messages_processed, 1);
        assert_eq!(stats.recent_conversations.len(), 1);
        assert!(stats.recent_conversations[0].sent);
        assert_eq!(stats.recent_conversations[0].category, "price");
    }

    #[tokio::test]
    async fn redelivery_is_answered_once() {
        let sender = Arc::new(RecordingSender::default());
        let svc = service_with(sender.clone(), config());
        let body = delivery(vec![message("u1", "mid.dup", "hello")]);

        svc.handle_delivery(&body, None).await.expect("first");
        let second = svc.handle_delivery(&body, None).await.expect("second");

        assert_eq!(second.duplicates, 1);
        assert_eq!(sender.calls().len(), 1);
        let stats = svc.stats().await;
        assert_eq!(stats.stats.total_received, 2);
        assert_eq!(stats.stats.total_sent, 1);
        assert_eq!(stats.recent_conversations.len(), 1);
    }

    #[tokio::test]
    async fn concurrent_redeliveries_send_once() {
        let sender = Arc::new(RecordingSender {
            delay_ms: 20,
            ..RecordingSender::default()
        });
        let svc = Arc::new(service_with(sender.clone(), config()));
        let body = Arc::new(delivery(vec![message("u1", "mid.race", "hi")]));

        let tasks = (0..8).map(|_| {
            let svc = svc.clone();
            let body = body.clone();
            tokio::spawn(async move { svc.handle_delivery(&body, None).await })
        });
        for res in futures::future::join_all(tasks).await {
            res.expect("join").expect("delivery");
        }

        assert_eq!(sender.calls().len(), 1);
        let stats = svc.stats().await;
        assert_eq!(stats.stats.total_sent, 1);
        assert_eq!(stats.stats.total_received, 8);
    }

    #[tokio::test]
    async fn missing_text_is_discarded_without_send() {
        let sender = Arc::new(RecordingSender::default());
        let svc = service_with(sender.clone(), config());
        let body = delivery(vec![json!({
            "sender": {"id": "u1"},
            "recipient": {"id": ACCOUNT},
            "message": {"mid": "mid.img", "attachments": [{"type": "image"}]}
        })]);

        let report = svc.handle_delivery(&body, None).await.expect("delivery");

        assert_eq!(report.discarded, 1);
        assert!(sender.calls().is_empty());
        let stats = svc.stats().await;
        assert_eq!(stats.stats.total_received, 1);
        assert_eq!(stats.stats.total_sent, 0);
        assert_eq!(stats.stats.total_errors, 0);
        assert_eq!(stats.messages_processed, 0);
    }

    #[tokio::test]
    async fn attachment_only_event_is_skipped_as_no_text() {
        let sender = Arc::new(RecordingSender::default());
        let svc = service_with(sender.clone(), config());
        let mut event = InboundEvent::new("u1", ACCOUNT, "mid.img");
        event.has_attachments = true;
        event.timestamp = Some(1_700_000_000_000);

        let outcome = svc.process_event(event).await;

        assert_eq!(outcome, EventOutcome::Discarded(DiscardReason::NoText));
        assert!(sender.calls().is_empty());
        assert_eq!(svc.stats().await.messages_processed, 0);
    }

    #[tokio::test]
    async fn whitespace_text_gets_default_reply() {
        let sender = Arc::new(RecordingSender::default());
        let svc = service_with(sender.clone(), config());

        let report = svc
            .handle_delivery(&delivery(vec![message("u1", "mid.blank", "   ")]), None)
            .await
            .expect("delivery");

        assert_eq!((report.replied, report.discarded), (1, 0));
        let calls = sender.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(
            calls[0].1,
            "Hey! 👋 Thanks for reaching out to Acme. How can I help you today?"
        );
        let stats = svc.stats().await;
        assert_eq!(stats.recent_conversations[0].category, "default");
    }

    #[tokio::test]
    async fn wrong_recipient_is_discarded() {
        let sender = Arc::new(RecordingSender::default());
        let svc = service_with(sender.clone(), config());
        let body = delivery(vec![json!({
            "sender": {"id": ACCOUNT},
            "recipient": {"id": "someone-else"},
            "message": {"mid": "mid.echo", "text": "hello", "is_echo": true}
        })]);

        let report = svc.handle_delivery(&body, None).await.expect("delivery");

        assert_eq!(report.discarded, 1);
        assert!(sender.calls().is_empty());
    }

    #[tokio::test]
    async fn send_failure_is_counted_and_recorded() {
        let sender = Arc::new(RecordingSender {
            fail: true,
            ..RecordingSender::default()
        });
        let svc = service_with(sender.clone(), config());

        let report = svc
            .handle_delivery(&delivery(vec![message("u1", "mid.f", "yes")]), None)
            .await
            .expect("delivery still succeeds");

        assert_eq!(report.failed, 1);
        let stats = svc.stats().await;
        assert_eq!(stats.stats.total_errors, 1);
        assert_eq!(stats.stats.total_sent, 0);
        let rec = &stats.recent_conversations[0];
        assert!(!rec.sent);
        assert!(rec.error.as_deref().unwrap_or_default().contains("code 10"));

        // Still marked as seen: redelivery does not retry.
        svc.handle_delivery(&delivery(vec![message("u1", "mid.f", "yes")]), None)
            .await
            .expect("redelivery");
        assert_eq!(sender.calls().len(), 1);
    }

    #[tokio::test]
    async fn failure_does_not_abort_siblings() {
        let sender = Arc::new(RecordingSender::default());
        let svc = service_with(sender.clone(), config());
        let body = delivery(vec![
            json!({"sender": {"id": "u0"}, "recipient": {"id": ACCOUNT}}),
            message("u1", "mid.a", "hello"),
            message("u1", "mid.a", "hello"),
            message("u2", "mid.b", "nope"),
        ]);

        let report = svc.handle_delivery(&body, None).await.expect("delivery");

        assert_eq!(report.events, 4);
        assert_eq!(report.discarded, 1);
        assert_eq!(report.duplicates, 1);
        assert_eq!(report.replied, 2);
        let recipients: Vec<String> = sender.calls().into_iter().map(|(r, _)| r).collect();
        assert_eq!(recipients, vec!["u1", "u2"]);
    }

    #[tokio::test]
    async fn malformed_payload_counts_received_and_error() {
        let sender = Arc::new(RecordingSender::default());
        let svc = service_with(sender.clone(), config());

        let err = svc.handle_delivery(b"not json", None).await.unwrap_err();

        assert!(matches!(err, WebhookError::MalformedPayload(_)));
        assert_eq!(err.status_code(), 500);
        let stats = svc.stats().await;
        assert_eq!(stats.stats.total_received, 1);
        assert_eq!(stats.stats.total_errors, 1);
        assert!(sender.calls().is_empty());
    }

    #[tokio::test]
    async fn signature_is_enforced_when_secret_configured() {
        let sender = Arc::new(RecordingSender::default());
        let svc = service_with(
            sender.clone(),
            AppConfig {
                app_secret: Some("app-secret".into()),
                ..config()
            },
        );
        let body = delivery(vec![message("u1", "mid.s", "hello")]);

        let err = svc.handle_delivery(&body, Some("sha256=00")).await.unwrap_err();
        assert!(matches!(err, WebhookError::SignatureMismatch));
        assert!(sender.calls().is_empty());

        let sig = sign_body(&body, "app-secret");
        let report = svc.handle_delivery(&body, Some(&sig)).await.expect("signed");
        assert_eq!(report.replied, 1);
    }

    #[tokio::test]
    async fn verify_uses_configured_token() {
        let svc = service_with(Arc::new(RecordingSender::default()), config());
        let ok = VerifyQuery {
            mode: Some("subscribe".into()),
            verify_token: Some("verify-me".into()),
            challenge: Some("X".into()),
        };
        assert_eq!(svc.verify(&ok).expect("verified"), "X");
        let bad = VerifyQuery {
            verify_token: Some("wrong".into()),
            ..ok
        };
        assert_eq!(svc.verify(&bad).unwrap_err().status_code(), 403);
        assert_eq!(svc.metrics().total_received, 0);
    }
}
