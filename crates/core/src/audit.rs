use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;
use tracing::info;

use crate::types::ConversationRecord;

#[derive(Serialize)]
struct AuditEvent<'a> {
    event_type: &'static str,
    #[serde(flatten)]
    record: &'a ConversationRecord,
}

/// Emits the record as one JSON line on the `audit` target.
pub fn log_audit(record: &ConversationRecord) {
    let event = AuditEvent {
        event_type: "conversation",
        record,
    };
    if let Ok(json_str) = serde_json::to_string(&event) {
        info!(target: "audit", "{}", json_str);
    }
}

/// Append-only conversation log, bounded to the most recent `capacity` records.
#[derive(Debug)]
pub struct ConversationLog {
    capacity: usize,
    records: Mutex<VecDeque<ConversationRecord>>,
    total: AtomicU64,
}

impl ConversationLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            records: Mutex::new(VecDeque::new()),
            total: AtomicU64::new(0),
        }
    }

    pub async fn append(&self, record: ConversationRecord) {
        log_audit(&record);
        let mut records = self.records.lock().await;
        records.push_back(record);
        while records.len() > self.capacity {
            records.pop_front();
        }
        self.total.fetch_add(1, Ordering::Relaxed);
    }

    /// Up to `n` newest records, oldest first.
    pub async fn recent(&self, n: usize) -> Vec<ConversationRecord> {
        let records = self.records.lock().await;
        let skip = records.len().saturating_sub(n);
        records.iter().skip(skip).cloned().collect()
    }

    /// Records appended over the process lifetime, including evicted ones.
    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }
}
