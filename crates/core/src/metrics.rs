use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MetricsSnapshot {
    pub total_received: u64,
    pub total_sent: u64,
    pub total_errors: u64,
    pub start_time: DateTime<Utc>,
    #[serde(skip)]
    pub uptime_secs: f64,
}

/// Process-lifetime counters. Monotonic; never reset.
#[derive(Debug)]
pub struct MetricsStore {
    started: Instant,
    start_time: DateTime<Utc>,
    total_received: AtomicU64,
    total_sent: AtomicU64,
    total_errors: AtomicU64,
}

impl Default for MetricsStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsStore {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            start_time: Utc::now(),
            total_received: AtomicU64::new(0),
            total_sent: AtomicU64::new(0),
            total_errors: AtomicU64::new(0),
        }
    }

    pub fn inc_received(&self) {
        self.total_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_sent(&self) {
        self.total_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_errors(&self) {
        self.total_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            total_received: self.total_received.load(Ordering::Relaxed),
            total_sent: self.total_sent.load(Ordering::Relaxed),
            total_errors: self.total_errors.load(Ordering::Relaxed),
            start_time: self.start_time,
            uptime_secs: self.started.elapsed().as_secs_f64(),
        }
    }
}
