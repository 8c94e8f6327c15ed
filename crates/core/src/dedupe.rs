use std::collections::{HashMap, VecDeque};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::Mutex;

#[derive(Debug, Clone, Copy)]
pub struct DedupePolicy {
    /// Entries older than this are forgotten. 0 keeps them forever.
    pub ttl_secs: u64,
    /// Oldest entries are evicted past this size. 0 means unbounded.
    pub max_entries: usize,
}

impl Default for DedupePolicy {
    fn default() -> Self {
        Self {
            ttl_secs: 86_400,
            max_entries: 10_000,
        }
    }
}

#[derive(Debug, Default)]
struct DedupeCache {
    entries: HashMap<String, i64>,
    order: VecDeque<(String, i64)>,
}

/// Set of message ids that already had a reply attempted.
///
/// Every mutation runs under one lock, so two concurrent deliveries of the
/// same id cannot both observe it as new through `check_and_mark`.
#[derive(Debug, Default)]
pub struct DedupeLedger {
    policy: DedupePolicy,
    cache: Mutex<DedupeCache>,
}

fn now_epoch_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

impl DedupeCache {
    fn expire(&mut self, now: i64, ttl_secs: i64) {
        while let Some((old_key, old_ts)) = self.order.front() {
            if now - *old_ts > ttl_secs {
                let old_key = old_key.clone();
                let old_ts = *old_ts;
                self.order.pop_front();
                if self.entries.get(&old_key).is_some_and(|ts| *ts == old_ts) {
                    self.entries.remove(&old_key);
                }
            } else {
                break;
            }
        }
    }

    fn evict_to(&mut self, max_entries: usize) {
        while self.entries.len() > max_entries {
            let Some((evict_key, evict_ts)) = self.order.pop_front() else {
                break;
            };
            if self
                .entries
                .get(&evict_key)
                .is_some_and(|ts| *ts == evict_ts)
            {
                self.entries.remove(&evict_key);
            }
        }
    }
}

impl DedupeLedger {
    pub fn new(policy: DedupePolicy) -> Self {
        Self {
            policy,
            cache: Mutex::new(DedupeCache::default()),
        }
    }

    /// Atomically records `message_id` and reports whether it was new.
    /// Returns `false` for a duplicate; the caller must not reply.
    pub async fn check_and_mark(&self, message_id: &str) -> bool {
        self.check_and_mark_at(message_id, now_epoch_secs()).await
    }

    pub(crate) async fn check_and_mark_at(&self, message_id: &str, now: i64) -> bool {
        let mut cache = self.cache.lock().await;
        let ttl = self.policy.ttl_secs as i64;

        if ttl > 0 {
            cache.expire(now, ttl);
        }

        if cache.entries.contains_key(message_id) {
            return false;
        }

        let key = message_id.to_string();
        cache.entries.insert(key.clone(), now);
        cache.order.push_back((key, now));

        if self.policy.max_entries > 0 {
            cache.evict_to(self.policy.max_entries);
        }

        true
    }

    /// Read-only query. Use [`DedupeLedger::check_and_mark`] to gate replies.
    pub async fn is_new(&self, message_id: &str) -> bool {
        let cache = self.cache.lock().await;
        match cache.entries.get(message_id) {
            Some(ts) => {
                let ttl = self.policy.ttl_secs as i64;
                ttl > 0 && now_epoch_secs() - *ts > ttl
            }
            None => true,
        }
    }

    /// Records `message_id` unconditionally. An id already present keeps its
    /// first-seen time. Reply gating goes through [`DedupeLedger::check_and_mark`],
    /// which is this and [`DedupeLedger::is_new`] under a single lock.
    pub async fn mark_seen(&self, message_id: &str) {
        self.check_and_mark(message_id).await;
    }

    pub async fn len(&self) -> usize {
        self.cache.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
