use crate::{Limit, QuotaDecision, Result, UsageRecord};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::debug;

/// Backing store for usage records.
///
/// `try_consume` is the single mutating operation and must be atomic per
/// identity: the read, the comparison against `limit` and the increment
/// happen in one critical section. Durable implementations keep the same
/// contract (e.g. a conditional update) and report infrastructure failures
/// as [`crate::UsageError::Storage`].
#[async_trait]
pub trait UsageStorage: Send + Sync {
    /// Returns the record for `user_id`, or a zeroed record if none exists.
    /// Never creates a record.
    async fn get(&self, user_id: &str) -> Result<UsageRecord>;

    async fn try_consume(&self, user_id: &str, limit: Limit) -> Result<QuotaDecision>;
}

// In-memory storage. Lives as long as the process: counters start empty and
// a restart silently resets every identity to zero.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStorage {
    records: Arc<DashMap<String, UsageRecord>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl UsageStorage for InMemoryStorage {
    async fn get(&self, user_id: &str) -> Result<UsageRecord> {
        Ok(self
            .records
            .get(user_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_else(|| UsageRecord::new(user_id)))
    }

    async fn try_consume(&self, user_id: &str, limit: Limit) -> Result<QuotaDecision> {
        // The entry guard holds the shard write lock until it drops at the end
        // of this block, so no other caller can observe the count in between.
        let decision = {
            let mut record = self
                .records
                .entry(user_id.to_string())
                .or_insert_with(|| UsageRecord::new(user_id));

            match limit {
                Limit::Unlimited => {
                    record.analyses_used = record.analyses_used.saturating_add(1);
                    QuotaDecision::admitted(limit, record.analyses_used)
                }
                Limit::Limited(max) if record.analyses_used < max => {
                    record.analyses_used += 1;
                    QuotaDecision::admitted(limit, record.analyses_used)
                }
                Limit::Limited(_) => QuotaDecision::denied(limit, record.analyses_used),
            }
        };

        debug!(
            user_id,
            allowed = decision.allowed,
            analyses_used = decision.analyses_used,
            "quota check"
        );
        Ok(decision)
    }
}
