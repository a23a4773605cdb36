use crate::{limit_for, Result, UsageReport, UsageStorage};
use std::sync::Arc;
use vision_common::Tier;

/// Read-only usage view. Only ever calls [`UsageStorage::get`], so reporting
/// can never consume quota.
#[derive(Clone)]
pub struct UsageReporter {
    storage: Arc<dyn UsageStorage>,
}

impl UsageReporter {
    pub fn new(storage: Arc<dyn UsageStorage>) -> Self {
        Self { storage }
    }

    pub async fn report(&self, user_id: &str, tier: Tier) -> Result<UsageReport> {
        let record = self.storage.get(user_id).await?;
        Ok(UsageReport {
            user_id: record.user_id,
            tier,
            analyses_used: record.analyses_used,
            limit: limit_for(tier),
        })
    }
}
