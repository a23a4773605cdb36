use crate::{Limit, QuotaDecision, Result, UsageStorage};
use std::sync::Arc;
use tracing::{info, warn};
use vision_common::Tier;

/// Lifetime analyses granted to a free-tier identity. There is no automatic
/// reset; counters only clear when the in-memory store is recreated.
pub const FREE_TIER_LIMIT: u64 = 1;

/// The tier limit table. Every other component asks here.
pub fn limit_for(tier: Tier) -> Limit {
    match tier {
        Tier::Free => Limit::Limited(FREE_TIER_LIMIT),
        Tier::Premium => Limit::Unlimited,
    }
}

/// Quota policy engine: turns a tier into a limit and performs the atomic
/// admission against the store.
#[derive(Clone)]
pub struct UsageTracker {
    storage: Arc<dyn UsageStorage>,
}

impl UsageTracker {
    pub fn new(storage: Arc<dyn UsageStorage>) -> Self {
        Self { storage }
    }

    /// Attempts to admit one analysis for `user_id`. A denied decision leaves
    /// the counter untouched; an allowed one has already been counted.
    pub async fn evaluate(&self, tier: Tier, user_id: &str) -> Result<QuotaDecision> {
        let limit = limit_for(tier);
        let decision = self.storage.try_consume(user_id, limit).await?;

        if decision.allowed {
            info!(
                user_id,
                %tier,
                analyses_used = decision.analyses_used,
                "analysis admitted"
            );
        } else {
            warn!(
                user_id,
                %tier,
                analyses_used = decision.analyses_used,
                "usage limit reached"
            );
        }

        Ok(decision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::InMemoryStorage;

    #[tokio::test]
    async fn test_free_tier_single_admission() {
        let tracker = UsageTracker::new(Arc::new(InMemoryStorage::new()));

        let first = tracker.evaluate(Tier::Free, "u1").await.unwrap();
        assert!(first.allowed);
        assert_eq!(first.remaining, Limit::Limited(0));
        assert_eq!(first.limit, Limit::Limited(FREE_TIER_LIMIT));

        let second = tracker.evaluate(Tier::Free, "u1").await.unwrap();
        assert!(!second.allowed);
        assert_eq!(second.remaining, Limit::Limited(0));
        assert_eq!(second.analyses_used, 1);
    }

    #[tokio::test]
    async fn test_premium_never_denied() {
        let tracker = UsageTracker::new(Arc::new(InMemoryStorage::new()));
        for expected in 1..=10 {
            let decision = tracker.evaluate(Tier::Premium, "u2").await.unwrap();
            assert!(decision.allowed);
            assert_eq!(decision.remaining, Limit::Unlimited);
            assert_eq!(decision.analyses_used, expected);
        }
    }

    #[tokio::test]
    async fn test_upgrade_after_free_quota_used() {
        let tracker = UsageTracker::new(Arc::new(InMemoryStorage::new()));
        assert!(tracker.evaluate(Tier::Free, "u3").await.unwrap().allowed);
        assert!(!tracker.evaluate(Tier::Free, "u3").await.unwrap().allowed);

        // A fresh token carrying the premium claim lifts the limit but keeps
        // the running count.
        let decision = tracker.evaluate(Tier::Premium, "u3").await.unwrap();
        assert!(decision.allowed);
        assert_eq!(decision.analyses_used, 2);
    }
}
