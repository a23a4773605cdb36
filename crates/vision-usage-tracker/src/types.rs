use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use vision_common::Tier;

const UNLIMITED: &str = "unlimited";

/// A quota ceiling. `Unlimited` crosses serialization boundaries as the
/// string `"unlimited"` rather than a large sentinel integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Limit {
    Limited(u64),
    Unlimited,
}

impl Limit {
    pub fn as_count(&self) -> Option<u64> {
        match self {
            Limit::Limited(n) => Some(*n),
            Limit::Unlimited => None,
        }
    }
}

impl Serialize for Limit {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Limit::Limited(n) => serializer.serialize_u64(*n),
            Limit::Unlimited => serializer.serialize_str(UNLIMITED),
        }
    }
}

impl<'de> Deserialize<'de> for Limit {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Count(u64),
            Sentinel(String),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Count(n) => Ok(Limit::Limited(n)),
            Repr::Sentinel(s) if s == UNLIMITED => Ok(Limit::Unlimited),
            Repr::Sentinel(s) => Err(serde::de::Error::custom(format!(
                "expected an integer or \"{UNLIMITED}\", got \"{s}\""
            ))),
        }
    }
}

/// Per-identity usage counter. Created lazily on the first quota check and
/// mutated only through [`crate::UsageStorage::try_consume`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UsageRecord {
    pub user_id: String,
    pub analyses_used: u64,
    pub window_start: DateTime<Utc>,
}

impl UsageRecord {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            analyses_used: 0,
            window_start: Utc::now(),
        }
    }
}

/// Outcome of a single admission attempt. Never persisted.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct QuotaDecision {
    pub allowed: bool,
    pub remaining: Limit,
    pub limit: Limit,
    /// Counter value after this decision was applied.
    pub analyses_used: u64,
}

impl QuotaDecision {
    pub fn admitted(limit: Limit, analyses_used: u64) -> Self {
        let remaining = match limit {
            Limit::Limited(max) => Limit::Limited(max.saturating_sub(analyses_used)),
            Limit::Unlimited => Limit::Unlimited,
        };
        Self {
            allowed: true,
            remaining,
            limit,
            analyses_used,
        }
    }

    pub fn denied(limit: Limit, analyses_used: u64) -> Self {
        Self {
            allowed: false,
            remaining: Limit::Limited(0),
            limit,
            analyses_used,
        }
    }
}

/// Read-only usage view returned by the reporting endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UsageReport {
    pub user_id: String,
    pub tier: Tier,
    pub analyses_used: u64,
    pub limit: Limit,
}
