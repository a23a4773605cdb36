// Vision Usage Tracker - per-identity quota accounting for image analyses
use thiserror::Error;
use vision_common::VisionError;

mod report;
mod storage;
mod tracker;
mod types;

pub use report::UsageReporter;
pub use storage::{InMemoryStorage, UsageStorage};
pub use tracker::{limit_for, UsageTracker, FREE_TIER_LIMIT};
pub use types::*;
pub use vision_common::Tier;

// Error Types
#[derive(Error, Debug)]
pub enum UsageError {
    #[error("Storage error: {0}")]
    Storage(String),
}

pub type Result<T> = std::result::Result<T, UsageError>;

impl From<UsageError> for VisionError {
    fn from(err: UsageError) -> Self {
        match err {
            UsageError::Storage(message) => VisionError::Storage(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_limits() {
        assert_eq!(limit_for(Tier::Free), Limit::Limited(1));
        assert_eq!(limit_for(Tier::Premium), Limit::Unlimited);
    }

    #[test]
    fn test_storage_error_maps_to_vision_error() {
        let err: VisionError = UsageError::Storage("disk full".to_string()).into();
        assert!(matches!(err, VisionError::Storage(ref m) if m == "disk full"));
    }
}
