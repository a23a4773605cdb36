// Shared identity, tier and collaborator types for the vision quota service

use async_trait::async_trait;
pub use serde::{Deserialize, Serialize};
use thiserror::Error;

mod claims;

pub use claims::{resolve_tier, Claims, PublicMetadata, Subscription, Tier, TierPolicy};

#[derive(Error, Debug)]
pub enum VisionError {
    #[error("Authentication failed: {0}")]
    AuthInvalid(String),

    #[error("Usage limit exceeded: {tier} tier allows {limit} analyses")]
    QuotaExceeded { tier: Tier, limit: u64 },

    #[error("Analysis failed: {0}")]
    AnalysisFailed(String),

    #[error("Invalid upload: {0}")]
    InvalidUpload(String),

    #[error("File too large: maximum size is {max_bytes} bytes")]
    PayloadTooLarge { max_bytes: usize },

    #[error("Configuration Error: {0}")]
    Config(String),

    #[error("Storage Error: {0}")]
    Storage(String),
}

pub type Result<T> = std::result::Result<T, VisionError>;

/// An identity asserted by the identity provider, together with the claims
/// carried by the token it was extracted from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedIdentity {
    pub user_id: String,
    pub claims: Claims,
}

impl VerifiedIdentity {
    pub fn new(claims: Claims) -> Self {
        Self {
            user_id: claims.sub.clone(),
            claims,
        }
    }
}

/// Verifies bearer credentials issued by the external identity provider.
///
/// Implementations must be deterministic and side-effect free. Any failure,
/// whether a missing, malformed, expired or badly signed token, is reported
/// as [`VisionError::AuthInvalid`].
pub trait IdentityVerifier: Send + Sync {
    fn verify(&self, token: &str) -> Result<VerifiedIdentity>;
}

/// The image-understanding collaborator. Failures are reported as
/// [`VisionError::AnalysisFailed`] and are never retried by the caller.
#[async_trait]
pub trait ImageAnalyzer: Send + Sync {
    async fn analyze(&self, image: &[u8], media_type: &str) -> Result<String>;
}
