use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Service level controlling the analysis quota.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Free,
    Premium,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Free => "free",
            Tier::Premium => "premium",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Claims carried by an identity token.
///
/// Only the fields the service acts on are modelled; everything else in the
/// token payload is ignored. Metadata is set out of band by an administrator
/// and may be stale until the user obtains a fresh token.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claims {
    pub sub: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nbf: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
    #[serde(default)]
    pub public_metadata: PublicMetadata,
    #[serde(default)]
    pub subscription: Subscription,
}

impl Claims {
    pub fn new(sub: impl Into<String>) -> Self {
        Self {
            sub: sub.into(),
            exp: None,
            nbf: None,
            iss: None,
            public_metadata: PublicMetadata::default(),
            subscription: Subscription::default(),
        }
    }

    pub fn with_tier(mut self, tier: impl Into<String>) -> Self {
        self.public_metadata.tier = Some(tier.into());
        self
    }

    pub fn with_plan(mut self, plan: impl Into<String>) -> Self {
        self.subscription.plan = Some(plan.into());
        self
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PublicMetadata {
    #[serde(default, deserialize_with = "lenient_string")]
    pub tier: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Subscription {
    #[serde(default, deserialize_with = "lenient_string")]
    pub plan: Option<String>,
}

// Metadata is free-form on the provider side; a non-string value is treated
// as absent rather than rejecting the whole token.
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Lenient {
        Text(String),
        Other(serde::de::IgnoredAny),
    }

    Ok(match Option::<Lenient>::deserialize(deserializer)? {
        Some(Lenient::Text(value)) => Some(value),
        Some(Lenient::Other(_)) | None => None,
    })
}

/// Maps claims to an effective tier.
///
/// The `public_metadata.tier` claim is authoritative: exactly `"premium"`
/// grants premium. When `premium_plan_key` is set, a subscription plan
/// containing that key (case-insensitive) grants premium as well.
#[derive(Debug, Clone, Default)]
pub struct TierPolicy {
    pub premium_plan_key: Option<String>,
}

impl TierPolicy {
    pub fn with_plan_key(key: impl Into<String>) -> Self {
        Self {
            premium_plan_key: Some(key.into().to_lowercase()),
        }
    }

    pub fn resolve(&self, claims: &Claims) -> Tier {
        if claims.public_metadata.tier.as_deref() == Some("premium") {
            return Tier::Premium;
        }

        if let (Some(key), Some(plan)) = (&self.premium_plan_key, &claims.subscription.plan) {
            if !key.is_empty() && plan.to_lowercase().contains(key.as_str()) {
                return Tier::Premium;
            }
        }

        Tier::Free
    }
}

pub fn resolve_tier(claims: &Claims) -> Tier {
    TierPolicy::default().resolve(claims)
}
