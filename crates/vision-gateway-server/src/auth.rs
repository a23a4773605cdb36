//! Bearer token verification.
//!
//! Tokens are compact JWS strings. RS256 tokens are checked against the
//! identity provider's published JWKS, looked up by `kid`; HS256 tokens are
//! accepted only when a shared secret is configured (local development).

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use ring::{hmac, signature};
use serde::Deserialize;
use std::collections::HashMap;
use tracing::{debug, info};
use vision_common::{Claims, IdentityVerifier, Result, Tier, VerifiedIdentity, VisionError};

use crate::error::ApiError;
use crate::AppState;

#[derive(Debug, Clone, Deserialize)]
pub struct JwkSet {
    pub keys: Vec<Jwk>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Jwk {
    pub kty: String,
    pub kid: Option<String>,
    pub alg: Option<String>,
    #[serde(rename = "use")]
    pub key_use: Option<String>,
    pub n: Option<String>,
    pub e: Option<String>,
}

#[derive(Debug, Deserialize)]
struct JwsHeader {
    alg: String,
    kid: Option<String>,
}

#[derive(Debug, Clone)]
struct RsaKey {
    n: Vec<u8>,
    e: Vec<u8>,
}

pub struct JwtVerifier {
    rsa_keys: HashMap<String, RsaKey>,
    hmac_key: Option<hmac::Key>,
    issuer: Option<String>,
    leeway_secs: i64,
}

fn invalid(reason: impl Into<String>) -> VisionError {
    VisionError::AuthInvalid(reason.into())
}

fn decode_segment(segment: &str) -> Result<Vec<u8>> {
    URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|_| invalid("malformed token"))
}

impl Default for JwtVerifier {
    fn default() -> Self {
        Self::new()
    }
}

impl JwtVerifier {
    /// A verifier with no keys rejects every token until keys are added.
    pub fn new() -> Self {
        Self {
            rsa_keys: HashMap::new(),
            hmac_key: None,
            issuer: None,
            leeway_secs: 0,
        }
    }

    /// Builds a verifier from a JWKS document. Non-RSA and encryption keys
    /// are skipped.
    pub fn from_jwks(set: &JwkSet) -> Result<Self> {
        let mut verifier = Self::new();

        for (index, jwk) in set.keys.iter().enumerate() {
            if jwk.kty != "RSA" || jwk.key_use.as_deref().is_some_and(|u| u != "sig") {
                debug!(kid = ?jwk.kid, kty = %jwk.kty, "skipping unsupported JWK");
                continue;
            }
            let (Some(n), Some(e)) = (&jwk.n, &jwk.e) else {
                return Err(VisionError::Config(format!(
                    "JWK {index} is missing its modulus or exponent"
                )));
            };
            let key = RsaKey {
                n: URL_SAFE_NO_PAD
                    .decode(n)
                    .map_err(|err| VisionError::Config(format!("JWK {index} modulus: {err}")))?,
                e: URL_SAFE_NO_PAD
                    .decode(e)
                    .map_err(|err| VisionError::Config(format!("JWK {index} exponent: {err}")))?,
            };
            let kid = jwk.kid.clone().unwrap_or_default();
            verifier.rsa_keys.insert(kid, key);
        }

        if verifier.rsa_keys.is_empty() {
            return Err(VisionError::Config(
                "JWKS contains no RSA signing keys".to_string(),
            ));
        }

        Ok(verifier)
    }

    pub fn hs256(secret: &[u8]) -> Self {
        Self::new().with_hs256_secret(secret)
    }

    pub fn with_hs256_secret(mut self, secret: &[u8]) -> Self {
        self.hmac_key = Some(hmac::Key::new(hmac::HMAC_SHA256, secret));
        self
    }

    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = Some(issuer.into());
        self
    }

    pub fn with_leeway(mut self, leeway_secs: i64) -> Self {
        self.leeway_secs = leeway_secs.max(0);
        self
    }

    /// Fetches the provider's published key set. Called once at startup.
    pub async fn fetch_jwks(client: &reqwest::Client, url: &str) -> Result<JwkSet> {
        let set = client
            .get(url)
            .send()
            .await
            .and_then(|resp| resp.error_for_status())
            .map_err(|e| VisionError::Config(format!("Failed to fetch JWKS from {url}: {e}")))?
            .json::<JwkSet>()
            .await
            .map_err(|e| VisionError::Config(format!("Invalid JWKS from {url}: {e}")))?;

        info!(url, keys = set.keys.len(), "Loaded identity provider key set");
        Ok(set)
    }

    fn rsa_key(&self, kid: Option<&str>) -> Result<&RsaKey> {
        match kid {
            Some(kid) => self.rsa_keys.get(kid),
            None if self.rsa_keys.len() == 1 => self.rsa_keys.values().next(),
            None => None,
        }
        .ok_or_else(|| invalid("unknown signing key"))
    }

    fn verify_signature(&self, header: &JwsHeader, message: &[u8], sig: &[u8]) -> Result<()> {
        match header.alg.as_str() {
            "RS256" => {
                let key = self.rsa_key(header.kid.as_deref())?;
                signature::RsaPublicKeyComponents {
                    n: &key.n,
                    e: &key.e,
                }
                .verify(&signature::RSA_PKCS1_2048_8192_SHA256, message, sig)
                .map_err(|_| invalid("signature verification failed"))
            }
            "HS256" => {
                let key = self
                    .hmac_key
                    .as_ref()
                    .ok_or_else(|| invalid("HS256 tokens are not accepted"))?;
                hmac::verify(key, message, sig).map_err(|_| invalid("signature verification failed"))
            }
            other => Err(invalid(format!("unsupported algorithm {other}"))),
        }
    }

    fn check_claims(&self, claims: &Claims, now: i64) -> Result<()> {
        if claims.sub.is_empty() {
            return Err(invalid("token has no subject"));
        }

        let exp = claims.exp.ok_or_else(|| invalid("token has no expiry"))?;
        if now > exp.saturating_add(self.leeway_secs) {
            return Err(invalid("token expired"));
        }

        if let Some(nbf) = claims.nbf {
            if now.saturating_add(self.leeway_secs) < nbf {
                return Err(invalid("token not yet valid"));
            }
        }

        if let Some(expected) = &self.issuer {
            if claims.iss.as_deref() != Some(expected.as_str()) {
                return Err(invalid("unexpected issuer"));
            }
        }

        Ok(())
    }
}

impl IdentityVerifier for JwtVerifier {
    fn verify(&self, token: &str) -> Result<VerifiedIdentity> {
        let mut segments = token.split('.');
        let (Some(header_b64), Some(payload_b64), Some(sig_b64), None) = (
            segments.next(),
            segments.next(),
            segments.next(),
            segments.next(),
        ) else {
            return Err(invalid("malformed token"));
        };

        let header: JwsHeader = serde_json::from_slice(&decode_segment(header_b64)?)
            .map_err(|_| invalid("malformed token header"))?;
        let signature = decode_segment(sig_b64)?;
        let signing_input = &token[..header_b64.len() + 1 + payload_b64.len()];

        self.verify_signature(&header, signing_input.as_bytes(), &signature)?;

        let claims: Claims = serde_json::from_slice(&decode_segment(payload_b64)?)
            .map_err(|_| invalid("malformed token claims"))?;
        self.check_claims(&claims, chrono::Utc::now().timestamp())?;

        Ok(VerifiedIdentity::new(claims))
    }
}

/// Extracts the credential from an `Authorization: Bearer <token>` header.
pub fn bearer_token(headers: &HeaderMap) -> Result<&str> {
    let value = headers
        .get(AUTHORIZATION)
        .ok_or_else(|| invalid("missing bearer token"))?
        .to_str()
        .map_err(|_| invalid("malformed authorization header"))?;

    let (scheme, token) = value
        .split_once(' ')
        .ok_or_else(|| invalid("malformed authorization header"))?;
    if !scheme.eq_ignore_ascii_case("bearer") || token.trim().is_empty() {
        return Err(invalid("missing bearer token"));
    }
    Ok(token.trim())
}

/// A request whose bearer token verified, with its tier already resolved.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user_id: String,
    pub tier: Tier,
}

#[async_trait]
impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> std::result::Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers)?;
        let identity = state.verifier.verify(token)?;
        let tier = state.tier_policy.resolve(&identity.claims);
        Ok(AuthenticatedUser {
            user_id: identity.user_id,
            tier,
        })
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use serde_json::Value;

    pub(crate) const TEST_SECRET: &[u8] = b"test-signing-secret";

    pub(crate) fn sign_hs256(secret: &[u8], claims: &Value) -> String {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
        let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
        let signing_input = format!("{header}.{payload}");
        let key = hmac::Key::new(hmac::HMAC_SHA256, secret);
        let tag = hmac::sign(&key, signing_input.as_bytes());
        format!("{signing_input}.{}", URL_SAFE_NO_PAD.encode(tag.as_ref()))
    }

    pub(crate) fn future_exp() -> i64 {
        chrono::Utc::now().timestamp() + 3600
    }
}
