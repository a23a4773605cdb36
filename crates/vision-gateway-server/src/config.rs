use std::str::FromStr;
use std::time::Duration;
use vision_common::{Result, VisionError};

use crate::analyzer::AnalyzerConfig;
use crate::upload::DEFAULT_MAX_UPLOAD_BYTES;

/// Gateway configuration, read from the environment (and `.env`).
#[derive(Clone, Debug)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
    pub jwks_url: Option<String>,
    pub hs256_secret: Option<String>,
    pub issuer: Option<String>,
    pub leeway_secs: i64,
    pub premium_plan_key: Option<String>,
    pub max_upload_bytes: usize,
    pub analyzer: AnalyzerConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            jwks_url: None,
            hs256_secret: None,
            issuer: None,
            leeway_secs: 5,
            premium_plan_key: None,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            analyzer: AnalyzerConfig::default(),
        }
    }
}

fn parse<T: FromStr>(key: &str, value: Option<String>, default: T) -> Result<T> {
    match value {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| VisionError::Config(format!("{key} has an invalid value: {raw}"))),
        None => Ok(default),
    }
}

impl GatewayConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let config = Self {
            host: get("VISION_HOST").unwrap_or(defaults.host),
            port: parse("VISION_PORT", get("VISION_PORT"), defaults.port)?,
            jwks_url: get("CLERK_JWKS_URL"),
            hs256_secret: get("JWT_HS256_SECRET"),
            issuer: get("JWT_ISSUER"),
            leeway_secs: parse("JWT_LEEWAY_SECS", get("JWT_LEEWAY_SECS"), defaults.leeway_secs)?,
            premium_plan_key: get("PREMIUM_PLAN_KEY"),
            max_upload_bytes: parse(
                "MAX_UPLOAD_BYTES",
                get("MAX_UPLOAD_BYTES"),
                defaults.max_upload_bytes,
            )?,
            analyzer: AnalyzerConfig {
                api_key: get("OPENAI_API_KEY").ok_or_else(|| {
                    VisionError::Config("OPENAI_API_KEY must be set".to_string())
                })?,
                base_url: get("OPENAI_BASE_URL").unwrap_or(defaults.analyzer.base_url),
                model: get("OPENAI_MODEL").unwrap_or(defaults.analyzer.model),
                max_tokens: parse(
                    "OPENAI_MAX_TOKENS",
                    get("OPENAI_MAX_TOKENS"),
                    defaults.analyzer.max_tokens,
                )?,
                timeout: Duration::from_secs(parse(
                    "OPENAI_TIMEOUT_SECS",
                    get("OPENAI_TIMEOUT_SECS"),
                    defaults.analyzer.timeout.as_secs(),
                )?),
            },
        };

        if config.jwks_url.is_none() && config.hs256_secret.is_none() {
            return Err(VisionError::Config(
                "Either CLERK_JWKS_URL or JWT_HS256_SECRET must be set".to_string(),
            ));
        }

        Ok(config)
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
