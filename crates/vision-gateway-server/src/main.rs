use color_eyre::eyre;
use std::sync::Arc;
use tracing::{info, warn};
use vision_common::{IdentityVerifier, TierPolicy};
use vision_gateway_server::{
    analyzer::OpenAiAnalyzer,
    auth::JwtVerifier,
    config::GatewayConfig,
    create_app,
    upload::UploadPolicy,
    AppState,
};
use vision_usage_tracker::InMemoryStorage;

async fn build_verifier(config: &GatewayConfig) -> eyre::Result<Arc<dyn IdentityVerifier>> {
    let mut verifier = match &config.jwks_url {
        Some(url) => {
            let client = reqwest::Client::new();
            let jwks = JwtVerifier::fetch_jwks(&client, url).await?;
            JwtVerifier::from_jwks(&jwks)?
        }
        None => {
            warn!("No JWKS configured, accepting HS256 tokens signed with the shared secret only");
            JwtVerifier::new()
        }
    };

    if let Some(secret) = &config.hs256_secret {
        verifier = verifier.with_hs256_secret(secret.as_bytes());
    }
    if let Some(issuer) = &config.issuer {
        verifier = verifier.with_issuer(issuer.clone());
    }

    Ok(Arc::new(verifier.with_leeway(config.leeway_secs)))
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    dotenvy::dotenv().ok();
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,vision_gateway_server=debug".into()),
        )
        .init();

    info!("Starting AI Vision Service...");
    let config = GatewayConfig::from_env()?;

    let verifier = build_verifier(&config).await?;
    let analyzer = Arc::new(OpenAiAnalyzer::new(config.analyzer.clone())?);

    // Usage counters live in memory: a restart resets every identity to zero.
    let storage = Arc::new(InMemoryStorage::new());

    let tier_policy = match &config.premium_plan_key {
        Some(key) => TierPolicy::with_plan_key(key.clone()),
        None => TierPolicy::default(),
    };

    let state = AppState::new(verifier, analyzer, storage)
        .with_tier_policy(tier_policy)
        .with_upload_policy(UploadPolicy {
            max_bytes: config.max_upload_bytes,
        });

    let app = create_app(state);

    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("AI Vision Service listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
