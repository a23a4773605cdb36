pub mod analyzer;
pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod upload;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use vision_common::{IdentityVerifier, ImageAnalyzer, TierPolicy};
use vision_usage_tracker::{UsageReporter, UsageStorage, UsageTracker};

use upload::UploadPolicy;

// Multipart framing overhead allowed on top of the largest accepted file.
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

/// Shared state handed to every handler. The usage store behind `tracker`
/// and `reporter` is created once at startup and lives for the process.
#[derive(Clone)]
pub struct AppState {
    pub verifier: Arc<dyn IdentityVerifier>,
    pub analyzer: Arc<dyn ImageAnalyzer>,
    pub tracker: UsageTracker,
    pub reporter: UsageReporter,
    pub tier_policy: Arc<TierPolicy>,
    pub upload_policy: UploadPolicy,
}

impl AppState {
    pub fn new(
        verifier: Arc<dyn IdentityVerifier>,
        analyzer: Arc<dyn ImageAnalyzer>,
        storage: Arc<dyn UsageStorage>,
    ) -> Self {
        Self {
            verifier,
            analyzer,
            tracker: UsageTracker::new(storage.clone()),
            reporter: UsageReporter::new(storage),
            tier_policy: Arc::new(TierPolicy::default()),
            upload_policy: UploadPolicy::default(),
        }
    }

    pub fn with_tier_policy(mut self, policy: TierPolicy) -> Self {
        self.tier_policy = Arc::new(policy);
        self
    }

    pub fn with_upload_policy(mut self, policy: UploadPolicy) -> Self {
        self.upload_policy = policy;
        self
    }
}

pub fn create_app(state: AppState) -> Router {
    let body_limit = state.upload_policy.max_bytes + MULTIPART_OVERHEAD_BYTES;

    Router::new()
        .route("/api/health", get(handlers::health_handler))
        .route("/api/analyze", post(handlers::analyze_handler))
        .route("/api/usage", get(handlers::usage_handler))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
