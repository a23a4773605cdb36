use axum::{
    extract::{
        multipart::{MultipartError, MultipartRejection},
        Multipart, State,
    },
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use vision_common::{Tier, VisionError};
use vision_usage_tracker::{Limit, UsageReport};

use crate::auth::AuthenticatedUser;
use crate::error::ApiError;
use crate::upload::UploadPolicy;
use crate::AppState;

const UPLOAD_FIELD: &str = "file";

/// Post-admission usage, so the caller's view matches `/api/usage`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UsageSnapshot {
    pub analyses_used: u64,
    pub limit: Limit,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AnalyzeResponse {
    pub success: bool,
    pub description: String,
    pub user_id: String,
    pub tier: Tier,
    pub usage: UsageSnapshot,
}

struct Upload {
    media_type: &'static str,
    bytes: Vec<u8>,
}

fn multipart_error(err: MultipartError, policy: &UploadPolicy) -> VisionError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        VisionError::PayloadTooLarge {
            max_bytes: policy.max_bytes,
        }
    } else {
        VisionError::InvalidUpload(err.body_text())
    }
}

async fn read_upload(multipart: &mut Multipart, policy: &UploadPolicy) -> Result<Upload, VisionError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, policy))?
    {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }

        let file_name = field.file_name().unwrap_or_default().to_string();
        let media_type = policy.media_type(&file_name)?;
        let bytes = field.bytes().await.map_err(|e| multipart_error(e, policy))?;
        policy.check_size(bytes.len())?;

        return Ok(Upload {
            media_type,
            bytes: bytes.to_vec(),
        });
    }

    Err(VisionError::InvalidUpload("No file uploaded".to_string()))
}

/// Validates the upload, admits one analysis against the caller's quota and
/// runs the image analysis. Quota is consumed on admission and is not
/// refunded if the analysis itself fails.
#[instrument(skip_all, fields(user_id = %user.user_id, tier = %user.tier))]
pub async fn analyze_handler(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<AnalyzeResponse>, ApiError> {
    let mut multipart =
        multipart.map_err(|rejection| VisionError::InvalidUpload(rejection.body_text()))?;
    let upload = read_upload(&mut multipart, &state.upload_policy).await?;

    let decision = state.tracker.evaluate(user.tier, &user.user_id).await?;
    if !decision.allowed {
        return Err(VisionError::QuotaExceeded {
            tier: user.tier,
            limit: decision.limit.as_count().unwrap_or_default(),
        }
        .into());
    }

    let description = state
        .analyzer
        .analyze(&upload.bytes, upload.media_type)
        .await
        .map_err(|err| {
            warn!("Analysis failed after admission, usage stays counted: {}", err);
            match err {
                failed @ VisionError::AnalysisFailed(_) => failed,
                other => VisionError::AnalysisFailed(other.to_string()),
            }
        })?;

    info!(analyses_used = decision.analyses_used, "Analysis completed");

    Ok(Json(AnalyzeResponse {
        success: true,
        description,
        user_id: user.user_id,
        tier: user.tier,
        usage: UsageSnapshot {
            analyses_used: decision.analyses_used,
            limit: decision.limit,
        },
    }))
}

#[instrument(skip_all, fields(user_id = %user.user_id, tier = %user.tier))]
pub async fn usage_handler(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<UsageReport>, ApiError> {
    let report = state.reporter.report(&user.user_id, user.tier).await?;
    Ok(Json(report))
}

pub async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "AI Vision Service",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
