use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::error;
use vision_common::VisionError;
use vision_usage_tracker::UsageError;

const UPGRADE_PROMPT: &str = "Usage limit exceeded. Upgrade to Premium for unlimited analyses.";

/// API error response
#[derive(Debug, Serialize)]
pub struct ApiError {
    #[serde(skip)]
    pub status: StatusCode,
    pub error: String,
    pub code: String,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &str, error: impl Into<String>) -> Self {
        Self {
            status,
            error: error.into(),
            code: code.to_string(),
        }
    }
}

impl From<VisionError> for ApiError {
    fn from(err: VisionError) -> Self {
        match &err {
            VisionError::AuthInvalid(_) => {
                ApiError::new(StatusCode::UNAUTHORIZED, "AUTH_INVALID", err.to_string())
            }
            VisionError::QuotaExceeded { .. } => {
                ApiError::new(StatusCode::TOO_MANY_REQUESTS, "QUOTA_EXCEEDED", UPGRADE_PROMPT)
            }
            VisionError::AnalysisFailed(_) => {
                ApiError::new(StatusCode::BAD_GATEWAY, "ANALYSIS_FAILED", err.to_string())
            }
            VisionError::InvalidUpload(_) => {
                ApiError::new(StatusCode::BAD_REQUEST, "INVALID_UPLOAD", err.to_string())
            }
            VisionError::PayloadTooLarge { .. } => {
                ApiError::new(StatusCode::PAYLOAD_TOO_LARGE, "PAYLOAD_TOO_LARGE", err.to_string())
            }
            VisionError::Config(_) | VisionError::Storage(_) => {
                error!("Internal failure: {}", err);
                ApiError::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL",
                    "Internal server error",
                )
            }
        }
    }
}

impl From<UsageError> for ApiError {
    fn from(err: UsageError) -> Self {
        VisionError::from(err).into()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vision_common::Tier;

    #[test]
    fn test_domain_errors_have_distinct_statuses() {
        let cases = [
            (VisionError::AuthInvalid("x".into()), StatusCode::UNAUTHORIZED, "AUTH_INVALID"),
            (
                VisionError::QuotaExceeded { tier: Tier::Free, limit: 1 },
                StatusCode::TOO_MANY_REQUESTS,
                "QUOTA_EXCEEDED",
            ),
            (VisionError::AnalysisFailed("x".into()), StatusCode::BAD_GATEWAY, "ANALYSIS_FAILED"),
            (VisionError::InvalidUpload("x".into()), StatusCode::BAD_REQUEST, "INVALID_UPLOAD"),
            (
                VisionError::PayloadTooLarge { max_bytes: 10 },
                StatusCode::PAYLOAD_TOO_LARGE,
                "PAYLOAD_TOO_LARGE",
            ),
            (VisionError::Storage("x".into()), StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL"),
        ];

        for (err, status, code) in cases {
            let api: ApiError = err.into();
            assert_eq!(api.status, status);
            assert_eq!(api.code, code);
        }
    }

    #[test]
    fn test_internal_details_are_not_exposed() {
        let api: ApiError = UsageError::Storage("connection refused to 10.0.0.3".into()).into();
        assert_eq!(api.error, "Internal server error");
    }
}
