use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Message returned to callers for every server-side failure.
/// Root causes only go to the error log and tracing output.
pub const GENERIC_FAILURE_MESSAGE: &str =
    "Failed to generate the analysis. Please try again later.";

/// Message returned when the caller's plan does not include the feature
pub const UPGRADE_MESSAGE: &str =
    "Your current plan does not include funnel analysis. Upgrade your plan to unlock it.";

/// Application error types
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Missing or invalid bearer token
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Request body is missing required fields or is malformed
    #[error("Validation error: {0}")]
    Validation(String),

    /// Plan does not entitle the caller to the feature
    #[error("Access denied: {0}")]
    AccessDenied(String),

    /// Neither a service-level nor a global AI configuration is active
    #[error("No active AI configuration for service '{0}'")]
    ConfigNotFound(String),

    /// Provider referenced by the configuration is missing, inactive or has no credentials
    #[error("Provider not configured: {0}")]
    ProviderNotConfigured(String),

    /// Provider HTTP call failed (non-2xx, connect error or timeout)
    #[error("Provider error{}: {message}", .status.map(|s| format!(" ({s})")).unwrap_or_default())]
    Provider { status: Option<u16>, message: String },

    /// Provider answered 2xx but the content is not the expected JSON
    #[error("Malformed provider response: {0}")]
    MalformedProviderResponse(String),

    /// Cache read or write failed (never surfaced to callers)
    #[error("Cache error: {0}")]
    Cache(String),

    /// Aggregate counter update failed (never surfaced to callers)
    #[error("Metric update error: {0}")]
    MetricUpdate(String),

    /// Error log write failed (never surfaced to callers)
    #[error("Error log write error: {0}")]
    ErrorLogWrite(String),

    /// Backing store failure on a fatal path
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Stable snake_case name, used for the response body and as the error log type
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Unauthorized(_) => "auth_error",
            Self::Validation(_) => "validation_error",
            Self::AccessDenied(_) => "access_denied",
            Self::ConfigNotFound(_) => "config_not_found",
            Self::ProviderNotConfigured(_) => "provider_not_configured",
            Self::Provider { .. } => "provider_error",
            Self::MalformedProviderResponse(_) => "malformed_provider_response",
            Self::Cache(_) => "cache_error",
            Self::MetricUpdate(_) => "metric_update_error",
            Self::ErrorLogWrite(_) => "error_log_write_error",
            Self::Database(_) => "database_error",
            Self::Internal(_) => "internal_error",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::AccessDenied(_) => StatusCode::FORBIDDEN,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Client errors are surfaced verbatim and never written to the error log
    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }

    fn public_message(&self) -> String {
        match self {
            Self::Unauthorized(msg) | Self::Validation(msg) => msg.clone(),
            Self::AccessDenied(_) => UPGRADE_MESSAGE.to_string(),
            _ => GENERIC_FAILURE_MESSAGE.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(json!({
            "error": {
                "message": self.public_message(),
                "type": self.type_name(),
            }
        }));

        (status, body).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = AppError::ConfigNotFound("funnel_analysis".to_string());
        assert_eq!(
            error.to_string(),
            "No active AI configuration for service 'funnel_analysis'"
        );

        let error = AppError::Provider {
            status: Some(502),
            message: "bad gateway".to_string(),
        };
        assert_eq!(error.to_string(), "Provider error (502): bad gateway");

        let error = AppError::Provider {
            status: None,
            message: "timed out".to_string(),
        };
        assert_eq!(error.to_string(), "Provider error: timed out");
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(
            AppError::Unauthorized("x".into()).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AppError::Validation("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::AccessDenied("x".into()).status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            AppError::MalformedProviderResponse("x".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert!(AppError::Validation("x".into()).is_client_error());
        assert!(!AppError::ConfigNotFound("x".into()).is_client_error());
    }

    #[tokio::test]
    async fn test_server_errors_hide_details() {
        let error = AppError::Provider {
            status: Some(401),
            message: "invalid api key sk-secret".to_string(),
        };
        let response = error.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"]["message"], GENERIC_FAILURE_MESSAGE);
        assert_eq!(json["error"]["type"], "provider_error");
        assert!(!String::from_utf8_lossy(&body).contains("sk-secret"));
    }

    #[tokio::test]
    async fn test_validation_error_is_verbatim() {
        let response = AppError::Validation("adText is required".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"]["message"], "adText is required");
    }
}
