use crate::error::AppError;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use chrono::Utc;
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;

/// Authentication information attached to each authenticated request
#[derive(Debug, Clone)]
pub struct AuthInfo {
    /// Account the bearer token was issued to
    pub user_id: String,
}

/// Authentication middleware
/// Extracts the Bearer token and validates its SHA256 hash against `api_tokens`
pub async fn auth_middleware(
    State(pool): State<SqlitePool>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let auth_header = req
        .headers()
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::Unauthorized("Missing Authorization header".to_string()))?;

    let token = extract_bearer_token(auth_header)?;

    let user_id = validate_token(&pool, &hash_token(token))
        .await?
        .ok_or_else(|| AppError::Unauthorized("Invalid or expired token".to_string()))?;

    req.extensions_mut().insert(AuthInfo { user_id });

    Ok(next.run(req).await)
}

/// Hex SHA256 of a raw token, as stored in `api_tokens.token_hash`
pub fn hash_token(token: &str) -> String {
    format!("{:x}", Sha256::digest(token.as_bytes()))
}

/// User id for a non-revoked, unexpired token hash
async fn validate_token(pool: &SqlitePool, token_hash: &str) -> Result<Option<String>, AppError> {
    let row: Option<(String,)> = sqlx::query_as(
        r#"
        SELECT user_id
        FROM api_tokens
        WHERE token_hash = ?
          AND revoked = 0
          AND (expires_at IS NULL OR expires_at > ?)
        "#,
    )
    .bind(token_hash)
    .bind(Utc::now().timestamp_millis())
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|(user_id,)| user_id))
}

/// Extract Bearer token from Authorization header
fn extract_bearer_token(auth_header: &str) -> Result<&str, AppError> {
    const BEARER_PREFIX: &str = "Bearer ";

    let token = auth_header.strip_prefix(BEARER_PREFIX).ok_or_else(|| {
        AppError::Unauthorized("Authorization header must use Bearer scheme".to_string())
    })?;

    let token = token.trim();
    if token.is_empty() {
        return Err(AppError::Unauthorized("Bearer token is empty".to_string()));
    }

    Ok(token)
}
