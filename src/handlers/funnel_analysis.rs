use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Extension,
};

use crate::{
    auth::AuthInfo,
    error::AppError,
    pipeline::RequestPipeline,
    server::AppState,
};

pub const REQUEST_ID_HEADER: &str = "x-request-id";
pub const CACHE_HEADER: &str = "x-cache";

/// Longest caller-supplied request id that is echoed back
const MAX_REQUEST_ID_LEN: usize = 128;

/// Handle `POST /funnel-analysis`
///
/// The raw body is parsed by the pipeline so every malformed or oversized
/// body is reported as a 400 with the standard error shape.
pub async fn analyze_funnel(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthInfo>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    let request_id = request_id_from(&headers);

    let result = match body {
        Ok(body) => {
            let config = state.config.load();
            let pipeline =
                RequestPipeline::from_config(state.pool.clone(), state.http.clone(), &config);
            pipeline.run(&request_id, &auth.user_id, &body).await
        }
        Err(rejection) => Err(AppError::Validation(format!(
            "Request body could not be read: {}",
            rejection.body_text()
        ))),
    };

    let mut response = match result {
        Ok(outcome) => match serde_json::to_vec(&outcome.analysis) {
            Ok(bytes) => {
                let mut response = (StatusCode::OK, bytes).into_response();
                response.headers_mut().insert(
                    header::CONTENT_TYPE,
                    HeaderValue::from_static("application/json"),
                );
                response.headers_mut().insert(
                    CACHE_HEADER,
                    HeaderValue::from_static(outcome.cache.as_str()),
                );
                response
            }
            Err(e) => AppError::Internal(format!("failed to serialize analysis: {}", e)).into_response(),
        },
        Err(e) => e.into_response(),
    };

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

/// Reuse a sane caller-supplied request id, otherwise generate one
fn request_id_from(headers: &HeaderMap) -> String {
    headers
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|id| {
            !id.is_empty()
                && id.len() <= MAX_REQUEST_ID_LEN
                && id
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        })
        .map(str::to_string)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
}
