//! REST API endpoints.
//!
//! Axum-based HTTP API for submitting ratings and selections and for
//! reading cached analytics.

pub mod routes;
pub mod state;

use axum::{
    http::{header::CONTENT_TYPE, HeaderValue, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use thiserror::Error;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, warn};

use crate::aggregate::AnalyticsError;
use crate::rating::RatingError;
use state::AppState;

/// API error types.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    /// The cause is logged, never sent to the client.
    #[error("internal server error")]
    Internal(String),
}

impl From<AnalyticsError> for ApiError {
    fn from(err: AnalyticsError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl From<RatingError> for ApiError {
    fn from(err: RatingError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            ApiError::Internal(cause) => {
                error!(cause = %cause, "Request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR")
            }
        };

        let body = ErrorResponse {
            error: ErrorDetail {
                code: code.to_string(),
                message: self.to_string(),
            },
        };

        (status, Json(body)).into_response()
    }
}

async fn not_found(uri: Uri) -> ApiError {
    ApiError::NotFound(uri.path().to_string())
}

fn cors_layer(origin: &str) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE]);

    if origin == "*" {
        return cors.allow_origin(Any);
    }
    match origin.parse::<HeaderValue>() {
        Ok(value) => cors.allow_origin(value),
        Err(_) => {
            warn!(origin, "Invalid CORS origin, allowing any");
            cors.allow_origin(Any)
        }
    }
}

/// Assemble the full router with CORS and request tracing.
pub fn build_router(state: AppState) -> Router {
    let cors = cors_layer(&state.cors_origin);

    Router::new()
        .route("/api/health", get(routes::health::health))
        .route("/api/ratings", post(routes::ratings::submit_ratings))
        .route("/api/selections", post(routes::ratings::record_selections))
        .route("/api/analytics/popularity", get(routes::analytics::popularity))
        .route("/api/analytics/leaderboard", get(routes::analytics::leaderboard))
        .route("/api/analytics/top-selected", get(routes::analytics::top_selected))
        .route("/api/analytics/site-stats", get(routes::analytics::site_stats))
        .route("/api/analytics/user-stats", get(routes::analytics::user_stats))
        .route(
            "/api/analytics/ranking-history",
            get(routes::history::ranking_history),
        )
        .fallback(not_found)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StorageError;

    #[tokio::test]
    async fn test_internal_error_hides_cause() {
        let err: ApiError = AnalyticsError::Storage(StorageError::Unavailable(
            "disk on fire".to_string(),
        ))
        .into();
        let resp = err.into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"]["code"], "INTERNAL_ERROR");
        assert_eq!(json["error"]["message"], "internal server error");
        assert!(!body.windows(4).any(|w| w == b"fire"));
    }

    #[tokio::test]
    async fn test_bad_request_shape() {
        let resp = ApiError::BadRequest("userId must not be empty".to_string()).into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"]["code"], "BAD_REQUEST");
        assert_eq!(
            json["error"]["message"],
            "Bad request: userId must not be empty"
        );
    }
}
