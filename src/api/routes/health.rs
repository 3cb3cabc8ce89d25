use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::api::state::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub store: &'static str,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        store: state.store.name(),
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::http::StatusCode;

    use crate::api::build_router;
    use crate::api::routes::test_support::{get_json, state_for};
    use crate::storage::MemoryStore;

    #[tokio::test]
    async fn test_health_reports_store() {
        let app = build_router(state_for(Arc::new(MemoryStore::new())));
        let (status, json) = get_json(app, "/api/health").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "ok");
        assert_eq!(json["store"], "fixture");
    }

    #[tokio::test]
    async fn test_unknown_route_is_not_found() {
        let app = build_router(state_for(Arc::new(MemoryStore::new())));
        let (status, json) = get_json(app, "/api/nope").await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["error"]["code"], "NOT_FOUND");
    }
}
