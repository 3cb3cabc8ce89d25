pub mod analytics;
pub mod health;
pub mod history;
pub mod ratings;

use std::future::Future;

use axum::Json;
use serde::Serialize;
use serde_json::Value;

use crate::api::state::AppState;
use crate::api::ApiError;

/// Serve `key` from the response cache, computing and storing it on a miss.
///
/// `compute` is only polled on a miss. The result is not stored if a write
/// cleared the cache while it was computing.
pub(crate) async fn cached<T, F>(state: &AppState, key: String, compute: F) -> Result<Json<Value>, ApiError>
where
    T: Serialize,
    F: Future<Output = Result<T, ApiError>>,
{
    if let Some(hit) = state.cache.get(&key).await {
        return Ok(Json(hit));
    }

    let generation = state.cache.generation();
    let value = serde_json::to_value(compute.await?)
        .map_err(|e| ApiError::Internal(format!("serialize {}: {}", key, e)))?;
    state
        .cache
        .set_if_current(key, value.clone(), generation)
        .await;
    Ok(Json(value))
}
