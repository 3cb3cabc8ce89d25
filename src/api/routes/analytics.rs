//! Read endpoints backed by the aggregator and the response cache.

use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::Value;

use super::cached;
use crate::aggregate::{
    parse_limit, DEFAULT_LEADERBOARD_LIMIT, DEFAULT_POPULARITY_LIMIT, DEFAULT_TOP_SELECTED_LIMIT,
};
use crate::api::state::AppState;
use crate::api::ApiError;
use crate::models::UserScope;

// ── Lists ───────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PopularityParams {
    /// Kept as text so junk falls back to the default instead of a 400
    pub limit: Option<String>,
    pub user_filter: Option<String>,
    pub current_user_name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LimitParams {
    pub limit: Option<String>,
}

pub async fn popularity(
    State(state): State<AppState>,
    Query(params): Query<PopularityParams>,
) -> Result<Json<Value>, ApiError> {
    let limit = parse_limit(params.limit.as_deref(), DEFAULT_POPULARITY_LIMIT);
    let scope = UserScope::from_filter(
        params.user_filter.as_deref(),
        params.current_user_name.as_deref(),
    );
    let key = format!("popularity:{}:{}", limit, scope.key());

    cached(&state, key, async {
        Ok::<_, ApiError>(state.aggregator.popularity(limit, &scope).await?)
    })
    .await
}

pub async fn leaderboard(
    State(state): State<AppState>,
    Query(params): Query<LimitParams>,
) -> Result<Json<Value>, ApiError> {
    let limit = parse_limit(params.limit.as_deref(), DEFAULT_LEADERBOARD_LIMIT);
    let key = format!("leaderboard:{}", limit);

    cached(&state, key, async { Ok::<_, ApiError>(state.aggregator.leaderboard(limit).await?) }).await
}

pub async fn top_selected(
    State(state): State<AppState>,
    Query(params): Query<LimitParams>,
) -> Result<Json<Value>, ApiError> {
    let limit = parse_limit(params.limit.as_deref(), DEFAULT_TOP_SELECTED_LIMIT);
    let key = format!("top-selected:{}", limit);

    cached(&state, key, async { Ok::<_, ApiError>(state.aggregator.top_selected(limit).await?) }).await
}

// ── Stats ───────────────────────────────────────────────────────

pub async fn site_stats(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    cached(&state, "site-stats".to_string(), async {
        Ok::<_, ApiError>(state.aggregator.site_stats().await?)
    })
    .await
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStatsParams {
    pub user_name: Option<String>,
}

pub async fn user_stats(
    State(state): State<AppState>,
    Query(params): Query<UserStatsParams>,
) -> Result<Json<Value>, ApiError> {
    let user_name = params
        .user_name
        .as_deref()
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .ok_or_else(|| ApiError::BadRequest("userName is required".to_string()))?
        .to_string();
    let key = format!("user-stats:{}", user_name);

    cached(&state, key, async {
        Ok::<_, ApiError>(state.aggregator.user_stats(&user_name).await?)
    })
    .await
}
