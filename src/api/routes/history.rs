use axum::extract::{Query, State};
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;

use super::cached;
use crate::aggregate::parse_limit;
use crate::api::state::AppState;
use crate::api::ApiError;
use crate::history::{window_periods, DateFilter, DEFAULT_TOP_N};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryParams {
    pub top_n: Option<String>,
    pub periods: Option<String>,
    pub date_filter: Option<String>,
}

/// Numeric `periods`, saturated into u32. Junk reads as absent.
fn parse_periods(raw: Option<&str>) -> Option<u32> {
    raw.and_then(|s| s.trim().parse::<i64>().ok())
        .map(|n| n.clamp(0, u32::MAX as i64) as u32)
}

pub async fn ranking_history(
    State(state): State<AppState>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<Value>, ApiError> {
    let top_n = parse_limit(params.top_n.as_deref(), DEFAULT_TOP_N);
    let filter = params
        .date_filter
        .as_deref()
        .filter(|f| !f.trim().is_empty())
        .map(str::parse::<DateFilter>)
        .transpose()
        .map_err(ApiError::BadRequest)?;
    let periods = window_periods(parse_periods(params.periods.as_deref()), filter);
    let today = Utc::now().date_naive();
    let key = format!("ranking-history:{}:{}:{}", top_n, periods, today);

    cached(&state, key, async {
        Ok::<_, ApiError>(state.history.build(top_n, periods, today).await?)
    })
    .await
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::http::StatusCode;
    use chrono::{Duration, Utc};

    use super::parse_periods;
    use crate::api::build_router;
    use crate::api::routes::test_support::{get_json, state_for};
    use crate::models::{NameRecord, SelectionEvent};
    use crate::storage::MemoryStore;

    #[test]
    fn test_parse_periods() {
        assert_eq!(parse_periods(None), None);
        assert_eq!(parse_periods(Some("14")), Some(14));
        assert_eq!(parse_periods(Some("-3")), Some(0));
        assert_eq!(parse_periods(Some("week")), None);
    }

    #[tokio::test]
    async fn test_ranking_history_shape() {
        let now = Utc::now();
        let store = Arc::new(MemoryStore::from_parts(
            vec![NameRecord::new("Alpha", "").with_id("a")],
            vec![],
            vec![
                SelectionEvent::new("a", "Alpha", "u1", now),
                SelectionEvent::new("a", "Alpha", "u1", now - Duration::days(2)),
            ],
        ));
        let app = build_router(state_for(store));

        let (status, json) =
            get_json(app, "/api/analytics/ranking-history?periods=4&topN=5").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["timeLabels"].as_array().unwrap().len(), 4);
        let series = &json["data"][0];
        assert_eq!(series["id"], "a");
        assert_eq!(series["name"], "Alpha");
        assert_eq!(series["totalSelections"], 2);
        assert_eq!(series["avgRating"], 1500);
        assert_eq!(
            series["rankings"],
            serde_json::json!([null, 1, null, 1])
        );
    }

    #[tokio::test]
    async fn test_date_filter_today_spans_two_days() {
        let app = build_router(state_for(Arc::new(MemoryStore::new())));
        let (status, json) =
            get_json(app, "/api/analytics/ranking-history?dateFilter=today&periods=30").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["timeLabels"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_periods_of_one_are_widened() {
        let app = build_router(state_for(Arc::new(MemoryStore::new())));
        let (_, json) = get_json(app, "/api/analytics/ranking-history?periods=1").await;
        assert_eq!(json["timeLabels"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_unknown_date_filter_is_bad_request() {
        let app = build_router(state_for(Arc::new(MemoryStore::new())));
        let (status, _) =
            get_json(app, "/api/analytics/ranking-history?dateFilter=decade").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
