//! Write endpoints: rating submissions and tournament selections.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::api::state::AppState;
use crate::api::ApiError;
use crate::rating::{RatingSubmission, SaveOutcome};

/// A name given either by catalog id or by display name.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NameReference {
    pub name_id: Option<String>,
    pub name: Option<String>,
}

impl NameReference {
    fn reference(&self) -> Option<&str> {
        pick_reference(self.name_id.as_deref(), self.name.as_deref())
    }
}

/// The id wins when both are present. Blank values count as absent.
fn pick_reference<'a>(name_id: Option<&'a str>, name: Option<&'a str>) -> Option<&'a str> {
    [name_id, name]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|r| !r.is_empty())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RatingEntry {
    pub name_id: Option<String>,
    pub name: Option<String>,
    pub rating: f64,
    #[serde(default)]
    pub wins: u32,
    #[serde(default)]
    pub losses: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitRatingsRequest {
    pub user_id: String,
    pub ratings: Vec<RatingEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordSelectionsRequest {
    pub user_id: String,
    pub selections: Vec<NameReference>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveResponse {
    pub success: bool,
    pub saved_count: usize,
}

impl From<SaveOutcome> for SaveResponse {
    fn from(outcome: SaveOutcome) -> Self {
        Self {
            success: true,
            saved_count: outcome.saved_count,
        }
    }
}

fn bad_body(rejection: JsonRejection) -> ApiError {
    ApiError::BadRequest(rejection.body_text())
}

fn require_user(user_id: &str) -> Result<&str, ApiError> {
    let user_id = user_id.trim();
    if user_id.is_empty() {
        return Err(ApiError::BadRequest("userId must not be empty".to_string()));
    }
    Ok(user_id)
}

/// Check every entry before anything reaches the updater.
fn validate_ratings(entries: Vec<RatingEntry>) -> Result<Vec<RatingSubmission>, ApiError> {
    entries
        .into_iter()
        .enumerate()
        .map(|(i, entry)| {
            let reference = pick_reference(entry.name_id.as_deref(), entry.name.as_deref())
                .ok_or_else(|| {
                    ApiError::BadRequest(format!("ratings[{}] needs a nameId or name", i))
                })?;
            if !entry.rating.is_finite() {
                return Err(ApiError::BadRequest(format!(
                    "ratings[{}].rating must be a finite number",
                    i
                )));
            }
            Ok(RatingSubmission::new(reference, entry.rating).with_results(entry.wins, entry.losses))
        })
        .collect()
}

pub async fn submit_ratings(
    State(state): State<AppState>,
    payload: Result<Json<SubmitRatingsRequest>, JsonRejection>,
) -> Result<Json<SaveResponse>, ApiError> {
    let Json(request) = payload.map_err(bad_body)?;
    let user_id = require_user(&request.user_id)?;
    let submissions = validate_ratings(request.ratings)?;

    let outcome = state.updater.submit(user_id, submissions).await?;
    if outcome.saved_count > 0 {
        state.cache.clear().await;
    }

    Ok(Json(outcome.into()))
}

pub async fn record_selections(
    State(state): State<AppState>,
    payload: Result<Json<RecordSelectionsRequest>, JsonRejection>,
) -> Result<Json<SaveResponse>, ApiError> {
    let Json(request) = payload.map_err(bad_body)?;
    let user_id = require_user(&request.user_id)?;

    let references = request
        .selections
        .iter()
        .enumerate()
        .map(|(i, s)| {
            s.reference().map(str::to_string).ok_or_else(|| {
                ApiError::BadRequest(format!("selections[{}] needs a nameId or name", i))
            })
        })
        .collect::<Result<Vec<String>, ApiError>>()?;

    let outcome = state
        .recorder
        .record(user_id, &references, Utc::now())
        .await?;
    if outcome.saved_count > 0 {
        state.cache.clear().await;
    }

    Ok(Json(outcome.into()))
}
