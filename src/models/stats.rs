//! Derived statistics models.
//!
//! None of these are persisted; they are recomputed from rating and
//! selection snapshots on every request.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{NameId, NameRecord};

/// Which users' activity an aggregate covers.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum UserScope {
    #[default]
    All,
    User(String),
}

impl UserScope {
    /// Interpret the `userFilter` / `currentUserName` query pair.
    ///
    /// `"all"` or nothing covers everyone, `"current"` means the calling
    /// user, and anything else is taken as a user id.
    pub fn from_filter(user_filter: Option<&str>, current_user: Option<&str>) -> Self {
        let current = current_user.map(str::trim).filter(|u| !u.is_empty());
        match user_filter.map(str::trim).filter(|f| !f.is_empty()) {
            None | Some("all") => UserScope::All,
            Some("current") => match current {
                Some(user) => UserScope::User(user.to_string()),
                None => UserScope::All,
            },
            Some(user) => UserScope::User(user.to_string()),
        }
    }

    pub fn includes(&self, user_id: &str) -> bool {
        match self {
            UserScope::All => true,
            UserScope::User(u) => u == user_id,
        }
    }

    /// Stable fragment for cache keys.
    pub fn key(&self) -> String {
        match self {
            UserScope::All => "all".to_string(),
            UserScope::User(u) => format!("user={}", u),
        }
    }
}

/// Catalog visibility filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Visibility {
    /// Active and not hidden
    #[default]
    Visible,
    Hidden,
    All,
}

impl Visibility {
    pub fn matches(&self, name: &NameRecord) -> bool {
        match self {
            Visibility::Visible => name.is_visible(),
            Visibility::Hidden => name.is_hidden,
            Visibility::All => true,
        }
    }
}

/// A catalog read. `limit` bounds the number of rows the store returns.
#[derive(Debug, Clone, Default)]
pub struct NameQuery {
    pub visibility: Visibility,
    pub ids: Option<Vec<NameId>>,
    pub limit: Option<usize>,
}

impl NameQuery {
    pub fn visible() -> Self {
        Self::default()
    }

    pub fn all() -> Self {
        Self {
            visibility: Visibility::All,
            ..Default::default()
        }
    }

    /// Look up specific names regardless of visibility, bounded by `limit`.
    pub fn by_ids(ids: Vec<NameId>, limit: usize) -> Self {
        Self {
            visibility: Visibility::All,
            ids: Some(ids),
            limit: Some(limit),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PopularityEntry {
    pub name_id: NameId,
    pub name: String,
    pub description: String,
    pub category: Option<String>,
    pub times_selected: u64,
    pub avg_rating: i64,
    pub popularity_score: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub name_id: NameId,
    pub name: String,
    pub avg_rating: i64,
    pub wins: u64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopSelectedEntry {
    pub name_id: NameId,
    pub name: String,
    pub times_selected: u64,
    pub last_selected_at: DateTime<Utc>,
}

/// Site-wide counts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteStats {
    pub total_names: u64,
    pub hidden_names: u64,
    pub active_names: u64,
    pub total_users: u64,
    pub total_ratings: u64,
    pub total_selections: u64,
    pub avg_rating: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStats {
    pub total_ratings: u64,
    pub avg_rating: i64,
    pub total_wins: u64,
    pub total_losses: u64,
    /// Percentage with one decimal
    pub win_rate: f64,
    pub hidden_count: u64,
}

/// One name's per-day rank trajectory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankingSeries {
    pub id: NameId,
    pub name: String,
    /// Aligned with `RankingHistory::time_labels`; `None` on days without selections
    pub rankings: Vec<Option<u32>>,
    /// Best rating ever recorded for the name
    pub avg_rating: i32,
    pub total_selections: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankingHistory {
    pub data: Vec<RankingSeries>,
    pub time_labels: Vec<String>,
}
