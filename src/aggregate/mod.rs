//! Statistics aggregation engine.
//!
//! Computes derived metrics from rating and selection snapshots:
//! - Popularity scores (selections, wins and rating deviation)
//! - Average-rating leaderboard
//! - Most selected names
//! - Site-wide and per-user statistics
//!
//! Nothing here is cached; callers decide whether to memoize results.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::debug;

use crate::models::{
    LeaderboardEntry, NameId, NameQuery, NameRecord, PopularityEntry, RatingRecord,
    SelectionEvent, SiteStats, TopSelectedEntry, UserScope, UserStats, Visibility,
    DEFAULT_RATING,
};
use crate::storage::{StorageError, Store};

/// Upper bound for every list operation.
pub const MAX_LIMIT: usize = 100;

pub const DEFAULT_POPULARITY_LIMIT: usize = 20;
pub const DEFAULT_TOP_SELECTED_LIMIT: usize = 20;
pub const DEFAULT_LEADERBOARD_LIMIT: usize = 50;

/// Errors from analytics reads.
#[derive(Debug, Error)]
pub enum AnalyticsError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Clamp a requested list size into `[1, MAX_LIMIT]`.
pub fn clamp_limit(requested: Option<i64>, default: usize) -> usize {
    match requested {
        Some(n) => n.clamp(1, MAX_LIMIT as i64) as usize,
        None => default.clamp(1, MAX_LIMIT),
    }
}

/// Parse a raw `limit` query value; anything non-numeric falls back to `default`.
pub fn parse_limit(raw: Option<&str>, default: usize) -> usize {
    let requested = raw.and_then(|s| {
        let s = s.trim();
        s.parse::<i64>()
            .ok()
            .or_else(|| s.parse::<f64>().ok().filter(|f| f.is_finite()).map(|f| f.trunc() as i64))
    });
    clamp_limit(requested, default)
}

/// round(2×selections + 1.5×wins + 0.5×(avg − 1500)), with halves rounded
/// up so -0.5 scores 0 and 0.5 scores 1.
pub fn popularity_score(selections: u64, wins: u64, avg_rating: f64) -> i64 {
    let raw =
        2.0 * selections as f64 + 1.5 * wins as f64 + 0.5 * (avg_rating - DEFAULT_RATING as f64);
    (raw + 0.5).floor() as i64
}

/// wins / (wins + losses) as a percentage with one decimal; 0 with no games.
pub fn win_rate(wins: u64, losses: u64) -> f64 {
    let games = wins + losses;
    if games == 0 {
        return 0.0;
    }
    (wins as f64 / games as f64 * 1000.0).round() / 10.0
}

/// Per-name rating rollup.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RatingTally {
    pub count: u64,
    pub sum: i64,
    pub wins: u64,
    pub losses: u64,
    pub best: Option<i32>,
}

impl RatingTally {
    fn add(&mut self, record: &RatingRecord) {
        self.count += 1;
        self.sum += record.rating as i64;
        self.wins += record.wins as u64;
        self.losses += record.losses as u64;
        self.best = Some(self.best.map_or(record.rating, |b| b.max(record.rating)));
    }

    /// Mean rating, or the 1500 baseline when unrated.
    pub fn avg_rating(&self) -> f64 {
        if self.count == 0 {
            DEFAULT_RATING as f64
        } else {
            self.sum as f64 / self.count as f64
        }
    }
}

pub fn tally_ratings(ratings: &[RatingRecord]) -> HashMap<NameId, RatingTally> {
    let mut tallies: HashMap<NameId, RatingTally> = HashMap::new();
    for record in ratings {
        tallies.entry(record.name_id.clone()).or_default().add(record);
    }
    tallies
}

pub fn count_selections(selections: &[SelectionEvent]) -> HashMap<NameId, u64> {
    let mut counts: HashMap<NameId, u64> = HashMap::new();
    for event in selections {
        *counts.entry(event.name_id.clone()).or_default() += 1;
    }
    counts
}

/// Computes analytics on demand from the store's current contents.
#[derive(Clone)]
pub struct Aggregator {
    store: Arc<dyn Store>,
}

impl Aggregator {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Popularity over visible names, highest score first.
    pub async fn popularity(
        &self,
        requested_limit: usize,
        scope: &UserScope,
    ) -> Result<Vec<PopularityEntry>, AnalyticsError> {
        let limit = requested_limit.clamp(1, MAX_LIMIT);

        let visible = NameQuery::visible();
        let (names, ratings, selections) = tokio::try_join!(
            self.store.names(&visible),
            self.store.ratings(scope),
            self.store.selections(scope, None),
        )?;

        let tallies = tally_ratings(&ratings);
        let counts = count_selections(&selections);

        let mut scored: Vec<(&NameRecord, u64, f64, i64)> = names
            .iter()
            .map(|n| {
                let tally = tallies.get(&n.id).cloned().unwrap_or_default();
                let times_selected = counts.get(&n.id).copied().unwrap_or(0);
                let avg = tally.avg_rating();
                let score = popularity_score(times_selected, tally.wins, avg);
                (n, times_selected, avg, score)
            })
            .collect();
        // sort_by is stable, so equal scores keep catalog order
        scored.sort_by(|a, b| b.3.cmp(&a.3));
        scored.truncate(limit);

        let entries: Vec<PopularityEntry> = scored
            .into_iter()
            .map(|(name, times_selected, avg, score)| PopularityEntry {
                name_id: name.id.clone(),
                name: name.name.clone(),
                description: name.description.clone(),
                category: name.category.clone(),
                times_selected,
                avg_rating: avg.round() as i64,
                popularity_score: score,
                created_at: name.created_at,
            })
            .collect();

        debug!(limit, rows = entries.len(), scope = %scope.key(), "Computed popularity");
        Ok(entries)
    }

    /// Rated visible names by cross-user average rating, highest first.
    pub async fn leaderboard(
        &self,
        requested_limit: usize,
    ) -> Result<Vec<LeaderboardEntry>, AnalyticsError> {
        let limit = requested_limit.clamp(1, MAX_LIMIT);

        let visible = NameQuery::visible();
        let (names, ratings) = tokio::try_join!(
            self.store.names(&visible),
            self.store.ratings(&UserScope::All),
        )?;
        let tallies = tally_ratings(&ratings);

        let mut ranked: Vec<(&NameRecord, f64, u64)> = names
            .iter()
            .filter_map(|n| {
                let tally = tallies.get(&n.id)?;
                Some((n, tally.avg_rating(), tally.wins))
            })
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        ranked.truncate(limit);

        let entries: Vec<LeaderboardEntry> = ranked
            .into_iter()
            .map(|(name, avg, wins)| LeaderboardEntry {
                name_id: name.id.clone(),
                name: name.name.clone(),
                avg_rating: avg.round() as i64,
                wins,
                created_at: name.created_at,
            })
            .collect();

        debug!(limit, rows = entries.len(), "Computed leaderboard");
        Ok(entries)
    }

    /// Visible names with at least one selection, most selected first.
    pub async fn top_selected(
        &self,
        requested_limit: usize,
    ) -> Result<Vec<TopSelectedEntry>, AnalyticsError> {
        let limit = requested_limit.clamp(1, MAX_LIMIT);

        let visible = NameQuery::visible();
        let (names, selections) = tokio::try_join!(
            self.store.names(&visible),
            self.store.selections(&UserScope::All, None),
        )?;

        let mut last_seen: HashMap<&NameId, DateTime<Utc>> = HashMap::new();
        for event in &selections {
            let latest = last_seen.entry(&event.name_id).or_insert(event.selected_at);
            if event.selected_at > *latest {
                *latest = event.selected_at;
            }
        }
        let counts = count_selections(&selections);

        let mut ranked: Vec<(&NameRecord, u64, DateTime<Utc>)> = names
            .iter()
            .filter_map(|n| {
                let count = *counts.get(&n.id)?;
                let last = *last_seen.get(&n.id)?;
                Some((n, count, last))
            })
            .collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1));
        ranked.truncate(limit);

        Ok(ranked
            .into_iter()
            .map(|(name, times_selected, last_selected_at)| TopSelectedEntry {
                name_id: name.id.clone(),
                name: name.name.clone(),
                times_selected,
                last_selected_at,
            })
            .collect())
    }

    /// Site-wide counts. Sub-queries run concurrently; any failure fails
    /// the whole call.
    pub async fn site_stats(&self) -> Result<SiteStats, AnalyticsError> {
        let (total_names, active_names, hidden_names, total_users, total_ratings, total_selections, avg) =
            tokio::try_join!(
                self.store.count_names(Visibility::All),
                self.store.count_names(Visibility::Visible),
                self.store.count_names(Visibility::Hidden),
                self.store.count_users(),
                self.store.count_ratings(),
                self.store.count_selections(),
                self.store.average_rating(),
            )?;

        Ok(SiteStats {
            total_names,
            hidden_names,
            active_names,
            total_users,
            total_ratings,
            total_selections,
            avg_rating: avg.unwrap_or(DEFAULT_RATING as f64).round() as i64,
        })
    }

    /// One user's rating activity.
    pub async fn user_stats(&self, user_id: &str) -> Result<UserStats, AnalyticsError> {
        let scope = UserScope::User(user_id.to_string());
        let hidden = NameQuery {
            visibility: Visibility::Hidden,
            ..Default::default()
        };
        let (ratings, hidden_names) =
            tokio::try_join!(self.store.ratings(&scope), self.store.names(&hidden))?;

        let total_ratings = ratings.len() as u64;
        let total_wins: u64 = ratings.iter().map(|r| r.wins as u64).sum();
        let total_losses: u64 = ratings.iter().map(|r| r.losses as u64).sum();
        let avg_rating = if ratings.is_empty() {
            DEFAULT_RATING as i64
        } else {
            let sum: i64 = ratings.iter().map(|r| r.rating as i64).sum();
            (sum as f64 / ratings.len() as f64).round() as i64
        };
        let hidden_count = hidden_names
            .iter()
            .filter(|n| ratings.iter().any(|r| r.name_id == n.id))
            .count() as u64;

        Ok(UserStats {
            total_ratings,
            avg_rating,
            total_wins,
            total_losses,
            win_rate: win_rate(total_wins, total_losses),
            hidden_count,
        })
    }
}
