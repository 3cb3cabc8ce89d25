//! Ranking history.
//!
//! Rebuilds per-day rank trajectories for the most selected names over a
//! trailing window of UTC calendar days.

use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;
use std::sync::Arc;

use chrono::{Duration, NaiveDate, NaiveTime};
use tracing::debug;

use crate::aggregate::{tally_ratings, AnalyticsError, MAX_LIMIT};
use crate::models::{
    NameId, NameQuery, RankingHistory, RankingSeries, UserScope, DEFAULT_RATING,
};
use crate::storage::Store;

/// Shortest window; a single day would be a one-point series.
pub const MIN_PERIODS: u32 = 2;

/// Longest window, one year of days.
pub const MAX_PERIODS: u32 = 365;

pub const DEFAULT_PERIODS: u32 = 7;
pub const DEFAULT_TOP_N: usize = 10;

/// Named windows accepted as `dateFilter`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateFilter {
    Today,
    Week,
    Month,
    Year,
    All,
}

impl DateFilter {
    /// Days covered by this filter. `All` uses the caller's own period count.
    ///
    /// `Today` covers yesterday and today.
    pub fn periods(&self, requested: u32) -> u32 {
        match self {
            DateFilter::Today => 2,
            DateFilter::Week => 7,
            DateFilter::Month => 30,
            DateFilter::Year => 365,
            DateFilter::All => requested.max(MIN_PERIODS),
        }
    }
}

impl FromStr for DateFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "today" => Ok(DateFilter::Today),
            "week" => Ok(DateFilter::Week),
            "month" => Ok(DateFilter::Month),
            "year" => Ok(DateFilter::Year),
            "all" => Ok(DateFilter::All),
            other => Err(format!("unknown date filter: {}", other)),
        }
    }
}

/// Resolve the effective window length from `periods` and an optional filter.
pub fn window_periods(periods: Option<u32>, filter: Option<DateFilter>) -> u32 {
    let requested = periods.unwrap_or(DEFAULT_PERIODS);
    let days = match filter {
        Some(f) => f.periods(requested),
        None => requested,
    };
    days.clamp(MIN_PERIODS, MAX_PERIODS)
}

/// Label shown for a day bucket, e.g. "Oct 17".
pub fn day_label(day: NaiveDate) -> String {
    day.format("%b %-d").to_string()
}

/// Rank names within one day: most selections first, ties by id.
fn rank_day(counts: &HashMap<NameId, u64>) -> HashMap<NameId, u32> {
    let mut ordered: Vec<(&NameId, &u64)> = counts.iter().collect();
    ordered.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
    ordered
        .into_iter()
        .enumerate()
        .map(|(i, (id, _))| (id.clone(), i as u32 + 1))
        .collect()
}

pub struct RankingHistoryBuilder {
    store: Arc<dyn Store>,
}

impl RankingHistoryBuilder {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Build the history for the window of `periods` days ending on `today`.
    pub async fn build(
        &self,
        top_n: usize,
        periods: u32,
        today: NaiveDate,
    ) -> Result<RankingHistory, AnalyticsError> {
        let top_n = top_n.clamp(1, MAX_LIMIT);
        let periods = periods.clamp(MIN_PERIODS, MAX_PERIODS);
        let start = today - Duration::days(periods as i64 - 1);
        let days: Vec<NaiveDate> = start.iter_days().take(periods as usize).collect();
        let since = start.and_time(NaiveTime::MIN).and_utc();

        let (selections, ratings) = tokio::try_join!(
            self.store.selections(&UserScope::All, Some(since)),
            self.store.ratings(&UserScope::All),
        )?;

        // day -> name -> count
        let mut buckets: BTreeMap<NaiveDate, HashMap<NameId, u64>> = BTreeMap::new();
        let mut totals: HashMap<NameId, u64> = HashMap::new();
        let mut fallback_names: HashMap<NameId, String> = HashMap::new();
        for event in selections.iter().filter(|e| e.day() <= today) {
            *buckets
                .entry(event.day())
                .or_default()
                .entry(event.name_id.clone())
                .or_default() += 1;
            *totals.entry(event.name_id.clone()).or_default() += 1;
            fallback_names
                .entry(event.name_id.clone())
                .or_insert_with(|| event.name.clone());
        }

        let day_ranks: HashMap<NaiveDate, HashMap<NameId, u32>> = buckets
            .iter()
            .map(|(day, counts)| (*day, rank_day(counts)))
            .collect();

        let mut leaders: Vec<(NameId, u64)> = totals.into_iter().collect();
        leaders.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        leaders.truncate(top_n);

        let ids: Vec<NameId> = leaders.iter().map(|l| l.0.clone()).collect();
        let catalog: HashMap<NameId, String> = if ids.is_empty() {
            HashMap::new()
        } else {
            self.store
                .names(&NameQuery::by_ids(ids, top_n))
                .await?
                .into_iter()
                .map(|n| (n.id, n.name))
                .collect()
        };
        let tallies = tally_ratings(&ratings);

        let data: Vec<RankingSeries> = leaders
            .into_iter()
            .map(|(id, total)| {
                let rankings = days
                    .iter()
                    .map(|day| day_ranks.get(day).and_then(|r| r.get(&id)).copied())
                    .collect();
                let name = catalog
                    .get(&id)
                    .or_else(|| fallback_names.get(&id))
                    .cloned()
                    .unwrap_or_else(|| id.to_string());
                let best = tallies
                    .get(&id)
                    .and_then(|t| t.best)
                    .unwrap_or(DEFAULT_RATING);
                RankingSeries {
                    id,
                    name,
                    rankings,
                    avg_rating: best,
                    total_selections: total,
                }
            })
            .collect();

        debug!(top_n, periods, series = data.len(), "Built ranking history");

        Ok(RankingHistory {
            data,
            time_labels: days.iter().map(|d| day_label(*d)).collect(),
        })
    }
}
