//! In-memory fixture store.
//!
//! Serves a fixed sample catalog when no data lake is configured, and backs
//! most unit tests.

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use tokio::sync::RwLock;

use super::{distinct_users, filter_names, mean_rating, StorageError, Store};
use crate::models::{
    upsert_into, MergePolicy, NameQuery, NameRecord, RatingRecord, SelectionEvent, UserScope,
    Visibility,
};

#[derive(Debug, Default, Clone)]
struct MemoryData {
    names: Vec<NameRecord>,
    ratings: Vec<RatingRecord>,
    selections: Vec<SelectionEvent>,
}

/// Store holding everything in process memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: RwLock<MemoryData>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_parts(
        names: Vec<NameRecord>,
        ratings: Vec<RatingRecord>,
        selections: Vec<SelectionEvent>,
    ) -> Self {
        Self {
            data: RwLock::new(MemoryData {
                names,
                ratings,
                selections,
            }),
        }
    }

    pub fn with_names(names: Vec<NameRecord>) -> Self {
        Self::from_parts(names, Vec::new(), Vec::new())
    }

    /// Sample catalog with a week of activity ending at `now`.
    pub fn fixture(now: DateTime<Utc>) -> Self {
        let (names, ratings, selections) = fixture_data(now);
        Self::from_parts(names, ratings, selections)
    }

    /// Copy of everything stored, for seeding other stores.
    pub async fn snapshot(&self) -> (Vec<NameRecord>, Vec<RatingRecord>, Vec<SelectionEvent>) {
        let data = self.data.read().await;
        (
            data.names.clone(),
            data.ratings.clone(),
            data.selections.clone(),
        )
    }
}

#[async_trait]
impl Store for MemoryStore {
    fn name(&self) -> &'static str {
        "fixture"
    }

    async fn names(&self, query: &NameQuery) -> Result<Vec<NameRecord>, StorageError> {
        Ok(filter_names(&self.data.read().await.names, query))
    }

    async fn ratings(&self, scope: &UserScope) -> Result<Vec<RatingRecord>, StorageError> {
        let data = self.data.read().await;
        Ok(data
            .ratings
            .iter()
            .filter(|r| scope.includes(&r.user_id))
            .cloned()
            .collect())
    }

    async fn selections(
        &self,
        scope: &UserScope,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<SelectionEvent>, StorageError> {
        let data = self.data.read().await;
        Ok(data
            .selections
            .iter()
            .filter(|s| scope.includes(&s.user_id))
            .filter(|s| since.map_or(true, |t| s.selected_at >= t))
            .cloned()
            .collect())
    }

    async fn count_names(&self, visibility: Visibility) -> Result<u64, StorageError> {
        let data = self.data.read().await;
        Ok(data.names.iter().filter(|n| visibility.matches(n)).count() as u64)
    }

    async fn count_users(&self) -> Result<u64, StorageError> {
        let data = self.data.read().await;
        Ok(distinct_users(&data.ratings, &data.selections))
    }

    async fn count_ratings(&self) -> Result<u64, StorageError> {
        Ok(self.data.read().await.ratings.len() as u64)
    }

    async fn count_selections(&self) -> Result<u64, StorageError> {
        Ok(self.data.read().await.selections.len() as u64)
    }

    async fn average_rating(&self) -> Result<Option<f64>, StorageError> {
        Ok(mean_rating(&self.data.read().await.ratings))
    }

    async fn upsert_ratings(
        &self,
        rows: Vec<RatingRecord>,
        policy: MergePolicy,
    ) -> Result<usize, StorageError> {
        let mut data = self.data.write().await;
        Ok(upsert_into(&mut data.ratings, rows, policy))
    }

    async fn append_selections(
        &self,
        events: Vec<SelectionEvent>,
    ) -> Result<usize, StorageError> {
        let mut data = self.data.write().await;
        let count = events.len();
        data.selections.extend(events);
        Ok(count)
    }
}

const FIXTURE_NAMES: &[(&str, &str, &str)] = &[
    ("Whiskers", "A timeless classic", "classic"),
    ("Mittens", "For the cat with white paws", "classic"),
    ("Shadow", "Quiet and always nearby", "mysterious"),
    ("Luna", "Named after the moon", "celestial"),
    ("Nova", "Bright and sudden", "celestial"),
    ("Pickle", "Small, green-eyed, a little sour", "food"),
    ("Biscuit", "Warm and golden", "food"),
    ("Tiger", "Stripes included", "wild"),
    ("Ziggy", "Never walks in a straight line", "quirky"),
    ("Pumpkin", "Orange and round", "food"),
];

const FIXTURE_USERS: &[&str] = &["aaron", "bea", "cato", "dmitri"];

fn fixture_data(
    now: DateTime<Utc>,
) -> (Vec<NameRecord>, Vec<RatingRecord>, Vec<SelectionEvent>) {
    let created = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).single().unwrap_or(now);

    let mut names: Vec<NameRecord> = FIXTURE_NAMES
        .iter()
        .enumerate()
        .map(|(i, (name, description, category))| {
            NameRecord::new(*name, *description)
                .with_category(*category)
                .with_created_at(created + Duration::days(i as i64))
        })
        .collect();
    // One hidden name so hidden counts have something to show.
    if let Some(last) = names.last_mut() {
        last.is_hidden = true;
    }

    let mut ratings = Vec::new();
    let mut selections = Vec::new();
    for (u, user) in FIXTURE_USERS.iter().enumerate() {
        for (i, name) in names.iter().enumerate() {
            // Deterministic spread: earlier names rate higher, users disagree a little.
            let raw = 1750.0 - (i as f64 * 45.0) + ((u * 7 + i * 3) % 11) as f64 * 10.0;
            let wins = ((names.len() - i) as u32 + u as u32) % 6;
            let losses = (i as u32 + u as u32) % 4;
            ratings.push(RatingRecord::new(*user, name.id.clone(), raw).with_results(wins, losses));

            let picks = (names.len() - i + u) % 4;
            for p in 0..picks {
                let days_ago = ((i + p + u) % 7) as i64;
                selections.push(SelectionEvent::new(
                    name.id.clone(),
                    name.name.clone(),
                    *user,
                    now - Duration::days(days_ago) - Duration::minutes((p * 13 + u) as i64),
                ));
            }
        }
    }

    (names, ratings, selections)
}

/// Instrumented wrapper used by tests. Counts bulk writes and catalog reads,
/// remembers the largest catalog read and fails chosen operations on demand.
#[cfg(test)]
pub struct TrackingStore {
    pub inner: MemoryStore,
    pub fail_on: Option<&'static str>,
    pub bulk_writes: std::sync::atomic::AtomicUsize,
    pub names_reads: std::sync::atomic::AtomicUsize,
    pub max_names_returned: std::sync::atomic::AtomicUsize,
}

#[cfg(test)]
impl TrackingStore {
    pub fn new(inner: MemoryStore) -> Self {
        Self {
            inner,
            fail_on: None,
            bulk_writes: Default::default(),
            names_reads: Default::default(),
            max_names_returned: Default::default(),
        }
    }

    pub fn failing_on(mut self, operation: &'static str) -> Self {
        self.fail_on = Some(operation);
        self
    }

    fn check(&self, operation: &str) -> Result<(), StorageError> {
        if self.fail_on == Some(operation) {
            return Err(StorageError::Unavailable(format!("{} is down", operation)));
        }
        Ok(())
    }

    pub fn bulk_writes(&self) -> usize {
        self.bulk_writes.load(std::sync::atomic::Ordering::SeqCst)
    }

    pub fn names_reads(&self) -> usize {
        self.names_reads.load(std::sync::atomic::Ordering::SeqCst)
    }

    /// Largest number of catalog rows any single `names` call returned.
    pub fn max_names_returned(&self) -> usize {
        self.max_names_returned.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(test)]
#[async_trait]
impl Store for TrackingStore {
    fn name(&self) -> &'static str {
        "tracking"
    }

    async fn names(&self, query: &NameQuery) -> Result<Vec<NameRecord>, StorageError> {
        use std::sync::atomic::Ordering;
        self.check("names")?;
        self.names_reads.fetch_add(1, Ordering::SeqCst);
        let names = self.inner.names(query).await?;
        self.max_names_returned.fetch_max(names.len(), Ordering::SeqCst);
        Ok(names)
    }

    async fn ratings(&self, scope: &UserScope) -> Result<Vec<RatingRecord>, StorageError> {
        self.check("ratings")?;
        self.inner.ratings(scope).await
    }

    async fn selections(
        &self,
        scope: &UserScope,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<SelectionEvent>, StorageError> {
        self.check("selections")?;
        self.inner.selections(scope, since).await
    }

    async fn count_names(&self, visibility: Visibility) -> Result<u64, StorageError> {
        self.check("count_names")?;
        self.inner.count_names(visibility).await
    }

    async fn count_users(&self) -> Result<u64, StorageError> {
        self.check("count_users")?;
        self.inner.count_users().await
    }

    async fn count_ratings(&self) -> Result<u64, StorageError> {
        self.check("count_ratings")?;
        self.inner.count_ratings().await
    }

    async fn count_selections(&self) -> Result<u64, StorageError> {
        self.check("count_selections")?;
        self.inner.count_selections().await
    }

    async fn average_rating(&self) -> Result<Option<f64>, StorageError> {
        self.check("average_rating")?;
        self.inner.average_rating().await
    }

    async fn upsert_ratings(
        &self,
        rows: Vec<RatingRecord>,
        policy: MergePolicy,
    ) -> Result<usize, StorageError> {
        self.check("upsert_ratings")?;
        self.bulk_writes
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        self.inner.upsert_ratings(rows, policy).await
    }

    async fn append_selections(
        &self,
        events: Vec<SelectionEvent>,
    ) -> Result<usize, StorageError> {
        self.check("append_selections")?;
        self.inner.append_selections(events).await
    }
}
