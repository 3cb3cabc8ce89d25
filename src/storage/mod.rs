//! Rating, selection and catalog storage.
//!
//! The analytics core talks to storage only through the [`Store`] trait.
//! Two implementations exist and one is picked at startup:
//! - [`JsonlStore`]: the on-disk data lake (JSONL files)
//! - [`MemoryStore`]: an in-memory fixture store, used for demos and tests

mod jsonl;
mod memory;

pub use jsonl::*;
pub use memory::*;

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::{
    MergePolicy, NameId, NameQuery, NameRecord, RatingRecord, SelectionEvent, UserScope,
    Visibility,
};

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Storage task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Configuration for storage paths.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
}

impl StorageConfig {
    pub fn new(data_dir: PathBuf) -> Self {
        Self { data_dir }
    }

    pub fn catalog_dir(&self) -> PathBuf {
        self.data_dir.join("catalog")
    }

    pub fn activity_dir(&self) -> PathBuf {
        self.data_dir.join("activity")
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::new(PathBuf::from("./data"))
    }
}

/// Generic read/write store behind the rating updater and the aggregator.
///
/// Every method is one store round-trip. Bulk writes must be applied as a
/// unit: a failure leaves previously stored rows untouched.
#[async_trait]
pub trait Store: Send + Sync {
    /// Backend name for logging.
    fn name(&self) -> &'static str;

    /// Catalog read. When `query.ids` is set, rows come back in id order.
    async fn names(&self, query: &NameQuery) -> Result<Vec<NameRecord>, StorageError>;

    async fn ratings(&self, scope: &UserScope) -> Result<Vec<RatingRecord>, StorageError>;

    /// Selection events, optionally only those at or after `since`.
    async fn selections(
        &self,
        scope: &UserScope,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<SelectionEvent>, StorageError>;

    async fn count_names(&self, visibility: Visibility) -> Result<u64, StorageError>;

    /// Distinct users with any rating or selection.
    async fn count_users(&self) -> Result<u64, StorageError>;

    async fn count_ratings(&self) -> Result<u64, StorageError>;

    async fn count_selections(&self) -> Result<u64, StorageError>;

    /// Mean rating over all rating rows; `None` when there are none.
    async fn average_rating(&self) -> Result<Option<f64>, StorageError>;

    /// Insert or merge a batch of rating rows in one write.
    async fn upsert_ratings(
        &self,
        rows: Vec<RatingRecord>,
        policy: MergePolicy,
    ) -> Result<usize, StorageError>;

    /// Append selection events in one write.
    async fn append_selections(&self, events: Vec<SelectionEvent>)
        -> Result<usize, StorageError>;

    /// Resolve name references (ids or display names) to catalog rows.
    /// References that match nothing are absent from the result.
    async fn resolve_names(
        &self,
        references: &[String],
    ) -> Result<HashMap<String, NameRecord>, StorageError> {
        let catalog = self.names(&NameQuery::all()).await?;
        Ok(resolve_references(&catalog, references))
    }
}

/// Apply a [`NameQuery`] to an in-memory catalog snapshot.
pub(crate) fn filter_names<'a>(
    catalog: impl IntoIterator<Item = &'a NameRecord>,
    query: &NameQuery,
) -> Vec<NameRecord> {
    let limit = query.limit.unwrap_or(usize::MAX);
    let matching = catalog
        .into_iter()
        .filter(|n| query.visibility.matches(n));

    match &query.ids {
        Some(ids) => {
            let by_id: HashMap<&NameId, &NameRecord> = matching.map(|n| (&n.id, n)).collect();
            ids.iter()
                .filter_map(|id| by_id.get(id).map(|n| (*n).clone()))
                .take(limit)
                .collect()
        }
        None => matching.take(limit).cloned().collect(),
    }
}

/// Match each reference against catalog ids first, then display names.
pub(crate) fn resolve_references(
    catalog: &[NameRecord],
    references: &[String],
) -> HashMap<String, NameRecord> {
    let mut resolved = HashMap::new();
    for reference in references {
        if resolved.contains_key(reference) {
            continue;
        }
        let found = catalog
            .iter()
            .find(|n| n.id.as_str() == reference.trim())
            .or_else(|| catalog.iter().find(|n| n.matches_reference(reference)));
        if let Some(name) = found {
            resolved.insert(reference.clone(), name.clone());
        }
    }
    resolved
}

pub(crate) fn distinct_users(ratings: &[RatingRecord], selections: &[SelectionEvent]) -> u64 {
    let users: HashSet<&str> = ratings
        .iter()
        .map(|r| r.user_id.as_str())
        .chain(selections.iter().map(|s| s.user_id.as_str()))
        .collect();
    users.len() as u64
}

pub(crate) fn mean_rating(ratings: &[RatingRecord]) -> Option<f64> {
    if ratings.is_empty() {
        return None;
    }
    let sum: i64 = ratings.iter().map(|r| r.rating as i64).sum();
    Some(sum as f64 / ratings.len() as f64)
}
