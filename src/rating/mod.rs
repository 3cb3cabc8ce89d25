//! Rating updater.
//!
//! Turns submitted match results into bounded, merged rating rows. A batch
//! is resolved, clamped and folded in memory, then written with exactly one
//! bulk upsert.

mod selections;

pub use selections::*;

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::models::{MergePolicy, NameId, RatingRecord};
use crate::storage::{StorageError, Store};

/// Errors from the write path.
#[derive(Debug, Error)]
pub enum RatingError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// One submitted match outcome for a name.
#[derive(Debug, Clone, PartialEq)]
pub struct RatingSubmission {
    /// Catalog id or display name
    pub reference: String,
    pub rating: f64,
    pub wins: u32,
    pub losses: u32,
}

impl RatingSubmission {
    pub fn new(reference: impl Into<String>, rating: f64) -> Self {
        Self {
            reference: reference.into(),
            rating,
            wins: 0,
            losses: 0,
        }
    }

    pub fn with_results(mut self, wins: u32, losses: u32) -> Self {
        self.wins = wins;
        self.losses = losses;
        self
    }
}

/// Result of a write batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveOutcome {
    pub saved_count: usize,
    /// Entries whose name reference did not resolve
    #[serde(skip)]
    pub dropped: usize,
}

impl SaveOutcome {
    /// Nothing survived resolution, so nothing was written.
    pub fn nothing_to_save(dropped: usize) -> Self {
        Self {
            saved_count: 0,
            dropped,
        }
    }
}

/// Applies rating submissions to the store.
pub struct RatingUpdater {
    store: Arc<dyn Store>,
    policy: MergePolicy,
}

impl RatingUpdater {
    pub fn new(store: Arc<dyn Store>, policy: MergePolicy) -> Self {
        Self { store, policy }
    }

    pub fn policy(&self) -> MergePolicy {
        self.policy
    }

    /// Resolve, clamp and upsert a batch for one user.
    ///
    /// Unresolvable references are dropped and reflected in a lower
    /// `saved_count`. Entries for the same name are folded together before
    /// the single bulk write.
    pub async fn submit(
        &self,
        user_id: &str,
        submissions: Vec<RatingSubmission>,
    ) -> Result<SaveOutcome, RatingError> {
        let references: Vec<String> = submissions.iter().map(|s| s.reference.clone()).collect();
        let resolved = self.store.resolve_names(&references).await?;

        let mut rows: Vec<RatingRecord> = Vec::with_capacity(submissions.len());
        let mut slot: HashMap<NameId, usize> = HashMap::new();
        let mut dropped = 0;

        for submission in submissions {
            let Some(name) = resolved.get(&submission.reference) else {
                warn!(user_id, reference = %submission.reference, "Dropping rating for unknown name");
                dropped += 1;
                continue;
            };

            let row = RatingRecord::new(user_id, name.id.clone(), submission.rating)
                .with_results(submission.wins, submission.losses);
            match slot.get(&name.id) {
                // Same name twice in one batch: fold additively so the bulk
                // write carries the key once.
                Some(&i) => rows[i].merge(&row, MergePolicy::Additive),
                None => {
                    slot.insert(name.id.clone(), rows.len());
                    rows.push(row);
                }
            }
        }

        if rows.is_empty() {
            debug!(user_id, dropped, "Nothing to save");
            return Ok(SaveOutcome::nothing_to_save(dropped));
        }

        let saved_count = self.store.upsert_ratings(rows, self.policy).await?;
        info!(user_id, saved_count, dropped, "Saved ratings");

        Ok(SaveOutcome {
            saved_count,
            dropped,
        })
    }
}
