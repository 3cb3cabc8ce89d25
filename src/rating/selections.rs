//! Recording tournament selections.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use super::{RatingError, SaveOutcome};
use crate::models::SelectionEvent;
use crate::storage::Store;

/// Appends selection events for names a user picked into a tournament.
pub struct SelectionRecorder {
    store: Arc<dyn Store>,
}

impl SelectionRecorder {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Resolve `references` and append one event per resolved name, all
    /// stamped `selected_at`, in a single write.
    pub async fn record(
        &self,
        user_id: &str,
        references: &[String],
        selected_at: DateTime<Utc>,
    ) -> Result<SaveOutcome, RatingError> {
        let resolved = self.store.resolve_names(references).await?;

        let mut events = Vec::with_capacity(references.len());
        let mut dropped = 0;
        for reference in references {
            match resolved.get(reference) {
                Some(name) => events.push(SelectionEvent::new(
                    name.id.clone(),
                    name.name.clone(),
                    user_id,
                    selected_at,
                )),
                None => {
                    warn!(user_id, reference = %reference, "Dropping selection for unknown name");
                    dropped += 1;
                }
            }
        }

        if events.is_empty() {
            return Ok(SaveOutcome::nothing_to_save(dropped));
        }

        let saved_count = self.store.append_selections(events).await?;
        info!(user_id, saved_count, "Recorded selections");
        Ok(SaveOutcome {
            saved_count,
            dropped,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NameRecord, UserScope};
    use crate::storage::MemoryStore;

    #[tokio::test]
    async fn test_record_resolves_and_appends() {
        let store = Arc::new(MemoryStore::with_names(vec![
            NameRecord::new("Tiger", "").with_id("n-1"),
            NameRecord::new("Luna", "").with_id("n-2"),
        ]));
        let recorder = SelectionRecorder::new(store.clone());
        let at = Utc::now();

        let outcome = recorder
            .record(
                "alice",
                &["luna".to_string(), "n-1".to_string(), "nobody".to_string()],
                at,
            )
            .await
            .unwrap();

        assert_eq!(outcome.saved_count, 2);
        assert_eq!(outcome.dropped, 1);

        let events = store.selections(&UserScope::All, None).await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].name_id.as_str(), "n-2");
        assert_eq!(events[0].name, "Luna");
        assert_eq!(events[1].name_id.as_str(), "n-1");
        assert!(events.iter().all(|e| e.selected_at == at && e.user_id == "alice"));
    }

    #[tokio::test]
    async fn test_record_nothing_resolved() {
        let store = Arc::new(MemoryStore::new());
        let recorder = SelectionRecorder::new(store.clone());

        let outcome = recorder
            .record("alice", &["ghost".to_string()], Utc::now())
            .await
            .unwrap();

        assert_eq!(outcome.saved_count, 0);
        assert_eq!(store.count_selections().await.unwrap(), 0);
    }
}
