//! Tournament selection events.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::NameId;

/// A user picked a name into a tournament.
///
/// Selection events are append-only; nothing in this crate edits or
/// removes them once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionEvent {
    pub name_id: NameId,

    /// Display name at the time of selection
    pub name: String,

    pub user_id: String,

    pub selected_at: DateTime<Utc>,
}

impl SelectionEvent {
    pub fn new(
        name_id: impl Into<NameId>,
        name: impl Into<String>,
        user_id: impl Into<String>,
        selected_at: DateTime<Utc>,
    ) -> Self {
        Self {
            name_id: name_id.into(),
            name: name.into(),
            user_id: user_id.into(),
            selected_at,
        }
    }

    /// UTC calendar day the selection happened on.
    pub fn day(&self) -> NaiveDate {
        self.selected_at.date_naive()
    }
}
