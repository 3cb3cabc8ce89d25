//! Catalog name model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{EntityId, NameId};

/// A candidate name in the catalog.
///
/// The catalog is owned elsewhere; the analytics core only reads it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NameRecord {
    pub id: NameId,

    /// Display name
    pub name: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub category: Option<String>,

    #[serde(default = "default_true")]
    pub is_active: bool,

    /// Hidden names stay in the catalog but drop out of public rankings
    #[serde(default)]
    pub is_hidden: bool,

    pub created_at: DateTime<Utc>,
}

fn default_true() -> bool {
    true
}

impl NameRecord {
    /// Create an active, visible name with an ID derived from its display name.
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        let name = name.into();
        let id = EntityId::generate(&["name", &name.trim().to_lowercase()]);
        Self {
            id,
            name,
            description: description.into(),
            category: None,
            is_active: true,
            is_hidden: false,
            created_at: Utc::now(),
        }
    }

    pub fn with_id(mut self, id: impl Into<NameId>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    pub fn hidden(mut self) -> Self {
        self.is_hidden = true;
        self
    }

    pub fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }

    /// Visible names are the ones public rankings cover.
    pub fn is_visible(&self) -> bool {
        self.is_active && !self.is_hidden
    }

    /// Does `reference` point at this name, either by id or by display name?
    pub fn matches_reference(&self, reference: &str) -> bool {
        let reference = reference.trim();
        self.id.as_str() == reference || self.name.trim().eq_ignore_ascii_case(reference)
    }
}
