//! Per-(user, name) rating model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::NameId;

/// Lowest rating a record can hold.
pub const MIN_RATING: i32 = 800;

/// Highest rating a record can hold.
pub const MAX_RATING: i32 = 2400;

/// Baseline rating for names nobody has rated yet.
pub const DEFAULT_RATING: i32 = 1500;

/// Clamp a raw submitted rating into `[MIN_RATING, MAX_RATING]`, rounded to
/// the nearest integer.
pub fn clamp_rating(raw: f64) -> i32 {
    if raw.is_nan() {
        return DEFAULT_RATING;
    }
    raw.round().clamp(MIN_RATING as f64, MAX_RATING as f64) as i32
}

/// How an upsert treats an already stored record for the same key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MergePolicy {
    /// Wins and losses are added to the stored counters; the rating is replaced.
    #[default]
    Additive,
    /// The incoming record replaces the stored one (last write wins).
    Overwrite,
}

impl std::fmt::Display for MergePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MergePolicy::Additive => write!(f, "additive"),
            MergePolicy::Overwrite => write!(f, "overwrite"),
        }
    }
}

/// The stored rating of one name for one user.
///
/// At most one record exists per `(user_id, name_id)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatingRecord {
    pub user_id: String,
    pub name_id: NameId,
    pub rating: i32,
    #[serde(default)]
    pub wins: u32,
    #[serde(default)]
    pub losses: u32,
    pub updated_at: DateTime<Utc>,
}

impl RatingRecord {
    /// Build a record from a raw rating; the rating is clamped.
    pub fn new(user_id: impl Into<String>, name_id: impl Into<NameId>, raw_rating: f64) -> Self {
        Self {
            user_id: user_id.into(),
            name_id: name_id.into(),
            rating: clamp_rating(raw_rating),
            wins: 0,
            losses: 0,
            updated_at: Utc::now(),
        }
    }

    pub fn with_results(mut self, wins: u32, losses: u32) -> Self {
        self.wins = wins;
        self.losses = losses;
        self
    }

    pub fn is_same_key(&self, other: &RatingRecord) -> bool {
        self.user_id == other.user_id && self.name_id == other.name_id
    }

    /// Fold `incoming` into this record.
    pub fn merge(&mut self, incoming: &RatingRecord, policy: MergePolicy) {
        match policy {
            MergePolicy::Additive => {
                self.wins = self.wins.saturating_add(incoming.wins);
                self.losses = self.losses.saturating_add(incoming.losses);
            }
            MergePolicy::Overwrite => {
                self.wins = incoming.wins;
                self.losses = incoming.losses;
            }
        }
        self.rating = incoming.rating;
        self.updated_at = incoming.updated_at;
    }
}

/// Upsert `incoming` into `existing` in a single pass.
///
/// Returns the number of incoming rows applied. Stores use this to implement
/// their bulk write so the merge rules live in one place.
pub fn upsert_into(
    existing: &mut Vec<RatingRecord>,
    incoming: Vec<RatingRecord>,
    policy: MergePolicy,
) -> usize {
    let mut index: std::collections::HashMap<(String, NameId), usize> = existing
        .iter()
        .enumerate()
        .map(|(i, r)| ((r.user_id.clone(), r.name_id.clone()), i))
        .collect();

    let applied = incoming.len();
    for row in incoming {
        let key = (row.user_id.clone(), row.name_id.clone());
        match index.get(&key) {
            Some(&i) => existing[i].merge(&row, policy),
            None => {
                index.insert(key, existing.len());
                existing.push(row);
            }
        }
    }
    applied
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_rating_bounds() {
        assert_eq!(clamp_rating(5000.0), 2400);
        assert_eq!(clamp_rating(-100.0), 800);
        assert_eq!(clamp_rating(800.0), 800);
        assert_eq!(clamp_rating(2400.0), 2400);
    }

    #[test]
    fn test_clamp_rating_rounds() {
        assert_eq!(clamp_rating(1500.4), 1500);
        assert_eq!(clamp_rating(1500.5), 1501);
        assert_eq!(clamp_rating(1612.7), 1613);
    }

    #[test]
    fn test_clamp_rating_infinities() {
        assert_eq!(clamp_rating(f64::INFINITY), 2400);
        assert_eq!(clamp_rating(f64::NEG_INFINITY), 800);
    }

    #[test]
    fn test_new_record_clamps() {
        let record = RatingRecord::new("alice", "n-1", 9000.0);
        assert_eq!(record.rating, MAX_RATING);
        assert_eq!(record.wins, 0);
        assert_eq!(record.losses, 0);
    }

    #[test]
    fn test_merge_additive() {
        let mut stored = RatingRecord::new("alice", "n-1", 1500.0).with_results(3, 1);
        let incoming = RatingRecord::new("alice", "n-1", 1620.0).with_results(2, 2);
        stored.merge(&incoming, MergePolicy::Additive);

        assert_eq!(stored.rating, 1620);
        assert_eq!(stored.wins, 5);
        assert_eq!(stored.losses, 3);
    }

    #[test]
    fn test_merge_overwrite() {
        let mut stored = RatingRecord::new("alice", "n-1", 1500.0).with_results(3, 1);
        let incoming = RatingRecord::new("alice", "n-1", 1450.0).with_results(0, 1);
        stored.merge(&incoming, MergePolicy::Overwrite);

        assert_eq!(stored.rating, 1450);
        assert_eq!(stored.wins, 0);
        assert_eq!(stored.losses, 1);
    }

    #[test]
    fn test_upsert_into_inserts_and_merges() {
        let mut rows = vec![RatingRecord::new("alice", "n-1", 1500.0).with_results(1, 0)];
        let applied = upsert_into(
            &mut rows,
            vec![
                RatingRecord::new("alice", "n-1", 1550.0).with_results(1, 0),
                RatingRecord::new("alice", "n-2", 1400.0).with_results(0, 1),
                RatingRecord::new("bob", "n-1", 1600.0),
            ],
            MergePolicy::Additive,
        );

        assert_eq!(applied, 3);
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].rating, 1550);
        assert_eq!(rows[0].wins, 2);
        assert_eq!(rows[1].name_id.as_str(), "n-2");
        assert_eq!(rows[2].user_id, "bob");
    }

    #[test]
    fn test_merge_policy_serialization() {
        assert_eq!(
            serde_json::to_string(&MergePolicy::Overwrite).unwrap(),
            "\"overwrite\""
        );
        let parsed: MergePolicy = serde_json::from_str("\"additive\"").unwrap();
        assert_eq!(parsed, MergePolicy::Additive);
        assert_eq!(MergePolicy::default(), MergePolicy::Additive);
    }
}
