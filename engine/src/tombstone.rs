//! Tombstones: permanent deletion markers.
//!
//! A tombstone suppresses its id in its category forever. Tombstones are not
//! compared by time against records; any tombstone beats any record.

use crate::RecordId;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Who deleted a record when nothing more specific is known.
pub const DELETED_BY_USER: &str = "user";

/// Marker recording that an id was deleted from a category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tombstone {
    pub id: RecordId,
    #[serde(default, deserialize_with = "crate::record::null_as_default")]
    pub deleted_at: String,
    #[serde(default = "default_deleted_by")]
    pub deleted_by: String,
}

fn default_deleted_by() -> String {
    DELETED_BY_USER.to_string()
}

impl Tombstone {
    pub fn new(id: RecordId, deleted_at: impl Into<String>) -> Self {
        Self {
            id,
            deleted_at: deleted_at.into(),
            deleted_by: default_deleted_by(),
        }
    }

    pub fn with_deleted_by(mut self, deleted_by: impl Into<String>) -> Self {
        self.deleted_by = deleted_by.into();
        self
    }
}

/// Append `tombstone` unless its id is already present.
///
/// Returns `true` if the list changed.
pub fn push_unique(list: &mut Vec<Tombstone>, tombstone: Tombstone) -> bool {
    if list.iter().any(|t| t.id == tombstone.id) {
        return false;
    }
    list.push(tombstone);
    true
}

/// Union of two tombstone lists, deduplicated by id.
///
/// The first occurrence of each id wins, scanning `first` then `second`.
pub fn union(first: &[Tombstone], second: &[Tombstone]) -> Vec<Tombstone> {
    let mut seen = HashSet::with_capacity(first.len() + second.len());
    first
        .iter()
        .chain(second)
        .filter(|t| seen.insert(t.id))
        .cloned()
        .collect()
}

/// Set of ids covered by a tombstone list.
pub fn id_set(list: &[Tombstone]) -> HashSet<RecordId> {
    list.iter().map(|t| t.id).collect()
}
