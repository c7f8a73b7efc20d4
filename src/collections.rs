//! Pure list operations behind every persisted collection.
//!
//! All collections are ordered newest-first and keyed by a natural key. The
//! functions take and return owned vectors so the repository can swap the
//! result into place and write it back whole.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::types::{HistoryEntry, ResultRecord};

/// Natural key of a record within its collection.
pub trait Keyed {
    fn natural_key(&self) -> &str;
}

impl Keyed for String {
    fn natural_key(&self) -> &str {
        self
    }
}

impl Keyed for ResultRecord {
    fn natural_key(&self) -> &str {
        &self.key
    }
}

impl Keyed for HistoryEntry {
    fn natural_key(&self) -> &str {
        &self.term
    }
}

/// Maximum retained length of an ordered collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cap {
    Unbounded,
    Max(usize),
}

impl Cap {
    /// Drop entries from the tail (oldest) until the collection fits.
    pub fn truncate<T>(self, collection: &mut Vec<T>) {
        if let Cap::Max(n) = self {
            collection.truncate(n);
        }
    }

    pub fn limit(self) -> Option<usize> {
        match self {
            Cap::Unbounded => None,
            Cap::Max(n) => Some(n),
        }
    }
}

/// What a toggle did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Toggle {
    Added,
    Removed,
    /// Key was absent and there was no record to add.
    Ignored,
}

/// Prepend `record`, drop any older record sharing its key, then cap.
pub fn upsert_and_cap<T: Keyed>(mut collection: Vec<T>, record: T, cap: Cap) -> Vec<T> {
    collection.retain(|existing| existing.natural_key() != record.natural_key());
    collection.insert(0, record);
    cap.truncate(&mut collection);
    collection
}

/// Put a batch at the front, keeping the batch's own order, and drop older
/// records that share a key with any of them.
pub fn merge_front<T: Keyed>(collection: Vec<T>, records: Vec<T>, cap: Cap) -> Vec<T> {
    let mut merged = dedup_by_key(records);
    let incoming: HashSet<String> = merged
        .iter()
        .map(|r| r.natural_key().to_string())
        .collect();
    merged.extend(
        collection
            .into_iter()
            .filter(|existing| !incoming.contains(existing.natural_key())),
    );
    cap.truncate(&mut merged);
    merged
}

/// First occurrence of each key wins.
pub fn dedup_by_key<T: Keyed>(collection: Vec<T>) -> Vec<T> {
    let mut seen = HashSet::new();
    collection
        .into_iter()
        .filter(|record| seen.insert(record.natural_key().to_string()))
        .collect()
}

/// Remove `key` if present, otherwise append it.
pub fn toggle_membership(mut set: Vec<String>, key: &str) -> (Vec<String>, Toggle) {
    if set.iter().any(|k| k == key) {
        set.retain(|k| k != key);
        (set, Toggle::Removed)
    } else {
        set.push(key.to_string());
        (set, Toggle::Added)
    }
}

/// Same as [`toggle_membership`] but for sets that carry the full record.
pub fn toggle_record<T: Keyed>(mut set: Vec<T>, record: T) -> (Vec<T>, Toggle) {
    if contains_key(&set, record.natural_key()) {
        let key = record.natural_key().to_string();
        set.retain(|existing| existing.natural_key() != key);
        (set, Toggle::Removed)
    } else {
        set.push(record);
        (set, Toggle::Added)
    }
}

pub fn remove_by_key<T: Keyed>(mut collection: Vec<T>, key: &str) -> Vec<T> {
    collection.retain(|record| record.natural_key() != key);
    collection
}

pub fn contains_key<T: Keyed>(collection: &[T], key: &str) -> bool {
    collection.iter().any(|record| record.natural_key() == key)
}
