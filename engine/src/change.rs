//! Change descriptors reported by the native library.
//!
//! A change descriptor is scoped to exactly one tracking key and describes
//! how one live collection changed, either as index sets or as a full
//! replacement list.

use crate::RawRecord;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Ordered set of collection indices.
pub type IndexSet = BTreeSet<usize>;

/// Opaque identifier correlating native change notifications with one
/// live collection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackingKey(String);

impl TrackingKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TrackingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TrackingKey {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

/// Display order of a tracked collection relative to the native order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    /// Local index equals native index (default)
    #[default]
    Normal,
    /// Local index `i` holds native index `len - 1 - i`
    Reversed,
}

impl SortOrder {
    /// Map an index between native and local space for a sequence of `len`.
    ///
    /// The mapping is its own inverse. Returns `None` when `index` is not
    /// below `len`.
    pub fn map_index(self, index: usize, len: usize) -> Option<usize> {
        if index >= len {
            return None;
        }
        match self {
            SortOrder::Normal => Some(index),
            SortOrder::Reversed => Some(len - 1 - index),
        }
    }
}

/// Structured diff describing how one tracked collection changed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeDescriptor {
    /// Key of the live collection this change belongs to
    #[serde(rename = "_cacheKey", alias = "trackingKey")]
    pub tracking_key: TrackingKey,
    /// Indices removed, relative to the collection before the change
    #[serde(default, alias = "removedIndexes")]
    pub removed_indices: IndexSet,
    /// Indices inserted, relative to the collection after the change
    #[serde(default, alias = "insertedIndexes")]
    pub inserted_indices: IndexSet,
    /// Indices whose content changed, relative to the collection after the change
    #[serde(default, alias = "changedIndexes")]
    pub updated_indices: IndexSet,
    /// Length of the collection after the change
    pub new_count: usize,
    /// Complete new contents, when the native side could not diff
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_replacement: Option<Vec<RawRecord>>,
}

impl ChangeDescriptor {
    /// Create an incremental change with empty index sets.
    pub fn new(tracking_key: impl Into<TrackingKey>, new_count: usize) -> Self {
        Self {
            tracking_key: tracking_key.into(),
            removed_indices: IndexSet::new(),
            inserted_indices: IndexSet::new(),
            updated_indices: IndexSet::new(),
            new_count,
            full_replacement: None,
        }
    }

    /// Create a change that replaces the whole collection.
    pub fn replacement(tracking_key: impl Into<TrackingKey>, records: Vec<RawRecord>) -> Self {
        let mut change = Self::new(tracking_key, records.len());
        change.full_replacement = Some(records);
        change
    }

    pub fn with_removed(mut self, indices: impl IntoIterator<Item = usize>) -> Self {
        self.removed_indices.extend(indices);
        self
    }

    pub fn with_inserted(mut self, indices: impl IntoIterator<Item = usize>) -> Self {
        self.inserted_indices.extend(indices);
        self
    }

    pub fn with_updated(mut self, indices: impl IntoIterator<Item = usize>) -> Self {
        self.updated_indices.extend(indices);
        self
    }

    /// True when no index set is populated and there is no replacement.
    pub fn has_index_changes(&self) -> bool {
        !(self.removed_indices.is_empty()
            && self.inserted_indices.is_empty()
            && self.updated_indices.is_empty())
    }
}
