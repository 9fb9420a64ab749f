//! Conversation-key → work-item-ID cache.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Positive identifier of a tracked work item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u64", into = "u64")]
pub struct WorkItemId(u64);

impl WorkItemId {
    /// `None` for zero.
    pub fn new(id: u64) -> Option<Self> {
        (id > 0).then_some(Self(id))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for WorkItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<u64> for WorkItemId {
    type Error = String;

    fn try_from(id: u64) -> Result<Self, Self::Error> {
        Self::new(id).ok_or_else(|| "work item id must be positive".to_string())
    }
}

impl From<WorkItemId> for u64 {
    fn from(id: WorkItemId) -> Self {
        id.0
    }
}

/// Read-only view of the cache used by the conversation resolver.
pub trait WorkItemCache: Send + Sync {
    /// Entries in ascending key order.
    fn entries(&self) -> Box<dyn Iterator<Item = (&str, WorkItemId)> + '_>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Sorted in-memory cache. Empty keys are never stored.
#[derive(Debug, Clone, Default)]
pub struct SortedWorkItemCache {
    entries: BTreeMap<String, WorkItemId>,
}

impl SortedWorkItemCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `key` belongs to `id`. Returns `false` for a blank key.
    pub fn insert(&mut self, key: impl Into<String>, id: WorkItemId) -> bool {
        let key = key.into();
        if key.trim().is_empty() {
            debug!(work_item_id = %id, "Ignoring work item with empty conversation key");
            return false;
        }
        if let Some(previous) = self.entries.insert(key, id)
            && previous != id
        {
            debug!(previous = %previous, work_item_id = %id, "Conversation key re-assigned");
        }
        true
    }

    pub fn get(&self, key: &str) -> Option<WorkItemId> {
        self.entries.get(key).copied()
    }
}

impl FromIterator<(String, WorkItemId)> for SortedWorkItemCache {
    fn from_iter<I: IntoIterator<Item = (String, WorkItemId)>>(iter: I) -> Self {
        let mut cache = Self::new();
        for (key, id) in iter {
            cache.insert(key, id);
        }
        cache
    }
}

impl WorkItemCache for SortedWorkItemCache {
    fn entries(&self) -> Box<dyn Iterator<Item = (&str, WorkItemId)> + '_> {
        Box::new(self.entries.iter().map(|(k, v)| (k.as_str(), *v)))
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}
