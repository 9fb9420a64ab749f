//! Work item backend, the tracker side of the pipeline.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::StoreError;
use crate::workitems::cache::WorkItemId;

/// Field name → value updates for one work item.
pub type FieldValues = HashMap<String, String>;

/// Backend that creates and updates work items.
#[async_trait]
pub trait WorkItemStore: Send + Sync {
    /// Create a work item with the given fields.
    async fn create(&self, fields: &FieldValues) -> Result<WorkItemId, StoreError>;

    /// Append `comment` (may be empty) and apply `fields`.
    async fn modify(
        &self,
        id: WorkItemId,
        comment: &str,
        fields: &FieldValues,
    ) -> Result<(), StoreError>;

    /// Known (conversation key, id) pairs, used to seed an instance's cache.
    async fn conversations(&self) -> Result<Vec<(String, WorkItemId)>, StoreError>;
}

/// A work item as kept by the simulated store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SimulatedWorkItem {
    pub fields: BTreeMap<String, String>,
    #[serde(default)]
    pub comments: Vec<String>,
}

#[derive(Debug, Default)]
struct SimulatedState {
    next_id: u64,
    items: BTreeMap<WorkItemId, SimulatedWorkItem>,
}

/// In-memory work item store for simulation runs and tests.
///
/// Ids are handed out sequentially from 1. When a snapshot path is set, every
/// change rewrites a JSON dump of all items. A failed snapshot write is logged
/// and does not undo the change.
#[derive(Debug)]
pub struct SimulatedWorkItemStore {
    key_field: String,
    snapshot_path: Option<PathBuf>,
    state: Mutex<SimulatedState>,
}

impl SimulatedWorkItemStore {
    /// `key_field` is the field holding each item's conversation key.
    pub fn new(key_field: impl Into<String>) -> Self {
        Self {
            key_field: key_field.into(),
            snapshot_path: None,
            state: Mutex::new(SimulatedState {
                next_id: 1,
                items: BTreeMap::new(),
            }),
        }
    }

    pub fn with_snapshot_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.snapshot_path = Some(path.into());
        self
    }

    pub async fn get(&self, id: WorkItemId) -> Option<SimulatedWorkItem> {
        self.state.lock().await.items.get(&id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.items.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    async fn write_snapshot(&self, state: &SimulatedState) -> Result<(), StoreError> {
        let Some(path) = &self.snapshot_path else {
            return Ok(());
        };
        let items: BTreeMap<String, &SimulatedWorkItem> = state
            .items
            .iter()
            .map(|(id, item)| (id.to_string(), item))
            .collect();
        let json = serde_json::to_string_pretty(&items)
            .map_err(|e| StoreError::Snapshot(e.to_string()))?;
        tokio::fs::write(path, json)
            .await
            .map_err(|e| StoreError::Snapshot(format!("{}: {e}", path.display())))?;
        debug!(path = %path.display(), "Wrote work item snapshot");
        Ok(())
    }

    async fn persist(&self, state: &SimulatedState) {
        if let Err(e) = self.write_snapshot(state).await {
            warn!(error = %e, "Failed to write work item snapshot");
        }
    }
}

#[async_trait]
impl WorkItemStore for SimulatedWorkItemStore {
    async fn create(&self, fields: &FieldValues) -> Result<WorkItemId, StoreError> {
        let mut state = self.state.lock().await;
        let id = WorkItemId::new(state.next_id)
            .ok_or_else(|| StoreError::CreateFailed("id counter overflowed".into()))?;
        state.next_id += 1;

        state.items.insert(
            id,
            SimulatedWorkItem {
                fields: fields.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
                comments: Vec::new(),
            },
        );
        info!(work_item_id = %id, fields = fields.len(), "Created simulated work item");

        self.persist(&state).await;
        Ok(id)
    }

    async fn modify(
        &self,
        id: WorkItemId,
        comment: &str,
        fields: &FieldValues,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        let item = state
            .items
            .get_mut(&id)
            .ok_or(StoreError::NotFound { id: id.get() })?;

        for (field, value) in fields {
            item.fields.insert(field.clone(), value.clone());
        }
        if !comment.trim().is_empty() {
            item.comments.push(comment.to_string());
        }
        info!(work_item_id = %id, fields = fields.len(), "Modified simulated work item");

        self.persist(&state).await;
        Ok(())
    }

    async fn conversations(&self) -> Result<Vec<(String, WorkItemId)>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .items
            .iter()
            .filter_map(|(id, item)| {
                let key = item.fields.get(&self.key_field)?.trim();
                (!key.is_empty()).then(|| (key.to_string(), *id))
            })
            .collect())
    }
}
