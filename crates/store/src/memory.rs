//! In-process item store backed by a `BTreeMap`.
//!
//! Nothing is persisted; used by tests and for dry runs.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::Utc;
use docflow_core::{Content, Item, ItemId, ItemMeta, Stage};
use tokio::sync::RwLock;

use crate::error::StoreError;
use crate::store::{reset_patch, InsertOutcome, ItemStore};

#[derive(Default)]
struct MemoryState {
    items: BTreeMap<ItemId, Item>,
    by_path: HashMap<String, ItemId>,
    next_id: ItemId,
}

#[derive(Default)]
pub struct MemoryItemStore {
    state: RwLock<MemoryState>,
}

impl MemoryItemStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.items.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl ItemStore for MemoryItemStore {
    async fn insert_if_absent(&self, path: &str, meta: ItemMeta) -> Result<InsertOutcome, StoreError> {
        let mut state = self.state.write().await;
        if let Some(id) = state.by_path.get(path) {
            return Ok(InsertOutcome::AlreadyExists(*id));
        }

        state.next_id += 1;
        let id = state.next_id;
        let now = Utc::now();
        let item = Item {
            id,
            path: path.to_string(),
            meta,
            content: None,
            created_at: now,
            updated_at: now,
        };
        state.by_path.insert(path.to_string(), id);
        state.items.insert(id, item.clone());
        Ok(InsertOutcome::Inserted(item))
    }

    async fn query_eligible(&self, stage: Stage, limit: usize) -> Result<Vec<Item>, StoreError> {
        let state = self.state.read().await;
        let mut eligible: Vec<&Item> = state
            .items
            .values()
            .filter(|item| stage.is_eligible(&item.meta))
            .collect();
        eligible.sort_by_key(|item| (item.updated_at, item.id));
        Ok(eligible.into_iter().take(limit).cloned().collect())
    }

    async fn merge_metadata(&self, id: ItemId, patch: ItemMeta) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        let item = state.items.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        item.meta.merge(patch);
        item.updated_at = Utc::now();
        Ok(())
    }

    async fn set_content(&self, id: ItemId, content: Content) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        let item = state.items.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        item.content = Some(content);
        item.updated_at = Utc::now();
        Ok(())
    }

    async fn reset_for_reprocessing(&self, id: ItemId) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        let item = state.items.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        item.content = None;
        item.meta.merge(reset_patch());
        item.updated_at = Utc::now();
        Ok(())
    }

    async fn get(&self, id: ItemId) -> Result<Option<Item>, StoreError> {
        Ok(self.state.read().await.items.get(&id).cloned())
    }

    async fn list(&self) -> Result<Vec<Item>, StoreError> {
        Ok(self.state.read().await.items.values().cloned().collect())
    }
}
