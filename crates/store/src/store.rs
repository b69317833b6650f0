use std::sync::Arc;

use async_trait::async_trait;
use docflow_core::{Content, Item, ItemId, ItemMeta, Stage};

use crate::error::StoreError;

/// Result of [`ItemStore::insert_if_absent`].
#[derive(Debug, Clone, PartialEq)]
pub enum InsertOutcome {
    Inserted(Item),
    AlreadyExists(ItemId),
}

impl InsertOutcome {
    pub fn is_inserted(&self) -> bool {
        matches!(self, InsertOutcome::Inserted(_))
    }
}

/// Storage backend for pipeline items.
///
/// Implementations must tolerate concurrent callers: stages running on
/// different jobs call into the same store at the same time.
#[async_trait]
pub trait ItemStore: Send + Sync {
    /// Insert a new item for `path` unless one already exists. Keyed by
    /// exact path equality.
    async fn insert_if_absent(&self, path: &str, meta: ItemMeta) -> Result<InsertOutcome, StoreError>;

    /// Up to `limit` items waiting on `stage`, least recently updated first
    /// (ties by ascending id). Recording a failure on an item touches it, so
    /// items that keep failing move behind the rest of the queue.
    async fn query_eligible(&self, stage: Stage, limit: usize) -> Result<Vec<Item>, StoreError>;

    /// Merge `patch` into the item's metadata. Keys not set on the patch are kept.
    async fn merge_metadata(&self, id: ItemId, patch: ItemMeta) -> Result<(), StoreError>;

    /// Replace the item's extracted content.
    async fn set_content(&self, id: ItemId, content: Content) -> Result<(), StoreError>;

    /// Clear content and the extraction/analysis markers so the item is
    /// extracted and analyzed again. Render output is left alone.
    async fn reset_for_reprocessing(&self, id: ItemId) -> Result<(), StoreError>;

    async fn get(&self, id: ItemId) -> Result<Option<Item>, StoreError>;

    /// All items in ascending id order.
    async fn list(&self) -> Result<Vec<Item>, StoreError>;
}

/// Thread-safe handle passed to every stage.
pub type SharedItemStore = Arc<dyn ItemStore>;

/// Metadata patch applied by [`ItemStore::reset_for_reprocessing`].
pub(crate) fn reset_patch() -> ItemMeta {
    ItemMeta {
        extracted: Some(false),
        analyzed: Some(false),
        ..Default::default()
    }
}
