//! The four pipeline stages: discover, render, extract, analyze.
//!
//! Each stage is a [`StageProcessor`](crate::scheduler::StageProcessor) that
//! pulls one batch of eligible items from the store per run. A failure on one
//! item is logged and recorded on that item; the rest of the batch carries on.

pub mod analyze;
pub mod discover;
pub mod extract;
pub mod render;

use std::path::{Path, PathBuf};

use docflow_core::{ItemId, ItemMeta};
use docflow_store::ItemStore;
use tracing::warn;

pub use analyze::{AnalysisSettings, AnalyzeStage};
pub use discover::{DirectorySource, DiscoverStage, DiscoveredDocument, DocumentSource};
pub use extract::ExtractStage;
pub use render::RenderStage;

/// Directory holding the page previews of one item.
pub fn preview_dir(previews_root: &Path, id: ItemId) -> PathBuf {
    previews_root.join(id.to_string())
}

/// Store the failure message on the item so it is visible to operators.
/// A store error here is only logged; the item is retried either way.
pub(crate) async fn record_item_error(store: &dyn ItemStore, id: ItemId, message: String) {
    let patch = ItemMeta {
        processing_error: Some(message),
        ..ItemMeta::default()
    };
    if let Err(e) = store.merge_metadata(id, patch).await {
        warn!(item_id = id, error = %e, "Failed to record processing error");
    }
}
