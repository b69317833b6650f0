use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use docflow_core::{Item, ItemMeta, Stage};
use docflow_store::SharedItemStore;
use tracing::{debug, error, info, warn};

use crate::scheduler::{StageError, StageProcessor, StageReport};
use crate::tools::{page_artifact, PageCounter, Rasterizer};

use super::{preview_dir, record_item_error};

/// Renders one preview image per page for items not yet rendered.
///
/// Pages whose artifact already exists are skipped, so an interrupted item
/// resumes where it stopped and an item whose previews are all present never
/// reaches the rasterizer. The item is marked rendered only once every page
/// artifact is present.
pub struct RenderStage {
    store: SharedItemStore,
    counter: Arc<dyn PageCounter>,
    rasterizer: Arc<dyn Rasterizer>,
    previews_root: PathBuf,
    batch_size: usize,
}

enum RenderOutcome {
    Complete { pages: u32, rendered: u32 },
    Incomplete { missing: u32 },
}

impl RenderStage {
    pub fn new(
        store: SharedItemStore,
        counter: Arc<dyn PageCounter>,
        rasterizer: Arc<dyn Rasterizer>,
        previews_root: impl Into<PathBuf>,
        batch_size: usize,
    ) -> Self {
        Self {
            store,
            counter,
            rasterizer,
            previews_root: previews_root.into(),
            batch_size,
        }
    }

    async fn render_item(&self, item: &Item) -> Result<RenderOutcome, StageError> {
        let source = Path::new(&item.path);
        let pages = self.counter.page_count(source).await?;
        if pages == 0 {
            return Err(StageError::Failed("document has no pages".into()));
        }

        let dir = preview_dir(&self.previews_root, item.id);
        tokio::fs::create_dir_all(&dir).await?;

        let mut rendered = 0;
        let mut missing = 0;
        for page in 1..=pages {
            let output = page_artifact(&dir, page);
            if tokio::fs::try_exists(&output).await.unwrap_or(false) {
                continue;
            }
            match self.rasterizer.render_page(source, page, &output).await {
                Ok(()) => rendered += 1,
                Err(e) => {
                    warn!(item_id = item.id, page, error = %e, "Failed to render page");
                    missing += 1;
                }
            }
        }

        if missing > 0 {
            return Ok(RenderOutcome::Incomplete { missing });
        }

        let patch = ItemMeta {
            rendered: Some(true),
            page_count: Some(pages),
            ..ItemMeta::default()
        };
        self.store.merge_metadata(item.id, patch).await?;
        Ok(RenderOutcome::Complete { pages, rendered })
    }
}

#[async_trait]
impl StageProcessor for RenderStage {
    async fn run(&self) -> Result<StageReport, StageError> {
        let items = self.store.query_eligible(Stage::Render, self.batch_size).await?;
        let mut report = StageReport::default();

        for item in items {
            match self.render_item(&item).await {
                Ok(RenderOutcome::Complete { pages, rendered }) => {
                    info!(item_id = item.id, pages, rendered, "Rendered previews");
                    report.processed += 1;
                }
                Ok(RenderOutcome::Incomplete { missing }) => {
                    warn!(item_id = item.id, missing, "Previews incomplete, will retry");
                    record_item_error(
                        self.store.as_ref(),
                        item.id,
                        format!("{missing} page(s) failed to render"),
                    )
                    .await;
                    report.failed += 1;
                }
                Err(e) => {
                    error!(item_id = item.id, path = %item.path, error = %e, "Failed to render document");
                    record_item_error(self.store.as_ref(), item.id, e.to_string()).await;
                    report.failed += 1;
                }
            }
        }

        debug!(processed = report.processed, failed = report.failed, "Render pass finished");
        Ok(report)
    }
}
