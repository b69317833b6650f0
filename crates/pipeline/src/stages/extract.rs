use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use docflow_core::{Item, ItemMeta, Stage};
use docflow_store::SharedItemStore;
use tracing::{debug, error, info, warn};

use crate::scheduler::{StageError, StageProcessor, StageReport};
use crate::tools::{page_artifact, TextRecognizer};

use super::{preview_dir, record_item_error};

/// Recognizes text from rendered page previews.
///
/// Content is keyed by page number. Pages already present in the item's
/// content are not recognized again, and partial content is written back
/// when a page fails so the next run resumes after the last good page.
pub struct ExtractStage {
    store: SharedItemStore,
    recognizer: Arc<dyn TextRecognizer>,
    previews_root: PathBuf,
    batch_size: usize,
}

enum ExtractOutcome {
    Complete { pages: usize },
    Partial { done: usize, failed_page: u32 },
    NoPreviews,
}

impl ExtractStage {
    pub fn new(
        store: SharedItemStore,
        recognizer: Arc<dyn TextRecognizer>,
        previews_root: impl Into<PathBuf>,
        batch_size: usize,
    ) -> Self {
        Self {
            store,
            recognizer,
            previews_root: previews_root.into(),
            batch_size,
        }
    }

    async fn extract_item(&self, item: &Item) -> Result<ExtractOutcome, StageError> {
        let dir = preview_dir(&self.previews_root, item.id);
        let mut content = item.content.clone().unwrap_or_default();
        let known_before = content.len();
        let mut failed_page = None;

        let mut page = 1u32;
        loop {
            if item.meta.page_count.is_some_and(|count| page > count) {
                break;
            }
            if content.contains_key(&page) {
                page += 1;
                continue;
            }

            let image = page_artifact(&dir, page);
            if !tokio::fs::try_exists(&image).await.unwrap_or(false) {
                if item.meta.page_count.is_some() {
                    warn!(item_id = item.id, page, "Preview missing for page");
                    failed_page = Some(page);
                }
                break;
            }

            match self.recognizer.recognize(&image).await {
                Ok(text) => {
                    debug!(item_id = item.id, page, chars = text.len(), "Recognized page");
                    content.insert(page, text);
                }
                Err(e) => {
                    warn!(item_id = item.id, page, error = %e, "Text recognition failed");
                    failed_page = Some(page);
                    break;
                }
            }
            page += 1;
        }

        if let Some(failed_page) = failed_page {
            if content.len() > known_before {
                self.store.set_content(item.id, content.clone()).await?;
            }
            return Ok(ExtractOutcome::Partial {
                done: content.len(),
                failed_page,
            });
        }
        if content.is_empty() {
            return Ok(ExtractOutcome::NoPreviews);
        }

        let pages = content.len();
        self.store.set_content(item.id, content).await?;
        let patch = ItemMeta {
            extracted: Some(true),
            ..ItemMeta::default()
        };
        self.store.merge_metadata(item.id, patch).await?;
        Ok(ExtractOutcome::Complete { pages })
    }
}

#[async_trait]
impl StageProcessor for ExtractStage {
    async fn run(&self) -> Result<StageReport, StageError> {
        let items = self.store.query_eligible(Stage::Extract, self.batch_size).await?;
        let mut report = StageReport::default();

        for item in items {
            match self.extract_item(&item).await {
                Ok(ExtractOutcome::Complete { pages }) => {
                    info!(item_id = item.id, pages, "Extracted text");
                    report.processed += 1;
                }
                Ok(ExtractOutcome::Partial { done, failed_page }) => {
                    record_item_error(
                        self.store.as_ref(),
                        item.id,
                        format!("text extraction stopped at page {failed_page}"),
                    )
                    .await;
                    warn!(item_id = item.id, done, failed_page, "Extraction incomplete, will resume");
                    report.failed += 1;
                }
                Ok(ExtractOutcome::NoPreviews) => {
                    warn!(item_id = item.id, "No page previews found");
                    record_item_error(
                        self.store.as_ref(),
                        item.id,
                        "no page previews found".to_string(),
                    )
                    .await;
                    report.failed += 1;
                }
                Err(e) => {
                    error!(item_id = item.id, error = %e, "Failed to extract text");
                    record_item_error(self.store.as_ref(), item.id, e.to_string()).await;
                    report.failed += 1;
                }
            }
        }

        debug!(processed = report.processed, failed = report.failed, "Extract pass finished");
        Ok(report)
    }
}
