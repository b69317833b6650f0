//! Process bootstrap: wires the four stages into a scheduler.

use std::sync::Arc;

use docflow_core::{Config, ItemId};
use docflow_store::{ItemStore, SharedItemStore, StoreError};
use tracing::info;

use crate::scheduler::{RecurringJob, Scheduler, SchedulerError, SchedulerMetrics};
use crate::stages::{
    AnalyzeStage, DirectorySource, DiscoverStage, DocumentSource, ExtractStage, RenderStage,
};
use crate::tools::{
    MagickRasterizer, PageCounter, PdfPageCounter, Rasterizer, TesseractRecognizer, TextRecognizer,
};

pub const DISCOVER_JOB: &str = "discover-documents";
pub const RENDER_JOB: &str = "render-previews";
pub const EXTRACT_JOB: &str = "extract-text";
pub const ANALYZE_JOB: &str = "analyze-documents";

/// External collaborators the stages delegate to.
pub struct PipelineTools {
    pub source: Arc<dyn DocumentSource>,
    pub page_counter: Arc<dyn PageCounter>,
    pub rasterizer: Arc<dyn Rasterizer>,
    pub recognizer: Arc<dyn TextRecognizer>,
    /// Ready analysis stage. `None` builds one from the LLM configuration.
    pub analyzer: Option<AnalyzeStage>,
}

impl PipelineTools {
    /// Directory walker, ImageMagick, Tesseract and the configured LLM backend.
    /// PDF page counts are read in-process before falling back to ImageMagick.
    pub fn from_config(config: &Config) -> Self {
        let magick = Arc::new(MagickRasterizer::new(&config.render));
        Self {
            source: Arc::new(DirectorySource::new(config.sources.clone())),
            page_counter: Arc::new(PdfPageCounter::new(magick.clone())),
            rasterizer: magick,
            recognizer: Arc::new(TesseractRecognizer::new(&config.ocr)),
            analyzer: None,
        }
    }
}

/// The document pipeline: one scheduler running discover, render, extract
/// and analyze jobs over a shared item store.
pub struct Pipeline {
    scheduler: Scheduler,
    store: SharedItemStore,
}

impl Pipeline {
    pub fn new(
        config: &Config,
        store: SharedItemStore,
        tools: PipelineTools,
    ) -> Result<Self, SchedulerError> {
        let sched = &config.scheduler;
        let previews = config.storage.previews_dir();

        let discover = DiscoverStage::new(Arc::clone(&store), tools.source);
        let render = RenderStage::new(
            Arc::clone(&store),
            tools.page_counter,
            tools.rasterizer,
            previews.clone(),
            sched.batch_size,
        );
        let extract = ExtractStage::new(
            Arc::clone(&store),
            tools.recognizer,
            previews,
            sched.batch_size,
        );
        let analyze = tools.analyzer.unwrap_or_else(|| {
            AnalyzeStage::from_config(Arc::clone(&store), &config.llm, sched.batch_size)
        });

        let mut scheduler = Scheduler::new(sched.tick);
        scheduler.register(RecurringJob::new(
            DISCOVER_JOB,
            sched.discover_interval,
            Arc::new(discover),
        ))?;
        scheduler.register(
            RecurringJob::new(RENDER_JOB, sched.render_interval, Arc::new(render))
                .depends_on(DISCOVER_JOB),
        )?;
        scheduler.register(
            RecurringJob::new(EXTRACT_JOB, sched.extract_interval, Arc::new(extract))
                .depends_on(RENDER_JOB),
        )?;
        scheduler.register(
            RecurringJob::new(ANALYZE_JOB, sched.analyze_interval, Arc::new(analyze))
                .depends_on(EXTRACT_JOB),
        )?;

        Ok(Self { scheduler, store })
    }

    /// Pipeline using the production tools for `config`.
    pub fn from_config(config: &Config, store: SharedItemStore) -> Result<Self, SchedulerError> {
        Self::new(config, store, PipelineTools::from_config(config))
    }

    pub fn start(&self) -> Result<(), SchedulerError> {
        self.scheduler.start()
    }

    pub fn stop(&self) {
        self.scheduler.stop();
    }

    /// Send an item back through extraction and analysis.
    pub async fn reset(&self, id: ItemId) -> Result<(), StoreError> {
        reset_item(self.store.as_ref(), id).await
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn metrics(&self) -> SchedulerMetrics {
        self.scheduler.metrics()
    }

    pub fn store(&self) -> &SharedItemStore {
        &self.store
    }
}

/// Clear an item's content and extraction/analysis markers. Previews are
/// kept, so the item re-enters the pipeline at the extract stage.
pub async fn reset_item(store: &dyn ItemStore, id: ItemId) -> Result<(), StoreError> {
    store.reset_for_reprocessing(id).await?;
    info!(item_id = id, "Item reset for reprocessing");
    Ok(())
}
