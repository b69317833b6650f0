use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use docflow_llm::LlmError;
use docflow_store::StoreError;

use crate::analysis::AnalysisError;
use crate::tools::ToolError;

/// Error type for a single job execution.
#[derive(Debug, thiserror::Error)]
pub enum StageError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),
    #[error("Backend error: {0}")]
    Backend(#[from] LlmError),
    #[error("Analysis error: {0}")]
    Analysis(#[from] AnalysisError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Stage failed: {0}")]
    Failed(String),
}

/// Outcome of one batch run of a stage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StageReport {
    /// Items that completed the stage in this run.
    pub processed: usize,
    /// Items whose processing failed and will be retried on a later run.
    pub failed: usize,
    /// Items looked at but left untouched (already known, nothing to do).
    pub skipped: usize,
}

impl StageReport {
    pub fn total(&self) -> usize {
        self.processed + self.failed + self.skipped
    }
}

/// A unit of recurring work the scheduler can execute.
///
/// Implementations pull their own work from the item store. A returned error
/// is logged by the scheduler and never stops other jobs.
#[async_trait]
pub trait StageProcessor: Send + Sync {
    async fn run(&self) -> Result<StageReport, StageError>;
}

/// Adapter turning an async closure into a [`StageProcessor`].
pub struct FnProcessor<F>(F);

#[async_trait]
impl<F, Fut> StageProcessor for FnProcessor<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<StageReport, StageError>> + Send + 'static,
{
    async fn run(&self) -> Result<StageReport, StageError> {
        (self.0)().await
    }
}

/// A named job registered with the scheduler.
#[derive(Clone)]
pub struct RecurringJob {
    pub name: String,
    pub interval: Duration,
    /// Jobs that must have completed at least once, and be idle, before this
    /// one may start.
    pub dependencies: Vec<String>,
    pub processor: Arc<dyn StageProcessor>,
}

impl RecurringJob {
    pub fn new(
        name: impl Into<String>,
        interval: Duration,
        processor: Arc<dyn StageProcessor>,
    ) -> Self {
        Self {
            name: name.into(),
            interval,
            dependencies: Vec::new(),
            processor,
        }
    }

    pub fn from_fn<F, Fut>(name: impl Into<String>, interval: Duration, f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<StageReport, StageError>> + Send + 'static,
    {
        Self::new(name, interval, Arc::new(FnProcessor(f)))
    }

    pub fn depends_on(mut self, upstream: impl Into<String>) -> Self {
        self.dependencies.push(upstream.into());
        self
    }
}

impl std::fmt::Debug for RecurringJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecurringJob")
            .field("name", &self.name)
            .field("interval", &self.interval)
            .field("dependencies", &self.dependencies)
            .finish_non_exhaustive()
    }
}
