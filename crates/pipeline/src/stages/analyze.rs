use std::sync::OnceLock;

use async_trait::async_trait;
use chrono::Local;
use docflow_core::config::LlmConfig;
use docflow_core::{Item, ItemMeta, Stage};
use docflow_llm::{create_provider, Message, SharedLlmProvider};
use docflow_store::SharedItemStore;
use tracing::{debug, error, info};

use crate::analysis;
use crate::scheduler::{StageError, StageProcessor, StageReport};

use super::record_item_error;

/// Tunables for one analysis call.
#[derive(Debug, Clone)]
pub struct AnalysisSettings {
    pub enabled: bool,
    pub temperature: f32,
    pub max_tokens: u32,
    pub max_input_chars: usize,
    pub custom_context: Option<String>,
}

impl From<&LlmConfig> for AnalysisSettings {
    fn from(config: &LlmConfig) -> Self {
        Self {
            enabled: config.enabled,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            max_input_chars: config.max_input_chars,
            custom_context: config.custom_context.clone(),
        }
    }
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            temperature: 0.7,
            max_tokens: 1024,
            max_input_chars: 4000,
            custom_context: None,
        }
    }
}

/// Sends extracted text to the analysis backend and merges the structured
/// result into item metadata.
///
/// The backend is created on first use. A configuration problem therefore
/// fails this job's run only, and is retried on the next interval.
pub struct AnalyzeStage {
    store: SharedItemStore,
    settings: AnalysisSettings,
    backend_config: Option<LlmConfig>,
    backend: OnceLock<SharedLlmProvider>,
    batch_size: usize,
}

impl AnalyzeStage {
    /// Stage with an already constructed backend.
    pub fn new(
        store: SharedItemStore,
        backend: SharedLlmProvider,
        settings: AnalysisSettings,
        batch_size: usize,
    ) -> Self {
        Self {
            store,
            settings,
            backend_config: None,
            backend: OnceLock::from(backend),
            batch_size,
        }
    }

    /// Stage whose backend is built from `config` when first needed.
    pub fn from_config(store: SharedItemStore, config: &LlmConfig, batch_size: usize) -> Self {
        Self {
            store,
            settings: AnalysisSettings::from(config),
            backend_config: Some(config.clone()),
            backend: OnceLock::new(),
            batch_size,
        }
    }

    fn backend(&self) -> Result<SharedLlmProvider, StageError> {
        if let Some(backend) = self.backend.get() {
            return Ok(backend.clone());
        }
        let config = self
            .backend_config
            .as_ref()
            .ok_or_else(|| StageError::Failed("no analysis backend available".into()))?;
        let backend = create_provider(config)?;
        info!(provider = backend.name(), "Analysis backend ready");
        Ok(self.backend.get_or_init(|| backend).clone())
    }

    async fn analyze_text(
        &self,
        backend: &SharedLlmProvider,
        item: &Item,
        text: &str,
    ) -> Result<ItemMeta, StageError> {
        let input = analysis::truncate_chars(text, self.settings.max_input_chars);
        let messages = vec![
            Message::system(analysis::system_prompt(self.settings.custom_context.as_deref())),
            Message::user(input.into_owned()),
        ];

        let raw = backend
            .complete(messages, self.settings.temperature, self.settings.max_tokens)
            .await?;
        debug!(item_id = item.id, chars = raw.len(), "Backend responded");

        let mut patch = analysis::parse_response(&raw)?.into_meta();
        if patch.date.is_none() && item.meta.date.is_none() {
            patch.date = Some(Local::now().date_naive().format("%Y-%m-%d").to_string());
        }
        Ok(patch)
    }
}

#[async_trait]
impl StageProcessor for AnalyzeStage {
    async fn run(&self) -> Result<StageReport, StageError> {
        if !self.settings.enabled {
            debug!("LLM analysis is disabled");
            return Ok(StageReport::default());
        }

        let items = self.store.query_eligible(Stage::Analyze, self.batch_size).await?;
        let mut report = StageReport::default();

        for item in items {
            let text = item
                .content
                .as_ref()
                .map(analysis::document_text)
                .unwrap_or_default();

            if text.trim().is_empty() {
                info!(item_id = item.id, "No text to analyze, marking analyzed");
                let patch = ItemMeta {
                    analyzed: Some(true),
                    ..ItemMeta::default()
                };
                match self.store.merge_metadata(item.id, patch).await {
                    Ok(()) => report.skipped += 1,
                    Err(e) => {
                        error!(item_id = item.id, error = %e, "Failed to mark item analyzed");
                        report.failed += 1;
                    }
                }
                continue;
            }

            let backend = self.backend()?;
            let outcome = match self.analyze_text(&backend, &item, &text).await {
                Ok(patch) => self
                    .store
                    .merge_metadata(item.id, patch)
                    .await
                    .map_err(StageError::from),
                Err(e) => Err(e),
            };

            match outcome {
                Ok(()) => {
                    info!(item_id = item.id, "Analyzed document");
                    report.processed += 1;
                }
                Err(e) => {
                    error!(item_id = item.id, error = %e, "Failed to analyze document");
                    record_item_error(self.store.as_ref(), item.id, e.to_string()).await;
                    report.failed += 1;
                }
            }
        }

        debug!(processed = report.processed, failed = report.failed, "Analyze pass finished");
        Ok(report)
    }
}
