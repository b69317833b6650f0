pub mod local;
pub mod ollama;
pub mod openai;

use std::sync::Arc;

use docflow_core::config::LlmConfig;

use crate::provider::{LlmError, SharedLlmProvider};

const OPENAI_BASE_URL: &str = "https://api.openai.com";
const DEEPSEEK_BASE_URL: &str = "https://api.deepseek.com";

/// Create the appropriate LLM provider based on config.
pub fn create_provider(config: &LlmConfig) -> Result<SharedLlmProvider, LlmError> {
    match config.provider.as_str() {
        "local" => {
            let model = config
                .model_path
                .as_ref()
                .ok_or_else(|| LlmError::NotConfigured("LLM_MODEL_PATH not set".into()))?;
            if !model.is_file() {
                return Err(LlmError::NotConfigured(format!(
                    "configured model not found at {}",
                    model.display()
                )));
            }
            Ok(Arc::new(local::LocalProvider::new(
                config.llama_binary.clone(),
                model.clone(),
            )))
        }
        "openai" => {
            let api_key = config
                .openai_api_key
                .as_ref()
                .ok_or_else(|| LlmError::NotConfigured("OPENAI_API_KEY not set".into()))?;
            let base_url = config.openai_base_url.as_deref().unwrap_or(OPENAI_BASE_URL);
            Ok(Arc::new(openai::OpenAiProvider::new(
                "openai",
                api_key.clone(),
                config.openai_model.clone(),
                base_url.to_string(),
            )))
        }
        "deepseek" => {
            let api_key = config
                .deepseek_api_key
                .as_ref()
                .ok_or_else(|| LlmError::NotConfigured("DEEPSEEK_API_KEY not set".into()))?;
            Ok(Arc::new(openai::OpenAiProvider::new(
                "deepseek",
                api_key.clone(),
                config.deepseek_model.clone(),
                DEEPSEEK_BASE_URL.to_string(),
            )))
        }
        "ollama" => Ok(Arc::new(ollama::OllamaProvider::new(
            config.ollama_url.clone(),
            config.ollama_model.clone(),
        ))),
        other => Err(LlmError::NotConfigured(format!(
            "unknown LLM provider: '{}'",
            other
        ))),
    }
}
