use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use crate::provider::{to_api_messages, LlmError, LlmProvider, Message};

/// Any OpenAI-compatible chat-completions endpoint (OpenAI, DeepSeek).
pub struct OpenAiProvider {
    client: reqwest::Client,
    name: &'static str,
    api_key: String,
    model: String,
    base_url: String,
}

impl OpenAiProvider {
    pub fn new(name: &'static str, api_key: String, model: String, base_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            name,
            api_key,
            model,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &str {
        self.name
    }

    async fn complete(
        &self,
        messages: Vec<Message>,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<String, LlmError> {
        let url = format!("{}/v1/chat/completions", self.base_url);

        let body = json!({
            "model": self.model,
            "messages": to_api_messages(&messages),
            "temperature": temperature,
            "max_tokens": max_tokens,
        });

        debug!(provider = self.name, "chat completion request to {}", url);

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status().as_u16();
        if status != 200 {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::ApiError { status, body });
        }

        let resp: serde_json::Value = response.json().await?;
        let content = resp["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| LlmError::ParseError("missing choices[0].message.content".into()))?
            .to_string();

        Ok(content)
    }
}
