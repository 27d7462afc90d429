//! Language-model capability and the OpenAI-compatible chat-completions client.

use crate::config::LlmConfig;
use crate::error::{EngineError, Result};
use async_trait::async_trait;
use tracing::debug;

/// Text-in/text-out language-model capability.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String>;
}

/// Client for an OpenAI-compatible chat-completions endpoint.
#[derive(Clone)]
pub struct LlmClient {
    api_key: String,
    base_url: String,
    model: String,
    http: reqwest::Client,
}

impl LlmClient {
    pub fn new(api_key: String, model: String, base_url: String) -> Self {
        Self {
            api_key,
            base_url,
            model,
            http: reqwest::Client::new(),
        }
    }

    pub fn from_config(config: &LlmConfig) -> Self {
        Self::new(
            config.api_key.clone(),
            config.model.clone(),
            config.base_url.clone(),
        )
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl LanguageModel for LlmClient {
    async fn generate(&self, prompt: &str) -> Result<String> {
        if self.api_key.is_empty() {
            return Err(EngineError::Llm("No API key configured".to_string()));
        }

        debug!("Calling {} with a {}-character prompt", self.model, prompt.len());

        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                {"role": "user", "content": prompt}
            ],
            "temperature": 0.1
        });

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url.trim_end_matches('/')))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| EngineError::Llm(format!("LLM API call failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(EngineError::Llm(format!("LLM API returned {}: {}", status, text)));
        }

        let response_json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| EngineError::Llm(format!("Failed to parse LLM response: {}", e)))?;

        let content = response_json["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| EngineError::Llm("No content in LLM response".to_string()))?;

        Ok(content.to_string())
    }
}

/// Pull the JSON object out of a model reply that may wrap it in prose or a
/// code fence.
pub fn extract_json(response: &str) -> &str {
    match (response.find('{'), response.rfind('}')) {
        (Some(start), Some(end)) if start < end => &response[start..=end],
        _ => response.trim(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_json_from_fenced_reply() {
        let response = r#"Here's the config:
```json
{"chart_type": "bar", "x_axis": "source"}
```"#;
        assert_eq!(extract_json(response), r#"{"chart_type": "bar", "x_axis": "source"}"#);
    }

    #[test]
    fn test_extract_json_without_object() {
        assert_eq!(extract_json("  no json here "), "no json here");
    }

    #[tokio::test]
    async fn test_missing_api_key_fails_without_network() {
        let client = LlmClient::new(String::new(), "gpt-4o-mini".to_string(), "http://localhost:1".to_string());
        let err = client.generate("SELECT?").await.unwrap_err();
        assert!(matches!(err, EngineError::Llm(_)));
    }
}
