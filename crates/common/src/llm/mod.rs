//! Language-model gateway
//!
//! Provides:
//! - The [`LanguageModel`] completion contract used by the Reason stage
//! - An OpenAI-compatible chat completions client
//! - An offline extractive model that answers from the prompt's own sources

use crate::config::LlmConfig;
use crate::errors::{AppError, Result};
use crate::metrics;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

/// Trait for text completion
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Generate a completion for `prompt`
    async fn generate(&self, prompt: &str, temperature: f32, max_tokens: usize) -> Result<String>;

    /// Get the model name
    fn model_name(&self) -> &str;
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: usize,
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Deserialize)]
struct ChatMessageResponse {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

/// OpenAI chat completions client
pub struct OpenAIChatModel {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl OpenAIChatModel {
    /// Create a new chat model client
    pub fn new(api_key: String, config: &LlmConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()?;

        let base = config
            .api_base
            .clone()
            .unwrap_or_else(|| "https://api.openai.com/v1".to_string());

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", base.trim_end_matches('/')),
            api_key,
            model: config.model.clone(),
        })
    }

    async fn call(&self, prompt: &str, temperature: f32, max_tokens: usize) -> Result<String> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            max_tokens,
            temperature,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::LanguageModel {
                message: format!("LLM API request failed: {}", e),
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::LanguageModel {
                message: format!("LLM API error {}: {}", status, body),
            });
        }

        let chat_response: ChatResponse = response.json().await.map_err(|e| AppError::LanguageModel {
            message: format!("Failed to parse LLM response: {}", e),
        })?;

        chat_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| AppError::LanguageModel {
                message: "Empty response from LLM".to_string(),
            })
    }
}

#[async_trait]
impl LanguageModel for OpenAIChatModel {
    async fn generate(&self, prompt: &str, temperature: f32, max_tokens: usize) -> Result<String> {
        let start = Instant::now();
        let result = self.call(prompt, temperature, max_tokens).await;
        metrics::record_generation(start.elapsed().as_secs_f64(), &self.model, result.is_ok());
        result
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Offline model that quotes the first sentence of the leading source.
///
/// It follows the same prompt contract as a hosted model: it cites the
/// source it used and admits ignorance when the prompt carries no sources.
#[derive(Debug, Default)]
pub struct ExtractiveModel;

impl ExtractiveModel {
    fn first_source(prompt: &str) -> Option<&str> {
        let start = prompt.find("[Source 1]")? + "[Source 1]".len();
        let rest = &prompt[start..];
        let end = rest.find("\n\n").unwrap_or(rest.len());
        let body = rest[..end].trim();
        (!body.is_empty()).then_some(body)
    }

    fn first_sentence(text: &str) -> &str {
        let end = text
            .char_indices()
            .find(|(_, c)| matches!(c, '.' | '!' | '?'))
            .map(|(i, c)| i + c.len_utf8())
            .unwrap_or(text.len());
        text[..end].trim()
    }
}

#[async_trait]
impl LanguageModel for ExtractiveModel {
    async fn generate(&self, prompt: &str, _temperature: f32, _max_tokens: usize) -> Result<String> {
        match Self::first_source(prompt) {
            Some(source) => Ok(format!(
                "According to the documents, {} [Source 1]",
                Self::first_sentence(source)
            )),
            None => Ok(crate::pipeline::ADMISSION_TEXT.to_string()),
        }
    }

    fn model_name(&self) -> &str {
        "extractive"
    }
}

/// Create a language model based on configuration
pub fn create_language_model(config: &LlmConfig) -> Result<Arc<dyn LanguageModel>> {
    match config.provider.as_str() {
        "openai" => match config.api_key.clone().filter(|k| !k.is_empty()) {
            Some(key) => Ok(Arc::new(OpenAIChatModel::new(key, config)?)),
            None => {
                tracing::warn!("No LLM API key configured, using offline extractive model");
                Ok(Arc::new(ExtractiveModel))
            }
        },
        "extractive" | "mock" => Ok(Arc::new(ExtractiveModel)),
        other => Err(AppError::Configuration {
            message: format!("Unknown LLM provider: {}", other),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_extractive_model_cites_first_source() {
        let prompt = "Context from documents:\n[Source 1] Revenue grew 12% in Q3. Costs fell.\n\n[Source 2] Other.\n\nAnswer:";
        let answer = ExtractiveModel.generate(prompt, 0.3, 500).await.unwrap();
        assert_eq!(answer, "According to the documents, Revenue grew 12% in Q3. [Source 1]");
    }

    #[tokio::test]
    async fn test_extractive_model_admits_without_sources() {
        let answer = ExtractiveModel.generate("Question: what?\n\nAnswer:", 0.3, 500).await.unwrap();
        assert!(answer.contains("do not contain"));
    }

    #[test]
    fn test_factory_falls_back_without_key() {
        let model = create_language_model(&LlmConfig::default()).unwrap();
        assert_eq!(model.model_name(), "extractive");
    }

    #[test]
    fn test_endpoint_from_base() {
        let config = LlmConfig {
            api_base: Some("http://localhost:11434/v1/".into()),
            ..LlmConfig::default()
        };
        let model = OpenAIChatModel::new("key".into(), &config).unwrap();
        assert_eq!(model.endpoint, "http://localhost:11434/v1/chat/completions");
    }
}
