//! Chat-completion providers.
//!
//! [`ChatProvider`] turns a list of [`ChatMessage`]s into one answer string.
//! Implementations:
//! - **[`DisabledChat`]**: returns errors; used when `[chat] provider = "disabled"`.
//! - **[`OpenAIChat`]**: `POST /v1/chat/completions` on an OpenAI-compatible API.
//! - **[`OllamaChat`]**: `POST /api/chat` with `stream: false`.
//!
//! Retries follow the same policy as embeddings.

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::config::ChatConfig;
use crate::error::DocChatError;
use crate::http::post_json_with_retry;

const OPENAI_DEFAULT_URL: &str = "https://api.openai.com";
const OLLAMA_DEFAULT_URL: &str = "http://localhost:11434";

/// One message of a chat-completion request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

#[async_trait]
pub trait ChatProvider: Send + Sync {
    fn model_name(&self) -> &str;
    /// Run one completion and return the assistant's text.
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String>;
}

pub fn create_chat_provider(config: &ChatConfig) -> Result<Arc<dyn ChatProvider>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledChat)),
        "openai" => Ok(Arc::new(OpenAIChat::new(config)?)),
        "ollama" => Ok(Arc::new(OllamaChat::new(config)?)),
        other => bail!("Unknown chat provider: {}", other),
    }
}

pub struct DisabledChat;

#[async_trait]
impl ChatProvider for DisabledChat {
    fn model_name(&self) -> &str {
        "disabled"
    }
    async fn complete(&self, _messages: &[ChatMessage]) -> Result<String> {
        Err(DocChatError::ProviderDisabled("chat").into())
    }
}

/// OpenAI-compatible chat completions. Requires `OPENAI_API_KEY`.
pub struct OpenAIChat {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
    max_retries: u32,
}

impl OpenAIChat {
    pub fn new(config: &ChatConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("chat.model required for OpenAI provider"))?;
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;
        let base = config.url.as_deref().unwrap_or(OPENAI_DEFAULT_URL);

        Ok(Self {
            client: build_client(config.timeout_secs)?,
            endpoint: format!("{}/v1/chat/completions", base.trim_end_matches('/')),
            api_key,
            model,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl ChatProvider for OpenAIChat {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": messages,
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
        });

        let json = post_json_with_retry(
            &self.client,
            &self.endpoint,
            Some(&self.api_key),
            &body,
            self.max_retries,
            "OpenAI chat",
        )
        .await?;

        parse_openai_completion(&json)
    }
}

fn parse_openai_completion(json: &serde_json::Value) -> Result<String> {
    let content = json
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .ok_or_else(|| anyhow::anyhow!("Invalid OpenAI response: missing choices[0].message.content"))?;

    non_empty_answer(content)
}

/// Ollama chat. No API key.
pub struct OllamaChat {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
    max_retries: u32,
}

impl OllamaChat {
    pub fn new(config: &ChatConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("chat.model required for Ollama provider"))?;
        let base = config.url.as_deref().unwrap_or(OLLAMA_DEFAULT_URL);

        Ok(Self {
            client: build_client(config.timeout_secs)?,
            endpoint: format!("{}/api/chat", base.trim_end_matches('/')),
            model,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl ChatProvider for OllamaChat {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": messages,
            "stream": false,
            "options": {
                "temperature": self.temperature,
                "num_predict": self.max_tokens,
            },
        });

        let json = post_json_with_retry(
            &self.client,
            &self.endpoint,
            None,
            &body,
            self.max_retries,
            "Ollama chat",
        )
        .await?;

        parse_ollama_completion(&json)
    }
}

fn parse_ollama_completion(json: &serde_json::Value) -> Result<String> {
    let content = json
        .get("message")
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .ok_or_else(|| anyhow::anyhow!("Invalid Ollama response: missing message.content"))?;

    non_empty_answer(content)
}

fn non_empty_answer(content: &str) -> Result<String> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        bail!("model returned an empty answer");
    }
    Ok(trimmed.to_string())
}

fn build_client(timeout_secs: u64) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_openai_completion() {
        let json = serde_json::json!({
            "choices": [{ "message": { "role": "assistant", "content": "  The answer.\n" } }]
        });
        assert_eq!(parse_openai_completion(&json).unwrap(), "The answer.");
    }

    #[test]
    fn test_parse_openai_completion_missing_content() {
        let json = serde_json::json!({ "choices": [] });
        assert!(parse_openai_completion(&json).is_err());
    }

    #[test]
    fn test_parse_ollama_completion() {
        let json = serde_json::json!({ "message": { "role": "assistant", "content": "Hi" }, "done": true });
        assert_eq!(parse_ollama_completion(&json).unwrap(), "Hi");
    }

    #[test]
    fn test_empty_answer_is_error() {
        let json = serde_json::json!({ "message": { "content": "   " } });
        assert!(parse_ollama_completion(&json).is_err());
    }

    #[test]
    fn test_message_serializes_as_role_content() {
        let msg = ChatMessage::system("be brief");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json, serde_json::json!({ "role": "system", "content": "be brief" }));
    }
}
