use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::config::{LlmProvider, LlmSettings};

/// Anything that can answer an OpenAI-style chat completion request.
#[async_trait]
pub trait LlmClient {
    async fn chat_completion(&self, request: ChatCompletionRequest)
    -> Result<ChatCompletionResponse>;
}

pub type DynLlmClient = dyn LlmClient + Send + Sync;

#[derive(Debug, Clone)]
pub struct AIClient {
    http: Client,
    base_url: String,
    api_key: String,
    user_agent: String,
    provider: LlmProvider,
}

impl AIClient {
    pub fn new(settings: &LlmSettings) -> Result<Self> {
        let base_url = settings.base_url.trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(anyhow!("Base URL cannot be empty"));
        }

        let timeout = Duration::from_secs(settings.timeout_secs);
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http,
            base_url,
            api_key: settings.api_key.clone(),
            user_agent: settings.user_agent.clone(),
            provider: settings.provider,
        })
    }
}

#[async_trait]
impl LlmClient for AIClient {
    async fn chat_completion(
        &self,
        request: ChatCompletionRequest,
    ) -> Result<ChatCompletionResponse> {
        let url = format!("{}/chat/completions", self.base_url);
        debug!(
            provider = %self.provider,
            model = %request.model,
            messages = request.messages.len(),
            structured = request.response_format.is_some(),
            "sending chat completion request"
        );

        let mut req_builder = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .header("User-Agent", &self.user_agent)
            .header("Content-Type", "application/json")
            .json(&request);

        if matches!(self.provider, LlmProvider::OpenRouter) {
            req_builder = req_builder
                .header("HTTP-Referer", "https://github.com/agent-adapter/agent-adapter")
                .header("X-Title", "agent-adapter");
        }

        let response = req_builder
            .send()
            .await
            .context("Failed to send request to chat completions endpoint")?;

        let status = response.status();
        debug!(%status, "chat completion response received");

        match status {
            reqwest::StatusCode::OK => response
                .json::<ChatCompletionResponse>()
                .await
                .context("Failed to parse chat completion response JSON"),
            reqwest::StatusCode::TOO_MANY_REQUESTS => {
                let error_text = response.text().await.unwrap_or_default();
                Err(anyhow!(
                    "Too many requests. Please wait before trying again. (API response: {})",
                    error_text
                ))
            }
            reqwest::StatusCode::UNAUTHORIZED => Err(anyhow!(
                "Invalid API key. Please check your {} configuration.",
                self.provider.api_key_env_var()
            )),
            reqwest::StatusCode::BAD_REQUEST => {
                let error_text = response.text().await.unwrap_or_default();
                Err(anyhow!("Invalid request: {}", error_text))
            }
            reqwest::StatusCode::INTERNAL_SERVER_ERROR
            | reqwest::StatusCode::SERVICE_UNAVAILABLE => Err(anyhow!(
                "{} is temporarily unavailable. Please try again later.",
                self.provider.display_name()
            )),
            status => {
                let error_text = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "Unknown error".to_string());
                Err(anyhow!("API error (status {}): {}", status, error_text))
            }
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_format: Option<ResponseFormat>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatMessageRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatMessageRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatMessageRole::User,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatMessageRole {
    System,
    User,
    Assistant,
}

/// `response_format` payload. Only the strict JSON-schema form is produced here.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponseFormat {
    JsonObject,
    JsonSchema { json_schema: JsonSchemaFormat },
}

#[derive(Debug, Clone, Serialize)]
pub struct JsonSchemaFormat {
    pub name: String,
    pub schema: Value,
    pub strict: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionResponse {
    #[serde(default)]
    pub model: Option<String>,
    pub choices: Vec<ChatChoice>,
    #[serde(default)]
    pub usage: Option<Usage>,
}

impl ChatCompletionResponse {
    /// Trimmed content of the first choice; errors when absent or blank.
    pub fn first_content(&self) -> Result<&str> {
        let choice = self
            .choices
            .first()
            .ok_or_else(|| anyhow!("Model returned no choices"))?;
        let content = choice.message.content.as_deref().unwrap_or("").trim();
        if content.is_empty() {
            return Err(anyhow!("Model response was empty"));
        }
        Ok(content)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatChoice {
    pub message: ChatCompletionMessage,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionMessage {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub reasoning: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct Usage {
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
    pub total_tokens: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    use crate::config::Config;

    fn settings_for(server: &MockServer, provider: LlmProvider) -> LlmSettings {
        let mut config = Config::builder()
            .with_provider(provider)
            .build()
            .unwrap();
        config.llm.api_key = "test-key".to_string();
        config.llm.base_url = server.url("/v1");
        config.llm
    }

    fn hello_request() -> ChatCompletionRequest {
        ChatCompletionRequest {
            model: "qwen/qwen3-32b".into(),
            messages: vec![ChatMessage::user("Hello")],
            max_tokens: Some(128),
            temperature: Some(0.2),
            response_format: None,
        }
    }

    #[tokio::test]
    async fn chat_completion_successfully_parses_response() {
        let server = MockServer::start_async().await;

        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/v1/chat/completions")
                    .header("Authorization", "Bearer test-key")
                    .json_body(json!({
                        "model": "qwen/qwen3-32b",
                        "messages": [
                            {"role": "user", "content": "Hello"}
                        ],
                        "max_tokens": 128,
                        "temperature": 0.2
                    }));

                then.status(200)
                    .header("Content-Type", "application/json")
                    .json_body(json!({
                        "model": "qwen/qwen3-32b",
                        "choices": [
                            {
                                "index": 0,
                                "finish_reason": "stop",
                                "message": {
                                    "role": "assistant",
                                    "content": "  Hi there!  ",
                                    "reasoning": null
                                }
                            }
                        ],
                        "usage": {
                            "prompt_tokens": 12,
                            "completion_tokens": 10,
                            "total_tokens": 22
                        }
                    }));
            })
            .await;

        let client = AIClient::new(&settings_for(&server, LlmProvider::Groq)).unwrap();
        let response = client.chat_completion(hello_request()).await.unwrap();

        assert_eq!(response.choices.len(), 1);
        assert_eq!(response.choices[0].finish_reason.as_deref(), Some("stop"));
        assert_eq!(response.first_content().unwrap(), "Hi there!");
        assert_eq!(response.usage.and_then(|u| u.total_tokens), Some(22));

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn chat_completion_serializes_json_schema_format() {
        let server = MockServer::start_async().await;

        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/v1/chat/completions")
                    .json_body_partial(
                        r#"{
                            "response_format": {
                                "type": "json_schema",
                                "json_schema": {
                                    "name": "OutputModel",
                                    "schema": {"type": "object"},
                                    "strict": true
                                }
                            }
                        }"#,
                    );
                then.status(200).json_body(json!({
                    "choices": [
                        {"finish_reason": "stop", "message": {"role": "assistant", "content": "{}"}}
                    ]
                }));
            })
            .await;

        let client = AIClient::new(&settings_for(&server, LlmProvider::Groq)).unwrap();
        let mut request = hello_request();
        request.response_format = Some(ResponseFormat::JsonSchema {
            json_schema: JsonSchemaFormat {
                name: "OutputModel".into(),
                schema: json!({"type": "object"}),
                strict: true,
            },
        });

        client.chat_completion(request).await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn chat_completion_sends_openrouter_headers() {
        let server = MockServer::start_async().await;

        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/v1/chat/completions")
                    .header("X-Title", "agent-adapter")
                    .header_exists("HTTP-Referer");
                then.status(200).json_body(json!({
                    "choices": [
                        {"finish_reason": "stop", "message": {"role": "assistant", "content": "ok"}}
                    ]
                }));
            })
            .await;

        let client = AIClient::new(&settings_for(&server, LlmProvider::OpenRouter)).unwrap();
        client.chat_completion(hello_request()).await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn chat_completion_maps_unauthorized() {
        let server = MockServer::start_async().await;

        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/chat/completions");
                then.status(401)
                    .header("Content-Type", "application/json")
                    .body(r#"{"error":"invalid_api_key"}"#);
            })
            .await;

        let client = AIClient::new(&settings_for(&server, LlmProvider::Groq)).unwrap();
        let err = client.chat_completion(hello_request()).await.unwrap_err();

        assert!(err.to_string().contains("Invalid API key"));
        assert!(err.to_string().contains("GROQ_API_KEY"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn chat_completion_reports_unexpected_status() {
        let server = MockServer::start_async().await;

        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/chat/completions");
                then.status(404).body("no such model");
            })
            .await;

        let client = AIClient::new(&settings_for(&server, LlmProvider::Groq)).unwrap();
        let err = client.chat_completion(hello_request()).await.unwrap_err();

        assert!(err.to_string().contains("API error (status 404 Not Found)"));
        assert!(err.to_string().contains("no such model"));
        mock.assert_async().await;
    }

    #[test]
    fn first_content_rejects_blank_reply() {
        let response: ChatCompletionResponse = serde_json::from_value(json!({
            "choices": [
                {"finish_reason": "stop", "message": {"role": "assistant", "content": "   "}}
            ]
        }))
        .unwrap();

        assert!(response.first_content().is_err());
    }

    #[test]
    fn new_rejects_empty_base_url() {
        let mut settings = LlmSettings::default();
        settings.base_url = "/".to_string();
        assert!(AIClient::new(&settings).is_err());
    }
}
