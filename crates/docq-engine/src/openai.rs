//! HTTP client for OpenAI-compatible chat completion APIs (Groq, llama-server).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{EngineConfig, DEFAULT_BASE_URL, DEFAULT_MODEL};
use crate::generator::{GeneratorError, QueryGenerator};

/// System message sent ahead of every prompt.
const SYSTEM_PROMPT: &str =
    "You translate questions about a document database into MongoDB query JSON.";

/// Client for an OpenAI-compatible `/chat/completions` endpoint.
pub struct ChatClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

/// OpenAI-compatible chat completion request.
#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
    stream: bool,
}

/// Chat message in OpenAI format.
#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

/// OpenAI-compatible chat completion response.
#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

impl ChatClient {
    /// Create a client for the default endpoint and model.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            temperature: 0.1,
            max_tokens: 1000,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }

    /// Set the base URL.
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Set the model to use.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Send a completion request to the server.
    pub async fn complete(&self, system: &str, user_message: &str) -> Result<String, GeneratorError> {
        let request = ChatCompletionRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user_message,
                },
            ],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            stream: false,
        };

        let url = format!("{}/chat/completions", self.base_url);
        debug!("POST {} (model {})", url, self.model);

        let mut builder = self.client.post(&url).json(&request);
        if !self.api_key.is_empty() {
            builder = builder.bearer_auth(&self.api_key);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_connect() || e.is_timeout() {
                GeneratorError::ModelUnavailable(self.base_url.clone())
            } else {
                GeneratorError::Http(e)
            }
        })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(GeneratorError::Api { status, message });
        }

        let completion: ChatCompletionResponse = response.json().await?;

        completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or(GeneratorError::EmptyResponse)
    }
}

#[async_trait]
impl QueryGenerator for ChatClient {
    async fn generate(&self, prompt: &str) -> Result<String, GeneratorError> {
        self.complete(SYSTEM_PROMPT, prompt).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_client() {
        let client = ChatClient::new("key");
        assert_eq!(client.base_url(), DEFAULT_BASE_URL);
        assert_eq!(client.model(), DEFAULT_MODEL);
    }

    #[test]
    fn test_builder_pattern() {
        let client = ChatClient::new("")
            .with_url("http://127.0.0.1:11435/v1/")
            .with_model("qwen2.5-coder:7b");
        assert_eq!(client.base_url(), "http://127.0.0.1:11435/v1");
        assert_eq!(client.model(), "qwen2.5-coder:7b");
    }

    #[test]
    fn test_request_shape() {
        let request = ChatCompletionRequest {
            model: "m",
            messages: vec![ChatMessage {
                role: "user",
                content: "hi",
            }],
            temperature: 0.1,
            max_tokens: 10,
            stream: false,
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["messages"][0]["role"], "user");
        assert_eq!(value["stream"], false);
    }

    #[test]
    fn test_response_shape() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"{\"query_type\":\"count\"}"},"finish_reason":"stop"}],"usage":{"total_tokens":5}}"#;
        let parsed: ChatCompletionResponse = serde_json::from_str(body).unwrap();
        assert_eq!(
            parsed.choices[0].message.content.as_deref(),
            Some("{\"query_type\":\"count\"}")
        );
    }

    #[tokio::test]
    async fn test_unreachable_server() {
        let client = ChatClient::new("key").with_url("http://127.0.0.1:9");
        let err = client.generate("prompt").await.unwrap_err();
        assert!(err.is_transient());
    }
}
