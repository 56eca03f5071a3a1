//! Ollama API client for local query generation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::generator::{GeneratorError, QueryGenerator};

/// Default Ollama server URL.
pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

/// Default model for query generation.
pub const DEFAULT_OLLAMA_MODEL: &str = "llama3.1:8b";

/// Ollama API client.
pub struct OllamaClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

/// Request to Ollama generate API.
#[derive(Debug, Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    /// Ask Ollama to constrain output to JSON.
    format: &'a str,
    options: OllamaOptions,
}

/// Ollama generation options.
#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
    num_predict: u32,
}

/// Response from Ollama generate API.
#[derive(Debug, Deserialize)]
struct OllamaResponse {
    #[serde(default)]
    response: String,
    #[serde(default)]
    error: Option<String>,
}

/// Response from Ollama tags API (list models).
#[derive(Debug, Deserialize)]
struct OllamaTagsResponse {
    models: Vec<OllamaModel>,
}

#[derive(Debug, Deserialize)]
struct OllamaModel {
    name: String,
}

impl OllamaClient {
    /// Create a new Ollama client with default settings.
    pub fn new() -> Self {
        Self::with_config(DEFAULT_OLLAMA_URL, DEFAULT_OLLAMA_MODEL)
    }

    /// Create a new Ollama client with custom URL and model.
    pub fn with_config(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            model: model.into(),
            temperature: 0.1,
            max_tokens: 1000,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            ..Self::with_config(config.base_url.trim_end_matches('/'), config.model.clone())
        }
    }

    /// Check if Ollama server is running and the model is pulled.
    pub async fn check_availability(&self) -> Result<(), GeneratorError> {
        let tags_url = format!("{}/api/tags", self.base_url);
        let response = self
            .client
            .get(&tags_url)
            .send()
            .await
            .map_err(|_| GeneratorError::ModelUnavailable(self.base_url.clone()))?;

        if !response.status().is_success() {
            return Err(GeneratorError::ModelUnavailable(self.base_url.clone()));
        }

        let tags: OllamaTagsResponse = response.json().await?;
        let model_base = self.model.split(':').next().unwrap_or(&self.model);

        let model_found = tags
            .models
            .iter()
            .any(|m| m.name == self.model || m.name.starts_with(&format!("{}:", model_base)));

        if !model_found {
            return Err(GeneratorError::Api {
                status: 404,
                message: format!(
                    "model '{}' not found. Pull it with: ollama pull {}",
                    self.model, self.model
                ),
            });
        }

        Ok(())
    }

    /// Send a prompt to Ollama and get a response.
    pub async fn complete(&self, prompt: &str) -> Result<String, GeneratorError> {
        let request = OllamaRequest {
            model: &self.model,
            prompt,
            stream: false,
            format: "json",
            options: OllamaOptions {
                temperature: self.temperature,
                num_predict: self.max_tokens,
            },
        };

        let url = format!("{}/api/generate", self.base_url);

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
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

        let response: OllamaResponse = response.json().await?;

        if let Some(error) = response.error {
            return Err(GeneratorError::Api {
                status: 200,
                message: error,
            });
        }
        if response.response.trim().is_empty() {
            return Err(GeneratorError::EmptyResponse);
        }

        Ok(response.response)
    }

    /// Get the current model name.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Get the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

impl Default for OllamaClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl QueryGenerator for OllamaClient {
    async fn generate(&self, prompt: &str) -> Result<String, GeneratorError> {
        self.complete(prompt).await
    }
}
