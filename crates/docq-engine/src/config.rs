//! Engine configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Default OpenAI-compatible endpoint (Groq).
pub const DEFAULT_BASE_URL: &str = "https://api.groq.com/openai/v1";

/// Default chat model.
pub const DEFAULT_MODEL: &str = "llama-3.1-8b-instant";

/// Which candidate-query generator to talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Backend {
    /// OpenAI-compatible `/chat/completions` (Groq, llama-server, vLLM, ...)
    #[default]
    OpenAi,
    /// Ollama `/api/generate`
    Ollama,
}

impl Backend {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "openai" | "groq" => Some(Backend::OpenAi),
            "ollama" => Some(Backend::Ollama),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::OpenAi => "openai",
            Backend::Ollama => "ollama",
        }
    }

    pub fn default_base_url(&self) -> &'static str {
        match self {
            Backend::OpenAi => DEFAULT_BASE_URL,
            Backend::Ollama => crate::ollama::DEFAULT_OLLAMA_URL,
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            Backend::OpenAi => DEFAULT_MODEL,
            Backend::Ollama => crate::ollama::DEFAULT_OLLAMA_MODEL,
        }
    }
}

/// Configuration for the query engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub backend: Backend,
    /// Bearer token for the OpenAI-compatible backend
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Documents sampled per schema extraction
    pub schema_sample_size: usize,
    /// Default `find` limit when the intent carries none
    pub query_limit: i64,
    /// Extra generation attempts after a generator failure
    pub max_retries: u32,
    /// Delay before the first retry; doubles on every attempt
    pub retry_backoff: Duration,
    /// Fields stripped from the prompt sample document
    pub excluded_fields: Vec<String>,
    /// JSON lines file receiving analytics events
    pub analytics_log: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            backend: Backend::OpenAi,
            api_key: String::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            temperature: 0.1,
            max_tokens: 1000,
            schema_sample_size: 100,
            query_limit: 100,
            max_retries: 0,
            retry_backoff: Duration::from_millis(500),
            excluded_fields: vec!["tier_and_details".to_string()],
            analytics_log: None,
        }
    }
}

impl EngineConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let backend = var("DOCQ_BACKEND")
            .and_then(|v| Backend::parse(&v))
            .unwrap_or(defaults.backend);

        let api_key = var("DOCQ_API_KEY")
            .or_else(|| var("GROQ_API_KEY"))
            .unwrap_or_default();

        let base_url = var("DOCQ_BASE_URL").unwrap_or_else(|| backend.default_base_url().to_string());
        let model = var("DOCQ_MODEL").unwrap_or_else(|| backend.default_model().to_string());

        let excluded_fields = var("DOCQ_EXCLUDED_FIELDS")
            .map(|v| {
                v.split(',')
                    .map(str::trim)
                    .filter(|f| !f.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or(defaults.excluded_fields);

        Self {
            backend,
            api_key,
            base_url,
            model,
            temperature: parsed(&var, "DOCQ_TEMPERATURE").unwrap_or(defaults.temperature),
            max_tokens: parsed(&var, "DOCQ_MAX_TOKENS").unwrap_or(defaults.max_tokens),
            schema_sample_size: parsed(&var, "DOCQ_SCHEMA_SAMPLE_SIZE")
                .unwrap_or(defaults.schema_sample_size),
            query_limit: parsed(&var, "DOCQ_QUERY_LIMIT").unwrap_or(defaults.query_limit),
            max_retries: parsed(&var, "DOCQ_MAX_RETRIES").unwrap_or(defaults.max_retries),
            retry_backoff: defaults.retry_backoff,
            excluded_fields,
            analytics_log: var("DOCQ_ANALYTICS_LOG")
                .filter(|v| !v.is_empty())
                .map(PathBuf::from),
        }
    }

    /// Whether the configured backend has the credentials it needs.
    pub fn is_valid(&self) -> bool {
        match self.backend {
            Backend::OpenAi => !self.api_key.is_empty(),
            Backend::Ollama => true,
        }
    }

    /// Create a builder for configuration.
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::default()
    }
}

fn parsed<T: std::str::FromStr>(var: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    var(key).and_then(|v| v.trim().parse().ok())
}

/// Builder for engine configuration.
#[derive(Debug, Default)]
pub struct EngineConfigBuilder {
    config: EngineConfig,
}

impl EngineConfigBuilder {
    /// Select the backend. An endpoint or model still at the previous
    /// backend's default follows the new backend's default.
    pub fn backend(mut self, backend: Backend) -> Self {
        let previous = self.config.backend;
        if self.config.base_url == previous.default_base_url() {
            self.config.base_url = backend.default_base_url().to_string();
        }
        if self.config.model == previous.default_model() {
            self.config.model = backend.default_model().to_string();
        }
        self.config.backend = backend;
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = key.into();
        self
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = url.into();
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.config.temperature = temperature;
        self
    }

    pub fn max_tokens(mut self, tokens: u32) -> Self {
        self.config.max_tokens = tokens;
        self
    }

    pub fn schema_sample_size(mut self, size: usize) -> Self {
        self.config.schema_sample_size = size;
        self
    }

    pub fn query_limit(mut self, limit: i64) -> Self {
        self.config.query_limit = limit;
        self
    }

    pub fn max_retries(mut self, retries: u32) -> Self {
        self.config.max_retries = retries;
        self
    }

    pub fn retry_backoff(mut self, backoff: Duration) -> Self {
        self.config.retry_backoff = backoff;
        self
    }

    pub fn excluded_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.excluded_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn analytics_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.analytics_log = Some(path.into());
        self
    }

    pub fn build(self) -> EngineConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.model, DEFAULT_MODEL);
        assert_eq!(config.schema_sample_size, 100);
        assert_eq!(config.query_limit, 100);
        assert_eq!(config.max_retries, 0);
        assert_eq!(config.excluded_fields, vec!["tier_and_details"]);
        assert!(!config.is_valid());
    }

    #[test]
    fn test_env_overrides() {
        let config = EngineConfig::from_lookup(lookup(&[
            ("GROQ_API_KEY", "gsk-test"),
            ("DOCQ_QUERY_LIMIT", "25"),
            ("DOCQ_MAX_RETRIES", "2"),
            ("DOCQ_EXCLUDED_FIELDS", "tier_and_details, ssn ,"),
            ("DOCQ_TEMPERATURE", "not-a-number"),
        ]));
        assert_eq!(config.api_key, "gsk-test");
        assert_eq!(config.query_limit, 25);
        assert_eq!(config.max_retries, 2);
        assert_eq!(config.excluded_fields, vec!["tier_and_details", "ssn"]);
        assert_eq!(config.temperature, 0.1);
        assert!(config.is_valid());
    }

    #[test]
    fn test_ollama_backend_defaults() {
        let config = EngineConfig::from_lookup(lookup(&[("DOCQ_BACKEND", "Ollama")]));
        assert_eq!(config.backend, Backend::Ollama);
        assert_eq!(config.base_url, crate::ollama::DEFAULT_OLLAMA_URL);
        assert!(config.is_valid());
    }

    #[test]
    fn test_builder_pattern() {
        let config = EngineConfig::builder()
            .api_key("key")
            .model("llama-3.3-70b-versatile")
            .query_limit(0)
            .excluded_fields(["a", "b"])
            .build();
        assert_eq!(config.api_key, "key");
        assert_eq!(config.model, "llama-3.3-70b-versatile");
        assert_eq!(config.query_limit, 0);
        assert_eq!(config.excluded_fields, vec!["a", "b"]);
    }

    #[test]
    fn test_builder_backend_switches_defaults() {
        let config = EngineConfig::builder().backend(Backend::Ollama).build();
        assert_eq!(config.base_url, crate::ollama::DEFAULT_OLLAMA_URL);
        assert_eq!(config.model, crate::ollama::DEFAULT_OLLAMA_MODEL);

        let config = EngineConfig::builder()
            .model("qwen2.5:7b")
            .backend(Backend::Ollama)
            .build();
        assert_eq!(config.base_url, crate::ollama::DEFAULT_OLLAMA_URL);
        assert_eq!(config.model, "qwen2.5:7b");
    }
}
