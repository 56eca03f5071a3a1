//! Candidate-query generation.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

use crate::config::{Backend, EngineConfig};
use crate::ollama::OllamaClient;
use crate::openai::ChatClient;

/// Errors from a candidate-query generator.
#[derive(Debug, Error)]
pub enum GeneratorError {
    #[error("model unavailable at {0}")]
    ModelUnavailable(String),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("missing API key - set DOCQ_API_KEY or GROQ_API_KEY")]
    MissingApiKey,
    #[error("model returned no completion")]
    EmptyResponse,
}

impl GeneratorError {
    /// Whether another attempt could succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            GeneratorError::ModelUnavailable(_) | GeneratorError::Http(_) => true,
            GeneratorError::Api { status, .. } => *status == 429 || *status >= 500,
            GeneratorError::EmptyResponse => true,
            GeneratorError::Json(_) | GeneratorError::MissingApiKey => false,
        }
    }
}

/// Proposes a structured query for a natural-language prompt.
///
/// The returned text is untrusted and may be anything.
#[async_trait]
pub trait QueryGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, GeneratorError>;
}

#[async_trait]
impl<G: QueryGenerator + ?Sized> QueryGenerator for Arc<G> {
    async fn generate(&self, prompt: &str) -> Result<String, GeneratorError> {
        (**self).generate(prompt).await
    }
}

/// Retries transient generator failures with exponential backoff.
pub struct Retry<G> {
    inner: G,
    max_retries: u32,
    backoff: Duration,
}

impl<G: QueryGenerator> Retry<G> {
    pub fn new(inner: G, max_retries: u32, backoff: Duration) -> Self {
        Self {
            inner,
            max_retries,
            backoff,
        }
    }
}

#[async_trait]
impl<G: QueryGenerator> QueryGenerator for Retry<G> {
    async fn generate(&self, prompt: &str) -> Result<String, GeneratorError> {
        let mut delay = self.backoff;
        let mut attempt = 0;
        loop {
            match self.inner.generate(prompt).await {
                Ok(text) => return Ok(text),
                Err(e) if attempt < self.max_retries && e.is_transient() => {
                    attempt += 1;
                    warn!(
                        "Generation failed ({}), retry {}/{} in {:?}",
                        e, attempt, self.max_retries, delay
                    );
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Build the generator described by `config`, wrapped in [`Retry`] when
/// retries are enabled.
pub fn from_config(config: &EngineConfig) -> Result<Arc<dyn QueryGenerator>, GeneratorError> {
    let base: Arc<dyn QueryGenerator> = match config.backend {
        Backend::OpenAi => {
            if config.api_key.is_empty() {
                return Err(GeneratorError::MissingApiKey);
            }
            Arc::new(ChatClient::from_config(config))
        }
        Backend::Ollama => Arc::new(OllamaClient::from_config(config)),
    };

    if config.max_retries == 0 {
        Ok(base)
    } else {
        Ok(Arc::new(Retry::new(
            base,
            config.max_retries,
            config.retry_backoff,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Flaky {
        failures: u32,
        calls: AtomicU32,
        transient: bool,
    }

    #[async_trait]
    impl QueryGenerator for Flaky {
        async fn generate(&self, _prompt: &str) -> Result<String, GeneratorError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                if self.transient {
                    Err(GeneratorError::ModelUnavailable("test".into()))
                } else {
                    Err(GeneratorError::MissingApiKey)
                }
            } else {
                Ok("{}".into())
            }
        }
    }

    fn flaky(failures: u32, transient: bool) -> Flaky {
        Flaky {
            failures,
            calls: AtomicU32::new(0),
            transient,
        }
    }

    #[tokio::test]
    async fn test_retry_recovers() {
        let retry = Retry::new(flaky(2, true), 2, Duration::from_millis(1));
        assert_eq!(retry.generate("p").await.unwrap(), "{}");
        assert_eq!(retry.inner.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_gives_up() {
        let retry = Retry::new(flaky(5, true), 1, Duration::from_millis(1));
        assert!(retry.generate("p").await.is_err());
        assert_eq!(retry.inner.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_permanent_errors_not_retried() {
        let retry = Retry::new(flaky(1, false), 3, Duration::from_millis(1));
        assert!(matches!(
            retry.generate("p").await,
            Err(GeneratorError::MissingApiKey)
        ));
        assert_eq!(retry.inner.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_factory_requires_key() {
        let config = EngineConfig::default();
        assert!(matches!(
            from_config(&config),
            Err(GeneratorError::MissingApiKey)
        ));
        let config = EngineConfig::builder().backend(Backend::Ollama).build();
        assert!(from_config(&config).is_ok());
    }
}
