//! # docq Query Engine
//!
//! Turns natural-language questions into canonical document queries, runs
//! them and carries conversational context between turns.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌─────────────────┐     ┌─────────────────┐
//! │  QueryRequest   │ --> │ IntentResolver  │ --> │  QueryExecutor  │
//! │  (session, text)│     │ gates + model   │     │  (sanitized)    │
//! └─────────────────┘     └─────────────────┘     └─────────────────┘
//!                           │           │                  │
//!                   ┌───────┴──┐  ┌─────┴──────┐   ┌───────┴──────┐
//!                   │  Schema  │  │  Session   │<--│  Analytics   │
//!                   │  Sampler │  │  Context   │   │  + transcript│
//!                   └──────────┘  └────────────┘   └──────────────┘
//! ```
//!
//! ## Deterministic gates
//!
//! The resolver answers some questions without calling the model: a
//! collection with no documents yields a `schema` error, and a question about
//! customers in a place that is not a US state yields an `impossible` error.
//!
//! ## Generator backends
//!
//! - **OpenAI-compatible** (default) - Groq, llama-server, vLLM
//! - **Ollama** - local models through `/api/generate`
//!
//! ## Usage
//!
//! ```ignore
//! use docq_engine::{Agent, EngineConfig, QueryRequest};
//!
//! let config = EngineConfig::from_env();
//! let agent = Agent::from_config(&config, store)?;
//!
//! let response = agent
//!     .handle(QueryRequest::new("customers", "Show all customers from California"))
//!     .await;
//! ```

mod agent;
mod analytics;
mod config;
mod executor;
mod generator;
mod ollama;
mod openai;
pub mod places;
mod prompt;
mod resolver;
mod sample;
mod schema;
mod session;

pub use agent::{Agent, AgentError, QueryRequest, QueryResponse};
pub use analytics::{AnalyticsError, AnalyticsEvent, AnalyticsSink, EventKind, JsonlSink};
pub use config::{Backend, EngineConfig, EngineConfigBuilder, DEFAULT_BASE_URL, DEFAULT_MODEL};
pub use executor::{ExecutionError, QueryExecutor, QueryResult};
pub use generator::{from_config as generator_from_config, GeneratorError, QueryGenerator, Retry};
pub use ollama::{OllamaClient, DEFAULT_OLLAMA_MODEL, DEFAULT_OLLAMA_URL};
pub use openai::ChatClient;
pub use prompt::{build_prompt, PromptInput, MAX_PROMPT_FIELDS};
pub use resolver::{interpret_response, IntentResolver};
pub use sample::SampleDocumentProvider;
pub use schema::{FieldInfo, Schema, SchemaError, SchemaSampler, MAX_SCHEMA_DEPTH};
pub use session::{Interaction, InteractionKind, SessionContext, SessionStore, AMBIGUOUS_REPLY};

// Re-export intent types for convenience
pub use docq_intent::{ErrorKind, Intent, QueryType};
