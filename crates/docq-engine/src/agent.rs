//! Request handling: session, resolution, execution and bookkeeping.

use docq_intent::{Document, ErrorKind, Intent};
use docq_store::DocumentStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use crate::analytics::{AnalyticsError, JsonlSink};
use crate::config::EngineConfig;
use crate::executor::QueryExecutor;
use crate::generator::{self, GeneratorError, QueryGenerator};
use crate::resolver::IntentResolver;
use crate::sample::SampleDocumentProvider;
use crate::schema::SchemaSampler;
use crate::session::SessionStore;

/// A natural-language question about one collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryRequest {
    #[serde(default)]
    pub session_id: Option<Uuid>,
    pub collection: String,
    pub query_text: String,
}

impl QueryRequest {
    pub fn new(collection: impl Into<String>, query_text: impl Into<String>) -> Self {
        Self {
            session_id: None,
            collection: collection.into(),
            query_text: query_text.into(),
        }
    }

    pub fn in_session(mut self, session_id: Uuid) -> Self {
        self.session_id = Some(session_id);
        self
    }
}

/// The answer to a [`QueryRequest`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResponse {
    pub session_id: Uuid,
    pub data: Vec<Document>,
    pub execution_time: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_type: Option<ErrorKind>,
}

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("generator error: {0}")]
    Generator(#[from] GeneratorError),
    #[error("analytics error: {0}")]
    Analytics(#[from] AnalyticsError),
}

/// Answers questions end to end and keeps per-session state.
pub struct Agent {
    resolver: IntentResolver,
    executor: QueryExecutor,
    sessions: Arc<SessionStore>,
}

impl Agent {
    /// Build an agent with the generator and analytics log described by
    /// `config`.
    pub fn from_config(
        config: &EngineConfig,
        store: Arc<dyn DocumentStore>,
    ) -> Result<Self, AgentError> {
        let generator = generator::from_config(config)?;
        let mut sessions = SessionStore::new();
        if let Some(path) = &config.analytics_log {
            sessions = sessions.with_sink(JsonlSink::open(path)?);
            info!("Writing analytics events to {}", path.display());
        }
        Ok(Self::with_generator(
            config,
            store,
            generator,
            Arc::new(sessions),
        ))
    }

    pub fn with_generator(
        config: &EngineConfig,
        store: Arc<dyn DocumentStore>,
        generator: Arc<dyn QueryGenerator>,
        sessions: Arc<SessionStore>,
    ) -> Self {
        let sampler = Arc::new(SchemaSampler::new(store.clone()));
        let samples = Arc::new(SampleDocumentProvider::new(
            store.clone(),
            config.excluded_fields.clone(),
        ));
        Self {
            resolver: IntentResolver::new(
                sampler,
                samples,
                generator,
                config.schema_sample_size,
            ),
            executor: QueryExecutor::new(store, config.query_limit),
            sessions,
        }
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    /// Handle one question.
    ///
    /// Error intents are answered without touching the store; only turns
    /// that resolve and execute successfully become the session context.
    pub async fn handle(&self, request: QueryRequest) -> QueryResponse {
        let session_id = self.sessions.begin_session(request.session_id);
        self.sessions.record_turn(session_id, &request.query_text);

        let context = self.sessions.get_context(session_id);
        let context = (!context.is_empty()).then_some(&context);
        let intent = self
            .resolver
            .resolve(&request.query_text, &request.collection, context)
            .await;

        if let Intent::Error(error) = &intent {
            let message = match error.error_type {
                ErrorKind::Ambiguous => {
                    let reply = self
                        .sessions
                        .record_ambiguous(session_id, &request.query_text);
                    error.error_message.clone().unwrap_or_else(|| reply.to_string())
                }
                kind => error
                    .error_message
                    .clone()
                    .unwrap_or_else(|| format!("Query could not be answered ({kind})")),
            };
            self.sessions.record_response(
                session_id,
                &format!("ERROR: {message}"),
                &intent,
                false,
                0.0,
            );
            info!("Session {} answered with {} error", session_id, error.error_type);
            return QueryResponse {
                session_id,
                data: Vec::new(),
                execution_time: 0.0,
                error: Some(message),
                error_type: Some(error.error_type),
            };
        }

        let result = self.executor.execute(&request.collection, &intent).await;
        let response_text = match &result.error {
            None => serde_json::to_string(&result.data).unwrap_or_default(),
            Some(e) => format!("ERROR: {e}"),
        };
        self.sessions.record_response(
            session_id,
            &response_text,
            &intent,
            result.success,
            result.execution_time_seconds,
        );
        self.sessions
            .save_interaction(session_id, &request.query_text, &response_text);
        if result.success {
            self.sessions.update_from_intent(session_id, &intent);
        }
        debug!("Session {} turn complete", session_id);

        QueryResponse {
            session_id,
            data: result.data,
            execution_time: result.execution_time_seconds,
            error: result.error,
            error_type: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::EventKind;
    use crate::session::AMBIGUOUS_REPLY;
    use async_trait::async_trait;
    use docq_intent::QueryType;
    use docq_store::MemoryStore;
    use parking_lot::Mutex;
    use serde_json::{json, Value};
    use std::collections::VecDeque;

    /// Replies with queued texts in order.
    struct Queue(Mutex<VecDeque<String>>);

    impl Queue {
        fn new(replies: &[&str]) -> Arc<Self> {
            Arc::new(Self(Mutex::new(
                replies.iter().map(|r| r.to_string()).collect(),
            )))
        }
    }

    #[async_trait]
    impl QueryGenerator for Queue {
        async fn generate(&self, _prompt: &str) -> Result<String, GeneratorError> {
            self.0.lock().pop_front().ok_or(GeneratorError::EmptyResponse)
        }
    }

    fn agent(replies: &[&str]) -> Agent {
        let store = MemoryStore::new();
        store.insert_many(
            "customers",
            vec![
                json!({"name": "Ann", "state": "NY", "address": "Albany, NY"}),
                json!({"name": "Bob", "state": "CA", "address": "Fresno, CA"}),
                json!({"name": "Cid", "state": "NY", "address": "Buffalo, NY"}),
            ]
            .into_iter()
            .map(|v| v.as_object().cloned().unwrap())
            .collect(),
        );
        Agent::with_generator(
            &EngineConfig::default(),
            Arc::new(store),
            Queue::new(replies),
            Arc::new(SessionStore::new()),
        )
    }

    fn rows(data: &[Document]) -> Vec<Value> {
        data.iter()
            .map(|d| {
                let mut d = d.clone();
                d.shift_remove("_id");
                Value::Object(d)
            })
            .collect()
    }

    #[tokio::test]
    async fn test_follow_up_turn() {
        let agent = agent(&[
            r#"{"query_type": "find", "filter": {"state": "NY"}, "projection": {}}"#,
            r#"{"query_type": "find", "filter": {"state": "NY"}, "projection": {"name": 1, "_id": 0}}"#,
        ]);

        let first = agent
            .handle(QueryRequest::new("customers", "Show customers with state NY"))
            .await;
        assert!(first.error.is_none());
        assert_eq!(first.data.len(), 2);

        let context = agent.sessions().get_context(first.session_id);
        assert_eq!(context.last_query_type, Some(QueryType::Find));
        assert_eq!(context.last_filter, json!({"state": "NY"}).as_object().cloned());

        let second = agent
            .handle(QueryRequest::new("customers", "Show only their names").in_session(first.session_id))
            .await;
        assert_eq!(second.session_id, first.session_id);
        assert_eq!(rows(&second.data), vec![json!({"name": "Ann"}), json!({"name": "Cid"})]);

        let events = agent.sessions().events();
        assert_eq!(events.len(), 4);
        assert_eq!(events[0].kind, EventKind::UserMessage);
        assert_eq!(events[3].kind, EventKind::AiResponse);
        assert_eq!(events[3].response_success, Some(true));
        assert!(agent
            .sessions()
            .conversation_history(first.session_id)
            .contains("Human: Show only their names\nAI: [{\"name\":\"Ann\"}"));
    }

    #[tokio::test]
    async fn test_impossible_place_is_reported() {
        let agent = agent(&[]);
        let response = agent
            .handle(QueryRequest::new("customers", "How many customers are there in Wakanda?"))
            .await;
        assert_eq!(response.error_type, Some(ErrorKind::Impossible));
        assert_eq!(response.error.as_deref(), Some("No such US state found in query."));
        assert_eq!(response.execution_time, 0.0);
        assert!(response.data.is_empty());

        let events = agent.sessions().events();
        assert_eq!(events[1].text, "ERROR: No such US state found in query.");
        assert_eq!(events[1].response_success, Some(false));
        assert!(agent.sessions().get_context(response.session_id).is_empty());
    }

    #[tokio::test]
    async fn test_ambiguous_reply() {
        let agent = agent(&[r#"{"query_type": "error", "error_type": "ambiguous"}"#]);
        let response = agent
            .handle(QueryRequest::new("customers", "show those"))
            .await;
        assert_eq!(response.error_type, Some(ErrorKind::Ambiguous));
        assert_eq!(response.error.as_deref(), Some(AMBIGUOUS_REPLY));
        assert!(agent
            .sessions()
            .conversation_history(response.session_id)
            .contains("Human: show those"));
    }

    #[tokio::test]
    async fn test_error_turn_keeps_previous_context() {
        let agent = agent(&[
            r#"{"query_type": "count", "filter": {"state": "CA"}}"#,
            "I cannot help with that.",
            r#"{"query_type": "aggregate", "pipeline": [{"$lookup": {"from": "accounts"}}]}"#,
        ]);
        let first = agent
            .handle(QueryRequest::new("customers", "How many are in state CA?"))
            .await;
        assert_eq!(rows(&first.data), vec![json!({"count": 1})]);

        let second = agent
            .handle(QueryRequest::new("customers", "and then?").in_session(first.session_id))
            .await;
        assert_eq!(second.error_type, Some(ErrorKind::Processing));

        let third = agent
            .handle(QueryRequest::new("customers", "join accounts").in_session(first.session_id))
            .await;
        assert!(third.error.is_some());
        assert!(third.error_type.is_none());

        let context = agent.sessions().get_context(first.session_id);
        assert_eq!(context.last_query_type, Some(QueryType::Count));
        assert_eq!(context.last_filter, json!({"state": "CA"}).as_object().cloned());
    }

    #[tokio::test]
    async fn test_analytics_log_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.jsonl");
        let config = EngineConfig::builder()
            .backend(crate::config::Backend::Ollama)
            .analytics_log(&path)
            .build();
        let agent = Agent::from_config(&config, Arc::new(MemoryStore::new())).unwrap();
        let response = agent
            .handle(QueryRequest::new("customers", "How many customers?"))
            .await;
        assert_eq!(response.error_type, Some(ErrorKind::Schema));

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 2);
    }
}
