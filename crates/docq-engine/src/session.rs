//! Per-session conversational context, transcript and analytics log.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use docq_intent::{Document, Intent, QueryType};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::fmt::Write;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::analytics::{AnalyticsEvent, AnalyticsSink};

/// Reply sent back when a question could not be disambiguated.
pub const AMBIGUOUS_REPLY: &str = "Your previous query was ambiguous. Please clarify.";

/// What a follow-up question can refer back to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionContext {
    pub session_id: Uuid,
    pub last_filter: Option<Document>,
    pub last_query_type: Option<QueryType>,
    pub last_projection: Option<Document>,
}

impl SessionContext {
    pub fn new(session_id: Uuid) -> Self {
        Self {
            session_id,
            last_filter: None,
            last_query_type: None,
            last_projection: None,
        }
    }

    /// Whether nothing has been carried forward yet.
    pub fn is_empty(&self) -> bool {
        self.last_filter.is_none() && self.last_query_type.is_none() && self.last_projection.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionKind {
    Exchange,
    AmbiguousQuery,
}

/// One input/output pair of the in-memory transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interaction {
    pub session_id: Uuid,
    pub kind: InteractionKind,
    pub input: String,
    pub output: String,
    pub timestamp: DateTime<Utc>,
}

/// Session state shared by all requests.
pub struct SessionStore {
    contexts: DashMap<Uuid, SessionContext>,
    events: RwLock<Vec<AnalyticsEvent>>,
    transcript: Mutex<Vec<Interaction>>,
    sink: Option<Box<dyn AnalyticsSink>>,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    pub fn new() -> Self {
        Self {
            contexts: DashMap::new(),
            events: RwLock::new(Vec::new()),
            transcript: Mutex::new(Vec::new()),
            sink: None,
        }
    }

    /// Also append every analytics event to `sink`.
    pub fn with_sink(mut self, sink: impl AnalyticsSink + 'static) -> Self {
        self.sink = Some(Box::new(sink));
        self
    }

    /// Use the given session, or start a fresh one.
    pub fn begin_session(&self, session_id: Option<Uuid>) -> Uuid {
        let id = session_id.unwrap_or_else(Uuid::new_v4);
        self.contexts.entry(id).or_insert_with(|| {
            info!("Started session {}", id);
            SessionContext::new(id)
        });
        id
    }

    /// Context for a session, created empty on first use.
    pub fn get_context(&self, session_id: Uuid) -> SessionContext {
        self.contexts
            .entry(session_id)
            .or_insert_with(|| SessionContext::new(session_id))
            .clone()
    }

    pub fn update_context(
        &self,
        session_id: Uuid,
        filter: Option<Document>,
        query_type: QueryType,
        projection: Option<Document>,
    ) {
        let mut context = self
            .contexts
            .entry(session_id)
            .or_insert_with(|| SessionContext::new(session_id));
        context.last_filter = filter;
        context.last_query_type = Some(query_type);
        context.last_projection = projection;
        debug!("Updated context for session {}", session_id);
    }

    /// Carry a resolved intent forward. Error intents are ignored.
    pub fn update_from_intent(&self, session_id: Uuid, intent: &Intent) {
        if intent.is_error() {
            return;
        }
        self.update_context(
            session_id,
            intent.filter().cloned(),
            intent.query_type(),
            intent.projection().cloned(),
        );
    }

    pub fn record_turn(&self, session_id: Uuid, user_text: &str) {
        self.record(AnalyticsEvent::user_message(session_id, user_text));
    }

    pub fn record_response(
        &self,
        session_id: Uuid,
        text: &str,
        intent: &Intent,
        success: bool,
        execution_time: f64,
    ) {
        self.record(AnalyticsEvent::ai_response(
            session_id,
            text,
            intent.clone(),
            success,
            execution_time,
        ));
    }

    fn record(&self, event: AnalyticsEvent) {
        if let Some(sink) = &self.sink {
            if let Err(e) = sink.append(&event) {
                warn!("Failed to persist analytics event: {}", e);
            }
        }
        self.events.write().push(event);
    }

    /// All analytics events recorded so far, oldest first.
    pub fn events(&self) -> Vec<AnalyticsEvent> {
        self.events.read().clone()
    }

    pub fn save_interaction(&self, session_id: Uuid, input: &str, output: &str) {
        self.push_interaction(session_id, InteractionKind::Exchange, input, output);
    }

    /// Remember an ambiguous question and return the clarification reply.
    pub fn record_ambiguous(&self, session_id: Uuid, input: &str) -> &'static str {
        self.push_interaction(
            session_id,
            InteractionKind::AmbiguousQuery,
            input,
            "Please clarify your previous query",
        );
        AMBIGUOUS_REPLY
    }

    fn push_interaction(&self, session_id: Uuid, kind: InteractionKind, input: &str, output: &str) {
        self.transcript.lock().push(Interaction {
            session_id,
            kind,
            input: input.to_string(),
            output: output.to_string(),
            timestamp: Utc::now(),
        });
    }

    /// Transcript entries of one session.
    pub fn interactions(&self, session_id: Uuid) -> Vec<Interaction> {
        self.transcript
            .lock()
            .iter()
            .filter(|i| i.session_id == session_id)
            .cloned()
            .collect()
    }

    /// The session transcript as `Human:`/`AI:` lines.
    pub fn conversation_history(&self, session_id: Uuid) -> String {
        let mut history = String::new();
        for interaction in self.interactions(session_id) {
            let _ = writeln!(history, "Human: {}", interaction.input);
            let _ = writeln!(history, "AI: {}", interaction.output);
        }
        history
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::EventKind;
    use serde_json::json;

    fn filter(value: serde_json::Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_begin_session() {
        let store = SessionStore::new();
        let fresh = store.begin_session(None);
        let given = Uuid::new_v4();
        assert_eq!(store.begin_session(Some(given)), given);
        assert_ne!(fresh, given);
        assert!(store.get_context(fresh).is_empty());
    }

    #[test]
    fn test_context_follows_successful_intents() {
        let store = SessionStore::new();
        let id = store.begin_session(None);
        let intent = Intent::find(filter(json!({"state": "NY"})))
            .with_projection(filter(json!({"name": 1})));
        store.update_from_intent(id, &intent);
        store.update_from_intent(id, &Intent::error(docq_intent::ErrorKind::Ambiguous, "?"));

        let context = store.get_context(id);
        assert_eq!(context.last_filter, Some(filter(json!({"state": "NY"}))));
        assert_eq!(context.last_query_type, Some(QueryType::Find));
        assert_eq!(context.last_projection, Some(filter(json!({"name": 1}))));
    }

    #[test]
    fn test_sessions_are_isolated() {
        let store = SessionStore::new();
        let a = store.begin_session(None);
        let b = store.begin_session(None);
        store.update_from_intent(a, &Intent::count(filter(json!({"active": true}))));
        assert!(store.get_context(b).is_empty());
    }

    #[test]
    fn test_events_and_transcript() {
        let store = SessionStore::new();
        let id = store.begin_session(None);
        store.record_turn(id, "How many customers?");
        store.record_response(id, "[{\"count\":3}]", &Intent::count(Document::new()), true, 0.01);
        store.save_interaction(id, "How many customers?", "[{\"count\":3}]");
        assert_eq!(store.record_ambiguous(id, "show those"), AMBIGUOUS_REPLY);

        let events = store.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].kind, EventKind::UserMessage);
        assert_eq!(events[1].response_success, Some(true));

        let history = store.conversation_history(id);
        assert!(history.starts_with("Human: How many customers?\nAI: [{\"count\":3}]\n"));
        assert!(history.contains("Human: show those\n"));
        assert_eq!(
            store.interactions(id)[1].kind,
            InteractionKind::AmbiguousQuery
        );
        assert!(store.conversation_history(Uuid::new_v4()).is_empty());
    }
}
