//! Append-only analytics events.

use chrono::{DateTime, Utc};
use docq_intent::Intent;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    UserMessage,
    AiResponse,
}

/// One analytics log entry. Never mutated once recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsEvent {
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub session_id: Uuid,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intent: Option<Intent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_success: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_time: Option<f64>,
}

impl AnalyticsEvent {
    pub fn user_message(session_id: Uuid, text: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            kind: EventKind::UserMessage,
            session_id,
            text: text.into(),
            intent: None,
            response_success: None,
            execution_time: None,
        }
    }

    pub fn ai_response(
        session_id: Uuid,
        text: impl Into<String>,
        intent: Intent,
        success: bool,
        execution_time: f64,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            kind: EventKind::AiResponse,
            session_id,
            text: text.into(),
            intent: Some(intent),
            response_success: Some(success),
            execution_time: Some(execution_time),
        }
    }
}

#[derive(Debug, Error)]
pub enum AnalyticsError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Durable destination for analytics events.
pub trait AnalyticsSink: Send + Sync {
    fn append(&self, event: &AnalyticsEvent) -> Result<(), AnalyticsError>;
}

/// Appends events as JSON lines to a file.
pub struct JsonlSink {
    path: PathBuf,
    file: Mutex<File>,
}

impl JsonlSink {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, AnalyticsError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AnalyticsSink for JsonlSink {
    fn append(&self, event: &AnalyticsEvent) -> Result<(), AnalyticsError> {
        let mut line = serde_json::to_string(event)?;
        line.push('\n');
        let mut file = self.file.lock();
        file.write_all(line.as_bytes())?;
        file.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[test]
    fn test_event_wire_shape() {
        let id = Uuid::new_v4();
        let event = AnalyticsEvent::user_message(id, "How many customers are there?");
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "user_message");
        assert_eq!(value["session_id"], id.to_string());
        assert!(value.get("intent").is_none());

        let event = AnalyticsEvent::ai_response(id, "[]", Intent::count(Default::default()), true, 0.25);
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "ai_response");
        assert_eq!(value["intent"]["query_type"], "count");
        assert_eq!(value["response_success"], true);
        assert_eq!(value["execution_time"], 0.25);
    }

    #[test]
    fn test_jsonl_sink_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("events.jsonl");
        let sink = JsonlSink::open(&path).unwrap();
        let id = Uuid::new_v4();
        sink.append(&AnalyticsEvent::user_message(id, "one")).unwrap();
        sink.append(&AnalyticsEvent::user_message(id, "two")).unwrap();

        let text = std::fs::read_to_string(sink.path()).unwrap();
        let lines: Vec<Value> = text
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1]["text"], "two");
    }
}
