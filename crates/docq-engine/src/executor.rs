//! Execution of canonical intents against a document store.

use docq_intent::{Document, Intent};
use docq_store::{sanitize_document, DocumentStore, FindOptions, StoreError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Outcome of executing one intent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub success: bool,
    /// Sanitized documents; empty on failure.
    pub data: Vec<Document>,
    pub execution_time_seconds: f64,
    pub result_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl QueryResult {
    fn ok(data: Vec<Document>, execution_time_seconds: f64) -> Self {
        Self {
            success: true,
            result_count: data.len(),
            data,
            execution_time_seconds,
            error: None,
        }
    }

    fn failed(error: String, execution_time_seconds: f64) -> Self {
        Self {
            success: false,
            data: Vec::new(),
            execution_time_seconds,
            result_count: 0,
            error: Some(error),
        }
    }
}

#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("Aggregation pipeline cannot be empty")]
    EmptyPipeline,
    #[error("Field name is required for distinct query")]
    MissingField,
    #[error("Unsupported query type: {0}")]
    UnsupportedQueryType(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Runs intents and sanitizes their results.
pub struct QueryExecutor {
    store: Arc<dyn DocumentStore>,
    default_limit: i64,
}

impl QueryExecutor {
    /// `default_limit` applies to finds without a limit; zero or negative
    /// means unlimited.
    pub fn new(store: Arc<dyn DocumentStore>, default_limit: i64) -> Self {
        Self {
            store,
            default_limit,
        }
    }

    /// Execute `intent` on `collection`. Failures are reported in the result.
    pub async fn execute(&self, collection: &str, intent: &Intent) -> QueryResult {
        let start = Instant::now();
        let outcome = self.dispatch(collection, intent).await;
        let elapsed = start.elapsed().as_secs_f64();

        match outcome {
            Ok(docs) => {
                let data: Vec<Document> = docs.into_iter().map(sanitize_document).collect();
                info!(
                    "{} on '{}' returned {} document(s) in {:.3}s",
                    intent.query_type(),
                    collection,
                    data.len(),
                    elapsed
                );
                QueryResult::ok(data, elapsed)
            }
            Err(e) => {
                warn!("{} on '{}' failed: {}", intent.query_type(), collection, e);
                QueryResult::failed(e.to_string(), elapsed)
            }
        }
    }

    async fn dispatch(
        &self,
        collection: &str,
        intent: &Intent,
    ) -> Result<Vec<Document>, ExecutionError> {
        match intent {
            Intent::Find(q) => {
                let limit = q.limit.unwrap_or(self.default_limit);
                let options = FindOptions {
                    filter: q.filter.clone(),
                    projection: q.projection.clone().filter(|p| !p.is_empty()),
                    sort: q.sort.clone(),
                    limit: (limit > 0).then_some(limit as usize),
                };
                debug!("find {:?}", options);
                Ok(self.store.find(collection, &options).await?)
            }
            Intent::Aggregate(q) => {
                if q.pipeline.is_empty() {
                    return Err(ExecutionError::EmptyPipeline);
                }
                Ok(self.store.aggregate(collection, &q.pipeline).await?)
            }
            Intent::Count(q) => {
                let count = self.store.count_documents(collection, &q.filter).await?;
                let mut row = Document::new();
                row.insert("count".into(), Value::from(count));
                Ok(vec![row])
            }
            Intent::Distinct(q) => {
                let field = q.field.trim();
                if field.is_empty() {
                    return Err(ExecutionError::MissingField);
                }
                let values = self.store.distinct(collection, field, &q.filter).await?;
                let mut row = Document::new();
                row.insert("field".into(), Value::from(field));
                row.insert("count".into(), Value::from(values.len()));
                row.insert("distinct_values".into(), Value::Array(values));
                Ok(vec![row])
            }
            Intent::Error(_) => Err(ExecutionError::UnsupportedQueryType(
                intent.query_type().to_string(),
            )),
        }
    }
}
