//! Intent types.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::Document;

/// The query type tag of an intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryType {
    Find,
    Aggregate,
    Count,
    Distinct,
    Error,
}

impl QueryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryType::Find => "find",
            QueryType::Aggregate => "aggregate",
            QueryType::Count => "count",
            QueryType::Distinct => "distinct",
            QueryType::Error => "error",
        }
    }

    /// Parse a query type tag as the generator spells it.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "find" => Some(QueryType::Find),
            "aggregate" => Some(QueryType::Aggregate),
            "count" => Some(QueryType::Count),
            "distinct" => Some(QueryType::Distinct),
            "error" => Some(QueryType::Error),
            _ => None,
        }
    }
}

impl fmt::Display for QueryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a question could not be turned into a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Schema introspection failed (empty collection, store error).
    Schema,
    /// A deterministic domain check rejected the question.
    Impossible,
    /// A follow-up reference could not be resolved.
    Ambiguous,
    /// The generator returned unusable output.
    Processing,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Schema => "schema",
            ErrorKind::Impossible => "impossible",
            ErrorKind::Ambiguous => "ambiguous",
            ErrorKind::Processing => "processing",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "schema" => Some(ErrorKind::Schema),
            "impossible" => Some(ErrorKind::Impossible),
            "ambiguous" => Some(ErrorKind::Ambiguous),
            "processing" => Some(ErrorKind::Processing),
            _ => None,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A canonical query intent.
///
/// Only the `Error` variant may be "incomplete"; every other variant is
/// expected to satisfy [`crate::validate`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "query_type", rename_all = "snake_case")]
pub enum Intent {
    Find(FindQuery),
    Aggregate(AggregateQuery),
    Count(CountQuery),
    Distinct(DistinctQuery),
    Error(IntentError),
}

/// `find`: filter plus optional projection, sort and limit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FindQuery {
    #[serde(default)]
    pub filter: Document,
    /// `None` returns every field.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub projection: Option<Document>,
    /// Sort keys in priority order, each mapped to 1 or -1.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort: Option<Document>,
    /// `None` uses the executor default; zero or negative means unlimited.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<i64>,
}

/// `aggregate`: a non-empty pipeline of single-key stages.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregateQuery {
    pub pipeline: Vec<Document>,
}

/// `count`: number of documents matching a filter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CountQuery {
    #[serde(default)]
    pub filter: Document,
}

/// `distinct`: unique values of one field among matching documents.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DistinctQuery {
    pub field: String,
    #[serde(default)]
    pub filter: Document,
}

/// `error`: a structured refusal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentError {
    pub error_type: ErrorKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl Intent {
    /// Create an error intent.
    pub fn error(kind: ErrorKind, message: impl Into<String>) -> Self {
        Intent::Error(IntentError {
            error_type: kind,
            error_message: Some(message.into()),
        })
    }

    /// Create a find intent with the given filter.
    pub fn find(filter: Document) -> Self {
        Intent::Find(FindQuery {
            filter,
            ..Default::default()
        })
    }

    /// Create a count intent with the given filter.
    pub fn count(filter: Document) -> Self {
        Intent::Count(CountQuery { filter })
    }

    /// Create a distinct intent.
    pub fn distinct(field: impl Into<String>, filter: Document) -> Self {
        Intent::Distinct(DistinctQuery {
            field: field.into(),
            filter,
        })
    }

    /// Create an aggregate intent.
    pub fn aggregate(pipeline: Vec<Document>) -> Self {
        Intent::Aggregate(AggregateQuery { pipeline })
    }

    /// Set the projection of a find intent. No-op for other variants.
    pub fn with_projection(mut self, projection: Document) -> Self {
        if let Intent::Find(find) = &mut self {
            find.projection = if projection.is_empty() {
                None
            } else {
                Some(projection)
            };
        }
        self
    }

    /// Set the limit of a find intent. No-op for other variants.
    pub fn with_limit(mut self, limit: i64) -> Self {
        if let Intent::Find(find) = &mut self {
            find.limit = Some(limit);
        }
        self
    }

    pub fn query_type(&self) -> QueryType {
        match self {
            Intent::Find(_) => QueryType::Find,
            Intent::Aggregate(_) => QueryType::Aggregate,
            Intent::Count(_) => QueryType::Count,
            Intent::Distinct(_) => QueryType::Distinct,
            Intent::Error(_) => QueryType::Error,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Intent::Error(_))
    }

    /// The error kind, for error intents.
    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            Intent::Error(e) => Some(e.error_type),
            _ => None,
        }
    }

    /// The error message, for error intents.
    pub fn error_message(&self) -> Option<&str> {
        match self {
            Intent::Error(e) => e.error_message.as_deref(),
            _ => None,
        }
    }

    /// The filter this intent applies.
    ///
    /// For aggregations this is the leading `$match` stage, if any.
    pub fn filter(&self) -> Option<&Document> {
        match self {
            Intent::Find(q) => Some(&q.filter),
            Intent::Count(q) => Some(&q.filter),
            Intent::Distinct(q) => Some(&q.filter),
            Intent::Aggregate(q) => q
                .pipeline
                .first()
                .and_then(|stage| stage.get("$match"))
                .and_then(|m| m.as_object()),
            Intent::Error(_) => None,
        }
    }

    /// The projection of a find intent.
    pub fn projection(&self) -> Option<&Document> {
        match self {
            Intent::Find(q) => q.projection.as_ref(),
            _ => None,
        }
    }

    /// Serialize to the JSON wire form.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_string(self) {
            Ok(s) => f.write_str(&s),
            Err(_) => write!(f, "<{} intent>", self.query_type()),
        }
    }
}
