//! # docq Document Store
//!
//! The database collaborator of the query engine. Everything above this crate
//! talks to a [`DocumentStore`]; the shipped backend is [`MemoryStore`], an
//! in-memory collection store that speaks MongoDB Extended JSON.
//!
//! ## Values
//!
//! Documents are ordered JSON objects. Store-native types use the Extended
//! JSON wrappers (`{"$oid": "..."}`, `{"$date": "..."}`, `{"$numberLong": "..."}`)
//! and are turned into portable values by [`sanitize`] before they leave the
//! engine.

mod extjson;
mod filter;
mod memory;
mod path;
mod pipeline;

pub use extjson::{
    compare_values, date_millis, new_object_id, sanitize, sanitize_document, type_of,
    values_equal, TypeTag, ID_FIELD,
};
pub use filter::matches;
pub use memory::MemoryStore;
pub use pipeline::{apply_projection, apply_sort, run_pipeline};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// A document: an ordered JSON object.
pub type Document = serde_json::Map<String, Value>;

/// Errors from a document store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid regular expression: {0}")]
    Regex(#[from] regex::Error),
    #[error("unsupported {0}")]
    Unsupported(String),
    #[error("invalid query: {0}")]
    InvalidQuery(String),
    #[error("cannot load {path}: {reason}")]
    Load { path: String, reason: String },
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Options for a `find` call.
#[derive(Debug, Clone, Default)]
pub struct FindOptions {
    pub filter: Document,
    /// `None` returns every field.
    pub projection: Option<Document>,
    pub sort: Option<Document>,
    /// `None` is unlimited.
    pub limit: Option<usize>,
}

/// Basic statistics for a collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionStats {
    pub name: String,
    pub document_count: u64,
}

/// A document database.
///
/// Implementations are shared between concurrent requests and must make
/// each individual operation safe to call concurrently.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Names of all collections.
    async fn list_collections(&self) -> Result<Vec<String>, StoreError>;

    /// A uniform random sample of up to `n` documents, without replacement.
    async fn sample_documents(&self, collection: &str, n: usize)
        -> Result<Vec<Document>, StoreError>;

    async fn count_documents(&self, collection: &str, filter: &Document)
        -> Result<u64, StoreError>;

    async fn find(&self, collection: &str, options: &FindOptions)
        -> Result<Vec<Document>, StoreError>;

    async fn aggregate(&self, collection: &str, pipeline: &[Document])
        -> Result<Vec<Document>, StoreError>;

    async fn distinct(
        &self,
        collection: &str,
        field: &str,
        filter: &Document,
    ) -> Result<Vec<Value>, StoreError>;

    async fn find_one(
        &self,
        collection: &str,
        filter: &Document,
        projection: Option<&Document>,
    ) -> Result<Option<Document>, StoreError>;

    async fn collection_stats(&self, collection: &str) -> Result<CollectionStats, StoreError> {
        let document_count = self.count_documents(collection, &Document::new()).await?;
        Ok(CollectionStats {
            name: collection.to_string(),
            document_count,
        })
    }
}
