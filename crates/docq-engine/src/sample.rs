//! Representative documents for prompt grounding and display.

use docq_store::{sanitize_document, Document, DocumentStore, ID_FIELD};
use std::sync::Arc;
use tracing::warn;

/// Fetches sample documents. Never fails: errors yield empty results.
pub struct SampleDocumentProvider {
    store: Arc<dyn DocumentStore>,
    excluded_fields: Vec<String>,
}

impl SampleDocumentProvider {
    pub fn new(store: Arc<dyn DocumentStore>, excluded_fields: Vec<String>) -> Self {
        Self {
            store,
            excluded_fields,
        }
    }

    /// One document without `_id` or any excluded field, sanitized.
    pub async fn sample_document(&self, collection: &str) -> Document {
        let mut projection = Document::new();
        projection.insert(ID_FIELD.to_string(), 0.into());

        match self
            .store
            .find_one(collection, &Document::new(), Some(&projection))
            .await
        {
            Ok(Some(mut doc)) => {
                for field in &self.excluded_fields {
                    doc.shift_remove(field);
                }
                doc.shift_remove(ID_FIELD);
                sanitize_document(doc)
            }
            Ok(None) => Document::new(),
            Err(e) => {
                warn!("Could not fetch sample document from '{}': {}", collection, e);
                Document::new()
            }
        }
    }

    /// Up to `limit` sanitized documents.
    pub async fn sample_documents(&self, collection: &str, limit: usize) -> Vec<Document> {
        match self.store.sample_documents(collection, limit).await {
            Ok(docs) => docs.into_iter().map(sanitize_document).collect(),
            Err(e) => {
                warn!("Could not fetch sample documents from '{}': {}", collection, e);
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use docq_store::{FindOptions, MemoryStore, StoreError};
    use serde_json::{json, Value};

    /// Every operation fails as if the server were down.
    struct DownStore;

    fn down<T>() -> Result<T, StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }

    #[async_trait]
    impl DocumentStore for DownStore {
        async fn list_collections(&self) -> Result<Vec<String>, StoreError> {
            down()
        }

        async fn sample_documents(&self, _: &str, _: usize) -> Result<Vec<Document>, StoreError> {
            down()
        }

        async fn count_documents(&self, _: &str, _: &Document) -> Result<u64, StoreError> {
            down()
        }

        async fn find(&self, _: &str, _: &FindOptions) -> Result<Vec<Document>, StoreError> {
            down()
        }

        async fn aggregate(&self, _: &str, _: &[Document]) -> Result<Vec<Document>, StoreError> {
            down()
        }

        async fn distinct(&self, _: &str, _: &str, _: &Document) -> Result<Vec<Value>, StoreError> {
            down()
        }

        async fn find_one(
            &self,
            _: &str,
            _: &Document,
            _: Option<&Document>,
        ) -> Result<Option<Document>, StoreError> {
            down()
        }
    }

    fn provider() -> SampleDocumentProvider {
        let store = MemoryStore::new();
        store.insert_many(
            "customers",
            vec![json!({
                "_id": {"$oid": "5ca4bbcc2dd94ee58162a6a1"},
                "name": "Elizabeth Ray",
                "tier_and_details": {"gold": {"tier": "Gold"}},
                "birthdate": {"$date": "1977-03-02T02:20:31Z"}
            })
            .as_object()
            .cloned()
            .unwrap()],
        );
        SampleDocumentProvider::new(Arc::new(store), vec!["tier_and_details".to_string()])
    }

    #[tokio::test]
    async fn test_sample_document_strips_internal_fields() {
        let doc = provider().sample_document("customers").await;
        assert_eq!(
            Value::Object(doc),
            json!({"name": "Elizabeth Ray", "birthdate": "1977-03-02T02:20:31.000Z"})
        );
    }

    #[tokio::test]
    async fn test_missing_collection_is_empty() {
        let p = provider();
        assert!(p.sample_document("nope").await.is_empty());
        assert!(p.sample_documents("nope", 5).await.is_empty());
    }

    #[tokio::test]
    async fn test_sample_documents_sanitized() {
        let docs = provider().sample_documents("customers", 5).await;
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0]["_id"], "5ca4bbcc2dd94ee58162a6a1");
    }

    #[tokio::test]
    async fn test_store_failure_is_empty() {
        let p = SampleDocumentProvider::new(Arc::new(DownStore), Vec::new());
        assert!(p.sample_document("customers").await.is_empty());
        assert!(p.sample_documents("customers", 5).await.is_empty());
    }
}
