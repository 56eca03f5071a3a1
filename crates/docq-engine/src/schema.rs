//! Schema inference from a random collection sample.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use docq_store::{sanitize, type_of, Document, DocumentStore, StoreError, TypeTag, ID_FIELD};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

/// Objects nested deeper than this are recorded but not descended into.
pub const MAX_SCHEMA_DEPTH: usize = 32;

/// Inferred structure of a collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    pub collection_name: String,
    pub total_documents: u64,
    pub sample_size: usize,
    /// Field paths in first-seen order. Nested objects use dotted paths and
    /// array-of-object elements use a `[]` suffix (`items[].sku`).
    pub fields: IndexMap<String, FieldInfo>,
    pub extracted_at: DateTime<Utc>,
}

/// What the sample says about one field path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldInfo {
    pub types: BTreeSet<TypeTag>,
    pub occurrence_count: usize,
    /// `occurrence_count / sample_size`
    pub frequency: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub example: Option<Value>,
}

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("No documents found in collection {0}")]
    CollectionEmpty(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone)]
struct CacheEntry {
    schema: Schema,
    last_updated: DateTime<Utc>,
}

/// Samples collections and infers their schema.
pub struct SchemaSampler {
    store: Arc<dyn DocumentStore>,
    cache: DashMap<String, CacheEntry>,
}

impl SchemaSampler {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            cache: DashMap::new(),
        }
    }

    /// Sample up to `sample_size` documents and infer field types and
    /// frequencies. Either returns a complete schema or an error.
    pub async fn extract_schema(
        &self,
        collection: &str,
        sample_size: usize,
    ) -> Result<Schema, SchemaError> {
        let total = self
            .store
            .count_documents(collection, &Document::new())
            .await?;
        if total == 0 {
            return Err(SchemaError::CollectionEmpty(collection.to_string()));
        }

        let wanted = sample_size.max(1).min(total as usize);
        let sample = self.store.sample_documents(collection, wanted).await?;
        if sample.is_empty() {
            return Err(SchemaError::CollectionEmpty(collection.to_string()));
        }

        let mut fields: IndexMap<String, FieldInfo> = IndexMap::new();
        for doc in &sample {
            analyze_document(doc, "", 0, &mut fields);
        }

        let sample_len = sample.len();
        for info in fields.values_mut() {
            info.frequency = info.occurrence_count as f64 / sample_len as f64;
        }

        let schema = Schema {
            collection_name: collection.to_string(),
            total_documents: total,
            sample_size: sample_len,
            fields,
            extracted_at: Utc::now(),
        };
        info!(
            "Extracted schema for '{}': {} field(s) from {} of {} document(s)",
            collection,
            schema.fields.len(),
            sample_len,
            total
        );

        self.cache.insert(
            collection.to_string(),
            CacheEntry {
                schema: schema.clone(),
                last_updated: Utc::now(),
            },
        );
        Ok(schema)
    }

    /// Most recent schema extracted for a collection, with its timestamp.
    pub fn cached(&self, collection: &str) -> Option<(Schema, DateTime<Utc>)> {
        self.cache
            .get(collection)
            .map(|entry| (entry.schema.clone(), entry.last_updated))
    }
}

fn analyze_document(
    doc: &Document,
    prefix: &str,
    depth: usize,
    fields: &mut IndexMap<String, FieldInfo>,
) {
    for (key, value) in doc {
        if key == ID_FIELD {
            continue;
        }
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };

        let tag = type_of(value);
        let info = fields.entry(path.clone()).or_insert_with(|| FieldInfo {
            types: BTreeSet::new(),
            occurrence_count: 0,
            frequency: 0.0,
            example: None,
        });
        info.occurrence_count += 1;
        info.types.insert(tag);
        if tag.is_primitive() && info.example.is_none() && !value.is_null() {
            info.example = Some(sanitize(value.clone()));
        }

        if depth + 1 >= MAX_SCHEMA_DEPTH {
            if tag == TypeTag::Object || tag == TypeTag::Array {
                debug!("Schema walk stopped at depth {} for '{}'", depth, path);
            }
            continue;
        }
        match value {
            Value::Array(items) => {
                if let Some(Value::Object(first)) = items.first() {
                    if type_of(&items[0]) == TypeTag::Object {
                        analyze_document(first, &format!("{path}[]"), depth + 1, fields);
                    }
                }
            }
            Value::Object(inner) if tag == TypeTag::Object => {
                analyze_document(inner, &path, depth + 1, fields);
            }
            _ => {}
        }
    }
}
