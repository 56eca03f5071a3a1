//! In-memory document store.

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

use crate::extjson::{new_object_id, values_equal, ID_FIELD};
use crate::filter::matches;
use crate::pipeline::{apply_projection, apply_sort, run_pipeline};
use crate::{path, Document, DocumentStore, FindOptions, StoreError};

/// A document store held entirely in memory.
///
/// Collections are loaded from Extended JSON files: a `.json` file holding an
/// array of documents, or a `.jsonl` file with one document per line. The
/// collection name is the file stem. Unknown collections read as empty.
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: DashMap<String, Vec<Document>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a single collection file, or every collection file in a directory.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let store = Self::new();
        if path.is_dir() {
            let mut entries: Vec<_> = fs::read_dir(path)?
                .filter_map(|e| e.ok().map(|e| e.path()))
                .filter(|p| is_collection_file(p))
                .collect();
            entries.sort();
            for entry in entries {
                store.load_file(&entry)?;
            }
        } else {
            store.load_file(path)?;
        }
        info!(
            "Loaded {} collection(s) from {}",
            store.collections.len(),
            path.display()
        );
        Ok(store)
    }

    /// Load one file into the collection named after its stem.
    pub fn load_file(&self, path: &Path) -> Result<usize, StoreError> {
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| StoreError::Load {
                path: path.display().to_string(),
                reason: "file has no usable name".into(),
            })?
            .to_string();
        let text = fs::read_to_string(path)?;
        let is_lines = path.extension().and_then(|e| e.to_str()) == Some("jsonl");
        let docs = if is_lines {
            parse_lines(&text, path)?
        } else {
            parse_array(&text, path)?
        };
        debug!("Loaded {} document(s) into '{}'", docs.len(), name);
        Ok(self.insert_many(&name, docs))
    }

    /// Append documents to a collection, assigning `_id` where missing.
    pub fn insert_many(&self, collection: &str, docs: Vec<Document>) -> usize {
        let count = docs.len();
        let mut target = self.collections.entry(collection.to_string()).or_default();
        for mut doc in docs {
            if !doc.contains_key(ID_FIELD) {
                // Keep `_id` first.
                let mut with_id = Document::new();
                with_id.insert(ID_FIELD.to_string(), new_object_id());
                with_id.extend(std::mem::take(&mut doc));
                doc = with_id;
            }
            target.push(doc);
        }
        count
    }

    /// Snapshot of a collection.
    fn snapshot(&self, collection: &str) -> Vec<Document> {
        self.collections
            .get(collection)
            .map(|docs| docs.value().clone())
            .unwrap_or_default()
    }

    fn filtered(&self, collection: &str, filter: &Document) -> Result<Vec<Document>, StoreError> {
        let mut out = Vec::new();
        for doc in self.snapshot(collection) {
            if matches(&doc, filter)? {
                out.push(doc);
            }
        }
        Ok(out)
    }
}

fn is_collection_file(path: &Path) -> bool {
    path.is_file()
        && matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("json") | Some("jsonl")
        )
}

fn load_error(path: &Path, reason: impl Into<String>) -> StoreError {
    StoreError::Load {
        path: path.display().to_string(),
        reason: reason.into(),
    }
}

fn parse_array(text: &str, path: &Path) -> Result<Vec<Document>, StoreError> {
    match serde_json::from_str::<Value>(text)? {
        Value::Array(items) => items
            .into_iter()
            .enumerate()
            .map(|(i, item)| match item {
                Value::Object(doc) => Ok(doc),
                _ => Err(load_error(path, format!("element {i} is not a document"))),
            })
            .collect(),
        Value::Object(doc) => Ok(vec![doc]),
        _ => Err(load_error(path, "expected an array of documents")),
    }
}

fn parse_lines(text: &str, path: &Path) -> Result<Vec<Document>, StoreError> {
    let mut docs = Vec::new();
    for (n, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<Value>(line) {
            Ok(Value::Object(doc)) => docs.push(doc),
            Ok(_) => return Err(load_error(path, format!("line {} is not a document", n + 1))),
            Err(e) => return Err(load_error(path, format!("line {}: {}", n + 1, e))),
        }
    }
    Ok(docs)
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn list_collections(&self) -> Result<Vec<String>, StoreError> {
        let mut names: Vec<String> = self.collections.iter().map(|e| e.key().clone()).collect();
        names.sort();
        Ok(names)
    }

    async fn sample_documents(
        &self,
        collection: &str,
        n: usize,
    ) -> Result<Vec<Document>, StoreError> {
        let docs = self.snapshot(collection);
        let amount = n.min(docs.len());
        Ok(rand::seq::index::sample(&mut rand::rng(), docs.len(), amount)
            .into_iter()
            .map(|i| docs[i].clone())
            .collect())
    }

    async fn count_documents(&self, collection: &str, filter: &Document) -> Result<u64, StoreError> {
        Ok(self.filtered(collection, filter)?.len() as u64)
    }

    async fn find(
        &self,
        collection: &str,
        options: &FindOptions,
    ) -> Result<Vec<Document>, StoreError> {
        let mut docs = self.filtered(collection, &options.filter)?;
        if let Some(sort) = &options.sort {
            apply_sort(&mut docs, sort)?;
        }
        if let Some(limit) = options.limit {
            docs.truncate(limit);
        }
        match &options.projection {
            Some(projection) => docs
                .iter()
                .map(|d| apply_projection(d, projection))
                .collect(),
            None => Ok(docs),
        }
    }

    async fn aggregate(
        &self,
        collection: &str,
        pipeline: &[Document],
    ) -> Result<Vec<Document>, StoreError> {
        run_pipeline(self.snapshot(collection), pipeline)
    }

    async fn distinct(
        &self,
        collection: &str,
        field: &str,
        filter: &Document,
    ) -> Result<Vec<Value>, StoreError> {
        let mut out: Vec<Value> = Vec::new();
        for doc in self.filtered(collection, filter)? {
            for value in path::lookup(&doc, field) {
                let items = match value {
                    Value::Array(items) => items.iter().collect(),
                    single => vec![single],
                };
                for item in items {
                    if !out.iter().any(|seen| values_equal(seen, item)) {
                        out.push(item.clone());
                    }
                }
            }
        }
        Ok(out)
    }

    async fn find_one(
        &self,
        collection: &str,
        filter: &Document,
        projection: Option<&Document>,
    ) -> Result<Option<Document>, StoreError> {
        let found = self
            .snapshot(collection)
            .into_iter()
            .find_map(|doc| match matches(&doc, filter) {
                Ok(true) => Some(Ok(doc)),
                Ok(false) => None,
                Err(e) => Some(Err(e)),
            })
            .transpose()?;
        match (found, projection) {
            (Some(doc), Some(projection)) => Ok(Some(apply_projection(&doc, projection)?)),
            (found, _) => Ok(found),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    fn store() -> MemoryStore {
        let store = MemoryStore::new();
        store.insert_many(
            "customers",
            vec![
                doc(json!({"_id": 1, "name": "Ann", "address": "1 Main St\nAlbany, NY 12207", "tags": ["gold", "new"]})),
                doc(json!({"_id": 2, "name": "Bob", "address": "9 Elm Rd\nFresno, CA 93650", "tags": ["gold"]})),
                doc(json!({"_id": 3, "name": "Cid", "address": "4 Oak Ave\nAustin, TX 73301"})),
            ],
        );
        store
    }

    #[tokio::test]
    async fn test_find_sort_limit_projection() {
        let options = FindOptions {
            filter: Document::new(),
            projection: Some(doc(json!({"name": 1, "_id": 0}))),
            sort: Some(doc(json!({"name": -1}))),
            limit: Some(2),
        };
        let out = store().find("customers", &options).await.unwrap();
        assert_eq!(
            out.into_iter().map(Value::Object).collect::<Vec<_>>(),
            vec![json!({"name": "Cid"}), json!({"name": "Bob"})]
        );
    }

    #[tokio::test]
    async fn test_count_and_distinct() {
        let s = store();
        let ny = doc(json!({"address": {"$regex": "\\bNY\\b"}}));
        assert_eq!(s.count_documents("customers", &ny).await.unwrap(), 1);
        let tags = s.distinct("customers", "tags", &Document::new()).await.unwrap();
        assert_eq!(tags, vec![json!("gold"), json!("new")]);
    }

    #[tokio::test]
    async fn test_unknown_collection_is_empty() {
        let s = store();
        assert_eq!(s.count_documents("nope", &Document::new()).await.unwrap(), 0);
        assert!(s.sample_documents("nope", 10).await.unwrap().is_empty());
        assert!(s.find_one("nope", &Document::new(), None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_sample_is_without_replacement() {
        let sample = store().sample_documents("customers", 10).await.unwrap();
        assert_eq!(sample.len(), 3);
        let mut ids: Vec<i64> = sample.iter().map(|d| d["_id"].as_i64().unwrap()).collect();
        ids.sort();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_find_one_with_projection() {
        let found = store()
            .find_one("customers", &Document::new(), Some(&doc(json!({"_id": 0}))))
            .await
            .unwrap()
            .unwrap();
        assert!(found.get("_id").is_none());
        assert_eq!(found["name"], "Ann");
    }

    #[tokio::test]
    async fn test_load_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("accounts.json"),
            r#"[{"account_id": 371138, "limit": 9000}, {"account_id": 324287, "limit": 10000}]"#,
        )
        .unwrap();
        let mut lines = std::fs::File::create(dir.path().join("events.jsonl")).unwrap();
        writeln!(lines, r#"{{"kind": "login"}}"#).unwrap();
        writeln!(lines).unwrap();
        writeln!(lines, r#"{{"kind": "logout"}}"#).unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let store = MemoryStore::from_path(dir.path()).unwrap();
        assert_eq!(store.list_collections().await.unwrap(), vec!["accounts", "events"]);
        let events = store.find("events", &FindOptions::default()).await.unwrap();
        assert_eq!(events.len(), 2);
        // Generated identifiers come first.
        assert_eq!(events[0].keys().next().map(String::as_str), Some("_id"));
    }

    #[tokio::test]
    async fn test_load_rejects_non_documents() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("bad.json");
        std::fs::write(&file, "[1, 2]").unwrap();
        let err = MemoryStore::from_path(&file).unwrap_err();
        assert!(matches!(err, StoreError::Load { .. }));
    }
}
