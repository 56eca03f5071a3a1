//! Schema command - show what a collection sample looks like.

use docq_engine::{EngineConfig, SampleDocumentProvider, SchemaSampler};
use std::path::Path;

use super::open_store;

pub(crate) async fn run(
    data: &Path,
    collection: &str,
    sample_size: usize,
    samples: usize,
    json: bool,
) -> miette::Result<()> {
    let store = open_store(data)?;
    let sampler = SchemaSampler::new(store.clone());

    let schema = sampler
        .extract_schema(collection, sample_size)
        .await
        .map_err(|e| miette::miette!("Schema error: {}", e))?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&schema)
                .map_err(|e| miette::miette!("Failed to render schema: {}", e))?
        );
    } else {
        println!(
            "Collection '{}': {} document(s), sampled {}\n",
            schema.collection_name, schema.total_documents, schema.sample_size
        );
        let width = schema.fields.keys().map(|k| k.len()).max().unwrap_or(5).max(5);
        println!("{:<width$}  {:>9}  TYPES", "FIELD", "FREQUENCY");
        for (path, info) in &schema.fields {
            let types: Vec<&str> = info.types.iter().map(|t| t.as_str()).collect();
            println!(
                "{:<width$}  {:>8.1}%  {}",
                path,
                info.frequency * 100.0,
                types.join(", ")
            );
        }
    }

    if samples > 0 {
        let provider = SampleDocumentProvider::new(store, EngineConfig::from_env().excluded_fields);
        println!("\nSample documents:");
        for doc in provider.sample_documents(collection, samples).await {
            println!(
                "{}",
                serde_json::to_string_pretty(&doc)
                    .map_err(|e| miette::miette!("Failed to render document: {}", e))?
            );
        }
    }

    Ok(())
}
