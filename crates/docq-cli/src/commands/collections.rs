//! Collections command - list collections with document counts.

use std::path::Path;

use super::open_store;

pub(crate) async fn run(data: &Path) -> miette::Result<()> {
    let store = open_store(data)?;
    let names = store
        .list_collections()
        .await
        .map_err(|e| miette::miette!("Failed to list collections: {}", e))?;

    if names.is_empty() {
        println!("No collections found in {}", data.display());
        return Ok(());
    }

    for name in names {
        let stats = store
            .collection_stats(&name)
            .await
            .map_err(|e| miette::miette!("Failed to read '{}': {}", name, e))?;
        println!("{:<24} {:>8} document(s)", stats.name, stats.document_count);
    }

    Ok(())
}
