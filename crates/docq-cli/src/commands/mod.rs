//! CLI commands.

pub mod chat;
pub mod collections;
pub mod info;
pub mod query;
pub mod schema;

use docq_engine::{Agent, EngineConfig, QueryResponse};
use docq_store::{DocumentStore, MemoryStore};
use std::path::Path;
use std::sync::Arc;

/// Open the collection store. Failure here is fatal.
pub(crate) fn open_store(data: &Path) -> miette::Result<Arc<dyn DocumentStore>> {
    let store = MemoryStore::from_path(data)
        .map_err(|e| miette::miette!("Failed to open data at {}: {}", data.display(), e))?;
    Ok(Arc::new(store))
}

/// Build an agent from environment configuration.
pub(crate) fn build_agent(data: &Path) -> miette::Result<Agent> {
    let config = EngineConfig::from_env();
    let store = open_store(data)?;
    Agent::from_config(&config, store).map_err(|e| miette::miette!("{}", e))
}

/// Print a response as pretty JSON.
pub(crate) fn print_response(response: &QueryResponse) -> miette::Result<()> {
    let text = serde_json::to_string_pretty(response)
        .map_err(|e| miette::miette!("Failed to render response: {}", e))?;
    println!("{}", text);
    Ok(())
}
