//! Info command - show version and effective configuration.

use docq_engine::{Backend, EngineConfig, OllamaClient};
use std::path::Path;

pub(crate) async fn run(data: &Path) -> miette::Result<()> {
    let config = EngineConfig::from_env();

    println!("docq - natural-language document queries");
    println!("=========================================");
    println!();
    println!("Version: {}", env!("CARGO_PKG_VERSION"));
    println!();

    println!("Components:");
    println!("  docq-intent  - Canonical query intents and validation");
    println!("  docq-store   - Document store and Extended JSON engine");
    println!("  docq-engine  - Schema sampling, resolution, execution, sessions");
    println!();

    println!("Configuration:");
    println!("  Data:          {}", data.display());
    println!("  Backend:       {}", config.backend.as_str());
    println!("  Endpoint:      {}", config.base_url);
    println!("  Model:         {}", config.model);
    println!(
        "  API key:       {}",
        if config.api_key.is_empty() { "not set" } else { "set" }
    );
    println!("  Sample size:   {}", config.schema_sample_size);
    println!("  Query limit:   {}", config.query_limit);
    println!("  Retries:       {}", config.max_retries);
    println!("  Excluded:      {}", config.excluded_fields.join(", "));
    if let Some(path) = &config.analytics_log {
        println!("  Analytics log: {}", path.display());
    }
    if config.backend == Backend::Ollama {
        match OllamaClient::from_config(&config).check_availability().await {
            Ok(()) => println!("  Ollama:        ready"),
            Err(e) => println!("  Ollama:        {}", e),
        }
    }
    if !config.is_valid() {
        println!();
        println!("Note: set DOCQ_API_KEY (or GROQ_API_KEY), or DOCQ_BACKEND=ollama");
    }

    Ok(())
}
