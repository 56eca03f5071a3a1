//! Intent resolution: deterministic gates, prompt, generation, validation.

use docq_intent::{parse_intent, ErrorKind, Intent};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::generator::QueryGenerator;
use crate::places::{find_state, mentions_customer_location};
use crate::prompt::{build_prompt, PromptInput};
use crate::sample::SampleDocumentProvider;
use crate::schema::SchemaSampler;
use crate::session::SessionContext;

/// Characters of unusable model output quoted back in the error.
const EXCERPT_CHARS: usize = 100;

/// Turns a user utterance into a canonical [`Intent`].
pub struct IntentResolver {
    sampler: Arc<SchemaSampler>,
    samples: Arc<SampleDocumentProvider>,
    generator: Arc<dyn QueryGenerator>,
    sample_size: usize,
}

impl IntentResolver {
    pub fn new(
        sampler: Arc<SchemaSampler>,
        samples: Arc<SampleDocumentProvider>,
        generator: Arc<dyn QueryGenerator>,
        sample_size: usize,
    ) -> Self {
        Self {
            sampler,
            samples,
            generator,
            sample_size,
        }
    }

    /// Resolve `user_text` against `collection`.
    ///
    /// Never fails: every problem is reported as an error intent. The schema
    /// and location gates answer without calling the generator.
    pub async fn resolve(
        &self,
        user_text: &str,
        collection: &str,
        context: Option<&SessionContext>,
    ) -> Intent {
        info!("Resolving query for '{}': {}", collection, user_text);

        // 1. Schema gate
        let schema = match self.sampler.extract_schema(collection, self.sample_size).await {
            Ok(schema) => schema,
            Err(e) => {
                warn!("Schema gate rejected query: {}", e);
                return Intent::error(ErrorKind::Schema, format!("Schema error: {e}"));
            }
        };

        // 2. Location gate
        let state = if mentions_customer_location(user_text) {
            match find_state(user_text) {
                Some(state) => {
                    debug!("Recognized state {} ({})", state.name, state.code);
                    Some(state)
                }
                None => {
                    info!("Location gate rejected query: no US state named");
                    return Intent::error(
                        ErrorKind::Impossible,
                        "No such US state found in query.",
                    );
                }
            }
        } else {
            None
        };

        // 3. Prompt with context facts
        let sample = self.samples.sample_document(collection).await;
        let prompt = build_prompt(&PromptInput {
            user_text,
            collection,
            schema: &schema,
            sample: &sample,
            context,
            state,
        });

        // 4. Generate
        debug!("Calling query generator ({} byte prompt)", prompt.len());
        let text = match self.generator.generate(&prompt).await {
            Ok(text) => text,
            Err(e) => {
                warn!("Query generation failed: {}", e);
                return Intent::error(ErrorKind::Processing, format!("LLM processing failed: {e}"));
            }
        };
        debug!("Generator output: {}", text);

        // 5. Parse and validate
        let intent = interpret_response(&text);
        info!("Resolved intent: {}", intent);
        intent
    }
}

/// Turn raw generator output into an intent.
pub fn interpret_response(text: &str) -> Intent {
    let content = strip_code_fence(text.trim());
    if content.is_empty() || !content.starts_with('{') {
        let excerpt: String = content.chars().take(EXCERPT_CHARS).collect();
        return Intent::error(
            ErrorKind::Processing,
            format!("LLM returned no valid JSON: {excerpt}"),
        );
    }

    let value: Value = match serde_json::from_str(content) {
        Ok(value) => value,
        Err(e) => {
            return Intent::error(ErrorKind::Processing, format!("LLM processing failed: {e}"))
        }
    };

    match parse_intent(&value) {
        Ok(intent) => intent,
        Err(errors) => {
            let messages = errors
                .iter()
                .map(|e| e.to_string())
                .collect::<Vec<_>>()
                .join(", ");
            Intent::error(
                ErrorKind::Processing,
                format!("LLM returned an invalid query: {messages}"),
            )
        }
    }
}

/// Contents of the first fenced code block, or the input when there is none.
fn strip_code_fence(text: &str) -> &str {
    let Some(start) = text.find("```") else {
        return text;
    };
    let body = &text[start + 3..];
    let body = body
        .trim_start_matches([' ', '\t'])
        .trim_start_matches(|c: char| c.is_ascii_alphanumeric());
    match body.find("```") {
        Some(end) => body[..end].trim(),
        None => text,
    }
}
