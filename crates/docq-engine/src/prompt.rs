//! Prompt construction for candidate-query generation.

use docq_store::Document;
use serde_json::Value;
use std::fmt::Write;

use crate::places::UsState;
use crate::schema::Schema;
use crate::session::SessionContext;

/// Fields listed in the prompt, in schema order.
pub const MAX_PROMPT_FIELDS: usize = 15;

/// Type tags shown per field.
const MAX_FIELD_TYPES: usize = 3;

/// Everything the prompt is grounded on.
#[derive(Debug, Clone, Copy)]
pub struct PromptInput<'a> {
    pub user_text: &'a str,
    pub collection: &'a str,
    pub schema: &'a Schema,
    /// Sanitized sample document; empty when none could be fetched.
    pub sample: &'a Document,
    pub context: Option<&'a SessionContext>,
    pub state: Option<UsState>,
}

/// Output rules, in the order the model sees them.
const RULES: &str = r#"Instructions:
- Always output ONLY a single JSON object with keys: query_type, filter, projection, pipeline, or error_type as appropriate. DO NOT return code, explanations, or extra text.
- If the user asks for customers in a US state, convert the state name to its two-letter postal abbreviation before searching the address field. Recognize variations like 'customers from', 'customers living in', etc. For example, if the user asks for 'Customers in California', output:
{"query_type": "find", "filter": {"address": {"$regex": "\\bCA\\b", "$options": "i"}}, "projection": {}, "pipeline": []}
- If the user asks for a location that is not a real US state, return: {"query_type": "error", "error_type": "impossible"}
- If the user asks 'How many customers are there?', output:
{"query_type": "count", "filter": {}}
- If the user asks 'How many customers are there in California?', output:
{"query_type": "count", "filter": {"address": {"$regex": "\\bCA\\b", "$options": "i"}}}
- If the user says 'Show only their names' after a previous filter, output a find query with the same filter and a projection for only the 'name' field.
- If the user asks for accounts with a balance > 10000, output:
{"query_type": "find", "filter": {"balance": {"$gt": 10000}}, "projection": {}, "pipeline": []}
- If the user says 'Show ...' or 'List ...', always generate a 'find' query with an appropriate filter and projection.
- If the user says 'How many ...', always generate a 'count' query with the appropriate filter.
- If the user asks 'How many are there?' after a previous filter, output a count query with the same filter as the previous turn.
- If the user asks for a field that does not exist, return: {"query_type": "error", "error_type": "impossible"}
- If the user uses references like 'these', 'them', or 'their', resolve them with the previous filter, query type and projection. If still ambiguous, return: {"query_type": "error", "error_type": "ambiguous"}
- For a field subset (e.g. 'Show only their names'), use the 'projection' key to return only those fields.
- For grouping or aggregation, use query_type 'aggregate' with a non-empty 'pipeline'.
- For distinct values, use query_type 'distinct' and put the field name in 'field'.
- If you cannot generate a valid query, return: {"query_type": "error", "error_type": "impossible"}
- Never return explanations, only the JSON object as described.
"#;

/// Build the grounding prompt.
pub fn build_prompt(input: &PromptInput<'_>) -> String {
    let mut prompt = String::from("You are an expert MongoDB query generator.\n");

    if let Some(context) = input.context {
        prompt.push_str(&context_facts(context));
    }

    let _ = writeln!(prompt, "User question: '{}'", input.user_text);
    let _ = writeln!(prompt, "Collection: {}", input.collection);

    if let Some(state) = input.state {
        let _ = writeln!(
            prompt,
            "Location hint: '{}' is the US state with postal code {}.",
            state.name, state.code
        );
    }

    prompt.push_str("Available fields:\n");
    for (path, info) in input.schema.fields.iter().take(MAX_PROMPT_FIELDS) {
        let types: Vec<&str> = info
            .types
            .iter()
            .take(MAX_FIELD_TYPES)
            .map(|t| t.as_str())
            .collect();
        let _ = write!(prompt, "- {} ({})", path, types.join(", "));
        if let Some(example) = &info.example {
            let _ = write!(prompt, " e.g. {}", example);
        }
        prompt.push('\n');
    }

    let _ = writeln!(prompt, "Data format example: {}", sample_json(input.sample));
    prompt.push_str(RULES);
    prompt
}

/// "Previous ..." lines for the non-empty parts of a session context.
fn context_facts(context: &SessionContext) -> String {
    let mut facts = String::new();
    if let Some(filter) = context.last_filter.as_ref().filter(|f| !f.is_empty()) {
        let _ = writeln!(facts, "Previous filter: {}", Value::Object(filter.clone()));
    }
    if let Some(query_type) = context.last_query_type {
        let _ = writeln!(facts, "Previous query type: {}", query_type);
    }
    if let Some(projection) = context.last_projection.as_ref().filter(|p| !p.is_empty()) {
        let _ = writeln!(facts, "Previous projection: {}", Value::Object(projection.clone()));
    }
    facts
}

fn sample_json(sample: &Document) -> String {
    let value = if sample.is_empty() {
        serde_json::json!({"error": "No sample document available"})
    } else {
        Value::Object(sample.clone())
    };
    serde_json::to_string_pretty(&value).unwrap_or_else(|_| value.to_string())
}
