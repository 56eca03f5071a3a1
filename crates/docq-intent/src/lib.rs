//! # docq Query Intents
//!
//! An intent is the canonical form of a user's question once it has been
//! translated into a document-database query. The query generator emits
//! intents as JSON; this crate defines their shape and the validation that
//! every generated object has to pass before it may reach an executor.
//!
//! ## Shapes
//!
//! Exactly one shape is valid per `query_type`:
//!
//! ```json
//! {"query_type": "find", "filter": {"state": "NY"}, "projection": {"name": 1}}
//! {"query_type": "aggregate", "pipeline": [{"$group": {"_id": "$state", "n": {"$sum": 1}}}]}
//! {"query_type": "count", "filter": {}}
//! {"query_type": "distinct", "field": "state", "filter": {}}
//! {"query_type": "error", "error_type": "impossible", "error_message": "..."}
//! ```
//!
//! ## Design Goals
//!
//! - **Closed**: only four query shapes plus a structured error
//! - **Validated**: untrusted generator output goes through [`parse_intent`]
//! - **Serializable**: the JSON form is the wire and analytics format

mod intent;
mod validation;

pub use intent::*;
pub use validation::*;

/// A document as seen by intents: an ordered JSON object.
pub type Document = serde_json::Map<String, serde_json::Value>;
