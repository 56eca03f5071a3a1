//! Intent validation - ensure generator output is well-formed.

use serde_json::Value;
use thiserror::Error;

use crate::{
    AggregateQuery, CountQuery, DistinctQuery, Document, ErrorKind, FindQuery, Intent,
    IntentError, QueryType,
};

/// Validation errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("intent must be a JSON object")]
    NotAnObject,

    #[error("missing query_type")]
    MissingQueryType,

    #[error("unknown query_type: {0}")]
    UnknownQueryType(String),

    #[error("field '{field}' must be {expected}")]
    InvalidField {
        field: &'static str,
        expected: &'static str,
    },

    #[error("aggregation pipeline cannot be empty")]
    EmptyPipeline,

    #[error("pipeline stage {0} must be an object with exactly one '$' operator")]
    InvalidStage(usize),

    #[error("distinct query requires a non-empty field")]
    MissingField,

    #[error("unknown error_type: {0}")]
    UnknownErrorType(String),

    #[error("missing error_type")]
    MissingErrorType,
}

/// Validate a typed intent against the per-shape invariants.
pub fn validate(intent: &Intent) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    match intent {
        Intent::Aggregate(q) => {
            if q.pipeline.is_empty() {
                errors.push(ValidationError::EmptyPipeline);
            }
            for (i, stage) in q.pipeline.iter().enumerate() {
                let single_operator =
                    stage.len() == 1 && stage.keys().all(|k| k.starts_with('$'));
                if !single_operator {
                    errors.push(ValidationError::InvalidStage(i));
                }
            }
        }
        Intent::Distinct(q) => {
            if q.field.trim().is_empty() {
                errors.push(ValidationError::MissingField);
            }
        }
        Intent::Find(_) | Intent::Count(_) | Intent::Error(_) => {}
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Parse an untrusted JSON value into a validated intent.
///
/// Missing or `null` filters become `{}`; an empty projection becomes
/// "all fields". Unknown extra keys are ignored, so a `find` that also
/// carries `"pipeline": []` is accepted.
pub fn parse_intent(value: &Value) -> Result<Intent, Vec<ValidationError>> {
    let obj = value.as_object().ok_or_else(|| vec![ValidationError::NotAnObject])?;

    let query_type = match obj.get("query_type") {
        None | Some(Value::Null) => return Err(vec![ValidationError::MissingQueryType]),
        Some(Value::String(s)) => QueryType::parse(s)
            .ok_or_else(|| vec![ValidationError::UnknownQueryType(s.clone())])?,
        Some(other) => return Err(vec![ValidationError::UnknownQueryType(other.to_string())]),
    };

    let mut errors = Vec::new();

    let intent = match query_type {
        QueryType::Find => {
            let filter = document_field(obj, "filter", &mut errors).unwrap_or_default();
            let projection = document_field(obj, "projection", &mut errors).filter(|p| !p.is_empty());
            let sort = sort_field(obj, &mut errors);
            let limit = match obj.get("limit") {
                None | Some(Value::Null) => None,
                Some(v) => match integer(v) {
                    Some(n) => Some(n),
                    None => {
                        errors.push(ValidationError::InvalidField {
                            field: "limit",
                            expected: "an integer",
                        });
                        None
                    }
                },
            };
            Intent::Find(FindQuery {
                filter,
                projection,
                sort,
                limit,
            })
        }
        QueryType::Aggregate => {
            let pipeline = match obj.get("pipeline") {
                Some(Value::Array(stages)) => {
                    let mut out = Vec::with_capacity(stages.len());
                    for (i, stage) in stages.iter().enumerate() {
                        match stage.as_object() {
                            Some(s) => out.push(s.clone()),
                            None => errors.push(ValidationError::InvalidStage(i)),
                        }
                    }
                    out
                }
                None | Some(Value::Null) => Vec::new(),
                Some(_) => {
                    errors.push(ValidationError::InvalidField {
                        field: "pipeline",
                        expected: "an array of stages",
                    });
                    Vec::new()
                }
            };
            Intent::Aggregate(AggregateQuery { pipeline })
        }
        QueryType::Count => Intent::Count(CountQuery {
            filter: document_field(obj, "filter", &mut errors).unwrap_or_default(),
        }),
        QueryType::Distinct => {
            let field = match obj.get("field") {
                Some(Value::String(s)) => s.clone(),
                None | Some(Value::Null) => String::new(),
                Some(_) => {
                    errors.push(ValidationError::InvalidField {
                        field: "field",
                        expected: "a string",
                    });
                    String::new()
                }
            };
            Intent::Distinct(DistinctQuery {
                field,
                filter: document_field(obj, "filter", &mut errors).unwrap_or_default(),
            })
        }
        QueryType::Error => {
            let error_type = match obj.get("error_type") {
                Some(Value::String(s)) => match ErrorKind::parse(s) {
                    Some(kind) => kind,
                    None => return Err(vec![ValidationError::UnknownErrorType(s.clone())]),
                },
                _ => return Err(vec![ValidationError::MissingErrorType]),
            };
            let error_message = obj
                .get("error_message")
                .or_else(|| obj.get("error"))
                .and_then(|m| m.as_str())
                .map(str::to_string);
            Intent::Error(IntentError {
                error_type,
                error_message,
            })
        }
    };

    if let Err(mut shape_errors) = validate(&intent) {
        errors.append(&mut shape_errors);
    }

    if errors.is_empty() {
        Ok(intent)
    } else {
        Err(errors)
    }
}

fn document_field(
    obj: &Document,
    field: &'static str,
    errors: &mut Vec<ValidationError>,
) -> Option<Document> {
    match obj.get(field) {
        None | Some(Value::Null) => None,
        Some(Value::Object(map)) => Some(map.clone()),
        Some(_) => {
            errors.push(ValidationError::InvalidField {
                field,
                expected: "an object",
            });
            None
        }
    }
}

/// Accepts `{"field": 1}` or `[["field", 1], ...]`.
fn sort_field(obj: &Document, errors: &mut Vec<ValidationError>) -> Option<Document> {
    let invalid = ValidationError::InvalidField {
        field: "sort",
        expected: "an object or a list of [field, direction] pairs",
    };

    match obj.get("sort") {
        None | Some(Value::Null) => None,
        Some(Value::Object(map)) if map.is_empty() => None,
        Some(Value::Object(map)) => {
            if map.values().all(|d| direction(d).is_some()) {
                Some(map.clone())
            } else {
                errors.push(invalid);
                None
            }
        }
        Some(Value::Array(pairs)) => {
            let mut out = Document::new();
            for pair in pairs {
                match pair.as_array().map(|p| p.as_slice()) {
                    Some([Value::String(field), dir]) if direction(dir).is_some() => {
                        out.insert(field.clone(), Value::from(direction(dir).unwrap_or(1)));
                    }
                    _ => {
                        errors.push(invalid);
                        return None;
                    }
                }
            }
            (!out.is_empty()).then_some(out)
        }
        Some(_) => {
            errors.push(invalid);
            None
        }
    }
}

fn direction(value: &Value) -> Option<i64> {
    match integer(value) {
        Some(n) if n > 0 => Some(1),
        Some(n) if n < 0 => Some(-1),
        _ => match value.as_str() {
            Some("asc") | Some("ascending") => Some(1),
            Some("desc") | Some("descending") => Some(-1),
            _ => None,
        },
    }
}

fn integer(value: &Value) -> Option<i64> {
    value.as_i64().or_else(|| {
        value
            .as_f64()
            .filter(|f| f.fract() == 0.0 && f.is_finite())
            .map(|f| f as i64)
    })
}
