//! Projection, sort and aggregation pipeline evaluation.

use indexmap::IndexMap;
use serde_json::{Number, Value};

use crate::extjson::{is_wrapper, number, sort_cmp, type_of, values_equal, TypeTag, ID_FIELD};
use crate::filter::matches;
use crate::{path, Document, StoreError};

/// Apply a projection document.
///
/// An empty projection returns the document unchanged. Inclusion and
/// exclusion cannot be mixed, except for `_id`, which is included unless
/// explicitly excluded. Non-flag values are evaluated as expressions.
pub fn apply_projection(doc: &Document, projection: &Document) -> Result<Document, StoreError> {
    if projection.is_empty() {
        return Ok(doc.clone());
    }

    let mut include_id = true;
    let mut inclusions: Vec<(&str, Option<&Value>)> = Vec::new();
    let mut exclusions: Vec<&str> = Vec::new();

    for (field, spec) in projection {
        let flag = match spec {
            Value::Bool(b) => Some(*b),
            Value::Number(n) => Some(n.as_f64().is_some_and(|f| f != 0.0)),
            _ => None,
        };
        match flag {
            Some(keep) if field == ID_FIELD => include_id = keep,
            Some(true) => inclusions.push((field, None)),
            Some(false) => exclusions.push(field),
            None => inclusions.push((field, Some(spec))),
        }
    }

    if !inclusions.is_empty() && !exclusions.is_empty() {
        return Err(StoreError::InvalidQuery(
            "cannot mix inclusion and exclusion in a projection".into(),
        ));
    }

    if !exclusions.is_empty() || (inclusions.is_empty() && !include_id) {
        let mut out = doc.clone();
        for field in exclusions {
            path::remove(&mut out, field);
        }
        if !include_id {
            out.shift_remove(ID_FIELD);
        }
        return Ok(out);
    }

    let mut out = Document::new();
    if include_id {
        if let Some(id) = doc.get(ID_FIELD) {
            out.insert(ID_FIELD.to_string(), id.clone());
        }
    }
    for (field, expr) in inclusions {
        match expr {
            None => {
                if let Some(value) = path::first(doc, field) {
                    path::set(&mut out, field, value.clone());
                }
            }
            Some(expr) => path::set(&mut out, field, eval_expr(doc, expr)?),
        }
    }
    Ok(out)
}

/// Sort documents in place by a sort document (`{"field": 1 | -1, ...}`).
pub fn apply_sort(docs: &mut [Document], sort: &Document) -> Result<(), StoreError> {
    let mut keys = Vec::with_capacity(sort.len());
    for (field, direction) in sort {
        let descending = match direction.as_i64() {
            Some(1) => false,
            Some(-1) => true,
            _ => {
                return Err(StoreError::InvalidQuery(format!(
                    "sort direction for '{field}' must be 1 or -1"
                )))
            }
        };
        keys.push((field.as_str(), descending));
    }

    docs.sort_by(|a, b| {
        for (field, descending) in &keys {
            let left = path::first(a, field).unwrap_or(&Value::Null);
            let right = path::first(b, field).unwrap_or(&Value::Null);
            let ordering = sort_cmp(left, right);
            let ordering = if *descending {
                ordering.reverse()
            } else {
                ordering
            };
            if ordering.is_ne() {
                return ordering;
            }
        }
        std::cmp::Ordering::Equal
    });
    Ok(())
}

/// Run an aggregation pipeline over a collection snapshot.
pub fn run_pipeline(
    mut docs: Vec<Document>,
    pipeline: &[Document],
) -> Result<Vec<Document>, StoreError> {
    for stage in pipeline {
        let (name, spec) = match stage.iter().next() {
            Some(entry) if stage.len() == 1 => entry,
            _ => {
                return Err(StoreError::InvalidQuery(
                    "each pipeline stage must have exactly one operator".into(),
                ))
            }
        };

        docs = match name.as_str() {
            "$match" => {
                let filter = stage_doc(spec, name)?;
                let mut kept = Vec::with_capacity(docs.len());
                for doc in docs {
                    if matches(&doc, filter)? {
                        kept.push(doc);
                    }
                }
                kept
            }
            "$project" => {
                let projection = stage_doc(spec, name)?;
                docs.iter()
                    .map(|d| apply_projection(d, projection))
                    .collect::<Result<_, _>>()?
            }
            "$addFields" | "$set" => {
                let fields = stage_doc(spec, name)?;
                let mut out = Vec::with_capacity(docs.len());
                for mut doc in docs {
                    for (field, expr) in fields {
                        let value = eval_expr(&doc, expr)?;
                        path::set(&mut doc, field, value);
                    }
                    out.push(doc);
                }
                out
            }
            "$group" => group(&docs, stage_doc(spec, name)?)?,
            "$sort" => {
                apply_sort(&mut docs, stage_doc(spec, name)?)?;
                docs
            }
            "$limit" => {
                let n = stage_count(spec, name)?;
                if n == 0 {
                    return Err(StoreError::InvalidQuery("$limit must be positive".into()));
                }
                docs.truncate(n);
                docs
            }
            "$skip" => {
                let n = stage_count(spec, name)?;
                docs.into_iter().skip(n).collect()
            }
            "$count" => {
                let field = spec
                    .as_str()
                    .filter(|f| !f.is_empty() && !f.starts_with('$'))
                    .ok_or_else(|| {
                        StoreError::InvalidQuery("$count requires a field name".into())
                    })?;
                if docs.is_empty() {
                    Vec::new()
                } else {
                    let mut out = Document::new();
                    out.insert(field.to_string(), Value::from(docs.len() as u64));
                    vec![out]
                }
            }
            "$unwind" => unwind(docs, spec)?,
            "$sample" => {
                let size = spec
                    .get("size")
                    .ok_or_else(|| StoreError::InvalidQuery("$sample requires a size".into()))
                    .and_then(|s| stage_count(s, name))?;
                let amount = size.min(docs.len());
                rand::seq::index::sample(&mut rand::rng(), docs.len(), amount)
                    .into_iter()
                    .map(|i| docs[i].clone())
                    .collect()
            }
            other => return Err(StoreError::Unsupported(format!("pipeline stage {other}"))),
        };
    }
    Ok(docs)
}

fn stage_doc<'a>(spec: &'a Value, stage: &str) -> Result<&'a Document, StoreError> {
    spec.as_object()
        .ok_or_else(|| StoreError::InvalidQuery(format!("{stage} requires a document")))
}

fn stage_count(spec: &Value, stage: &str) -> Result<usize, StoreError> {
    number(spec)
        .filter(|n| *n >= 0.0 && n.fract() == 0.0)
        .map(|n| n as usize)
        .ok_or_else(|| StoreError::InvalidQuery(format!("{stage} requires a non-negative integer")))
}

fn unwind(docs: Vec<Document>, spec: &Value) -> Result<Vec<Document>, StoreError> {
    let (field_ref, preserve) = match spec {
        Value::String(s) => (s.as_str(), false),
        Value::Object(opts) => (
            opts.get("path").and_then(|p| p.as_str()).unwrap_or_default(),
            opts.get("preserveNullAndEmptyArrays")
                .and_then(|p| p.as_bool())
                .unwrap_or(false),
        ),
        _ => ("", false),
    };
    let field = field_ref
        .strip_prefix('$')
        .filter(|f| !f.is_empty())
        .ok_or_else(|| StoreError::InvalidQuery("$unwind requires a '$field' path".into()))?;

    let mut out = Vec::with_capacity(docs.len());
    for doc in docs {
        match path::first(&doc, field).cloned() {
            Some(Value::Array(items)) if !items.is_empty() => {
                for item in items {
                    let mut copy = doc.clone();
                    path::set(&mut copy, field, item);
                    out.push(copy);
                }
            }
            Some(Value::Array(_)) | Some(Value::Null) | None => {
                if preserve {
                    out.push(doc);
                }
            }
            Some(_) => out.push(doc),
        }
    }
    Ok(out)
}

/// Evaluate an aggregation expression against a document.
pub(crate) fn eval_expr(doc: &Document, expr: &Value) -> Result<Value, StoreError> {
    match expr {
        Value::String(s) if s == "$$ROOT" => Ok(Value::Object(doc.clone())),
        Value::String(s) if s.starts_with("$$") => {
            Err(StoreError::Unsupported(format!("expression variable {s}")))
        }
        Value::String(s) if s.starts_with('$') => {
            let mut found = path::lookup(doc, &s[1..]);
            Ok(match found.len() {
                0 => Value::Null,
                1 => found.remove(0).clone(),
                _ => Value::Array(found.into_iter().cloned().collect()),
            })
        }
        Value::Array(items) => Ok(Value::Array(
            items
                .iter()
                .map(|item| eval_expr(doc, item))
                .collect::<Result<_, _>>()?,
        )),
        Value::Object(map) if is_wrapper(map) => Ok(expr.clone()),
        Value::Object(map) if map.len() == 1 && map.keys().all(|k| k.starts_with('$')) => {
            let (op, arg) = map.iter().next().map(|(k, v)| (k.as_str(), v)).unwrap_or(("", expr));
            eval_operator(doc, op, arg)
        }
        Value::Object(map) => {
            let mut out = Document::new();
            for (key, value) in map {
                out.insert(key.clone(), eval_expr(doc, value)?);
            }
            Ok(Value::Object(out))
        }
        other => Ok(other.clone()),
    }
}

fn eval_operator(doc: &Document, op: &str, arg: &Value) -> Result<Value, StoreError> {
    let args = || -> Result<Vec<Value>, StoreError> {
        match arg {
            Value::Array(items) => items.iter().map(|i| eval_expr(doc, i)).collect(),
            single => Ok(vec![eval_expr(doc, single)?]),
        }
    };

    match op {
        "$literal" => Ok(arg.clone()),
        "$concat" => {
            let mut out = String::new();
            for value in args()? {
                match value {
                    Value::String(s) => out.push_str(&s),
                    Value::Null => return Ok(Value::Null),
                    _ => return Err(StoreError::InvalidQuery("$concat only supports strings".into())),
                }
            }
            Ok(Value::String(out))
        }
        "$toUpper" | "$toLower" => {
            let value = eval_expr(doc, arg)?;
            let s = match &value {
                Value::String(s) => s.clone(),
                Value::Null => String::new(),
                other => other.to_string(),
            };
            Ok(Value::String(if op == "$toUpper" {
                s.to_uppercase()
            } else {
                s.to_lowercase()
            }))
        }
        "$size" => match eval_expr(doc, arg)? {
            Value::Array(items) => Ok(Value::from(items.len() as u64)),
            _ => Err(StoreError::InvalidQuery("$size requires an array".into())),
        },
        "$ifNull" => {
            for value in args()? {
                if !value.is_null() {
                    return Ok(value);
                }
            }
            Ok(Value::Null)
        }
        "$add" | "$subtract" | "$multiply" | "$divide" => arithmetic(op, args()?),
        other => Err(StoreError::Unsupported(format!("expression operator {other}"))),
    }
}

fn arithmetic(op: &str, values: Vec<Value>) -> Result<Value, StoreError> {
    if values.iter().any(Value::is_null) {
        return Ok(Value::Null);
    }
    let all_int = values.iter().all(|v| type_of(v) == TypeTag::Int);
    let nums = values
        .iter()
        .map(number)
        .collect::<Option<Vec<f64>>>()
        .ok_or_else(|| StoreError::InvalidQuery(format!("{op} only supports numbers")))?;

    let result: f64 = match (op, nums.as_slice()) {
        ("$add", _) => nums.iter().sum(),
        ("$multiply", _) => nums.iter().product(),
        ("$subtract", [a, b]) => a - b,
        ("$divide", [_, b]) if *b == 0.0 => {
            return Err(StoreError::InvalidQuery("$divide by zero".into()))
        }
        ("$divide", [a, b]) => return Ok(float(a / b)),
        _ => return Err(StoreError::InvalidQuery(format!("{op} requires two arguments"))),
    };
    Ok(if all_int {
        Value::from(result as i64)
    } else {
        float(result)
    })
}

fn float(value: f64) -> Value {
    Number::from_f64(value).map_or(Value::Null, Value::Number)
}

/// Running state of one `$group` accumulator.
enum Accumulator {
    Sum { int: i64, float: f64, is_float: bool },
    Avg { total: f64, count: u64 },
    Min(Option<Value>),
    Max(Option<Value>),
    First(Option<Value>),
    Last(Option<Value>),
    Push(Vec<Value>),
    AddToSet(Vec<Value>),
    Count(u64),
}

impl Accumulator {
    fn new(op: &str) -> Result<Self, StoreError> {
        Ok(match op {
            "$sum" => Accumulator::Sum {
                int: 0,
                float: 0.0,
                is_float: false,
            },
            "$avg" => Accumulator::Avg {
                total: 0.0,
                count: 0,
            },
            "$min" => Accumulator::Min(None),
            "$max" => Accumulator::Max(None),
            "$first" => Accumulator::First(None),
            "$last" => Accumulator::Last(None),
            "$push" => Accumulator::Push(Vec::new()),
            "$addToSet" => Accumulator::AddToSet(Vec::new()),
            "$count" => Accumulator::Count(0),
            other => return Err(StoreError::Unsupported(format!("group accumulator {other}"))),
        })
    }

    fn push(&mut self, value: Value) {
        match self {
            Accumulator::Sum {
                int,
                float,
                is_float,
            } => match type_of(&value) {
                TypeTag::Int => {
                    let n = value
                        .as_i64()
                        .or_else(|| number(&value).map(|f| f as i64))
                        .unwrap_or_default();
                    // Past i64 the total continues as a double.
                    match int.checked_add(n) {
                        Some(sum) => *int = sum,
                        None => {
                            *float += n as f64;
                            *is_float = true;
                        }
                    }
                }
                TypeTag::Float | TypeTag::Decimal => {
                    *float += number(&value).unwrap_or_default();
                    *is_float = true;
                }
                _ => {}
            },
            Accumulator::Avg { total, count } => {
                if let Some(n) = number(&value) {
                    *total += n;
                    *count += 1;
                }
            }
            Accumulator::Min(current) => {
                if !value.is_null()
                    && current.as_ref().map_or(true, |c| sort_cmp(&value, c).is_lt())
                {
                    *current = Some(value);
                }
            }
            Accumulator::Max(current) => {
                if !value.is_null()
                    && current.as_ref().map_or(true, |c| sort_cmp(&value, c).is_gt())
                {
                    *current = Some(value);
                }
            }
            Accumulator::First(current) => {
                if current.is_none() {
                    *current = Some(value);
                }
            }
            Accumulator::Last(current) => *current = Some(value),
            Accumulator::Push(values) => values.push(value),
            Accumulator::AddToSet(values) => {
                if !values.iter().any(|v| values_equal(v, &value)) {
                    values.push(value);
                }
            }
            Accumulator::Count(n) => *n += 1,
        }
    }

    fn finish(self) -> Value {
        match self {
            Accumulator::Sum {
                int,
                float: f,
                is_float,
            } => {
                if is_float {
                    float(int as f64 + f)
                } else {
                    Value::from(int)
                }
            }
            Accumulator::Avg { total, count } => {
                if count == 0 {
                    Value::Null
                } else {
                    float(total / count as f64)
                }
            }
            Accumulator::Min(v) | Accumulator::Max(v) | Accumulator::First(v) | Accumulator::Last(v) => {
                v.unwrap_or(Value::Null)
            }
            Accumulator::Push(values) | Accumulator::AddToSet(values) => Value::Array(values),
            Accumulator::Count(n) => Value::from(n),
        }
    }
}

fn group(docs: &[Document], spec: &Document) -> Result<Vec<Document>, StoreError> {
    let key_expr = spec
        .get(ID_FIELD)
        .ok_or_else(|| StoreError::InvalidQuery("$group requires an _id expression".into()))?;

    let mut fields = Vec::new();
    for (name, acc) in spec.iter().filter(|(k, _)| k.as_str() != ID_FIELD) {
        let (op, expr) = match acc.as_object() {
            Some(m) if m.len() == 1 => m.iter().next().map(|(k, v)| (k.as_str(), v)),
            _ => None,
        }
        .ok_or_else(|| {
            StoreError::InvalidQuery(format!("accumulator '{name}' must have exactly one operator"))
        })?;
        Accumulator::new(op)?;
        fields.push((name.clone(), op, expr));
    }

    // Keyed by the serialized group key; first-seen order is kept.
    let mut groups: IndexMap<String, (Value, Vec<Accumulator>)> = IndexMap::new();
    for doc in docs {
        let key = eval_expr(doc, key_expr)?;
        let slot = serde_json::to_string(&key)?;
        if !groups.contains_key(&slot) {
            let accumulators = fields
                .iter()
                .map(|(_, op, _)| Accumulator::new(op))
                .collect::<Result<Vec<_>, _>>()?;
            groups.insert(slot.clone(), (key, accumulators));
        }
        if let Some((_, accumulators)) = groups.get_mut(&slot) {
            for (acc, (_, _, expr)) in accumulators.iter_mut().zip(&fields) {
                acc.push(eval_expr(doc, expr)?);
            }
        }
    }

    Ok(groups
        .into_values()
        .map(|(key, accumulators)| {
            let mut out = Document::new();
            out.insert(ID_FIELD.to_string(), key);
            for (acc, (name, _, _)) in accumulators.into_iter().zip(&fields) {
                out.insert(name.clone(), acc.finish());
            }
            out
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    fn docs(value: Value) -> Vec<Document> {
        value
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_object().cloned().unwrap())
            .collect()
    }

    fn customers() -> Vec<Document> {
        docs(json!([
            {"_id": 1, "name": "Ann", "state": "NY", "balance": 100, "tags": ["a", "b"]},
            {"_id": 2, "name": "Bob", "state": "CA", "balance": 250.5, "tags": []},
            {"_id": 3, "name": "Cid", "state": "NY", "balance": 50, "tags": ["b"]}
        ]))
    }

    #[test]
    fn test_inclusion_projection_keeps_id() {
        let out = apply_projection(&customers()[0], &doc(json!({"name": 1}))).unwrap();
        assert_eq!(Value::Object(out), json!({"_id": 1, "name": "Ann"}));
    }

    #[test]
    fn test_exclusion_projection() {
        let out = apply_projection(&customers()[0], &doc(json!({"_id": 0, "tags": 0}))).unwrap();
        assert_eq!(Value::Object(out), json!({"name": "Ann", "state": "NY", "balance": 100}));
    }

    #[test]
    fn test_projection_id_only_exclusion() {
        let out = apply_projection(&customers()[0], &doc(json!({"_id": 0}))).unwrap();
        assert!(out.get("_id").is_none());
        assert_eq!(out.len(), 4);
    }

    #[test]
    fn test_mixed_projection_rejected() {
        let err = apply_projection(&customers()[0], &doc(json!({"name": 1, "state": 0})));
        assert!(matches!(err, Err(StoreError::InvalidQuery(_))));
    }

    #[test]
    fn test_sort_descending_then_name() {
        let mut all = customers();
        apply_sort(&mut all, &doc(json!({"state": -1, "name": 1}))).unwrap();
        let names: Vec<_> = all.iter().map(|d| d["name"].as_str().unwrap()).collect();
        assert_eq!(names, vec!["Ann", "Cid", "Bob"]);
    }

    #[test]
    fn test_group_sum_and_avg() {
        let pipeline = docs(json!([
            {"$group": {"_id": "$state", "total": {"$sum": "$balance"}, "n": {"$sum": 1}, "avg": {"$avg": "$balance"}}},
            {"$sort": {"_id": 1}}
        ]));
        let out = run_pipeline(customers(), &pipeline).unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0]["_id"], "CA");
        assert_eq!(out[0]["total"], 250.5);
        assert_eq!(out[1]["_id"], "NY");
        assert_eq!(out[1]["total"], 150);
        assert_eq!(out[1]["n"], 2);
        assert_eq!(out[1]["avg"], 75.0);
    }

    #[test]
    fn test_group_sum_promotes_on_overflow() {
        let big = docs(json!([
            {"n": {"$numberLong": "9000000000000000000"}},
            {"n": {"$numberLong": "9000000000000000000"}},
            {"n": 1}
        ]));
        let pipeline = docs(json!([{"$group": {"_id": null, "t": {"$sum": "$n"}}}]));
        let out = run_pipeline(big, &pipeline).unwrap();
        assert_eq!(out[0]["t"].as_f64(), Some(1.8e19));
        assert!(out[0]["t"].is_f64());
    }

    #[test]
    fn test_unwind_and_add_to_set() {
        let pipeline = docs(json!([
            {"$unwind": "$tags"},
            {"$group": {"_id": null, "tags": {"$addToSet": "$tags"}}}
        ]));
        let out = run_pipeline(customers(), &pipeline).unwrap();
        assert_eq!(out[0]["tags"], json!(["a", "b"]));
    }

    #[test]
    fn test_match_count() {
        let pipeline = docs(json!([{"$match": {"state": "NY"}}, {"$count": "total"}]));
        let out = run_pipeline(customers(), &pipeline).unwrap();
        assert_eq!(Value::Object(out[0].clone()), json!({"total": 2}));
    }

    #[test]
    fn test_limit_skip_project_expression() {
        let pipeline = docs(json!([
            {"$sort": {"balance": -1}},
            {"$skip": 1},
            {"$limit": 1},
            {"$project": {"_id": 0, "label": {"$concat": ["$name", "/", "$state"]}}}
        ]));
        let out = run_pipeline(customers(), &pipeline).unwrap();
        assert_eq!(Value::Object(out[0].clone()), json!({"label": "Ann/NY"}));
    }

    #[test]
    fn test_sample_stage_bounds() {
        let pipeline = docs(json!([{"$sample": {"size": 10}}]));
        let out = run_pipeline(customers(), &pipeline).unwrap();
        assert_eq!(out.len(), 3);
    }

    #[test]
    fn test_unknown_stage() {
        let pipeline = docs(json!([{"$lookup": {"from": "accounts"}}]));
        let err = run_pipeline(customers(), &pipeline).unwrap_err();
        assert!(matches!(err, StoreError::Unsupported(_)));
    }
}
