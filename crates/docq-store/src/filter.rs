//! Query filter evaluation.

use regex::{Regex, RegexBuilder};
use serde_json::Value;
use std::cmp::Ordering;

use crate::extjson::{compare_values, is_wrapper, values_equal};
use crate::{path, Document, StoreError};

/// Whether `doc` satisfies `filter`.
///
/// Top-level keys are either logical operators (`$and`, `$or`, `$nor`) or
/// field paths mapped to a literal (equality) or an operator document.
pub fn matches(doc: &Document, filter: &Document) -> Result<bool, StoreError> {
    for (key, condition) in filter {
        let ok = match key.as_str() {
            "$and" => {
                let mut all = true;
                for clause in clauses(condition, "$and")? {
                    if !matches(doc, clause)? {
                        all = false;
                        break;
                    }
                }
                all
            }
            "$or" => {
                let mut any = false;
                for clause in clauses(condition, "$or")? {
                    if matches(doc, clause)? {
                        any = true;
                        break;
                    }
                }
                any
            }
            "$nor" => {
                let mut none = true;
                for clause in clauses(condition, "$nor")? {
                    if matches(doc, clause)? {
                        none = false;
                        break;
                    }
                }
                none
            }
            "$comment" => true,
            op if op.starts_with('$') => {
                return Err(StoreError::Unsupported(format!("query operator {op}")));
            }
            field => field_matches(&path::lookup(doc, field), condition)?,
        };
        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

fn clauses<'a>(value: &'a Value, op: &str) -> Result<Vec<&'a Document>, StoreError> {
    let items = value
        .as_array()
        .ok_or_else(|| StoreError::InvalidQuery(format!("{op} requires an array")))?;
    items
        .iter()
        .map(|item| {
            item.as_object()
                .ok_or_else(|| StoreError::InvalidQuery(format!("{op} entries must be objects")))
        })
        .collect()
}

pub(crate) fn is_operator_doc(map: &Document) -> bool {
    !map.is_empty() && !is_wrapper(map) && map.keys().all(|k| k.starts_with('$'))
}

fn field_matches(values: &[&Value], condition: &Value) -> Result<bool, StoreError> {
    match condition {
        Value::Object(ops) if is_operator_doc(ops) => {
            for (op, arg) in ops {
                if !operator_matches(values, op, arg, ops)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        _ => Ok(equals_any(values, condition)),
    }
}

/// Values plus the elements of any array values.
fn expanded<'a>(values: &[&'a Value]) -> Vec<&'a Value> {
    let mut out = Vec::with_capacity(values.len());
    for value in values {
        out.push(*value);
        if let Value::Array(items) = value {
            out.extend(items.iter());
        }
    }
    out
}

fn equals_any(values: &[&Value], target: &Value) -> bool {
    if target.is_null() && values.is_empty() {
        return true;
    }
    expanded(values).iter().any(|v| values_equal(v, target))
}

fn compare_any(values: &[&Value], target: &Value, accept: fn(Ordering) -> bool) -> bool {
    expanded(values)
        .iter()
        .any(|v| compare_values(v, target).is_some_and(accept))
}

fn operator_matches(
    values: &[&Value],
    op: &str,
    arg: &Value,
    siblings: &Document,
) -> Result<bool, StoreError> {
    let matched = match op {
        "$eq" => equals_any(values, arg),
        "$ne" => !equals_any(values, arg),
        "$gt" => compare_any(values, arg, |o| o == Ordering::Greater),
        "$gte" => compare_any(values, arg, |o| o != Ordering::Less),
        "$lt" => compare_any(values, arg, |o| o == Ordering::Less),
        "$lte" => compare_any(values, arg, |o| o != Ordering::Greater),
        "$in" => in_list(values, arg, "$in")?,
        "$nin" => !in_list(values, arg, "$nin")?,
        "$exists" => truthy(arg) != values.is_empty(),
        "$regex" => {
            let re = build_regex(arg, siblings.get("$options"))?;
            expanded(values)
                .iter()
                .filter_map(|v| v.as_str())
                .any(|s| re.is_match(s))
        }
        "$options" => true,
        "$size" => {
            let size = arg
                .as_u64()
                .ok_or_else(|| StoreError::InvalidQuery("$size requires a number".into()))?;
            values
                .iter()
                .any(|v| v.as_array().is_some_and(|a| a.len() as u64 == size))
        }
        "$all" => {
            let wanted = arg
                .as_array()
                .ok_or_else(|| StoreError::InvalidQuery("$all requires an array".into()))?;
            values.iter().any(|v| {
                v.as_array().is_some_and(|items| {
                    wanted
                        .iter()
                        .all(|w| items.iter().any(|item| values_equal(item, w)))
                })
            })
        }
        "$not" => match arg {
            Value::Object(_) => !field_matches(values, arg)?,
            Value::String(_) => {
                let re = build_regex(arg, None)?;
                !expanded(values)
                    .iter()
                    .filter_map(|v| v.as_str())
                    .any(|s| re.is_match(s))
            }
            _ => return Err(StoreError::InvalidQuery("$not requires an object".into())),
        },
        "$elemMatch" => {
            let criteria = arg
                .as_object()
                .ok_or_else(|| StoreError::InvalidQuery("$elemMatch requires an object".into()))?;
            let mut found = false;
            'outer: for value in values {
                if let Value::Array(items) = value {
                    for item in items {
                        let hit = if is_operator_doc(criteria) {
                            field_matches(&[item], arg)?
                        } else {
                            match item.as_object() {
                                Some(obj) => matches(obj, criteria)?,
                                None => false,
                            }
                        };
                        if hit {
                            found = true;
                            break 'outer;
                        }
                    }
                }
            }
            found
        }
        other => return Err(StoreError::Unsupported(format!("query operator {other}"))),
    };
    Ok(matched)
}

fn in_list(values: &[&Value], arg: &Value, op: &str) -> Result<bool, StoreError> {
    let candidates = arg
        .as_array()
        .ok_or_else(|| StoreError::InvalidQuery(format!("{op} requires an array")))?;
    Ok(candidates.iter().any(|c| equals_any(values, c)))
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        _ => true,
    }
}

pub(crate) fn build_regex(pattern: &Value, options: Option<&Value>) -> Result<Regex, StoreError> {
    let pattern = pattern
        .as_str()
        .ok_or_else(|| StoreError::InvalidQuery("$regex requires a string".into()))?;
    let options = options.and_then(|o| o.as_str()).unwrap_or_default();

    let mut builder = RegexBuilder::new(pattern);
    for flag in options.chars() {
        match flag {
            'i' => builder.case_insensitive(true),
            'm' => builder.multi_line(true),
            's' => builder.dot_matches_new_line(true),
            'x' => builder.ignore_whitespace(true),
            other => {
                return Err(StoreError::InvalidQuery(format!(
                    "unknown $options flag '{other}'"
                )))
            }
        };
    }
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    fn customer() -> Document {
        doc(json!({
            "_id": {"$oid": "5ca4bbcc2dd94ee58162a6a1"},
            "name": "Elizabeth Ray",
            "address": "9286 Bethany Glens\nVasqueztown, CA 95192",
            "active": true,
            "accounts": [371138, 324287, 276528],
            "tier_and_details": {"gold": {"tier": "Gold", "benefits": ["24 hour dedicated line"]}},
            "birthdate": {"$date": "1977-03-02T02:20:31Z"},
            "balance": 12500.5
        }))
    }

    #[test]
    fn test_implicit_equality() {
        assert!(matches(&customer(), &doc(json!({"name": "Elizabeth Ray"}))).unwrap());
        assert!(!matches(&customer(), &doc(json!({"name": "Someone"}))).unwrap());
    }

    #[test]
    fn test_array_membership() {
        assert!(matches(&customer(), &doc(json!({"accounts": 324287}))).unwrap());
        assert!(matches(&customer(), &doc(json!({"accounts": {"$size": 3}}))).unwrap());
        assert!(matches(&customer(), &doc(json!({"accounts": {"$all": [371138, 276528]}}))).unwrap());
    }

    #[test]
    fn test_case_insensitive_regex_state_code() {
        let filter = doc(json!({"address": {"$regex": "\\bca\\b", "$options": "i"}}));
        assert!(matches(&customer(), &filter).unwrap());
        let filter = doc(json!({"address": {"$regex": "\\bNY\\b", "$options": "i"}}));
        assert!(!matches(&customer(), &filter).unwrap());
    }

    #[test]
    fn test_range_operators() {
        assert!(matches(&customer(), &doc(json!({"balance": {"$gt": 10000}}))).unwrap());
        assert!(!matches(&customer(), &doc(json!({"balance": {"$lte": 10000}}))).unwrap());
        // Mixed brackets never compare.
        assert!(!matches(&customer(), &doc(json!({"name": {"$gt": 5}}))).unwrap());
    }

    #[test]
    fn test_date_comparison() {
        let filter = doc(json!({"birthdate": {"$lt": {"$date": "1980-01-01T00:00:00Z"}}}));
        assert!(matches(&customer(), &filter).unwrap());
    }

    #[test]
    fn test_nested_path_and_exists() {
        assert!(matches(&customer(), &doc(json!({"tier_and_details.gold.tier": "Gold"}))).unwrap());
        assert!(matches(&customer(), &doc(json!({"email": {"$exists": false}}))).unwrap());
        assert!(matches(&customer(), &doc(json!({"email": null}))).unwrap());
    }

    #[test]
    fn test_logical_operators() {
        let filter = doc(json!({"$or": [{"name": "Nobody"}, {"active": true}]}));
        assert!(matches(&customer(), &filter).unwrap());
        let filter = doc(json!({"$nor": [{"active": true}]}));
        assert!(!matches(&customer(), &filter).unwrap());
        let filter = doc(json!({"$and": [{"active": true}, {"balance": {"$in": [1, 12500.5]}}]}));
        assert!(matches(&customer(), &filter).unwrap());
    }

    #[test]
    fn test_not_and_elem_match() {
        let d = doc(json!({"items": [{"sku": "a", "qty": 1}, {"sku": "b", "qty": 9}]}));
        assert!(matches(&d, &doc(json!({"items": {"$elemMatch": {"sku": "b", "qty": {"$gt": 5}}}}))).unwrap());
        assert!(!matches(&d, &doc(json!({"items": {"$elemMatch": {"sku": "a", "qty": {"$gt": 5}}}}))).unwrap());
        assert!(matches(&d, &doc(json!({"items.qty": {"$not": {"$gt": 10}}}))).unwrap());
    }

    #[test]
    fn test_unknown_operator_is_unsupported() {
        let err = matches(&customer(), &doc(json!({"name": {"$near": [0, 0]}}))).unwrap_err();
        assert!(matches!(err, StoreError::Unsupported(_)));
        let err = matches(&customer(), &doc(json!({"$where": "true"}))).unwrap_err();
        assert!(matches!(err, StoreError::Unsupported(_)));
    }
}
