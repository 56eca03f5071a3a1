//! MongoDB Extended JSON value model: type tags, ordering, sanitization.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use std::cmp::Ordering;
use std::fmt;

use crate::Document;

/// Name of the primary identifier field.
pub const ID_FIELD: &str = "_id";

/// Runtime type of a stored value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TypeTag {
    Object,
    Array,
    String,
    Int,
    Float,
    Bool,
    Null,
    Date,
    ObjectId,
    Decimal,
    Binary,
}

impl TypeTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            TypeTag::Object => "object",
            TypeTag::Array => "array",
            TypeTag::String => "string",
            TypeTag::Int => "int",
            TypeTag::Float => "float",
            TypeTag::Bool => "bool",
            TypeTag::Null => "null",
            TypeTag::Date => "date",
            TypeTag::ObjectId => "objectId",
            TypeTag::Decimal => "decimal",
            TypeTag::Binary => "binary",
        }
    }

    /// Whether values of this type are leaves for schema purposes.
    pub fn is_primitive(&self) -> bool {
        !matches!(self, TypeTag::Object | TypeTag::Array)
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returns the `(key, inner)` pair of a single-key Extended JSON wrapper.
fn wrapper(map: &Document) -> Option<(&str, &Value)> {
    if map.len() != 1 {
        return None;
    }
    let (key, inner) = map.iter().next()?;
    match key.as_str() {
        "$oid" | "$date" | "$numberInt" | "$numberLong" | "$numberDouble" | "$numberDecimal"
        | "$binary" => Some((key.as_str(), inner)),
        _ => None,
    }
}

/// Whether an object is an Extended JSON scalar rather than a document.
pub(crate) fn is_wrapper(map: &Document) -> bool {
    wrapper(map).is_some()
}

/// Classify a value.
pub fn type_of(value: &Value) -> TypeTag {
    match value {
        Value::Null => TypeTag::Null,
        Value::Bool(_) => TypeTag::Bool,
        Value::Number(n) if n.is_i64() || n.is_u64() => TypeTag::Int,
        Value::Number(_) => TypeTag::Float,
        Value::String(_) => TypeTag::String,
        Value::Array(_) => TypeTag::Array,
        Value::Object(map) => match wrapper(map).map(|(k, _)| k) {
            Some("$oid") => TypeTag::ObjectId,
            Some("$date") => TypeTag::Date,
            Some("$numberInt") | Some("$numberLong") => TypeTag::Int,
            Some("$numberDouble") => TypeTag::Float,
            Some("$numberDecimal") => TypeTag::Decimal,
            Some("$binary") => TypeTag::Binary,
            _ => TypeTag::Object,
        },
    }
}

/// Milliseconds since the epoch of a `{"$date": ...}` value.
pub fn date_millis(value: &Value) -> Option<i64> {
    match value.as_object().and_then(wrapper) {
        Some(("$date", inner)) => date_inner_millis(inner),
        _ => None,
    }
}

fn date_inner_millis(inner: &Value) -> Option<i64> {
    match inner {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|d| d.timestamp_millis()),
        Value::Number(n) => n.as_i64(),
        Value::Object(map) => map
            .get("$numberLong")
            .and_then(|v| v.as_str())
            .and_then(|s| s.parse().ok()),
        _ => None,
    }
}

fn object_id(value: &Value) -> Option<&str> {
    match value.as_object().and_then(wrapper) {
        Some(("$oid", inner)) => inner.as_str(),
        _ => None,
    }
}

pub(crate) fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::Object(map) => match wrapper(map) {
            Some(("$numberInt" | "$numberLong" | "$numberDouble" | "$numberDecimal", inner)) => {
                inner.as_str().and_then(|s| s.parse().ok())
            }
            _ => None,
        },
        _ => None,
    }
}

/// A value reduced to its comparable form.
enum Scalar<'a> {
    Null,
    Number(f64),
    String(&'a str),
    Object,
    Array,
    Binary,
    ObjectId(&'a str),
    Bool(bool),
    Date(i64),
}

impl Scalar<'_> {
    /// Cross-type sort order, following BSON comparison order.
    fn rank(&self) -> u8 {
        match self {
            Scalar::Null => 0,
            Scalar::Number(_) => 1,
            Scalar::String(_) => 2,
            Scalar::Object => 3,
            Scalar::Array => 4,
            Scalar::Binary => 5,
            Scalar::ObjectId(_) => 6,
            Scalar::Bool(_) => 7,
            Scalar::Date(_) => 8,
        }
    }
}

fn scalar(value: &Value) -> Scalar<'_> {
    match type_of(value) {
        TypeTag::Null => Scalar::Null,
        TypeTag::Bool => Scalar::Bool(value.as_bool().unwrap_or(false)),
        TypeTag::Int | TypeTag::Float | TypeTag::Decimal => {
            number(value).map_or(Scalar::Null, Scalar::Number)
        }
        TypeTag::String => Scalar::String(value.as_str().unwrap_or_default()),
        TypeTag::Array => Scalar::Array,
        TypeTag::Object => Scalar::Object,
        TypeTag::Binary => Scalar::Binary,
        TypeTag::ObjectId => object_id(value).map_or(Scalar::Null, Scalar::ObjectId),
        TypeTag::Date => date_millis(value).map_or(Scalar::Null, Scalar::Date),
    }
}

/// Compare two values of the same type bracket.
///
/// Returns `None` when the values are not comparable (different brackets,
/// or distinct documents/arrays), which makes range operators fail to match.
pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (scalar(a), scalar(b)) {
        (Scalar::Null, Scalar::Null) => Some(Ordering::Equal),
        (Scalar::Number(x), Scalar::Number(y)) => x.partial_cmp(&y),
        (Scalar::String(x), Scalar::String(y)) => Some(x.cmp(y)),
        (Scalar::ObjectId(x), Scalar::ObjectId(y)) => Some(x.cmp(y)),
        (Scalar::Bool(x), Scalar::Bool(y)) => Some(x.cmp(&y)),
        (Scalar::Date(x), Scalar::Date(y)) => Some(x.cmp(&y)),
        _ => (a == b).then_some(Ordering::Equal),
    }
}

/// Total order used by sorts, `$min` and `$max`.
pub(crate) fn sort_cmp(a: &Value, b: &Value) -> Ordering {
    let (sa, sb) = (scalar(a), scalar(b));
    sa.rank()
        .cmp(&sb.rank())
        .then_with(|| compare_values(a, b).unwrap_or(Ordering::Equal))
}

/// Equality with numeric and wrapper normalization (`1 == 1.0`,
/// `{"$numberLong": "5"} == 5`).
pub fn values_equal(a: &Value, b: &Value) -> bool {
    compare_values(a, b) == Some(Ordering::Equal)
}

/// Rewrite store-native values into portable JSON.
///
/// Identifiers become their hex string, dates become RFC 3339 strings with
/// millisecond precision, numeric wrappers become numbers. Already-sanitized
/// values pass through unchanged.
pub fn sanitize(value: Value) -> Value {
    match value {
        Value::Array(items) => Value::Array(items.into_iter().map(sanitize).collect()),
        Value::Object(map) => match convert_wrapper(&map) {
            Some(converted) => converted,
            None => Value::Object(sanitize_document(map)),
        },
        other => other,
    }
}

/// [`sanitize`] applied to every field of a document.
pub fn sanitize_document(doc: Document) -> Document {
    doc.into_iter().map(|(k, v)| (k, sanitize(v))).collect()
}

fn convert_wrapper(map: &Document) -> Option<Value> {
    let (key, inner) = wrapper(map)?;
    let converted = match key {
        "$oid" => inner.as_str().map(|s| Value::String(s.to_string())),
        "$date" => date_inner_millis(inner)
            .and_then(DateTime::<Utc>::from_timestamp_millis)
            .map(|d| Value::String(d.to_rfc3339_opts(SecondsFormat::Millis, true))),
        "$numberInt" | "$numberLong" => inner
            .as_str()
            .and_then(|s| s.parse::<i64>().ok())
            .map(Value::from),
        "$numberDouble" => inner
            .as_str()
            .and_then(|s| s.parse::<f64>().ok())
            .and_then(Number::from_f64)
            .map(Value::Number),
        "$binary" => inner
            .get("base64")
            .and_then(Value::as_str)
            .map(|s| Value::String(s.to_string())),
        _ => None,
    };
    Some(converted.unwrap_or_else(|| Value::String(wrapper_text(inner))))
}

/// String form of a wrapper payload that has no richer conversion.
fn wrapper_text(inner: &Value) -> String {
    match inner {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Generate a fresh `{"$oid": ...}` identifier.
///
/// Layout follows ObjectId: 4 bytes of big-endian seconds, then 8 random bytes.
pub fn new_object_id() -> Value {
    let seconds = Utc::now().timestamp() as u32;
    let random = uuid::Uuid::new_v4();
    let mut hex = String::with_capacity(24);
    for byte in seconds.to_be_bytes().iter().chain(&random.as_bytes()[..8]) {
        hex.push_str(&format!("{:02x}", byte));
    }
    serde_json::json!({ "$oid": hex })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_type_of_wrappers() {
        assert_eq!(type_of(&json!({"$oid": "5ca4bbcea2dd94ee58162a6a"})), TypeTag::ObjectId);
        assert_eq!(type_of(&json!({"$date": "2017-01-01T00:00:00Z"})), TypeTag::Date);
        assert_eq!(type_of(&json!({"$numberLong": "12"})), TypeTag::Int);
        assert_eq!(type_of(&json!({"$numberDecimal": "1.10"})), TypeTag::Decimal);
        assert_eq!(type_of(&json!({"$oid": "x", "other": 1})), TypeTag::Object);
        assert_eq!(type_of(&json!(3)), TypeTag::Int);
        assert_eq!(type_of(&json!(3.5)), TypeTag::Float);
        assert_eq!(type_of(&json!(null)), TypeTag::Null);
    }

    #[test]
    fn test_type_tag_serializes_camel_case() {
        assert_eq!(serde_json::to_value(TypeTag::ObjectId).unwrap(), json!("objectId"));
        assert_eq!(TypeTag::ObjectId.to_string(), "objectId");
    }

    #[test]
    fn test_date_millis_forms() {
        let iso = json!({"$date": "1970-01-01T00:00:01Z"});
        let num = json!({"$date": 1000});
        let long = json!({"$date": {"$numberLong": "1000"}});
        assert_eq!(date_millis(&iso), Some(1000));
        assert_eq!(date_millis(&num), Some(1000));
        assert_eq!(date_millis(&long), Some(1000));
    }

    #[test]
    fn test_sanitize_identifiers_and_dates() {
        let doc = json!({
            "_id": {"$oid": "5ca4bbcea2dd94ee58162a6a"},
            "birthdate": {"$date": {"$numberLong": "0"}},
            "accounts": [{"$numberLong": "371138"}],
            "nested": {"when": {"$date": "2020-05-01T10:00:00+02:00"}}
        });
        let clean = sanitize(doc);
        assert_eq!(clean["_id"], "5ca4bbcea2dd94ee58162a6a");
        assert_eq!(clean["birthdate"], "1970-01-01T00:00:00.000Z");
        assert_eq!(clean["accounts"][0], 371138);
        assert_eq!(clean["nested"]["when"], "2020-05-01T08:00:00.000Z");
    }

    #[test]
    fn test_sanitize_unconvertible_wrappers_become_strings() {
        let doc = json!({
            "bad_date": {"$date": "not a date"},
            "blob": {"$binary": {"base64": "AAEC", "subType": "00"}},
            "legacy_blob": {"$binary": "AAEC"},
            "price": {"$numberDecimal": "19.99"},
            "inf": {"$numberDouble": "Infinity"}
        });
        let clean = sanitize(doc);
        assert_eq!(clean["bad_date"], "not a date");
        assert_eq!(clean["blob"], "AAEC");
        assert_eq!(clean["legacy_blob"], "AAEC");
        assert_eq!(clean["price"], "19.99");
        assert_eq!(clean["inf"], "Infinity");
        assert_eq!(sanitize(clean.clone()), clean);
    }

    #[test]
    fn test_sanitize_is_idempotent() {
        let doc = json!({
            "_id": {"$oid": "5ca4bbcea2dd94ee58162a6a"},
            "at": {"$date": "2021-03-04T05:06:07.890Z"},
            "plain": {"a": [1, "two", null]}
        });
        let once = sanitize(doc);
        let twice = sanitize(once.clone());
        assert_eq!(once, twice);
        assert!(once["_id"].is_string());
        assert!(once["at"].is_string());
    }

    #[test]
    fn test_compare_values_brackets() {
        assert_eq!(compare_values(&json!(1), &json!(1.0)), Some(Ordering::Equal));
        assert_eq!(compare_values(&json!({"$numberLong": "7"}), &json!(5)), Some(Ordering::Greater));
        assert_eq!(compare_values(&json!("a"), &json!(1)), None);
        assert_eq!(
            compare_values(&json!({"$date": 1}), &json!({"$date": 2})),
            Some(Ordering::Less)
        );
    }

    #[test]
    fn test_sort_cmp_orders_types() {
        let mut values = vec![json!("b"), json!(true), json!(2), json!(null), json!("a")];
        values.sort_by(sort_cmp);
        assert_eq!(values, vec![json!(null), json!(2), json!("a"), json!("b"), json!(true)]);
    }

    #[test]
    fn test_new_object_id_shape() {
        let id = new_object_id();
        assert_eq!(type_of(&id), TypeTag::ObjectId);
        let hex = id["$oid"].as_str().unwrap();
        assert_eq!(hex.len(), 24);
        assert!(hex.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
