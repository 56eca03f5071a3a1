//! Dotted field paths.

use serde_json::Value;

use crate::extjson::is_wrapper;
use crate::Document;

/// All values reachable at a dotted path.
///
/// Arrays met before the last segment fan out over their elements, and a
/// numeric segment indexes into an array.
pub(crate) fn lookup<'a>(doc: &'a Document, path: &str) -> Vec<&'a Value> {
    let segments: Vec<&str> = path.split('.').collect();
    let mut out = Vec::new();
    if let Some((head, rest)) = segments.split_first() {
        if let Some(value) = doc.get(*head) {
            walk(value, rest, &mut out);
        }
    }
    out
}

fn walk<'a>(value: &'a Value, segments: &[&str], out: &mut Vec<&'a Value>) {
    let Some((head, rest)) = segments.split_first() else {
        out.push(value);
        return;
    };

    match value {
        Value::Object(map) if !is_wrapper(map) => {
            if let Some(next) = map.get(*head) {
                walk(next, rest, out);
            }
        }
        Value::Array(items) => {
            if let Ok(index) = head.parse::<usize>() {
                if let Some(next) = items.get(index) {
                    walk(next, rest, out);
                }
            } else {
                for item in items.iter().filter(|i| i.is_object()) {
                    walk(item, segments, out);
                }
            }
        }
        _ => {}
    }
}

/// First value at a path, if any.
pub(crate) fn first<'a>(doc: &'a Document, path: &str) -> Option<&'a Value> {
    lookup(doc, path).into_iter().next()
}

/// Set a value at a dotted path, creating intermediate objects.
pub(crate) fn set(doc: &mut Document, path: &str, value: Value) {
    match path.split_once('.') {
        None => {
            doc.insert(path.to_string(), value);
        }
        Some((head, rest)) => {
            let entry = doc
                .entry(head.to_string())
                .or_insert_with(|| Value::Object(Document::new()));
            if !entry.is_object() {
                *entry = Value::Object(Document::new());
            }
            if let Value::Object(inner) = entry {
                set(inner, rest, value);
            }
        }
    }
}

/// Remove the value at a dotted path.
pub(crate) fn remove(doc: &mut Document, path: &str) {
    match path.split_once('.') {
        None => {
            doc.shift_remove(path);
        }
        Some((head, rest)) => match doc.get_mut(head) {
            Some(Value::Object(inner)) => remove(inner, rest),
            Some(Value::Array(items)) => {
                for item in items.iter_mut() {
                    if let Value::Object(inner) = item {
                        remove(inner, rest);
                    }
                }
            }
            _ => {}
        },
    }
}
