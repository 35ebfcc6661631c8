//! Filter document helpers shared by the query builders

use crate::core::types::ID_FIELD;
use crate::core::Document;
use serde_json::{json, Value};

/// `{field: {"$in": values}}`
pub fn in_array<S: AsRef<str>>(field: &str, values: &[S]) -> Document {
    let values: Vec<Value> = values.iter().map(|v| Value::from(v.as_ref())).collect();
    single(field, json!({ "$in": values }))
}

/// `{"_id": id}`
pub fn by_id(id: &str) -> Document {
    single(ID_FIELD, Value::from(id))
}

/// One-field document
pub fn single(field: &str, value: Value) -> Document {
    let mut doc = Document::new();
    doc.insert(field.to_string(), value);
    doc
}

/// Add `key: clause` to a filter without discarding a clause already
/// stored under the same key; both are then required through `$and`
pub fn add_clause(query: &mut Document, key: &str, clause: Value) {
    match query.remove(key) {
        None => {
            query.insert(key.to_string(), clause);
        }
        Some(existing) => {
            push_and(query, single(key, existing));
            push_and(query, single(key, clause));
        }
    }
}

fn push_and(query: &mut Document, clause: Document) {
    let entry = query
        .entry("$and".to_string())
        .or_insert_with(|| Value::Array(Vec::new()));

    if !entry.is_array() {
        let previous = entry.take();
        *entry = Value::Array(vec![previous]);
    }
    if let Value::Array(items) = entry {
        items.push(Value::Object(clause));
    }
}
