//! Filter evaluation, update application and sort ordering over JSON documents
//!
//! Understands the document-database operator subset the query builders
//! emit: field equality (an array field matches when it contains the value),
//! dotted paths, `$eq`, `$ne`, `$in`, `$nin`, `$exists`, `$gt`, `$gte`,
//! `$lt`, `$lte`, `$or`, `$and`, and the update operators `$set`, `$unset`,
//! `$inc`, `$setOnInsert`.

use crate::core::{Document, StorageError};
use crate::storage::StorageResult;
use serde_json::{Number, Value};
use std::cmp::Ordering;

/// Check a document against a filter
pub fn matches(doc: &Document, filter: &Document) -> StorageResult<bool> {
    for (key, condition) in filter {
        let matched = match key.as_str() {
            "$or" => {
                let mut any = false;
                for clause in clauses(key, condition)? {
                    if matches(doc, clause)? {
                        any = true;
                        break;
                    }
                }
                any
            }
            "$and" => {
                let mut all = true;
                for clause in clauses(key, condition)? {
                    if !matches(doc, clause)? {
                        all = false;
                        break;
                    }
                }
                all
            }
            op if op.starts_with('$') => {
                return Err(StorageError::invalid_filter(format!(
                    "unsupported top-level operator {}",
                    op
                )))
            }
            path => matches_condition(lookup(doc, path), condition)?,
        };

        if !matched {
            return Ok(false);
        }
    }
    Ok(true)
}

fn clauses<'a>(op: &str, value: &'a Value) -> StorageResult<Vec<&'a Document>> {
    let items = value
        .as_array()
        .ok_or_else(|| StorageError::invalid_filter(format!("{} expects an array", op)))?;

    items
        .iter()
        .map(|item| {
            item.as_object()
                .ok_or_else(|| StorageError::invalid_filter(format!("{} expects documents", op)))
        })
        .collect()
}

/// An object whose keys are all operators, like `{"$in": [...]}`
fn operator_document(condition: &Value) -> Option<&Document> {
    match condition {
        Value::Object(map) if !map.is_empty() && map.keys().all(|k| k.starts_with('$')) => Some(map),
        _ => None,
    }
}

fn matches_condition(value: Option<&Value>, condition: &Value) -> StorageResult<bool> {
    let Some(operators) = operator_document(condition) else {
        return Ok(equals(value, condition));
    };

    for (op, operand) in operators {
        let matched = match op.as_str() {
            "$eq" => equals(value, operand),
            "$ne" => !equals(value, operand),
            "$in" => in_list(value, op, operand)?,
            "$nin" => !in_list(value, op, operand)?,
            "$exists" => {
                let expected = operand.as_bool().ok_or_else(|| {
                    StorageError::invalid_filter("$exists expects a boolean")
                })?;
                value.is_some() == expected
            }
            "$gt" => compares(value, operand, |o| o == Ordering::Greater),
            "$gte" => compares(value, operand, |o| o != Ordering::Less),
            "$lt" => compares(value, operand, |o| o == Ordering::Less),
            "$lte" => compares(value, operand, |o| o != Ordering::Greater),
            other => {
                return Err(StorageError::invalid_filter(format!(
                    "unsupported operator {}",
                    other
                )))
            }
        };

        if !matched {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Equality with the document-database array rule: an array field matches a
/// scalar when any element equals it. A missing field equals `null`.
fn equals(value: Option<&Value>, expected: &Value) -> bool {
    match value {
        None => expected.is_null(),
        Some(Value::Array(items)) if !expected.is_array() => {
            items.iter().any(|item| same_value(item, expected))
        }
        Some(actual) => same_value(actual, expected),
    }
}

fn same_value(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => numbers_equal(x, y),
        _ => a == b,
    }
}

fn numbers_equal(x: &Number, y: &Number) -> bool {
    match (x.as_i64(), y.as_i64()) {
        (Some(a), Some(b)) => a == b,
        _ => x.as_f64() == y.as_f64(),
    }
}

fn in_list(value: Option<&Value>, op: &str, operand: &Value) -> StorageResult<bool> {
    let candidates = operand
        .as_array()
        .ok_or_else(|| StorageError::invalid_filter(format!("{} expects an array", op)))?;
    Ok(candidates.iter().any(|candidate| equals(value, candidate)))
}

fn compares(value: Option<&Value>, operand: &Value, accept: impl Fn(Ordering) -> bool) -> bool {
    let comparable = |v: &Value| match (v, operand) {
        (Value::Number(_), Value::Number(_)) | (Value::String(_), Value::String(_)) => {
            accept(compare_values(v, operand))
        }
        _ => false,
    };

    match value {
        Some(Value::Array(items)) => items.iter().any(comparable),
        Some(v) => comparable(v),
        None => false,
    }
}

/// Resolve a dotted path inside a document
pub fn lookup<'a>(doc: &'a Document, path: &str) -> Option<&'a Value> {
    let mut parts = path.split('.');
    let mut current = doc.get(parts.next()?)?;

    for part in parts {
        current = match current {
            Value::Object(map) => map.get(part)?,
            Value::Array(items) => items.get(part.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

fn set_path(doc: &mut Document, path: &str, value: Value) -> StorageResult<()> {
    let mut parts: Vec<&str> = path.split('.').collect();
    let last = parts.pop().unwrap_or(path);
    let mut current = doc;

    for part in parts {
        let entry = current
            .entry(part.to_string())
            .or_insert_with(|| Value::Object(Document::new()));
        current = entry.as_object_mut().ok_or_else(|| {
            StorageError::invalid_update(format!("cannot set {}: {} is not a document", path, part))
        })?;
    }

    current.insert(last.to_string(), value);
    Ok(())
}

fn unset_path(doc: &mut Document, path: &str) {
    match path.rsplit_once('.') {
        None => {
            doc.remove(path);
        }
        Some((parent, last)) => {
            let mut current = doc;
            for part in parent.split('.') {
                match current.get_mut(part).and_then(Value::as_object_mut) {
                    Some(next) => current = next,
                    None => return,
                }
            }
            current.remove(last);
        }
    }
}

fn increment_path(doc: &mut Document, path: &str, delta: &Value) -> StorageResult<()> {
    let delta = match delta {
        Value::Number(n) => n,
        _ => {
            return Err(StorageError::invalid_update(format!(
                "$inc of {} expects a number",
                path
            )))
        }
    };

    let updated = match lookup(doc, path) {
        None | Some(Value::Null) => Value::Number(delta.clone()),
        Some(Value::Number(current)) => match (current.as_i64(), delta.as_i64()) {
            (Some(a), Some(b)) => Value::from(a.saturating_add(b)),
            _ => Number::from_f64(current.as_f64().unwrap_or(0.0) + delta.as_f64().unwrap_or(0.0))
                .map(Value::Number)
                .ok_or_else(|| StorageError::invalid_update(format!("$inc of {} overflowed", path)))?,
        },
        Some(_) => {
            return Err(StorageError::invalid_update(format!(
                "cannot $inc non-numeric field {}",
                path
            )))
        }
    };

    set_path(doc, path, updated)
}

/// Apply an update document in place
///
/// `$setOnInsert` is only honoured when `inserting` is true.
pub fn apply_update(doc: &mut Document, update: &Document, inserting: bool) -> StorageResult<()> {
    for (op, fields) in update {
        let fields = fields.as_object().ok_or_else(|| {
            StorageError::invalid_update(format!("{} expects a document", op))
        })?;

        match op.as_str() {
            "$set" => {
                for (path, value) in fields {
                    set_path(doc, path, value.clone())?;
                }
            }
            "$setOnInsert" => {
                if inserting {
                    for (path, value) in fields {
                        set_path(doc, path, value.clone())?;
                    }
                }
            }
            "$unset" => {
                for path in fields.keys() {
                    unset_path(doc, path);
                }
            }
            "$inc" => {
                for (path, delta) in fields {
                    increment_path(doc, path, delta)?;
                }
            }
            other => {
                return Err(StorageError::invalid_update(format!(
                    "unsupported update operator {}",
                    other
                )))
            }
        }
    }
    Ok(())
}

/// Starting document for an upsert: the plain equality fields of the filter
pub fn seed_from_filter(filter: &Document) -> StorageResult<Document> {
    let mut doc = Document::new();
    for (key, condition) in filter {
        if key.starts_with('$') || operator_document(condition).is_some() {
            continue;
        }
        set_path(&mut doc, key, condition.clone())?;
    }
    Ok(doc)
}

/// Total order over JSON values for sorting: null, booleans, numbers,
/// strings, arrays, documents
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    fn rank(v: &Value) -> u8 {
        match v {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            Value::Array(_) => 4,
            Value::Object(_) => 5,
        }
    }

    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(i), Some(j)) => i.cmp(&j),
            _ => {
                let fx = x.as_f64().unwrap_or(0.0);
                let fy = y.as_f64().unwrap_or(0.0);
                fx.partial_cmp(&fy).unwrap_or(Ordering::Equal)
            }
        },
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Array(x), Value::Array(y)) => x.len().cmp(&y.len()),
        (Value::Object(x), Value::Object(y)) => x.len().cmp(&y.len()),
        _ => rank(a).cmp(&rank(b)),
    }
}

/// Compare two documents by sort fields (`-field` for descending)
pub fn compare_documents(a: &Document, b: &Document, sort: &[String]) -> Ordering {
    for field in sort {
        let (path, descending) = match field.strip_prefix('-') {
            Some(path) => (path, true),
            None => (field.as_str(), false),
        };

        let ordering = match (lookup(a, path), lookup(b, path)) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (Some(x), Some(y)) => compare_values(x, y),
        };

        let ordering = if descending { ordering.reverse() } else { ordering };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_equality_and_array_membership() {
        let d = doc(json!({"name": "a", "_rperm": ["u1", "*"], "n": 2}));

        assert!(matches(&d, &doc(json!({"name": "a"}))).unwrap());
        assert!(matches(&d, &doc(json!({"_rperm": "u1"}))).unwrap());
        assert!(matches(&d, &doc(json!({"n": 2.0}))).unwrap());
        assert!(!matches(&d, &doc(json!({"name": "b"}))).unwrap());
        assert!(matches(&d, &doc(json!({"missing": null}))).unwrap());
    }

    #[test]
    fn test_read_check_shape() {
        let filter = doc(json!({
            "$or": [
                {"_rperm": {"$exists": false}},
                {"_rperm": {"$in": ["u1", "*", "role:admin"]}}
            ]
        }));

        assert!(matches(&doc(json!({"x": 1})), &filter).unwrap());
        assert!(matches(&doc(json!({"_rperm": ["role:admin"]})), &filter).unwrap());
        assert!(!matches(&doc(json!({"_rperm": ["u2"]})), &filter).unwrap());
        assert!(!matches(&doc(json!({"_rperm": []})), &filter).unwrap());
    }

    #[test]
    fn test_comparisons_and_and() {
        let d = doc(json!({"n": 5, "meta": {"level": "b"}}));

        assert!(matches(&d, &doc(json!({"n": {"$gt": 4, "$lte": 5}}))).unwrap());
        assert!(!matches(&d, &doc(json!({"n": {"$lt": 5}}))).unwrap());
        assert!(matches(&d, &doc(json!({"meta.level": {"$gte": "a"}}))).unwrap());
        assert!(matches(&d, &doc(json!({"$and": [{"n": 5}, {"n": {"$ne": 6}}]}))).unwrap());
        assert!(matches(&d, &doc(json!({"n": {"$nin": [1, 2]}}))).unwrap());
    }

    #[test]
    fn test_unknown_operator_is_error() {
        let d = doc(json!({"n": 5}));
        assert!(matches(&d, &doc(json!({"n": {"$regex": "5"}}))).is_err());
        assert!(matches(&d, &doc(json!({"$where": "true"}))).is_err());
        assert!(matches(&d, &doc(json!({"$or": {"n": 5}}))).is_err());
    }

    #[test]
    fn test_apply_update() {
        let mut d = doc(json!({"_id": "a", "name": "x", "count": 1, "gone": true}));
        let update = doc(json!({
            "$set": {"name": "y", "meta.tag": "t"},
            "$unset": {"gone": ""},
            "$inc": {"count": 2, "fresh": 1},
            "$setOnInsert": {"_created_at": "never"}
        }));

        apply_update(&mut d, &update, false).unwrap();
        assert_eq!(
            Value::Object(d),
            json!({"_id": "a", "name": "y", "count": 3, "fresh": 1, "meta": {"tag": "t"}})
        );
    }

    #[test]
    fn test_inc_on_string_fails() {
        let mut d = doc(json!({"name": "x"}));
        let update = doc(json!({"$inc": {"name": 1}}));
        assert!(apply_update(&mut d, &update, false).is_err());
    }

    #[test]
    fn test_seed_from_filter_skips_operators() {
        let filter = doc(json!({
            "name": "admin",
            "_wperm": {"$in": ["u1"]},
            "$or": [{"a": 1}]
        }));
        assert_eq!(Value::Object(seed_from_filter(&filter).unwrap()), json!({"name": "admin"}));
    }

    #[test]
    fn test_sort_order() {
        let a = doc(json!({"n": 1, "s": "b"}));
        let b = doc(json!({"n": 2, "s": "a"}));

        assert_eq!(compare_documents(&a, &b, &["n".to_string()]), Ordering::Less);
        assert_eq!(compare_documents(&a, &b, &["-n".to_string()]), Ordering::Greater);
        assert_eq!(compare_documents(&a, &b, &["s".to_string()]), Ordering::Greater);
    }
}
