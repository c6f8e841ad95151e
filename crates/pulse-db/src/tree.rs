use serde_json::{Map, Value};

use crate::models::NodeRow;
use crate::path::{StorePath, check_segment};
use crate::store::StoreError;

/// Flatten `value` into `(absolute path, JSON scalar)` leaves rooted at `path`.
/// Nulls and empty objects produce no leaves; arrays are stored under their indices.
pub fn flatten(path: &StorePath, value: &Value) -> Result<Vec<(String, String)>, StoreError> {
    let mut leaves = Vec::new();
    walk(path.as_str(), value, &mut leaves)?;
    Ok(leaves)
}

fn walk(prefix: &str, value: &Value, out: &mut Vec<(String, String)>) -> Result<(), StoreError> {
    match value {
        Value::Null => {}
        Value::Object(map) => {
            for (key, child) in map {
                check_segment(key)?;
                walk(&join(prefix, key), child, out)?;
            }
        }
        Value::Array(items) => {
            for (idx, child) in items.iter().enumerate() {
                walk(&join(prefix, &idx.to_string()), child, out)?;
            }
        }
        scalar => {
            if prefix.is_empty() {
                return Err(StoreError::InvalidPath("scalar at root".into()));
            }
            out.push((prefix.to_string(), scalar.to_string()));
        }
    }
    Ok(())
}

fn join(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{}/{}", prefix, key)
    }
}

/// Rebuild a value from leaf rows ordered by insertion sequence.
/// Object children appear in the order their first leaf was written.
pub fn assemble(rows: Vec<NodeRow>) -> Result<Option<Value>, StoreError> {
    let mut root: Option<Value> = None;

    for row in rows {
        let leaf: Value = serde_json::from_str(&row.value)
            .map_err(|e| StoreError::Unavailable(anyhow::anyhow!("corrupt leaf '{}': {}", row.path, e)))?;

        if row.path.is_empty() {
            return Ok(Some(leaf));
        }

        let segments: Vec<&str> = row.path.split('/').collect();
        insert_leaf(root.get_or_insert(Value::Null), &segments, leaf);
    }

    Ok(root)
}

/// Place `leaf` under `segments`, turning any scalar met on the way into an object.
fn insert_leaf(target: &mut Value, segments: &[&str], leaf: Value) {
    let Some((first, rest)) = segments.split_first() else {
        *target = leaf;
        return;
    };
    if !target.is_object() {
        *target = Value::Object(Map::new());
    }
    if let Value::Object(map) = target {
        let child = map.entry(first.to_string()).or_insert(Value::Null);
        insert_leaf(child, rest, leaf);
    }
}
