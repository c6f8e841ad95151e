use pulse_db::StorePath;
use pulse_types::models::Record;
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use crate::error::{Result, SyncError};

/// Decode one record; a malformed record is an error.
pub(crate) fn decode<T: Record>(path: &StorePath, value: Value) -> Result<T> {
    let record: T = serde_json::from_value(value).map_err(|e| SyncError::InvalidRecord {
        path: path.to_string(),
        reason: e.to_string(),
    })?;
    record.check().map_err(|reason| SyncError::InvalidRecord {
        path: path.to_string(),
        reason,
    })?;
    Ok(record)
}

/// Decode every child of a collection in store order. Malformed children are
/// skipped so one bad record cannot hide the rest.
pub(crate) fn decode_children<T: Record>(path: &StorePath, value: Option<Value>) -> Vec<(String, T)> {
    let children = match value {
        None => return Vec::new(),
        Some(Value::Object(children)) => children,
        Some(other) => {
            warn!("Expected a collection at {}, found {}", path, other);
            return Vec::new();
        }
    };

    children
        .into_iter()
        .filter_map(|(key, child)| {
            let child_path = path.child(&key).ok()?;
            match decode::<T>(&child_path, child) {
                Ok(record) => Some((key, record)),
                Err(e) => {
                    warn!("Skipping record: {}", e);
                    None
                }
            }
        })
        .collect()
}

pub(crate) fn encode<T: Serialize>(path: &StorePath, record: &T) -> Result<Value> {
    serde_json::to_value(record).map_err(|e| SyncError::InvalidRecord {
        path: path.to_string(),
        reason: e.to_string(),
    })
}
