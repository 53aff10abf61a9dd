//! Conversions between the closed-vocabulary enums in `argentor_core`/
//! `argentor_graph` and the TEXT columns they're stored as. Enums already
//! carry the right `serde(rename_all = ...)` casing, so round-tripping
//! through `serde_json` (stripping/adding the surrounding quotes) reuses
//! that mapping instead of hand-listing every variant again.

use crate::error::{StorageError, StorageResult};
use serde::de::DeserializeOwned;
use serde::Serialize;

pub fn to_text<T: Serialize>(value: &T, column: &'static str) -> StorageResult<String> {
    let json = serde_json::to_string(value)?;
    json.strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .map(str::to_string)
        .ok_or_else(|| StorageError::InvalidValue {
            column,
            reason: format!("expected a JSON string, got {json}"),
        })
}

pub fn from_text<T: DeserializeOwned>(text: &str, column: &'static str) -> StorageResult<T> {
    serde_json::from_str(&format!("{text:?}")).map_err(|e| StorageError::InvalidValue {
        column,
        reason: e.to_string(),
    })
}

pub fn json_to_text<T: Serialize>(value: &T) -> StorageResult<String> {
    Ok(serde_json::to_string(value)?)
}

pub fn text_to_json<T: DeserializeOwned>(text: &str, column: &'static str) -> StorageResult<T> {
    serde_json::from_str(text).map_err(|e| StorageError::InvalidValue {
        column,
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use argentor_core::TaskStatus;

    #[test]
    fn round_trips_an_enum_through_text() {
        let text = to_text(&TaskStatus::ReadyToCheck, "status").unwrap();
        assert_eq!(text, "READY_TO_CHECK");
        let back: TaskStatus = from_text(&text, "status").unwrap();
        assert_eq!(back, TaskStatus::ReadyToCheck);
    }
}
