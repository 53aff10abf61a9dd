//! Small tolerant-coercion helpers shared by every contract's normalize
//! pass, mirroring the original's free functions in `core/contracts.py`.

use serde_json::Value;
use std::collections::BTreeMap;

pub fn is_uuid(value: &str) -> bool {
    uuid::Uuid::parse_str(value).is_ok()
}

pub fn is_iso8601(value: &str) -> bool {
    if value.trim().is_empty() {
        return false;
    }
    let v = value.replace('Z', "+00:00");
    chrono::DateTime::parse_from_rfc3339(&v).is_ok()
}

pub fn new_uuid() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Returns the first present, non-null value among `keys`.
pub fn first_present<'a>(obj: &'a serde_json::Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|k| obj.get(*k).filter(|v| !v.is_null()))
}

/// Copies the first present aliased value into each canonical key, in
/// place. When `overwrite` is false, a canonical key already holding a
/// non-null value is left untouched.
pub fn normalize_key_aliases(
    obj: &mut serde_json::Map<String, Value>,
    aliases: &[(&str, &[&str])],
    overwrite: bool,
) {
    for (canonical, alts) in aliases {
        if !overwrite {
            if let Some(v) = obj.get(*canonical) {
                if !v.is_null() {
                    continue;
                }
            }
        }
        if let Some(v) = first_present(obj, alts) {
            let v = v.clone();
            obj.insert((*canonical).to_string(), v);
        }
    }
}

pub fn coerce_bool_int(value: Option<&Value>, default: i64) -> i64 {
    match value {
        Some(Value::Bool(b)) => i64::from(*b),
        Some(Value::Number(n)) => {
            if n.as_i64().unwrap_or(0) != 0 {
                1
            } else {
                0
            }
        }
        Some(Value::String(s)) => {
            let t = s.trim().to_ascii_lowercase();
            if ["1", "true", "yes", "y"].contains(&t.as_str()) {
                1
            } else if ["0", "false", "no", "n"].contains(&t.as_str()) {
                0
            } else {
                default
            }
        }
        _ => default,
    }
}

pub fn coerce_int(value: Option<&Value>, default: i64) -> i64 {
    match value {
        Some(Value::Number(n)) => n.as_i64().unwrap_or(default),
        Some(Value::String(s)) => s.trim().parse::<i64>().unwrap_or(default),
        _ => default,
    }
}

pub fn as_str(value: Option<&Value>) -> Option<&str> {
    value.and_then(Value::as_str)
}

pub fn as_string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        Some(Value::String(s)) => vec![s.clone()],
        _ => Vec::new(),
    }
}

/// A deterministic id-rename map: a non-UUID id is assigned a fresh UUID
/// the first time it is seen and the same UUID thereafter.
#[derive(Debug, Default)]
pub struct IdMap {
    map: BTreeMap<String, String>,
}

impl IdMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn map_id(&mut self, value: Option<&str>) -> String {
        match value {
            Some(v) if !v.is_empty() => {
                if is_uuid(v) {
                    v.to_string()
                } else {
                    self.map.entry(v.to_string()).or_insert_with(new_uuid).clone()
                }
            }
            _ => new_uuid(),
        }
    }

    pub fn original_key_for(&self, canonical: &str) -> Option<&str> {
        self.map
            .iter()
            .find(|(_, v)| v.as_str() == canonical)
            .map(|(k, _)| k.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_map_is_stable_for_repeated_non_uuid_ids() {
        let mut m = IdMap::new();
        let a = m.map_id(Some("task-1"));
        let b = m.map_id(Some("task-1"));
        assert_eq!(a, b);
        assert!(is_uuid(&a));
    }

    #[test]
    fn id_map_passes_through_real_uuids() {
        let mut m = IdMap::new();
        let u = new_uuid();
        assert_eq!(m.map_id(Some(&u)), u);
    }

    #[test]
    fn coerce_bool_int_accepts_common_truthy_strings() {
        assert_eq!(coerce_bool_int(Some(&Value::String("yes".into())), 0), 1);
        assert_eq!(coerce_bool_int(Some(&Value::String("no".into())), 1), 0);
    }
}
