//! TASK_ACTION contract (executor output), `task_action_v1`.

use crate::util::{as_str, coerce_int, first_present, normalize_key_aliases};
use serde_json::{json, Map, Value};

pub const SCHEMA_VERSION: &str = "task_action_v1";

const ALLOWED_ARTIFACT_FORMATS: &[&str] = &["md", "txt", "json", "html", "css", "js"];
const ALLOWED_RESULT_TYPES: &[&str] = &["NEEDS_INPUT", "ARTIFACT", "NOOP", "ERROR"];

/// Tolerant repair pass. Unwraps common envelope keys, coerces
/// `schema_version` variants, fills `task_id`, and normalizes the
/// `result_type`-specific payload shape.
pub fn normalize(obj: &mut Value, task_id: &str) {
    let Some(map) = obj.as_object_mut() else { return };

    if !map.contains_key("result_type") {
        for key in ["action", "result", "output", "data", "payload", "response"] {
            if let Some(Value::Object(inner)) = map.get(key) {
                if inner.contains_key("result_type")
                    || inner.contains_key("artifact")
                    || inner.contains_key("needs_input")
                    || inner.contains_key("error")
                {
                    let inner = inner.clone();
                    *map = inner;
                    break;
                }
            }
        }
    }

    normalize_key_aliases(
        map,
        &[("schema_version", &["schema", "version"]), ("task_id", &["id", "taskId"])],
        false,
    );

    let sv = match map.get("schema_version").and_then(Value::as_str) {
        Some(s) => {
            let t = s.trim();
            let lower = t.to_ascii_lowercase();
            if ["xiaobo_action", "xiaobo_action_v0", "action_v1", "xiaobo_action_v1.0"].contains(&lower.as_str())
                || lower.starts_with("xiaobo_action")
            {
                SCHEMA_VERSION.to_string()
            } else {
                t.to_string()
            }
        }
        None => SCHEMA_VERSION.to_string(),
    };
    map.insert("schema_version".to_string(), json!(sv));

    if map.get("task_id").and_then(Value::as_str).filter(|s| !s.is_empty()).is_none() {
        map.insert("task_id".to_string(), json!(task_id));
    }

    if let Some(rt) = map.get("result_type").and_then(Value::as_str) {
        map.insert("result_type".to_string(), json!(rt.trim().to_ascii_uppercase()));
    }

    if map.get("result_type").and_then(Value::as_str) == Some("NEEDS_INPUT") {
        normalize_needs_input(map);
    }

    if map.get("result_type").and_then(Value::as_str) == Some("ARTIFACT") {
        if let Some(Value::Object(art)) = map.get_mut("artifact") {
            if let Some(fmt) = art.get("format").and_then(Value::as_str) {
                let fmt = fmt.trim().to_ascii_lowercase();
                let fmt = fmt.strip_prefix('.').unwrap_or(&fmt).to_string();
                art.insert("format".to_string(), json!(fmt));
            }
        }
    }
}

fn normalize_needs_input(map: &mut Map<String, Value>) {
    let mut needs = match map.get("needs_input") {
        Some(Value::Object(n)) => n.clone(),
        _ => Map::new(),
    };

    let has_docs = matches!(needs.get("required_docs"), Some(Value::Array(a)) if !a.is_empty());
    if !has_docs {
        let mut normalized_docs = Vec::new();

        if let Some(Value::Array(items)) = map.get("missing_inputs") {
            for item in items {
                let Some(item) = item.as_object() else { continue };
                let name = as_str(item.get("name")).unwrap_or("").trim().to_string();
                let desc = as_str(item.get("description"))
                    .or_else(|| as_str(item.get("reason")))
                    .unwrap_or("")
                    .trim()
                    .to_string();
                let accepted_types: Vec<String> = match item.get("accepted_types").or_else(|| item.get("type")) {
                    Some(Value::Array(a)) => a.iter().filter_map(|v| v.as_str().map(str::to_string)).collect(),
                    Some(Value::String(s)) if !s.trim().is_empty() => vec![s.trim().to_string()],
                    _ => Vec::new(),
                };
                if !name.is_empty() {
                    let description = if desc.is_empty() { name.clone() } else { desc };
                    normalized_docs.push(json!({
                        "name": name,
                        "description": description,
                        "accepted_types": accepted_types,
                    }));
                }
            }
        }

        let required_context = needs
            .get("required_context")
            .or_else(|| map.get("required_context"));
        if let Some(Value::Array(items)) = required_context {
            for item in items {
                if let Some(s) = item.as_str() {
                    if !s.trim().is_empty() {
                        normalized_docs.push(json!({
                            "name": s.trim(),
                            "description": s.trim(),
                            "accepted_types": Vec::<String>::new(),
                        }));
                    }
                }
            }
        }

        if normalized_docs.is_empty() {
            let reason = as_str(needs.get("reason"))
                .or_else(|| as_str(map.get("justification")))
                .unwrap_or("")
                .trim()
                .to_string();
            let description = if reason.is_empty() {
                "Please provide missing inputs.".to_string()
            } else {
                reason
            };
            normalized_docs.push(json!({
                "name": "clarification",
                "description": description,
                "accepted_types": Vec::<String>::new(),
            }));
        }

        needs.insert("required_docs".to_string(), Value::Array(normalized_docs));
    }

    map.insert("needs_input".to_string(), Value::Object(needs));
}

/// Strict validation after normalization. Returns the failure reason on
/// the first violation found, mirroring the original's fail-fast tuple
/// return.
pub fn validate(obj: &Value) -> Result<(), String> {
    let map = obj.as_object().ok_or_else(|| "payload must be object".to_string())?;

    for key in ["schema_version", "task_id", "result_type"] {
        if !map.contains_key(key) {
            return Err(format!("missing key: {key}"));
        }
    }
    if map.get("schema_version").and_then(Value::as_str) != Some(SCHEMA_VERSION) {
        return Err(format!(
            "schema_version mismatch (got {})",
            map.get("schema_version").cloned().unwrap_or(Value::Null)
        ));
    }
    if !map.get("task_id").is_some_and(Value::is_string) {
        return Err("task_id must be string".to_string());
    }
    let result_type = map.get("result_type").and_then(Value::as_str).unwrap_or("");
    if !ALLOWED_RESULT_TYPES.contains(&result_type) {
        return Err("invalid result_type".to_string());
    }

    match result_type {
        "NEEDS_INPUT" => validate_needs_input(map),
        "ARTIFACT" => validate_artifact(map),
        "ERROR" => validate_error(map),
        _ => Ok(()),
    }
}

fn validate_needs_input(map: &Map<String, Value>) -> Result<(), String> {
    let needs = map
        .get("needs_input")
        .and_then(Value::as_object)
        .ok_or_else(|| "needs_input must be object".to_string())?;
    let docs = needs
        .get("required_docs")
        .and_then(Value::as_array)
        .filter(|a| !a.is_empty())
        .ok_or_else(|| "needs_input.required_docs must be non-empty array".to_string())?;
    for d in docs {
        let d = d.as_object().ok_or_else(|| "required_docs item must be object".to_string())?;
        if !d.get("name").is_some_and(Value::is_string) || !d.get("description").is_some_and(Value::is_string) {
            return Err("required_docs.name/description must be string".to_string());
        }
        if let Some(accepted) = d.get("accepted_types") {
            if !accepted.is_null() {
                let ok = accepted
                    .as_array()
                    .is_some_and(|a| a.iter().all(Value::is_string));
                if !ok {
                    return Err("required_docs.accepted_types must be string array".to_string());
                }
            }
        }
    }
    Ok(())
}

fn validate_artifact(map: &Map<String, Value>) -> Result<(), String> {
    let art = map
        .get("artifact")
        .and_then(Value::as_object)
        .ok_or_else(|| "artifact must be object".to_string())?;
    for key in ["name", "format", "content"] {
        let present = art.get(key).and_then(Value::as_str).is_some_and(|s| !s.is_empty());
        if !present {
            return Err(format!("artifact.{key} is required"));
        }
    }
    let fmt = art.get("format").and_then(Value::as_str).unwrap_or("");
    if !ALLOWED_ARTIFACT_FORMATS.contains(&fmt) {
        return Err("artifact.format must be md|txt|json|html|css|js".to_string());
    }
    Ok(())
}

fn validate_error(map: &Map<String, Value>) -> Result<(), String> {
    let err = map
        .get("error")
        .and_then(Value::as_object)
        .ok_or_else(|| "error must be object".to_string())?;
    if !err.get("code").is_some_and(Value::is_string) || !err.get("message").is_some_and(Value::is_string) {
        return Err("error.code/error.message must be string".to_string());
    }
    Ok(())
}

/// Helper used when an envelope holds only a quoted/unused value; kept
/// simple so callers don't depend on `coerce_int` directly.
pub fn coerce_score(v: Option<&Value>) -> i64 {
    coerce_int(v, 0)
}
