//! TASK_CHECK / PLAN_REVIEW contract (reviewer output), `review_v1`.
//! The `review_target` discriminator (`PLAN` or `NODE`) is the same
//! payload shape for both contracts named in spec §4.1.

use crate::util::{as_str, coerce_int, normalize_key_aliases};
use serde_json::{json, Map, Value};

pub const SCHEMA_VERSION: &str = "review_v1";

const ALLOWED_REVIEW_ACTIONS: &[&str] = &["APPROVE", "MODIFY", "REQUEST_EXTERNAL_INPUT"];
const ALLOWED_SUGGESTION_PRIORITIES: &[&str] = &["HIGH", "MED", "LOW"];

pub fn normalize(obj: &mut Value, task_id: &str, review_target: &str) {
    let Some(map) = obj.as_object_mut() else { return };

    normalize_key_aliases(
        map,
        &[("schema_version", &["schema", "version"]), ("task_id", &["id", "taskId"])],
        false,
    );

    if let Some(Value::Object(rr)) = map.get("review_result").cloned() {
        fold_wrapped_review_result(map, &rr);
    }

    let sv = match map.get("schema_version").and_then(Value::as_str) {
        Some(s) => {
            let t = s.trim();
            let lower = t.to_ascii_lowercase();
            let short_forms = ["v1", "v01", "1", "review1", "review_v01"];
            let long_forms = ["xiaojing_review", "xiaojing_review_v0", "review_v1", "xiaojing_review_v1.0"];
            if long_forms.contains(&lower.as_str())
                || short_forms.contains(&lower.as_str())
                || lower.starts_with("xiaojing_review")
                || lower.starts_with("review_v1")
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

    let rt = match map.get("review_target").and_then(Value::as_str) {
        Some(rt) => {
            let t = rt.trim().to_ascii_uppercase();
            if ["PLAN_REVIEW", "PLAN_JSON", "TOP_TASK"].contains(&t.as_str()) {
                "PLAN".to_string()
            } else {
                t
            }
        }
        None => review_target.to_string(),
    };
    map.insert("review_target".to_string(), json!(rt));

    let score = match map.get("total_score") {
        Some(Value::String(s)) => coerce_int(Some(&Value::String(s.clone())), 0),
        Some(v @ Value::Number(_)) => coerce_int(Some(v), 0),
        _ => 0,
    };
    map.insert("total_score".to_string(), json!(score));

    let mut action = map
        .get("action_required")
        .and_then(Value::as_str)
        .map(|s| s.trim().to_ascii_uppercase())
        .unwrap_or_default();
    if !ALLOWED_REVIEW_ACTIONS.contains(&action.as_str()) {
        action = "MODIFY".to_string();
    }
    if score >= 90 {
        action = "APPROVE".to_string();
    } else if action == "APPROVE" {
        action = "MODIFY".to_string();
    }
    map.insert("action_required".to_string(), json!(action));

    let summary = map
        .get("summary")
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .map(str::to_string)
        .or_else(|| {
            map.get("feedback")
                .and_then(Value::as_str)
                .filter(|s| !s.trim().is_empty())
                .map(|s| s.trim().to_string())
        })
        .unwrap_or_else(|| "No summary provided.".to_string());
    map.insert("summary".to_string(), json!(summary));

    let breakdown_present = matches!(map.get("breakdown"), Some(Value::Array(a)) if !a.is_empty());
    if !breakdown_present {
        map.insert(
            "breakdown".to_string(),
            json!([{"dimension": "overall", "score": score, "max_score": 100, "issues": []}]),
        );
    }

    let suggestions = map
        .get("suggestions")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    map.insert(
        "suggestions".to_string(),
        Value::Array(normalize_suggestions(&suggestions)),
    );
}

fn fold_wrapped_review_result(map: &mut Map<String, Value>, rr: &Map<String, Value>) {
    let rr_score = match rr.get("total_score") {
        Some(Value::String(s)) => Some(coerce_int(Some(&Value::String(s.clone())), 0)),
        Some(v @ Value::Number(_)) => v.as_i64(),
        _ => None,
    };
    if let Some(rr_score) = rr_score {
        let current = map.get("total_score").and_then(Value::as_i64).unwrap_or(0);
        if !map.get("total_score").is_some_and(Value::is_number) || current == 0 {
            map.insert("total_score".to_string(), json!(rr_score));
        }
    }

    if let Some(rr_action) = rr.get("action_required").and_then(Value::as_str) {
        let has = map
            .get("action_required")
            .and_then(Value::as_str)
            .is_some_and(|s| !s.is_empty());
        if !has {
            map.insert("action_required".to_string(), json!(rr_action));
        }
    }

    let breakdown_present = matches!(map.get("breakdown"), Some(Value::Array(a)) if !a.is_empty());
    if !breakdown_present {
        let dims = rr
            .get("dimension_scores")
            .or_else(|| rr.get("scores"))
            .and_then(Value::as_array);
        if let Some(dims) = dims {
            if dims.iter().all(Value::is_object) {
                let breakdown: Vec<Value> = dims
                    .iter()
                    .map(|d| {
                        let d = d.as_object().expect("checked all objects above");
                        let dim = as_str(d.get("dimension")).unwrap_or("overall").to_string();
                        let sc = coerce_int(d.get("score"), 0);
                        let comment = as_str(d.get("comment")).unwrap_or("").trim().to_string();
                        let issues = if comment.is_empty() {
                            Vec::new()
                        } else {
                            vec![json!({
                                "problem": comment,
                                "evidence": comment,
                                "impact": "May block execution or reduce quality.",
                                "suggestion": "Follow the reviewer guidance to fix this issue.",
                                "acceptance_criteria": "Meets rubric requirements.",
                            })]
                        };
                        json!({"dimension": dim, "score": sc, "max_score": 100, "issues": issues})
                    })
                    .collect();
                if !breakdown.is_empty() {
                    map.insert("breakdown".to_string(), Value::Array(breakdown));
                }
            }
        }
    }

    let suggestions_present = matches!(map.get("suggestions"), Some(Value::Array(a)) if !a.is_empty());
    if !suggestions_present {
        let rr_sugs = rr
            .get("suggestions")
            .or_else(|| rr.get("recommendations"))
            .and_then(Value::as_array);
        if let Some(rr_sugs) = rr_sugs {
            if rr_sugs.iter().all(Value::is_object) {
                let normalized = normalize_suggestions(rr_sugs);
                if !normalized.is_empty() {
                    map.insert("suggestions".to_string(), Value::Array(normalized));
                }
            }
        }
    }
}

fn normalize_suggestions(suggestions: &[Value]) -> Vec<Value> {
    suggestions
        .iter()
        .filter_map(Value::as_object)
        .map(|s| {
            let pr_raw = as_str(s.get("priority")).unwrap_or("").trim().to_ascii_uppercase();
            let pr_norm = match pr_raw.as_str() {
                "H" | "HI" | "URGENT" | "CRITICAL" => "HIGH",
                "M" | "MID" | "MEDIUM" | "NORMAL" => "MED",
                "L" | "MINOR" | "TRIVIAL" => "LOW",
                other if ALLOWED_SUGGESTION_PRIORITIES.contains(&other) => other,
                _ => "MED",
            };
            let change = as_str(s.get("change"))
                .filter(|s| !s.trim().is_empty())
                .unwrap_or("Clarify and adjust output as requested.")
                .trim()
                .to_string();
            let steps: Vec<String> = s
                .get("steps")
                .and_then(Value::as_array)
                .map(|a| {
                    a.iter()
                        .filter_map(|v| v.as_str())
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default();
            let acceptance = as_str(s.get("acceptance_criteria"))
                .filter(|s| !s.trim().is_empty())
                .unwrap_or("Meets rubric requirements.")
                .trim()
                .to_string();
            json!({
                "priority": pr_norm,
                "change": change,
                "steps": steps,
                "acceptance_criteria": acceptance,
            })
        })
        .collect()
}

pub fn validate(obj: &Value, review_target: &str) -> Result<(), String> {
    let map = obj.as_object().ok_or_else(|| "payload must be object".to_string())?;

    for key in [
        "schema_version",
        "task_id",
        "review_target",
        "total_score",
        "breakdown",
        "summary",
        "action_required",
        "suggestions",
    ] {
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
    if map.get("review_target").and_then(Value::as_str) != Some(review_target) {
        return Err(format!(
            "review_target mismatch (got {}, expected {review_target})",
            map.get("review_target").cloned().unwrap_or(Value::Null)
        ));
    }
    if !map.get("task_id").is_some_and(Value::is_string) {
        return Err("task_id must be string".to_string());
    }
    let total = map
        .get("total_score")
        .and_then(Value::as_i64)
        .ok_or_else(|| "total_score must be int".to_string())?;
    if !(0..=100).contains(&total) {
        return Err("total_score out of range".to_string());
    }
    let action = map.get("action_required").and_then(Value::as_str).unwrap_or("");
    if !ALLOWED_REVIEW_ACTIONS.contains(&action) {
        return Err("invalid action_required".to_string());
    }
    if total >= 90 && action != "APPROVE" {
        return Err("total_score>=90 requires action_required=APPROVE".to_string());
    }
    if total < 90 && action == "APPROVE" {
        return Err("total_score<90 cannot be APPROVE".to_string());
    }

    let breakdown = map
        .get("breakdown")
        .and_then(Value::as_array)
        .ok_or_else(|| "breakdown must be array".to_string())?;
    for dim in breakdown {
        let dim = dim.as_object().ok_or_else(|| "breakdown item must be object".to_string())?;
        for key in ["dimension", "score", "max_score", "issues"] {
            if !dim.contains_key(key) {
                return Err(format!("breakdown missing {key}"));
            }
        }
        if !dim.get("dimension").is_some_and(Value::is_string) {
            return Err("breakdown.dimension must be string".to_string());
        }
        if !dim.get("score").is_some_and(Value::is_i64) || !dim.get("max_score").is_some_and(Value::is_i64) {
            return Err("breakdown.score/max_score must be int".to_string());
        }
        let issues = dim.get("issues").and_then(Value::as_array).ok_or_else(|| "breakdown.issues must be array".to_string())?;
        for issue in issues {
            let issue = issue.as_object().ok_or_else(|| "issue must be object".to_string())?;
            for key in ["problem", "evidence", "impact", "suggestion", "acceptance_criteria"] {
                if !issue.get(key).is_some_and(Value::is_string) {
                    return Err(format!("issue.{key} must be string"));
                }
            }
        }
    }

    let suggestions = map
        .get("suggestions")
        .and_then(Value::as_array)
        .ok_or_else(|| "suggestions must be array".to_string())?;
    for s in suggestions {
        let s = s.as_object().ok_or_else(|| "suggestion must be object".to_string())?;
        let pr = s.get("priority").and_then(Value::as_str).unwrap_or("");
        if !ALLOWED_SUGGESTION_PRIORITIES.contains(&pr) {
            return Err("suggestion.priority must be HIGH|MED|LOW".to_string());
        }
        if !s.get("change").is_some_and(Value::is_string) {
            return Err("suggestion.change must be string".to_string());
        }
        let steps_ok = s
            .get("steps")
            .and_then(Value::as_array)
            .is_some_and(|a| a.iter().all(Value::is_string));
        if !steps_ok {
            return Err("suggestion.steps must be string array".to_string());
        }
        if !s.get("acceptance_criteria").is_some_and(Value::is_string) {
            return Err("suggestion.acceptance_criteria must be string".to_string());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_forces_approve_at_score_90() {
        let mut v = json!({"task_id": "t1", "total_score": 95, "action_required": "MODIFY"});
        normalize(&mut v, "t1", "NODE");
        assert_eq!(v["action_required"], "APPROVE");
    }

    #[test]
    fn normalize_demotes_approve_below_90() {
        let mut v = json!({"task_id": "t1", "total_score": 50, "action_required": "APPROVE"});
        normalize(&mut v, "t1", "NODE");
        assert_eq!(v["action_required"], "MODIFY");
    }

    #[test]
    fn normalize_folds_wrapped_review_result() {
        let mut v = json!({
            "task_id": "t1",
            "review_result": {"total_score": "42", "action_required": "modify"}
        });
        normalize(&mut v, "t1", "NODE");
        assert_eq!(v["total_score"], 42);
    }

    #[test]
    fn validate_rejects_review_target_mismatch() {
        let mut v = json!({"task_id": "t1", "total_score": 10, "action_required": "MODIFY"});
        normalize(&mut v, "t1", "PLAN");
        let err = validate(&v, "NODE").unwrap_err();
        assert!(err.contains("review_target mismatch"));
    }

    #[test]
    fn round_trips_a_valid_plan_review() {
        let mut v = json!({"task_id": "t1", "total_score": 95});
        normalize(&mut v, "t1", "PLAN");
        assert!(validate(&v, "PLAN").is_ok());
    }
}
