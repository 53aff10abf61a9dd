//! The JSON repair pass (spec §6 "LLM transport"): models occasionally wrap
//! their JSON in prose, leave trailing commas, or emit raw control
//! characters inside string literals (multi-line code pasted verbatim).
//! These are the same three best-effort repairs `core/llm_client.py` applies
//! before giving up and asking the model to rewrite its own output.

use regex::Regex;
use std::sync::OnceLock;

fn json_object_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)\{.*\}").expect("static regex"))
}

fn trailing_comma_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r",\s*([}\]])").expect("static regex"))
}

/// Extracts the largest `{...}` block from `text`, or the whole trimmed
/// text if it already looks like a bare JSON object.
pub fn extract_json_object(text: &str) -> Result<String, String> {
    let trimmed = text.trim();
    if trimmed.starts_with('{') && trimmed.ends_with('}') {
        return Ok(trimmed.to_string());
    }
    json_object_re()
        .find(trimmed)
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| "response does not contain a JSON object".to_string())
}

/// Removes trailing commas before a closing `}` or `]`.
pub fn remove_trailing_commas(json_text: &str) -> String {
    trailing_comma_re().replace_all(json_text, "$1").into_owned()
}

/// Escapes raw control characters (newline, tab, etc.) found inside quoted
/// string literals, leaving the rest of the document untouched. Walks the
/// text character by character tracking whether we're inside a string and
/// whether the previous character was a backslash escape.
pub fn escape_control_chars_in_json_strings(json_text: &str) -> String {
    let mut out = String::with_capacity(json_text.len());
    let mut in_string = false;
    let mut escape = false;

    for ch in json_text.chars() {
        if !in_string {
            out.push(ch);
            if ch == '"' {
                in_string = true;
            }
            continue;
        }

        if escape {
            out.push(ch);
            escape = false;
            continue;
        }

        if ch == '\\' {
            out.push(ch);
            escape = true;
            continue;
        }

        if ch == '"' {
            out.push(ch);
            in_string = false;
            continue;
        }

        if (ch as u32) < 0x20 {
            match ch {
                '\n' => out.push_str("\\n"),
                '\r' => out.push_str("\\r"),
                '\t' => out.push_str("\\t"),
                '\u{8}' => out.push_str("\\b"),
                '\u{c}' => out.push_str("\\f"),
                other => out.push_str(&format!("\\u{:04x}", other as u32)),
            }
            continue;
        }

        out.push(ch);
    }

    out
}

const REFUSAL_HINTS: &[&str] = &[
    "i can't help",
    "i can't comply",
    "i'm sorry",
    "cannot comply",
    "i can't do that",
    "refuse",
    "cannot assist",
    "i can't assist",
];

/// Heuristic check for a provider refusal, used to distinguish `LLM_REFUSAL`
/// from `LLM_UNPARSEABLE` when JSON extraction fails.
pub fn looks_like_refusal(text: &str) -> bool {
    let lower = text.trim().to_lowercase();
    if lower.is_empty() {
        return false;
    }
    REFUSAL_HINTS.iter().any(|hint| lower.contains(hint))
}

/// The prompt used to ask a model to rewrite its own invalid JSON, once,
/// with no recursion.
pub fn build_json_repair_prompt(raw_response: &str) -> String {
    format!(
        "You previously responded with INVALID JSON.\n\
         Please rewrite it as a single VALID JSON object only (no markdown, no code fences, no commentary).\n\
         Rules:\n\
         - Output must be a JSON object starting with '{{' and ending with '}}'.\n\
         - Remove trailing commas.\n\
         - Escape all newlines inside strings as \\n.\n\
         - Preserve the original fields/values as much as possible.\n\
         \n\
         INVALID_JSON_START\n\
         {raw_response}\n\
         INVALID_JSON_END\n"
    )
}

/// Attempts to parse `raw` as a JSON object, applying the three repairs in
/// order (extract → escape control chars → strip trailing commas) only as
/// each prior attempt fails.
pub fn parse_with_repairs(raw: &str) -> Result<serde_json::Value, String> {
    let extracted = extract_json_object(raw)?;

    if let Ok(v) = serde_json::from_str::<serde_json::Value>(&extracted) {
        return ensure_object(v);
    }

    let escaped = escape_control_chars_in_json_strings(&extracted);
    if let Ok(v) = serde_json::from_str::<serde_json::Value>(&escaped) {
        return ensure_object(v);
    }

    let stripped = remove_trailing_commas(&escaped);
    serde_json::from_str::<serde_json::Value>(&stripped)
        .map_err(|e| e.to_string())
        .and_then(ensure_object)
}

fn ensure_object(v: serde_json::Value) -> Result<serde_json::Value, String> {
    if v.is_object() {
        Ok(v)
    } else {
        Err("parsed JSON is not an object".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_object_embedded_in_prose() {
        let text = "Sure, here you go:\n{\"a\": 1}\nHope that helps!";
        assert_eq!(extract_json_object(text).unwrap(), "{\"a\": 1}");
    }

    #[test]
    fn removes_trailing_commas_in_objects_and_arrays() {
        assert_eq!(remove_trailing_commas("{\"a\": [1,2,],}"), "{\"a\": [1,2]}");
    }

    #[test]
    fn escapes_raw_newline_inside_string_literal() {
        let text = "{\"code\": \"line one\nline two\"}";
        let repaired = escape_control_chars_in_json_strings(text);
        assert!(serde_json::from_str::<serde_json::Value>(&repaired).is_ok());
    }

    #[test]
    fn parse_with_repairs_recovers_from_trailing_comma_after_escaping() {
        let raw = "{\"summary\": \"ok\",}";
        let parsed = parse_with_repairs(raw).unwrap();
        assert_eq!(parsed["summary"], "ok");
    }

    #[test]
    fn detects_common_refusal_phrasing() {
        assert!(looks_like_refusal("I'm sorry, I can't help with that request."));
        assert!(!looks_like_refusal("{\"result_type\": \"NOOP\"}"));
    }
}
