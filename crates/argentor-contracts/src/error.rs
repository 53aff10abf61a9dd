//! `ContractError` (spec §4.1): the six-field structured error produced by
//! a failed validation, plus the regex-based inference pass that turns a
//! free-text reason string into one of these when a contract function
//! only has a message to go on.

use serde::{Deserialize, Serialize};

/// A structured, deterministic contract validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractError {
    pub error_code: String,
    pub schema: String,
    pub schema_version: String,
    pub json_path: String,
    pub expected: String,
    pub actual: String,
    pub example_fix: String,
}

impl ContractError {
    pub fn new(
        error_code: impl Into<String>,
        schema: impl Into<String>,
        schema_version: impl Into<String>,
        json_path: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
        example_fix: impl Into<String>,
    ) -> Self {
        Self {
            error_code: error_code.into(),
            schema: schema.into(),
            schema_version: schema_version.into(),
            json_path: json_path.into(),
            expected: expected.into(),
            actual: actual.into(),
            example_fix: example_fix.into(),
        }
    }

    /// A short, stable one-line rendering suitable for reviewer-notes text
    /// fed back into the next generation attempt.
    pub fn format_short(&self) -> String {
        format!(
            "[{}] {}: expected {} at {}, got {} (fix: {})",
            self.error_code, self.schema, self.expected, self.json_path, self.actual, self.example_fix
        )
    }
}

/// Infers a structured [`ContractError`] from a free-text validation
/// failure reason, for call sites that only produced a message. Mirrors
/// the original's `_infer_error_from_reason` regex table.
pub fn infer_error_from_reason(reason: &str, schema: &str, schema_version: &str) -> ContractError {
    let missing_key = Regexes::missing_key()
        .captures(reason)
        .map(|c| c[1].to_string());
    let node_missing_key = Regexes::node_missing_key()
        .captures(reason)
        .map(|c| c[1].to_string());

    if Regexes::schema_version_mismatch().is_match(reason) {
        return ContractError::new(
            "SCHEMA_MISMATCH",
            schema,
            schema_version,
            "$.schema_version",
            schema_version,
            reason,
            format!("{{\"schema_version\": \"{schema_version}\"}}"),
        );
    }
    if let Some(key) = node_missing_key {
        return ContractError::new(
            "SCHEMA_MISMATCH",
            schema,
            schema_version,
            format!("$.nodes[].{key}"),
            format!("required key `{key}`"),
            reason,
            format!("{{\"{key}\": \"...\"}}"),
        );
    }
    if let Some(key) = missing_key {
        return ContractError::new(
            "SCHEMA_MISMATCH",
            schema,
            schema_version,
            format!("$.{key}"),
            format!("required key `{key}`"),
            reason,
            format!("{{\"{key}\": \"...\"}}"),
        );
    }
    if Regexes::artifact_format().is_match(reason) {
        return ContractError::new(
            "SCHEMA_MISMATCH",
            schema,
            schema_version,
            "$.artifact.format",
            "one of md|txt|json|html|css|js",
            reason,
            "{\"artifact\": {\"format\": \"md\"}}",
        );
    }
    if Regexes::suggestion_priority().is_match(reason) {
        return ContractError::new(
            "SCHEMA_MISMATCH",
            schema,
            schema_version,
            "$.suggestions[].priority",
            "one of HIGH|MED|LOW",
            reason,
            "{\"suggestions\": [{\"priority\": \"MED\"}]}",
        );
    }
    if Regexes::edge_type().is_match(reason) {
        return ContractError::new(
            "SCHEMA_MISMATCH",
            schema,
            schema_version,
            "$.edges[].edge_type",
            "one of DECOMPOSE|DEPENDS_ON|ALTERNATIVE",
            reason,
            "{\"edges\": [{\"edge_type\": \"DEPENDS_ON\"}]}",
        );
    }

    ContractError::new(
        "SCHEMA_MISMATCH",
        schema,
        schema_version,
        "$",
        "a payload conforming to the documented schema",
        reason,
        "{}",
    )
}

struct Regexes;

impl Regexes {
    fn schema_version_mismatch() -> &'static regex::Regex {
        static RE: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();
        RE.get_or_init(|| regex::Regex::new(r"(?i)schema_version mismatch").expect("valid regex"))
    }
    fn missing_key() -> &'static regex::Regex {
        static RE: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();
        RE.get_or_init(|| regex::Regex::new(r"(?i)missing (?:required )?key: (\w+)").expect("valid regex"))
    }
    fn node_missing_key() -> &'static regex::Regex {
        static RE: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();
        RE.get_or_init(|| regex::Regex::new(r"(?i)node missing key: (\w+)").expect("valid regex"))
    }
    fn artifact_format() -> &'static regex::Regex {
        static RE: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();
        RE.get_or_init(|| regex::Regex::new(r"(?i)artifact\.format must be").expect("valid regex"))
    }
    fn suggestion_priority() -> &'static regex::Regex {
        static RE: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();
        RE.get_or_init(|| regex::Regex::new(r"(?i)suggestion\.priority must be").expect("valid regex"))
    }
    fn edge_type() -> &'static regex::Regex {
        static RE: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();
        RE.get_or_init(|| regex::Regex::new(r"(?i)edge\.edge_type must be").expect("valid regex"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infers_schema_version_mismatch() {
        let e = infer_error_from_reason("schema_version mismatch (got foo)", "task_action_v1", "task_action_v1");
        assert_eq!(e.error_code, "SCHEMA_MISMATCH");
        assert_eq!(e.json_path, "$.schema_version");
    }

    #[test]
    fn infers_missing_key() {
        let e = infer_error_from_reason("missing key: task_id", "task_action_v1", "task_action_v1");
        assert_eq!(e.json_path, "$.task_id");
    }

    #[test]
    fn infers_artifact_format() {
        let e = infer_error_from_reason("artifact.format must be md|txt|json|html|css|js", "task_action_v1", "task_action_v1");
        assert_eq!(e.json_path, "$.artifact.format");
    }

    #[test]
    fn falls_back_to_root_path() {
        let e = infer_error_from_reason("something unexpected happened", "task_action_v1", "task_action_v1");
        assert_eq!(e.json_path, "$");
    }
}
