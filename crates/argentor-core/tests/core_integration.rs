#![allow(clippy::unwrap_used, clippy::expect_used)]

use argentor_core::*;

// ---------------------------------------------------------------------------
// 1. Id serialization roundtrip and distinctness
// ---------------------------------------------------------------------------

#[test]
fn task_id_serialization_roundtrip() {
    let id = TaskId::new();
    let json = serde_json::to_string(&id).unwrap();
    let deserialized: TaskId = serde_json::from_str(&json).unwrap();
    assert_eq!(id, deserialized);
}

// ---------------------------------------------------------------------------
// 2. Error Display and From impls
// ---------------------------------------------------------------------------

#[test]
fn error_display_and_from_impls() {
    let storage_err = AgentorError::Storage("no such table: plans".to_string());
    assert_eq!(storage_err.to_string(), "storage error: no such table: plans");

    let contract_err = AgentorError::Contract("schema mismatch".to_string());
    assert_eq!(contract_err.to_string(), "contract error: schema mismatch");

    let graph_err = AgentorError::Graph("cycle detected".to_string());
    assert_eq!(graph_err.to_string(), "graph error: cycle detected");

    let agent_err = AgentorError::Agent("refusal".to_string());
    assert_eq!(agent_err.to_string(), "agent error: refusal");

    let orchestrator_err = AgentorError::Orchestrator("budget exceeded".to_string());
    assert_eq!(orchestrator_err.to_string(), "orchestrator error: budget exceeded");

    let bad_json = serde_json::from_str::<serde_json::Value>("not json");
    let serde_err = bad_json.unwrap_err();
    let agentor_err: AgentorError = serde_err.into();
    assert!(agentor_err.to_string().starts_with("json error:"));

    let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
    let agentor_err: AgentorError = io_err.into();
    assert!(agentor_err.to_string().starts_with("io error:"));
}

// ---------------------------------------------------------------------------
// 3. Node type / status allowed-transition matrix (status_rules parity)
// ---------------------------------------------------------------------------

#[test]
fn status_rules_match_node_type_table() {
    assert!(TaskStatus::validate_for_node_type(NodeType::Goal, TaskStatus::Done).is_ok());
    assert!(TaskStatus::validate_for_node_type(NodeType::Goal, TaskStatus::ReadyToCheck).is_err());
    assert!(TaskStatus::validate_for_node_type(NodeType::Action, TaskStatus::ReadyToCheck).is_ok());
    assert!(TaskStatus::validate_for_node_type(NodeType::Action, TaskStatus::ToBeModify).is_ok());
    assert!(TaskStatus::validate_for_node_type(NodeType::Check, TaskStatus::ReadyToCheck).is_err());
    assert!(TaskStatus::validate_for_node_type(NodeType::Check, TaskStatus::Done).is_ok());
}

// ---------------------------------------------------------------------------
// 4. Error code bands drive the error-handling design (spec §7)
// ---------------------------------------------------------------------------

#[test]
fn error_code_bands() {
    assert!(matches!(ErrorCode::LlmTimeout.band(), ErrorBand::Transient));
    assert!(matches!(ErrorCode::InputMissing.band(), ErrorBand::InputDependent));
    assert!(matches!(
        ErrorCode::ContractMismatch.band(),
        ErrorBand::ContractStructural
    ));
}

// ---------------------------------------------------------------------------
// 5. Timestamp helper round trips through ISO-8601
// ---------------------------------------------------------------------------

#[test]
fn timestamp_round_trip() {
    let s = utc_now_iso();
    let parsed = parse_iso8601(&s).expect("timestamp must parse");
    assert_eq!(parsed.timestamp_millis(), parse_iso8601(&s).unwrap().timestamp_millis());
}
