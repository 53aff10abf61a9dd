//! Review persistence with the atomic idempotency guard the review gate
//! relies on (spec §4.6): the `idempotency_key` column carries a UNIQUE
//! index, so a duplicate insert from a racing reviewer fails with a
//! constraint violation instead of creating a second review row.

use crate::conv::{from_text, json_to_text, text_to_json, to_text};
use crate::error::{StorageError, StorageResult};
use argentor_core::{ArtifactId, Owner, ReviewId, TaskId, Verdict};
use argentor_graph::Review;
use rusqlite::{params, Connection, OptionalExtension};

/// Inserts a review row. Returns `Ok(None)` (not an error) when another
/// writer already inserted a review with the same `idempotency_key` first —
/// callers should treat that as "someone else already recorded this
/// review" and re-fetch via [`find_by_idempotency_key`].
pub fn insert_if_absent(conn: &Connection, review: &Review) -> StorageResult<Option<ReviewId>> {
    let result = conn.execute(
        "INSERT INTO reviews (
            review_id, check_task_id, review_target_task_id, reviewed_artifact_id, reviewer,
            total_score, verdict, breakdown_json, suggestions_json, summary, idempotency_key, created_at
        ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12)",
        params![
            review.review_id.to_string(),
            review.check_task_id.to_string(),
            review.review_target_task_id.to_string(),
            review.reviewed_artifact_id.map(|id| id.to_string()),
            to_text(&review.reviewer, "reviewer")?,
            review.total_score,
            to_text(&review.verdict, "verdict")?,
            json_to_text(&review.breakdown)?,
            json_to_text(&review.suggestions)?,
            review.summary,
            review.idempotency_key,
            review.created_at.to_rfc3339(),
        ],
    );

    match result {
        Ok(_) => Ok(Some(review.review_id)),
        Err(rusqlite::Error::SqliteFailure(ref e, _)) if e.code == rusqlite::ErrorCode::ConstraintViolation => Ok(None),
        Err(other) => Err(StorageError::from(other)),
    }
}

pub fn find_by_idempotency_key(conn: &Connection, idempotency_key: &str) -> StorageResult<Option<Review>> {
    conn.query_row(&select_sql("WHERE idempotency_key = ?1"), [idempotency_key], row_to_review)
        .optional()
        .map_err(StorageError::from)
}

pub fn list_for_target(conn: &Connection, review_target_task_id: TaskId) -> StorageResult<Vec<Review>> {
    let mut stmt = conn.prepare(&select_sql("WHERE review_target_task_id = ?1 ORDER BY created_at"))?;
    let rows = stmt.query_map([review_target_task_id.to_string()], row_to_review)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(StorageError::from)
}

fn select_sql(clause: &str) -> String {
    format!(
        "SELECT review_id, check_task_id, review_target_task_id, reviewed_artifact_id, reviewer,
                total_score, verdict, breakdown_json, suggestions_json, summary, idempotency_key, created_at
         FROM reviews {clause}"
    )
}

fn row_to_review(row: &rusqlite::Row<'_>) -> rusqlite::Result<Review> {
    let review_id: String = row.get(0)?;
    let check_task_id: String = row.get(1)?;
    let review_target_task_id: String = row.get(2)?;
    let reviewed_artifact_id: Option<String> = row.get(3)?;
    let reviewer: String = row.get(4)?;
    let verdict: String = row.get(6)?;
    let breakdown_json: String = row.get(7)?;
    let suggestions_json: String = row.get(8)?;
    let created_at: String = row.get(11)?;
    let invalid = |idx: usize, reason: String| rusqlite::Error::InvalidColumnType(idx, reason, rusqlite::types::Type::Text);
    Ok(Review {
        review_id: ReviewId::parse(&review_id).map_err(|e| invalid(0, e.to_string()))?,
        check_task_id: TaskId::parse(&check_task_id).map_err(|e| invalid(1, e.to_string()))?,
        review_target_task_id: TaskId::parse(&review_target_task_id).map_err(|e| invalid(2, e.to_string()))?,
        reviewed_artifact_id: reviewed_artifact_id.map(|s| ArtifactId::parse(&s)).transpose().map_err(|e| invalid(3, e.to_string()))?,
        reviewer: from_text::<Owner>(&reviewer, "reviewer").map_err(|e| invalid(4, e.to_string()))?,
        total_score: row.get(5)?,
        verdict: from_text::<Verdict>(&verdict, "verdict").map_err(|e| invalid(6, e.to_string()))?,
        breakdown: text_to_json(&breakdown_json, "breakdown_json").map_err(|e| invalid(7, e.to_string()))?,
        suggestions: text_to_json(&suggestions_json, "suggestions_json").map_err(|e| invalid(8, e.to_string()))?,
        summary: row.get(9)?,
        idempotency_key: row.get(10)?,
        created_at: argentor_core::parse_iso8601(&created_at).map_err(|e| invalid(11, e.to_string()))?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use argentor_core::NodeType;
    use serde_json::json;

    fn seed_nodes(conn: &Connection) -> (TaskId, TaskId) {
        let plan_id = argentor_core::PlanId::new();
        super::super::plans::insert(
            conn,
            &argentor_graph::Plan {
                plan_id,
                title: "p".into(),
                owner: Owner::Executor,
                root_task_id: TaskId::new(),
                created_at: argentor_core::utc_now(),
                constraints: argentor_graph::Constraints { deadline: None, priority: argentor_core::Priority::Low },
            },
        )
        .unwrap();
        let action = argentor_graph::TaskNode::new(plan_id, NodeType::Action, "draft", Owner::Executor);
        let check = argentor_graph::TaskNode::new(plan_id, NodeType::Check, "review draft", Owner::Reviewer);
        super::super::task_nodes::insert(conn, &action).unwrap();
        super::super::task_nodes::insert(conn, &check).unwrap();
        (action.task_id, check.task_id)
    }

    fn sample_review(check_task_id: TaskId, target: TaskId, key: &str) -> Review {
        Review {
            review_id: ReviewId::new(),
            check_task_id,
            review_target_task_id: target,
            reviewed_artifact_id: Some(ArtifactId::new()),
            reviewer: Owner::Reviewer,
            total_score: 92,
            verdict: Verdict::Approved,
            breakdown: json!({"completeness": 95, "clarity": 90}),
            suggestions: json!([]),
            summary: "looks good".into(),
            idempotency_key: key.into(),
            created_at: argentor_core::utc_now(),
        }
    }

    #[test]
    fn second_insert_with_same_idempotency_key_is_rejected() {
        let conn = crate::connection::open_in_memory().unwrap();
        let (action, check) = seed_nodes(&conn);
        let review = sample_review(check, action, "k-1");
        let first = insert_if_absent(&conn, &review).unwrap();
        assert!(first.is_some());

        let duplicate = sample_review(check, action, "k-1");
        let second = insert_if_absent(&conn, &duplicate).unwrap();
        assert!(second.is_none());

        let rows = list_for_target(&conn, action).unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn finds_review_by_idempotency_key() {
        let conn = crate::connection::open_in_memory().unwrap();
        let (action, check) = seed_nodes(&conn);
        let review = sample_review(check, action, "k-2");
        insert_if_absent(&conn, &review).unwrap();
        let found = find_by_idempotency_key(&conn, "k-2").unwrap().unwrap();
        assert_eq!(found.total_score, 92);
    }
}
