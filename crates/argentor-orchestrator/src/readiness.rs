//! Storage adapter for the readiness engine (spec §4.3): loads one plan's
//! graph out of [`Store`], hands it to [`argentor_graph::ReadinessGraph`]
//! for the actual recompute, then persists whatever nodes changed and
//! turns the reported [`argentor_graph::ReadinessEvent`]s into
//! `task_events` rows.

use crate::error::OrchestratorResult;
use argentor_core::{utc_now, BlockedReason, EventId, PlanId, TaskId, TaskStatus};
use argentor_graph::{ReadinessEvent, ReadinessGraph};
use argentor_storage::{Store, TaskEvent};
use serde_json::json;
use std::collections::HashMap;

fn event_row(plan_id: PlanId, task_id: TaskId, event_type: &str, payload: serde_json::Value) -> TaskEvent {
    TaskEvent {
        event_id: EventId::new(),
        plan_id,
        task_id: Some(task_id),
        event_type: event_type.to_string(),
        payload,
        created_at: utc_now(),
    }
}

/// Runs one full readiness recompute pass over `plan_id`'s active graph
/// and returns how many task nodes changed status, blocked reason, or
/// branch activity.
pub fn recompute_readiness_for_plan(store: &Store, plan_id: PlanId) -> OrchestratorResult<usize> {
    let node_rows = store.list_task_nodes(plan_id)?;
    let before: HashMap<TaskId, (TaskStatus, Option<BlockedReason>, bool)> =
        node_rows.iter().map(|n| (n.task_id, (n.status, n.blocked_reason, n.active_branch))).collect();
    let mut nodes: HashMap<TaskId, _> = node_rows.into_iter().map(|n| (n.task_id, n)).collect();
    let edges = store.list_task_edges(plan_id)?;

    let mut requirements = Vec::new();
    for task_id in nodes.keys().copied().collect::<Vec<_>>() {
        requirements.extend(store.list_requirements(task_id)?);
    }
    let mut evidence = Vec::new();
    for req in &requirements {
        evidence.extend(store.list_evidence(req.requirement_id)?);
    }
    let mut reviews = Vec::new();
    for task_id in nodes.keys().copied().collect::<Vec<_>>() {
        reviews.extend(store.list_reviews_for_target(task_id)?);
    }

    let events = {
        let mut graph = ReadinessGraph { nodes: &mut nodes, edges: &edges, requirements: &requirements, evidence: &evidence, reviews: &reviews };
        graph.recompute()
    };

    let mut changed = 0;
    for (task_id, node) in &nodes {
        let after = (node.status, node.blocked_reason, node.active_branch);
        if before.get(task_id) != Some(&after) {
            store.update_task_node(node)?;
            changed += 1;
        }
    }

    for event in &events {
        let row = match event {
            ReadinessEvent::WaitingInput { task_id } => event_row(plan_id, *task_id, "WAITING_INPUT", json!({})),
            ReadinessEvent::BecameReady { task_id } => event_row(plan_id, *task_id, "STATUS_CHANGED", json!({"status": "READY"})),
            ReadinessEvent::GoalCompleted { task_id } => event_row(plan_id, *task_id, "STATUS_CHANGED", json!({"status": "DONE"})),
            ReadinessEvent::BranchAbandoned { task_id } => event_row(plan_id, *task_id, "BRANCH_CHANGED", json!({"active_branch": false})),
        };
        store.record_event(&row)?;
    }

    Ok(changed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use argentor_core::{AndOr, EdgeId, EdgeType, NodeType, Owner, Priority};
    use argentor_graph::{Constraints, EdgeMetadata, Plan, TaskEdge, TaskNode};
    use chrono::Utc;

    fn seed_plan(store: &Store) -> PlanId {
        let root_id = TaskId::new();
        let plan = Plan {
            plan_id: PlanId::new(),
            title: "p".into(),
            owner: Owner::Executor,
            root_task_id: root_id,
            created_at: Utc::now(),
            constraints: Constraints { deadline: None, priority: Priority::Med },
        };
        store.insert_plan(&plan).unwrap();
        plan.plan_id
    }

    fn insert_node(store: &Store, plan_id: PlanId, node_type: NodeType, title: &str) -> TaskId {
        let node = TaskNode::new(plan_id, node_type, title, Owner::Executor);
        let task_id = node.task_id;
        store.insert_task_node(&node).unwrap();
        task_id
    }

    #[test]
    fn pending_action_with_no_requirements_or_deps_becomes_ready() {
        let store = Store::open_in_memory().unwrap();
        let plan_id = seed_plan(&store);
        let action_id = insert_node(&store, plan_id, NodeType::Action, "draft");

        let changed = recompute_readiness_for_plan(&store, plan_id).unwrap();
        assert_eq!(changed, 1);
        let action = store.get_task_node(action_id).unwrap();
        assert_eq!(action.status, TaskStatus::Ready);
    }

    #[test]
    fn and_goal_completes_once_every_active_child_is_done() {
        let store = Store::open_in_memory().unwrap();
        let plan_id = seed_plan(&store);
        let goal_id = insert_node(&store, plan_id, NodeType::Goal, "goal");
        let a = insert_node(&store, plan_id, NodeType::Action, "a");
        let b = insert_node(&store, plan_id, NodeType::Action, "b");
        for to in [a, b] {
            store
                .insert_task_edge(&TaskEdge {
                    edge_id: EdgeId::new(),
                    plan_id,
                    from_task_id: goal_id,
                    to_task_id: to,
                    edge_type: EdgeType::Decompose,
                    metadata: EdgeMetadata { and_or: Some(AndOr::And), group_id: None },
                })
                .unwrap();
        }

        recompute_readiness_for_plan(&store, plan_id).unwrap();
        assert_eq!(store.get_task_node(goal_id).unwrap().status, TaskStatus::Pending, "neither child is done yet");

        for id in [a, b] {
            let mut node = store.get_task_node(id).unwrap();
            node.status = TaskStatus::Done;
            store.update_task_node(&node).unwrap();
        }
        recompute_readiness_for_plan(&store, plan_id).unwrap();
        assert_eq!(store.get_task_node(goal_id).unwrap().status, TaskStatus::Done);
    }

    #[test]
    fn alternative_group_picks_exactly_one_active_candidate() {
        let store = Store::open_in_memory().unwrap();
        let plan_id = seed_plan(&store);
        let parent = insert_node(&store, plan_id, NodeType::Goal, "parent");
        let mut opt_a = TaskNode::new(plan_id, NodeType::Action, "option a", Owner::Executor);
        opt_a.priority = 5;
        let opt_b = TaskNode::new(plan_id, NodeType::Action, "option b", Owner::Executor);
        let (a_id, b_id) = (opt_a.task_id, opt_b.task_id);
        store.insert_task_node(&opt_a).unwrap();
        store.insert_task_node(&opt_b).unwrap();

        for to in [a_id, b_id] {
            store
                .insert_task_edge(&TaskEdge {
                    edge_id: EdgeId::new(),
                    plan_id,
                    from_task_id: parent,
                    to_task_id: to,
                    edge_type: EdgeType::Alternative,
                    metadata: EdgeMetadata { and_or: None, group_id: Some("G1".to_string()) },
                })
                .unwrap();
        }

        recompute_readiness_for_plan(&store, plan_id).unwrap();
        assert!(store.get_task_node(a_id).unwrap().active_branch);
        assert!(!store.get_task_node(b_id).unwrap().active_branch);
    }

    #[test]
    fn inactive_branch_propagates_to_decompose_children() {
        let store = Store::open_in_memory().unwrap();
        let plan_id = seed_plan(&store);
        let parent = insert_node(&store, plan_id, NodeType::Goal, "parent");
        let child = insert_node(&store, plan_id, NodeType::Action, "child");
        store
            .insert_task_edge(&TaskEdge {
                edge_id: EdgeId::new(),
                plan_id,
                from_task_id: parent,
                to_task_id: child,
                edge_type: EdgeType::Decompose,
                metadata: EdgeMetadata { and_or: Some(AndOr::And), group_id: None },
            })
            .unwrap();

        let mut parent_node = store.get_task_node(parent).unwrap();
        parent_node.active_branch = false;
        store.update_task_node(&parent_node).unwrap();

        let changed = recompute_readiness_for_plan(&store, plan_id).unwrap();
        assert!(changed >= 1);
        assert!(!store.get_task_node(child).unwrap().active_branch);
    }
}
