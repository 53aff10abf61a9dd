//! Scheduler (spec §4.4): picks a small batch of runnable executor and
//! CHECK-gate nodes under ordering rules. Grounded on the teacher's
//! `TaskQueue::all_ready` (filter-then-sort-then-truncate shape) and
//! generalized to the two batches this system actually runs: the
//! executor round (§4.5) and the v2 review gate (§4.6). The v1 "any node
//! READY_TO_CHECK" reviewer batch spec.md §4.4 also names is not
//! implemented — see DESIGN.md's Open Question decision.

use crate::model::TaskNode;
use argentor_core::{NodeType, TaskId, TaskStatus};
use std::collections::HashMap;

/// A batch of runnable nodes, one list per round type so the orchestrator
/// can run each round independently.
#[derive(Debug, Default)]
pub struct RunnableBatch {
    pub executor_actions: Vec<TaskId>,
    pub check_gate: Vec<TaskId>,
}

/// Orders executor candidates by TO_BE_MODIFY first, then priority desc,
/// then fewest attempts first (spec §4.4).
fn ordered_executor_actions(nodes: &HashMap<TaskId, TaskNode>, ids: impl Iterator<Item = TaskId>) -> Vec<TaskId> {
    let mut ranked: Vec<TaskId> = ids.collect();
    ranked.sort_by(|a, b| {
        let na = &nodes[a];
        let nb = &nodes[b];
        let rank = |s: TaskStatus| if s == TaskStatus::ToBeModify { 0 } else { 1 };
        rank(na.status).cmp(&rank(nb.status)).then(nb.priority.cmp(&na.priority)).then(na.attempt_count.cmp(&nb.attempt_count))
    });
    ranked
}

/// Orders CHECK-gate candidates by priority desc then `task_id` for a
/// stable deterministic tiebreak.
fn ordered_by_priority(nodes: &HashMap<TaskId, TaskNode>, ids: impl Iterator<Item = TaskId>) -> Vec<TaskId> {
    let mut ranked: Vec<TaskId> = ids.collect();
    ranked.sort_by(|a, b| {
        let na = &nodes[a];
        let nb = &nodes[b];
        nb.priority.cmp(&na.priority).then_with(|| a.0.cmp(&b.0))
    });
    ranked
}

/// Selects up to `limit` TO_BE_MODIFY/READY ACTION nodes for the executor
/// round, and up to `limit` READY CHECK nodes whose bound ACTION
/// (`review_target_task_id`) is READY_TO_CHECK with a non-null
/// `active_artifact_id` for the v2 review gate.
pub fn next_runnable(nodes: &HashMap<TaskId, TaskNode>, limit: usize) -> RunnableBatch {
    let executor_candidates = nodes.iter().filter(|(_, n)| {
        n.active_branch && n.node_type == NodeType::Action && matches!(n.status, TaskStatus::ToBeModify | TaskStatus::Ready)
    });

    let check_candidates = nodes.iter().filter(|(_, n)| {
        n.active_branch
            && n.node_type == NodeType::Check
            && n.status == TaskStatus::Ready
            && n.review_target_task_id
                .and_then(|target| nodes.get(&target))
                .is_some_and(|action| action.status == TaskStatus::ReadyToCheck && action.active_artifact_id.is_some())
    });

    let mut batch = RunnableBatch {
        executor_actions: ordered_executor_actions(nodes, executor_candidates.map(|(id, _)| *id)),
        check_gate: ordered_by_priority(nodes, check_candidates.map(|(id, _)| *id)),
    };
    batch.executor_actions.truncate(limit);
    batch.check_gate.truncate(limit);
    batch
}

#[cfg(test)]
mod tests {
    use super::*;
    use argentor_core::{Owner, PlanId};

    #[test]
    fn picks_higher_priority_action_first() {
        let plan_id = PlanId::new();
        let mut low = TaskNode::new(plan_id, NodeType::Action, "low", Owner::Executor);
        low.status = TaskStatus::Ready;
        low.priority = 1;
        let mut high = TaskNode::new(plan_id, NodeType::Action, "high", Owner::Executor);
        high.status = TaskStatus::Ready;
        high.priority = 9;

        let mut nodes = HashMap::new();
        let low_id = low.task_id;
        let high_id = high.task_id;
        nodes.insert(low_id, low);
        nodes.insert(high_id, high);

        let batch = next_runnable(&nodes, 10);
        assert_eq!(batch.executor_actions[0], high_id);
    }

    #[test]
    fn to_be_modify_comes_before_ready_regardless_of_priority() {
        let plan_id = PlanId::new();
        let mut ready_high_priority = TaskNode::new(plan_id, NodeType::Action, "ready", Owner::Executor);
        ready_high_priority.status = TaskStatus::Ready;
        ready_high_priority.priority = 9;
        let mut to_be_modify_low_priority = TaskNode::new(plan_id, NodeType::Action, "tbm", Owner::Executor);
        to_be_modify_low_priority.status = TaskStatus::ToBeModify;
        to_be_modify_low_priority.priority = 0;

        let mut nodes = HashMap::new();
        let ready_id = ready_high_priority.task_id;
        let tbm_id = to_be_modify_low_priority.task_id;
        nodes.insert(ready_id, ready_high_priority);
        nodes.insert(tbm_id, to_be_modify_low_priority);

        let batch = next_runnable(&nodes, 10);
        assert_eq!(batch.executor_actions[0], tbm_id);
    }

    #[test]
    fn fewest_attempts_breaks_ties_within_the_same_status_and_priority() {
        let plan_id = PlanId::new();
        let mut many_attempts = TaskNode::new(plan_id, NodeType::Action, "many", Owner::Executor);
        many_attempts.status = TaskStatus::Ready;
        many_attempts.attempt_count = 3;
        let mut few_attempts = TaskNode::new(plan_id, NodeType::Action, "few", Owner::Executor);
        few_attempts.status = TaskStatus::Ready;
        few_attempts.attempt_count = 0;

        let mut nodes = HashMap::new();
        let many_id = many_attempts.task_id;
        let few_id = few_attempts.task_id;
        nodes.insert(many_id, many_attempts);
        nodes.insert(few_id, few_attempts);

        let batch = next_runnable(&nodes, 10);
        assert_eq!(batch.executor_actions[0], few_id);
    }

    #[test]
    fn ignores_inactive_branches() {
        let plan_id = PlanId::new();
        let mut n = TaskNode::new(plan_id, NodeType::Action, "abandoned", Owner::Executor);
        n.status = TaskStatus::Ready;
        n.active_branch = false;
        let mut nodes = HashMap::new();
        nodes.insert(n.task_id, n);
        let batch = next_runnable(&nodes, 10);
        assert!(batch.executor_actions.is_empty());
    }

    #[test]
    fn respects_batch_limit() {
        let plan_id = PlanId::new();
        let mut nodes = HashMap::new();
        for i in 0..5 {
            let mut n = TaskNode::new(plan_id, NodeType::Action, format!("t{i}"), Owner::Executor);
            n.status = TaskStatus::Ready;
            nodes.insert(n.task_id, n);
        }
        let batch = next_runnable(&nodes, 2);
        assert_eq!(batch.executor_actions.len(), 2);
    }

    #[test]
    fn check_gate_requires_bound_action_ready_to_check_with_an_active_artifact() {
        let plan_id = PlanId::new();
        let mut action = TaskNode::new(plan_id, NodeType::Action, "action", Owner::Executor);
        action.status = TaskStatus::ReadyToCheck;
        let action_id = action.task_id;

        let mut check = TaskNode::new(plan_id, NodeType::Check, "check", Owner::Reviewer);
        check.status = TaskStatus::Ready;
        check.review_target_task_id = Some(action_id);
        let check_id = check.task_id;

        let mut nodes = HashMap::new();
        nodes.insert(action_id, action);
        nodes.insert(check_id, check);

        // No active_artifact_id yet: not selectable.
        let batch = next_runnable(&nodes, 10);
        assert!(batch.check_gate.is_empty());

        nodes.get_mut(&action_id).unwrap().active_artifact_id = Some(argentor_core::ArtifactId::new());
        let batch = next_runnable(&nodes, 10);
        assert_eq!(batch.check_gate, vec![check_id]);
    }
}
