//! The v2 feasibility check (spec §4.7): flags ACTIONs whose
//! `estimated_person_days` exceeds the configured threshold, the direct
//! input to the rewriter's `SPLIT_OVERSIZED_ACTION` patch. Grounded on
//! `core/feasibility_v2.py`'s `_compute_depths`/`_leaf_actions`/
//! `feasibility_check`.

use argentor_core::{EdgeType, NodeType, TaskId, TaskStatus};
use argentor_graph::{TaskEdge, TaskNode};
use std::collections::{HashMap, VecDeque};

/// An ACTION whose estimated effort exceeds the threshold.
#[derive(Debug, Clone, PartialEq)]
pub struct OverThreshold {
    pub task_id: TaskId,
    pub task_title: String,
    pub estimated_person_days: f64,
    pub can_split: bool,
}

/// A leaf ACTION with no `estimated_person_days` at all.
#[derive(Debug, Clone, PartialEq)]
pub struct MissingEstimate {
    pub task_id: TaskId,
    pub task_title: String,
}

/// The outcome of a feasibility pass over one plan's active graph.
#[derive(Debug, Clone, PartialEq)]
pub struct FeasibilityReport {
    pub threshold_person_days: f64,
    pub max_depth: u32,
    pub leaf_action_count: usize,
    pub over_threshold: Vec<OverThreshold>,
    pub missing_estimate: Vec<MissingEstimate>,
    pub ok: bool,
}

/// BFS depth from each DECOMPOSE root to every reachable node, mirroring
/// `_compute_depths`'s stack-based traversal.
pub(crate) fn compute_depths(root_id: TaskId, edges: &[TaskEdge]) -> HashMap<TaskId, u32> {
    let mut children: HashMap<TaskId, Vec<TaskId>> = HashMap::new();
    for e in edges.iter().filter(|e| e.edge_type == EdgeType::Decompose) {
        children.entry(e.from_task_id).or_default().push(e.to_task_id);
    }

    let mut depths = HashMap::new();
    depths.insert(root_id, 0);
    let mut queue = VecDeque::new();
    queue.push_back(root_id);
    while let Some(node) = queue.pop_front() {
        let depth = depths[&node];
        for child in children.get(&node).into_iter().flatten() {
            if !depths.contains_key(child) {
                depths.insert(*child, depth + 1);
                queue.push_back(*child);
            }
        }
    }
    depths
}

/// Leaf ACTIONs: active ACTION nodes with no active DECOMPOSE children
/// (an ACTION that has already been split into a GOAL is not a leaf).
fn leaf_actions<'a>(nodes: &'a HashMap<TaskId, TaskNode>, edges: &[TaskEdge]) -> Vec<&'a TaskNode> {
    let mut has_active_decompose_children: std::collections::HashSet<TaskId> = Default::default();
    for e in edges.iter().filter(|e| e.edge_type == EdgeType::Decompose) {
        if nodes.get(&e.to_task_id).map(|n| n.active_branch).unwrap_or(false) {
            has_active_decompose_children.insert(e.from_task_id);
        }
    }
    nodes
        .values()
        .filter(|n| n.active_branch && n.node_type == NodeType::Action && !has_active_decompose_children.contains(&n.task_id))
        .collect()
}

/// Runs the feasibility pass. `root_id` is the plan's root task id, used
/// only to compute decomposition depth for the `can_split` hint.
pub fn feasibility_check(
    root_id: TaskId,
    nodes: &HashMap<TaskId, TaskNode>,
    edges: &[TaskEdge],
    threshold_person_days: f64,
    max_depth: u32,
) -> FeasibilityReport {
    let depths = compute_depths(root_id, edges);
    let leaves = leaf_actions(nodes, edges);

    let mut over_threshold = Vec::new();
    let mut missing_estimate = Vec::new();

    for leaf in &leaves {
        // A FAILED/ABANDONED/DONE leaf no longer needs a feasibility verdict.
        if matches!(leaf.status, TaskStatus::Done | TaskStatus::Abandoned) {
            continue;
        }
        match leaf.estimated_person_days {
            None => missing_estimate.push(MissingEstimate { task_id: leaf.task_id, task_title: leaf.title.clone() }),
            Some(epd) if epd > threshold_person_days => {
                let depth = depths.get(&leaf.task_id).copied().unwrap_or(0);
                over_threshold.push(OverThreshold {
                    task_id: leaf.task_id,
                    task_title: leaf.title.clone(),
                    estimated_person_days: epd,
                    can_split: depth < max_depth,
                });
            }
            Some(_) => {}
        }
    }

    let ok = over_threshold.is_empty() && missing_estimate.is_empty();
    FeasibilityReport {
        threshold_person_days,
        max_depth,
        leaf_action_count: leaves.len(),
        over_threshold,
        missing_estimate,
        ok,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use argentor_core::{EdgeId, Owner, PlanId};

    fn decompose_edge(from: TaskId, to: TaskId) -> TaskEdge {
        TaskEdge {
            edge_id: EdgeId::new(),
            plan_id: PlanId::new(),
            from_task_id: from,
            to_task_id: to,
            edge_type: EdgeType::Decompose,
            metadata: argentor_graph::EdgeMetadata { and_or: None, group_id: None },
        }
    }

    #[test]
    fn flags_an_action_over_the_threshold_as_splittable_within_depth_budget() {
        let plan_id = PlanId::new();
        let root_id = TaskId::new();
        let mut action = TaskNode::new(plan_id, NodeType::Action, "build everything", Owner::Executor);
        action.estimated_person_days = Some(25.0);
        let action_id = action.task_id;

        let mut nodes = HashMap::new();
        nodes.insert(action_id, action);
        let edges = vec![decompose_edge(root_id, action_id)];

        let report = feasibility_check(root_id, &nodes, &edges, 10.0, 5);
        assert_eq!(report.over_threshold.len(), 1);
        assert_eq!(report.over_threshold[0].task_id, action_id);
        assert!(report.over_threshold[0].can_split);
        assert!(!report.ok);
    }

    #[test]
    fn can_split_is_false_once_the_depth_budget_is_exhausted() {
        let plan_id = PlanId::new();
        let root_id = TaskId::new();
        let mid = TaskId::new();
        let mut leaf = TaskNode::new(plan_id, NodeType::Action, "deep leaf", Owner::Executor);
        leaf.estimated_person_days = Some(50.0);
        let leaf_id = leaf.task_id;

        let mut nodes = HashMap::new();
        nodes.insert(leaf_id, leaf);
        let edges = vec![decompose_edge(root_id, mid), decompose_edge(mid, leaf_id)];

        let report = feasibility_check(root_id, &nodes, &edges, 10.0, 1);
        assert_eq!(report.over_threshold.len(), 1);
        assert!(!report.over_threshold[0].can_split);
    }

    #[test]
    fn missing_estimate_is_reported_separately_from_over_threshold() {
        let plan_id = PlanId::new();
        let root_id = TaskId::new();
        let action = TaskNode::new(plan_id, NodeType::Action, "no estimate yet", Owner::Executor);
        let action_id = action.task_id;
        let mut nodes = HashMap::new();
        nodes.insert(action_id, action);
        let edges = vec![decompose_edge(root_id, action_id)];

        let report = feasibility_check(root_id, &nodes, &edges, 10.0, 5);
        assert!(report.over_threshold.is_empty());
        assert_eq!(report.missing_estimate.len(), 1);
    }

    #[test]
    fn leaf_actions_exclude_already_split_parents() {
        let plan_id = PlanId::new();
        let root_id = TaskId::new();
        let mut parent = TaskNode::new(plan_id, NodeType::Action, "already split", Owner::Executor);
        parent.estimated_person_days = Some(99.0);
        let parent_id = parent.task_id;
        let child = TaskNode::new(plan_id, NodeType::Action, "child", Owner::Executor);
        let child_id = child.task_id;

        let mut nodes = HashMap::new();
        nodes.insert(parent_id, parent);
        nodes.insert(child_id, child);
        let edges = vec![decompose_edge(root_id, parent_id), decompose_edge(parent_id, child_id)];

        let report = feasibility_check(root_id, &nodes, &edges, 10.0, 5);
        assert_eq!(report.leaf_action_count, 1);
        assert!(report.over_threshold.is_empty(), "the parent is not a leaf once it has active children");
    }
}
