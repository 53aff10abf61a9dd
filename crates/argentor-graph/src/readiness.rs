//! The readiness engine (spec §4.3): recomputes node status from
//! dependencies, requirements, and ALTERNATIVE selection, then aggregates
//! completion up GOAL nodes. Grounded on `core/readiness.py`'s
//! `recompute_readiness_for_plan` pipeline: alternative selection →
//! inactive-branch propagation → review-CHECK mirroring → per-task
//! deps/requirements evaluation → GOAL aggregation.

use crate::model::{Evidence, InputRequirement, Review, TaskEdge, TaskNode};
use argentor_core::{AndOr, BlockedReason, EdgeType, NodeType, TaskId, TaskStatus};
use std::collections::{HashMap, HashSet};

/// An event worth recording while recomputing readiness. The caller
/// persists these as `task_events` rows; this module stays free of any
/// storage dependency.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadinessEvent {
    WaitingInput { task_id: TaskId },
    BecameReady { task_id: TaskId },
    GoalCompleted { task_id: TaskId },
    BranchAbandoned { task_id: TaskId },
}

/// In-memory view of one plan's graph, sufficient to recompute readiness.
/// Persistence adapts this to/from `argentor-storage` rows.
pub struct ReadinessGraph<'a> {
    pub nodes: &'a mut HashMap<TaskId, TaskNode>,
    pub edges: &'a [TaskEdge],
    pub requirements: &'a [InputRequirement],
    pub evidence: &'a [Evidence],
    /// Persisted review rows, consulted only for the v2 CHECK reset step
    /// (step 5). Empty slices are fine for callers that never reach a
    /// DONE CHECK.
    pub reviews: &'a [Review],
}

struct AltEdge {
    group_id: String,
    from_task_id: TaskId,
    to_task_id: TaskId,
}

impl ReadinessGraph<'_> {
    fn alternative_edges(&self) -> Vec<AltEdge> {
        self.edges
            .iter()
            .filter(|e| e.edge_type == EdgeType::Alternative)
            .filter_map(|e| {
                e.metadata.group_id.as_ref().map(|gid| AltEdge {
                    group_id: gid.clone(),
                    from_task_id: e.from_task_id,
                    to_task_id: e.to_task_id,
                })
            })
            .collect()
    }

    fn load_alternative_groups(&self) -> HashMap<String, Vec<TaskId>> {
        let mut groups: HashMap<String, Vec<TaskId>> = HashMap::new();
        for e in self.alternative_edges() {
            groups.entry(e.group_id).or_default().push(e.to_task_id);
        }
        groups
    }

    /// Resolves ALTERNATIVE groups: a DONE candidate wins outright; among
    /// undecided candidates, priority desc then attempts asc breaks ties
    /// for which branch stays active while the others are provisionally
    /// inactive. A FAILED or BLOCKED-WAITING_EXTERNAL active candidate is
    /// demoted and the next candidate in tiebreak order takes over.
    fn apply_alternative_selection(&mut self) -> Vec<ReadinessEvent> {
        let mut events = Vec::new();
        let groups = self.load_alternative_groups();

        for (_group_id, candidates) in groups {
            let winner = candidates.iter().find(|tid| {
                self.nodes.get(*tid).map(|n| n.status == TaskStatus::Done).unwrap_or(false)
            });

            if let Some(winner) = winner {
                for tid in &candidates {
                    if tid == winner {
                        continue;
                    }
                    if let Some(n) = self.nodes.get_mut(tid) {
                        if n.active_branch {
                            n.active_branch = false;
                            n.status = TaskStatus::Abandoned;
                            events.push(ReadinessEvent::BranchAbandoned { task_id: *tid });
                        }
                    }
                }
                continue;
            }

            let mut ranked: Vec<&TaskId> = candidates
                .iter()
                .filter(|tid| self.nodes.contains_key(*tid))
                .collect();
            ranked.sort_by(|a, b| {
                let na = &self.nodes[*a];
                let nb = &self.nodes[*b];
                nb.priority.cmp(&na.priority).then(na.attempt_count.cmp(&nb.attempt_count))
            });

            let mut chosen: Option<TaskId> = None;
            for tid in &ranked {
                let n = &self.nodes[*tid];
                let demoted = n.status == TaskStatus::Failed
                    || (n.status == TaskStatus::Blocked && n.blocked_reason == Some(BlockedReason::WaitingExternal));
                if !demoted {
                    chosen = Some(**tid);
                    break;
                }
            }
            let chosen = chosen.or_else(|| ranked.first().map(|t| **t));

            for tid in &candidates {
                let Some(chosen) = chosen else { continue };
                let should_be_active = *tid == chosen;
                if let Some(n) = self.nodes.get_mut(tid) {
                    if n.active_branch != should_be_active {
                        n.active_branch = should_be_active;
                        if !should_be_active {
                            n.status = TaskStatus::Abandoned;
                            events.push(ReadinessEvent::BranchAbandoned { task_id: *tid });
                        }
                    }
                }
            }
        }

        events
    }

    /// Fixed-point propagation: an inactive DECOMPOSE parent deactivates
    /// its children; an inactive DEPENDS_ON predecessor deactivates its
    /// dependent, since that dependent can never be satisfied.
    fn propagate_inactive(&mut self) -> Vec<ReadinessEvent> {
        let mut events = Vec::new();
        loop {
            let mut changed = false;
            for e in self.edges {
                let inactive_source = self
                    .nodes
                    .get(&e.from_task_id)
                    .map(|n| !n.active_branch)
                    .unwrap_or(false);
                if !inactive_source {
                    continue;
                }
                let target = match e.edge_type {
                    EdgeType::Decompose | EdgeType::DependsOn => e.to_task_id,
                    EdgeType::Alternative => continue,
                };
                if let Some(n) = self.nodes.get_mut(&target) {
                    if n.active_branch {
                        n.active_branch = false;
                        n.status = TaskStatus::Abandoned;
                        events.push(ReadinessEvent::BranchAbandoned { task_id: target });
                        changed = true;
                    }
                }
            }
            if !changed {
                break;
            }
        }
        events
    }

    fn deps_satisfied(&self, task_id: TaskId) -> bool {
        self.edges.iter().filter(|e| e.edge_type == EdgeType::DependsOn && e.to_task_id == task_id).all(|e| {
            self.nodes
                .get(&e.from_task_id)
                .map(|n| !n.active_branch || n.status == TaskStatus::Done)
                .unwrap_or(true)
        })
    }

    fn requirements_satisfied(&self, task_id: TaskId) -> bool {
        self.requirements
            .iter()
            .filter(|r| r.task_id == task_id && r.required)
            .all(|r| {
                let count = self
                    .evidence
                    .iter()
                    .filter(|ev| ev.requirement_id == r.requirement_id)
                    .count() as i32;
                count >= r.min_count
            })
    }

    /// Runs the full pipeline and returns events worth recording.
    pub fn recompute(&mut self) -> Vec<ReadinessEvent> {
        let mut events = self.apply_alternative_selection();
        events.extend(self.propagate_inactive());

        let task_ids: Vec<TaskId> = self
            .nodes
            .iter()
            .filter(|(_, n)| n.active_branch && matches!(n.node_type, NodeType::Action | NodeType::Check))
            .map(|(id, _)| *id)
            .collect();

        for task_id in task_ids {
            if !matches!(
                self.nodes.get(&task_id).map(|n| n.status),
                Some(TaskStatus::Pending) | Some(TaskStatus::Ready) | Some(TaskStatus::Blocked)
            ) {
                continue;
            }
            let deps_ok = self.deps_satisfied(task_id);
            let reqs_ok = self.requirements_satisfied(task_id);
            let n = self.nodes.get_mut(&task_id).expect("task_id came from nodes iteration");
            if deps_ok && reqs_ok {
                if n.status != TaskStatus::Ready {
                    n.status = TaskStatus::Ready;
                    n.blocked_reason = None;
                    events.push(ReadinessEvent::BecameReady { task_id });
                }
            } else if deps_ok && !reqs_ok {
                if n.status != TaskStatus::Blocked || n.blocked_reason != Some(BlockedReason::WaitingInput) {
                    n.status = TaskStatus::Blocked;
                    n.blocked_reason = Some(BlockedReason::WaitingInput);
                    events.push(ReadinessEvent::WaitingInput { task_id });
                }
            } else if n.status != TaskStatus::Pending {
                n.status = TaskStatus::Pending;
                n.blocked_reason = None;
            }
        }

        events.extend(self.aggregate_goals());
        events.extend(self.reset_stale_checks());
        events
    }

    /// Step 5: if a DONE CHECK's bound ACTION is READY_TO_CHECK again with
    /// an `active_artifact_id` that no longer matches the artifact that
    /// CHECK last reviewed, the CHECK goes back to READY so the newer
    /// candidate gets reviewed.
    fn reset_stale_checks(&mut self) -> Vec<ReadinessEvent> {
        let mut events = Vec::new();
        let check_ids: Vec<TaskId> = self
            .nodes
            .iter()
            .filter(|(_, n)| n.active_branch && n.node_type == NodeType::Check && n.status == TaskStatus::Done)
            .map(|(id, _)| *id)
            .collect();

        for check_id in check_ids {
            let Some(action_id) = self.nodes[&check_id].review_target_task_id else { continue };
            let Some(action) = self.nodes.get(&action_id) else { continue };
            if action.status != TaskStatus::ReadyToCheck {
                continue;
            }
            let last_reviewed = self
                .reviews
                .iter()
                .filter(|r| r.check_task_id == check_id)
                .max_by_key(|r| r.created_at)
                .and_then(|r| r.reviewed_artifact_id);
            if action.active_artifact_id != last_reviewed {
                if let Some(check) = self.nodes.get_mut(&check_id) {
                    check.status = TaskStatus::Ready;
                    events.push(ReadinessEvent::BecameReady { task_id: check_id });
                }
            }
        }
        events
    }

    /// GOAL AND/OR aggregation over DECOMPOSE children among active
    /// branches only.
    fn aggregate_goals(&mut self) -> Vec<ReadinessEvent> {
        let mut events = Vec::new();
        let goal_ids: Vec<TaskId> = self
            .nodes
            .iter()
            .filter(|(_, n)| n.node_type == NodeType::Goal && n.active_branch)
            .map(|(id, _)| *id)
            .collect();

        for goal_id in goal_ids {
            let children: Vec<(TaskId, AndOr)> = self
                .edges
                .iter()
                .filter(|e| e.edge_type == EdgeType::Decompose && e.from_task_id == goal_id)
                .map(|e| (e.to_task_id, e.metadata.and_or.unwrap_or_default()))
                .collect();
            if children.is_empty() {
                continue;
            }
            let and_or = children[0].1;
            let active_children: Vec<&TaskNode> = children
                .iter()
                .filter_map(|(tid, _)| self.nodes.get(tid))
                .filter(|n| n.active_branch)
                .collect();
            if active_children.is_empty() {
                continue;
            }
            let all_done = active_children.iter().all(|n| n.status == TaskStatus::Done);
            let any_done = active_children.iter().any(|n| n.status == TaskStatus::Done);
            let any_failed = active_children.iter().any(|n| n.status == TaskStatus::Failed);

            let done = match and_or {
                AndOr::And => all_done,
                AndOr::Or => any_done,
            };

            if let Some(goal) = self.nodes.get_mut(&goal_id) {
                if done && goal.status != TaskStatus::Done {
                    goal.status = TaskStatus::Done;
                    events.push(ReadinessEvent::GoalCompleted { task_id: goal_id });
                } else if !done && and_or == AndOr::And && any_failed && goal.status != TaskStatus::Failed {
                    goal.status = TaskStatus::Failed;
                }
            }
        }
        events
    }
}

/// DFS-based cycle detection over the DECOMPOSE ∪ DEPENDS_ON ∪
/// ALTERNATIVE edge union (spec §3 "Cycles are forbidden across the
/// declared edge union"), mirroring `validate_plan_dict`'s visiting/
/// visited three-state DFS.
pub fn has_cycle(node_ids: &[TaskId], edges: &[TaskEdge]) -> bool {
    #[derive(Clone, Copy, PartialEq, Eq)]
    enum Mark {
        Visiting,
        Done,
    }

    let mut adjacency: HashMap<TaskId, Vec<TaskId>> = HashMap::new();
    for e in edges {
        adjacency.entry(e.from_task_id).or_default().push(e.to_task_id);
    }

    fn visit(node: TaskId, adjacency: &HashMap<TaskId, Vec<TaskId>>, marks: &mut HashMap<TaskId, Mark>) -> bool {
        match marks.get(&node) {
            Some(Mark::Done) => return false,
            Some(Mark::Visiting) => return true,
            None => {}
        }
        marks.insert(node, Mark::Visiting);
        if let Some(children) = adjacency.get(&node) {
            for child in children {
                if visit(*child, adjacency, marks) {
                    return true;
                }
            }
        }
        marks.insert(node, Mark::Done);
        false
    }

    let mut marks: HashMap<TaskId, Mark> = HashMap::new();
    let seen: HashSet<TaskId> = node_ids.iter().copied().collect();
    for id in seen {
        if visit(id, &adjacency, &mut marks) {
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::EdgeMetadata;
    use argentor_core::{EdgeId, Owner, PlanId};

    fn edge(from: TaskId, to: TaskId, edge_type: EdgeType, and_or: Option<AndOr>, group_id: Option<&str>) -> TaskEdge {
        TaskEdge {
            edge_id: EdgeId::new(),
            plan_id: PlanId::new(),
            from_task_id: from,
            to_task_id: to,
            edge_type,
            metadata: EdgeMetadata {
                and_or,
                group_id: group_id.map(str::to_string),
            },
        }
    }

    #[test]
    fn ready_action_transitions_once_deps_and_requirements_are_met() {
        let plan_id = PlanId::new();
        let upstream = TaskNode::new(plan_id, NodeType::Action, "upstream", Owner::Executor);
        let mut downstream = TaskNode::new(plan_id, NodeType::Action, "downstream", Owner::Executor);
        let upstream_id = upstream.task_id;
        downstream.status = TaskStatus::Pending;
        let downstream_id = downstream.task_id;

        let mut nodes = HashMap::new();
        nodes.insert(upstream_id, upstream);
        nodes.insert(downstream_id, downstream);
        nodes.get_mut(&upstream_id).unwrap().status = TaskStatus::Done;

        let edges = vec![edge(downstream_id, upstream_id, EdgeType::DependsOn, None, None)];
        let requirements = Vec::new();
        let evidence = Vec::new();
        let reviews = Vec::new();
        let mut graph = ReadinessGraph {
            nodes: &mut nodes,
            edges: &edges,
            requirements: &requirements,
            evidence: &evidence,
            reviews: &reviews,
        };
        let events = graph.recompute();
        assert_eq!(nodes[&downstream_id].status, TaskStatus::Ready);
        assert!(events.contains(&ReadinessEvent::BecameReady { task_id: downstream_id }));
    }

    #[test]
    fn blocked_on_missing_required_input() {
        let plan_id = PlanId::new();
        let task = TaskNode::new(plan_id, NodeType::Action, "needs file", Owner::Executor);
        let task_id = task.task_id;
        let mut nodes = HashMap::new();
        nodes.insert(task_id, task);

        let requirements = vec![InputRequirement {
            requirement_id: argentor_core::RequirementId::new(),
            task_id,
            name: "invoice".to_string(),
            kind: argentor_core::RequirementKind::File,
            required: true,
            min_count: 1,
            allowed_types: vec![],
            source: argentor_core::RequirementSource::User,
            validation: None,
        }];
        let edges = Vec::new();
        let evidence = Vec::new();
        let reviews = Vec::new();
        let mut graph = ReadinessGraph {
            nodes: &mut nodes,
            edges: &edges,
            requirements: &requirements,
            evidence: &evidence,
            reviews: &reviews,
        };
        graph.recompute();
        assert_eq!(nodes[&task_id].status, TaskStatus::Blocked);
        assert_eq!(nodes[&task_id].blocked_reason, Some(BlockedReason::WaitingInput));
    }

    #[test]
    fn goal_and_aggregation_requires_all_active_children_done() {
        let plan_id = PlanId::new();
        let goal = TaskNode::new(plan_id, NodeType::Goal, "goal", Owner::Executor);
        let goal_id = goal.task_id;
        let mut a = TaskNode::new(plan_id, NodeType::Action, "a", Owner::Executor);
        a.status = TaskStatus::Done;
        let a_id = a.task_id;
        let mut b = TaskNode::new(plan_id, NodeType::Action, "b", Owner::Executor);
        b.status = TaskStatus::Ready;
        let b_id = b.task_id;

        let mut nodes = HashMap::new();
        nodes.insert(goal_id, goal);
        nodes.insert(a_id, a);
        nodes.insert(b_id, b);

        let edges = vec![
            edge(goal_id, a_id, EdgeType::Decompose, Some(AndOr::And), None),
            edge(goal_id, b_id, EdgeType::Decompose, Some(AndOr::And), None),
        ];
        let requirements = Vec::new();
        let evidence = Vec::new();
        let reviews = Vec::new();
        let mut graph = ReadinessGraph {
            nodes: &mut nodes,
            edges: &edges,
            requirements: &requirements,
            evidence: &evidence,
            reviews: &reviews,
        };
        graph.recompute();
        assert_eq!(nodes[&goal_id].status, TaskStatus::Pending);

        nodes.get_mut(&b_id).unwrap().status = TaskStatus::Done;
        let mut graph = ReadinessGraph {
            nodes: &mut nodes,
            edges: &edges,
            requirements: &requirements,
            evidence: &evidence,
            reviews: &reviews,
        };
        graph.recompute();
        assert_eq!(nodes[&goal_id].status, TaskStatus::Done);
    }

    #[test]
    fn alternative_group_picks_done_winner_and_abandons_others() {
        let plan_id = PlanId::new();
        let root = TaskNode::new(plan_id, NodeType::Goal, "root", Owner::Executor);
        let root_id = root.task_id;
        let mut a = TaskNode::new(plan_id, NodeType::Action, "plan a", Owner::Executor);
        a.status = TaskStatus::Done;
        let a_id = a.task_id;
        let b = TaskNode::new(plan_id, NodeType::Action, "plan b", Owner::Executor);
        let b_id = b.task_id;

        let mut nodes = HashMap::new();
        nodes.insert(root_id, root);
        nodes.insert(a_id, a);
        nodes.insert(b_id, b);

        let edges = vec![
            edge(root_id, a_id, EdgeType::Alternative, None, Some("g1")),
            edge(root_id, b_id, EdgeType::Alternative, None, Some("g1")),
        ];
        let requirements = Vec::new();
        let evidence = Vec::new();
        let reviews = Vec::new();
        let mut graph = ReadinessGraph {
            nodes: &mut nodes,
            edges: &edges,
            requirements: &requirements,
            evidence: &evidence,
            reviews: &reviews,
        };
        graph.recompute();
        assert!(nodes[&a_id].active_branch);
        assert!(!nodes[&b_id].active_branch);
        assert_eq!(nodes[&b_id].status, TaskStatus::Abandoned);
    }

    #[test]
    fn done_check_reopens_when_action_artifact_moved_on_since_last_review() {
        let plan_id = PlanId::new();
        let stale_artifact = argentor_core::ArtifactId::new();
        let newer_artifact = argentor_core::ArtifactId::new();

        let mut action = TaskNode::new(plan_id, NodeType::Action, "action", Owner::Executor);
        action.status = TaskStatus::ReadyToCheck;
        action.active_artifact_id = Some(newer_artifact);
        let action_id = action.task_id;

        let mut check = TaskNode::new(plan_id, NodeType::Check, "check", Owner::Reviewer);
        check.status = TaskStatus::Done;
        check.review_target_task_id = Some(action_id);
        let check_id = check.task_id;

        let mut nodes = HashMap::new();
        nodes.insert(action_id, action);
        nodes.insert(check_id, check);

        let edges = Vec::new();
        let requirements = Vec::new();
        let evidence = Vec::new();
        let reviews = vec![Review {
            review_id: argentor_core::ReviewId::new(),
            check_task_id: check_id,
            review_target_task_id: action_id,
            reviewed_artifact_id: Some(stale_artifact),
            reviewer: Owner::Reviewer,
            total_score: 95,
            verdict: argentor_core::Verdict::Approved,
            breakdown: serde_json::json!({}),
            suggestions: serde_json::json!([]),
            summary: "looked fine at the time".into(),
            idempotency_key: "k1".into(),
            created_at: chrono::Utc::now(),
        }];
        let mut graph = ReadinessGraph {
            nodes: &mut nodes,
            edges: &edges,
            requirements: &requirements,
            evidence: &evidence,
            reviews: &reviews,
        };
        let events = graph.recompute();
        assert_eq!(nodes[&check_id].status, TaskStatus::Ready);
        assert!(events.contains(&ReadinessEvent::BecameReady { task_id: check_id }));
    }

    #[test]
    fn done_check_stays_done_when_reviewed_artifact_still_matches() {
        let plan_id = PlanId::new();
        let artifact = argentor_core::ArtifactId::new();

        let mut action = TaskNode::new(plan_id, NodeType::Action, "action", Owner::Executor);
        action.status = TaskStatus::ReadyToCheck;
        action.active_artifact_id = Some(artifact);
        let action_id = action.task_id;

        let mut check = TaskNode::new(plan_id, NodeType::Check, "check", Owner::Reviewer);
        check.status = TaskStatus::Done;
        check.review_target_task_id = Some(action_id);
        let check_id = check.task_id;

        let mut nodes = HashMap::new();
        nodes.insert(action_id, action);
        nodes.insert(check_id, check);

        let edges = Vec::new();
        let requirements = Vec::new();
        let evidence = Vec::new();
        let reviews = vec![Review {
            review_id: argentor_core::ReviewId::new(),
            check_task_id: check_id,
            review_target_task_id: action_id,
            reviewed_artifact_id: Some(artifact),
            reviewer: Owner::Reviewer,
            total_score: 95,
            verdict: argentor_core::Verdict::Approved,
            breakdown: serde_json::json!({}),
            suggestions: serde_json::json!([]),
            summary: "approved".into(),
            idempotency_key: "k2".into(),
            created_at: chrono::Utc::now(),
        }];
        let mut graph = ReadinessGraph {
            nodes: &mut nodes,
            edges: &edges,
            requirements: &requirements,
            evidence: &evidence,
            reviews: &reviews,
        };
        graph.recompute();
        assert_eq!(nodes[&check_id].status, TaskStatus::Done);
    }

    #[test]
    fn cycle_detection_flags_back_edges() {
        let a = TaskId::new();
        let b = TaskId::new();
        let edges = vec![
            edge(a, b, EdgeType::DependsOn, None, None),
            edge(b, a, EdgeType::DependsOn, None, None),
        ];
        assert!(has_cycle(&[a, b], &edges));
    }

    #[test]
    fn no_cycle_in_a_simple_chain() {
        let a = TaskId::new();
        let b = TaskId::new();
        let c = TaskId::new();
        let edges = vec![edge(a, b, EdgeType::Decompose, None, None), edge(b, c, EdgeType::Decompose, None, None)];
        assert!(!has_cycle(&[a, b, c], &edges));
    }
}
