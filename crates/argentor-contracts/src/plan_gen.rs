//! PLAN_GEN contract (planner output), `plan_json_v1`: tolerant
//! normalization of a raw plan object into the strict plan/nodes/edges/
//! requirements shape, followed by structural validation including
//! DAG cycle detection.

use crate::util::{as_str, coerce_bool_int, coerce_int, is_iso8601, is_uuid, new_uuid, normalize_key_aliases, IdMap};
use serde_json::{json, Map, Value};
use std::collections::{HashMap, HashSet};

pub const SCHEMA_VERSION: &str = "plan_json_v1";

const ALLOWED_NODE_TYPES: &[&str] = &["GOAL", "ACTION", "CHECK"];
const ALLOWED_EDGE_TYPES: &[&str] = &["DECOMPOSE", "DEPENDS_ON", "ALTERNATIVE"];
const ALLOWED_OWNERS: &[&str] = &["executor", "reviewer", "secondary_reviewer"];
const ALLOWED_REQUIREMENT_KINDS: &[&str] = &["FILE", "CONFIRMATION", "SKILL_OUTPUT"];
const ALLOWED_REQUIREMENT_SOURCES: &[&str] = &["USER", "AGENT", "ANY"];

fn clean_top_task_for_goal(top_task: &str) -> String {
    for line in top_task.lines() {
        let s = line.trim();
        if !s.is_empty() {
            return s.chars().take(200).collect();
        }
    }
    "Untitled Task".to_string()
}

fn ensure_list_container(plan_json: &mut Map<String, Value>, dst_key: &str, src_keys: &[&str]) -> Vec<Value> {
    let raw = match plan_json.get(dst_key) {
        Some(Value::Array(a)) => Some(a.clone()),
        _ => src_keys
            .iter()
            .find_map(|k| match plan_json.get(*k) {
                Some(Value::Array(a)) => Some(a.clone()),
                _ => None,
            }),
    };
    let list: Vec<Value> = raw
        .unwrap_or_default()
        .into_iter()
        .filter(Value::is_object)
        .collect();
    plan_json.insert(dst_key.to_string(), Value::Array(list.clone()));
    list
}

/// Tolerant repair pass over a raw planner JSON object, mirroring
/// `normalize_plan_json` in the original.
pub fn normalize(plan_json: &mut Value, top_task: &str, now_iso: &str) {
    let Some(root) = plan_json.as_object_mut() else {
        *plan_json = json!({"plan": {}, "nodes": [], "edges": [], "requirements": []});
        return;
    };

    if !matches!(root.get("plan"), Some(Value::Object(_))) {
        let mut plan = Map::new();
        normalize_key_aliases(
            &mut plan,
            &[
                ("plan_id", &["id"]),
                ("title", &["name"]),
                ("owner_agent_id", &["owner", "agent"]),
                ("root_task_id", &["root", "root_id"]),
                ("created_at", &["ts", "created", "createdAt"]),
                ("constraints", &["constraints_json", "constraint"]),
            ],
            true,
        );
        normalize_key_aliases(
            &mut plan,
            &[
                ("plan_id", &["plan_id", "planId"]),
                ("title", &["title"]),
                ("owner_agent_id", &["owner_agent_id"]),
                ("root_task_id", &["root_task_id"]),
                ("created_at", &["created_at"]),
                ("constraints", &["constraints"]),
            ],
            true,
        );
        root.insert("plan".to_string(), Value::Object(plan));
    }

    let plan = root.get_mut("plan").and_then(Value::as_object_mut).expect("just inserted");

    let title = as_str(plan.get("title")).unwrap_or("").trim().to_string();
    let title = if title.is_empty() {
        let cleaned = clean_top_task_for_goal(top_task);
        let cleaned: String = cleaned.chars().take(120).collect();
        if cleaned.is_empty() { "Untitled Plan".to_string() } else { cleaned }
    } else {
        title
    };
    plan.insert("title".to_string(), json!(title));

    if !as_str(plan.get("plan_id")).is_some_and(is_uuid) {
        plan.insert("plan_id".to_string(), json!(new_uuid()));
    }
    if !as_str(plan.get("root_task_id")).is_some_and(is_uuid) {
        plan.insert("root_task_id".to_string(), json!(new_uuid()));
    }
    if !as_str(plan.get("created_at")).is_some_and(is_iso8601) {
        plan.insert("created_at".to_string(), json!(now_iso));
    }
    if !as_str(plan.get("owner_agent_id")).is_some_and(|s| ALLOWED_OWNERS.contains(&s.trim())) {
        plan.insert("owner_agent_id".to_string(), json!("executor"));
    }
    if !matches!(plan.get("constraints"), Some(Value::Object(_))) {
        plan.insert("constraints".to_string(), json!({"deadline": null, "priority": "HIGH"}));
    }

    let plan_id = plan.get("plan_id").cloned().expect("assigned above");
    let root_task_id = as_str(plan.get("root_task_id")).expect("assigned above").to_string();

    let mut nodes = ensure_list_container(root, "nodes", &["nodes", "tasks", "task_nodes", "items"]);
    let mut edges = ensure_list_container(root, "edges", &["edges", "links", "deps", "dependencies", "task_edges"]);
    let mut reqs = ensure_list_container(root, "requirements", &["requirements", "inputs", "input_requirements", "requirements_list"]);

    let mut id_map = IdMap::new();

    for n in nodes.iter_mut() {
        if let Some(map) = n.as_object_mut() {
            normalize_key_aliases(
                map,
                &[
                    ("task_id", &["id", "taskId", "node_id", "nodeId"]),
                    ("title", &["name", "label"]),
                    ("node_type", &["type", "kind"]),
                    ("owner_agent_id", &["owner", "agent"]),
                    ("priority", &["prio"]),
                    ("goal_statement", &["goal", "objective"]),
                    ("rationale", &["reason", "why"]),
                    ("tags", &["labels"]),
                ],
                false,
            );
        }
    }
    for e in edges.iter_mut() {
        if let Some(map) = e.as_object_mut() {
            normalize_key_aliases(
                map,
                &[
                    ("edge_id", &["id"]),
                    ("from_task_id", &["from", "from_id", "source", "src", "parent_id"]),
                    ("to_task_id", &["to", "to_id", "target", "tgt", "child_id"]),
                    ("edge_type", &["type", "relation", "relation_type", "kind"]),
                    ("metadata", &["meta"]),
                ],
                false,
            );
        }
    }

    for n in nodes.iter_mut() {
        if let Some(map) = n.as_object_mut() {
            let mapped = id_map.map_id(as_str(map.get("task_id")));
            map.insert("task_id".to_string(), json!(mapped));
            map.insert("plan_id".to_string(), plan_id.clone());
        }
    }
    let mut start_ids: HashSet<String> = HashSet::new();
    let mut end_ids: HashSet<String> = HashSet::new();
    for e in edges.iter_mut() {
        if let Some(map) = e.as_object_mut() {
            let raw_from = as_str(map.get("from_task_id")).unwrap_or("").to_string();
            let raw_to = as_str(map.get("to_task_id")).unwrap_or("").to_string();

            let eid = id_map.map_id(as_str(map.get("edge_id")));
            let from = id_map.map_id(Some(raw_from.as_str()));
            let to = id_map.map_id(Some(raw_to.as_str()));
            map.insert("edge_id".to_string(), json!(eid));
            map.insert("plan_id".to_string(), plan_id.clone());
            map.insert("from_task_id".to_string(), json!(from.clone()));
            map.insert("to_task_id".to_string(), json!(to.clone()));

            if ["START", "BEGIN"].contains(&raw_from.trim().to_ascii_uppercase().as_str()) {
                start_ids.insert(from);
            }
            if ["END", "FINISH", "STOP"].contains(&raw_to.trim().to_ascii_uppercase().as_str()) {
                end_ids.insert(to);
            }
        }
    }
    for r in reqs.iter_mut() {
        if let Some(map) = r.as_object_mut() {
            let rid = id_map.map_id(as_str(map.get("requirement_id")));
            let tid = id_map.map_id(as_str(map.get("task_id")));
            map.insert("requirement_id".to_string(), json!(rid));
            map.insert("task_id".to_string(), json!(tid));
        }
    }

    // Rewrite edges from a synthetic START into the root task (as DECOMPOSE)
    // and drop edges into a synthetic END, so autocreated placeholders don't
    // pollute the plan.
    if !start_ids.is_empty() || !end_ids.is_empty() {
        let mut rewritten = Vec::with_capacity(edges.len());
        for mut e in edges.into_iter() {
            let Some(map) = e.as_object_mut() else { continue };
            let to = as_str(map.get("to_task_id")).unwrap_or("").to_string();
            if end_ids.contains(&to) {
                continue;
            }
            let from = as_str(map.get("from_task_id")).unwrap_or("").to_string();
            if start_ids.contains(&from) {
                map.insert("from_task_id".to_string(), json!(root_task_id));
                map.insert("edge_type".to_string(), json!("DECOMPOSE"));
                let mut meta = match map.get("metadata") {
                    Some(Value::Object(m)) => m.clone(),
                    _ => Map::new(),
                };
                meta.insert("and_or".to_string(), json!("AND"));
                map.insert("metadata".to_string(), Value::Object(meta));
            }
            rewritten.push(e);
        }
        edges = rewritten;
    }

    // Ensure referenced nodes exist.
    let mut node_by_id: HashMap<String, usize> = nodes
        .iter()
        .enumerate()
        .filter_map(|(i, n)| as_str(n.get("task_id")).map(|id| (id.to_string(), i)))
        .collect();

    let mut ensure_node = |task_id: &str, is_root: bool, nodes: &mut Vec<Value>, node_by_id: &mut HashMap<String, usize>| {
        if task_id.is_empty() || node_by_id.contains_key(task_id) {
            return;
        }
        let node = json!({
            "task_id": task_id,
            "plan_id": plan_id,
            "node_type": if is_root { "GOAL" } else { "ACTION" },
            "title": if is_root { "Root Task".to_string() } else { format!("AUTO: missing node {}", &task_id[..task_id.len().min(8)]) },
            "goal_statement": if is_root { Some(clean_top_task_for_goal(top_task)) } else { None },
            "rationale": "Autocreated placeholder node for referential integrity.",
            "owner_agent_id": "executor",
            "priority": 0,
            "tags": ["autofix", "placeholder"],
        });
        nodes.push(node);
        node_by_id.insert(task_id.to_string(), nodes.len() - 1);
    };

    ensure_node(&root_task_id, true, &mut nodes, &mut node_by_id);
    let edge_endpoints: Vec<(String, String)> = edges
        .iter()
        .map(|e| {
            (
                as_str(e.get("from_task_id")).unwrap_or("").to_string(),
                as_str(e.get("to_task_id")).unwrap_or("").to_string(),
            )
        })
        .collect();
    for (from, to) in &edge_endpoints {
        ensure_node(from, false, &mut nodes, &mut node_by_id);
        ensure_node(to, false, &mut nodes, &mut node_by_id);
    }
    let req_task_ids: Vec<String> = reqs
        .iter()
        .map(|r| as_str(r.get("task_id")).unwrap_or("").to_string())
        .collect();
    for tid in &req_task_ids {
        ensure_node(tid, false, &mut nodes, &mut node_by_id);
    }

    if !start_ids.is_empty() || !end_ids.is_empty() {
        let drop_ids: HashSet<&String> = start_ids.iter().chain(end_ids.iter()).collect();
        nodes.retain(|n| !as_str(n.get("task_id")).is_some_and(|id| drop_ids.contains(&id.to_string())));
    }

    // Coerce required node fields.
    for (idx, n) in nodes.iter_mut().enumerate() {
        let Some(map) = n.as_object_mut() else { continue };
        let is_root = as_str(map.get("task_id")) == Some(root_task_id.as_str());
        let node_type = as_str(map.get("node_type")).map(str::to_ascii_uppercase);
        let node_type = match node_type {
            Some(t) if ALLOWED_NODE_TYPES.contains(&t.as_str()) => t,
            _ => if is_root { "GOAL".to_string() } else { "ACTION".to_string() },
        };
        map.insert("node_type".to_string(), json!(node_type));

        if as_str(map.get("title")).unwrap_or("").trim().is_empty() {
            map.insert("title".to_string(), json!(format!("Task {}", idx + 1)));
        }
        if is_root && node_type == "GOAL" {
            if !as_str(map.get("goal_statement")).is_some_and(|s| !s.trim().is_empty()) {
                map.insert("goal_statement".to_string(), json!(clean_top_task_for_goal(top_task)));
            }
        }
        if !as_str(map.get("owner_agent_id")).is_some_and(|s| ALLOWED_OWNERS.contains(&s.trim())) {
            map.insert("owner_agent_id".to_string(), json!("executor"));
        }
        let priority = coerce_int(map.get("priority"), 0);
        map.insert("priority".to_string(), json!(priority));
        let tags_ok = map.get("tags").and_then(Value::as_array).is_some_and(|a| a.iter().all(Value::is_string));
        if !tags_ok {
            map.insert("tags".to_string(), json!(Vec::<String>::new()));
        }
    }

    let edge_type_aliases: &[(&str, &str)] = &[
        ("DEPEND", "DEPENDS_ON"),
        ("DEPENDS", "DEPENDS_ON"),
        ("DEPEND_ON", "DEPENDS_ON"),
        ("DEPENDS-ON", "DEPENDS_ON"),
        ("DEPENDS ON", "DEPENDS_ON"),
        ("REQUIRES", "DEPENDS_ON"),
        ("PREREQ", "DEPENDS_ON"),
        ("PREREQUISITE", "DEPENDS_ON"),
        ("DECOMPOSITION", "DECOMPOSE"),
        ("BREAKDOWN", "DECOMPOSE"),
        ("CHILD_OF", "DECOMPOSE"),
        ("ALT", "ALTERNATIVE"),
        ("ALTERNATE", "ALTERNATIVE"),
    ];
    for e in edges.iter_mut() {
        let Some(map) = e.as_object_mut() else { continue };
        let et = as_str(map.get("edge_type")).map(str::to_ascii_uppercase).unwrap_or_else(|| "DEPENDS_ON".to_string());
        let et_norm = edge_type_aliases
            .iter()
            .find(|(k, _)| *k == et)
            .map(|(_, v)| (*v).to_string())
            .unwrap_or(et);
        let et_norm = if ALLOWED_EDGE_TYPES.contains(&et_norm.as_str()) { et_norm } else { "DEPENDS_ON".to_string() };
        map.insert("edge_type".to_string(), json!(et_norm));

        let mut meta = match map.get("metadata") {
            Some(Value::Object(m)) => m.clone(),
            _ => Map::new(),
        };
        if et_norm == "DECOMPOSE" {
            let ao = as_str(meta.get("and_or")).unwrap_or("AND").trim().to_ascii_uppercase();
            meta.insert("and_or".to_string(), json!(if ao == "AND" || ao == "OR" { ao } else { "AND".to_string() }));
        }
        if et_norm == "ALTERNATIVE" {
            let has_group = as_str(meta.get("group_id")).is_some_and(|s| !s.trim().is_empty());
            if !has_group {
                meta.insert("group_id".to_string(), json!("AUTO_GROUP_1"));
            }
        }
        map.insert("metadata".to_string(), Value::Object(meta));
    }

    let kind_aliases: &[(&str, &str)] = &[
        ("FILES", "FILE"),
        ("DOC", "FILE"),
        ("DOCS", "FILE"),
        ("DOCUMENT", "FILE"),
        ("DOCUMENTS", "FILE"),
        ("CONFIRM", "CONFIRMATION"),
        ("SKILL", "SKILL_OUTPUT"),
        ("SKILL_RESULT", "SKILL_OUTPUT"),
        ("SKILL_ARTIFACT", "SKILL_OUTPUT"),
    ];
    for (idx, r) in reqs.iter_mut().enumerate() {
        let Some(map) = r.as_object_mut() else { continue };
        if as_str(map.get("name")).unwrap_or("").trim().is_empty() {
            map.insert("name".to_string(), json!(format!("requirement_{}", idx + 1)));
        }
        let kind = as_str(map.get("kind")).map(str::to_ascii_uppercase).unwrap_or_default();
        let kind_norm = kind_aliases.iter().find(|(k, _)| *k == kind).map(|(_, v)| (*v).to_string()).unwrap_or(kind);
        let kind_norm = if ALLOWED_REQUIREMENT_KINDS.contains(&kind_norm.as_str()) { kind_norm } else { "FILE".to_string() };
        map.insert("kind".to_string(), json!(kind_norm));

        let src = as_str(map.get("source")).map(str::to_ascii_uppercase).unwrap_or_default();
        let src_norm = if ALLOWED_REQUIREMENT_SOURCES.contains(&src.as_str()) { src } else { "USER".to_string() };
        map.insert("source".to_string(), json!(src_norm));

        let required = coerce_bool_int(map.get("required"), 1);
        map.insert("required".to_string(), json!(required));
        let min_count = coerce_int(map.get("min_count"), 1).max(1);
        map.insert("min_count".to_string(), json!(min_count));

        let allowed_types = match map.get("allowed_types") {
            Some(Value::String(s)) => vec![s.clone()],
            Some(Value::Array(a)) if a.iter().all(Value::is_string) => a.clone().into_iter().map(|v| v.as_str().unwrap_or("").to_string()).collect(),
            _ => Vec::new(),
        };
        map.insert("allowed_types".to_string(), json!(allowed_types));
    }

    if edges.is_empty() && nodes.len() > 1 {
        for n in &nodes {
            let tid = as_str(n.get("task_id")).unwrap_or("");
            if tid == root_task_id {
                continue;
            }
            edges.push(json!({
                "edge_id": new_uuid(),
                "plan_id": plan_id,
                "from_task_id": root_task_id,
                "to_task_id": tid,
                "edge_type": "DECOMPOSE",
                "metadata": {"and_or": "AND"},
            }));
        }
    }

    let has_root_decompose = edges.iter().any(|e| {
        as_str(e.get("edge_type")) == Some("DECOMPOSE") && as_str(e.get("from_task_id")) == Some(root_task_id.as_str())
    });
    if !has_root_decompose && nodes.len() > 1 {
        let existing: HashSet<(String, String, String)> = edges
            .iter()
            .map(|e| {
                (
                    as_str(e.get("from_task_id")).unwrap_or("").to_string(),
                    as_str(e.get("to_task_id")).unwrap_or("").to_string(),
                    as_str(e.get("edge_type")).unwrap_or("").to_string(),
                )
            })
            .collect();
        for n in &nodes {
            let tid = as_str(n.get("task_id")).unwrap_or("").to_string();
            if tid == root_task_id {
                continue;
            }
            let key = (root_task_id.clone(), tid.clone(), "DECOMPOSE".to_string());
            if existing.contains(&key) {
                continue;
            }
            edges.push(json!({
                "edge_id": new_uuid(),
                "plan_id": plan_id,
                "from_task_id": root_task_id,
                "to_task_id": tid,
                "edge_type": "DECOMPOSE",
                "metadata": {"and_or": "AND"},
            }));
        }
    }

    root.insert("nodes".to_string(), Value::Array(nodes));
    root.insert("edges".to_string(), Value::Array(edges));
    root.insert("requirements".to_string(), Value::Array(reqs));
}

/// Structural validation, mirroring `validate_plan_dict`: top-level keys,
/// enum membership, DECOMPOSE and_or consistency per parent, ALTERNATIVE
/// group_id presence, and DFS-based cycle detection.
pub fn validate(plan_json: &Value) -> Result<(), String> {
    let root = plan_json.as_object().ok_or_else(|| "payload must be object".to_string())?;
    for key in ["plan", "nodes", "edges", "requirements"] {
        if !root.contains_key(key) {
            return Err(format!("missing key: {key}"));
        }
    }
    let nodes = root.get("nodes").and_then(Value::as_array).ok_or_else(|| "nodes must be array".to_string())?;
    let edges = root.get("edges").and_then(Value::as_array).ok_or_else(|| "edges must be array".to_string())?;
    let reqs = root.get("requirements").and_then(Value::as_array).ok_or_else(|| "requirements must be array".to_string())?;

    let mut node_ids: HashSet<String> = HashSet::new();
    for n in nodes {
        let n = n.as_object().ok_or_else(|| "node must be object".to_string())?;
        let tid = as_str(n.get("task_id")).ok_or_else(|| "node missing key: task_id".to_string())?;
        if !is_uuid(tid) {
            return Err("node.task_id must be a uuid".to_string());
        }
        let node_type = as_str(n.get("node_type")).ok_or_else(|| "node missing key: node_type".to_string())?;
        if !ALLOWED_NODE_TYPES.contains(&node_type) {
            return Err(format!("node.node_type invalid (got {node_type})"));
        }
        let owner = as_str(n.get("owner_agent_id")).ok_or_else(|| "node missing key: owner_agent_id".to_string())?;
        if !ALLOWED_OWNERS.contains(&owner) {
            return Err(format!("node.owner_agent_id invalid (got {owner})"));
        }
        node_ids.insert(tid.to_string());
    }

    let mut adjacency: HashMap<String, Vec<String>> = HashMap::new();
    let mut decompose_and_or: HashMap<String, HashSet<String>> = HashMap::new();
    let mut alt_groups: HashMap<String, HashSet<String>> = HashMap::new();

    for e in edges {
        let e = e.as_object().ok_or_else(|| "edge must be object".to_string())?;
        let from = as_str(e.get("from_task_id")).ok_or_else(|| "edge missing key: from_task_id".to_string())?;
        let to = as_str(e.get("to_task_id")).ok_or_else(|| "edge missing key: to_task_id".to_string())?;
        let edge_type = as_str(e.get("edge_type")).ok_or_else(|| "edge missing key: edge_type".to_string())?;
        if !ALLOWED_EDGE_TYPES.contains(&edge_type) {
            return Err(format!("edge.edge_type must be DECOMPOSE|DEPENDS_ON|ALTERNATIVE (got {edge_type})"));
        }
        if !node_ids.contains(from) || !node_ids.contains(to) {
            return Err("edge references unknown node".to_string());
        }

        if edge_type == "DECOMPOSE" {
            adjacency.entry(from.to_string()).or_default().push(to.to_string());
            let ao = e
                .get("metadata")
                .and_then(Value::as_object)
                .and_then(|m| as_str(m.get("and_or")))
                .unwrap_or("AND")
                .to_string();
            decompose_and_or.entry(from.to_string()).or_default().insert(ao);
        } else if edge_type == "DEPENDS_ON" {
            adjacency.entry(to.to_string()).or_default().push(from.to_string());
        } else if edge_type == "ALTERNATIVE" {
            let gid = e
                .get("metadata")
                .and_then(Value::as_object)
                .and_then(|m| as_str(m.get("group_id")))
                .ok_or_else(|| "edge missing key: group_id".to_string())?;
            alt_groups.entry(gid.to_string()).or_default().insert(to.to_string());
        }
    }

    for (parent, kinds) in &decompose_and_or {
        if kinds.len() > 1 {
            return Err(format!("inconsistent and_or under parent {parent}"));
        }
    }

    for r in reqs {
        let r = r.as_object().ok_or_else(|| "requirement must be object".to_string())?;
        let kind = as_str(r.get("kind")).ok_or_else(|| "requirement missing key: kind".to_string())?;
        if !ALLOWED_REQUIREMENT_KINDS.contains(&kind) {
            return Err(format!("requirement.kind invalid (got {kind})"));
        }
        let source = as_str(r.get("source")).ok_or_else(|| "requirement missing key: source".to_string())?;
        if !ALLOWED_REQUIREMENT_SOURCES.contains(&source) {
            return Err(format!("requirement.source invalid (got {source})"));
        }
        let tid = as_str(r.get("task_id")).ok_or_else(|| "requirement missing key: task_id".to_string())?;
        if !node_ids.contains(tid) {
            return Err("requirement references unknown task".to_string());
        }
    }

    detect_cycle(&node_ids, &adjacency)
}

#[derive(PartialEq, Eq, Clone, Copy)]
enum Mark {
    Visiting,
    Done,
}

fn detect_cycle(node_ids: &HashSet<String>, adjacency: &HashMap<String, Vec<String>>) -> Result<(), String> {
    let mut marks: HashMap<&str, Mark> = HashMap::new();

    fn visit<'a>(
        node: &'a str,
        adjacency: &'a HashMap<String, Vec<String>>,
        marks: &mut HashMap<&'a str, Mark>,
    ) -> Result<(), String> {
        match marks.get(node) {
            Some(Mark::Done) => return Ok(()),
            Some(Mark::Visiting) => return Err(format!("cycle detected at node {node}")),
            None => {}
        }
        marks.insert(node, Mark::Visiting);
        if let Some(children) = adjacency.get(node) {
            for child in children {
                visit(child, adjacency, marks)?;
            }
        }
        marks.insert(node, Mark::Done);
        Ok(())
    }

    for n in node_ids {
        visit(n, adjacency, &mut marks)?;
    }
    Ok(())
}
