//! DAG runtime (C8): the in-memory graph of nodes for one workflow run,
//! plus the operations the scheduler drives it with.
//!
//! Structure (the node map and edges) is guarded by one `RwLock`; each
//! node's mutable fields (status, task_id, outputs, error) are guarded
//! independently (see [`super::node::Node`]) so dispatch on one node never
//! blocks a structural read of the rest of the graph. Fan-in readiness is
//! tracked via an explicit dependency graph rather than a per-join counter.

use parking_lot::RwLock;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use super::node::{Node, NodeStatus};
use crate::error::{WorkflowError, WorkflowResult};

#[derive(Debug, Clone, Default)]
pub struct DagStats {
    pub total: usize,
    pub pending: usize,
    pub ready: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// The DAG for one workflow run.
#[derive(Debug)]
pub struct Dag {
    nodes: RwLock<HashMap<String, Arc<Node>>>,
}

impl Dag {
    pub fn new() -> Self {
        Self { nodes: RwLock::new(HashMap::new()) }
    }

    pub fn add_node(&self, node: Node) {
        let node = Arc::new(node);
        self.nodes.write().insert(node.id.clone(), node);
    }

    pub fn get_node(&self, id: &str) -> Option<Arc<Node>> {
        self.nodes.read().get(id).cloned()
    }

    pub fn all_nodes(&self) -> Vec<Arc<Node>> {
        self.nodes.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.nodes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Promotes every `Pending` node whose dependencies are all
    /// `Completed`/`Skipped` to `Ready`, then returns all currently-`Ready`
    /// nodes. Call this before dispatch on every scheduler tick.
    pub fn get_ready_nodes(&self) -> Vec<Arc<Node>> {
        let nodes = self.nodes.read();
        for node in nodes.values() {
            if node.status() != NodeStatus::Pending {
                continue;
            }
            let deps_satisfied = node.dependencies.iter().all(|dep_id| {
                nodes
                    .get(dep_id)
                    .map(|d| matches!(d.status(), NodeStatus::Completed | NodeStatus::Skipped))
                    .unwrap_or(false)
            });
            if deps_satisfied {
                // Best-effort: Pending -> Ready is always legal from Pending.
                let _ = node.transition(NodeStatus::Ready);
            }
        }
        nodes
            .values()
            .filter(|n| n.status() == NodeStatus::Ready)
            .cloned()
            .collect()
    }

    /// Applies a status transition to a node and, on `Failed`, cascades
    /// `Skipped` to every transitive dependent.
    pub fn update_node_status(&self, id: &str, status: NodeStatus) -> WorkflowResult<()> {
        let node = self.get_node(id).ok_or_else(|| WorkflowError::NotFound(format!("node {}", id)))?;
        node.transition(status)?;
        if status == NodeStatus::Failed {
            self.mark_dependents_skipped(id);
        }
        Ok(())
    }

    /// Recursively marks every transitive dependent of `failed_id` as
    /// `Skipped`, stopping at nodes already in a terminal state (a node
    /// already `Completed` before its dependency failed is left alone).
    pub fn mark_dependents_skipped(&self, failed_id: &str) {
        let nodes = self.nodes.read();
        let mut queue: VecDeque<String> = VecDeque::new();
        if let Some(node) = nodes.get(failed_id) {
            queue.extend(node.dependents.iter().cloned());
        }
        let mut visited = std::collections::HashSet::new();
        while let Some(id) = queue.pop_front() {
            if !visited.insert(id.clone()) {
                continue;
            }
            if let Some(node) = nodes.get(&id) {
                if !node.status().is_terminal() {
                    let _ = node.transition(NodeStatus::Skipped);
                }
                queue.extend(node.dependents.iter().cloned());
            }
        }
    }

    pub fn is_complete(&self) -> bool {
        self.nodes.read().values().all(|n| n.status().is_terminal())
    }

    pub fn has_failed(&self) -> bool {
        self.nodes.read().values().any(|n| n.status() == NodeStatus::Failed)
    }

    /// Kahn's algorithm topological sort. Errors (rather than returning a
    /// partial order) if the graph contains a cycle — this should be
    /// unreachable for DAGs built from a validated workflow, but the
    /// invariant is still worth enforcing here.
    pub fn topo_sort(&self) -> WorkflowResult<Vec<String>> {
        let nodes = self.nodes.read();
        let mut in_degree: HashMap<&str, usize> =
            nodes.keys().map(|id| (id.as_str(), 0usize)).collect();
        for node in nodes.values() {
            for dep in &node.dependencies {
                if nodes.contains_key(dep) {
                    *in_degree.get_mut(node.id.as_str()).unwrap() += 1;
                }
            }
        }
        let mut queue: VecDeque<&str> =
            in_degree.iter().filter(|(_, &d)| d == 0).map(|(&id, _)| id).collect();
        let mut order = Vec::with_capacity(nodes.len());
        while let Some(id) = queue.pop_front() {
            order.push(id.to_string());
            if let Some(node) = nodes.get(id) {
                for dependent in &node.dependents {
                    if let Some(d) = in_degree.get_mut(dependent.as_str()) {
                        *d -= 1;
                        if *d == 0 {
                            queue.push_back(dependent.as_str());
                        }
                    }
                }
            }
        }
        if order.len() != nodes.len() {
            return Err(WorkflowError::Internal("cycle detected during topological sort".into()));
        }
        Ok(order)
    }

    pub fn get_stats(&self) -> DagStats {
        let nodes = self.nodes.read();
        let mut stats = DagStats { total: nodes.len(), ..Default::default() };
        for node in nodes.values() {
            match node.status() {
                NodeStatus::Pending => stats.pending += 1,
                NodeStatus::Ready => stats.ready += 1,
                NodeStatus::Running => stats.running += 1,
                NodeStatus::Completed => stats.completed += 1,
                NodeStatus::Failed => stats.failed += 1,
                NodeStatus::Skipped => stats.skipped += 1,
            }
        }
        stats
    }
}

impl Default for Dag {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{Document, WorkflowStep};

    fn bare_step(id: &str) -> WorkflowStep {
        WorkflowStep {
            id: id.to_string(),
            run: crate::document::RunRef::Path("tool.cwl".into()),
            inputs: vec![],
            out: vec!["out".into()],
            scatter: None,
            scatter_method: None,
            when: None,
        }
    }

    fn bare_tool() -> Document {
        Document {
            cwl_version: crate::document::CwlVersion::V1_2,
            class: crate::document::DocumentClass::CommandLineTool,
            id: None,
            requirements: vec![],
            hints: vec![],
            inputs: vec![],
            outputs: vec![],
            steps: vec![],
            base_command: vec!["true".into()],
            arguments: vec![],
            stdin: None,
            stdout: None,
            stderr: None,
            success_codes: vec![],
            expression: None,
            content_hash: None,
        }
    }

    fn linear_dag() -> Dag {
        let dag = Dag::new();
        let mut a = Node::new(bare_step("a"), bare_tool(), vec![]);
        let mut b = Node::new(bare_step("b"), bare_tool(), vec![]);
        let mut c = Node::new(bare_step("c"), bare_tool(), vec![]);
        a.dependents = vec!["b".into()];
        b.dependencies = vec!["a".into()];
        b.dependents = vec!["c".into()];
        c.dependencies = vec!["b".into()];
        dag.add_node(a);
        dag.add_node(b);
        dag.add_node(c);
        dag
    }

    #[test]
    fn ready_nodes_promote_when_deps_complete() {
        let dag = linear_dag();
        let ready = dag.get_ready_nodes();
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].id, "a");

        dag.get_node("a").unwrap().transition(NodeStatus::Ready).ok();
        dag.update_node_status("a", NodeStatus::Running).unwrap();
        dag.update_node_status("a", NodeStatus::Completed).unwrap();

        let ready = dag.get_ready_nodes();
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].id, "b");
    }

    #[test]
    fn failure_cascades_skip_to_all_dependents() {
        let dag = linear_dag();
        dag.get_node("a").unwrap().transition(NodeStatus::Ready).unwrap();
        dag.update_node_status("a", NodeStatus::Running).unwrap();
        dag.update_node_status("a", NodeStatus::Failed).unwrap();

        assert_eq!(dag.get_node("b").unwrap().status(), NodeStatus::Skipped);
        assert_eq!(dag.get_node("c").unwrap().status(), NodeStatus::Skipped);
        assert!(dag.get_node("b").unwrap().task_id().is_none());
        assert!(dag.is_complete());
        assert!(dag.has_failed());
    }

    #[test]
    fn topo_sort_respects_dependency_order() {
        let dag = linear_dag();
        let order = dag.topo_sort().unwrap();
        let pos = |id: &str| order.iter().position(|x| x == id).unwrap();
        assert!(pos("a") < pos("b"));
        assert!(pos("b") < pos("c"));
    }
}
