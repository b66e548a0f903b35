//! DAG node (C7/C8): one unit of scheduled work — an unscattered step, or
//! one instance of a scattered step.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::document::{Document, WorkflowStep};
use crate::error::{WorkflowError, WorkflowResult};
use crate::scatter::ScatterIndex;
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    Pending,
    Ready,
    Running,
    Completed,
    Failed,
    Skipped,
}

impl NodeStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, NodeStatus::Completed | NodeStatus::Failed | NodeStatus::Skipped)
    }
}

/// The mutable fields of a node, guarded independently of the DAG's
/// structural lock so dispatch/poll can update one node without blocking
/// reads of the rest of the graph.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeState {
    pub status_override: Option<NodeStatus>,
    pub task_id: Option<String>,
    pub outputs: BTreeMap<String, Value>,
    pub error: Option<String>,
}

/// A DAG node. `id` is deterministic given `(step_id, scatter_index)` so
/// that rebuilding the DAG from a document plus persisted state yields the
/// same node identities every time.
pub struct Node {
    pub id: String,
    pub step_id: String,
    pub scatter_index: ScatterIndex,
    pub step: WorkflowStep,
    pub tool: Document,
    pub dependencies: Vec<String>,
    pub dependents: Vec<String>,
    status: Mutex<NodeStatus>,
    state: Mutex<NodeState>,
}

impl Node {
    pub fn new(step: WorkflowStep, tool: Document, scatter_index: ScatterIndex) -> Self {
        let id = node_id(&step.id, &scatter_index);
        Self {
            id,
            step_id: step.id.clone(),
            scatter_index,
            step,
            tool,
            dependencies: Vec::new(),
            dependents: Vec::new(),
            status: Mutex::new(NodeStatus::Pending),
            state: Mutex::new(NodeState::default()),
        }
    }

    pub fn status(&self) -> NodeStatus {
        *self.status.lock()
    }

    pub fn set_status(&self, status: NodeStatus) {
        *self.status.lock() = status;
    }

    pub fn task_id(&self) -> Option<String> {
        self.state.lock().task_id.clone()
    }

    pub fn set_task_id(&self, task_id: String) {
        self.state.lock().task_id = Some(task_id);
    }

    pub fn outputs(&self) -> BTreeMap<String, Value> {
        self.state.lock().outputs.clone()
    }

    pub fn set_outputs(&self, outputs: BTreeMap<String, Value>) {
        self.state.lock().outputs = outputs;
    }

    pub fn error(&self) -> Option<String> {
        self.state.lock().error.clone()
    }

    pub fn set_error(&self, error: String) {
        self.state.lock().error = Some(error);
    }

    pub fn snapshot(&self) -> NodeState {
        let mut s = self.state.lock().clone();
        s.status_override = Some(self.status());
        s
    }

    /// Restores persisted mutable fields onto a freshly rebuilt node
    /// (see S6: restart recovery rebuilds structure, then replays state).
    pub fn restore(&self, saved: &NodeState) {
        if let Some(status) = saved.status_override {
            self.set_status(status);
        }
        let mut state = self.state.lock();
        state.task_id = saved.task_id.clone();
        state.outputs = saved.outputs.clone();
        state.error = saved.error.clone();
    }

    /// Validates and performs a state transition, per the C8 transition
    /// table. Invalid transitions are rejected rather than silently
    /// clamped.
    pub fn transition(&self, to: NodeStatus) -> WorkflowResult<()> {
        let from = self.status();
        let allowed = match (from, to) {
            (NodeStatus::Pending, NodeStatus::Ready) => true,
            (NodeStatus::Pending, NodeStatus::Skipped) => true,
            (NodeStatus::Ready, NodeStatus::Running) => true,
            (NodeStatus::Ready, NodeStatus::Skipped) => true,
            (NodeStatus::Running, NodeStatus::Completed) => true,
            (NodeStatus::Running, NodeStatus::Failed) => true,
            _ => false,
        };
        if allowed {
            self.set_status(to);
            Ok(())
        } else {
            Err(WorkflowError::InvalidStateTransition {
                from: format!("{:?}", from),
                to: format!("{:?}", to),
            })
        }
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("status", &self.status())
            .field("scatter_index", &self.scatter_index)
            .field("dependencies", &self.dependencies)
            .finish()
    }
}

/// Deterministic node id from `(step_id, scatter_index)`. Unscattered steps
/// use the step id verbatim; scattered instances suffix their flat index
/// position, e.g. `step/0`, `step/1`.
pub fn node_id(step_id: &str, scatter_index: &ScatterIndex) -> String {
    if scatter_index.is_empty() {
        step_id.to_string()
    } else {
        format!(
            "{}/{}",
            step_id,
            scatter_index.iter().map(i64::to_string).collect::<Vec<_>>().join(",")
        )
    }
}
