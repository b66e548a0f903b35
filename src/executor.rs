//! Executor external interface (C12): the contract the scheduler drives to
//! actually run a node's command. A real deployment implements this
//! against whatever task runner backs it (container orchestrator, batch
//! queue, local process pool); this crate only defines the contract.

use async_trait::async_trait;
use std::collections::BTreeMap;

use crate::dag::Node;
use crate::error::WorkflowResult;
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Running,
    Completed,
    Failed,
}

#[async_trait]
pub trait Executor: Send + Sync {
    /// Dispatches a ready node for execution, returning an opaque task id.
    async fn execute(&self, node: &Node, resolved_inputs: &BTreeMap<String, Value>) -> WorkflowResult<String>;

    /// Polls a dispatched task's current status.
    async fn get_status(&self, task_id: &str) -> WorkflowResult<TaskStatus>;

    /// Retrieves a completed task's outputs.
    async fn get_outputs(&self, task_id: &str) -> WorkflowResult<BTreeMap<String, Value>>;

    /// Best-effort cancellation of a running task.
    async fn cancel(&self, task_id: &str) -> WorkflowResult<()>;
}

/// The task parameter envelope passed to an out-of-process task runner: a
/// CommandLineTool invocation's resolved command, inputs, environment, and
/// stream redirection, plus enough identifying information for the runner
/// to report back against the right node.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct TaskEnvelope {
    pub cwl_command: Vec<String>,
    pub cwl_inputs: BTreeMap<String, Value>,
    pub cwl_outputs: Vec<String>,
    pub cwl_environment: BTreeMap<String, String>,
    pub cwl_stdin: Option<String>,
    pub cwl_stdout: Option<String>,
    pub cwl_stderr: Option<String>,
    pub cwl_step_id: String,
    pub cwl_node_id: String,
}

/// The result envelope a task runner writes back (`cwl_outputs.json`).
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct TaskResult {
    pub status: String,
    pub exit_code: Option<i32>,
    pub outputs: BTreeMap<String, Value>,
    pub error: Option<String>,
}
