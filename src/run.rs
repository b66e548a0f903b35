//! Workflow run (C9/C10 data model): one submitted execution of a
//! workflow document against a set of inputs.
//!
//! A UUID-keyed instance with an explicit state-transition API that
//! rejects illegal transitions rather than clamping them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::error::{WorkflowError, WorkflowResult};
use crate::value::Value;

/// Unique identifier for a workflow run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(#[serde(with = "uuid::serde::compact")] pub Uuid);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn parse_str(s: &str) -> WorkflowResult<Self> {
        Uuid::parse_str(s).map(Self).map_err(|e| WorkflowError::Parse(format!("invalid run id: {}", e)))
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Workflow run lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Failed | RunStatus::Cancelled)
    }
}

/// A persisted DAG node's mutable fields, as stored in
/// `WorkflowRun::dag_state`. Structure is rederived on rebuild; only these
/// fields are persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedNodeState {
    pub step_id: String,
    pub scatter_index: Vec<i64>,
    pub status: crate::dag::NodeStatus,
    pub task_id: Option<String>,
    pub inputs: BTreeMap<String, Value>,
    pub outputs: BTreeMap<String, Value>,
    pub error: Option<String>,
}

/// One submitted workflow execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowRun {
    pub id: RunId,
    pub workflow_id: String,
    pub owner: String,
    pub status: RunStatus,
    pub inputs: BTreeMap<String, Value>,
    pub output_path: Option<String>,
    /// Map of node id -> persisted mutable state; `None` until the DAG has
    /// been built at least once.
    pub dag_state: BTreeMap<String, PersistedNodeState>,
    pub outputs: Option<BTreeMap<String, Value>>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl WorkflowRun {
    pub fn new(workflow_id: String, owner: String, inputs: BTreeMap<String, Value>) -> Self {
        Self {
            id: RunId::new(),
            workflow_id,
            owner,
            status: RunStatus::Pending,
            inputs,
            output_path: None,
            dag_state: BTreeMap::new(),
            outputs: None,
            error_message: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    /// Applies a status transition, refusing to overwrite a terminal state.
    pub fn transition(&mut self, to: RunStatus) -> WorkflowResult<()> {
        if self.status.is_terminal() {
            return Err(WorkflowError::InvalidStateTransition {
                from: format!("{:?}", self.status),
                to: format!("{:?}", to),
            });
        }
        let allowed = matches!(
            (self.status, to),
            (RunStatus::Pending, RunStatus::Running)
                | (RunStatus::Pending, RunStatus::Cancelled)
                | (RunStatus::Running, RunStatus::Completed)
                | (RunStatus::Running, RunStatus::Failed)
                | (RunStatus::Running, RunStatus::Cancelled)
        );
        if !allowed {
            return Err(WorkflowError::InvalidStateTransition {
                from: format!("{:?}", self.status),
                to: format!("{:?}", to),
            });
        }
        match to {
            RunStatus::Running => self.started_at = Some(Utc::now()),
            RunStatus::Completed | RunStatus::Failed | RunStatus::Cancelled => {
                self.completed_at = Some(Utc::now())
            }
            RunStatus::Pending => {}
        }
        self.status = to;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states_reject_further_transitions() {
        let mut run = WorkflowRun::new("wf".into(), "owner".into(), BTreeMap::new());
        run.transition(RunStatus::Running).unwrap();
        run.transition(RunStatus::Completed).unwrap();
        let err = run.transition(RunStatus::Failed).unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidStateTransition { .. }));
    }

    #[test]
    fn pending_can_be_cancelled_directly() {
        let mut run = WorkflowRun::new("wf".into(), "owner".into(), BTreeMap::new());
        run.transition(RunStatus::Cancelled).unwrap();
        assert_eq!(run.status, RunStatus::Cancelled);
    }
}
