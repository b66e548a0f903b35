//! State store contract (C10): persistence for workflow documents, runs,
//! and step executions. This module defines the contract plus an
//! in-memory reference implementation; a production deployment backs this
//! with a real database.
//!
//! An async trait so callers can swap in a real database without touching
//! the scheduler.

use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::BTreeMap;

use crate::document::Document;
use crate::error::{WorkflowError, WorkflowResult};
use crate::run::{PersistedNodeState, RunId, RunStatus, WorkflowRun};
use crate::value::Value;

/// Optional filter for [`StateStore::list_workflow_runs`].
#[derive(Debug, Clone, Default)]
pub struct RunFilter {
    pub owner: Option<String>,
    pub status: Option<RunStatus>,
    pub workflow_id: Option<String>,
}

/// A persisted step execution record (one per dispatched node).
#[derive(Debug, Clone)]
pub struct StepExecution {
    pub run_id: RunId,
    pub step_id: String,
    pub scatter_index: Vec<i64>,
    pub status: crate::dag::NodeStatus,
    pub task_id: Option<String>,
    pub inputs: BTreeMap<String, Value>,
    pub outputs: BTreeMap<String, Value>,
    pub error: Option<String>,
    pub retry_count: u32,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

/// Run progress summary for `GetRunProgress`.
#[derive(Debug, Clone, Default)]
pub struct RunProgress {
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub running: usize,
}

/// State store contract (C10). Implementations must honor last-writer-wins
/// semantics for in-flight fields, except that terminal run states are
/// sticky: once a run is `Completed`/`Failed`/`Cancelled`, further status
/// updates are rejected rather than applied.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn save_workflow(&self, doc: &Document) -> WorkflowResult<String>;
    async fn get_workflow(&self, hash: &str) -> WorkflowResult<Option<Document>>;
    async fn get_workflow_by_hash(&self, hash: &str) -> WorkflowResult<Option<Document>> {
        self.get_workflow(hash).await
    }

    async fn create_workflow_run(&self, run: WorkflowRun) -> WorkflowResult<()>;
    async fn get_workflow_run(&self, id: RunId) -> WorkflowResult<Option<WorkflowRun>>;
    async fn list_workflow_runs(&self, filter: &RunFilter) -> WorkflowResult<Vec<WorkflowRun>>;
    async fn update_workflow_run_status(&self, id: RunId, status: RunStatus) -> WorkflowResult<()>;
    async fn update_workflow_run_error(&self, id: RunId, message: String) -> WorkflowResult<()>;
    async fn update_workflow_run_outputs(&self, id: RunId, outputs: BTreeMap<String, Value>) -> WorkflowResult<()>;
    async fn update_workflow_run_dag_state(
        &self,
        id: RunId,
        dag_state: BTreeMap<String, PersistedNodeState>,
    ) -> WorkflowResult<()>;

    async fn create_step_execution(&self, step: StepExecution) -> WorkflowResult<()>;
    async fn get_step_execution_by_task_id(&self, task_id: &str) -> WorkflowResult<Option<StepExecution>>;
    async fn update_step_execution(&self, run_id: RunId, step_id: &str, scatter_index: &[i64], step: StepExecution) -> WorkflowResult<()>;
    async fn list_step_executions(&self, run_id: RunId) -> WorkflowResult<Vec<StepExecution>>;
    async fn reset_step_execution(&self, run_id: RunId, step_id: &str, scatter_index: &[i64]) -> WorkflowResult<()>;
    async fn get_run_progress(&self, run_id: RunId) -> WorkflowResult<RunProgress>;
}

fn step_key(step_id: &str, scatter_index: &[i64]) -> String {
    if scatter_index.is_empty() {
        step_id.to_string()
    } else {
        format!("{}/{}", step_id, scatter_index.iter().map(i64::to_string).collect::<Vec<_>>().join(","))
    }
}

/// In-memory reference implementation, useful for tests and single-process
/// deployments. Backed by `dashmap` for lock-free concurrent access.
#[derive(Default)]
pub struct InMemoryStateStore {
    workflows: DashMap<String, Document>,
    runs: DashMap<RunId, WorkflowRun>,
    steps: DashMap<(RunId, String), StepExecution>,
    task_index: DashMap<String, (RunId, String)>,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateStore for InMemoryStateStore {
    async fn save_workflow(&self, doc: &Document) -> WorkflowResult<String> {
        let hash = doc.content_hash.clone().ok_or_else(|| WorkflowError::Internal("document missing content hash".into()))?;
        self.workflows.insert(hash.clone(), doc.clone());
        Ok(hash)
    }

    async fn get_workflow(&self, hash: &str) -> WorkflowResult<Option<Document>> {
        Ok(self.workflows.get(hash).map(|r| r.clone()))
    }

    async fn create_workflow_run(&self, run: WorkflowRun) -> WorkflowResult<()> {
        self.runs.insert(run.id, run);
        Ok(())
    }

    async fn get_workflow_run(&self, id: RunId) -> WorkflowResult<Option<WorkflowRun>> {
        Ok(self.runs.get(&id).map(|r| r.clone()))
    }

    async fn list_workflow_runs(&self, filter: &RunFilter) -> WorkflowResult<Vec<WorkflowRun>> {
        Ok(self
            .runs
            .iter()
            .map(|r| r.value().clone())
            .filter(|r| filter.owner.as_ref().map(|o| o == &r.owner).unwrap_or(true))
            .filter(|r| filter.status.map(|s| s == r.status).unwrap_or(true))
            .filter(|r| filter.workflow_id.as_ref().map(|w| w == &r.workflow_id).unwrap_or(true))
            .collect())
    }

    async fn update_workflow_run_status(&self, id: RunId, status: RunStatus) -> WorkflowResult<()> {
        let mut run = self.runs.get_mut(&id).ok_or_else(|| WorkflowError::NotFound(format!("run {}", id)))?;
        if run.status.is_terminal() {
            return Err(WorkflowError::InvalidStateTransition {
                from: format!("{:?}", run.status),
                to: format!("{:?}", status),
            });
        }
        run.transition(status)
    }

    async fn update_workflow_run_error(&self, id: RunId, message: String) -> WorkflowResult<()> {
        let mut run = self.runs.get_mut(&id).ok_or_else(|| WorkflowError::NotFound(format!("run {}", id)))?;
        run.error_message = Some(message);
        Ok(())
    }

    async fn update_workflow_run_outputs(&self, id: RunId, outputs: BTreeMap<String, Value>) -> WorkflowResult<()> {
        let mut run = self.runs.get_mut(&id).ok_or_else(|| WorkflowError::NotFound(format!("run {}", id)))?;
        run.outputs = Some(outputs);
        Ok(())
    }

    async fn update_workflow_run_dag_state(
        &self,
        id: RunId,
        dag_state: BTreeMap<String, PersistedNodeState>,
    ) -> WorkflowResult<()> {
        let mut run = self.runs.get_mut(&id).ok_or_else(|| WorkflowError::NotFound(format!("run {}", id)))?;
        run.dag_state = dag_state;
        Ok(())
    }

    async fn create_step_execution(&self, step: StepExecution) -> WorkflowResult<()> {
        let key = (step.run_id, step_key(&step.step_id, &step.scatter_index));
        if let Some(task_id) = &step.task_id {
            self.task_index.insert(task_id.clone(), key.clone());
        }
        self.steps.insert(key, step);
        Ok(())
    }

    async fn get_step_execution_by_task_id(&self, task_id: &str) -> WorkflowResult<Option<StepExecution>> {
        let Some(key) = self.task_index.get(task_id).map(|r| r.clone()) else {
            return Ok(None);
        };
        Ok(self.steps.get(&key).map(|r| r.clone()))
    }

    async fn update_step_execution(&self, run_id: RunId, step_id: &str, scatter_index: &[i64], step: StepExecution) -> WorkflowResult<()> {
        let key = (run_id, step_key(step_id, scatter_index));
        if let Some(task_id) = &step.task_id {
            self.task_index.insert(task_id.clone(), key.clone());
        }
        self.steps.insert(key, step);
        Ok(())
    }

    async fn list_step_executions(&self, run_id: RunId) -> WorkflowResult<Vec<StepExecution>> {
        Ok(self
            .steps
            .iter()
            .filter(|e| e.key().0 == run_id)
            .map(|e| e.value().clone())
            .collect())
    }

    async fn reset_step_execution(&self, run_id: RunId, step_id: &str, scatter_index: &[i64]) -> WorkflowResult<()> {
        let key = (run_id, step_key(step_id, scatter_index));
        self.steps.remove(&key);
        Ok(())
    }

    async fn get_run_progress(&self, run_id: RunId) -> WorkflowResult<RunProgress> {
        let mut progress = RunProgress::default();
        for entry in self.steps.iter().filter(|e| e.key().0 == run_id) {
            progress.total += 1;
            match entry.value().status {
                crate::dag::NodeStatus::Completed => progress.completed += 1,
                crate::dag::NodeStatus::Failed => progress.failed += 1,
                crate::dag::NodeStatus::Skipped => progress.skipped += 1,
                crate::dag::NodeStatus::Running => progress.running += 1,
                _ => {}
            }
        }
        Ok(progress)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn terminal_run_status_is_sticky() {
        let store = InMemoryStateStore::new();
        let run = WorkflowRun::new("wf".into(), "owner".into(), BTreeMap::new());
        let id = run.id;
        store.create_workflow_run(run).await.unwrap();
        store.update_workflow_run_status(id, RunStatus::Running).await.unwrap();
        store.update_workflow_run_status(id, RunStatus::Completed).await.unwrap();
        let err = store.update_workflow_run_status(id, RunStatus::Failed).await.unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidStateTransition { .. }));
    }

    #[tokio::test]
    async fn workflow_lookup_by_hash_roundtrips() {
        let store = InMemoryStateStore::new();
        let doc = crate::document::parse_document(
            "cwlVersion: v1.2\nclass: CommandLineTool\nbaseCommand: [true]\ninputs: []\noutputs: []\n",
        )
        .unwrap();
        let hash = store.save_workflow(&doc).await.unwrap();
        let fetched = store.get_workflow_by_hash(&hash).await.unwrap();
        assert!(fetched.is_some());
    }
}
