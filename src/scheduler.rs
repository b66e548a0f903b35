//! Scheduler loop (C9): the daemon process driving workflow runs from
//! `Pending` through `Running` to a terminal state, one tick at a time.
//!
//! Collaborators (Store, EventBus, Executor) are composed explicitly at
//! daemon startup with no global state, one `Arc` reference per concern.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;

use crate::dag::{self, Dag, NodeStatus};
use crate::document::{Document, ScatterMethod};
use crate::error::{WorkflowError, WorkflowResult};
use crate::events::{channels, EventBus};
use crate::executor::{Executor, TaskStatus};
use crate::run::{PersistedNodeState, RunId, RunStatus};
use crate::store::{RunFilter, StateStore, StepExecution};
use crate::value::Value;

/// Default tick interval.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(5);

pub struct SchedulerConfig {
    pub tick_interval: Duration,
    pub max_pending_per_tick: usize,
    pub max_running_per_tick: usize,
    pub max_dispatch_per_tick: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval: DEFAULT_TICK_INTERVAL,
            max_pending_per_tick: 16,
            max_running_per_tick: 64,
            max_dispatch_per_tick: 32,
        }
    }
}

/// Resolves a step's `run:` path reference to a [`Document`]. Supplied by
/// the caller at startup; typically reads from the filesystem relative to
/// the workflow's source directory.
pub type DocumentLoader = Arc<dyn Fn(&str) -> WorkflowResult<Document> + Send + Sync>;

pub struct Scheduler {
    store: Arc<dyn StateStore>,
    event_bus: Arc<dyn EventBus>,
    executor: Arc<dyn Executor>,
    loader: DocumentLoader,
    config: SchedulerConfig,
    /// Rebuilt DAG per in-flight run. Structure is never persisted; this
    /// cache exists only so a single process doesn't rebuild the graph on
    /// every tick for runs it is actively driving.
    dags: DashMap<RunId, Arc<Dag>>,
}

impl Scheduler {
    pub fn new(
        store: Arc<dyn StateStore>,
        event_bus: Arc<dyn EventBus>,
        executor: Arc<dyn Executor>,
        loader: DocumentLoader,
        config: SchedulerConfig,
    ) -> Self {
        Self { store, event_bus, executor, loader, config, dags: DashMap::new() }
    }

    /// Runs the scheduler loop until `shutdown` resolves. Returns
    /// `Ok(())` on a clean shutdown signal, mapped to exit code 0 by the
    /// caller.
    pub async fn run(&self, mut shutdown: tokio::sync::oneshot::Receiver<()>) -> WorkflowResult<()> {
        let mut interval = tokio::time::interval(self.config.tick_interval);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.tick().await {
                        tracing::warn!(error = %e, "scheduler tick failed");
                    }
                }
                _ = &mut shutdown => {
                    tracing::info!("scheduler received shutdown signal");
                    return Ok(());
                }
            }
        }
    }

    /// One scheduling pass: startup, reconciliation, dispatch, termination.
    pub async fn tick(&self) -> WorkflowResult<()> {
        let pending = self
            .store
            .list_workflow_runs(&RunFilter { status: Some(RunStatus::Pending), ..Default::default() })
            .await?;
        for run in pending.into_iter().take(self.config.max_pending_per_tick) {
            if let Err(e) = self.start_run(run.id).await {
                tracing::warn!(run_id = %run.id, error = %e, "failed to start run");
            }
        }

        let running = self
            .store
            .list_workflow_runs(&RunFilter { status: Some(RunStatus::Running), ..Default::default() })
            .await?;
        for run in running.into_iter().take(self.config.max_running_per_tick) {
            if let Err(e) = self.reconcile_run(run.id).await {
                tracing::warn!(run_id = %run.id, error = %e, "failed to reconcile run");
            }
        }

        Ok(())
    }

    /// Loads a `Pending` run's document, builds its DAG, persists the
    /// initial state, and transitions the run to `Running`.
    async fn start_run(&self, run_id: RunId) -> WorkflowResult<()> {
        let mut run = self
            .store
            .get_workflow_run(run_id)
            .await?
            .ok_or_else(|| WorkflowError::NotFound(format!("run {}", run_id)))?;

        let doc = self
            .store
            .get_workflow(&run.workflow_id)
            .await?
            .ok_or_else(|| WorkflowError::NotFound(format!("workflow {}", run.workflow_id)))?;

        let loader = self.loader.clone();
        let dag = match dag::build_dag(&doc, &run.inputs, |p| loader(p)) {
            Ok(dag) => dag,
            Err(e) => {
                run.transition(RunStatus::Failed)?;
                self.store.update_workflow_run_error(run_id, e.to_string()).await?;
                self.store.update_workflow_run_status(run_id, RunStatus::Failed).await?;
                self.event_bus
                    .publish(channels::WORKFLOW_FAILED, serde_json::json!({"run_id": run_id.to_string(), "error": e.to_string()}))
                    .await
                    .ok();
                return Err(e);
            }
        };

        for node in dag.all_nodes() {
            self.store
                .create_step_execution(StepExecution {
                    run_id,
                    step_id: node.step_id.clone(),
                    scatter_index: node.scatter_index.clone(),
                    status: node.status(),
                    task_id: None,
                    inputs: BTreeMap::new(),
                    outputs: BTreeMap::new(),
                    error: None,
                    retry_count: 0,
                    created_at: chrono::Utc::now(),
                    updated_at: chrono::Utc::now(),
                })
                .await?;
        }
        self.persist_dag_state(run_id, &dag).await?;

        run.transition(RunStatus::Running)?;
        self.store.update_workflow_run_status(run_id, RunStatus::Running).await?;
        self.event_bus
            .publish(channels::WORKFLOW_STARTED, serde_json::json!({"run_id": run_id.to_string()}))
            .await
            .ok();

        self.dags.insert(run_id, Arc::new(dag));
        self.dispatch_ready(run_id).await?;
        Ok(())
    }

    /// Rebuilds (or reuses the cached) DAG, replays persisted mutable
    /// state onto it, polls the executor for in-flight nodes, dispatches
    /// newly-ready nodes, and checks for run completion.
    async fn reconcile_run(&self, run_id: RunId) -> WorkflowResult<()> {
        let dag = self.dag_for_run(run_id).await?;
        self.poll_running_nodes(run_id, &dag).await;
        self.dispatch_ready(run_id).await?;
        self.maybe_terminate(run_id, &dag).await?;
        Ok(())
    }

    /// Returns the cached DAG for `run_id`, rebuilding from the workflow
    /// document and replaying persisted node state if this process has not
    /// seen the run before (S6: restart recovery).
    async fn dag_for_run(&self, run_id: RunId) -> WorkflowResult<Arc<Dag>> {
        if let Some(dag) = self.dags.get(&run_id) {
            return Ok(dag.clone());
        }
        let run = self
            .store
            .get_workflow_run(run_id)
            .await?
            .ok_or_else(|| WorkflowError::NotFound(format!("run {}", run_id)))?;
        let doc = self
            .store
            .get_workflow(&run.workflow_id)
            .await?
            .ok_or_else(|| WorkflowError::NotFound(format!("workflow {}", run.workflow_id)))?;
        let loader = self.loader.clone();
        let dag = dag::build_dag(&doc, &run.inputs, |p| loader(p))?;
        for (node_id, saved) in &run.dag_state {
            if let Some(node) = dag.get_node(node_id) {
                node.restore(&to_node_state(saved));
            }
        }
        let dag = Arc::new(dag);
        self.dags.insert(run_id, dag.clone());
        Ok(dag)
    }

    /// Polls executor status for every `Running` node; transient poll
    /// failures leave the node `Running` untouched rather than failing it.
    async fn poll_running_nodes(&self, run_id: RunId, dag: &Dag) {
        for node in dag.all_nodes() {
            if node.status() != NodeStatus::Running {
                continue;
            }
            let Some(task_id) = node.task_id() else { continue };
            match self.executor.get_status(&task_id).await {
                Ok(TaskStatus::Running) => {}
                Ok(TaskStatus::Completed) => {
                    if let Ok(outputs) = self.executor.get_outputs(&task_id).await {
                        node.set_outputs(outputs);
                    }
                    if let Err(e) = dag.update_node_status(&node.id, NodeStatus::Completed) {
                        tracing::warn!(node = %node.id, error = %e, "invalid completion transition");
                    }
                }
                Ok(TaskStatus::Failed) => {
                    node.set_error(format!("task {} failed", task_id));
                    if let Err(e) = dag.update_node_status(&node.id, NodeStatus::Failed) {
                        tracing::warn!(node = %node.id, error = %e, "invalid failure transition");
                    }
                }
                Err(e) => {
                    tracing::warn!(node = %node.id, error = %e, "transient executor poll failure, leaving node running");
                }
            }
        }
        let _ = self.persist_dag_state(run_id, dag).await;
    }

    /// Dispatches every node [`Dag::get_ready_nodes`] returns, up to the
    /// per-tick dispatch cap.
    async fn dispatch_ready(&self, run_id: RunId) -> WorkflowResult<()> {
        let dag = self.dag_for_run(run_id).await?;
        let run = self
            .store
            .get_workflow_run(run_id)
            .await?
            .ok_or_else(|| WorkflowError::NotFound(format!("run {}", run_id)))?;

        let ready = dag.get_ready_nodes();
        for node in ready.into_iter().take(self.config.max_dispatch_per_tick) {
            let inputs = dag::prepare_node_inputs(&dag, &node, &run.inputs)?;
            match self.executor.execute(&node, &inputs).await {
                Ok(task_id) => {
                    node.set_task_id(task_id);
                    dag.update_node_status(&node.id, NodeStatus::Running)?;
                }
                Err(e) => {
                    node.set_error(e.to_string());
                    dag.update_node_status(&node.id, NodeStatus::Failed)?;
                }
            }
        }
        self.persist_dag_state(run_id, &dag).await?;
        Ok(())
    }

    /// If the DAG is complete, collects workflow outputs (when no node
    /// failed) and transitions the run to its terminal state.
    async fn maybe_terminate(&self, run_id: RunId, dag: &Dag) -> WorkflowResult<()> {
        if !dag.is_complete() {
            return Ok(());
        }
        let mut run = self
            .store
            .get_workflow_run(run_id)
            .await?
            .ok_or_else(|| WorkflowError::NotFound(format!("run {}", run_id)))?;
        if run.status.is_terminal() {
            return Ok(());
        }

        if dag.has_failed() {
            run.transition(RunStatus::Failed)?;
            self.store.update_workflow_run_status(run_id, RunStatus::Failed).await?;
            self.event_bus
                .publish(channels::WORKFLOW_FAILED, serde_json::json!({"run_id": run_id.to_string()}))
                .await
                .ok();
        } else {
            let doc = self
                .store
                .get_workflow(&run.workflow_id)
                .await?
                .ok_or_else(|| WorkflowError::NotFound(format!("workflow {}", run.workflow_id)))?;
            let outputs = collect_output_sources(&doc, dag);
            self.store.update_workflow_run_outputs(run_id, outputs).await?;
            run.transition(RunStatus::Completed)?;
            self.store.update_workflow_run_status(run_id, RunStatus::Completed).await?;
            self.event_bus
                .publish(channels::WORKFLOW_COMPLETED, serde_json::json!({"run_id": run_id.to_string()}))
                .await
                .ok();
        }
        self.dags.remove(&run_id);
        Ok(())
    }

    /// Flips a run to `Cancelled`, kills every dispatched task, and stops
    /// further dispatch for it.
    pub async fn cancel_run(&self, run_id: RunId) -> WorkflowResult<()> {
        let mut run = self
            .store
            .get_workflow_run(run_id)
            .await?
            .ok_or_else(|| WorkflowError::NotFound(format!("run {}", run_id)))?;
        run.transition(RunStatus::Cancelled)?;
        self.store.update_workflow_run_status(run_id, RunStatus::Cancelled).await?;

        if let Some(dag) = self.dags.get(&run_id) {
            for node in dag.all_nodes() {
                if node.status() == NodeStatus::Running {
                    if let Some(task_id) = node.task_id() {
                        let _ = self.executor.cancel(&task_id).await;
                    }
                }
            }
        }
        self.dags.remove(&run_id);
        Ok(())
    }

    async fn persist_dag_state(&self, run_id: RunId, dag: &Dag) -> WorkflowResult<()> {
        let mut state = BTreeMap::new();
        for node in dag.all_nodes() {
            state.insert(
                node.id.clone(),
                PersistedNodeState {
                    step_id: node.step_id.clone(),
                    scatter_index: node.scatter_index.clone(),
                    status: node.status(),
                    task_id: node.task_id(),
                    inputs: BTreeMap::new(),
                    outputs: node.outputs(),
                    error: node.error(),
                },
            );
        }
        self.store.update_workflow_run_dag_state(run_id, state).await
    }
}

fn to_node_state(saved: &PersistedNodeState) -> crate::dag::NodeState {
    crate::dag::NodeState {
        status_override: Some(saved.status),
        task_id: saved.task_id.clone(),
        outputs: saved.outputs.clone(),
        error: saved.error.clone(),
    }
}

/// Gathers each workflow output's value from its `outputSource`. For an
/// output sourced from a scattered step, values are gathered across every
/// instance: a flat array for `dotproduct`/`flat_crossproduct`, nested
/// arrays (grouped by the outer scatter dimension) for
/// `nested_crossproduct`. Skipped or valueless positions contribute `null`.
fn collect_output_sources(doc: &Document, dag: &Dag) -> BTreeMap<String, Value> {
    let mut outputs = BTreeMap::new();
    for output in &doc.outputs {
        let Some(source) = &output.output_source else { continue };
        let (dep_step, field) = crate::analyzer::parse_source_ref(source);
        let Some(dep_step) = dep_step else { continue };

        let mut instances: Vec<_> = dag.all_nodes().into_iter().filter(|n| n.step_id == dep_step).collect();
        instances.sort_by(|a, b| a.scatter_index.cmp(&b.scatter_index));

        let value = if instances.len() == 1 {
            node_output_value(&instances[0], &field)
        } else {
            let step = doc.step(&dep_step);
            let method = step.and_then(|s| s.scatter_method).unwrap_or(ScatterMethod::Dotproduct);
            match method {
                ScatterMethod::NestedCrossproduct => gather_nested(&instances, &field),
                _ => Value::List(instances.iter().map(|n| node_output_value(n, &field)).collect()),
            }
        };
        outputs.insert(output.id.clone(), value);
    }
    outputs
}

fn node_output_value(node: &std::sync::Arc<crate::dag::Node>, field: &str) -> Value {
    match node.status() {
        NodeStatus::Skipped => Value::Null,
        _ => node.outputs().get(field).cloned().unwrap_or(Value::Null),
    }
}

/// Groups flat-enumerated instances back into nested arrays by their
/// outermost scatter index, matching `nested_crossproduct`'s gather shape.
fn gather_nested(instances: &[std::sync::Arc<crate::dag::Node>], field: &str) -> Value {
    let mut groups: BTreeMap<i64, Vec<Value>> = BTreeMap::new();
    for node in instances {
        let outer = node.scatter_index.first().copied().unwrap_or(0);
        groups.entry(outer).or_default().push(node_output_value(node, field));
    }
    Value::List(groups.into_values().map(Value::List).collect())
}
