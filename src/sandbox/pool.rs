//! Worker-pool isolation mode: a bounded pool of pre-forked worker
//! processes, each one evaluating expressions read as line-delimited JSON
//! requests on stdin and written as line-delimited JSON responses on
//! stdout. Process crashes are isolated to a single worker instead of
//! taking the scheduler down.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, Mutex};

use super::{ExprContext, Sandbox};
use crate::error::{WorkflowError, WorkflowResult};
use crate::value::Value;

#[derive(Debug, Serialize)]
struct EvalRequest<'a> {
    expr: &'a str,
    context: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct EvalResponse {
    #[serde(default)]
    result: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<String>,
}

struct Worker {
    child: Child,
    stdin: tokio::process::ChildStdin,
    stdout: BufReader<tokio::process::ChildStdout>,
}

impl Worker {
    async fn spawn(worker_command: &[String]) -> WorkflowResult<Self> {
        let (cmd, args) = worker_command
            .split_first()
            .ok_or_else(|| WorkflowError::Internal("empty worker command".into()))?;
        let mut child = Command::new(cmd)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| WorkflowError::ExprWorkerCrashed(e.to_string()))?;
        let stdin = child.stdin.take().ok_or_else(|| WorkflowError::Internal("no stdin".into()))?;
        let stdout = BufReader::new(child.stdout.take().ok_or_else(|| WorkflowError::Internal("no stdout".into()))?);
        Ok(Self { child, stdin, stdout })
    }

    async fn evaluate(&mut self, expr: &str, context: serde_json::Value) -> WorkflowResult<Value> {
        let request = EvalRequest { expr, context };
        let mut line = serde_json::to_string(&request)?;
        line.push('\n');
        self.stdin
            .write_all(line.as_bytes())
            .await
            .map_err(|e| WorkflowError::ExprWorkerCrashed(e.to_string()))?;

        let mut response_line = String::new();
        let n = self
            .stdout
            .read_line(&mut response_line)
            .await
            .map_err(|e| WorkflowError::ExprWorkerCrashed(e.to_string()))?;
        if n == 0 {
            return Err(WorkflowError::ExprWorkerCrashed("worker closed stdout".into()));
        }
        let response: EvalResponse = serde_json::from_str(&response_line)
            .map_err(|e| WorkflowError::ExprWorkerCrashed(format!("malformed worker response: {}", e)))?;
        match response.error {
            Some(err) => Err(WorkflowError::ExprEvalError(err)),
            None => Ok(Value::from_json(response.result.unwrap_or(serde_json::Value::Null))),
        }
    }

    async fn kill(&mut self) {
        let _ = self.child.kill().await;
    }
}

/// A bounded pool of pre-forked workers. `checkout`/`checkin` model the
/// pool as an mpsc channel of idle workers rather than a manual semaphore.
pub struct WorkerPool {
    worker_command: Vec<String>,
    idle: Mutex<mpsc::Receiver<Worker>>,
    sender: mpsc::Sender<Worker>,
}

impl WorkerPool {
    pub async fn start(worker_command: Vec<String>, size: usize) -> WorkflowResult<Self> {
        let (sender, receiver) = mpsc::channel(size);
        for _ in 0..size {
            let worker = Worker::spawn(&worker_command).await?;
            sender
                .send(worker)
                .await
                .map_err(|_| WorkflowError::Internal("pool channel closed during startup".into()))?;
        }
        Ok(Self { worker_command, idle: Mutex::new(receiver), sender })
    }

    async fn checkout(&self, wait: Duration) -> WorkflowResult<Worker> {
        let mut idle = self.idle.lock().await;
        match tokio::time::timeout(wait, idle.recv()).await {
            Ok(Some(worker)) => Ok(worker),
            Ok(None) => Err(WorkflowError::Internal("pool closed".into())),
            Err(_) => Err(WorkflowError::PoolExhausted),
        }
    }

    async fn checkin(&self, worker: Worker) {
        let _ = self.sender.send(worker).await;
    }

    async fn replace_crashed(&self) -> WorkflowResult<()> {
        let worker = Worker::spawn(&self.worker_command).await?;
        self.sender
            .send(worker)
            .await
            .map_err(|_| WorkflowError::Internal("pool channel closed".into()))
    }
}

#[async_trait]
impl Sandbox for WorkerPool {
    async fn evaluate(&self, expr: &str, ctx: &ExprContext, deadline: Duration) -> WorkflowResult<Value> {
        let mut worker = self.checkout(deadline).await?;
        let context_json = ctx.to_json_context();
        let result = tokio::time::timeout(deadline, worker.evaluate(expr, context_json)).await;
        match result {
            Ok(Ok(value)) => {
                self.checkin(worker).await;
                Ok(value)
            }
            Ok(Err(err)) => {
                worker.kill().await;
                self.replace_crashed().await?;
                Err(err)
            }
            Err(_elapsed) => {
                worker.kill().await;
                self.replace_crashed().await?;
                Err(WorkflowError::ExprTimeout)
            }
        }
    }
}
