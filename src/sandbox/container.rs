//! Container-per-call isolation mode: spawns a fresh container for every
//! expression evaluation. Highest isolation, highest per-call latency;
//! intended for untrusted workflow documents where worker-pool reuse is
//! not an acceptable risk.

use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use super::{ExprContext, Sandbox};
use crate::error::{WorkflowError, WorkflowResult};
use crate::value::Value;

/// Runs `runtime run --rm -i <image> <eval-entrypoint>`, feeding the
/// expression and context as a JSON line on stdin and reading a single JSON
/// line of response from stdout. `runtime` is typically `docker` or
/// `apptainer`, matching whichever `DockerRequirement`/`ApptainerRequirement`
/// named the image.
pub struct ContainerSandbox {
    pub runtime_binary: String,
    pub image: String,
    pub entrypoint: Vec<String>,
}

impl ContainerSandbox {
    pub fn new(runtime_binary: impl Into<String>, image: impl Into<String>, entrypoint: Vec<String>) -> Self {
        Self { runtime_binary: runtime_binary.into(), image: image.into(), entrypoint }
    }
}

#[async_trait]
impl Sandbox for ContainerSandbox {
    async fn evaluate(&self, expr: &str, ctx: &ExprContext, deadline: Duration) -> WorkflowResult<Value> {
        let request = serde_json::json!({ "expr": expr, "context": ctx.to_json_context() });
        let mut line = serde_json::to_string(&request)?;
        line.push('\n');

        let mut args = vec!["run".to_string(), "--rm".to_string(), "-i".to_string(), self.image.clone()];
        args.extend(self.entrypoint.clone());

        let mut child = Command::new(&self.runtime_binary)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| WorkflowError::ExprWorkerCrashed(e.to_string()))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(line.as_bytes())
                .await
                .map_err(|e| WorkflowError::ExprWorkerCrashed(e.to_string()))?;
        }

        let output = match tokio::time::timeout(deadline, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Err(WorkflowError::ExprWorkerCrashed(e.to_string())),
            Err(_elapsed) => return Err(WorkflowError::ExprTimeout),
        };

        if !output.status.success() {
            return Err(WorkflowError::ExprWorkerCrashed(format!(
                "container exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr)
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let response: serde_json::Value = serde_json::from_str(stdout.trim())
            .map_err(|e| WorkflowError::ExprWorkerCrashed(format!("malformed container response: {}", e)))?;
        if let Some(err) = response.get("error").and_then(|v| v.as_str()) {
            return Err(WorkflowError::ExprEvalError(err.to_string()));
        }
        Ok(Value::from_json(response.get("result").cloned().unwrap_or(serde_json::Value::Null)))
    }
}
