//! In-process isolation mode: an embedded `rquickjs` runtime guarded by a
//! watchdog deadline.
//!
//! Grounded on a sibling example's JS engine manager, which kept one
//! `rquickjs::Runtime`/`Context` pair alive and ran `eval` calls through it
//! rather than spinning up a fresh interpreter per call; here the context
//! is rebuilt per evaluation instead, since each call carries its own
//! `inputs`/`self`/`runtime` bindings and correctness (the timeout firing
//! even on an infinite loop) matters more than interpreter reuse.

use async_trait::async_trait;
use std::time::Duration;

use super::{ExprContext, Sandbox};
use crate::error::{WorkflowError, WorkflowResult};
use crate::value::Value;

pub struct InProcessSandbox;

impl InProcessSandbox {
    pub fn new() -> Self {
        Self
    }
}

impl Default for InProcessSandbox {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Sandbox for InProcessSandbox {
    async fn evaluate(&self, expr: &str, ctx: &ExprContext, deadline: Duration) -> WorkflowResult<Value> {
        let expr = expr.to_string();
        let context_json = ctx.to_json_context();

        let handle = tokio::task::spawn_blocking(move || run_in_quickjs(&expr, &context_json));

        match tokio::time::timeout(deadline, handle).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) => Err(WorkflowError::ExprWorkerCrashed(join_err.to_string())),
            Err(_elapsed) => Err(WorkflowError::ExprTimeout),
        }
    }
}

/// Runs `expr` to completion inside a fresh QuickJS runtime with `inputs`,
/// `self`, and `runtime` bound as globals. This call is expected to be
/// wrapped in a timeout by the caller — QuickJS has no built-in
/// instruction-count budget here, so an infinite loop blocks the blocking
/// thread until the runtime is dropped by the timeout path.
fn run_in_quickjs(expr: &str, context_json: &serde_json::Value) -> WorkflowResult<Value> {
    let runtime = rquickjs::Runtime::new()
        .map_err(|e| WorkflowError::ExprWorkerCrashed(format!("failed to start quickjs runtime: {}", e)))?;
    let context = rquickjs::Context::full(&runtime)
        .map_err(|e| WorkflowError::ExprWorkerCrashed(format!("failed to start quickjs context: {}", e)))?;

    context.with(|ctx| -> WorkflowResult<Value> {
        bind_context(&ctx, context_json)?;
        let result: rquickjs::Result<rquickjs::Value> = ctx.eval(expr.as_bytes());
        match result {
            Ok(value) => js_value_to_value(&ctx, value),
            Err(e) => Err(WorkflowError::ExprEvalError(e.to_string())),
        }
    })
}

fn bind_context(ctx: &rquickjs::Ctx<'_>, context_json: &serde_json::Value) -> WorkflowResult<()> {
    let globals = ctx.globals();
    for key in ["inputs", "self", "runtime"] {
        let value = context_json.get(key).cloned().unwrap_or(serde_json::Value::Null);
        let js_value = json_to_js(ctx, &value)?;
        globals
            .set(key, js_value)
            .map_err(|e| WorkflowError::ExprWorkerCrashed(e.to_string()))?;
    }
    Ok(())
}

fn json_to_js<'js>(ctx: &rquickjs::Ctx<'js>, value: &serde_json::Value) -> WorkflowResult<rquickjs::Value<'js>> {
    let text = serde_json::to_string(value)?;
    let wrapped = format!("({})", text);
    ctx.eval(wrapped.as_bytes())
        .map_err(|e| WorkflowError::ExprWorkerCrashed(e.to_string()))
}

fn js_value_to_value<'js>(ctx: &rquickjs::Ctx<'js>, value: rquickjs::Value<'js>) -> WorkflowResult<Value> {
    let json_mod: rquickjs::Object = ctx
        .globals()
        .get("JSON")
        .map_err(|e| WorkflowError::ExprWorkerCrashed(e.to_string()))?;
    let stringify: rquickjs::Function = json_mod
        .get("stringify")
        .map_err(|e| WorkflowError::ExprWorkerCrashed(e.to_string()))?;
    let serialized: rquickjs::Result<rquickjs::Value> = stringify.call((value,));
    match serialized {
        Ok(v) if v.is_undefined() => Ok(Value::Null),
        Ok(v) => {
            let s: String = v
                .get()
                .map_err(|e| WorkflowError::ExprWorkerCrashed(e.to_string()))?;
            let json: serde_json::Value = serde_json::from_str(&s)?;
            Ok(Value::from_json(json))
        }
        Err(e) => Err(WorkflowError::ExprWorkerCrashed(e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn ctx_with_file(path: &str) -> ExprContext {
        let mut file = BTreeMap::new();
        file.insert("class".to_string(), Value::Str("File".into()));
        file.insert("path".to_string(), Value::Str(path.into()));
        let mut inputs = BTreeMap::new();
        inputs.insert("file".to_string(), Value::Map(file));
        ExprContext { inputs, self_value: Value::Null, runtime: BTreeMap::new() }
    }

    #[tokio::test]
    async fn evaluates_arithmetic_expression() {
        let mut inputs = BTreeMap::new();
        inputs.insert("a".to_string(), Value::Num(10.0));
        inputs.insert("b".to_string(), Value::Num(20.0));
        let ctx = ExprContext { inputs, self_value: Value::Null, runtime: BTreeMap::new() };

        let sandbox = InProcessSandbox::new();
        let result = sandbox
            .evaluate("inputs.a + inputs.b", &ctx, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(result.as_f64(), Some(30.0));
    }

    #[tokio::test]
    async fn infinite_loop_times_out() {
        let ctx = ExprContext::default();
        let sandbox = InProcessSandbox::new();
        let result = sandbox.evaluate("while(true){}", &ctx, Duration::from_millis(50)).await;
        assert!(matches!(result, Err(WorkflowError::ExprTimeout)));
    }

    #[tokio::test]
    async fn file_path_accessible_from_inputs() {
        let ctx = ctx_with_file("/a/b.fa");
        let sandbox = InProcessSandbox::new();
        let result = sandbox
            .evaluate("inputs.file.path", &ctx, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(result.as_str(), Some("/a/b.fa"));
    }
}
