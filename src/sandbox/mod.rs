//! Expression sandbox (C3): evaluates CWL `$(...)`/`${...}` JavaScript
//! expressions against an execution context, under one of three isolation
//! modes, plus the glob / secondary-file / condition evaluators built on
//! top of it.

pub mod condition;
pub mod container;
pub mod glob;
pub mod inprocess;
pub mod pool;
pub mod secondary;

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::time::Duration;

use crate::error::WorkflowResult;
use crate::value::Value;

/// The context an expression is evaluated against: `inputs`, `self`,
/// `runtime`, as CWL defines them.
#[derive(Debug, Clone, Default)]
pub struct ExprContext {
    pub inputs: BTreeMap<String, Value>,
    pub self_value: Value,
    pub runtime: BTreeMap<String, Value>,
}

impl ExprContext {
    pub fn to_json_context(&self) -> serde_json::Value {
        serde_json::json!({
            "inputs": Value::Map(self.inputs.clone()).to_json(),
            "self": self.self_value.to_json(),
            "runtime": Value::Map(self.runtime.clone()).to_json(),
        })
    }
}

/// Isolation mode an expression is evaluated under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolationMode {
    /// Embedded JS engine in the scheduler process, guarded by a watchdog
    /// deadline.
    InProcess,
    /// Pre-forked worker processes communicating over line-delimited JSON.
    WorkerPool,
    /// One container invocation per evaluation.
    ContainerPerCall,
}

/// The expression sandbox contract: evaluate a CWL expression string
/// against a context, subject to a deadline.
#[async_trait]
pub trait Sandbox: Send + Sync {
    async fn evaluate(&self, expr: &str, ctx: &ExprContext, deadline: Duration) -> WorkflowResult<Value>;
}

/// Strips CWL's `$(...)`/`${...}` expression delimiters. Returns `None` for
/// plain strings with no expression syntax (the caller should treat the
/// original string as a literal in that case) and `Some((body, is_function))`
/// otherwise, where `is_function` distinguishes `${ ... }` (a function body,
/// evaluated with an implicit `return`) from `$( ... )` (a single
/// expression).
pub fn extract_expression(s: &str) -> Option<(&str, bool)> {
    let s = s.trim();
    if let Some(inner) = s.strip_prefix("$(").and_then(|r| r.strip_suffix(')')) {
        return Some((inner, false));
    }
    if let Some(inner) = s.strip_prefix("${").and_then(|r| r.strip_suffix('}')) {
        return Some((inner, true));
    }
    None
}

/// Evaluates every `$(...)`/`${...}` expression embedded in a possibly
/// larger string (CWL allows expression interpolation inside literal text)
/// and substitutes the stringified result back in. A whole-string match
/// (the entire value is one expression) returns the raw [`Value`] rather
/// than stringifying it, preserving non-string results (numbers, objects).
pub async fn interpolate(sandbox: &dyn Sandbox, template: &str, ctx: &ExprContext, deadline: Duration) -> WorkflowResult<Value> {
    if let Some((body, is_function)) = extract_expression(template) {
        return evaluate_body(sandbox, body, is_function, ctx, deadline).await;
    }
    Ok(Value::Str(template.to_string()))
}

async fn evaluate_body(
    sandbox: &dyn Sandbox,
    body: &str,
    is_function: bool,
    ctx: &ExprContext,
    deadline: Duration,
) -> WorkflowResult<Value> {
    let expr = if is_function {
        format!("(function() {{ {} }})()", body)
    } else {
        body.to_string()
    };
    sandbox.evaluate(&expr, ctx, deadline).await
}

pub use condition::evaluate_condition;
pub use secondary::resolve_secondary_file;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_dollar_paren_expression() {
        assert_eq!(extract_expression("$(inputs.file.nameroot)"), Some(("inputs.file.nameroot", false)));
    }

    #[test]
    fn extracts_dollar_brace_function_body() {
        assert_eq!(
            extract_expression("${return inputs.a + inputs.b}"),
            Some(("return inputs.a + inputs.b", true))
        );
    }

    #[test]
    fn plain_string_has_no_expression() {
        assert_eq!(extract_expression("just text"), None);
    }
}
