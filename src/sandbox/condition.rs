//! Condition (`when:`) evaluator: runs a step's `when` expression and
//! interprets the result with JS truthiness.

use std::time::Duration;

use super::{interpolate, ExprContext, Sandbox};
use crate::error::WorkflowResult;

/// Evaluates a step's `when:` expression, if present. A step with no `when`
/// always runs; a step whose `when` evaluates falsy is skipped by the
/// caller (the DAG runtime, not this module, performs the actual skip).
pub async fn evaluate_condition(
    sandbox: &dyn Sandbox,
    when: Option<&str>,
    ctx: &ExprContext,
    deadline: Duration,
) -> WorkflowResult<bool> {
    let Some(when) = when else { return Ok(true) };
    let value = interpolate(sandbox, when, ctx, deadline).await?;
    Ok(value.is_truthy())
}
