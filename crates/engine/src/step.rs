//! Single-step execution.
//!
//! [`StepExecutor`] dispatches one [`Step`] by kind: leaf kinds go to the
//! `nodes` crate, composite kinds (condition, retry, fallback, loop) recurse
//! into their nested step lists.  It never decides whether a *run* stops;
//! that belongs to the [`crate::AutomationRunner`].

use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use serde_json::{json, Map, Value};
use tracing::{debug, debug_span, warn, Instrument};

use nodes::{
    AgentClient, AgentNode, ApiCallNode, DelayNode, ExecutableNode, ExecutionContext, HttpNode, WebhookNode,
};

use crate::EngineError;
use crate::expression::evaluate_expression;
use crate::models::{ConditionConfig, FallbackConfig, LoopConfig, RetryConfig, Step, StepKind};

/// Store a step's output in the context under the step id, so later
/// conditions and templates can reference it.
pub(crate) fn remember(ctx: &mut ExecutionContext, step: &Step, output: &Value) {
    if !step.id.is_empty() {
        ctx.set(step.id.clone(), output.clone());
    }
}

pub struct StepExecutor {
    api_call: ApiCallNode,
    webhook: WebhookNode,
    agent: AgentNode,
    delay: DelayNode,
}

impl StepExecutor {
    /// Build the leaf nodes.  Every HTTP request is bounded by `http_timeout`.
    pub fn new(
        http_timeout: Duration,
        default_delay_ms: u64,
        agent: Arc<dyn AgentClient>,
    ) -> Result<Self, EngineError> {
        let http = HttpNode::new(http_timeout)?;
        Ok(Self {
            api_call: ApiCallNode::new(http.clone()),
            webhook: WebhookNode::new(http),
            agent: AgentNode::new(agent),
            delay: DelayNode::new(default_delay_ms),
        })
    }

    /// Execute one step and return its JSON output.
    pub fn execute<'a>(
        &'a self,
        step: &'a Step,
        ctx: &'a mut ExecutionContext,
    ) -> BoxFuture<'a, Result<Value, EngineError>> {
        let span = debug_span!("step", step_id = %step.id, step_type = step.step_type());
        Box::pin(
            async move {
                match &step.kind {
                    StepKind::ApiCall { config } => Ok(self.api_call.execute(config, ctx).await?),
                    StepKind::AiAgentCall { config } => Ok(self.agent.execute(config, ctx).await?),
                    StepKind::Webhook { config } => Ok(self.webhook.execute(config, ctx).await?),
                    StepKind::Delay { config } => Ok(self.delay.execute(config, ctx).await?),
                    StepKind::Condition { config } => self.run_condition(config, ctx).await,
                    StepKind::Retry { config } => self.run_retry(config, ctx).await,
                    StepKind::Fallback { config } => self.run_fallback(config, ctx).await,
                    StepKind::Loop { config } => self.run_loop(config, ctx).await,
                    StepKind::Unknown { step_type } => Err(EngineError::UnknownStepType {
                        step_type: step_type.clone(),
                    }),
                }
            }
            .instrument(span),
        )
    }

    /// Run a nested step list in order.
    ///
    /// A failing step aborts the list unless it declares `stopOnError: false`,
    /// in which case its error takes its slot in the returned outputs.
    async fn run_steps(&self, steps: &[Step], ctx: &mut ExecutionContext) -> Result<Vec<Value>, EngineError> {
        let mut outputs = Vec::with_capacity(steps.len());
        for step in steps {
            match self.execute(step, ctx).await {
                Ok(output) => {
                    remember(ctx, step, &output);
                    outputs.push(output);
                }
                Err(err) if !step.halts_on_error() => {
                    warn!(step_id = %step.id, error = %err, "nested step failed, continuing");
                    outputs.push(json!({ "stepId": step.id, "error": err.to_string() }));
                }
                Err(err) => return Err(err),
            }
        }
        Ok(outputs)
    }

    async fn run_condition(&self, config: &ConditionConfig, ctx: &mut ExecutionContext) -> Result<Value, EngineError> {
        let outcome = evaluate_expression(&config.condition, &ctx.variables);
        debug!(condition = %config.condition, outcome, "condition evaluated");

        let branch = if outcome { &config.if_true } else { &config.if_false };
        let mut result = Map::new();

        if !branch.is_empty() {
            let mut outputs = self.run_steps(branch, ctx).await?;
            if outputs.len() == 1 {
                match outputs.remove(0) {
                    Value::Object(fields) => result.extend(fields),
                    other => {
                        result.insert("result".into(), other);
                    }
                }
            } else {
                result.insert("results".into(), Value::Array(outputs));
            }
        }

        result.insert("conditionResult".into(), Value::Bool(outcome));
        Ok(Value::Object(result))
    }

    async fn run_retry(&self, config: &RetryConfig, ctx: &mut ExecutionContext) -> Result<Value, EngineError> {
        let max_attempts = config.max_attempts.max(1);
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            match self.run_steps(&config.steps, ctx).await {
                Ok(results) => return Ok(json!({ "attempts": attempt, "results": results })),
                Err(err) if err.is_permanent() => return Err(err),
                Err(err) if attempt >= max_attempts => {
                    return Err(EngineError::RetryExhausted { attempts: attempt, message: err.to_string() });
                }
                Err(err) => {
                    let delay = Duration::from_millis(config.backoff_ms)
                        .saturating_mul(2u32.saturating_pow(attempt - 1));
                    warn!(
                        "retry block failed (attempt {}/{}), retrying in {:?}: {}",
                        attempt, max_attempts, delay, err
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    async fn run_fallback(&self, config: &FallbackConfig, ctx: &mut ExecutionContext) -> Result<Value, EngineError> {
        let primary = match self.run_steps(&config.primary_steps, ctx).await {
            Ok(results) => return Ok(json!({ "usedFallback": false, "results": results })),
            Err(err) => err,
        };

        warn!(error = %primary, "primary steps failed, running fallback steps");
        match self.run_steps(&config.fallback_steps, ctx).await {
            Ok(results) => Ok(json!({
                "usedFallback": true,
                "primaryError": primary.to_string(),
                "results": results,
            })),
            Err(fallback) => Err(EngineError::FallbackFailed {
                primary: primary.to_string(),
                fallback: fallback.to_string(),
            }),
        }
    }

    async fn run_loop(&self, config: &LoopConfig, ctx: &mut ExecutionContext) -> Result<Value, EngineError> {
        let items = match &config.items {
            Value::Array(items) => items.clone(),
            Value::String(path) => match ctx.lookup(path) {
                Some(Value::Array(items)) => items.clone(),
                Some(other) => {
                    return Err(EngineError::InvalidLoopItems(format!("'{path}' holds {other}")));
                }
                None => return Err(EngineError::InvalidLoopItems(format!("'{path}' is not defined"))),
            },
            other => return Err(EngineError::InvalidLoopItems(other.to_string())),
        };

        if items.len() > config.max_iterations {
            warn!(items = items.len(), max = config.max_iterations, "loop truncated to max_iterations");
        }

        let saved_item = ctx.get(&config.item_variable).cloned();
        let saved_index = ctx.get(&config.index_variable).cloned();

        let mut results = Vec::new();
        let mut outcome = Ok(());
        for (index, item) in items.into_iter().take(config.max_iterations).enumerate() {
            ctx.set(config.item_variable.clone(), item);
            ctx.set(config.index_variable.clone(), json!(index));
            match self.run_steps(&config.steps, ctx).await {
                Ok(outputs) => results.push(Value::Array(outputs)),
                Err(err) => {
                    outcome = Err(err);
                    break;
                }
            }
        }

        restore(ctx, &config.item_variable, saved_item);
        restore(ctx, &config.index_variable, saved_index);

        outcome.map(|()| json!({ "iterations": results.len(), "results": results }))
    }
}

fn restore(ctx: &mut ExecutionContext, name: &str, previous: Option<Value>) {
    match previous {
        Some(value) => ctx.set(name, value),
        None => {
            ctx.variables.remove(name);
        }
    }
}
