//! Automation run controller.
//!
//! `AutomationRunner` drives one run of a blueprint:
//! 1. Assigns an execution id and persists a `running` record.
//! 2. Executes top-level steps in order through the [`StepExecutor`],
//!    storing each step's output in the shared context under its id.
//! 3. Halts on the first failing step unless it declares `stopOnError: false`.
//! 4. Persists the final status, duration and per-step log.
//!
//! Runs never return an error: every failure ends up in
//! [`AutomationExecutionResult::errors`].

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::json;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use db::{RunRecord, RunStatus, RunStore};
use nodes::{AgentClient, ExecutionContext};

use crate::analyzer::{AnalyzerConfig, BlueprintAnalyzer};
use crate::models::{AutomationExecutionResult, Blueprint, Step, StepResult, StepStatus};
use crate::step::{StepExecutor, remember};
use crate::EngineError;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Tuning knobs for the runner.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Upper bound on every outbound HTTP request (api_call, webhook, agent).
    pub http_timeout: Duration,
    /// Duration used by `delay` steps that do not set one.
    pub default_delay_ms: u64,
    /// Log blueprint statistics before executing.
    pub analyze_before_run: bool,
    pub analyzer: AnalyzerConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            http_timeout: Duration::from_secs(30),
            default_delay_ms: 1000,
            analyze_before_run: true,
            analyzer: AnalyzerConfig::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// AutomationRunner
// ---------------------------------------------------------------------------

/// Runs blueprints and records each run in a [`RunStore`].
///
/// Holds no per-run state, so one runner can serve many concurrent runs.
pub struct AutomationRunner {
    store: Arc<dyn RunStore>,
    steps: StepExecutor,
    analyzer: BlueprintAnalyzer,
    config: EngineConfig,
}

impl AutomationRunner {
    /// # Errors
    /// Fails only if the HTTP client cannot be built.
    pub fn new(
        store: Arc<dyn RunStore>,
        agent: Arc<dyn AgentClient>,
        config: EngineConfig,
    ) -> Result<Self, EngineError> {
        let steps = StepExecutor::new(config.http_timeout, config.default_delay_ms, agent)?;
        let analyzer = BlueprintAnalyzer::new(config.analyzer.clone());
        Ok(Self { store, steps, analyzer, config })
    }

    /// Execute `blueprint` for `automation_id`.
    ///
    /// `trigger_data` seeds the context: its top-level keys become variables
    /// and the whole payload is reachable as `trigger`.
    #[instrument(skip(self, blueprint, trigger_data), fields(execution_id = tracing::field::Empty))]
    pub async fn run(
        &self,
        automation_id: &str,
        blueprint: &Blueprint,
        trigger_data: Option<serde_json::Value>,
    ) -> AutomationExecutionResult {
        let started = Instant::now();
        let execution_id = Uuid::new_v4();
        tracing::Span::current().record("execution_id", tracing::field::display(execution_id));

        let trigger = trigger_data.unwrap_or(serde_json::Value::Null);
        let mut record = RunRecord::started(execution_id, automation_id, trigger.clone());
        let mut results = Vec::new();
        let mut log = Vec::new();
        let mut errors = Vec::new();

        match self.store.upsert(&record).await {
            Err(e) => {
                let err = EngineError::RunSetupFailed(e.to_string());
                error!("{}", err);
                errors.push(err.to_string());
            }
            Ok(()) => {
                if self.config.analyze_before_run {
                    if let Some(stats) = self.analyzer.analyze(blueprint.document()) {
                        debug!(
                            total_steps = stats.total_steps,
                            conditions = stats.conditions,
                            loops = stats.loops,
                            platforms = ?stats.platforms,
                            agents = ?stats.agents,
                            "blueprint analyzed"
                        );
                    }
                }

                info!("executing {} top-level steps", blueprint.steps.len());
                let mut ctx = ExecutionContext::new(automation_id, execution_id, trigger);
                self.execute_steps(&blueprint.steps, &mut ctx, &mut results, &mut log, &mut errors)
                    .await;
            }
        }

        let duration = started.elapsed().as_millis() as u64;
        let status = if errors.is_empty() { RunStatus::Completed } else { RunStatus::Failed };
        record.finish(status, duration as i64, json!({ "steps": log, "errors": errors }));

        if let Err(e) = self.store.upsert(&record).await {
            error!("failed to persist final run record: {}", e);
            errors.push(format!("Failed to persist run record: {e}"));
        }

        let success = errors.is_empty();
        if success {
            info!("automation '{}' run {} completed in {}ms", automation_id, execution_id, duration);
        } else {
            warn!("automation '{}' run {} failed with {} error(s)", automation_id, execution_id, errors.len());
        }

        AutomationExecutionResult { success, execution_id, duration, results, errors }
    }

    async fn execute_steps(
        &self,
        steps: &[Step],
        ctx: &mut ExecutionContext,
        results: &mut Vec<StepResult>,
        log: &mut Vec<StepResult>,
        errors: &mut Vec<String>,
    ) {
        for (index, step) in steps.iter().enumerate() {
            let label = step_label(step, index);
            let step_started = Instant::now();
            let outcome = self.steps.execute(step, ctx).await;
            let duration_ms = step_started.elapsed().as_millis() as u64;

            match outcome {
                Ok(output) => {
                    info!("step '{}' ({}) succeeded", label, step.step_type());
                    remember(ctx, step, &output);
                    let result = StepResult {
                        step_id: label,
                        step_type: step.step_type().to_owned(),
                        status: StepStatus::Succeeded,
                        output: Some(output),
                        error: None,
                        duration_ms,
                    };
                    log.push(result.clone());
                    results.push(result);
                }
                Err(err) => {
                    errors.push(format!("Step {label} failed: {err}"));
                    log.push(StepResult {
                        step_id: label.clone(),
                        step_type: step.step_type().to_owned(),
                        status: StepStatus::Failed,
                        output: None,
                        error: Some(err.to_string()),
                        duration_ms,
                    });

                    if step.halts_on_error() {
                        error!("step '{}' failed, halting run: {}", label, err);
                        break;
                    }
                    warn!("step '{}' failed, continuing (stopOnError: false): {}", label, err);
                }
            }
        }
    }
}

/// Steps without an id are labelled by their 1-based position.
fn step_label(step: &Step, index: usize) -> String {
    if step.id.is_empty() {
        format!("#{}", index + 1)
    } else {
        step.id.clone()
    }
}
