//! Core domain models for the blueprint engine.
//!
//! A [`Blueprint`] is a tree: composite steps (conditions, retries,
//! fallbacks, loops) own nested step lists.  Every nested list is parsed
//! with the same rules as the top level, so a successfully parsed
//! blueprint is well-formed all the way down.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use uuid::Uuid;

pub use nodes::{AgentCallConfig, ApiCallConfig, DelayConfig, WebhookConfig};

/// Every `type` discriminant the executor knows how to run.
pub const STEP_TYPES: &[&str] = &[
    "api_call",
    "ai_agent_call",
    "webhook",
    "delay",
    "condition",
    "retry",
    "fallback",
    "loop",
];

// ---------------------------------------------------------------------------
// Blueprint
// ---------------------------------------------------------------------------

/// Ordered top-level steps of an automation, plus the JSON they were parsed
/// from (the structural analyzer reads the raw document).
///
/// Accepts either a bare array of steps or an object with a `steps` array;
/// `null` is an empty blueprint.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(try_from = "Value")]
pub struct Blueprint {
    pub steps: Vec<Step>,
    document: Value,
}

impl Blueprint {
    /// The JSON document this blueprint was parsed from.
    pub fn document(&self) -> &Value {
        &self.document
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

impl TryFrom<Value> for Blueprint {
    type Error = String;

    fn try_from(document: Value) -> Result<Self, Self::Error> {
        let steps = match &document {
            Value::Null => Vec::new(),
            Value::Array(items) => parse_steps(items)?,
            Value::Object(fields) => match fields.get("steps") {
                Some(Value::Array(items)) => parse_steps(items)?,
                Some(Value::Null) | None => Vec::new(),
                Some(_) => return Err("blueprint `steps` must be an array".into()),
            },
            _ => return Err("blueprint must be an array of steps or an object with `steps`".into()),
        };
        Ok(Self { steps, document })
    }
}

fn parse_steps(items: &[Value]) -> Result<Vec<Step>, String> {
    items
        .iter()
        .enumerate()
        .map(|(i, item)| Step::try_from(item.clone()).map_err(|e| format!("step #{}: {e}", i + 1)))
        .collect()
}

// ---------------------------------------------------------------------------
// Step
// ---------------------------------------------------------------------------

/// One node of the blueprint tree.
#[derive(Debug, Clone, Deserialize)]
#[serde(try_from = "Value")]
pub struct Step {
    /// Identifier used in logs, error messages and as the context variable
    /// the step's output is stored under.  May be empty.
    pub id: String,
    /// `Some(false)` lets the run continue past this step's failure.
    pub stop_on_error: Option<bool>,
    pub kind: StepKind,
}

impl Step {
    /// The `type` discriminant as written in the blueprint.
    pub fn step_type(&self) -> &str {
        match &self.kind {
            StepKind::ApiCall { .. } => "api_call",
            StepKind::AiAgentCall { .. } => "ai_agent_call",
            StepKind::Webhook { .. } => "webhook",
            StepKind::Delay { .. } => "delay",
            StepKind::Condition { .. } => "condition",
            StepKind::Retry { .. } => "retry",
            StepKind::Fallback { .. } => "fallback",
            StepKind::Loop { .. } => "loop",
            StepKind::Unknown { step_type } => step_type,
        }
    }

    /// Whether a failure of this step stops the surrounding step list.
    pub fn halts_on_error(&self) -> bool {
        self.stop_on_error != Some(false)
    }
}

impl TryFrom<Value> for Step {
    type Error = String;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        let step_type = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or("step is missing a string `type`")?
            .to_owned();

        let id = match value.get("id") {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => String::new(),
        };

        let stop_on_error = value
            .get("stopOnError")
            .or_else(|| value.get("stop_on_error"))
            .and_then(Value::as_bool);

        let kind = if STEP_TYPES.contains(&step_type.as_str()) {
            serde_json::from_value(value).map_err(|e| format!("invalid `{step_type}` step '{id}': {e}"))?
        } else {
            StepKind::Unknown { step_type }
        };

        Ok(Self { id, stop_on_error, kind })
    }
}

/// Type-specific payload of a step.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepKind {
    ApiCall { config: ApiCallConfig },
    AiAgentCall { config: AgentCallConfig },
    Webhook { config: WebhookConfig },
    Delay {
        #[serde(default)]
        config: DelayConfig,
    },
    Condition { config: ConditionConfig },
    Retry { config: RetryConfig },
    Fallback { config: FallbackConfig },
    Loop { config: LoopConfig },
    /// Parsed so the run can report it; fails when executed.
    #[serde(skip)]
    Unknown { step_type: String },
}

// ---------------------------------------------------------------------------
// Composite step configs
// ---------------------------------------------------------------------------

/// `condition`: evaluate an expression, run one of two branches.
#[derive(Debug, Clone, Deserialize)]
pub struct ConditionConfig {
    pub condition: String,
    #[serde(default, alias = "trueStep", deserialize_with = "one_or_many")]
    pub if_true: Vec<Step>,
    #[serde(default, alias = "falseStep", deserialize_with = "one_or_many")]
    pub if_false: Vec<Step>,
}

/// `retry`: run `steps` as a block, retrying the whole block on failure.
#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    #[serde(default)]
    pub steps: Vec<Step>,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Base back-off; doubles after every failed attempt.
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
}

/// `fallback`: run `primary_steps`, and `fallback_steps` if they fail.
#[derive(Debug, Clone, Deserialize)]
pub struct FallbackConfig {
    #[serde(default)]
    pub primary_steps: Vec<Step>,
    #[serde(default)]
    pub fallback_steps: Vec<Step>,
}

/// `loop`: run `steps` once per element of `items`.
#[derive(Debug, Clone, Deserialize)]
pub struct LoopConfig {
    /// A JSON array, or a string naming a context variable (dotted paths
    /// allowed) that holds one.
    pub items: Value,
    #[serde(default)]
    pub steps: Vec<Step>,
    #[serde(default = "default_item_variable")]
    pub item_variable: String,
    #[serde(default = "default_index_variable")]
    pub index_variable: String,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_ms() -> u64 {
    1000
}

fn default_item_variable() -> String {
    "item".to_owned()
}

fn default_index_variable() -> String {
    "index".to_owned()
}

fn default_max_iterations() -> usize {
    1000
}

/// A branch may be written as one step object or as a list of steps.
fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<Step>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    match Value::deserialize(deserializer)? {
        Value::Null => Ok(Vec::new()),
        Value::Array(items) => parse_steps(&items).map_err(D::Error::custom),
        single @ Value::Object(_) => Step::try_from(single).map(|s| vec![s]).map_err(D::Error::custom),
        other => Err(D::Error::custom(format!("expected a step or a list of steps, got {other}"))),
    }
}

// ---------------------------------------------------------------------------
// Run outcomes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Succeeded,
    Failed,
}

/// Outcome of one top-level step, in execution order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepResult {
    pub step_id: String,
    pub step_type: String,
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
}

/// What a caller of [`crate::AutomationRunner::run`] always gets back.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutomationExecutionResult {
    pub success: bool,
    pub execution_id: Uuid,
    /// Wall-clock duration of the run in milliseconds.
    pub duration: u64,
    /// Successful top-level steps, in order.
    pub results: Vec<StepResult>,
    /// `"Step <id> failed: <message>"` entries and run-level failures.
    pub errors: Vec<String>,
}
