//! The `ExecutableNode` trait and the per-run `ExecutionContext`.

use std::collections::HashMap;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde_json::{Map, Value};
use tracing::debug;
use uuid::Uuid;

use crate::NodeError;

static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_]*(?:\.[A-Za-z0-9_]+)*)\s*\}\}")
        .expect("placeholder pattern is valid")
});

/// Mutable variable bag scoped to a single automation run.
///
/// Defined here (in the nodes crate) so both the engine and individual node
/// implementations can import it without a circular dependency.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    /// Automation the run belongs to.
    pub automation_id: String,
    /// ID of the current run.
    pub execution_id: Uuid,
    /// Payload supplied by the trigger that started the run.
    pub trigger: Value,
    /// Named values visible to conditions and config templates.
    pub variables: HashMap<String, Value>,
}

impl ExecutionContext {
    /// Seed a context from the trigger payload.
    ///
    /// Top-level keys of an object payload become variables, and the whole
    /// payload is reachable as `trigger`.
    pub fn new(automation_id: impl Into<String>, execution_id: Uuid, trigger: Value) -> Self {
        let automation_id = automation_id.into();
        let mut variables = HashMap::new();

        if let Value::Object(fields) = &trigger {
            for (name, value) in fields {
                variables.insert(name.clone(), value.clone());
            }
        }
        variables.insert("trigger".to_owned(), trigger.clone());
        variables.insert("automation_id".to_owned(), Value::String(automation_id.clone()));
        variables.insert("execution_id".to_owned(), Value::String(execution_id.to_string()));

        Self { automation_id, execution_id, trigger, variables }
    }

    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.variables.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.variables.get(name)
    }

    /// Resolve a dotted path such as `order.items.0.sku`.
    pub fn lookup(&self, path: &str) -> Option<&Value> {
        resolve_path(&self.variables, path)
    }

    /// All variables as a single JSON object (used as the default webhook payload).
    pub fn to_object(&self) -> Value {
        let fields: Map<String, Value> = self
            .variables
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Value::Object(fields)
    }

    /// Replace every `{{path}}` placeholder in `template`.
    ///
    /// Strings are inserted verbatim, other values as compact JSON.
    /// Unknown paths are left untouched.
    pub fn render(&self, template: &str) -> String {
        PLACEHOLDER
            .replace_all(template, |caps: &Captures<'_>| match self.lookup(&caps[1]) {
                Some(Value::String(s)) => s.clone(),
                Some(other) => other.to_string(),
                None => {
                    debug!(path = &caps[1], "template placeholder has no matching variable");
                    caps[0].to_owned()
                }
            })
            .into_owned()
    }

    /// Render every string inside a JSON value.
    ///
    /// A string that consists of exactly one placeholder is replaced by the
    /// referenced value itself, keeping its JSON type.
    pub fn render_value(&self, value: &Value) -> Value {
        match value {
            Value::String(s) => {
                if let Some(caps) = PLACEHOLDER.captures(s) {
                    if caps[0].len() == s.len() {
                        if let Some(found) = self.lookup(&caps[1]) {
                            return found.clone();
                        }
                    }
                }
                Value::String(self.render(s))
            }
            Value::Array(items) => Value::Array(items.iter().map(|v| self.render_value(v)).collect()),
            Value::Object(fields) => Value::Object(
                fields
                    .iter()
                    .map(|(k, v)| (k.clone(), self.render_value(v)))
                    .collect(),
            ),
            other => other.clone(),
        }
    }
}

/// Look up a dotted path in a variable map.
///
/// The longest dotted prefix that names a variable wins; the remaining
/// segments navigate object keys and array indices inside its value.
pub fn resolve_path<'a>(variables: &'a HashMap<String, Value>, path: &str) -> Option<&'a Value> {
    if let Some(v) = variables.get(path) {
        return Some(v);
    }

    let segments: Vec<&str> = path.split('.').collect();
    for split in (1..segments.len()).rev() {
        let head = segments[..split].join(".");
        if let Some(root) = variables.get(&head) {
            return segments[split..].iter().try_fold(root, |current, segment| match current {
                Value::Object(fields) => fields.get(*segment),
                Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
                _ => None,
            });
        }
    }
    None
}

/// The core node trait.
///
/// Every leaf step kind (`api_call`, `webhook`, `ai_agent_call`, `delay`)
/// implements this; the engine owns the composite kinds.
#[async_trait]
pub trait ExecutableNode: Send + Sync {
    /// Typed configuration this node is driven by.
    type Config: Send + Sync;

    /// Execute the node against the current run context and return its JSON output.
    async fn execute(
        &self,
        config: &Self::Config,
        ctx: &ExecutionContext,
    ) -> Result<Value, NodeError>;
}
