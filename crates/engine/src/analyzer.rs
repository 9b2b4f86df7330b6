//! Blueprint structural analysis, used to size diagrams or to log a
//! summary before executing.
//!
//! Works directly on the blueprint JSON so draft or partially-written
//! blueprints can still be measured: missing or malformed fields simply do
//! not contribute.

use std::collections::BTreeSet;

use serde::Serialize;
use serde_json::Value;

/// Where platform names and nested step lists are looked up.
///
/// Both lists are probed in order and the first hit wins, so new blueprint
/// shapes can be supported by configuration alone.
#[derive(Debug, Clone)]
pub struct AnalyzerConfig {
    /// Objects on a step that may name the platform it talks to.
    pub platform_sources: Vec<String>,
    /// Keys inside those objects that hold the platform name.
    pub platform_keys: Vec<String>,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            platform_sources: ["action", "trigger", "config"].map(String::from).to_vec(),
            platform_keys: ["integration", "platform", "service", "provider"].map(String::from).to_vec(),
        }
    }
}

/// Aggregate statistics over a blueprint tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlueprintStats {
    pub total_steps: usize,
    pub platforms: BTreeSet<String>,
    pub agents: BTreeSet<String>,
    pub conditions: usize,
    pub loops: usize,
    /// Rendering hint: one node per step, platform and agent, plus the trigger.
    pub expected_nodes: usize,
}

/// Nested step lists, per step type.
const NESTED_LISTS: &[(&str, &[&str])] = &[
    ("condition", &["if_true", "if_false", "trueStep", "falseStep"]),
    ("loop", &["steps"]),
    ("retry", &["steps"]),
    ("fallback", &["primary_steps", "fallback_steps"]),
];

#[derive(Debug, Clone, Default)]
pub struct BlueprintAnalyzer {
    config: AnalyzerConfig,
}

impl BlueprintAnalyzer {
    pub fn new(config: AnalyzerConfig) -> Self {
        Self { config }
    }

    /// Walk the blueprint depth-first.
    ///
    /// Returns `None` for a `null` document or one without any steps.
    pub fn analyze(&self, blueprint: &Value) -> Option<BlueprintStats> {
        let steps = top_level_steps(blueprint)?;
        if steps.is_empty() {
            return None;
        }

        let mut stats = BlueprintStats {
            total_steps: 0,
            platforms: BTreeSet::new(),
            agents: BTreeSet::new(),
            conditions: 0,
            loops: 0,
            expected_nodes: 0,
        };
        self.walk(steps, &mut stats);
        stats.expected_nodes = stats.total_steps + stats.platforms.len() + stats.agents.len() + 1;
        Some(stats)
    }

    fn walk(&self, steps: &[Value], stats: &mut BlueprintStats) {
        for step in steps {
            let Some(fields) = step.as_object() else {
                continue;
            };
            stats.total_steps += 1;

            if let Some(platform) = self.platform_of(step) {
                stats.platforms.insert(platform.to_owned());
            }

            let step_type = fields.get("type").and_then(Value::as_str).unwrap_or_default();
            match step_type {
                "ai_agent_call" => {
                    if let Some(agent) = field(step, "agent_id").and_then(Value::as_str) {
                        stats.agents.insert(agent.to_owned());
                    }
                }
                "condition" => stats.conditions += 1,
                "loop" => stats.loops += 1,
                _ => {}
            }

            let nested_keys = NESTED_LISTS
                .iter()
                .find(|(kind, _)| *kind == step_type)
                .map(|(_, keys)| *keys)
                .unwrap_or_default();
            for key in nested_keys {
                match field(step, key) {
                    Some(Value::Array(children)) => self.walk(children, stats),
                    Some(child @ Value::Object(_)) => self.walk(std::slice::from_ref(child), stats),
                    _ => {}
                }
            }
        }
    }

    fn platform_of<'a>(&self, step: &'a Value) -> Option<&'a str> {
        self.config.platform_sources.iter().find_map(|source| {
            let object = step.get(source)?.as_object()?;
            self.config
                .platform_keys
                .iter()
                .find_map(|key| object.get(key)?.as_str().filter(|s| !s.is_empty()))
        })
    }
}

/// Analyze with the default configuration.
pub fn analyze_blueprint(blueprint: &Value) -> Option<BlueprintStats> {
    BlueprintAnalyzer::default().analyze(blueprint)
}

fn top_level_steps(blueprint: &Value) -> Option<&[Value]> {
    match blueprint {
        Value::Array(steps) => Some(steps.as_slice()),
        Value::Object(fields) => fields.get("steps")?.as_array().map(Vec::as_slice),
        _ => None,
    }
}

/// A field on the step itself, falling back to the step's `config`.
fn field<'a>(step: &'a Value, key: &str) -> Option<&'a Value> {
    step.get(key).or_else(|| step.get("config")?.get(key))
}
