//! `delay` node: cooperative wall-clock pause.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::{ExecutableNode, NodeError, traits::ExecutionContext};

/// Configuration of a `delay` step.  `duration` is in milliseconds.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DelayConfig {
    #[serde(default)]
    pub duration: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct DelayNode {
    default_duration_ms: u64,
}

impl DelayNode {
    pub fn new(default_duration_ms: u64) -> Self {
        Self { default_duration_ms }
    }
}

impl Default for DelayNode {
    fn default() -> Self {
        Self::new(1000)
    }
}

#[async_trait]
impl ExecutableNode for DelayNode {
    type Config = DelayConfig;

    async fn execute(&self, config: &DelayConfig, _ctx: &ExecutionContext) -> Result<Value, NodeError> {
        let duration = config.duration.unwrap_or(self.default_duration_ms);
        tokio::time::sleep(Duration::from_millis(duration)).await;
        Ok(json!({ "delayed": duration }))
    }
}
