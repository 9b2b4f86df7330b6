//! `ai_agent_call` support: the agent collaborator seam and its node.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, instrument};

use crate::{ExecutableNode, NodeError, traits::ExecutionContext};

/// Configuration of an `ai_agent_call` step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentCallConfig {
    pub agent_id: String,
    pub prompt: String,
}

/// What the engine hands to the agent collaborator.
#[derive(Debug, Clone, Serialize)]
pub struct AgentRequest {
    pub agent_id: String,
    pub prompt: String,
    /// Snapshot of the run's variables.
    pub context: Value,
}

/// External AI-agent endpoint.
///
/// Implementations return the agent's structured reply, or
/// [`NodeError::AgentInvocationFailed`] when the agent could not answer.
#[async_trait]
pub trait AgentClient: Send + Sync {
    async fn invoke(&self, request: AgentRequest) -> Result<Value, NodeError>;
}

/// Agent client that POSTs the request as JSON to a fixed endpoint.
///
/// The reply is the `reply` field of the response body, or the whole body
/// when that field is absent.
pub struct HttpAgentClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpAgentClient {
    pub fn new(endpoint: impl Into<String>, api_key: Option<String>, timeout: Duration) -> Result<Self, NodeError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NodeError::Request(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, endpoint: endpoint.into(), api_key })
    }
}

#[async_trait]
impl AgentClient for HttpAgentClient {
    #[instrument(skip(self, request), fields(agent_id = %request.agent_id))]
    async fn invoke(&self, request: AgentRequest) -> Result<Value, NodeError> {
        let mut builder = self.client.post(&self.endpoint).json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(|e| NodeError::AgentInvocationFailed {
            message: e.to_string(),
        })?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(NodeError::AgentInvocationFailed {
                message: format!("agent endpoint returned {status}: {detail}"),
            });
        }

        let mut body: Value = response.json().await.map_err(|e| NodeError::AgentInvocationFailed {
            message: format!("invalid agent response: {e}"),
        })?;
        debug!("agent replied");

        if let Some(reply) = body.get_mut("reply") {
            return Ok(reply.take());
        }
        Ok(body)
    }
}

/// Executes `ai_agent_call` steps through an injected [`AgentClient`].
#[derive(Clone)]
pub struct AgentNode {
    client: Arc<dyn AgentClient>,
}

impl AgentNode {
    pub fn new(client: Arc<dyn AgentClient>) -> Self {
        Self { client }
    }
}

/// Used when no agent endpoint is configured.
pub struct UnconfiguredAgent;

#[async_trait]
impl AgentClient for UnconfiguredAgent {
    async fn invoke(&self, request: AgentRequest) -> Result<Value, NodeError> {
        Err(NodeError::AgentInvocationFailed {
            message: format!("no agent endpoint configured (agent '{}')", request.agent_id),
        })
    }
}

#[async_trait]
impl ExecutableNode for AgentNode {
    type Config = AgentCallConfig;

    async fn execute(&self, config: &AgentCallConfig, ctx: &ExecutionContext) -> Result<Value, NodeError> {
        let request = AgentRequest {
            agent_id: config.agent_id.clone(),
            prompt: ctx.render(&config.prompt),
            context: ctx.to_object(),
        };
        self.client.invoke(request).await
    }
}
