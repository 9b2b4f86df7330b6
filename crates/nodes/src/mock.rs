//! `MockAgent`: a test double for [`AgentClient`].
//!
//! Useful in unit and integration tests where a real agent endpoint is
//! either unavailable or irrelevant.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;

use crate::NodeError;
use crate::agent::{AgentClient, AgentRequest};

/// Behaviour injected into `MockAgent` at construction time.
#[derive(Debug, Clone)]
pub enum MockBehaviour {
    /// Reply with a specific JSON value.
    Reply(Value),
    /// Fail with `AgentInvocationFailed`.
    Fail(String),
    /// Fail the first `failures` calls, then reply.
    FlakyThenReply { failures: usize, reply: Value },
}

/// A mock agent that records every request it receives and answers with a
/// programmer-specified result, optionally varying per `agent_id`.
pub struct MockAgent {
    default: MockBehaviour,
    per_agent: HashMap<String, MockBehaviour>,
    /// All requests seen (in call order).
    pub calls: Arc<Mutex<Vec<AgentRequest>>>,
}

impl MockAgent {
    pub fn new(default: MockBehaviour) -> Self {
        Self {
            default,
            per_agent: HashMap::new(),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Create a mock that always replies with the given value.
    pub fn replying(value: Value) -> Self {
        Self::new(MockBehaviour::Reply(value))
    }

    /// Create a mock that always fails.
    pub fn failing(msg: impl Into<String>) -> Self {
        Self::new(MockBehaviour::Fail(msg.into()))
    }

    /// Override the behaviour for one agent id.
    pub fn with_agent(mut self, agent_id: impl Into<String>, behaviour: MockBehaviour) -> Self {
        self.per_agent.insert(agent_id.into(), behaviour);
        self
    }

    /// Number of times the agent has been invoked.
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Number of invocations addressed to `agent_id`.
    pub fn calls_for(&self, agent_id: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|r| r.agent_id == agent_id).count()
    }

    pub fn requests(&self) -> Vec<AgentRequest> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl AgentClient for MockAgent {
    async fn invoke(&self, request: AgentRequest) -> Result<Value, NodeError> {
        let previous = self.calls_for(&request.agent_id);
        let behaviour = self.per_agent.get(&request.agent_id).unwrap_or(&self.default).clone();
        self.calls.lock().unwrap().push(request);

        match behaviour {
            MockBehaviour::Reply(v) => Ok(v),
            MockBehaviour::Fail(message) => Err(NodeError::AgentInvocationFailed { message }),
            MockBehaviour::FlakyThenReply { failures, reply } => {
                if previous < failures {
                    Err(NodeError::AgentInvocationFailed {
                        message: format!("transient failure #{}", previous + 1),
                    })
                } else {
                    Ok(reply)
                }
            }
        }
    }
}
