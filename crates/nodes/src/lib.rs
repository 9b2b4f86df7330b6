//! `nodes` crate: the `ExecutableNode` trait and the leaf step handlers.
//!
//! Every leaf step kind (`api_call`, `webhook`, `ai_agent_call`, `delay`)
//! implements [`ExecutableNode`].  Composite kinds (conditions, retries,
//! fallbacks, loops) live in the engine crate and dispatch down to these.

pub mod agent;
pub mod delay;
pub mod error;
pub mod http;
pub mod mock;
pub mod traits;

pub use agent::{AgentCallConfig, AgentClient, AgentNode, AgentRequest, HttpAgentClient, UnconfiguredAgent};
pub use delay::{DelayConfig, DelayNode};
pub use error::NodeError;
pub use http::{ApiCallConfig, ApiCallNode, HttpNode, WebhookConfig, WebhookNode};
pub use traits::{ExecutableNode, ExecutionContext};
