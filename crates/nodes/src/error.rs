//! Node-level error type.

use thiserror::Error;

/// Errors returned by a leaf node's `execute` method.
///
/// The engine decides what a failure means for the run; nodes only report
/// what went wrong.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum NodeError {
    /// An `api_call` endpoint answered with a non-2xx status.
    #[error("API call failed: {status} {status_text}")]
    ApiCallFailed { status: u16, status_text: String },

    /// The agent collaborator rejected or failed the invocation.
    #[error("AI agent invocation failed: {message}")]
    AgentInvocationFailed { message: String },

    /// Transport-level failure (DNS, connection refused, TLS, bad body …).
    #[error("request failed: {0}")]
    Request(String),

    /// The request did not complete within the configured timeout.
    #[error("request timed out after {after_ms}ms")]
    Timeout { after_ms: u64 },

    /// The step configuration could not be turned into a request.
    #[error("invalid step configuration: {0}")]
    InvalidConfig(String),
}
