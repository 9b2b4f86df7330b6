//! Engine-level error types.

use thiserror::Error;

/// Errors produced while executing blueprint steps or setting up a run.
///
/// None of these escape [`crate::AutomationRunner::run`]; the runner turns
/// them into `"Step <id> failed: …"` entries.
#[derive(Debug, Error)]
pub enum EngineError {
    // ------ Step errors ------

    /// The step's `type` is not one the executor knows.
    #[error("Unknown step type: {step_type}")]
    UnknownStepType { step_type: String },

    /// A leaf node (HTTP, agent, delay) failed.
    #[error(transparent)]
    Node(#[from] nodes::NodeError),

    /// A retry block failed on every attempt.
    #[error("retry exhausted after {attempts} attempt(s): {message}")]
    RetryExhausted { attempts: u32, message: String },

    /// Both the primary and the fallback branch failed.
    #[error("fallback failed: primary: {primary}; fallback: {fallback}")]
    FallbackFailed { primary: String, fallback: String },

    /// A loop's `items` did not resolve to an array.
    #[error("loop items must resolve to an array: {0}")]
    InvalidLoopItems(String),

    // ------ Run errors ------

    /// The run could not be started (e.g. the initial record was rejected).
    #[error("Automation run setup failed: {0}")]
    RunSetupFailed(String),
}

impl EngineError {
    /// Failures that another attempt cannot fix: the blueprint itself is wrong.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            Self::UnknownStepType { .. } | Self::InvalidLoopItems(_) | Self::Node(nodes::NodeError::InvalidConfig(_))
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_errors_keep_their_message() {
        let err = EngineError::from(nodes::NodeError::Timeout { after_ms: 30_000 });
        assert_eq!(err.to_string(), "request timed out after 30000ms");
        assert!(!err.is_permanent());
    }

    #[test]
    fn blueprint_mistakes_are_permanent() {
        assert!(EngineError::UnknownStepType { step_type: "fax".into() }.is_permanent());
        assert!(EngineError::from(nodes::NodeError::InvalidConfig("bad url".into())).is_permanent());
        assert!(!EngineError::RetryExhausted { attempts: 3, message: "x".into() }.is_permanent());
    }
}
