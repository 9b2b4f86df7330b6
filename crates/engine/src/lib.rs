//! `engine` crate: blueprint models, the condition evaluator, structural
//! analysis, and the step/run execution engine.

pub mod models;
pub mod error;
pub mod expression;
pub mod analyzer;
pub mod step;
pub mod executor;

pub use models::{AutomationExecutionResult, Blueprint, Step, StepKind, StepResult, StepStatus};
pub use error::EngineError;
pub use expression::evaluate_expression;
pub use analyzer::{analyze_blueprint, AnalyzerConfig, BlueprintAnalyzer, BlueprintStats};
pub use step::StepExecutor;
pub use executor::{AutomationRunner, EngineConfig};

#[cfg(test)]
mod executor_tests;
