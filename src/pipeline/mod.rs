//! The decision pipeline and its blocking-pool invoker.
//!
//! A pipeline runs in three stages: triage, an optional draft, and execute.
//! Stages are plain synchronous calls; `PipelineInvoker` keeps them off the
//! async workers.

pub mod invoker;
pub mod rules;
pub mod types;

pub use invoker::PipelineInvoker;
pub use rules::RulesPipeline;
pub use types::{
    ExecutionResult, PendingAction, Pipeline, PipelineState, Stage, SuspensionFlavor,
    SuspensionRequest, TriageDecision, TriageOutcome,
};
