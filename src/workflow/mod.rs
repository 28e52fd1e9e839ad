//! Workflow lifecycle: coordination and submission.

pub mod coordinator;
pub mod dispatcher;
pub mod model;

pub use coordinator::WorkflowCoordinator;
pub use dispatcher::{WorkflowSubmitter, spawn_dispatcher};
pub use model::{Workflow, WorkflowOutcome, WorkflowStage};
