//! Error types for the inbox coordinator.

use crate::pipeline::types::Stage;

/// Errors that end a workflow.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Audit store errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Migration failed: {0}")]
    Migration(String),
}

/// Failures talking to the mailbox collaborator.
///
/// Never fatal to the poller loop: a failed listing counts as a cycle
/// error, a failed fetch skips one item, a failed mark-read is logged.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Failed to connect to {host}: {reason}")]
    Connect { host: String, reason: String },

    #[error("Mailbox authentication failed for {user}")]
    Auth { user: String },

    #[error("Mailbox protocol error: {0}")]
    Protocol(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Mailbox task failed: {0}")]
    Task(String),
}

/// A fetched item that could not be turned into a `WorkItem`.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("Item {id} is not a parseable message")]
    Unparseable { id: String },

    #[error("Item {id} is missing {field}")]
    MissingField { id: String, field: &'static str },
}

/// Pipeline stage failures. Terminal for the owning workflow only.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Stage {stage} failed: {reason}")]
    StageFailed { stage: Stage, reason: String },

    #[error("Stage {stage} produced no {field}")]
    MissingOutput { stage: Stage, field: &'static str },

    #[error("Stage {stage} panicked: {reason}")]
    Panicked { stage: Stage, reason: String },

    #[error("Blocking worker pool is closed")]
    WorkerPoolClosed,

    #[error("Delivery failed: {0}")]
    Delivery(String),
}

/// Approval registry invariant violations.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Workflow {workflow_id} already has an outstanding suspension")]
    AlreadySuspended { workflow_id: String },
}

/// Errors from the workflow submission surface.
#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error("Workflow dispatcher is no longer accepting submissions")]
    DispatcherClosed,
}
