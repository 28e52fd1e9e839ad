//! Workflow lifecycle types.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use crate::approval::model::{Notification, Verdict};
use crate::mailbox::WorkItem;
use crate::pipeline::types::{ExecutionResult, PipelineState};

/// Where a workflow is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStage {
    Created,
    Triage,
    Suspended,
    Resuming,
    Drafting,
    Executing,
    Completed,
}

/// Terminal result of one workflow.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkflowOutcome {
    /// No human was needed.
    AutoCompleted { result: Option<ExecutionResult> },
    /// A human approved (or edited) and the final stage ran.
    Executed {
        verdict: Verdict,
        result: ExecutionResult,
    },
    Denied,
    Ignored,
    TimedOut,
    Failed { error: String },
}

impl WorkflowOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::AutoCompleted { .. } => "auto_approved",
            Self::Executed { .. } => "executed",
            Self::Denied => "denied",
            Self::Ignored => "ignored",
            Self::TimedOut => "timed_out",
            Self::Failed { .. } => "error",
        }
    }

    /// The single outward message announcing this outcome.
    pub fn notification(&self, workflow_id: &str) -> Notification {
        let workflow_id = workflow_id.to_string();
        match self {
            Self::AutoCompleted { result } => Notification::WorkflowComplete {
                workflow_id,
                decision: "auto_approved".into(),
                execution_status: "complete".into(),
                execution_result: result.as_ref().map(|r| r.detail.clone()),
            },
            Self::Executed { verdict, result } => Notification::WorkflowComplete {
                workflow_id,
                decision: verdict.label().into(),
                execution_status: result.status.clone(),
                execution_result: Some(result.detail.clone()),
            },
            Self::Denied => Notification::WorkflowComplete {
                workflow_id,
                decision: "denied".into(),
                execution_status: "cancelled".into(),
                execution_result: None,
            },
            Self::Ignored => Notification::WorkflowComplete {
                workflow_id,
                decision: "ignored".into(),
                execution_status: "complete".into(),
                execution_result: None,
            },
            Self::TimedOut => Notification::WorkflowTimeout { workflow_id },
            Self::Failed { error } => Notification::WorkflowError {
                workflow_id,
                error: error.clone(),
            },
        }
    }
}

/// One item's journey through the pipeline.
#[derive(Debug, Clone)]
pub struct Workflow {
    pub id: String,
    pub stage: WorkflowStage,
    pub state: PipelineState,
    pub created_at: DateTime<Utc>,
}

impl Workflow {
    pub fn new(id: impl Into<String>, item: WorkItem) -> Self {
        Self {
            id: id.into(),
            stage: WorkflowStage::Created,
            state: PipelineState::new(item),
            created_at: Utc::now(),
        }
    }

    pub fn item(&self) -> &WorkItem {
        &self.state.item
    }

    pub fn advance(&mut self, next: WorkflowStage) {
        debug_assert!(
            self.stage != WorkflowStage::Completed,
            "workflow {} advanced after completion",
            self.id
        );
        debug!(workflow_id = %self.id, from = ?self.stage, to = ?next, "Workflow stage");
        self.stage = next;
    }
}
