//! Approval data model: verdicts, decisions, pending approvals, and the
//! WebSocket message types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::pipeline::types::{SuspensionFlavor, SuspensionRequest};

/// A human's answer to a suspension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Approve,
    Deny,
    Edit,
    Respond,
    Ignore,
}

impl Verdict {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Approve => "approve",
            Self::Deny => "deny",
            Self::Edit => "edit",
            Self::Respond => "respond",
            Self::Ignore => "ignore",
        }
    }

    /// Whether this verdict answers a suspension of the given flavor.
    pub fn is_valid_for(&self, flavor: SuspensionFlavor) -> bool {
        match flavor {
            SuspensionFlavor::Notify => matches!(self, Self::Respond | Self::Ignore),
            SuspensionFlavor::DraftApproval => {
                matches!(self, Self::Approve | Self::Deny | Self::Edit)
            }
        }
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub workflow_id: String,
    pub verdict: Verdict,
    pub edited_content: Option<String>,
    /// Targets a specific suspension; `None` means whichever is live.
    pub suspension_id: Option<Uuid>,
    pub received_at: DateTime<Utc>,
}

impl Decision {
    pub fn new(workflow_id: impl Into<String>, verdict: Verdict) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            verdict,
            edited_content: None,
            suspension_id: None,
            received_at: Utc::now(),
        }
    }

    /// Replacement content; blank edits count as none.
    pub fn with_edit(mut self, content: impl Into<String>) -> Self {
        let content = content.into();
        self.edited_content = (!content.trim().is_empty()).then_some(content);
        self
    }

    pub fn for_suspension(mut self, suspension_id: Uuid) -> Self {
        self.suspension_id = Some(suspension_id);
        self
    }
}

/// What the UI shows for one suspended workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingApproval {
    pub workflow_id: String,
    pub suspension_id: Uuid,
    pub action_type: String,
    pub recipient: String,
    pub subject: String,
    pub body: String,
    #[serde(rename = "draft_preview")]
    pub preview: String,
    #[serde(rename = "timestamp")]
    pub created_at: DateTime<Utc>,
    /// True for notify-flavor suspensions.
    #[serde(rename = "notification_type")]
    pub notification_only: bool,
}

impl PendingApproval {
    pub fn from_request(workflow_id: &str, request: &SuspensionRequest) -> Self {
        Self {
            workflow_id: workflow_id.to_string(),
            suspension_id: Uuid::new_v4(),
            action_type: request.action_type.clone(),
            recipient: request.recipient.clone(),
            subject: request.subject.clone(),
            body: request.body.clone(),
            preview: request.preview.clone(),
            created_at: Utc::now(),
            notification_only: request.flavor == SuspensionFlavor::Notify,
        }
    }

    pub fn flavor(&self) -> SuspensionFlavor {
        if self.notification_only {
            SuspensionFlavor::Notify
        } else {
            SuspensionFlavor::DraftApproval
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailSummary {
    pub from: String,
    pub subject: String,
}

/// Server → client messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    /// Everything currently pending; sent once when a client joins.
    PendingSync { approvals: Vec<PendingApproval> },
    ApprovalRequired { data: PendingApproval },
    ProcessingStarted {
        workflow_id: String,
        email: EmailSummary,
    },
    TriageComplete {
        workflow_id: String,
        decision: String,
        reasoning: String,
    },
    DecisionRecorded {
        workflow_id: String,
        decision: Verdict,
    },
    WorkflowComplete {
        workflow_id: String,
        decision: String,
        execution_status: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        execution_result: Option<String>,
    },
    WorkflowTimeout { workflow_id: String },
    WorkflowError { workflow_id: String, error: String },
}

/// Client → server messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    HumanDecision {
        workflow_id: String,
        decision: Verdict,
        #[serde(default)]
        edited_content: Option<String>,
        #[serde(default)]
        suspension_id: Option<Uuid>,
    },
}

impl ClientMessage {
    pub fn into_decision(self) -> Decision {
        match self {
            Self::HumanDecision {
                workflow_id,
                decision,
                edited_content,
                suspension_id,
            } => {
                let mut d = Decision::new(workflow_id, decision);
                if let Some(content) = edited_content {
                    d = d.with_edit(content);
                }
                d.suspension_id = suspension_id;
                d
            }
        }
    }
}
