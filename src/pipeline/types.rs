//! Pipeline contract: stages, the accumulating state, and the stage trait.

use serde::{Deserialize, Serialize};

use crate::approval::model::Verdict;
use crate::error::PipelineError;
use crate::mailbox::WorkItem;

/// Pipeline stages the coordinator can invoke.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Classify the item; may request a suspension.
    Triage,
    /// Compose a draft action only.
    Draft,
    /// Carry out the (approved) pending action.
    Execute,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Triage => write!(f, "triage"),
            Self::Draft => write!(f, "draft"),
            Self::Execute => write!(f, "execute"),
        }
    }
}

/// Triage classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriageDecision {
    /// Noise; nothing to show or do.
    Ignore,
    /// Show it to a human, who may choose to respond.
    NotifyHuman,
    /// Needs a reply; a draft is produced for approval.
    Respond,
}

impl TriageDecision {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Ignore => "ignore",
            Self::NotifyHuman => "notify_human",
            Self::Respond => "respond",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriageOutcome {
    pub decision: TriageDecision,
    pub reasoning: String,
}

/// A concrete action the pipeline wants to take (e.g. send an email).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingAction {
    pub action_type: String,
    pub recipient: String,
    pub subject: String,
    pub body: String,
}

/// Which suspension pattern a request asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuspensionFlavor {
    /// Show content; human answers respond / ignore.
    Notify,
    /// Show a produced artifact; human answers approve / deny / edit.
    DraftApproval,
}

/// A pipeline's request to pause for a human decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuspensionRequest {
    pub flavor: SuspensionFlavor,
    pub action_type: String,
    pub recipient: String,
    pub subject: String,
    pub body: String,
    pub preview: String,
}

impl SuspensionRequest {
    /// Notify flavor for an inbound item, previewing at most `preview_chars` of the body.
    pub fn notification(item: &WorkItem, preview_chars: usize) -> Self {
        let excerpt: String = item.body.chars().take(preview_chars).collect();
        Self {
            flavor: SuspensionFlavor::Notify,
            action_type: "notify_human".to_string(),
            recipient: item.sender.clone(),
            subject: item.subject.clone(),
            body: item.body.clone(),
            preview: format!(
                "From: {}\nSubject: {}\n\n{}...",
                item.sender, item.subject, excerpt
            ),
        }
    }

    /// Draft-approval flavor for a produced action.
    pub fn draft_approval(action: &PendingAction) -> Self {
        Self {
            flavor: SuspensionFlavor::DraftApproval,
            action_type: action.action_type.clone(),
            recipient: action.recipient.clone(),
            subject: action.subject.clone(),
            body: action.body.clone(),
            preview: action.body.clone(),
        }
    }

    /// The action this request describes.
    pub fn to_action(&self) -> PendingAction {
        PendingAction {
            action_type: self.action_type.clone(),
            recipient: self.recipient.clone(),
            subject: self.subject.clone(),
            body: self.body.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Short status, e.g. "sent", "dry_run", "complete".
    pub status: String,
    pub detail: String,
}

/// Accumulating state passed through the stages of one workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineState {
    pub item: WorkItem,
    pub triage: Option<TriageOutcome>,
    pub draft_action: Option<PendingAction>,
    pub suspension_request: Option<SuspensionRequest>,
    pub human_verdict: Option<Verdict>,
    pub execution: Option<ExecutionResult>,
}

impl PipelineState {
    pub fn new(item: WorkItem) -> Self {
        Self {
            item,
            triage: None,
            draft_action: None,
            suspension_request: None,
            human_verdict: None,
            execution: None,
        }
    }
}

/// The opaque decision pipeline.
///
/// Stages are synchronous and may be slow; they are only ever called from
/// the blocking pool via `PipelineInvoker`.
pub trait Pipeline: Send + Sync + 'static {
    fn run_stage(&self, stage: Stage, state: PipelineState) -> Result<PipelineState, PipelineError>;
}
