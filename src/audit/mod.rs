//! Interaction audit trail.

pub mod libsql_store;
pub mod migrations;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DatabaseError;

pub use libsql_store::LibSqlAuditStore;

/// How a workflow ended, as recorded in the audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    /// Human approved (or edited) and the action ran.
    Executed,
    /// Human denied a draft.
    Denied,
    /// Human chose to ignore a notification.
    Ignored,
    /// No suspension was needed.
    Auto,
    /// The workflow failed.
    Error,
}

impl AuditOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Executed => "executed",
            Self::Denied => "denied",
            Self::Ignored => "ignored",
            Self::Auto => "auto",
            Self::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "executed" => Some(Self::Executed),
            "denied" => Some(Self::Denied),
            "ignored" => Some(Self::Ignored),
            "auto" => Some(Self::Auto),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionRecord {
    pub workflow_id: String,
    pub sender: String,
    pub subject: String,
    pub triage_decision: String,
    /// Action type that ran, or `"none"`.
    pub action_taken: String,
    pub human_approved: bool,
    pub outcome: AuditOutcome,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuditStats {
    pub total_interactions: i64,
    pub approve_count: i64,
    pub deny_count: i64,
    pub ignore_count: i64,
    pub auto_count: i64,
    pub error_count: i64,
}

#[async_trait]
pub trait AuditStore: Send + Sync {
    async fn record_interaction(&self, record: &InteractionRecord) -> Result<(), DatabaseError>;

    async fn stats(&self) -> Result<AuditStats, DatabaseError>;

    /// All records for one workflow, oldest first.
    async fn interactions_for(
        &self,
        workflow_id: &str,
    ) -> Result<Vec<InteractionRecord>, DatabaseError>;
}
