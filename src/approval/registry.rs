//! Registry of suspended workflows awaiting a human decision.
//!
//! Each live suspension owns a one-shot signal. Recording a decision removes
//! the entry and fires the signal under the same lock, so a suspension is
//! resolved at most once and a timed-out waiter either finds its entry (and
//! abandons it) or finds the decision already in its channel.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::oneshot;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::model::{Decision, PendingApproval};
use crate::error::RegistryError;

/// What happened to a submitted decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionOutcome {
    /// A live suspension was resolved.
    Resumed,
    /// Nothing is waiting on this workflow; stored only.
    NoPending,
    /// Targets an older suspension of the same workflow.
    Stale,
    /// Verdict does not answer the live suspension's flavor.
    InvalidVerdict,
    /// Waiter gave up between lookup and delivery.
    Expired,
}

impl DecisionOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Resumed => "resumed",
            Self::NoPending => "no_pending",
            Self::Stale => "stale",
            Self::InvalidVerdict => "invalid_verdict",
            Self::Expired => "expired",
        }
    }
}

/// Decisions kept per workflow; older ones are dropped first.
const MAX_DECISIONS_PER_WORKFLOW: usize = 16;

/// Finished workflows whose decision history is still retained.
const FINISHED_HISTORY_CAPACITY: usize = 256;

struct Slot {
    pending: PendingApproval,
    signal: oneshot::Sender<Decision>,
}

#[derive(Default)]
struct Inner {
    slots: HashMap<String, Slot>,
    /// Decisions received for workflows that have suspended at least once.
    history: HashMap<String, VecDeque<Decision>>,
    /// Finished workflows with retained history, oldest first.
    finished: VecDeque<String>,
}

#[derive(Default)]
pub struct ApprovalRegistry {
    inner: Mutex<Inner>,
}

/// A waiter's handle on its own suspension.
#[derive(Debug)]
pub struct Suspension {
    pub workflow_id: String,
    pub suspension_id: Uuid,
    rx: oneshot::Receiver<Decision>,
}

impl ApprovalRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // Every mutation is a single insert or remove; a poisoned map is still whole.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register a suspension. Fails if the workflow already has one live.
    pub fn register(&self, pending: PendingApproval) -> Result<Suspension, RegistryError> {
        let mut inner = self.lock();
        if inner.slots.contains_key(&pending.workflow_id) {
            return Err(RegistryError::AlreadySuspended {
                workflow_id: pending.workflow_id,
            });
        }

        let (tx, rx) = oneshot::channel();
        let suspension = Suspension {
            workflow_id: pending.workflow_id.clone(),
            suspension_id: pending.suspension_id,
            rx,
        };
        debug!(workflow_id = %pending.workflow_id, suspension_id = %pending.suspension_id, "Suspension registered");
        inner.history.entry(pending.workflow_id.clone()).or_default();
        inner.slots.insert(
            pending.workflow_id.clone(),
            Slot {
                pending,
                signal: tx,
            },
        );
        Ok(suspension)
    }

    /// Record a decision and, if it answers the live suspension, wake the waiter.
    ///
    /// History is kept only for workflows this registry has suspended; decisions
    /// naming unknown ids are answered and dropped.
    pub fn record_decision(&self, decision: Decision) -> DecisionOutcome {
        let mut inner = self.lock();
        let workflow_id = decision.workflow_id.clone();
        if let Some(history) = inner.history.get_mut(&workflow_id) {
            if history.len() == MAX_DECISIONS_PER_WORKFLOW {
                history.pop_front();
            }
            history.push_back(decision.clone());
        }

        let rejection = inner.slots.get(&workflow_id).map(|slot| {
            if decision
                .suspension_id
                .is_some_and(|id| id != slot.pending.suspension_id)
            {
                Some(DecisionOutcome::Stale)
            } else if !decision.verdict.is_valid_for(slot.pending.flavor()) {
                Some(DecisionOutcome::InvalidVerdict)
            } else {
                None
            }
        });

        let outcome = match rejection {
            None => DecisionOutcome::NoPending,
            Some(Some(rejected)) => rejected,
            Some(None) => match inner.slots.remove(&workflow_id) {
                Some(slot) => match slot.signal.send(decision.clone()) {
                    Ok(()) => DecisionOutcome::Resumed,
                    Err(_) => DecisionOutcome::Expired,
                },
                None => DecisionOutcome::NoPending,
            },
        };

        match outcome {
            DecisionOutcome::Resumed => {
                info!(workflow_id = %workflow_id, verdict = %decision.verdict, "Decision recorded")
            }
            other => warn!(
                workflow_id = %workflow_id,
                verdict = %decision.verdict,
                outcome = other.label(),
                "Decision did not resume a workflow"
            ),
        }
        outcome
    }

    /// Drop a suspension if it is still live. Returns false if a decision
    /// already claimed it.
    pub fn abandon(&self, workflow_id: &str, suspension_id: Uuid) -> bool {
        let mut inner = self.lock();
        let live = inner
            .slots
            .get(workflow_id)
            .is_some_and(|slot| slot.pending.suspension_id == suspension_id);
        if live {
            inner.slots.remove(workflow_id);
        }
        live
    }

    /// Snapshot of live suspensions, oldest first.
    pub fn list_pending(&self) -> Vec<PendingApproval> {
        let inner = self.lock();
        let mut pending: Vec<_> = inner.slots.values().map(|s| s.pending.clone()).collect();
        pending.sort_by_key(|p| p.created_at);
        pending
    }

    pub fn pending_count(&self) -> usize {
        self.lock().slots.len()
    }

    pub fn is_pending(&self, workflow_id: &str) -> bool {
        self.lock().slots.contains_key(workflow_id)
    }

    /// Decisions received for a workflow, in arrival order.
    pub fn decisions_for(&self, workflow_id: &str) -> Vec<Decision> {
        self.lock()
            .history
            .get(workflow_id)
            .map(|h| h.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Mark a workflow terminal. Its history stays readable (late decisions
    /// included) until `FINISHED_HISTORY_CAPACITY` newer workflows finish.
    pub fn finish(&self, workflow_id: &str) {
        let mut inner = self.lock();
        if !inner.history.contains_key(workflow_id)
            || inner.finished.iter().any(|id| id == workflow_id)
        {
            return;
        }
        inner.finished.push_back(workflow_id.to_string());
        while inner.finished.len() > FINISHED_HISTORY_CAPACITY {
            let Some(evicted) = inner.finished.pop_front() else {
                break;
            };
            if !inner.slots.contains_key(&evicted) {
                inner.history.remove(&evicted);
            }
        }
    }

    /// Workflows with retained decision history.
    pub fn history_len(&self) -> usize {
        self.lock().history.len()
    }
}

impl Suspension {
    /// Wait for a decision, up to `timeout`. `None` means timed out.
    pub async fn wait(mut self, registry: &ApprovalRegistry, timeout: Duration) -> Option<Decision> {
        match tokio::time::timeout(timeout, &mut self.rx).await {
            Ok(Ok(decision)) => Some(decision),
            Ok(Err(_)) => {
                registry.abandon(&self.workflow_id, self.suspension_id);
                None
            }
            Err(_) => {
                if registry.abandon(&self.workflow_id, self.suspension_id) {
                    None
                } else {
                    // Claimed between the deadline and the abandon.
                    self.rx.try_recv().ok()
                }
            }
        }
    }
}
