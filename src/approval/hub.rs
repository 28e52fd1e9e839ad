//! Fan-out of workflow events to connected decision-makers, and intake of
//! their decisions.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::model::{ClientMessage, Decision, Notification};
use super::registry::{ApprovalRegistry, DecisionOutcome};

/// Notifications buffered per client. A client this far behind is dropped.
pub const CONNECTION_BUFFER: usize = 256;

/// One connected client's feed.
pub struct Subscription {
    pub id: Uuid,
    pub rx: mpsc::Receiver<Notification>,
}

pub struct DecisionHub {
    registry: Arc<ApprovalRegistry>,
    connections: Mutex<HashMap<Uuid, mpsc::Sender<Notification>>>,
}

impl DecisionHub {
    pub fn new(registry: Arc<ApprovalRegistry>) -> Self {
        Self {
            registry,
            connections: Mutex::new(HashMap::new()),
        }
    }

    pub fn registry(&self) -> &Arc<ApprovalRegistry> {
        &self.registry
    }

    fn connections(&self) -> MutexGuard<'_, HashMap<Uuid, mpsc::Sender<Notification>>> {
        self.connections
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register a client. Its first message is a sync of everything pending.
    ///
    /// The snapshot is taken and the client added under the connections
    /// lock, so any suspension is either in the snapshot or arrives later as
    /// `approval_required`.
    pub fn connect(&self) -> Subscription {
        let (tx, rx) = mpsc::channel(CONNECTION_BUFFER);
        let id = Uuid::new_v4();

        let mut connections = self.connections();
        let approvals = self.registry.list_pending();
        let count = approvals.len();
        // Fresh channel with a live receiver: the first send always fits.
        let _ = tx.try_send(Notification::PendingSync { approvals });
        connections.insert(id, tx);
        info!(connection = %id, pending = count, clients = connections.len(), "Client connected");

        Subscription { id, rx }
    }

    pub fn disconnect(&self, id: Uuid) {
        if self.connections().remove(&id).is_some() {
            info!(connection = %id, "Client disconnected");
        }
    }

    pub fn connection_count(&self) -> usize {
        self.connections().len()
    }

    /// Deliver to every connection. Closed connections and ones whose buffer
    /// is full are dropped; dropping the sender ends that client's socket loop.
    /// Returns the number reached.
    pub fn broadcast(&self, notification: Notification) -> usize {
        let mut connections = self.connections();
        connections.retain(|id, tx| match tx.try_send(notification.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!(connection = %id, buffered = CONNECTION_BUFFER, "Dropping lagging connection");
                false
            }
            Err(TrySendError::Closed(_)) => {
                debug!(connection = %id, "Dropping closed connection");
                false
            }
        });
        connections.len()
    }

    /// Record a decision and announce it if it resumed a workflow.
    pub fn submit_decision(&self, decision: Decision) -> DecisionOutcome {
        let workflow_id = decision.workflow_id.clone();
        let verdict = decision.verdict;
        let outcome = self.registry.record_decision(decision);
        if outcome == DecisionOutcome::Resumed {
            self.broadcast(Notification::DecisionRecorded {
                workflow_id,
                decision: verdict,
            });
        }
        outcome
    }

    /// Handle a raw inbound client message. Unparseable input is logged and ignored.
    pub fn handle_client_text(&self, text: &str) -> Option<DecisionOutcome> {
        match serde_json::from_str::<ClientMessage>(text) {
            Ok(msg) => Some(self.submit_decision(msg.into_decision())),
            Err(e) => {
                warn!(error = %e, "Unrecognized client message");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::approval::model::{PendingApproval, Verdict};
    use crate::pipeline::types::{SuspensionFlavor, SuspensionRequest};

    fn hub() -> DecisionHub {
        DecisionHub::new(Arc::new(ApprovalRegistry::new()))
    }

    fn pending(workflow_id: &str) -> PendingApproval {
        PendingApproval::from_request(
            workflow_id,
            &SuspensionRequest {
                flavor: SuspensionFlavor::DraftApproval,
                action_type: "send_email".into(),
                recipient: "a@b.com".into(),
                subject: "Re: hi".into(),
                body: "draft".into(),
                preview: "draft".into(),
            },
        )
    }

    #[test]
    fn connect_sends_pending_sync_first() {
        let hub = hub();
        let _s = hub.registry().register(pending("w1")).unwrap();

        let mut sub = hub.connect();
        match sub.rx.try_recv().unwrap() {
            Notification::PendingSync { approvals } => {
                assert_eq!(approvals.len(), 1);
                assert_eq!(approvals[0].workflow_id, "w1");
            }
            other => panic!("expected pending_sync, got {other:?}"),
        }
        assert_eq!(hub.connection_count(), 1);
    }

    #[test]
    fn broadcast_reaches_all_and_drops_closed() {
        let hub = hub();
        let mut a = hub.connect();
        let b = hub.connect();
        drop(b.rx);

        let reached = hub.broadcast(Notification::WorkflowTimeout {
            workflow_id: "w1".into(),
        });
        assert_eq!(reached, 1);
        assert_eq!(hub.connection_count(), 1);

        let _sync = a.rx.try_recv().unwrap();
        assert!(matches!(
            a.rx.try_recv().unwrap(),
            Notification::WorkflowTimeout { .. }
        ));
    }

    #[test]
    fn stalled_client_is_dropped_when_buffer_fills() {
        let hub = hub();
        let stalled = hub.connect();
        let mut live = hub.connect();

        for _ in 0..CONNECTION_BUFFER * 4 {
            hub.broadcast(Notification::WorkflowTimeout {
                workflow_id: "w1".into(),
            });
            while live.rx.try_recv().is_ok() {}
        }

        assert_eq!(hub.connection_count(), 1);
        assert!(stalled.rx.len() <= CONNECTION_BUFFER);
    }

    #[test]
    fn disconnect_removes_client() {
        let hub = hub();
        let s = hub.connect();
        hub.disconnect(s.id);
        assert_eq!(hub.connection_count(), 0);
    }

    #[test]
    fn resumed_decision_is_announced() {
        let hub = hub();
        let _suspension = hub.registry().register(pending("w1")).unwrap();
        let mut sub = hub.connect();
        let _sync = sub.rx.try_recv().unwrap();

        let outcome = hub.handle_client_text(
            r#"{"type":"human_decision","workflow_id":"w1","decision":"approve"}"#,
        );
        assert_eq!(outcome, Some(DecisionOutcome::Resumed));
        assert!(matches!(
            sub.rx.try_recv().unwrap(),
            Notification::DecisionRecorded { decision: Verdict::Approve, .. }
        ));
    }

    #[test]
    fn unmatched_decision_is_not_announced() {
        let hub = hub();
        let mut sub = hub.connect();
        let _sync = sub.rx.try_recv().unwrap();

        let outcome = hub.submit_decision(Decision::new("nobody", Verdict::Deny));
        assert_eq!(outcome, DecisionOutcome::NoPending);
        assert!(sub.rx.try_recv().is_err());
    }

    #[test]
    fn garbage_is_ignored() {
        assert!(hub().handle_client_text("not json").is_none());
    }
}
