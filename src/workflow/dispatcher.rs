//! Submission surface: hands work items from any thread to the coordinator.
//!
//! Submissions go through an unbounded channel to a dispatcher task that
//! spawns one task per workflow. `submit` never blocks and is safe to call
//! from the poller, HTTP handlers, or plain threads.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::coordinator::WorkflowCoordinator;
use crate::error::SubmitError;
use crate::mailbox::WorkItem;

#[derive(Debug)]
struct Submission {
    workflow_id: String,
    item: WorkItem,
}

#[derive(Clone)]
pub struct WorkflowSubmitter {
    tx: mpsc::UnboundedSender<Submission>,
}

impl WorkflowSubmitter {
    /// Submit under the item's own id.
    pub fn submit(&self, item: WorkItem) -> Result<String, SubmitError> {
        let workflow_id = item.id.clone();
        self.submit_as(workflow_id, item)
    }

    /// Submit under an explicit workflow id.
    pub fn submit_as(&self, workflow_id: String, item: WorkItem) -> Result<String, SubmitError> {
        self.tx
            .send(Submission {
                workflow_id: workflow_id.clone(),
                item,
            })
            .map_err(|_| SubmitError::DispatcherClosed)?;
        debug!(workflow_id = %workflow_id, "Workflow submitted");
        Ok(workflow_id)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Start the dispatcher. It runs until every submitter is dropped.
pub fn spawn_dispatcher(coordinator: Arc<WorkflowCoordinator>) -> (WorkflowSubmitter, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::unbounded_channel::<Submission>();

    let handle = tokio::spawn(async move {
        while let Some(submission) = rx.recv().await {
            let coordinator = Arc::clone(&coordinator);
            tokio::spawn(async move {
                coordinator
                    .run_workflow(submission.workflow_id, submission.item)
                    .await;
            });
        }
        info!("Workflow dispatcher stopped");
    });

    (WorkflowSubmitter { tx }, handle)
}
