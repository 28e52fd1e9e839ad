//! Runs pipeline stages on the blocking pool.
//!
//! A semaphore caps how many stages run at once; each stage gets its own
//! `spawn_blocking` slot so one slow workflow never queues behind another.
//! Dropping the returned future does not stop a dispatched stage: it runs to
//! completion and its result is discarded.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::debug;

use super::types::{Pipeline, PipelineState, Stage};
use crate::error::PipelineError;

#[derive(Clone)]
pub struct PipelineInvoker {
    pipeline: Arc<dyn Pipeline>,
    permits: Arc<Semaphore>,
}

impl PipelineInvoker {
    pub fn new(pipeline: Arc<dyn Pipeline>, max_concurrent_stages: usize) -> Self {
        Self {
            pipeline,
            permits: Arc::new(Semaphore::new(max_concurrent_stages.max(1))),
        }
    }

    /// Free stage slots right now.
    pub fn available_slots(&self) -> usize {
        self.permits.available_permits()
    }

    pub async fn invoke(
        &self,
        stage: Stage,
        state: PipelineState,
    ) -> Result<PipelineState, PipelineError> {
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| PipelineError::WorkerPoolClosed)?;
        let pipeline = Arc::clone(&self.pipeline);
        let item_id = state.item.id.clone();

        debug!(stage = %stage, item = %item_id, "Dispatching pipeline stage");
        let joined = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            pipeline.run_stage(stage, state)
        })
        .await;

        match joined {
            Ok(result) => result,
            Err(e) => Err(PipelineError::Panicked {
                stage,
                reason: e.to_string(),
            }),
        }
    }
}
