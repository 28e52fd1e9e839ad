//! Drives one work item through the pipeline, suspending for human
//! decisions where the pipeline asks for them.
//!
//! Every workflow runs in its own task. Stages go to the blocking pool via
//! `PipelineInvoker`; a suspended workflow holds only a one-shot receiver,
//! so any number can wait at once without occupying a thread.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::Utc;
use tracing::{error, info, warn};

use super::model::{Workflow, WorkflowOutcome, WorkflowStage};
use crate::approval::model::{Decision, EmailSummary, Notification, PendingApproval, Verdict};
use crate::approval::{ApprovalRegistry, DecisionHub};
use crate::audit::{AuditOutcome, AuditStore, InteractionRecord};
use crate::config::CoordinatorConfig;
use crate::error::{Error, PipelineError};
use crate::mailbox::WorkItem;
use crate::pipeline::types::{Stage, SuspensionFlavor, SuspensionRequest};
use crate::pipeline::PipelineInvoker;

pub struct WorkflowCoordinator {
    hub: Arc<DecisionHub>,
    invoker: PipelineInvoker,
    audit: Arc<dyn AuditStore>,
    config: CoordinatorConfig,
    in_flight: AtomicUsize,
}

/// Decrements the in-flight count however the workflow ends.
struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl WorkflowCoordinator {
    pub fn new(
        hub: Arc<DecisionHub>,
        invoker: PipelineInvoker,
        audit: Arc<dyn AuditStore>,
        config: CoordinatorConfig,
    ) -> Self {
        Self {
            hub,
            invoker,
            audit,
            config,
            in_flight: AtomicUsize::new(0),
        }
    }

    pub fn hub(&self) -> &Arc<DecisionHub> {
        &self.hub
    }

    pub fn registry(&self) -> &Arc<ApprovalRegistry> {
        self.hub.registry()
    }

    pub fn audit(&self) -> &Arc<dyn AuditStore> {
        &self.audit
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Workflows started and not yet finished.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Run a workflow to its terminal state. Never fails: errors become
    /// `WorkflowOutcome::Failed` and a `workflow_error` notification.
    pub async fn run_workflow(&self, workflow_id: String, item: WorkItem) -> WorkflowOutcome {
        let _in_flight = InFlight::enter(&self.in_flight);
        let mut workflow = Workflow::new(workflow_id, item);

        info!(
            workflow_id = %workflow.id,
            sender = %workflow.item().sender,
            subject = %workflow.item().subject,
            "Workflow started"
        );
        self.hub.broadcast(Notification::ProcessingStarted {
            workflow_id: workflow.id.clone(),
            email: EmailSummary {
                from: workflow.item().sender_full().to_string(),
                subject: workflow.item().subject.clone(),
            },
        });

        let outcome = match self.drive(&mut workflow).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(workflow_id = %workflow.id, stage = ?workflow.stage, error = %e, "Workflow failed");
                self.record(&workflow, "none", false, AuditOutcome::Error)
                    .await;
                WorkflowOutcome::Failed {
                    error: e.to_string(),
                }
            }
        };

        workflow.advance(WorkflowStage::Completed);
        self.registry().finish(&workflow.id);
        info!(workflow_id = %workflow.id, outcome = outcome.label(), "Workflow finished");
        self.hub.broadcast(outcome.notification(&workflow.id));
        outcome
    }

    async fn drive(&self, wf: &mut Workflow) -> Result<WorkflowOutcome, Error> {
        wf.advance(WorkflowStage::Triage);
        wf.state = self.invoker.invoke(Stage::Triage, wf.state.clone()).await?;
        let triage = wf.state.triage.clone().ok_or(PipelineError::MissingOutput {
            stage: Stage::Triage,
            field: "triage",
        })?;

        info!(
            workflow_id = %wf.id,
            decision = triage.decision.label(),
            reasoning = %triage.reasoning,
            "Triage complete"
        );
        self.hub.broadcast(Notification::TriageComplete {
            workflow_id: wf.id.clone(),
            decision: triage.decision.label().to_string(),
            reasoning: triage.reasoning.clone(),
        });

        let Some(request) = wf.state.suspension_request.take() else {
            return self.complete_unattended(wf).await;
        };

        let request = match request.flavor {
            SuspensionFlavor::DraftApproval => request,
            SuspensionFlavor::Notify => {
                let Some(decision) = self.suspend(wf, &request).await? else {
                    return Ok(WorkflowOutcome::TimedOut);
                };
                if decision.verdict != Verdict::Respond {
                    self.record(wf, "none", false, AuditOutcome::Ignored).await;
                    return Ok(WorkflowOutcome::Ignored);
                }
                self.draft_response(wf).await?
            }
        };

        let Some(decision) = self.suspend(wf, &request).await? else {
            return Ok(WorkflowOutcome::TimedOut);
        };
        if !matches!(decision.verdict, Verdict::Approve | Verdict::Edit) {
            self.record(wf, "none", false, AuditOutcome::Denied).await;
            return Ok(WorkflowOutcome::Denied);
        }

        let mut action = wf
            .state
            .draft_action
            .take()
            .unwrap_or_else(|| request.to_action());
        if decision.verdict == Verdict::Edit
            && let Some(content) = decision.edited_content.filter(|c| !c.trim().is_empty())
        {
            action.body = content;
        }
        let action_type = action.action_type.clone();
        wf.state.draft_action = Some(action);
        wf.state.human_verdict = Some(decision.verdict);

        wf.advance(WorkflowStage::Executing);
        wf.state = self.invoker.invoke(Stage::Execute, wf.state.clone()).await?;
        let result = wf.state.execution.clone().ok_or(PipelineError::MissingOutput {
            stage: Stage::Execute,
            field: "execution",
        })?;

        self.record(wf, &action_type, true, AuditOutcome::Executed)
            .await;
        Ok(WorkflowOutcome::Executed {
            verdict: decision.verdict,
            result,
        })
    }

    /// Human chose to respond to a notification: produce a draft and turn it
    /// into a draft-approval request.
    async fn draft_response(&self, wf: &mut Workflow) -> Result<SuspensionRequest, Error> {
        wf.state.human_verdict = Some(Verdict::Respond);
        wf.advance(WorkflowStage::Drafting);
        wf.state = self.invoker.invoke(Stage::Draft, wf.state.clone()).await?;

        let mut request = match wf.state.suspension_request.take() {
            Some(request) => request,
            None => wf
                .state
                .draft_action
                .as_ref()
                .map(SuspensionRequest::draft_approval)
                .ok_or(PipelineError::MissingOutput {
                    stage: Stage::Draft,
                    field: "draft_action",
                })?,
        };
        request.flavor = SuspensionFlavor::DraftApproval;
        Ok(request)
    }

    /// No suspension requested: run the final stage straight away.
    async fn complete_unattended(&self, wf: &mut Workflow) -> Result<WorkflowOutcome, Error> {
        wf.advance(WorkflowStage::Executing);
        wf.state = self.invoker.invoke(Stage::Execute, wf.state.clone()).await?;

        let action_taken = wf
            .state
            .draft_action
            .as_ref()
            .map_or_else(|| "none".to_string(), |a| a.action_type.clone());
        self.record(wf, &action_taken, false, AuditOutcome::Auto)
            .await;
        Ok(WorkflowOutcome::AutoCompleted {
            result: wf.state.execution.clone(),
        })
    }

    /// Publish a pending approval and wait for its decision. `None` on timeout.
    async fn suspend(
        &self,
        wf: &mut Workflow,
        request: &SuspensionRequest,
    ) -> Result<Option<Decision>, Error> {
        let pending = PendingApproval::from_request(&wf.id, request);
        let suspension = self.registry().register(pending.clone())?;
        wf.advance(WorkflowStage::Suspended);

        info!(
            workflow_id = %wf.id,
            suspension_id = %pending.suspension_id,
            notification = pending.notification_only,
            "Awaiting human decision"
        );
        self.hub
            .broadcast(Notification::ApprovalRequired { data: pending });

        match suspension
            .wait(self.registry(), self.config.approval_timeout)
            .await
        {
            Some(decision) => {
                wf.advance(WorkflowStage::Resuming);
                info!(workflow_id = %wf.id, verdict = %decision.verdict, "Resuming workflow");
                Ok(Some(decision))
            }
            None => {
                warn!(
                    workflow_id = %wf.id,
                    timeout_secs = self.config.approval_timeout.as_secs(),
                    "Approval timed out"
                );
                Ok(None)
            }
        }
    }

    /// Best-effort audit write; failures are logged only.
    async fn record(
        &self,
        wf: &Workflow,
        action_taken: &str,
        human_approved: bool,
        outcome: AuditOutcome,
    ) {
        let record = InteractionRecord {
            workflow_id: wf.id.clone(),
            sender: wf.item().sender.clone(),
            subject: wf.item().subject.clone(),
            triage_decision: wf
                .state
                .triage
                .as_ref()
                .map_or("unknown", |t| t.decision.label())
                .to_string(),
            action_taken: action_taken.to_string(),
            human_approved,
            outcome,
            recorded_at: Utc::now(),
        };
        if let Err(e) = self.audit.record_interaction(&record).await {
            warn!(workflow_id = %wf.id, error = %e, "Failed to record interaction");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;

    use super::*;
    use crate::approval::{DecisionOutcome, Subscription};
    use crate::audit::LibSqlAuditStore;
    use crate::pipeline::types::{
        ExecutionResult, PendingAction, Pipeline, PipelineState, TriageDecision, TriageOutcome,
    };

    #[derive(Clone, Copy)]
    enum Script {
        Auto,
        Notify,
        Draft,
        FailTriage,
    }

    /// Pipeline whose triage result is scripted per item id.
    struct ScriptedPipeline {
        scripts: HashMap<String, Script>,
        triage_delay: HashMap<String, Duration>,
        calls: Mutex<Vec<(String, Stage)>>,
    }

    impl ScriptedPipeline {
        fn new(scripts: &[(&str, Script)]) -> Self {
            Self {
                scripts: scripts.iter().map(|(id, s)| (id.to_string(), *s)).collect(),
                triage_delay: HashMap::new(),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn with_delay(mut self, id: &str, delay: Duration) -> Self {
            self.triage_delay.insert(id.to_string(), delay);
            self
        }

        fn stages_for(&self, id: &str) -> Vec<Stage> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .filter(|(i, _)| i == id)
                .map(|(_, s)| *s)
                .collect()
        }

        fn draft(item: &crate::mailbox::WorkItem) -> PendingAction {
            PendingAction {
                action_type: "send_email".into(),
                recipient: item.sender.clone(),
                subject: format!("Re: {}", item.subject),
                body: "Thanks, on it.".into(),
            }
        }
    }

    impl Pipeline for ScriptedPipeline {
        fn run_stage(&self, stage: Stage, mut state: PipelineState) -> Result<PipelineState, PipelineError> {
            let id = state.item.id.clone();
            self.calls.lock().unwrap().push((id.clone(), stage));

            match stage {
                Stage::Triage => {
                    if let Some(delay) = self.triage_delay.get(&id) {
                        std::thread::sleep(*delay);
                    }
                    let script = self.scripts.get(&id).copied().unwrap_or(Script::Auto);
                    let decision = match script {
                        Script::Auto => TriageDecision::Ignore,
                        Script::Notify => TriageDecision::NotifyHuman,
                        Script::Draft => TriageDecision::Respond,
                        Script::FailTriage => {
                            return Err(PipelineError::StageFailed {
                                stage,
                                reason: "model unavailable".into(),
                            });
                        }
                    };
                    state.suspension_request = match script {
                        Script::Notify => Some(SuspensionRequest::notification(&state.item, 500)),
                        Script::Draft => {
                            let action = Self::draft(&state.item);
                            let request = SuspensionRequest::draft_approval(&action);
                            state.draft_action = Some(action);
                            Some(request)
                        }
                        _ => None,
                    };
                    state.triage = Some(TriageOutcome {
                        decision,
                        reasoning: "scripted".into(),
                    });
                }
                Stage::Draft => {
                    let action = Self::draft(&state.item);
                    state.suspension_request = Some(SuspensionRequest::draft_approval(&action));
                    state.draft_action = Some(action);
                }
                Stage::Execute => {
                    state.execution = Some(match &state.draft_action {
                        Some(action) => ExecutionResult {
                            status: "sent".into(),
                            detail: format!("sent: {}", action.body),
                        },
                        None => ExecutionResult {
                            status: "complete".into(),
                            detail: "no action required".into(),
                        },
                    });
                }
            }
            Ok(state)
        }
    }

    struct Harness {
        coordinator: Arc<WorkflowCoordinator>,
        audit: Arc<LibSqlAuditStore>,
        pipeline: Arc<ScriptedPipeline>,
        sub: Subscription,
    }

    async fn harness(pipeline: ScriptedPipeline, timeout: Duration) -> Harness {
        let pipeline = Arc::new(pipeline);
        let audit = Arc::new(LibSqlAuditStore::new_memory().await.unwrap());
        let hub = Arc::new(DecisionHub::new(Arc::new(ApprovalRegistry::new())));
        let config = CoordinatorConfig {
            approval_timeout: timeout,
            ..CoordinatorConfig::default()
        };
        let coordinator = Arc::new(WorkflowCoordinator::new(
            Arc::clone(&hub),
            PipelineInvoker::new(pipeline.clone(), 4),
            audit.clone(),
            config,
        ));
        let sub = hub.connect();
        Harness {
            coordinator,
            audit,
            pipeline,
            sub,
        }
    }

    fn item(id: &str) -> WorkItem {
        WorkItem::new(id, "alice@example.com", "me@example.com", "Refund", "Can I get a refund?")
    }

    fn spawn_run(h: &Harness, id: &str) -> tokio::task::JoinHandle<WorkflowOutcome> {
        let coordinator = Arc::clone(&h.coordinator);
        let id = id.to_string();
        tokio::spawn(async move { coordinator.run_workflow(id.clone(), item(&id)).await })
    }

    async fn wait_for_pending(h: &Harness, id: &str, notification_only: bool) -> PendingApproval {
        for _ in 0..400 {
            if let Some(p) = h
                .coordinator
                .registry()
                .list_pending()
                .into_iter()
                .find(|p| p.workflow_id == id && p.notification_only == notification_only)
            {
                return p;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("workflow {id} never suspended");
    }

    fn drain(sub: &mut Subscription) -> Vec<Notification> {
        let mut out = Vec::new();
        while let Ok(n) = sub.rx.try_recv() {
            out.push(n);
        }
        out
    }

    fn types_of(notifications: &[Notification]) -> Vec<String> {
        notifications
            .iter()
            .map(|n| serde_json::to_value(n).unwrap()["type"].as_str().unwrap().to_string())
            .collect()
    }

    #[tokio::test]
    async fn unattended_path_completes_without_suspension() {
        let mut h = harness(ScriptedPipeline::new(&[("w1", Script::Auto)]), Duration::from_secs(5)).await;

        let outcome = h.coordinator.run_workflow("w1".into(), item("w1")).await;
        assert!(matches!(outcome, WorkflowOutcome::AutoCompleted { .. }));
        assert_eq!(h.pipeline.stages_for("w1"), vec![Stage::Triage, Stage::Execute]);
        assert_eq!(h.coordinator.registry().pending_count(), 0);
        assert_eq!(h.coordinator.in_flight(), 0);

        let types = types_of(&drain(&mut h.sub));
        assert_eq!(
            types,
            vec!["pending_sync", "processing_started", "triage_complete", "workflow_complete"]
        );

        let records = h.audit.interactions_for("w1").await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].outcome, AuditOutcome::Auto);
        assert!(!records[0].human_approved);
    }

    #[tokio::test]
    async fn approve_runs_final_stage() {
        let mut h = harness(ScriptedPipeline::new(&[("w1", Script::Draft)]), Duration::from_secs(5)).await;
        let handle = spawn_run(&h, "w1");

        let pending = wait_for_pending(&h, "w1", false).await;
        assert_eq!(pending.subject, "Re: Refund");
        assert_eq!(h.pipeline.stages_for("w1"), vec![Stage::Triage]);

        let outcome = h
            .coordinator
            .hub()
            .submit_decision(Decision::new("w1", Verdict::Approve));
        assert_eq!(outcome, DecisionOutcome::Resumed);

        match handle.await.unwrap() {
            WorkflowOutcome::Executed { verdict, result } => {
                assert_eq!(verdict, Verdict::Approve);
                assert_eq!(result.detail, "sent: Thanks, on it.");
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        assert_eq!(
            h.pipeline.stages_for("w1"),
            vec![Stage::Triage, Stage::Execute]
        );

        let types = types_of(&drain(&mut h.sub));
        assert!(types.contains(&"approval_required".to_string()));
        assert!(types.contains(&"decision_recorded".to_string()));
        assert_eq!(types.last().map(String::as_str), Some("workflow_complete"));

        let records = h.audit.interactions_for("w1").await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].action_taken, "send_email");
        assert!(records[0].human_approved);
        assert_eq!(records[0].triage_decision, "respond");
    }

    #[tokio::test]
    async fn edit_replaces_body() {
        let h = harness(ScriptedPipeline::new(&[("w1", Script::Draft)]), Duration::from_secs(5)).await;
        let handle = spawn_run(&h, "w1");
        wait_for_pending(&h, "w1", false).await;

        h.coordinator
            .hub()
            .submit_decision(Decision::new("w1", Verdict::Edit).with_edit("Refund issued."));

        match handle.await.unwrap() {
            WorkflowOutcome::Executed { verdict, result } => {
                assert_eq!(verdict, Verdict::Edit);
                assert_eq!(result.detail, "sent: Refund issued.");
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[tokio::test]
    async fn deny_skips_final_stage() {
        let mut h = harness(ScriptedPipeline::new(&[("w1", Script::Draft)]), Duration::from_secs(5)).await;
        let handle = spawn_run(&h, "w1");
        wait_for_pending(&h, "w1", false).await;

        h.coordinator
            .hub()
            .submit_decision(Decision::new("w1", Verdict::Deny));
        assert_eq!(handle.await.unwrap(), WorkflowOutcome::Denied);
        assert_eq!(h.pipeline.stages_for("w1"), vec![Stage::Triage]);

        let last = drain(&mut h.sub).pop().unwrap();
        let v = serde_json::to_value(last).unwrap();
        assert_eq!(v["decision"], "denied");
        assert_eq!(v["execution_status"], "cancelled");

        let records = h.audit.interactions_for("w1").await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].outcome, AuditOutcome::Denied);
        assert_eq!(records[0].action_taken, "none");
    }

    #[tokio::test]
    async fn notification_ignored() {
        let h = harness(ScriptedPipeline::new(&[("w1", Script::Notify)]), Duration::from_secs(5)).await;
        let handle = spawn_run(&h, "w1");
        let pending = wait_for_pending(&h, "w1", true).await;
        assert!(pending.preview.starts_with("From: alice@example.com"));

        // Draft verdicts do not answer a notification.
        assert_eq!(
            h.coordinator
                .hub()
                .submit_decision(Decision::new("w1", Verdict::Approve)),
            DecisionOutcome::InvalidVerdict
        );
        assert_eq!(
            h.coordinator
                .hub()
                .submit_decision(Decision::new("w1", Verdict::Ignore)),
            DecisionOutcome::Resumed
        );

        assert_eq!(handle.await.unwrap(), WorkflowOutcome::Ignored);
        assert_eq!(h.pipeline.stages_for("w1"), vec![Stage::Triage]);

        let records = h.audit.interactions_for("w1").await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].outcome, AuditOutcome::Ignored);
        assert_eq!(records[0].triage_decision, "notify_human");
    }

    #[tokio::test]
    async fn notification_respond_drafts_then_resuspends() {
        let h = harness(ScriptedPipeline::new(&[("w1", Script::Notify)]), Duration::from_secs(5)).await;
        let handle = spawn_run(&h, "w1");

        let first = wait_for_pending(&h, "w1", true).await;
        h.coordinator
            .hub()
            .submit_decision(Decision::new("w1", Verdict::Respond));

        let second = wait_for_pending(&h, "w1", false).await;
        assert_ne!(first.suspension_id, second.suspension_id);
        assert_eq!(h.pipeline.stages_for("w1"), vec![Stage::Triage, Stage::Draft]);

        // A decision aimed at the old suspension is stale.
        assert_eq!(
            h.coordinator.hub().submit_decision(
                Decision::new("w1", Verdict::Approve).for_suspension(first.suspension_id)
            ),
            DecisionOutcome::Stale
        );
        h.coordinator.hub().submit_decision(
            Decision::new("w1", Verdict::Approve).for_suspension(second.suspension_id),
        );

        assert!(matches!(
            handle.await.unwrap(),
            WorkflowOutcome::Executed { verdict: Verdict::Approve, .. }
        ));
        assert_eq!(
            h.pipeline.stages_for("w1"),
            vec![Stage::Triage, Stage::Draft, Stage::Execute]
        );
    }

    #[tokio::test]
    async fn timeout_leaves_no_audit_and_rejects_late_decision() {
        let mut h = harness(
            ScriptedPipeline::new(&[("w1", Script::Draft)]),
            Duration::from_millis(100),
        )
        .await;

        let outcome = h.coordinator.run_workflow("w1".into(), item("w1")).await;
        assert_eq!(outcome, WorkflowOutcome::TimedOut);
        assert_eq!(h.coordinator.registry().pending_count(), 0);

        let late = h
            .coordinator
            .hub()
            .submit_decision(Decision::new("w1", Verdict::Approve));
        assert_eq!(late, DecisionOutcome::NoPending);
        assert_eq!(h.coordinator.registry().decisions_for("w1").len(), 1);
        assert_eq!(h.pipeline.stages_for("w1"), vec![Stage::Triage]);
        assert!(h.audit.interactions_for("w1").await.unwrap().is_empty());

        let types = types_of(&drain(&mut h.sub));
        assert_eq!(types.last().map(String::as_str), Some("workflow_timeout"));
    }

    #[tokio::test]
    async fn stage_failure_reports_error() {
        let mut h = harness(
            ScriptedPipeline::new(&[("w1", Script::FailTriage)]),
            Duration::from_secs(5),
        )
        .await;

        let outcome = h.coordinator.run_workflow("w1".into(), item("w1")).await;
        match outcome {
            WorkflowOutcome::Failed { error } => assert!(error.contains("model unavailable")),
            other => panic!("unexpected outcome {other:?}"),
        }

        let types = types_of(&drain(&mut h.sub));
        assert_eq!(types.last().map(String::as_str), Some("workflow_error"));

        let records = h.audit.interactions_for("w1").await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].outcome, AuditOutcome::Error);
        assert_eq!(records[0].action_taken, "none");
    }

    #[tokio::test]
    async fn slow_workflow_does_not_block_others() {
        let pipeline = ScriptedPipeline::new(&[("slow", Script::Draft), ("fast", Script::Draft)])
            .with_delay("slow", Duration::from_millis(1000));
        let h = harness(pipeline, Duration::from_secs(5)).await;

        let slow = spawn_run(&h, "slow");
        tokio::time::sleep(Duration::from_millis(20)).await;
        let fast = spawn_run(&h, "fast");

        // The fast workflow suspends and is resolved while slow is still in triage.
        wait_for_pending(&h, "fast", false).await;
        assert_eq!(
            h.coordinator
                .hub()
                .submit_decision(Decision::new("fast", Verdict::Approve)),
            DecisionOutcome::Resumed
        );
        let fast_outcome = fast.await.unwrap();
        assert!(matches!(fast_outcome, WorkflowOutcome::Executed { .. }));
        assert!(!slow.is_finished());
        assert!(!h.coordinator.registry().is_pending("slow"));
        assert_eq!(h.pipeline.stages_for("slow"), vec![Stage::Triage]);

        wait_for_pending(&h, "slow", false).await;
        h.coordinator
            .hub()
            .submit_decision(Decision::new("slow", Verdict::Deny));
        assert_eq!(slow.await.unwrap(), WorkflowOutcome::Denied);
    }

    #[tokio::test]
    async fn concurrent_decisions_resume_once() {
        let h = harness(ScriptedPipeline::new(&[("w1", Script::Draft)]), Duration::from_secs(5)).await;
        let handle = spawn_run(&h, "w1");
        wait_for_pending(&h, "w1", false).await;

        let hub = Arc::clone(h.coordinator.hub());
        let a = {
            let hub = Arc::clone(&hub);
            tokio::task::spawn_blocking(move || hub.submit_decision(Decision::new("w1", Verdict::Approve)))
        };
        let b = tokio::task::spawn_blocking(move || hub.submit_decision(Decision::new("w1", Verdict::Deny)));
        let outcomes = [a.await.unwrap(), b.await.unwrap()];

        assert_eq!(
            outcomes.iter().filter(|o| **o == DecisionOutcome::Resumed).count(),
            1
        );
        let outcome = handle.await.unwrap();
        assert!(matches!(
            outcome,
            WorkflowOutcome::Executed { .. } | WorkflowOutcome::Denied
        ));
        assert_eq!(h.audit.interactions_for("w1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn many_workflows_suspend_at_once() {
        let ids: Vec<String> = (0..20).map(|i| format!("w{i}")).collect();
        let scripts: Vec<(&str, Script)> = ids.iter().map(|id| (id.as_str(), Script::Draft)).collect();
        let h = harness(ScriptedPipeline::new(&scripts), Duration::from_secs(5)).await;

        let handles: Vec<_> = ids.iter().map(|id| spawn_run(&h, id)).collect();
        for id in &ids {
            wait_for_pending(&h, id, false).await;
        }
        assert_eq!(h.coordinator.registry().pending_count(), 20);
        assert_eq!(h.coordinator.in_flight(), 20);

        for id in &ids {
            h.coordinator
                .hub()
                .submit_decision(Decision::new(id.as_str(), Verdict::Approve));
        }
        for handle in handles {
            assert!(matches!(handle.await.unwrap(), WorkflowOutcome::Executed { .. }));
        }
        assert_eq!(h.coordinator.in_flight(), 0);
    }
}
