//! Default pipeline: regex triage, templated drafts, SMTP execution.
//!
//! Triage checks, in order:
//! - noreply / marketing / bulk senders and unsubscribe footers → Ignore
//! - transactional mail (shipping, receipts) → NotifyHuman
//! - questions and requests → Respond (a draft is produced for approval)
//! - anything else → NotifyHuman
//!
//! Without SMTP settings, execution is a dry run that only logs.

use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use regex::Regex;
use secrecy::ExposeSecret;
use tracing::{debug, info};

use super::types::{
    ExecutionResult, PendingAction, Pipeline, PipelineState, Stage, SuspensionRequest,
    TriageDecision, TriageOutcome,
};
use crate::config::SmtpConfig;
use crate::error::PipelineError;
use crate::mailbox::WorkItem;

/// Which field a rule matches against.
#[derive(Debug, Clone, Copy)]
pub enum RuleField {
    Sender,
    Subject,
    Body,
}

#[derive(Debug, Clone)]
pub struct Rule {
    pub regex: Regex,
    pub field: RuleField,
    pub reason: String,
}

impl Rule {
    fn new(pattern: &str, field: RuleField, reason: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            regex: Regex::new(pattern)?,
            field,
            reason: reason.to_string(),
        })
    }

    fn matches(&self, item: &WorkItem) -> bool {
        let value = match self.field {
            RuleField::Sender => &item.sender,
            RuleField::Subject => &item.subject,
            RuleField::Body => &item.body,
        };
        self.regex.is_match(value)
    }
}

pub struct RulesPipeline {
    ignore_rules: Vec<Rule>,
    notify_rules: Vec<Rule>,
    respond_rules: Vec<Rule>,
    smtp: Option<SmtpConfig>,
    preview_chars: usize,
}

impl RulesPipeline {
    /// Pipeline with the built-in rule set.
    pub fn new(smtp: Option<SmtpConfig>, preview_chars: usize) -> Result<Self, regex::Error> {
        let ignore_rules = vec![
            Rule::new(r"(?i)^no[\-_.]?reply@", RuleField::Sender, "noreply sender")?,
            Rule::new(
                r"(?i)@(marketing|newsletter|promo|campaign)\b",
                RuleField::Sender,
                "marketing/newsletter sender",
            )?,
            Rule::new(
                r"(?i)^(mailer[\-_]?daemon|postmaster)@",
                RuleField::Sender,
                "automated mail system",
            )?,
            Rule::new(r"(?i)\bunsubscribe\b", RuleField::Subject, "unsubscribe in subject")?,
            Rule::new(
                r"(?i)(click here to unsubscribe|manage your subscription|email preferences|opt[- ]?out)",
                RuleField::Body,
                "bulk email footer",
            )?,
        ];

        let notify_rules = vec![
            Rule::new(
                r"(?i)(your (order|package|shipment)|tracking (number|update)|has (shipped|been delivered)|out for delivery)",
                RuleField::Body,
                "shipping/delivery update",
            )?,
            Rule::new(
                r"(?i)(payment (received|confirmed)|receipt for|invoice #|your (receipt|transaction))",
                RuleField::Body,
                "payment/receipt",
            )?,
        ];

        let respond_rules = vec![
            Rule::new(r"\?", RuleField::Body, "question asked")?,
            Rule::new(
                r"(?i)\b(refund|request|help|could you|can you|please|urgent)\b",
                RuleField::Body,
                "request for action",
            )?,
            Rule::new(r"(?i)\b(refund|question|help|urgent)\b", RuleField::Subject, "request in subject")?,
        ];

        Ok(Self {
            ignore_rules,
            notify_rules,
            respond_rules,
            smtp,
            preview_chars,
        })
    }

    /// Add a custom ignore rule, checked after the built-in ones.
    pub fn add_ignore_rule(
        &mut self,
        pattern: &str,
        field: RuleField,
        reason: &str,
    ) -> Result<(), regex::Error> {
        self.ignore_rules.push(Rule::new(pattern, field, reason)?);
        Ok(())
    }

    pub fn classify(&self, item: &WorkItem) -> TriageOutcome {
        let groups = [
            (&self.ignore_rules, TriageDecision::Ignore),
            (&self.notify_rules, TriageDecision::NotifyHuman),
            (&self.respond_rules, TriageDecision::Respond),
        ];
        for (rules, decision) in groups {
            if let Some(rule) = rules.iter().find(|r| r.matches(item)) {
                debug!(
                    sender = %item.sender,
                    decision = decision.label(),
                    reason = %rule.reason,
                    "Item matched rule"
                );
                return TriageOutcome {
                    decision,
                    reasoning: rule.reason.clone(),
                };
            }
        }
        TriageOutcome {
            decision: TriageDecision::NotifyHuman,
            reasoning: "no rule matched".into(),
        }
    }

    fn draft_reply(item: &WorkItem) -> PendingAction {
        let subject = if item.subject.to_lowercase().starts_with("re:") {
            item.subject.clone()
        } else {
            format!("Re: {}", item.subject)
        };
        let greeting = item.sender.split('@').next().unwrap_or("there");
        PendingAction {
            action_type: "send_email".into(),
            recipient: item.sender.clone(),
            subject,
            body: format!(
                "Hi {greeting},\n\nThanks for your message about \"{}\". \
                 I'm looking into it and will follow up shortly.\n\nBest regards",
                item.subject
            ),
        }
    }

    fn triage(&self, mut state: PipelineState) -> PipelineState {
        let outcome = self.classify(&state.item);
        state.suspension_request = match outcome.decision {
            TriageDecision::Ignore => None,
            TriageDecision::NotifyHuman => Some(SuspensionRequest::notification(
                &state.item,
                self.preview_chars,
            )),
            TriageDecision::Respond => {
                let action = Self::draft_reply(&state.item);
                let request = SuspensionRequest::draft_approval(&action);
                state.draft_action = Some(action);
                Some(request)
            }
        };
        state.triage = Some(outcome);
        state
    }

    fn draft(&self, mut state: PipelineState) -> PipelineState {
        let action = Self::draft_reply(&state.item);
        state.suspension_request = Some(SuspensionRequest::draft_approval(&action));
        state.draft_action = Some(action);
        state
    }

    fn execute(&self, mut state: PipelineState) -> Result<PipelineState, PipelineError> {
        let result = match &state.draft_action {
            None => ExecutionResult {
                status: "complete".into(),
                detail: "no action required".into(),
            },
            Some(action) if action.action_type == "send_email" => match &self.smtp {
                Some(smtp) => {
                    send_email(smtp, action)?;
                    ExecutionResult {
                        status: "sent".into(),
                        detail: format!("email sent to {}", action.recipient),
                    }
                }
                None => {
                    info!(to = %action.recipient, subject = %action.subject, "SMTP not configured, dry run");
                    ExecutionResult {
                        status: "dry_run".into(),
                        detail: format!("would send email to {}", action.recipient),
                    }
                }
            },
            Some(action) => ExecutionResult {
                status: "skipped".into(),
                detail: format!("no executor for action type {}", action.action_type),
            },
        };
        state.execution = Some(result);
        Ok(state)
    }
}

impl Pipeline for RulesPipeline {
    fn run_stage(&self, stage: Stage, state: PipelineState) -> Result<PipelineState, PipelineError> {
        match stage {
            Stage::Triage => Ok(self.triage(state)),
            Stage::Draft => Ok(self.draft(state)),
            Stage::Execute => self.execute(state),
        }
    }
}

/// Blocking SMTP send; runs on the stage's blocking slot.
fn send_email(smtp: &SmtpConfig, action: &PendingAction) -> Result<(), PipelineError> {
    let delivery = |reason: String| PipelineError::Delivery(reason);

    let creds = Credentials::new(
        smtp.username.clone(),
        smtp.password.expose_secret().to_string(),
    );
    let transport = SmtpTransport::relay(&smtp.host)
        .map_err(|e| delivery(format!("SMTP relay error: {e}")))?
        .port(smtp.port)
        .credentials(creds)
        .build();

    let email = Message::builder()
        .from(
            smtp.from_address
                .parse()
                .map_err(|e| delivery(format!("Invalid from address: {e}")))?,
        )
        .to(action
            .recipient
            .parse()
            .map_err(|e| delivery(format!("Invalid to address: {e}")))?)
        .subject(action.subject.as_str())
        .body(action.body.clone())
        .map_err(|e| delivery(format!("Failed to build email: {e}")))?;

    transport
        .send(&email)
        .map_err(|e| delivery(format!("SMTP send failed: {e}")))?;

    info!(to = %action.recipient, "Email sent");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::types::SuspensionFlavor;

    fn pipeline() -> RulesPipeline {
        RulesPipeline::new(None, 500).unwrap()
    }

    fn item(sender: &str, subject: &str, body: &str) -> WorkItem {
        WorkItem::new("m1", sender, "me@example.com", subject, body)
    }

    #[test]
    fn ignores_noreply() {
        let out = pipeline().classify(&item("noreply@company.com", "Your account", "Welcome!"));
        assert_eq!(out.decision, TriageDecision::Ignore);
    }

    #[test]
    fn ignores_unsubscribe_footer() {
        let out = pipeline().classify(&item(
            "updates@service.com",
            "Product update",
            "New features!\n\nClick here to unsubscribe from these emails.",
        ));
        assert_eq!(out.decision, TriageDecision::Ignore);
    }

    #[test]
    fn notifies_on_shipping_update() {
        let out = pipeline().classify(&item(
            "orders@shop.com",
            "Your order has shipped",
            "Your package has shipped and is out for delivery.",
        ));
        assert_eq!(out.decision, TriageDecision::NotifyHuman);
        assert!(out.reasoning.contains("shipping"));
    }

    #[test]
    fn ignore_wins_over_notify() {
        let out = pipeline().classify(&item(
            "noreply@store.com",
            "Your receipt",
            "Payment received for your order",
        ));
        assert_eq!(out.decision, TriageDecision::Ignore);
    }

    #[test]
    fn respond_on_question() {
        let out = pipeline().classify(&item(
            "alice@company.com",
            "Meeting tomorrow",
            "Can we reschedule the 3pm meeting?",
        ));
        assert_eq!(out.decision, TriageDecision::Respond);
    }

    #[test]
    fn plain_fyi_notifies() {
        let out = pipeline().classify(&item("bob@company.com", "FYI", "The deploy went out."));
        assert_eq!(out.decision, TriageDecision::NotifyHuman);
    }

    #[test]
    fn custom_ignore_rule() {
        let mut p = pipeline();
        p.add_ignore_rule(r"(?i)@spam\.org$", RuleField::Sender, "custom spam")
            .unwrap();
        let out = p.classify(&item("anyone@spam.org", "Hi?", "Hello?"));
        assert_eq!(out.decision, TriageDecision::Ignore);
    }

    #[test]
    fn triage_respond_requests_draft_approval() {
        let p = pipeline();
        let state = PipelineState::new(item("alice@company.com", "Refund", "Can I get a refund?"));
        let state = p.run_stage(Stage::Triage, state).unwrap();

        let req = state.suspension_request.unwrap();
        assert_eq!(req.flavor, SuspensionFlavor::DraftApproval);
        assert_eq!(req.subject, "Re: Refund");
        assert_eq!(state.draft_action.unwrap().recipient, "alice@company.com");
    }

    #[test]
    fn triage_notify_requests_notification() {
        let p = pipeline();
        let state = PipelineState::new(item("bob@company.com", "FYI", "The deploy went out."));
        let state = p.run_stage(Stage::Triage, state).unwrap();

        let req = state.suspension_request.unwrap();
        assert_eq!(req.flavor, SuspensionFlavor::Notify);
        assert!(state.draft_action.is_none());
    }

    #[test]
    fn draft_keeps_existing_re_prefix() {
        let action = RulesPipeline::draft_reply(&item("a@b.com", "RE: hello", "?"));
        assert_eq!(action.subject, "RE: hello");
    }

    #[test]
    fn execute_without_smtp_is_dry_run() {
        let p = pipeline();
        let mut state = PipelineState::new(item("alice@company.com", "Refund", "Refund?"));
        state.draft_action = Some(RulesPipeline::draft_reply(&state.item));
        let state = p.run_stage(Stage::Execute, state).unwrap();
        assert_eq!(state.execution.unwrap().status, "dry_run");
    }

    #[test]
    fn execute_without_action_completes() {
        let p = pipeline();
        let state = PipelineState::new(item("noreply@x.com", "s", "b"));
        let state = p.run_stage(Stage::Execute, state).unwrap();
        assert_eq!(state.execution.unwrap().status, "complete");
    }
}
