//! Mailbox poller: fetch unread items, dedup, hand off, back off.
//!
//! Each cycle lists a bounded batch of unread items, fetches and parses the
//! ones not yet seen this session, and hands every new `WorkItem` to a
//! non-blocking callback (normally `WorkflowSubmitter::submit`). The callback
//! only enqueues; the poller never waits on a workflow.
//!
//! The seen-set is session-scoped and never evicted.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use super::parse::parse_raw_item;
use super::types::{MailSource, WorkItem};
use crate::config::PollerConfig;
use crate::error::{SubmitError, TransportError};

/// Outcome of one successful fetch cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Unread refs returned by the listing.
    pub listed: usize,
    /// Items handed to the callback.
    pub dispatched: usize,
    /// Already seen this session.
    pub duplicates: usize,
    /// Fetch or parse failures.
    pub failed: usize,
}

pub struct MailboxPoller {
    source: Arc<dyn MailSource>,
    config: PollerConfig,
    seen: HashSet<String>,
    consecutive_cycle_errors: u32,
}

impl MailboxPoller {
    pub fn new(source: Arc<dyn MailSource>, config: PollerConfig) -> Self {
        Self {
            source,
            config,
            seen: HashSet::new(),
            consecutive_cycle_errors: 0,
        }
    }

    pub fn consecutive_cycle_errors(&self) -> u32 {
        self.consecutive_cycle_errors
    }

    pub fn seen_count(&self) -> usize {
        self.seen.len()
    }

    /// Poll until `stop` flips to `true` (or its sender is dropped).
    ///
    /// A stop request never interrupts a cycle in progress; it cuts short the
    /// interval sleep or the error cooldown.
    pub async fn run<F>(&mut self, mut on_item: F, mut stop: watch::Receiver<bool>)
    where
        F: FnMut(WorkItem) -> Result<String, SubmitError> + Send,
    {
        info!(
            source = self.source.name(),
            interval_secs = self.config.poll_interval.as_secs(),
            batch = self.config.batch_size,
            "Mailbox poller started"
        );

        loop {
            if *stop.borrow() {
                break;
            }

            match self.poll_cycle(&mut on_item).await {
                Ok(report) => {
                    self.consecutive_cycle_errors = 0;
                    if report.dispatched > 0 {
                        info!(
                            dispatched = report.dispatched,
                            listed = report.listed,
                            "Dispatched new mailbox items"
                        );
                    } else {
                        debug!(listed = report.listed, "No new mailbox items");
                    }
                }
                Err(e) => {
                    self.consecutive_cycle_errors += 1;
                    error!(
                        error = %e,
                        consecutive = self.consecutive_cycle_errors,
                        "Mailbox poll cycle failed"
                    );
                }
            }

            if self.consecutive_cycle_errors >= self.config.max_consecutive_errors {
                warn!(
                    consecutive = self.consecutive_cycle_errors,
                    cooldown_secs = self.config.cooldown.as_secs(),
                    "Too many consecutive poll failures, cooling down"
                );
                if !sleep_unless_stopped(&mut stop, self.config.cooldown).await {
                    break;
                }
                self.consecutive_cycle_errors = 0;
            }

            if !sleep_unless_stopped(&mut stop, self.config.poll_interval).await {
                break;
            }
        }

        info!(seen = self.seen.len(), "Mailbox poller stopped");
    }

    /// Run one fetch cycle.
    ///
    /// Only a failed listing fails the cycle. Per-item fetch and parse
    /// failures skip the item; it stays unseen and is retried next cycle.
    pub async fn poll_cycle<F>(&mut self, on_item: &mut F) -> Result<CycleReport, TransportError>
    where
        F: FnMut(WorkItem) -> Result<String, SubmitError> + Send,
    {
        let refs = self.source.list_unread(self.config.batch_size).await?;
        let mut report = CycleReport {
            listed: refs.len(),
            ..Default::default()
        };

        for item_ref in refs {
            if self.seen.contains(&item_ref.id) {
                report.duplicates += 1;
                continue;
            }

            let raw = match self.source.fetch_full(&item_ref).await {
                Ok(raw) => raw,
                Err(e) => {
                    warn!(id = %item_ref.id, error = %e, "Failed to fetch mailbox item");
                    report.failed += 1;
                    continue;
                }
            };

            let item = match parse_raw_item(&raw) {
                Ok(item) => item,
                Err(e) => {
                    warn!(id = %item_ref.id, error = %e, "Skipping malformed mailbox item");
                    report.failed += 1;
                    continue;
                }
            };

            info!(
                id = %item.id,
                from = %item.sender_full(),
                subject = %item.subject,
                "New mailbox item"
            );

            self.seen.insert(item_ref.id.clone());
            match on_item(item) {
                Ok(workflow_id) => {
                    report.dispatched += 1;
                    self.consecutive_cycle_errors = 0;
                    debug!(id = %item_ref.id, workflow_id = %workflow_id, "Item handed off");

                    if let Err(e) = self.source.mark_read(&item_ref).await {
                        warn!(id = %item_ref.id, error = %e, "Could not mark item read");
                    }
                }
                Err(e) => {
                    error!(id = %item_ref.id, error = %e, "Failed to hand off mailbox item");
                }
            }
        }

        Ok(report)
    }
}

/// Sleep for `duration`; returns `false` if a stop was requested meanwhile.
async fn sleep_unless_stopped(stop: &mut watch::Receiver<bool>, duration: Duration) -> bool {
    if *stop.borrow() {
        return false;
    }
    let sleep = tokio::time::sleep(duration);
    tokio::pin!(sleep);
    loop {
        tokio::select! {
            _ = &mut sleep => return true,
            changed = stop.changed() => {
                if changed.is_err() || *stop.borrow() {
                    return false;
                }
            }
        }
    }
}
