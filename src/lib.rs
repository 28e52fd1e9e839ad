//! Inbox HITL: human-in-the-loop workflow coordinator with a mailbox poller.

pub mod approval;
pub mod audit;
pub mod config;
pub mod error;
pub mod mailbox;
pub mod pipeline;
pub mod server;
pub mod workflow;
