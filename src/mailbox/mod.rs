//! Inbound mailbox: item source contract, parsing, and the poller loop.

pub mod imap;
pub mod parse;
pub mod poller;
pub mod types;

pub use imap::ImapSource;
pub use poller::{CycleReport, MailboxPoller};
pub use types::{ItemRef, MailSource, RawItem, WorkItem};
