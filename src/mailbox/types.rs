//! Mailbox-side types and the item source contract.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::TransportError;

/// One inbound message, immutable once fetched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkItem {
    /// Source-assigned id (stable, unique within the mailbox).
    pub id: String,
    /// Bare sender address.
    pub sender: String,
    pub recipient: String,
    pub subject: String,
    pub body: String,
    /// Free-form extras (`from_full`, `thread_id`, `labels`, ...).
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl WorkItem {
    pub fn new(
        id: impl Into<String>,
        sender: impl Into<String>,
        recipient: impl Into<String>,
        subject: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            sender: sender.into(),
            recipient: recipient.into(),
            subject: subject.into(),
            body: body.into(),
            metadata: serde_json::Value::Null,
        }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    /// Fill in `fallback` when the item carries no recipient.
    pub fn or_recipient(mut self, fallback: &str) -> Self {
        if self.recipient.trim().is_empty() {
            self.recipient = fallback.to_string();
        }
        self
    }

    /// Sender as it appeared in the header (`Name <addr>`), if known.
    pub fn sender_full(&self) -> &str {
        self.metadata
            .get("from_full")
            .and_then(|v| v.as_str())
            .unwrap_or(&self.sender)
    }
}

/// Handle to an unread item as returned by a listing.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ItemRef {
    pub id: String,
    pub thread_id: Option<String>,
}

impl ItemRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            thread_id: None,
        }
    }
}

/// Full raw content of an item (RFC 822 bytes).
#[derive(Debug, Clone)]
pub struct RawItem {
    pub item_ref: ItemRef,
    pub bytes: Vec<u8>,
    pub labels: Vec<String>,
}

/// Remote mailbox the poller reads from.
///
/// Every call may be slow or fail transiently; callers contain the failure.
#[async_trait]
pub trait MailSource: Send + Sync {
    /// Source name for logs (e.g. "imap").
    fn name(&self) -> &str;

    /// List up to `max` unread items in the inbox.
    async fn list_unread(&self, max: usize) -> Result<Vec<ItemRef>, TransportError>;

    /// Fetch the full raw content of one item.
    async fn fetch_full(&self, item: &ItemRef) -> Result<RawItem, TransportError>;

    /// Mark an item read at the source.
    async fn mark_read(&self, item: &ItemRef) -> Result<(), TransportError>;
}
