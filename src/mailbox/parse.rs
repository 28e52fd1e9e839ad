//! Raw message → `WorkItem` conversion.

use std::sync::LazyLock;

use mail_parser::{Address, MessageParser};
use regex::Regex;

use super::types::{RawItem, WorkItem};
use crate::error::ParseError;

static ANGLE_ADDR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<(.+?)>").expect("static regex"));

/// Reduce `"John Doe <john@example.com>"` to `"john@example.com"`.
pub fn clean_sender(header: &str) -> String {
    match ANGLE_ADDR.captures(header) {
        Some(caps) => caps[1].trim().to_string(),
        None => header.trim().to_string(),
    }
}

/// Strip HTML tags and normalize whitespace.
pub fn strip_html(html: &str) -> String {
    let mut result = String::new();
    let mut in_tag = false;
    for ch in html.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => result.push(ch),
            _ => {}
        }
    }
    result.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn render_address(addr: Option<&Address>) -> Option<(String, String)> {
    let first = addr?.first()?;
    let email = first.address()?.to_string();
    let full = match first.name() {
        Some(name) if !name.is_empty() => format!("{name} <{email}>"),
        _ => email.clone(),
    };
    Some((email, full))
}

/// Parse a fetched raw item.
///
/// Plain text is preferred; HTML is stripped as a fallback.
pub fn parse_raw_item(raw: &RawItem) -> Result<WorkItem, ParseError> {
    let id = raw.item_ref.id.clone();
    let parsed = MessageParser::default()
        .parse(&raw.bytes)
        .ok_or_else(|| ParseError::Unparseable { id: id.clone() })?;

    let (sender, from_full) =
        render_address(parsed.from()).ok_or_else(|| ParseError::MissingField {
            id: id.clone(),
            field: "From",
        })?;
    let recipient = render_address(parsed.to())
        .map(|(_, full)| full)
        .unwrap_or_default();
    let subject = parsed.subject().unwrap_or_default().to_string();

    let body = if let Some(text) = parsed.body_text(0) {
        text.trim().to_string()
    } else if let Some(html) = parsed.body_html(0) {
        strip_html(html.as_ref())
    } else {
        String::new()
    };

    let metadata = serde_json::json!({
        "from_full": from_full,
        "thread_id": raw.item_ref.thread_id,
        "labels": raw.labels,
        "message_id": parsed.message_id(),
    });

    Ok(WorkItem::new(id, sender, recipient, subject, body).with_metadata(metadata))
}
