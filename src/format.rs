//! Snapshot formatter: one live store item in, one [`EmailRecord`] out.
//!
//! This is the only place that probes item properties defensively. Every
//! getter goes through [`field`], so a missing or failing property becomes
//! a default instead of aborting the snapshot. Only an unreadable id fails
//! the whole item.

use tracing::debug;

use crate::config::ScanConfig;
use crate::error::{ReplyScanError, Result};
use crate::model::time::{DISPLAY_FORMAT, ISO_FORMAT};
use crate::model::{EmailAddress, EmailRecord, Importance, RecordTime};
use crate::store::{RawItem, RawTimestamp, RecipientKind, StoreResult};

/// Default number of characters in a body preview.
pub const BODY_PREVIEW_MAX_CHARS: usize = 220;

/// Default number of attachment names kept per record.
pub const ATTACHMENT_NAME_PREVIEW_MAX: usize = 5;

/// Default length of a shortened conversation id.
pub const CONVERSATION_ID_PREVIEW_MAX: usize = 16;

/// Sizes applied while taking a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatOptions {
    pub preview_chars: usize,
    pub attachment_sample: usize,
}

impl Default for FormatOptions {
    fn default() -> Self {
        Self {
            preview_chars: BODY_PREVIEW_MAX_CHARS,
            attachment_sample: ATTACHMENT_NAME_PREVIEW_MAX,
        }
    }
}

impl From<&ScanConfig> for FormatOptions {
    fn from(scan: &ScanConfig) -> Self {
        Self {
            preview_chars: scan.preview_chars,
            attachment_sample: scan.attachment_sample,
        }
    }
}

/// Read one optional property, logging and swallowing failures.
fn field<T>(name: &str, value: StoreResult<Option<T>>) -> Option<T> {
    match value {
        Ok(v) => v,
        Err(e) => {
            debug!(field = name, error = %e, "Property unreadable, using default");
            None
        }
    }
}

fn text(name: &str, value: StoreResult<Option<String>>) -> String {
    field(name, value).unwrap_or_default()
}

/// Take a snapshot of `item`.
///
/// Fails only when the item id cannot be read (stale handle); callers that
/// scan many items skip such items.
pub fn format_item(item: &dyn RawItem, options: &FormatOptions) -> Result<EmailRecord> {
    let id = match item.entry_id() {
        Ok(Some(id)) if !id.trim().is_empty() => id,
        Ok(_) => {
            return Err(ReplyScanError::Format {
                id: None,
                source: crate::store::StoreError::new("item has no id"),
            })
        }
        Err(source) => return Err(ReplyScanError::Format { id: None, source }),
    };

    let (to_recipients, cc_recipients, bcc_recipients) = recipients(item);

    let body = text("body", item.body());
    let preview = build_body_preview(&body, options.preview_chars);

    let attachment_count = field("attachment_count", item.attachment_count()).unwrap_or(0);
    let attachment_names = if attachment_count > 0 {
        attachment_names(item, attachment_count, options.attachment_sample)
    } else {
        Vec::new()
    };

    let folder_path = field("parent_folder", item.parent_folder())
        .and_then(|folder| folder.path)
        .unwrap_or_default();

    Ok(EmailRecord {
        conversation_id: field("conversation_id", item.conversation_id())
            .filter(|c| !c.is_empty()),
        subject: text("subject", item.subject()),
        sender: text("sender_name", item.sender_name()),
        sender_email: text("sender_email_address", item.sender_email_address()),
        to_recipients,
        cc_recipients,
        bcc_recipients,
        body,
        preview,
        received: record_time(field("received_time", item.received_time())),
        sent: record_time(field("sent_on", item.sent_on())),
        last_modified: record_time(field(
            "last_modification_time",
            item.last_modification_time(),
        )),
        unread: field("unread", item.unread()).unwrap_or(false),
        importance: field("importance", item.importance())
            .map(Importance::from_code)
            .unwrap_or_default(),
        categories: text("categories", item.categories()),
        has_attachments: attachment_count > 0,
        attachment_count,
        attachment_names,
        folder_path,
        message_class: text("message_class", item.message_class()),
        id,
    })
}

/// Raw text fields used to pre-filter an item against a search term
/// before paying for a full snapshot.
pub fn searchable_fields(item: &dyn RawItem) -> Vec<String> {
    let mut fields = vec![
        text("subject", item.subject()),
        text("sender_name", item.sender_name()),
        text("sender_email_address", item.sender_email_address()),
        text("body", item.body()),
    ];
    let (to, cc, bcc) = recipients(item);
    let joined: Vec<String> = to.into_iter().chain(cc).chain(bcc).collect();
    if !joined.is_empty() {
        fields.push(joined.join(" "));
    }
    fields.retain(|f| !f.is_empty());
    fields
}

fn record_time(raw: Option<RawTimestamp>) -> Option<RecordTime> {
    let raw = raw?;
    Some(match raw.to_local_naive() {
        Some(local) => RecordTime {
            display: local.format(DISPLAY_FORMAT).to_string(),
            iso: local.format(ISO_FORMAT).to_string(),
        },
        None => {
            let text = raw.raw_text();
            RecordTime {
                display: text.clone(),
                iso: text,
            }
        }
    })
}

fn recipients(item: &dyn RawItem) -> (Vec<String>, Vec<String>, Vec<String>) {
    let mut to = Vec::new();
    let mut cc = Vec::new();
    let mut bcc = Vec::new();
    let list = match item.recipients() {
        Ok(list) => list,
        Err(e) => {
            debug!(error = %e, "Recipients unreadable");
            return (to, cc, bcc);
        }
    };
    for recipient in list {
        let name = recipient
            .name
            .as_deref()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or("Unknown");
        let rendered = EmailAddress::from_parts(Some(name), recipient.address.as_deref()).display();
        match recipient.kind {
            RecipientKind::To => to.push(rendered),
            RecipientKind::Cc => cc.push(rendered),
            RecipientKind::Bcc => bcc.push(rendered),
        }
    }
    (to, cc, bcc)
}

fn attachment_names(item: &dyn RawItem, count: usize, sample: usize) -> Vec<String> {
    let mut names: Vec<String> = (0..count.min(sample))
        .filter_map(|index| field("attachment_name", item.attachment_name(index)))
        .collect();
    if count > sample {
        names.push(format!("... (+{} more)", count - sample));
    }
    names
}

/// Collapse runs of whitespace into single spaces.
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Compact preview of a body: whitespace collapsed, cut at `max_chars` with `...`.
pub fn build_body_preview(body: &str, max_chars: usize) -> String {
    let normalized = normalize_whitespace(body);
    if normalized.chars().count() <= max_chars {
        return normalized;
    }
    let kept: String = normalized
        .chars()
        .take(max_chars.saturating_sub(3))
        .collect();
    format!("{}...", kept.trim_end())
}

/// Shorten a long conversation id for display.
pub fn trim_conversation_id(conversation_id: &str, max_chars: usize) -> Option<String> {
    if conversation_id.is_empty() {
        return None;
    }
    if conversation_id.chars().count() <= max_chars {
        return Some(conversation_id.to_string());
    }
    let kept: String = conversation_id
        .chars()
        .take(max_chars.saturating_sub(3))
        .collect();
    Some(format!("{kept}..."))
}
