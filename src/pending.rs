//! Pending replies: recent messages the mailbox owner has not answered yet.

use std::collections::BTreeSet;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::conversation::{newest_first, related_emails, ConversationQuery};
use crate::error::{ReplyScanError, Result};
use crate::folders::{all_mail_folders, folder_by_name};
use crate::format::build_body_preview;
use crate::model::time::OUTLINE_FORMAT;
use crate::model::{normalize_email_address, EmailRecord};
use crate::reply::{collect_user_addresses, has_user_reply_with_context, ReplyQuery};
use crate::scan::budget::{PendingBudget, ScanState};
use crate::scan::{collect_emails_across_folders, emails_from_folder, FolderQuery};
use crate::session::Session;
use crate::store::{DefaultFolder, RawItem};

/// Preview length used in outlines when a record carries none.
const OUTLINE_PREVIEW_CHARS: usize = 160;

/// Knobs of one pending-reply scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingOptions {
    pub max_results: usize,
    /// Related messages inspected per reply check.
    pub conversation_limit: usize,
    pub lookback_days: u32,
    /// Skip messages that were already read.
    pub unread_only: bool,
    /// Lines per conversation outline.
    pub outline_items: usize,
    /// Candidates processed per requested result before giving up.
    pub scan_multiplier: usize,
}

impl Default for PendingOptions {
    fn default() -> Self {
        Self {
            max_results: 10,
            conversation_limit: 15,
            lookback_days: 28,
            unread_only: false,
            outline_items: 4,
            scan_multiplier: 4,
        }
    }
}

/// A message still waiting for an answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingReply {
    pub record: EmailRecord,
    /// Short conversation timeline, newest first.
    pub outline: Option<String>,
}

/// Result of a pending-reply scan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PendingScan {
    pub items: Vec<PendingReply>,
    /// Candidates looked at.
    pub processed: usize,
    /// The processing ceiling stopped the scan before the candidates ran out.
    pub truncated: bool,
    /// Whether any owner address was known; without one only last-verb
    /// metadata can detect replies.
    pub owner_known: bool,
}

/// Walk `candidates` in order and keep those still waiting for a reply.
///
/// Skips messages sent by the owner, read messages when `unread_only` is
/// set, and messages the owner already answered. `progress` receives
/// `(processed, total)` after each candidate.
pub fn scan(
    session: &Session<'_>,
    candidates: &[EmailRecord],
    user_addresses: &BTreeSet<String>,
    options: &PendingOptions,
    progress: Option<&dyn Fn(u64, u64)>,
) -> PendingScan {
    let owner: BTreeSet<String> = user_addresses
        .iter()
        .filter_map(|a| normalize_email_address(a))
        .collect();
    let budget = PendingBudget::new(options.max_results, options.scan_multiplier);
    let reply_query = ReplyQuery {
        conversation_limit: options.conversation_limit,
        lookback_days: options.lookback_days,
        collect_related: true,
    };

    let mut result = PendingScan {
        owner_known: !owner.is_empty(),
        ..PendingScan::default()
    };
    let mut state = if options.max_results == 0 {
        ScanState::TargetReached
    } else {
        ScanState::Scanning
    };

    for record in candidates {
        if !state.is_scanning() {
            break;
        }
        result.processed += 1;

        if let Some(reply) = evaluate(session, record, &owner, options, &reply_query) {
            result.items.push(reply);
        }

        if let Some(report) = progress {
            report(result.processed as u64, candidates.len() as u64);
        }
        let remaining = candidates.len() - result.processed;
        state = budget.step(state, result.processed, result.items.len(), remaining);
    }

    result.truncated = state == ScanState::BudgetExhausted;
    info!(
        pending = result.items.len(),
        processed = result.processed,
        truncated = result.truncated,
        "Pending reply scan finished"
    );
    result
}

/// One candidate through the filters; `Some` when it is still pending.
fn evaluate(
    session: &Session<'_>,
    record: &EmailRecord,
    owner: &BTreeSet<String>,
    options: &PendingOptions,
    reply_query: &ReplyQuery,
) -> Option<PendingReply> {
    if options.unread_only && !record.unread {
        return None;
    }
    if record
        .sender_address()
        .is_some_and(|sender| owner.contains(&sender))
    {
        return None;
    }

    let evidence = has_user_reply_with_context(session, record, owner, reply_query);
    if evidence.replied {
        debug!(id = %record.id, "Already answered");
        return None;
    }

    let outline = build_conversation_outline(
        session,
        record,
        options.lookback_days,
        options.outline_items,
        evidence.related.as_deref(),
        evidence.item.as_deref(),
    );
    Some(PendingReply {
        record: record.clone(),
        outline,
    })
}

/// Compact timeline of `record` and its conversation.
///
/// Reuses `preloaded` related records and the live `item` when given.
/// Returns `None` when the item cannot be fetched or nothing is left to show.
pub fn build_conversation_outline(
    session: &Session<'_>,
    record: &EmailRecord,
    lookback_days: u32,
    max_items: usize,
    preloaded: Option<&[EmailRecord]>,
    item: Option<&dyn RawItem>,
) -> Option<String> {
    if max_items == 0 {
        return None;
    }

    let fetched;
    let item: &dyn RawItem = match item {
        Some(item) => item,
        None => {
            fetched = match session.call("fetch item for outline", |store| {
                store.item_by_id(&record.id)
            }) {
                Ok(item) => item,
                Err(e) => {
                    debug!(id = %record.id, error = %e, "Item unavailable for outline");
                    return None;
                }
            };
            fetched.as_ref()
        }
    };

    let owned;
    let related: &[EmailRecord] = match preloaded {
        Some(records) => records,
        None => {
            let query = ConversationQuery::new(max_items.saturating_sub(1).max(1), lookback_days);
            owned = related_emails(session, item, &query);
            &owned
        }
    };

    let mut timeline: Vec<(Option<chrono::NaiveDateTime>, &EmailRecord, bool)> =
        Vec::with_capacity(related.len() + 1);
    timeline.push((record.best_timestamp(), record, true));
    timeline.extend(related.iter().map(|r| (r.best_timestamp(), r, false)));
    timeline.sort_by(|(a, ..), (b, ..)| newest_first(*a, *b));

    let lines: Vec<String> = timeline
        .into_iter()
        .take(max_items)
        .filter(|(_, entry, focus)| *focus || entry.is_note())
        .map(|(time, entry, focus)| outline_line(time, entry, focus))
        .collect();
    if lines.is_empty() {
        None
    } else {
        Some(lines.join("\n"))
    }
}

fn outline_line(time: Option<chrono::NaiveDateTime>, entry: &EmailRecord, focus: bool) -> String {
    let timestamp = match time {
        Some(time) => time.format(OUTLINE_FORMAT).to_string(),
        None => [&entry.received, &entry.sent, &entry.last_modified]
            .into_iter()
            .flatten()
            .map(|t| t.display.clone())
            .find(|d| !d.is_empty())
            .unwrap_or_else(|| "Unknown".to_string()),
    };
    let sender = if entry.sender.is_empty() {
        "Unknown"
    } else {
        entry.sender.as_str()
    };
    let subject = if entry.subject.is_empty() {
        "(no subject)"
    } else {
        entry.subject.as_str()
    };
    let prefix = if focus { ">>" } else { "- " };
    let preview = if entry.preview.is_empty() {
        build_body_preview(&entry.body, OUTLINE_PREVIEW_CHARS)
    } else {
        entry.preview.clone()
    };

    let mut line = format!("{prefix} {timestamp} -> {sender}: {subject}");
    if !preview.is_empty() {
        line.push_str("\n   Preview: ");
        line.push_str(&preview);
    }
    line
}

/// A validated-on-use request for [`list_pending_replies`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRequest {
    pub days: u32,
    /// Folder to read instead of the inbox. Ignored with `all_folders`.
    pub folder_name: Option<String>,
    pub max_results: usize,
    /// Read every mail folder instead of one.
    pub all_folders: bool,
    pub unread_only: bool,
    /// Defaults to `max(days * 2, 14)`.
    pub conversation_lookback_days: Option<u32>,
}

impl Default for PendingRequest {
    fn default() -> Self {
        Self {
            days: 14,
            folder_name: None,
            max_results: 10,
            all_folders: false,
            unread_only: false,
            conversation_lookback_days: None,
        }
    }
}

/// Validate `request`, gather candidates and scan them for pending replies.
pub fn list_pending_replies(
    session: &Session<'_>,
    request: &PendingRequest,
    progress: Option<&dyn Fn(u64, u64)>,
) -> Result<PendingScan> {
    let max_days = session.scan().max_days;
    let conversation = session.conversation();
    if request.days < 1 || request.days > max_days {
        return Err(ReplyScanError::invalid(
            "days",
            format!("must be between 1 and {max_days}"),
        ));
    }
    if request.max_results < 1 || request.max_results > conversation.max_pending_results {
        return Err(ReplyScanError::invalid(
            "max_results",
            format!("must be between 1 and {}", conversation.max_pending_results),
        ));
    }
    let lookback_days = match request.conversation_lookback_days {
        None => (request.days * 2).max(14).min(conversation.max_lookback_days),
        Some(days) if (1..=conversation.max_lookback_days).contains(&days) => days,
        Some(_) => {
            return Err(ReplyScanError::invalid(
                "conversation_lookback_days",
                format!("must be between 1 and {}", conversation.max_lookback_days),
            ))
        }
    };

    let budget = PendingBudget::new(request.max_results, conversation.pending_scan_multiplier);
    info!(
        days = request.days,
        folder = ?request.folder_name,
        max_results = request.max_results,
        all_folders = request.all_folders,
        unread_only = request.unread_only,
        lookback_days,
        "Listing pending replies"
    );

    let candidates = if request.all_folders {
        if request.folder_name.is_some() {
            warn!("Folder name ignored when scanning all folders");
        }
        let folders = all_mail_folders(session);
        collect_emails_across_folders(session, &folders, request.days, None, Some(budget.ceiling))
    } else {
        let folder = match request.folder_name.as_deref() {
            Some(name) => folder_by_name(session, name)?
                .ok_or_else(|| ReplyScanError::FolderNotFound(name.to_string()))?,
            None => session.call("open inbox", |store| store.default_folder(DefaultFolder::Inbox))?,
        };
        let query = FolderQuery {
            days: request.days,
            search: None,
            limit: session.scan().max_per_folder,
        };
        let mut records = emails_from_folder(session, &folder, &query).records;
        records.truncate(budget.ceiling);
        records
    };

    let user_addresses = collect_user_addresses(session);
    let options = PendingOptions {
        max_results: request.max_results,
        conversation_limit: conversation.sample_limit,
        lookback_days,
        unread_only: request.unread_only,
        outline_items: conversation.outline_items,
        scan_multiplier: conversation.pending_scan_multiplier,
    };
    Ok(scan(session, &candidates, &user_addresses, &options, progress))
}
