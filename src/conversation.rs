//! Conversation correlation: other messages sharing a seed's conversation key.

use std::cmp::Ordering;
use std::collections::HashSet;

use chrono::{Duration, NaiveDateTime};
use tracing::{debug, warn};

use crate::folders::resolve_additional_folders;
use crate::format::format_item;
use crate::model::EmailRecord;
use crate::session::Session;
use crate::store::{DefaultFolder, FolderRef, ItemCursor, ItemSort, RawItem, Restriction};

/// Bounds for one correlation lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationQuery {
    pub max_items: usize,
    pub lookback_days: u32,
    /// Also search the sent-items folder.
    pub include_sent: bool,
    /// Names of further folders to search.
    pub extra_folders: Vec<String>,
}

impl Default for ConversationQuery {
    fn default() -> Self {
        Self {
            max_items: 5,
            lookback_days: 30,
            include_sent: true,
            extra_folders: Vec::new(),
        }
    }
}

impl ConversationQuery {
    pub fn new(max_items: usize, lookback_days: u32) -> Self {
        Self {
            max_items,
            lookback_days,
            ..Self::default()
        }
    }

    /// Items enumerated per folder at most, whatever the window says.
    pub fn scan_ceiling(&self) -> usize {
        self.max_items.saturating_mul(25).max(200)
    }
}

/// Messages of the seed's conversation, newest first.
///
/// Never contains the seed and never more than `max_items` records. Empty
/// when the seed has no conversation key. Folders are searched in order:
/// the seed's own folder, the inbox, sent items, then the extra folders,
/// each folder once.
pub fn related_emails(
    session: &Session<'_>,
    seed: &dyn RawItem,
    query: &ConversationQuery,
) -> Vec<EmailRecord> {
    let conversation_id = match seed.conversation_id() {
        Ok(Some(id)) if !id.is_empty() => id,
        Ok(_) => {
            debug!("Seed has no conversation key");
            return Vec::new();
        }
        Err(e) => {
            debug!(error = %e, "Conversation key unreadable");
            return Vec::new();
        }
    };
    if query.max_items == 0 {
        return Vec::new();
    }

    let threshold = session.now() - Duration::days(i64::from(query.lookback_days));
    let options = session.format_options();
    let ceiling = query.scan_ceiling();

    let mut seen: HashSet<String> = HashSet::new();
    if let Ok(Some(id)) = seed.entry_id() {
        seen.insert(id);
    }
    let mut related: Vec<(Option<NaiveDateTime>, EmailRecord)> = Vec::new();

    for folder in search_folders(session, seed, query) {
        let (cursor, manual) = match open_conversation(session, &folder, &conversation_id) {
            Some(opened) => opened,
            None => continue,
        };

        for (scanned, entry) in cursor.enumerate() {
            if scanned >= ceiling {
                debug!(folder = %folder.name, ceiling, "Conversation scan ceiling hit");
                break;
            }
            let Ok(item) = entry else {
                continue;
            };
            if manual {
                match item.conversation_id() {
                    Ok(Some(key)) if key == conversation_id => {}
                    _ => continue,
                }
            }
            let id = match item.entry_id() {
                Ok(Some(id)) if !seen.contains(&id) => id,
                _ => continue,
            };

            let received = item
                .received_time()
                .ok()
                .flatten()
                .and_then(|raw| raw.to_local_naive());
            if received.is_some_and(|r| r < threshold) {
                break;
            }

            match format_item(item.as_ref(), &options) {
                Ok(record) => {
                    seen.insert(id);
                    related.push((received, record));
                }
                Err(e) => {
                    debug!(error = %e, "Skipping related item");
                    continue;
                }
            }
            if related.len() >= query.max_items {
                break;
            }
        }

        if related.len() >= query.max_items {
            break;
        }
    }

    related.sort_by(|(a, _), (b, _)| newest_first(*a, *b));
    related.into_iter().map(|(_, record)| record).collect()
}

/// Descending by time, unknown times last.
pub(crate) fn newest_first(a: Option<NaiveDateTime>, b: Option<NaiveDateTime>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => b.cmp(&a),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Candidate folders, deduplicated by path.
fn search_folders(
    session: &Session<'_>,
    seed: &dyn RawItem,
    query: &ConversationQuery,
) -> Vec<FolderRef> {
    let mut candidates = Vec::new();
    if let Ok(Some(parent)) = seed.parent_folder() {
        candidates.push(parent);
    }

    let mut defaults = vec![DefaultFolder::Inbox];
    if query.include_sent {
        defaults.push(DefaultFolder::SentItems);
    }
    for kind in defaults {
        match session.call("open default folder", |store| store.default_folder(kind)) {
            Ok(folder) => candidates.push(folder),
            Err(e) => debug!(?kind, error = %e, "Default folder unavailable"),
        }
    }
    candidates.extend(resolve_additional_folders(session, &query.extra_folders));

    let mut seen = HashSet::new();
    candidates.retain(|folder| seen.insert(folder.path_key()));
    candidates
}

/// Items of the conversation in `folder`, server-filtered when the store
/// allows it. The flag is `true` when the caller must compare keys itself.
fn open_conversation<'s>(
    session: &Session<'s>,
    folder: &FolderRef,
    conversation_id: &str,
) -> Option<(ItemCursor<'s>, bool)> {
    let restriction = Restriction::ConversationId(conversation_id.to_string());
    match session
        .store()
        .restrict(folder, ItemSort::NEWEST_RECEIVED, &restriction)
    {
        Ok(cursor) => return Some((cursor, false)),
        Err(e) => {
            debug!(folder = %folder.name, error = %e, "Restriction unavailable, filtering manually");
        }
    }
    match session.call("enumerate folder items", |store| {
        store.items(folder, ItemSort::NEWEST_RECEIVED)
    }) {
        Ok(cursor) => Some((cursor, true)),
        Err(e) => {
            warn!(folder = %folder.name, error = %e, "Cannot scan folder for conversation");
            None
        }
    }
}
