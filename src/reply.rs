//! Reply inference: has the mailbox owner already answered a message?
//!
//! Two independent signals, either of which is enough:
//!
//! 1. A plain note sent from one of the owner's addresses in the same
//!    conversation, no older than the message itself.
//! 2. The live item's last-verb metadata says "replied" or "replied to
//!    all", at or after the message time.
//!
//! Lookup failures never count as evidence of a reply.

use std::collections::BTreeSet;

use chrono::NaiveDateTime;
use tracing::debug;

use crate::conversation::{related_emails, ConversationQuery};
use crate::model::time::parse_datetime_string;
use crate::model::{normalize_email_address, EmailRecord};
use crate::session::Session;
use crate::store::{PropertyValue, RawItem};

/// Last-verb codes for "reply to sender" and "reply to all".
pub const LAST_VERB_REPLY_CODES: [i64; 2] = [102, 103];

/// Raw property tag of the last verb executed on an item.
pub const PR_LAST_VERB_EXECUTED: &str = "http://schemas.microsoft.com/mapi/proptag/0x10810003";

/// Raw property tag of the time the last verb was executed.
pub const PR_LAST_VERB_EXECUTION_TIME: &str =
    "http://schemas.microsoft.com/mapi/proptag/0x10820040";

/// Outcome of a reply check, with whatever was fetched along the way.
///
/// When `replied` is true, `related` and `item` are always `None`.
pub struct ReplyEvidence<'s> {
    pub replied: bool,
    /// Related conversation records, kept only when asked for.
    pub related: Option<Vec<EmailRecord>>,
    /// The refetched live item, reusable for an outline.
    pub item: Option<Box<dyn RawItem + 's>>,
}

impl std::fmt::Debug for ReplyEvidence<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplyEvidence")
            .field("replied", &self.replied)
            .field("related", &self.related.as_ref().map(Vec::len))
            .field("item", &self.item.is_some())
            .finish()
    }
}

impl ReplyEvidence<'_> {
    fn replied() -> Self {
        Self {
            replied: true,
            related: None,
            item: None,
        }
    }
}

/// Bounds for one reply check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplyQuery {
    /// Related messages inspected.
    pub conversation_limit: usize,
    pub lookback_days: u32,
    /// Return the related records when no reply is found.
    pub collect_related: bool,
}

/// Decide whether the owner replied to `record`.
///
/// `user_addresses` may hold raw addresses; they are normalized here. The
/// conversation signal only runs when at least one address survives
/// normalization.
pub fn has_user_reply_with_context<'s>(
    session: &Session<'s>,
    record: &EmailRecord,
    user_addresses: &BTreeSet<String>,
    query: &ReplyQuery,
) -> ReplyEvidence<'s> {
    let owner: BTreeSet<String> = user_addresses
        .iter()
        .filter_map(|a| normalize_email_address(a))
        .collect();
    let baseline = record.best_timestamp();

    let item = match session.call("fetch item for reply check", |store| {
        store.item_by_id(&record.id)
    }) {
        Ok(item) => Some(item),
        Err(e) => {
            debug!(id = %record.id, error = %e, "Item unavailable for reply check");
            None
        }
    };

    let mut captured = None;
    if !owner.is_empty() {
        if let Some(item) = item.as_deref() {
            let conversation = ConversationQuery {
                max_items: query.conversation_limit,
                lookback_days: query.lookback_days,
                include_sent: true,
                extra_folders: Vec::new(),
            };
            let related = related_emails(session, item, &conversation);
            if related
                .iter()
                .any(|r| is_owner_reply(r, &owner, baseline))
            {
                debug!(id = %record.id, "Reply found in conversation");
                return ReplyEvidence::replied();
            }
            if query.collect_related {
                captured = Some(related);
            }
        }
    }

    if item
        .as_deref()
        .is_some_and(|item| item_marked_replied(item, baseline))
    {
        debug!(id = %record.id, "Reply found in last-verb metadata");
        return ReplyEvidence::replied();
    }

    ReplyEvidence {
        replied: false,
        related: captured,
        item,
    }
}

/// Boolean form of [`has_user_reply_with_context`].
pub fn has_user_reply(
    session: &Session<'_>,
    record: &EmailRecord,
    user_addresses: &BTreeSet<String>,
    conversation_limit: usize,
    lookback_days: u32,
) -> bool {
    let query = ReplyQuery {
        conversation_limit,
        lookback_days,
        collect_related: false,
    };
    has_user_reply_with_context(session, record, user_addresses, &query).replied
}

fn is_owner_reply(
    related: &EmailRecord,
    owner: &BTreeSet<String>,
    baseline: Option<NaiveDateTime>,
) -> bool {
    if !related.is_note() {
        return false;
    }
    let Some(sender) = related.sender_address() else {
        return false;
    };
    owner.contains(&sender) && at_or_after(related.best_timestamp(), baseline)
}

/// `true` unless both times are known and `time` is before `baseline`.
fn at_or_after(time: Option<NaiveDateTime>, baseline: Option<NaiveDateTime>) -> bool {
    match (time, baseline) {
        (Some(time), Some(baseline)) => time >= baseline,
        _ => true,
    }
}

/// Whether the item's last-verb metadata records a reply at or after `baseline`.
///
/// Reads the typed properties first, then the raw property accessor.
pub fn item_marked_replied(item: &dyn RawItem, baseline: Option<NaiveDateTime>) -> bool {
    if let Ok(Some(verb)) = item.last_verb_executed() {
        if LAST_VERB_REPLY_CODES.contains(&verb) {
            let time = item
                .last_verb_execution_time()
                .ok()
                .flatten()
                .and_then(|raw| raw.to_local_naive());
            if at_or_after(time, baseline) {
                return true;
            }
        }
    }

    let Ok(Some(PropertyValue::Int(verb))) = item.property(PR_LAST_VERB_EXECUTED) else {
        return false;
    };
    if !LAST_VERB_REPLY_CODES.contains(&verb) {
        return false;
    }
    let time = match item.property(PR_LAST_VERB_EXECUTION_TIME) {
        Ok(Some(PropertyValue::Time(raw))) => raw.to_local_naive(),
        Ok(Some(PropertyValue::Text(text))) => parse_datetime_string(&text),
        Ok(Some(PropertyValue::Int(_))) | Ok(None) => None,
        Err(_) => return false,
    };
    at_or_after(time, baseline)
}

/// Normalized addresses the mailbox owner is known by.
pub fn collect_user_addresses(session: &Session<'_>) -> BTreeSet<String> {
    let identities = match session.call("read user identities", |store| store.user_identities()) {
        Ok(identities) => identities,
        Err(e) => {
            debug!(error = %e, "User identities unavailable");
            Vec::new()
        }
    };
    let addresses: BTreeSet<String> = identities
        .iter()
        .filter_map(|identity| normalize_email_address(identity))
        .collect();
    if addresses.is_empty() {
        debug!("No user address detected");
    } else {
        debug!(count = addresses.len(), "User addresses detected");
    }
    addresses
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;
    use crate::store::MailStore;
    use chrono::NaiveDate;

    fn session(store: &MemoryStore) -> Session<'_> {
        let now = NaiveDate::from_ymd_opt(2025, 10, 10)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();
        Session::new(store).at(now)
    }

    fn owner() -> BTreeSet<String> {
        ["Me <ME@x.com>".to_string()].into_iter().collect()
    }

    fn record(store: &MemoryStore, id: &str) -> EmailRecord {
        let item = store.item_by_id(id).unwrap();
        crate::format::format_item(item.as_ref(), &Default::default()).unwrap()
    }

    fn query() -> ReplyQuery {
        ReplyQuery {
            conversation_limit: 15,
            lookback_days: 30,
            collect_related: true,
        }
    }

    fn mailbox(sent_items: &str, seed_extra: &str) -> MemoryStore {
        let json = format!(
            r#"{{
            "identities": ["me@x.com"],
            "default_folders": {{ "inbox": "inbox", "sent_items": "sent" }},
            "folders": [ {{ "id": "root", "name": "me", "children": [
                {{ "id": "inbox", "name": "Inbox", "items": [
                    {{ "id": "seed", "conversation_id": "C1", "sender_email": "boss@x.com",
                       "received": "2025-10-09T09:00:00" {seed_extra} }}
                ] }},
                {{ "id": "sent", "name": "Sent Items", "items": [ {sent_items} ] }}
            ] }} ]
        }}"#
        );
        MemoryStore::from_json_str(&json).unwrap()
    }

    #[test]
    fn test_later_note_from_owner_is_a_reply() {
        let store = mailbox(
            r#"{ "id": "r1", "conversation_id": "C1", "sender_email": "me@x.com",
                 "message_class": "IPM.Note", "received": "2025-10-09T10:00:00" }"#,
            "",
        );
        let session = session(&store);
        let evidence = has_user_reply_with_context(&session, &record(&store, "seed"), &owner(), &query());
        assert!(evidence.replied);
        assert!(evidence.related.is_none());
        assert!(evidence.item.is_none());
    }

    #[test]
    fn test_meeting_response_is_not_a_reply() {
        let store = mailbox(
            r#"{ "id": "r1", "conversation_id": "C1", "sender_email": "me@x.com",
                 "message_class": "IPM.Schedule.Meeting.Resp.Pos",
                 "received": "2025-10-09T10:00:00" }"#,
            "",
        );
        let session = session(&store);
        let evidence = has_user_reply_with_context(&session, &record(&store, "seed"), &owner(), &query());
        assert!(!evidence.replied);
        assert_eq!(evidence.related.as_ref().map(Vec::len), Some(1));
        assert!(evidence.item.is_some());
    }

    #[test]
    fn test_earlier_owner_message_is_not_a_reply() {
        let store = mailbox(
            r#"{ "id": "r0", "conversation_id": "C1", "sender_email": "me@x.com",
                 "received": "2025-10-08T10:00:00" }"#,
            "",
        );
        let session = session(&store);
        assert!(!has_user_reply(&session, &record(&store, "seed"), &owner(), 15, 30));
    }

    #[test]
    fn test_without_owner_addresses_only_last_verb_counts() {
        let store = mailbox(
            r#"{ "id": "r1", "conversation_id": "C1", "sender_email": "me@x.com",
                 "received": "2025-10-09T10:00:00" }"#,
            "",
        );
        let session = session(&store);
        let evidence =
            has_user_reply_with_context(&session, &record(&store, "seed"), &BTreeSet::new(), &query());
        assert!(!evidence.replied);
        assert!(evidence.related.is_none());
    }

    #[test]
    fn test_last_verb_direct_property() {
        let store = mailbox(
            "",
            r#", "last_verb": 103, "last_verb_time": "2025-10-09T09:30:00""#,
        );
        let session = session(&store);
        assert!(has_user_reply(&session, &record(&store, "seed"), &owner(), 15, 30));
    }

    #[test]
    fn test_last_verb_before_baseline_is_ignored() {
        let store = mailbox(
            "",
            r#", "last_verb": 102, "last_verb_time": "2025-10-01T09:30:00""#,
        );
        let session = session(&store);
        assert!(!has_user_reply(&session, &record(&store, "seed"), &owner(), 15, 30));
    }

    #[test]
    fn test_last_verb_forward_code_is_ignored() {
        let store = mailbox("", r#", "last_verb": 104"#);
        let session = session(&store);
        assert!(!has_user_reply(&session, &record(&store, "seed"), &owner(), 15, 30));
    }

    #[test]
    fn test_last_verb_raw_property_fallback() {
        let extra = format!(
            r#", "properties": {{ "{PR_LAST_VERB_EXECUTED}": 102, "{PR_LAST_VERB_EXECUTION_TIME}": "2025-10-09T11:00:00" }}"#
        );
        let store = mailbox("", &extra);
        let session = session(&store);
        assert!(has_user_reply(&session, &record(&store, "seed"), &BTreeSet::new(), 15, 30));
    }

    #[test]
    fn test_missing_item_is_no_evidence() {
        let store = mailbox("", "");
        let session = session(&store);
        let ghost = EmailRecord::with_id("ghost");
        let evidence = has_user_reply_with_context(&session, &ghost, &owner(), &query());
        assert!(!evidence.replied);
        assert!(evidence.item.is_none());
    }

    #[test]
    fn test_collect_user_addresses_normalizes() {
        let store = MemoryStore::from_json_str(
            r#"{ "identities": ["Me <ME@x.com>", "SMTP:me@x.com", "Other@Y.com", ""] }"#,
        )
        .unwrap();
        let session = Session::new(&store);
        let addresses: Vec<String> = collect_user_addresses(&session).into_iter().collect();
        assert_eq!(addresses, vec!["me@x.com".to_string(), "other@y.com".to_string()]);
    }

    #[test]
    fn test_at_or_after_unknowns() {
        let t = NaiveDate::from_ymd_opt(2025, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        assert!(at_or_after(None, Some(t)));
        assert!(at_or_after(Some(t), None));
        assert!(at_or_after(Some(t), Some(t)));
        assert!(!at_or_after(Some(t), Some(t + chrono::Duration::seconds(1))));
    }
}
