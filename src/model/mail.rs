//! The immutable email snapshot every component passes around.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::address::normalize_email_address;
use super::time::parse_datetime_string;

/// Importance flag reported by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Importance {
    Low,
    #[default]
    Normal,
    High,
}

impl Importance {
    /// Map the store's raw code (0, 1, 2). Unknown codes read as normal.
    pub fn from_code(code: i64) -> Self {
        match code {
            0 => Self::Low,
            2 => Self::High,
            _ => Self::Normal,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Low => "Low",
            Self::Normal => "Normal",
            Self::High => "High",
        }
    }
}

/// A timestamp in both of its stored renderings.
///
/// When the store returns something that is not a date, both fields hold
/// its raw text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordTime {
    /// `2025-10-10 09:00:00`
    pub display: String,
    /// `2025-10-10T09:00:00`
    pub iso: String,
}

/// Snapshot of one message taken by the formatter.
///
/// `id` is never empty. Every other field degrades to an empty or default
/// value when the store could not provide it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailRecord {
    /// Opaque store handle, used to re-fetch the live item.
    pub id: String,
    /// Conversation grouping key.
    pub conversation_id: Option<String>,
    pub subject: String,
    /// Sender display name.
    pub sender: String,
    /// Sender address as reported (may be non-SMTP).
    pub sender_email: String,
    /// `To:` recipients rendered as `Name <address>`.
    pub to_recipients: Vec<String>,
    pub cc_recipients: Vec<String>,
    pub bcc_recipients: Vec<String>,
    pub body: String,
    /// Whitespace-collapsed, truncated body.
    pub preview: String,
    pub received: Option<RecordTime>,
    pub sent: Option<RecordTime>,
    pub last_modified: Option<RecordTime>,
    pub unread: bool,
    pub importance: Importance,
    /// Semicolon-joined category names, preserved as-is.
    pub categories: String,
    pub has_attachments: bool,
    pub attachment_count: usize,
    /// Sample of attachment names, with a `... (+N more)` marker when cut.
    pub attachment_names: Vec<String>,
    /// Path of the folder holding the item.
    pub folder_path: String,
    /// Item class (`IPM.Note`, `IPM.Schedule.Meeting.Resp.Pos`, ...).
    pub message_class: String,
}

impl EmailRecord {
    /// A record with only its id set. Useful as a starting point in tests.
    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            conversation_id: None,
            subject: String::new(),
            sender: String::new(),
            sender_email: String::new(),
            to_recipients: Vec::new(),
            cc_recipients: Vec::new(),
            bcc_recipients: Vec::new(),
            body: String::new(),
            preview: String::new(),
            received: None,
            sent: None,
            last_modified: None,
            unread: false,
            importance: Importance::Normal,
            categories: String::new(),
            has_attachments: false,
            attachment_count: 0,
            attachment_names: Vec::new(),
            folder_path: String::new(),
            message_class: String::new(),
        }
    }

    /// All recipients: to, then cc, then bcc.
    pub fn recipients(&self) -> impl Iterator<Item = &String> {
        self.to_recipients
            .iter()
            .chain(&self.cc_recipients)
            .chain(&self.bcc_recipients)
    }

    /// Most relevant point in time for this record.
    ///
    /// Tries the ISO renderings (received, sent, modified) first, then the
    /// display renderings in the same order.
    pub fn best_timestamp(&self) -> Option<NaiveDateTime> {
        let slots = [&self.received, &self.sent, &self.last_modified];
        slots
            .iter()
            .filter_map(|slot| slot.as_ref())
            .find_map(|t| parse_datetime_string(&t.iso))
            .or_else(|| {
                slots
                    .iter()
                    .filter_map(|slot| slot.as_ref())
                    .find_map(|t| parse_datetime_string(&t.display))
            })
    }

    /// Key for newest-first listings: received ISO, else received display, else empty.
    pub fn received_sort_key(&self) -> &str {
        self.received
            .as_ref()
            .map(|t| if t.iso.is_empty() { t.display.as_str() } else { t.iso.as_str() })
            .unwrap_or("")
    }

    /// Normalized sender address, falling back to the display name.
    pub fn sender_address(&self) -> Option<String> {
        normalize_email_address(&self.sender_email).or_else(|| normalize_email_address(&self.sender))
    }

    /// `true` for plain notes, and for records whose class is unknown.
    ///
    /// Meeting requests/responses, task requests and receipts are not notes.
    pub fn is_note(&self) -> bool {
        let class = self.message_class.trim().to_lowercase();
        class.is_empty() || class.starts_with("ipm.note")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn time(display: &str, iso: &str) -> Option<RecordTime> {
        Some(RecordTime {
            display: display.to_string(),
            iso: iso.to_string(),
        })
    }

    #[test]
    fn test_best_timestamp_prefers_received_iso() {
        let mut record = EmailRecord::with_id("a");
        record.received = time("2025-10-10 09:00:00", "2025-10-10T09:00:00");
        record.sent = time("2025-10-09 08:00:00", "2025-10-09T08:00:00");
        assert_eq!(
            record.best_timestamp(),
            NaiveDate::from_ymd_opt(2025, 10, 10)
                .unwrap()
                .and_hms_opt(9, 0, 0)
        );
    }

    #[test]
    fn test_best_timestamp_falls_back_to_sent_then_display() {
        let mut record = EmailRecord::with_id("a");
        record.received = time("garbage", "garbage");
        record.sent = time("2025-10-09 08:00:00", "2025-10-09T08:00:00");
        assert_eq!(
            record.best_timestamp(),
            NaiveDate::from_ymd_opt(2025, 10, 9).unwrap().and_hms_opt(8, 0, 0)
        );

        let mut display_only = EmailRecord::with_id("b");
        display_only.last_modified = time("2025-10-08 07:00", "");
        assert_eq!(
            display_only.best_timestamp(),
            NaiveDate::from_ymd_opt(2025, 10, 8).unwrap().and_hms_opt(7, 0, 0)
        );
        assert_eq!(EmailRecord::with_id("c").best_timestamp(), None);
    }

    #[test]
    fn test_is_note() {
        let mut record = EmailRecord::with_id("a");
        assert!(record.is_note());
        record.message_class = "IPM.Note.SMIME".to_string();
        assert!(record.is_note());
        record.message_class = "IPM.Schedule.Meeting.Resp.Pos".to_string();
        assert!(!record.is_note());
    }

    #[test]
    fn test_sender_address_fallback() {
        let mut record = EmailRecord::with_id("a");
        record.sender = "Me <me@x.com>".to_string();
        assert_eq!(record.sender_address(), Some("me@x.com".to_string()));
        record.sender_email = "SMTP:Other@Y.com".to_string();
        assert_eq!(record.sender_address(), Some("other@y.com".to_string()));
    }

    #[test]
    fn test_importance_codes() {
        assert_eq!(Importance::from_code(0), Importance::Low);
        assert_eq!(Importance::from_code(2), Importance::High);
        assert_eq!(Importance::from_code(7), Importance::Normal);
        assert_eq!(Importance::from_code(2).label(), "High");
    }
}
