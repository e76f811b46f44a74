//! The seam between replyscan and the external mail store.
//!
//! The store is a stateful, session-bound automation interface: every
//! property read may fail, filtering support varies per folder, and nothing
//! is transactional. [`MailStore`] and [`RawItem`] describe the handful of
//! calls the engine needs; [`memory::MemoryStore`] implements them over a
//! JSON mailbox snapshot.

pub mod memory;

use chrono::{DateTime, FixedOffset, Local, NaiveDateTime};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::folders::normalize_folder_path;
use crate::model::time::parse_datetime_string;

/// Raw failure reported by the store. Only the message text is meaningful.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct StoreError {
    pub message: String,
}

impl StoreError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Convenience alias for `Result<T, StoreError>`.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Well-known folders every mailbox exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefaultFolder {
    Inbox,
    SentItems,
    Drafts,
    Calendar,
    Tasks,
}

/// Kind of item a folder holds by default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    Mail,
    Calendar,
    Contacts,
    Tasks,
    Journal,
    Notes,
    Posts,
}

impl ItemKind {
    pub fn label(self) -> &'static str {
        match self {
            Self::Mail => "Mail",
            Self::Calendar => "Calendar",
            Self::Contacts => "Contacts",
            Self::Tasks => "Tasks",
            Self::Journal => "Journal",
            Self::Notes => "Notes",
            Self::Posts => "Posts",
        }
    }
}

/// Handle to a folder, with the metadata cached at lookup time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FolderRef {
    /// Store identity of the folder, when the store exposes one.
    pub entry_id: Option<String>,
    /// Display name.
    pub name: String,
    /// Full hierarchical path as reported by the store (e.g. `\\account\Inbox`).
    pub path: Option<String>,
    pub default_item_kind: Option<ItemKind>,
    pub unread_count: Option<u32>,
    pub total_count: Option<u32>,
    pub child_count: Option<u32>,
}

impl FolderRef {
    /// Key used to avoid visiting the same folder twice: entry id, else path, else name.
    pub fn identity_key(&self) -> String {
        self.entry_id
            .as_deref()
            .or(self.path.as_deref())
            .unwrap_or(&self.name)
            .to_lowercase()
    }

    /// Key used to deduplicate folders by location: normalized lowercase
    /// path, else identity.
    pub fn path_key(&self) -> String {
        match self.path.as_deref().and_then(normalize_folder_path) {
            Some(path) => path.to_lowercase(),
            None => self.identity_key(),
        }
    }

    /// Whether the folder can hold mail. Folders with unknown kind are accepted.
    pub fn holds_mail(&self) -> bool {
        matches!(self.default_item_kind, None | Some(ItemKind::Mail))
    }
}

/// A timestamp exactly as the store handed it over.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawTimestamp {
    /// Naive value, already in local time.
    Local(NaiveDateTime),
    /// Value with an explicit offset.
    Zoned(DateTime<FixedOffset>),
    /// Untyped value; only its text is known.
    Text(String),
}

impl RawTimestamp {
    /// Classify a textual timestamp: RFC 3339 with offset, naive ISO, or opaque text.
    pub fn parse(text: &str) -> Self {
        let trimmed = text.trim();
        if let Ok(zoned) = DateTime::parse_from_rfc3339(trimmed) {
            return Self::Zoned(zoned);
        }
        for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
            if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, fmt) {
                return Self::Local(naive);
            }
        }
        Self::Text(text.to_string())
    }

    /// Normalize to naive local time, dropping any zone after conversion.
    pub fn to_local_naive(&self) -> Option<NaiveDateTime> {
        match self {
            Self::Local(naive) => Some(*naive),
            Self::Zoned(zoned) => Some(zoned.with_timezone(&Local).naive_local()),
            Self::Text(text) => parse_datetime_string(text),
        }
    }

    /// Text form used when the value cannot be interpreted as a date.
    pub fn raw_text(&self) -> String {
        match self {
            Self::Local(naive) => naive.to_string(),
            Self::Zoned(zoned) => zoned.to_rfc3339(),
            Self::Text(text) => text.clone(),
        }
    }
}

/// Value returned by the raw property accessor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyValue {
    Int(i64),
    Time(RawTimestamp),
    Text(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RecipientKind {
    #[default]
    To,
    Cc,
    Bcc,
}

/// One recipient line of an item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecipient {
    pub name: Option<String>,
    pub address: Option<String>,
    pub kind: RecipientKind,
}

/// Field an enumeration is sorted by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    ReceivedTime,
    SentOn,
    LastModificationTime,
}

/// Sort applied to a folder enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ItemSort {
    pub field: SortField,
    pub descending: bool,
}

impl ItemSort {
    /// Newest received item first, the order every scan relies on.
    pub const NEWEST_RECEIVED: Self = Self {
        field: SortField::ReceivedTime,
        descending: true,
    };
}

/// Server-side filter. Stores may refuse it; callers must fall back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Restriction {
    ConversationId(String),
}

/// Lazily enumerated items of one folder.
pub type ItemCursor<'a> = Box<dyn Iterator<Item = StoreResult<Box<dyn RawItem + 'a>>> + 'a>;

/// One item as exposed by the store. Any getter may fail or return nothing.
///
/// Only the formatter (and the reply engine for last-verb metadata) reads
/// these directly; everything else works on [`crate::model::EmailRecord`].
pub trait RawItem {
    fn entry_id(&self) -> StoreResult<Option<String>>;
    fn subject(&self) -> StoreResult<Option<String>>;
    fn sender_name(&self) -> StoreResult<Option<String>>;
    fn sender_email_address(&self) -> StoreResult<Option<String>>;
    fn body(&self) -> StoreResult<Option<String>>;
    fn received_time(&self) -> StoreResult<Option<RawTimestamp>>;

    fn conversation_id(&self) -> StoreResult<Option<String>> {
        Ok(None)
    }
    fn recipients(&self) -> StoreResult<Vec<RawRecipient>> {
        Ok(Vec::new())
    }
    fn sent_on(&self) -> StoreResult<Option<RawTimestamp>> {
        Ok(None)
    }
    fn last_modification_time(&self) -> StoreResult<Option<RawTimestamp>> {
        Ok(None)
    }
    fn unread(&self) -> StoreResult<Option<bool>> {
        Ok(None)
    }
    /// Raw importance code: 0 low, 1 normal, 2 high.
    fn importance(&self) -> StoreResult<Option<i64>> {
        Ok(None)
    }
    fn categories(&self) -> StoreResult<Option<String>> {
        Ok(None)
    }
    fn attachment_count(&self) -> StoreResult<Option<usize>> {
        Ok(None)
    }
    /// File name of the attachment at zero-based `index`.
    fn attachment_name(&self, _index: usize) -> StoreResult<Option<String>> {
        Ok(None)
    }
    fn message_class(&self) -> StoreResult<Option<String>> {
        Ok(None)
    }
    fn parent_folder(&self) -> StoreResult<Option<FolderRef>> {
        Ok(None)
    }
    fn last_verb_executed(&self) -> StoreResult<Option<i64>> {
        Ok(None)
    }
    fn last_verb_execution_time(&self) -> StoreResult<Option<RawTimestamp>> {
        Ok(None)
    }
    /// Raw property accessor keyed by schema tag.
    fn property(&self, _tag: &str) -> StoreResult<Option<PropertyValue>> {
        Ok(None)
    }
}

/// The calls the engine makes against a mailbox.
pub trait MailStore {
    fn default_folder(&self, kind: DefaultFolder) -> StoreResult<FolderRef>;
    fn folder_by_id(&self, entry_id: &str) -> StoreResult<Option<FolderRef>>;
    fn root_folders(&self) -> StoreResult<Vec<FolderRef>>;
    fn child_folders(&self, folder: &FolderRef) -> StoreResult<Vec<FolderRef>>;
    fn item_by_id<'a>(&'a self, entry_id: &str) -> StoreResult<Box<dyn RawItem + 'a>>;
    fn items<'a>(&'a self, folder: &FolderRef, sort: ItemSort) -> StoreResult<ItemCursor<'a>>;
    fn restrict<'a>(
        &'a self,
        folder: &FolderRef,
        sort: ItemSort,
        restriction: &Restriction,
    ) -> StoreResult<ItemCursor<'a>>;

    /// Addresses and names the mailbox owner is known by.
    fn user_identities(&self) -> StoreResult<Vec<String>> {
        Ok(Vec::new())
    }
}
