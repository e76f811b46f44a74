//! In-memory mailbox backed by a JSON snapshot.
//!
//! Mirrors the quirks of a real automation store closely enough to drive
//! the engine end to end: folders can refuse server-side restriction or
//! deny access to their children, items can go stale so that every read
//! fails, and lookups can be made to fail on demand.
//!
//! Snapshot layout:
//!
//! ```json
//! {
//!   "identities": ["me@example.com"],
//!   "default_folders": { "inbox": "inbox", "sent_items": "sent" },
//!   "folders": [
//!     { "id": "root", "name": "me@example.com", "children": [
//!       { "id": "inbox", "name": "Inbox", "items": [
//!         { "id": "m1", "subject": "Hi", "received": "2025-10-10T09:00:00" }
//!       ] }
//!     ] }
//!   ]
//! }
//! ```

use std::cell::{Cell, RefCell};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use chrono::NaiveDateTime;
use serde::Deserialize;
use tracing::{debug, info};

use super::{
    DefaultFolder, FolderRef, ItemCursor, ItemKind, ItemSort, MailStore, PropertyValue, RawItem,
    RawRecipient, RawTimestamp, RecipientKind, Restriction, SortField, StoreError, StoreResult,
};
use crate::error::{ReplyScanError, Result};

/// Message the store reports for a vanished item.
const NOT_FOUND_MESSAGE: &str = "The object could not be found.";

// ── Snapshot format ─────────────────────────────────────────────

/// Whole mailbox as read from JSON.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MailboxSnapshot {
    /// Addresses and names of the mailbox owner.
    pub identities: Vec<String>,
    /// Well-known folder kind to folder id.
    pub default_folders: HashMap<DefaultFolder, String>,
    /// Top-level folders (store roots).
    pub folders: Vec<FolderSnapshot>,
}

/// One folder and its subtree.
#[derive(Debug, Clone, Deserialize)]
pub struct FolderSnapshot {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub item_kind: Option<ItemKind>,
    /// When false, restriction by conversation fails and callers must enumerate.
    #[serde(default = "default_true")]
    pub restrict_supported: bool,
    /// When true, listing children fails with an access error.
    #[serde(default)]
    pub inaccessible: bool,
    #[serde(default)]
    pub children: Vec<FolderSnapshot>,
    #[serde(default)]
    pub items: Vec<ItemSnapshot>,
}

fn default_true() -> bool {
    true
}

/// One stored item. Timestamps are text and are classified on read.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ItemSnapshot {
    pub id: String,
    pub conversation_id: Option<String>,
    pub subject: Option<String>,
    pub sender_name: Option<String>,
    pub sender_email: Option<String>,
    pub recipients: Vec<RecipientSnapshot>,
    pub body: Option<String>,
    pub received: Option<String>,
    pub sent_on: Option<String>,
    pub modified: Option<String>,
    pub unread: Option<bool>,
    pub importance: Option<i64>,
    pub categories: Option<String>,
    pub attachments: Vec<String>,
    pub message_class: Option<String>,
    pub last_verb: Option<i64>,
    pub last_verb_time: Option<String>,
    /// Raw properties keyed by schema tag.
    pub properties: BTreeMap<String, serde_json::Value>,
    /// Every read of a stale item fails as if it had been deleted.
    pub stale: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RecipientSnapshot {
    pub name: Option<String>,
    pub address: Option<String>,
    pub kind: RecipientKind,
}

// ── Store ───────────────────────────────────────────────────────

#[derive(Debug)]
struct FolderEntry {
    folder: FolderRef,
    children: Vec<usize>,
    restrict_supported: bool,
    inaccessible: bool,
    items: Vec<ItemSnapshot>,
}

/// [`MailStore`] over a decoded [`MailboxSnapshot`].
///
/// Not `Sync`: counters and failure injection use interior mutability, in
/// line with the single-threaded store it stands in for.
#[derive(Debug)]
pub struct MemoryStore {
    identities: Vec<String>,
    defaults: HashMap<DefaultFolder, usize>,
    folders: Vec<FolderEntry>,
    roots: Vec<usize>,
    folder_index: HashMap<String, usize>,
    item_index: HashMap<String, (usize, usize)>,
    items_served: Cell<usize>,
    failures_left: Cell<usize>,
    failure_message: RefCell<String>,
}

impl MemoryStore {
    /// Read and decode a snapshot file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| ReplyScanError::io(path, e))?;
        let store = Self::from_json_str(&contents)?;
        info!(
            path = %path.display(),
            folders = store.folders.len(),
            items = store.item_index.len(),
            "Loaded mailbox snapshot"
        );
        Ok(store)
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let snapshot: MailboxSnapshot =
            serde_json::from_str(json).map_err(|e| ReplyScanError::Snapshot(e.to_string()))?;
        Self::from_snapshot(snapshot)
    }

    /// Flatten the folder tree and index it. Folder ids must be unique and
    /// default folders must point at existing folders.
    pub fn from_snapshot(snapshot: MailboxSnapshot) -> Result<Self> {
        let mut store = Self {
            identities: snapshot.identities,
            defaults: HashMap::new(),
            folders: Vec::new(),
            roots: Vec::new(),
            folder_index: HashMap::new(),
            item_index: HashMap::new(),
            items_served: Cell::new(0),
            failures_left: Cell::new(0),
            failure_message: RefCell::new(String::new()),
        };

        for root in snapshot.folders {
            let index = store.insert_folder(root, None)?;
            store.roots.push(index);
        }

        for (kind, id) in snapshot.default_folders {
            let index = *store.folder_index.get(&id).ok_or_else(|| {
                ReplyScanError::Snapshot(format!("default folder {kind:?} points at unknown id '{id}'"))
            })?;
            store.defaults.insert(kind, index);
        }
        Ok(store)
    }

    fn insert_folder(&mut self, snapshot: FolderSnapshot, parent_path: Option<&str>) -> Result<usize> {
        if self.folder_index.contains_key(&snapshot.id) {
            return Err(ReplyScanError::Snapshot(format!(
                "duplicate folder id '{}'",
                snapshot.id
            )));
        }
        let path = match parent_path {
            Some(parent) => format!("{parent}\\{}", snapshot.name),
            None => format!("\\\\{}", snapshot.name),
        };
        let index = self.folders.len();
        let unread = snapshot
            .items
            .iter()
            .filter(|item| item.unread.unwrap_or(false))
            .count();
        self.folders.push(FolderEntry {
            folder: FolderRef {
                entry_id: Some(snapshot.id.clone()),
                name: snapshot.name,
                path: Some(path.clone()),
                default_item_kind: snapshot.item_kind,
                unread_count: Some(unread as u32),
                total_count: Some(snapshot.items.len() as u32),
                child_count: Some(snapshot.children.len() as u32),
            },
            children: Vec::new(),
            restrict_supported: snapshot.restrict_supported,
            inaccessible: snapshot.inaccessible,
            items: Vec::new(),
        });
        self.folder_index.insert(snapshot.id, index);

        for (position, item) in snapshot.items.iter().enumerate() {
            if !item.id.is_empty() {
                // The same item may be linked from several folders; the first wins.
                self.item_index
                    .entry(item.id.clone())
                    .or_insert((index, position));
            }
        }
        self.folders[index].items = snapshot.items;

        let mut children = Vec::with_capacity(snapshot.children.len());
        for child in snapshot.children {
            children.push(self.insert_folder(child, Some(&path))?);
        }
        self.folders[index].children = children;
        Ok(index)
    }

    /// Items handed out by enumerations so far.
    pub fn items_served(&self) -> usize {
        self.items_served.get()
    }

    /// Make the next `count` item and folder lookups fail with `message`.
    pub fn fail_next_lookups(&self, count: usize, message: impl Into<String>) {
        self.failures_left.set(count);
        *self.failure_message.borrow_mut() = message.into();
    }

    fn injected_failure(&self) -> StoreResult<()> {
        let left = self.failures_left.get();
        if left == 0 {
            return Ok(());
        }
        self.failures_left.set(left - 1);
        Err(StoreError::new(self.failure_message.borrow().clone()))
    }

    fn index_of(&self, folder: &FolderRef) -> StoreResult<usize> {
        folder
            .entry_id
            .as_deref()
            .and_then(|id| self.folder_index.get(id))
            .copied()
            .ok_or_else(|| StoreError::new(format!("Folder '{}' does not exist", folder.name)))
    }

    fn cursor<'a>(
        &'a self,
        folder_index: usize,
        sort: ItemSort,
        filter: impl Fn(&ItemSnapshot) -> bool,
    ) -> ItemCursor<'a> {
        let entry = &self.folders[folder_index];
        let mut order: Vec<(usize, Option<NaiveDateTime>)> = entry
            .items
            .iter()
            .enumerate()
            .filter(|(_, item)| filter(item))
            .map(|(position, item)| (position, sort_value(item, sort.field)))
            .collect();
        order.sort_by(|(_, a), (_, b)| compare_sort_values(*a, *b, sort.descending));

        let served = &self.items_served;
        Box::new(order.into_iter().map(move |(position, _)| {
            served.set(served.get() + 1);
            Ok(Box::new(MemoryItem {
                folder: &entry.folder,
                data: &entry.items[position],
            }) as Box<dyn RawItem + 'a>)
        }))
    }
}

fn sort_value(item: &ItemSnapshot, field: SortField) -> Option<NaiveDateTime> {
    let raw = match field {
        SortField::ReceivedTime => &item.received,
        SortField::SentOn => &item.sent_on,
        SortField::LastModificationTime => &item.modified,
    };
    raw.as_deref()
        .and_then(|text| RawTimestamp::parse(text).to_local_naive())
}

/// Known values in the requested order, unknown ones last either way.
fn compare_sort_values(
    a: Option<NaiveDateTime>,
    b: Option<NaiveDateTime>,
    descending: bool,
) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) if descending => b.cmp(&a),
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

impl MailStore for MemoryStore {
    fn default_folder(&self, kind: DefaultFolder) -> StoreResult<FolderRef> {
        self.injected_failure()?;
        self.defaults
            .get(&kind)
            .map(|&index| self.folders[index].folder.clone())
            .ok_or_else(|| StoreError::new(format!("Default folder {kind:?} does not exist")))
    }

    fn folder_by_id(&self, entry_id: &str) -> StoreResult<Option<FolderRef>> {
        self.injected_failure()?;
        Ok(self
            .folder_index
            .get(entry_id)
            .map(|&index| self.folders[index].folder.clone()))
    }

    fn root_folders(&self) -> StoreResult<Vec<FolderRef>> {
        self.injected_failure()?;
        Ok(self
            .roots
            .iter()
            .map(|&index| self.folders[index].folder.clone())
            .collect())
    }

    fn child_folders(&self, folder: &FolderRef) -> StoreResult<Vec<FolderRef>> {
        self.injected_failure()?;
        let entry = &self.folders[self.index_of(folder)?];
        if entry.inaccessible {
            return Err(StoreError::new("Access denied"));
        }
        Ok(entry
            .children
            .iter()
            .map(|&index| self.folders[index].folder.clone())
            .collect())
    }

    fn item_by_id<'a>(&'a self, entry_id: &str) -> StoreResult<Box<dyn RawItem + 'a>> {
        self.injected_failure()?;
        let &(folder, position) = self
            .item_index
            .get(entry_id)
            .ok_or_else(|| StoreError::new(NOT_FOUND_MESSAGE))?;
        let entry = &self.folders[folder];
        Ok(Box::new(MemoryItem {
            folder: &entry.folder,
            data: &entry.items[position],
        }))
    }

    fn items<'a>(&'a self, folder: &FolderRef, sort: ItemSort) -> StoreResult<ItemCursor<'a>> {
        let index = self.index_of(folder)?;
        Ok(self.cursor(index, sort, |_| true))
    }

    fn restrict<'a>(
        &'a self,
        folder: &FolderRef,
        sort: ItemSort,
        restriction: &Restriction,
    ) -> StoreResult<ItemCursor<'a>> {
        let index = self.index_of(folder)?;
        if !self.folders[index].restrict_supported {
            debug!(folder = %folder.name, "Restriction refused");
            return Err(StoreError::new("Restrict is not supported for this folder"));
        }
        let Restriction::ConversationId(wanted) = restriction;
        let wanted = wanted.clone();
        Ok(self.cursor(index, sort, move |item| {
            item.conversation_id.as_deref() == Some(wanted.as_str())
        }))
    }

    fn user_identities(&self) -> StoreResult<Vec<String>> {
        Ok(self.identities.clone())
    }
}

// ── Items ───────────────────────────────────────────────────────

struct MemoryItem<'a> {
    folder: &'a FolderRef,
    data: &'a ItemSnapshot,
}

impl MemoryItem<'_> {
    fn read<T>(&self, get: impl FnOnce(&ItemSnapshot) -> Option<T>) -> StoreResult<Option<T>> {
        if self.data.stale {
            return Err(StoreError::new(NOT_FOUND_MESSAGE));
        }
        Ok(get(self.data))
    }
}

fn timestamp(text: &Option<String>) -> Option<RawTimestamp> {
    text.as_deref().map(RawTimestamp::parse)
}

fn property_value(value: &serde_json::Value) -> Option<PropertyValue> {
    match value {
        serde_json::Value::Number(n) => n.as_i64().map(PropertyValue::Int),
        serde_json::Value::String(s) => match RawTimestamp::parse(s) {
            RawTimestamp::Text(text) => Some(PropertyValue::Text(text)),
            parsed => Some(PropertyValue::Time(parsed)),
        },
        serde_json::Value::Bool(b) => Some(PropertyValue::Int(i64::from(*b))),
        _ => None,
    }
}

impl RawItem for MemoryItem<'_> {
    fn entry_id(&self) -> StoreResult<Option<String>> {
        self.read(|d| Some(d.id.clone()).filter(|id| !id.is_empty()))
    }

    fn subject(&self) -> StoreResult<Option<String>> {
        self.read(|d| d.subject.clone())
    }

    fn sender_name(&self) -> StoreResult<Option<String>> {
        self.read(|d| d.sender_name.clone())
    }

    fn sender_email_address(&self) -> StoreResult<Option<String>> {
        self.read(|d| d.sender_email.clone())
    }

    fn body(&self) -> StoreResult<Option<String>> {
        self.read(|d| d.body.clone())
    }

    fn received_time(&self) -> StoreResult<Option<RawTimestamp>> {
        self.read(|d| timestamp(&d.received))
    }

    fn conversation_id(&self) -> StoreResult<Option<String>> {
        self.read(|d| d.conversation_id.clone())
    }

    fn recipients(&self) -> StoreResult<Vec<RawRecipient>> {
        self.read(|d| {
            Some(
                d.recipients
                    .iter()
                    .map(|r| RawRecipient {
                        name: r.name.clone(),
                        address: r.address.clone(),
                        kind: r.kind,
                    })
                    .collect(),
            )
        })
        .map(Option::unwrap_or_default)
    }

    fn sent_on(&self) -> StoreResult<Option<RawTimestamp>> {
        self.read(|d| timestamp(&d.sent_on))
    }

    fn last_modification_time(&self) -> StoreResult<Option<RawTimestamp>> {
        self.read(|d| timestamp(&d.modified))
    }

    fn unread(&self) -> StoreResult<Option<bool>> {
        self.read(|d| d.unread)
    }

    fn importance(&self) -> StoreResult<Option<i64>> {
        self.read(|d| d.importance)
    }

    fn categories(&self) -> StoreResult<Option<String>> {
        self.read(|d| d.categories.clone())
    }

    fn attachment_count(&self) -> StoreResult<Option<usize>> {
        self.read(|d| Some(d.attachments.len()))
    }

    fn attachment_name(&self, index: usize) -> StoreResult<Option<String>> {
        self.read(|d| d.attachments.get(index).cloned())
    }

    fn message_class(&self) -> StoreResult<Option<String>> {
        self.read(|d| d.message_class.clone())
    }

    fn parent_folder(&self) -> StoreResult<Option<FolderRef>> {
        self.read(|_| Some(self.folder.clone()))
    }

    fn last_verb_executed(&self) -> StoreResult<Option<i64>> {
        self.read(|d| d.last_verb)
    }

    fn last_verb_execution_time(&self) -> StoreResult<Option<RawTimestamp>> {
        self.read(|d| timestamp(&d.last_verb_time))
    }

    fn property(&self, tag: &str) -> StoreResult<Option<PropertyValue>> {
        let value = self.read(|d| d.properties.get(tag).cloned())?;
        match value {
            Some(value) => Ok(property_value(&value)),
            None => Err(StoreError::new(format!("Property {tag} is unknown"))),
        }
    }
}
