//! Numbered listing cache.
//!
//! Every listing numbers its records from 1 so a caller can later refer to
//! "message #3". The cache is owned by the presentation layer and handed
//! to [`resolve_item_reference`] when such a number has to become a live
//! item again.

use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

use lru::LruCache;
use tracing::debug;

use crate::config::CacheConfig;
use crate::error::{ReplyScanError, Result};
use crate::model::EmailRecord;
use crate::session::Session;
use crate::store::RawItem;

/// Records of the last listing keyed by their 1-based position.
///
/// Bounded with least-recently-used eviction; entries older than the TTL
/// read as absent.
pub struct NumberedCache {
    entries: LruCache<usize, (Instant, EmailRecord)>,
    ttl: Option<Duration>,
}

impl NumberedCache {
    /// Cache holding at most `capacity` entries (at least one).
    pub fn new(capacity: usize, ttl: Option<Duration>) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: LruCache::new(capacity),
            ttl,
        }
    }

    /// A TTL of zero seconds disables expiry.
    pub fn from_config(config: &CacheConfig) -> Self {
        let ttl = (config.ttl_secs > 0).then(|| Duration::from_secs(config.ttl_secs));
        Self::new(config.max_entries, ttl)
    }

    /// Drop the previous listing and number `records` from 1.
    ///
    /// Returns how many records were numbered.
    pub fn replace_with(&mut self, records: impl IntoIterator<Item = EmailRecord>) -> usize {
        self.entries.clear();
        let now = Instant::now();
        let mut count = 0;
        for (index, record) in records.into_iter().enumerate() {
            self.entries.put(index + 1, (now, record));
            count += 1;
        }
        debug!(count, "Numbered listing cached");
        count
    }

    fn expired(&self, stored: Instant) -> bool {
        self.ttl.is_some_and(|ttl| stored.elapsed() >= ttl)
    }

    /// Record number `number`, if still cached and fresh.
    ///
    /// Reading leaves both recency order and expired entries untouched.
    pub fn peek(&self, number: usize) -> Option<&EmailRecord> {
        self.entries
            .peek(&number)
            .filter(|(at, _)| !self.expired(*at))
            .map(|(_, record)| record)
    }

    pub fn contains(&self, number: usize) -> bool {
        self.peek(number).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// How a caller points at a message: a listing number or a store id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemReference {
    Number(usize),
    Id(String),
}

impl ItemReference {
    /// Plain positive integers are listing numbers; anything else is an id.
    pub fn parse(text: &str) -> Self {
        let text = text.trim();
        match text.strip_prefix('#').unwrap_or(text).parse::<usize>() {
            Ok(number) if number > 0 => Self::Number(number),
            _ => Self::Id(text.to_string()),
        }
    }
}

/// Turn a reference into the cached record (when numbered) and the live item.
pub fn resolve_item_reference<'s>(
    session: &Session<'s>,
    cache: &NumberedCache,
    reference: &ItemReference,
) -> Result<(Option<EmailRecord>, Box<dyn RawItem + 's>)> {
    let (cached, id) = match reference {
        ItemReference::Number(number) => {
            let record = cache
                .peek(*number)
                .cloned()
                .ok_or(ReplyScanError::NotInListing(*number))?;
            let id = record.id.clone();
            (Some(record), id)
        }
        ItemReference::Id(id) => {
            if id.trim().is_empty() {
                return Err(ReplyScanError::invalid("id", "must not be empty"));
            }
            (None, id.clone())
        }
    };
    let item = session.call("fetch item", |store| store.item_by_id(&id))?;
    Ok((cached, item))
}
