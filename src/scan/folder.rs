//! Newest-first retrieval from a single folder.

use chrono::Duration;
use tracing::{debug, info, warn};

use crate::format::{format_item, searchable_fields};
use crate::model::EmailRecord;
use crate::search::SearchTerms;
use crate::session::Session;
use crate::store::{FolderRef, ItemSort};

/// What to read from one folder.
#[derive(Debug, Clone, Copy)]
pub struct FolderQuery<'q> {
    /// Window: items received more than `days` ago end the scan.
    pub days: u32,
    pub search: Option<&'q SearchTerms>,
    /// Records to accept at most; never above the configured per-folder maximum.
    pub limit: usize,
}

/// Records read from one folder.
#[derive(Debug, Clone, Default)]
pub struct FolderScan {
    pub records: Vec<EmailRecord>,
    /// Items enumerated, including skipped ones.
    pub scanned: usize,
}

/// Read records from `folder`, newest first, inside the query window.
///
/// Non-mail folders yield nothing. Items without a received time are
/// skipped; the first item older than the window ends the scan. Items that
/// fail to format are logged and skipped, and a folder that cannot be
/// enumerated yields nothing.
pub fn emails_from_folder(
    session: &Session<'_>,
    folder: &FolderRef,
    query: &FolderQuery<'_>,
) -> FolderScan {
    let mut scan = FolderScan::default();
    if !folder.holds_mail() {
        debug!(
            folder = %folder.name,
            kind = ?folder.default_item_kind,
            "Skipping non-mail folder"
        );
        return scan;
    }

    let limit = query.limit.min(session.scan().max_per_folder);
    if limit == 0 {
        return scan;
    }
    let threshold = session.now() - Duration::days(i64::from(query.days));
    let options = session.format_options();

    let cursor = match session.call("enumerate folder items", |store| {
        store.items(folder, ItemSort::NEWEST_RECEIVED)
    }) {
        Ok(cursor) => cursor,
        Err(e) => {
            warn!(folder = %folder.name, error = %e, "Cannot enumerate folder");
            return scan;
        }
    };
    info!(
        folder = %folder.name,
        days = query.days,
        searching = query.search.is_some(),
        "Collecting emails from folder"
    );

    for entry in cursor {
        scan.scanned += 1;
        let item = match entry {
            Ok(item) => item,
            Err(e) => {
                warn!(folder = %folder.name, error = %e, "Skipping unreadable item");
                continue;
            }
        };

        let received = match item.received_time() {
            Ok(Some(raw)) => raw.to_local_naive(),
            Ok(None) => None,
            Err(e) => {
                debug!(error = %e, "Received time unreadable");
                None
            }
        };
        let Some(received) = received else {
            continue;
        };
        if received < threshold {
            break;
        }

        if let Some(terms) = query.search {
            let fields = searchable_fields(item.as_ref());
            if !fields.is_empty() && !terms.matches_fields(&fields) {
                continue;
            }
        }

        let record = match format_item(item.as_ref(), &options) {
            Ok(record) => record,
            Err(e) => {
                warn!(folder = %folder.name, error = %e, "Skipping item");
                continue;
            }
        };
        if query.search.is_some_and(|terms| !terms.matches_record(&record)) {
            continue;
        }

        scan.records.push(record);
        if scan.records.len() >= limit {
            break;
        }
    }

    debug!(
        folder = %folder.name,
        accepted = scan.records.len(),
        scanned = scan.scanned,
        "Folder scan finished"
    );
    scan
}
