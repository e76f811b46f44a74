//! Multi-folder aggregation with deduplication and budgets.

use std::collections::HashSet;

use tracing::{debug, info};

use super::budget::{AggregateEvent, ScanBudget, ScanState};
use super::folder::{emails_from_folder, FolderQuery};
use crate::model::EmailRecord;
use crate::search::SearchTerms;
use crate::session::Session;
use crate::store::FolderRef;

/// Records from `folders` merged into one newest-first list.
///
/// Folders are read in order under a [`ScanBudget`] sized for the folder
/// count. A record id seen in an earlier folder wins over later copies.
/// Merging stops as soon as `target_total` distinct records exist; the
/// total budget is checked each time a folder finishes.
pub fn collect_emails_across_folders(
    session: &Session<'_>,
    folders: &[FolderRef],
    days: u32,
    search_term: Option<&str>,
    target_total: Option<usize>,
) -> Vec<EmailRecord> {
    let terms = search_term.and_then(SearchTerms::parse);
    let budget = ScanBudget::for_folders(folders.len(), terms.is_some(), target_total, session.scan());
    collect_with_budget(session, folders, days, terms.as_ref(), &budget)
}

/// Aggregation under an explicit budget.
pub fn collect_with_budget(
    session: &Session<'_>,
    folders: &[FolderRef],
    days: u32,
    terms: Option<&SearchTerms>,
    budget: &ScanBudget,
) -> Vec<EmailRecord> {
    let mut records: Vec<EmailRecord> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    let mut taken = 0usize;
    let mut state = ScanState::Scanning;

    for folder in folders {
        if !state.is_scanning() {
            break;
        }
        let query = FolderQuery {
            days,
            search: terms,
            limit: budget.max_items_per_container,
        };
        let scan = emails_from_folder(session, folder, &query);
        taken += scan.records.len();

        for record in scan.records {
            if record.id.is_empty() || !seen.insert(record.id.clone()) {
                continue;
            }
            records.push(record);
            state = budget.step(state, AggregateEvent::Merged { distinct: records.len() });
            if !state.is_scanning() {
                break;
            }
        }
        state = budget.step(state, AggregateEvent::FolderDone { taken });
        debug!(folder = %folder.name, taken, distinct = records.len(), ?state, "Folder merged");
    }

    records.sort_by(|a, b| b.received_sort_key().cmp(a.received_sort_key()));
    info!(
        total = records.len(),
        folders = folders.len(),
        per_folder = budget.max_items_per_container,
        target = ?budget.target_total,
        ?state,
        "Collected emails across folders"
    );
    records
}
