//! Bounded retrieval of email records from one or many folders.
//!
//! [`folder`] reads one folder newest-first inside a time window,
//! [`aggregate`] merges several folders under a [`budget::ScanBudget`].

pub mod aggregate;
pub mod budget;
pub mod folder;

pub use aggregate::collect_emails_across_folders;
pub use budget::{AggregateEvent, PendingBudget, ScanBudget, ScanState};
pub use folder::{emails_from_folder, FolderQuery, FolderScan};
