//! `replyscan`: conversation correlation and pending-reply inference.
//!
//! This crate finds recent messages across mailbox folders, groups them by
//! conversation, decides whether the mailbox owner already answered, and
//! lists what is still waiting for a reply. All store access goes through
//! the [`store::MailStore`] seam and the retrying [`gateway::Gateway`].

pub mod cache;
pub mod config;
pub mod conversation;
pub mod error;
pub mod folders;
pub mod format;
pub mod gateway;
pub mod model;
pub mod pending;
pub mod reply;
pub mod scan;
pub mod search;
pub mod session;
pub mod store;
