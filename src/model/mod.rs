//! Core data model types: email records, addresses, and timestamps.

pub mod address;
pub mod mail;
pub mod time;

pub use address::{normalize_email_address, EmailAddress};
pub use mail::{EmailRecord, Importance, RecordTime};
