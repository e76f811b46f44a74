//! Centralized error types for replyscan.

use std::path::PathBuf;
use thiserror::Error;

use crate::store::StoreError;

/// How a failed store call was classified by the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The store is busy (modal dialog, call rejected). Worth one more try.
    Transient,
    /// The item or folder disappeared or was moved.
    NotFound,
    /// Anything the gateway could not recognise.
    Unexpected,
}

impl ErrorKind {
    /// Whether a call that failed with this kind may be retried.
    pub fn is_transient(self) -> bool {
        matches!(self, Self::Transient)
    }

    /// Human-readable hint shown next to the failure.
    pub fn suggestion(self) -> &'static str {
        match self {
            Self::Transient => {
                "the mail client looks busy; close any open dialog and retry in a few seconds"
            }
            Self::NotFound => "the item no longer exists or has been moved",
            Self::Unexpected => "unexpected store error; restart the mail client if it persists",
        }
    }
}

/// A store call that failed after the gateway gave up on it.
#[derive(Error, Debug, Clone)]
#[error("{description}: {source} ({})", .kind.suggestion())]
pub struct CallError {
    /// What the caller was trying to do.
    pub description: String,
    /// The raw failure reported by the store.
    pub source: StoreError,
    /// Classification of `source`.
    pub kind: ErrorKind,
}

impl CallError {
    /// Build a call error from an already classified store failure.
    pub fn new(description: impl Into<String>, source: StoreError, kind: ErrorKind) -> Self {
        Self {
            description: description.into(),
            source,
            kind,
        }
    }

    /// `true` when the failure was classified as transient.
    pub fn transient(&self) -> bool {
        self.kind.is_transient()
    }

    /// Suggestion text matching the classification.
    pub fn suggestion(&self) -> &'static str {
        self.kind.suggestion()
    }
}

/// All errors produced by the replyscan library.
#[derive(Error, Debug)]
pub enum ReplyScanError {
    /// A store call failed (after retries, when applicable).
    #[error(transparent)]
    Call(#[from] CallError),

    /// A single item could not be turned into a record.
    #[error("Cannot format item {}: {source}", .id.as_deref().unwrap_or("<unknown>"))]
    Format {
        id: Option<String>,
        source: StoreError,
    },

    /// No resolution strategy found the folder.
    #[error("Folder not found ({0})")]
    FolderNotFound(String),

    /// A caller-supplied parameter is out of range.
    #[error("Invalid value for '{name}': {reason}")]
    InvalidArgument { name: &'static str, reason: String },

    /// A numbered reference points outside the current listing.
    #[error("Message #{0} is not in the current listing; list messages first or pass an id")]
    NotInListing(usize),

    /// The mailbox snapshot could not be decoded.
    #[error("Invalid mailbox snapshot: {0}")]
    Snapshot(String),

    /// I/O error with the associated file path.
    #[error("I/O error reading '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Convenience alias for `Result<T, ReplyScanError>`.
pub type Result<T> = std::result::Result<T, ReplyScanError>;

impl ReplyScanError {
    /// Create an `Io` variant from a path and an `io::Error`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create an `InvalidArgument` variant.
    pub fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            name,
            reason: reason.into(),
        }
    }
}
