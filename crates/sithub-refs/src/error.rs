//! Error types for reference operations.

use sithub_store::StoreError;
use sithub_types::ObjectId;
use thiserror::Error;

/// Errors that can occur during reference operations.
#[derive(Debug, Error)]
pub enum RefError {
    /// The reference was not found (includes unborn branches).
    #[error("ref not found: {name}")]
    NotFound { name: String },

    /// The reference name is not acceptable.
    #[error("invalid ref name {name:?}: {reason}")]
    InvalidName { name: String, reason: String },

    /// The reference points at an object the object store does not hold.
    #[error("ref {name} points at missing object {target}")]
    DanglingReference { name: String, target: ObjectId },

    /// A symbolic chain revisits a name.
    #[error("cyclic symbolic reference at {name}")]
    CyclicReference { name: String },

    /// Compare-and-swap lost: the current value is not the expected one.
    #[error("ref {name} changed concurrently")]
    StaleValue { name: String },

    /// Another writer holds the lock for this name.
    #[error("ref {name} is locked by another writer")]
    Locked { name: String },

    /// A ref file could not be parsed.
    #[error("corrupt ref {name}: {reason}")]
    Corrupt { name: String, reason: String },

    #[error("object store error: {0}")]
    Store(#[from] StoreError),

    /// I/O error during file-based ref operations.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl RefError {
    pub(crate) fn invalid(name: &str, reason: impl Into<String>) -> Self {
        Self::InvalidName {
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}

/// Convenience type alias for ref operations.
pub type RefResult<T> = std::result::Result<T, RefError>;
