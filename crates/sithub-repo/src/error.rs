use std::path::PathBuf;

use sithub_refs::RefError;
use sithub_store::{ObjectKind, StoreError};
use sithub_sync::SyncError;
use sithub_types::ObjectId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RepoError {
    /// `initialize` or `clone` target already holds a repository. When
    /// `incomplete` is set it is the remains of a failed clone.
    #[error("repository already exists at {} (incomplete clone: {incomplete})", .path.display())]
    AlreadyExists { path: PathBuf, incomplete: bool },

    #[error("not a repository: {}", .0.display())]
    NotARepository(PathBuf),

    /// The repository is the result of a clone that never finished.
    #[error("repository at {} is an incomplete clone; remove it and clone again", .0.display())]
    Incomplete(PathBuf),

    #[error("invalid location {location:?}: {reason}")]
    InvalidLocation { location: String, reason: String },

    #[error("object not found: {0}")]
    MissingObject(ObjectId),

    #[error("object {id} is a {actual}, expected a {expected}")]
    UnexpectedKind {
        id: ObjectId,
        expected: ObjectKind,
        actual: ObjectKind,
    },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("ref error: {0}")]
    Ref(#[from] RefError),

    #[error("transfer error: {0}")]
    Sync(#[from] SyncError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type RepoResult<T> = Result<T, RepoError>;
