//! Repository handle for SitHub.
//!
//! A [`Repository`] owns one on-disk object store and one reference store
//! under `<path>/.sithub/`. It is the entry point the CLI uses:
//! [`Repository::initialize`], [`Repository::open`] and
//! [`Repository::clone`]. There is no ambient current repository; every
//! operation goes through an explicit handle.

pub mod commit;
pub mod config;
pub mod error;
pub mod repository;

pub use commit::{CommitRequest, CommitResult};
pub use config::{RepoConfig, TransferConfig, FORMAT_VERSION};
pub use error::{RepoError, RepoResult};
pub use repository::{Repository, CLONE_MARKER, META_DIR};

pub use sithub_refs::RefTarget;
pub use sithub_store::{Blob, Commit, EntryMode, Signature, Tree, TreeEntry};
pub use sithub_types::ObjectId;
