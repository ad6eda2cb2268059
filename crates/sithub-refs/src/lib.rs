//! Reference management for SitHub repositories.
//!
//! References are the human-readable, mutable entry points into the
//! immutable object graph: branches under `refs/heads/`, tags under
//! `refs/tags/`, and the symbolic `HEAD` naming the current branch.
//!
//! # Modules
//!
//! - [`error`]: error types for ref operations
//! - [`types`]: [`RefTarget`], direct or symbolic
//! - [`traits`]: the [`RefStore`] trait, with validated `set` and `resolve`
//! - [`names`]: ref name validation
//! - [`memory`]: [`InMemoryRefStore`] for tests and embedding
//! - [`file`]: [`FileRefStore`], one locked file per ref

pub mod error;
pub mod file;
pub mod memory;
pub mod names;
pub mod traits;
pub mod types;

pub use error::{RefError, RefResult};
pub use file::FileRefStore;
pub use memory::InMemoryRefStore;
pub use names::{branch_ref, tag_ref, validate_branch_name, validate_ref_name, HEAD};
pub use traits::RefStore;
pub use types::RefTarget;
