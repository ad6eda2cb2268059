//! Content-addressed object storage for SitHub repositories.
//!
//! Every piece of repository data (file contents, directory listings, history)
//! is stored as an immutable object identified by its BLAKE3 hash,
//! domain-separated by object kind.
//!
//! # Object Types
//!
//! - [`Blob`]: raw file content
//! - [`Tree`]: name-sorted directory listing of blobs and subtrees
//! - [`Commit`]: root tree, parents, author, timestamp and message
//!
//! # Storage Backends
//!
//! All backends implement the [`ObjectStore`] trait:
//!
//! - [`InMemoryObjectStore`]: `HashMap`-based store for tests and embedding
//! - [`FileObjectStore`]: fan-out loose objects with atomic rename writes
//!
//! # Traversal
//!
//! [`walk_reachable`] and [`topo_order`] enumerate the object DAG; the
//! transfer protocol uses the latter to stream objects referents-first.

pub mod error;
pub mod file;
pub mod memory;
pub mod object;
pub mod traits;
pub mod walk;

pub use error::{StoreError, StoreResult};
pub use file::FileObjectStore;
pub use memory::InMemoryObjectStore;
pub use object::{
    Blob, Commit, EntryMode, Object, ObjectKind, Signature, StoredObject, Tree, TreeEntry,
};
pub use traits::ObjectStore;
pub use walk::{reachable_set, topo_order, walk_reachable, ReachableWalk};
