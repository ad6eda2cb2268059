use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use sithub_crypto::ContentHasher;
use sithub_types::ObjectId;

use crate::error::{StoreError, StoreResult};

/// The kind of object stored.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectKind {
    /// Raw file content.
    Blob,
    /// Directory snapshot: name-sorted entries referencing blobs and subtrees.
    Tree,
    /// A point in history: root tree, parents, author, timestamp, message.
    Commit,
}

impl ObjectKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Blob => "blob",
            Self::Tree => "tree",
            Self::Commit => "commit",
        }
    }

    /// Parse the name written in loose object headers.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "blob" => Some(Self::Blob),
            "tree" => Some(Self::Tree),
            "commit" => Some(Self::Commit),
            _ => None,
        }
    }

    fn hasher(&self) -> &'static ContentHasher {
        match self {
            Self::Blob => &ContentHasher::BLOB,
            Self::Tree => &ContentHasher::TREE,
            Self::Commit => &ContentHasher::COMMIT,
        }
    }
}

impl std::fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stored object: kind tag + canonical bytes + cached size.
///
/// `StoredObject` is the unit of storage and transfer. Backends never
/// interpret `data`; decoding into [`Object`] happens above them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredObject {
    pub kind: ObjectKind,
    pub data: Vec<u8>,
    pub size: u64,
}

impl StoredObject {
    pub fn new(kind: ObjectKind, data: Vec<u8>) -> Self {
        let size = data.len() as u64;
        Self { kind, data, size }
    }

    /// Compute the content-addressed ID using the kind's domain-separated hasher.
    pub fn compute_id(&self) -> ObjectId {
        self.kind.hasher().hash(&self.data)
    }

    /// Fail with [`StoreError::Corrupt`] unless this object hashes to `id`.
    pub fn verify(&self, id: &ObjectId) -> StoreResult<()> {
        let computed = self.compute_id();
        if computed != *id {
            return Err(StoreError::corrupt(
                *id,
                format!("content hashes to {computed}"),
            ));
        }
        Ok(())
    }

    /// Outgoing graph edges of this object, in traversal order.
    ///
    /// Commits yield their tree then their parents; trees yield entry targets
    /// in name order; blobs have none.
    pub fn references(&self) -> StoreResult<Vec<ObjectId>> {
        match self.kind {
            ObjectKind::Blob => Ok(Vec::new()),
            ObjectKind::Tree => {
                let tree = Tree::from_stored_object(self)?;
                Ok(tree.entries.iter().map(|e| e.object_id).collect())
            }
            ObjectKind::Commit => {
                let commit = Commit::from_stored_object(self)?;
                let mut refs = Vec::with_capacity(commit.parents.len() + 1);
                refs.push(commit.tree);
                refs.extend(commit.parents.iter().copied());
                Ok(refs)
            }
        }
    }
}

fn kind_mismatch(obj: &StoredObject, expected: ObjectKind) -> StoreError {
    StoreError::corrupt(
        obj.compute_id(),
        format!("expected {expected}, got {}", obj.kind),
    )
}

// ---------------------------------------------------------------------------
// Blob
// ---------------------------------------------------------------------------

/// Raw content object.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Blob {
    pub data: Vec<u8>,
}

impl Blob {
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self { data: data.into() }
    }

    pub fn to_stored_object(&self) -> StoredObject {
        StoredObject::new(ObjectKind::Blob, self.data.clone())
    }

    pub fn from_stored_object(obj: &StoredObject) -> StoreResult<Self> {
        if obj.kind != ObjectKind::Blob {
            return Err(kind_mismatch(obj, ObjectKind::Blob));
        }
        Ok(Self {
            data: obj.data.clone(),
        })
    }
}

// ---------------------------------------------------------------------------
// Tree
// ---------------------------------------------------------------------------

/// File mode for a tree entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntryMode {
    /// Normal file (0o100644).
    Regular,
    /// Executable file (0o100755).
    Executable,
    /// Symbolic link; the target blob holds the link path (0o120000).
    Symlink,
    /// Nested directory (0o040000).
    Subtree,
}

impl EntryMode {
    pub fn mode_bits(&self) -> u32 {
        match self {
            Self::Regular => 0o100644,
            Self::Executable => 0o100755,
            Self::Symlink => 0o120000,
            Self::Subtree => 0o040000,
        }
    }

    pub fn from_mode_bits(bits: u32) -> Option<Self> {
        match bits {
            0o100644 => Some(Self::Regular),
            0o100755 => Some(Self::Executable),
            0o120000 => Some(Self::Symlink),
            0o040000 => Some(Self::Subtree),
            _ => None,
        }
    }

    /// The object kind an entry with this mode must point at.
    pub fn target_kind(&self) -> ObjectKind {
        match self {
            Self::Subtree => ObjectKind::Tree,
            _ => ObjectKind::Blob,
        }
    }
}

impl std::fmt::Display for EntryMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:06o}", self.mode_bits())
    }
}

/// A single entry in a tree object.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeEntry {
    pub mode: EntryMode,
    pub name: String,
    pub object_id: ObjectId,
}

impl TreeEntry {
    pub fn new(mode: EntryMode, name: impl Into<String>, object_id: ObjectId) -> Self {
        Self {
            mode,
            name: name.into(),
            object_id,
        }
    }
}

impl PartialOrd for TreeEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TreeEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.name.cmp(&other.name)
    }
}

/// Directory snapshot.
///
/// Entries are kept sorted by name and names are unique, so identical
/// directory contents always serialize, and therefore hash, identically.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tree {
    pub entries: Vec<TreeEntry>,
}

impl Tree {
    /// Build a tree, sorting entries by name.
    ///
    /// Fails with [`StoreError::InvalidTree`] on a duplicate or malformed name.
    pub fn new(mut entries: Vec<TreeEntry>) -> StoreResult<Self> {
        entries.sort();
        for entry in &entries {
            validate_entry_name(&entry.name)?;
        }
        if let Some(dup) = entries.windows(2).find(|w| w[0].name == w[1].name) {
            return Err(StoreError::InvalidTree(format!(
                "duplicate entry name: {}",
                dup[0].name
            )));
        }
        Ok(Self { entries })
    }

    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn to_stored_object(&self) -> StoreResult<StoredObject> {
        let data =
            serde_json::to_vec(self).map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(StoredObject::new(ObjectKind::Tree, data))
    }

    /// Decode a tree, rejecting anything a well-formed writer could not produce.
    pub fn from_stored_object(obj: &StoredObject) -> StoreResult<Self> {
        if obj.kind != ObjectKind::Tree {
            return Err(kind_mismatch(obj, ObjectKind::Tree));
        }
        let tree: Tree = serde_json::from_slice(&obj.data)
            .map_err(|e| StoreError::corrupt(obj.compute_id(), e.to_string()))?;
        if tree.entries.windows(2).any(|w| w[0].name >= w[1].name) {
            return Err(StoreError::corrupt(
                obj.compute_id(),
                "tree entries are not strictly sorted",
            ));
        }
        for entry in &tree.entries {
            validate_entry_name(&entry.name)
                .map_err(|e| StoreError::corrupt(obj.compute_id(), e.to_string()))?;
        }
        Ok(tree)
    }

    pub fn get(&self, name: &str) -> Option<&TreeEntry> {
        self.entries
            .binary_search_by(|e| e.name.as_str().cmp(name))
            .ok()
            .map(|i| &self.entries[i])
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn validate_entry_name(name: &str) -> StoreResult<()> {
    if name.is_empty() || name == "." || name == ".." {
        return Err(StoreError::InvalidTree(format!(
            "invalid entry name: {name:?}"
        )));
    }
    if name.contains('/') || name.contains('\0') {
        return Err(StoreError::InvalidTree(format!(
            "entry name contains a separator: {name:?}"
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Commit
// ---------------------------------------------------------------------------

/// Identity recorded on a commit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    pub name: String,
    pub email: String,
}

impl Signature {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
        }
    }
}

impl std::fmt::Display for Signature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} <{}>", self.name, self.email)
    }
}

/// A node in the history DAG.
///
/// `parents` is empty for a root commit, holds one id for a normal commit and
/// two or more for a merge.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    pub tree: ObjectId,
    pub parents: Vec<ObjectId>,
    pub author: Signature,
    /// Seconds since the Unix epoch.
    pub timestamp: i64,
    pub message: String,
}

impl Commit {
    pub fn to_stored_object(&self) -> StoreResult<StoredObject> {
        let data =
            serde_json::to_vec(self).map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(StoredObject::new(ObjectKind::Commit, data))
    }

    pub fn from_stored_object(obj: &StoredObject) -> StoreResult<Self> {
        if obj.kind != ObjectKind::Commit {
            return Err(kind_mismatch(obj, ObjectKind::Commit));
        }
        let commit: Commit = serde_json::from_slice(&obj.data)
            .map_err(|e| StoreError::corrupt(obj.compute_id(), e.to_string()))?;
        let mut seen = HashSet::new();
        if !commit.parents.iter().all(|p| seen.insert(*p)) {
            return Err(StoreError::corrupt(
                obj.compute_id(),
                "commit lists a parent twice",
            ));
        }
        Ok(commit)
    }

    pub fn is_root(&self) -> bool {
        self.parents.is_empty()
    }

    pub fn is_merge(&self) -> bool {
        self.parents.len() > 1
    }
}

// ---------------------------------------------------------------------------
// Object
// ---------------------------------------------------------------------------

/// A decoded, type-tagged object.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Object {
    Blob(Blob),
    Tree(Tree),
    Commit(Commit),
}

impl Object {
    pub fn kind(&self) -> ObjectKind {
        match self {
            Self::Blob(_) => ObjectKind::Blob,
            Self::Tree(_) => ObjectKind::Tree,
            Self::Commit(_) => ObjectKind::Commit,
        }
    }

    /// Canonical serialization.
    pub fn to_stored_object(&self) -> StoreResult<StoredObject> {
        match self {
            Self::Blob(b) => Ok(b.to_stored_object()),
            Self::Tree(t) => t.to_stored_object(),
            Self::Commit(c) => c.to_stored_object(),
        }
    }

    pub fn from_stored_object(obj: &StoredObject) -> StoreResult<Self> {
        Ok(match obj.kind {
            ObjectKind::Blob => Self::Blob(Blob::from_stored_object(obj)?),
            ObjectKind::Tree => Self::Tree(Tree::from_stored_object(obj)?),
            ObjectKind::Commit => Self::Commit(Commit::from_stored_object(obj)?),
        })
    }

    pub fn into_blob(self) -> Option<Blob> {
        match self {
            Self::Blob(b) => Some(b),
            _ => None,
        }
    }

    pub fn into_tree(self) -> Option<Tree> {
        match self {
            Self::Tree(t) => Some(t),
            _ => None,
        }
    }

    pub fn into_commit(self) -> Option<Commit> {
        match self {
            Self::Commit(c) => Some(c),
            _ => None,
        }
    }
}

impl From<Blob> for Object {
    fn from(b: Blob) -> Self {
        Self::Blob(b)
    }
}

impl From<Tree> for Object {
    fn from(t: Tree) -> Self {
        Self::Tree(t)
    }
}

impl From<Commit> for Object {
    fn from(c: Commit) -> Self {
        Self::Commit(c)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sample_commit(parents: Vec<ObjectId>) -> Commit {
        Commit {
            tree: ObjectId::from_bytes(b"tree"),
            parents,
            author: Signature::new("Ada", "ada@example.com"),
            timestamp: 1_700_000_000,
            message: "initial".into(),
        }
    }

    #[test]
    fn blob_kind_mismatch_is_corrupt() {
        let stored = StoredObject::new(ObjectKind::Tree, b"not a tree".to_vec());
        let err = Blob::from_stored_object(&stored).unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { .. }));
    }

    #[test]
    fn tree_entries_sorted() {
        let tree = Tree::new(vec![
            TreeEntry::new(EntryMode::Regular, "zebra.txt", ObjectId::null()),
            TreeEntry::new(EntryMode::Regular, "alpha.txt", ObjectId::null()),
            TreeEntry::new(EntryMode::Subtree, "middle", ObjectId::null()),
        ])
        .unwrap();
        let names: Vec<_> = tree.entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["alpha.txt", "middle", "zebra.txt"]);
        assert!(tree.get("middle").is_some());
        assert!(tree.get("missing").is_none());
    }

    #[test]
    fn tree_order_does_not_affect_id() {
        let a = TreeEntry::new(EntryMode::Regular, "a", ObjectId::from_bytes(b"a"));
        let b = TreeEntry::new(EntryMode::Executable, "b", ObjectId::from_bytes(b"b"));
        let t1 = Tree::new(vec![a.clone(), b.clone()]).unwrap();
        let t2 = Tree::new(vec![b, a]).unwrap();
        assert_eq!(
            t1.to_stored_object().unwrap().compute_id(),
            t2.to_stored_object().unwrap().compute_id()
        );
    }

    #[test]
    fn tree_rejects_duplicate_names() {
        let err = Tree::new(vec![
            TreeEntry::new(EntryMode::Regular, "same", ObjectId::null()),
            TreeEntry::new(EntryMode::Subtree, "same", ObjectId::null()),
        ])
        .unwrap_err();
        assert!(matches!(err, StoreError::InvalidTree(_)));
    }

    #[test]
    fn tree_rejects_bad_names() {
        for bad in ["", ".", "..", "a/b", "nul\0"] {
            let res = Tree::new(vec![TreeEntry::new(EntryMode::Regular, bad, ObjectId::null())]);
            assert!(res.is_err(), "accepted {bad:?}");
        }
    }

    #[test]
    fn decoding_unsorted_tree_is_corrupt() {
        let unsorted = Tree {
            entries: vec![
                TreeEntry::new(EntryMode::Regular, "b", ObjectId::null()),
                TreeEntry::new(EntryMode::Regular, "a", ObjectId::null()),
            ],
        };
        let data = serde_json::to_vec(&unsorted).unwrap();
        let stored = StoredObject::new(ObjectKind::Tree, data);
        assert!(matches!(
            Tree::from_stored_object(&stored),
            Err(StoreError::Corrupt { .. })
        ));
    }

    #[test]
    fn decoding_tree_with_bad_name_is_corrupt() {
        for bad in ["", "..", "a/b"] {
            let tree = Tree {
                entries: vec![TreeEntry::new(EntryMode::Regular, bad, ObjectId::null())],
            };
            let stored = StoredObject::new(ObjectKind::Tree, serde_json::to_vec(&tree).unwrap());
            assert!(
                matches!(Tree::from_stored_object(&stored), Err(StoreError::Corrupt { .. })),
                "accepted {bad:?}"
            );
        }
    }

    #[test]
    fn commit_references_tree_then_parents() {
        let p1 = ObjectId::from_bytes(b"p1");
        let p2 = ObjectId::from_bytes(b"p2");
        let commit = sample_commit(vec![p1, p2]);
        assert!(commit.is_merge());
        let stored = commit.to_stored_object().unwrap();
        assert_eq!(stored.references().unwrap(), vec![commit.tree, p1, p2]);
    }

    #[test]
    fn commit_with_repeated_parent_is_corrupt() {
        let p = ObjectId::from_bytes(b"p");
        let stored = sample_commit(vec![p, p]).to_stored_object().unwrap();
        assert!(matches!(
            Commit::from_stored_object(&stored),
            Err(StoreError::Corrupt { .. })
        ));
    }

    #[test]
    fn object_decodes_by_kind() {
        let commit = sample_commit(vec![]);
        assert!(commit.is_root());
        let stored = Object::from(commit.clone()).to_stored_object().unwrap();
        let decoded = Object::from_stored_object(&stored).unwrap();
        assert_eq!(decoded.kind(), ObjectKind::Commit);
        assert_eq!(decoded.into_commit(), Some(commit));
    }

    #[test]
    fn verify_rejects_wrong_id() {
        let obj = StoredObject::new(ObjectKind::Blob, b"data".to_vec());
        obj.verify(&obj.compute_id()).unwrap();
        let err = obj.verify(&ObjectId::from_bytes(b"other")).unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { .. }));
    }

    #[test]
    fn entry_mode_bits_and_targets() {
        for mode in [
            EntryMode::Regular,
            EntryMode::Executable,
            EntryMode::Symlink,
            EntryMode::Subtree,
        ] {
            assert_eq!(EntryMode::from_mode_bits(mode.mode_bits()), Some(mode));
        }
        assert!(EntryMode::from_mode_bits(0o777).is_none());
        assert_eq!(EntryMode::Subtree.target_kind(), ObjectKind::Tree);
        assert_eq!(EntryMode::Symlink.target_kind(), ObjectKind::Blob);
        assert_eq!(EntryMode::Subtree.to_string(), "040000");
    }

    #[test]
    fn kind_names_parse_back() {
        for kind in [ObjectKind::Blob, ObjectKind::Tree, ObjectKind::Commit] {
            assert_eq!(ObjectKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(ObjectKind::parse("tag"), None);
    }

    proptest! {
        #[test]
        fn tree_id_ignores_insertion_order(
            names in proptest::collection::btree_set("[a-z]{1,8}", 1..12)
        ) {
            let entries: Vec<TreeEntry> = names
                .iter()
                .map(|n| TreeEntry::new(EntryMode::Regular, n.clone(), ObjectId::from_bytes(n.as_bytes())))
                .collect();
            let mut reversed = entries.clone();
            reversed.reverse();
            let a = Tree::new(entries).unwrap().to_stored_object().unwrap();
            let b = Tree::new(reversed).unwrap().to_stored_object().unwrap();
            prop_assert_eq!(a.compute_id(), b.compute_id());
            prop_assert!(Tree::from_stored_object(&a).is_ok());
        }
    }
}
