use sithub_store::{ObjectStore, StoredObject};
use sithub_types::ObjectId;

use crate::error::{SyncError, SyncResult};

/// Checks received objects against what the receiver already stores.
///
/// Objects arrive referents-first, so every edge out of an incoming object
/// must already land on a stored object. Anything else means the stream is
/// misordered or incomplete.
pub struct ReceiveVerifier<'a> {
    objects: &'a dyn ObjectStore,
}

impl<'a> ReceiveVerifier<'a> {
    pub fn new(objects: &'a dyn ObjectStore) -> Self {
        Self { objects }
    }

    /// Validate one incoming object before it is written.
    pub fn check(&self, id: &ObjectId, obj: &StoredObject) -> SyncResult<()> {
        for referent in obj.references()? {
            if !self.objects.contains(&referent)? {
                return Err(SyncError::ForwardReference {
                    id: *id,
                    missing: referent,
                });
            }
        }
        Ok(())
    }

    /// After the stream ends: every wanted tip must be stored.
    pub fn check_complete(&self, wants: &[ObjectId]) -> SyncResult<()> {
        for want in wants {
            if !self.objects.contains(want)? {
                return Err(SyncError::MissingWant(*want));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sithub_store::{Blob, EntryMode, InMemoryObjectStore, Tree, TreeEntry};

    #[test]
    fn tree_before_blob_is_forward_reference() {
        let objects = InMemoryObjectStore::new();
        let blob = Blob::new(b"later".to_vec()).to_stored_object();
        let blob_id = blob.compute_id();
        let tree = Tree::new(vec![TreeEntry::new(EntryMode::Regular, "f", blob_id)])
            .unwrap()
            .to_stored_object()
            .unwrap();
        let tree_id = tree.compute_id();

        let verifier = ReceiveVerifier::new(&objects);
        assert!(matches!(
            verifier.check(&tree_id, &tree),
            Err(SyncError::ForwardReference { missing, .. }) if missing == blob_id
        ));

        objects.write(&blob).unwrap();
        verifier.check(&tree_id, &tree).unwrap();
    }

    #[test]
    fn completeness() {
        let objects = InMemoryObjectStore::new();
        let id = objects.put(&Blob::new(b"tip".to_vec()).into()).unwrap();
        let verifier = ReceiveVerifier::new(&objects);
        verifier.check_complete(&[id]).unwrap();
        assert!(matches!(
            verifier.check_complete(&[id, ObjectId::from_bytes(b"lost")]),
            Err(SyncError::MissingWant(_))
        ));
    }
}
