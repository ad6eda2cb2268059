use sithub_types::ObjectId;

use crate::error::{StoreError, StoreResult};
use crate::object::{Object, StoredObject};

/// Content-addressed object store.
///
/// All implementations must satisfy these invariants:
/// - Objects are immutable once written; the id is a function of the bytes.
/// - Writing bytes that are already present is a successful no-op.
/// - A read never returns bytes that fail to re-hash to the requested id.
/// - Concurrent reads and writes from many threads are safe.
/// - The store never interprets object contents beyond the kind tag.
pub trait ObjectStore: Send + Sync {
    /// Read an object by its content-addressed ID.
    ///
    /// Returns `Ok(None)` if the object does not exist and
    /// [`StoreError::Corrupt`] if the stored bytes fail verification.
    fn read(&self, id: &ObjectId) -> StoreResult<Option<StoredObject>>;

    /// Write an object and return its content-addressed ID.
    ///
    /// If the object already exists, this is a no-op.
    fn write(&self, object: &StoredObject) -> StoreResult<ObjectId>;

    /// Check whether an object exists in the store.
    fn contains(&self, id: &ObjectId) -> StoreResult<bool>;

    /// Encode and store a decoded object.
    fn put(&self, object: &Object) -> StoreResult<ObjectId> {
        self.write(&object.to_stored_object()?)
    }

    /// Read and decode an object, failing with [`StoreError::NotFound`] if absent.
    fn get(&self, id: &ObjectId) -> StoreResult<Object> {
        let stored = self.read(id)?.ok_or(StoreError::NotFound(*id))?;
        Object::from_stored_object(&stored)
    }

    /// Like [`read`](Self::read), but absence is an error.
    fn read_required(&self, id: &ObjectId) -> StoreResult<StoredObject> {
        self.read(id)?.ok_or(StoreError::NotFound(*id))
    }

    /// Write multiple objects and return their IDs in order.
    fn write_batch(&self, objects: &[StoredObject]) -> StoreResult<Vec<ObjectId>> {
        objects.iter().map(|obj| self.write(obj)).collect()
    }
}
