use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use sithub_types::ObjectId;
use tracing::{debug, warn};

use crate::error::{StoreError, StoreResult};
use crate::object::{ObjectKind, StoredObject};
use crate::traits::ObjectStore;

/// Loose-object store on the local filesystem.
///
/// Each object lives at `<root>/<first 2 hex>/<remaining 62 hex>` and holds
/// the header `"<kind> <len>\0"` followed by the payload. Files are written to
/// a temporary name in the fan-out directory and renamed into place, so a
/// reader either sees a complete object or nothing.
#[derive(Debug, Clone)]
pub struct FileObjectStore {
    root: PathBuf,
}

impl FileObjectStore {
    /// Create the objects directory (if needed) and open it.
    pub fn init(root: impl Into<PathBuf>) -> StoreResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Open an existing objects directory.
    pub fn open(root: impl Into<PathBuf>) -> StoreResult<Self> {
        let root = root.into();
        if !root.is_dir() {
            return Err(StoreError::Io(std::io::Error::new(
                ErrorKind::NotFound,
                format!("objects directory not found: {}", root.display()),
            )));
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, id: &ObjectId) -> PathBuf {
        self.root.join(id.fan_out_prefix()).join(id.fan_out_suffix())
    }

    /// Every id with a well-named file under the root, sorted.
    ///
    /// Stray files (leftover temporaries, foreign names) are skipped.
    pub fn all_ids(&self) -> StoreResult<Vec<ObjectId>> {
        let mut ids = Vec::new();
        for entry in walkdir::WalkDir::new(&self.root).min_depth(2).max_depth(2) {
            let entry = entry.map_err(|e| StoreError::Io(std::io::Error::other(e.to_string())))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Some(prefix) = entry.path().parent().and_then(|p| p.file_name()) else {
                continue;
            };
            let name = format!(
                "{}{}",
                prefix.to_string_lossy(),
                entry.file_name().to_string_lossy()
            );
            if let Ok(id) = ObjectId::from_hex(&name) {
                ids.push(id);
            }
        }
        ids.sort();
        Ok(ids)
    }

    fn decode(id: &ObjectId, raw: &[u8]) -> StoreResult<StoredObject> {
        let nul = raw
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| StoreError::corrupt(*id, "missing header terminator"))?;
        let header = std::str::from_utf8(&raw[..nul])
            .map_err(|_| StoreError::corrupt(*id, "header is not UTF-8"))?;
        let (kind, len) = header
            .split_once(' ')
            .ok_or_else(|| StoreError::corrupt(*id, "malformed header"))?;
        let kind = ObjectKind::parse(kind)
            .ok_or_else(|| StoreError::corrupt(*id, format!("unknown kind {kind:?}")))?;
        let len: u64 = len
            .parse()
            .map_err(|_| StoreError::corrupt(*id, "malformed length"))?;
        let data = raw[nul + 1..].to_vec();
        if data.len() as u64 != len {
            return Err(StoreError::corrupt(
                *id,
                format!("header says {len} bytes, found {}", data.len()),
            ));
        }
        let obj = StoredObject::new(kind, data);
        obj.verify(id)?;
        Ok(obj)
    }
}

impl ObjectStore for FileObjectStore {
    fn read(&self, id: &ObjectId) -> StoreResult<Option<StoredObject>> {
        let raw = match fs::read(self.object_path(id)) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let obj = Self::decode(id, &raw).inspect_err(|e| warn!(%id, error = %e, "corrupt loose object"))?;
        Ok(Some(obj))
    }

    fn write(&self, object: &StoredObject) -> StoreResult<ObjectId> {
        let id = object.compute_id();
        if id.is_null() {
            return Err(StoreError::NullObjectId);
        }
        let path = self.object_path(&id);
        match fs::read(&path) {
            Ok(raw) => match Self::decode(&id, &raw) {
                Ok(_) => return Ok(id),
                Err(e) => warn!(%id, error = %e, "replacing corrupt loose object"),
            },
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        let dir = self.root.join(id.fan_out_prefix());
        fs::create_dir_all(&dir)?;

        let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
        write!(tmp, "{} {}\0", object.kind, object.data.len())?;
        tmp.write_all(&object.data)?;
        tmp.as_file().sync_all()?;
        // A concurrent writer may win the rename; the bytes are identical.
        tmp.persist(&path).map_err(|e| StoreError::Io(e.error))?;

        debug!(%id, kind = %object.kind, size = object.size, "wrote loose object");
        Ok(id)
    }

    fn contains(&self, id: &ObjectId) -> StoreResult<bool> {
        Ok(self.object_path(id).is_file())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::Blob;

    fn blob(data: &[u8]) -> StoredObject {
        Blob::new(data.to_vec()).to_stored_object()
    }

    #[test]
    fn write_then_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileObjectStore::init(dir.path().join("objects")).unwrap();
        let obj = blob(b"file contents");
        let id = store.write(&obj).unwrap();

        let path = dir
            .path()
            .join("objects")
            .join(id.fan_out_prefix())
            .join(id.fan_out_suffix());
        let raw = fs::read(path).unwrap();
        assert!(raw.starts_with(b"blob 13\0"));

        assert_eq!(store.read(&id).unwrap(), Some(obj));
        assert!(store.contains(&id).unwrap());
    }

    #[test]
    fn reopen_sees_objects() {
        let dir = tempfile::tempdir().unwrap();
        let id = FileObjectStore::init(dir.path())
            .unwrap()
            .write(&blob(b"persisted"))
            .unwrap();
        let reopened = FileObjectStore::open(dir.path()).unwrap();
        assert_eq!(reopened.all_ids().unwrap(), vec![id]);
    }

    #[test]
    fn open_missing_dir_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(FileObjectStore::open(dir.path().join("nope")).is_err());
    }

    #[test]
    fn rewrite_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileObjectStore::init(dir.path()).unwrap();
        let a = store.write(&blob(b"same")).unwrap();
        let b = store.write(&blob(b"same")).unwrap();
        assert_eq!(a, b);
        assert_eq!(store.all_ids().unwrap().len(), 1);
    }

    #[test]
    fn flipped_byte_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileObjectStore::init(dir.path()).unwrap();
        let id = store.write(&blob(b"abcdef")).unwrap();
        let path = store.object_path(&id);
        let mut raw = fs::read(&path).unwrap();
        let last = raw.len() - 1;
        raw[last] ^= 0xff;
        fs::write(&path, raw).unwrap();

        assert!(matches!(store.read(&id), Err(StoreError::Corrupt { .. })));
    }

    #[test]
    fn rewriting_repairs_corrupt_object() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileObjectStore::init(dir.path()).unwrap();
        let obj = blob(b"repair me");
        let id = store.write(&obj).unwrap();
        fs::write(store.object_path(&id), b"blob 9\0damaged!!").unwrap();
        assert!(matches!(store.read(&id), Err(StoreError::Corrupt { .. })));

        assert_eq!(store.write(&obj).unwrap(), id);
        assert_eq!(store.read(&id).unwrap(), Some(obj));
    }

    #[test]
    fn truncated_file_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileObjectStore::init(dir.path()).unwrap();
        let id = store.write(&blob(b"abcdef")).unwrap();
        fs::write(store.object_path(&id), b"blob 6\0abc").unwrap();
        assert!(matches!(store.read(&id), Err(StoreError::Corrupt { .. })));
    }

    #[test]
    fn stray_files_are_ignored_by_listing() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileObjectStore::init(dir.path()).unwrap();
        let id = store.write(&blob(b"real")).unwrap();
        fs::write(dir.path().join(id.fan_out_prefix()).join(".tmpXYZ"), b"junk").unwrap();
        assert_eq!(store.all_ids().unwrap(), vec![id]);
    }

    #[test]
    fn parallel_writers_of_same_object() {
        use std::sync::Arc;
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FileObjectStore::init(dir.path()).unwrap());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || store.write(&blob(b"contended")).unwrap())
            })
            .collect();
        let ids: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(ids.windows(2).all(|w| w[0] == w[1]));
        assert!(store.read(&ids[0]).unwrap().is_some());
    }
}
