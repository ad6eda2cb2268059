//! Filesystem reference store.
//!
//! Refs are plain text files under the repository directory: `HEAD` at the
//! root and everything else under `refs/`. Each file holds either a hex
//! object id or `ref: <name>`.

use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use sithub_store::ObjectStore;
use tracing::debug;

use crate::error::{RefError, RefResult};
use crate::names::{validate_ref_name, HEAD};
use crate::traits::{check_target, RefStore};
use crate::types::RefTarget;

/// A [`RefStore`] backed by one file per ref.
///
/// Writers to the same name are serialized twice: by an in-process mutex
/// keyed by name, and by a `<name>.lock` file created exclusively, which
/// keeps other processes out. The new value is written to a temporary file
/// and renamed over the old one, so readers never see a partial ref.
///
/// Checked symbolic writes additionally take a store-wide mutex, so the
/// cycle check and the write happen as one step.
#[derive(Debug)]
pub struct FileRefStore {
    root: PathBuf,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    symbolic: Mutex<()>,
}

/// Removes the lock file when dropped.
struct LockFile {
    path: PathBuf,
}

impl Drop for LockFile {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

impl FileRefStore {
    /// Open a ref store rooted at the repository directory, creating
    /// `refs/heads` and `refs/tags` if needed.
    pub fn open(root: impl Into<PathBuf>) -> RefResult<Self> {
        let root = root.into();
        fs::create_dir_all(root.join("refs").join("heads"))?;
        fs::create_dir_all(root.join("refs").join("tags"))?;
        Ok(Self {
            root,
            locks: Mutex::new(HashMap::new()),
            symbolic: Mutex::new(()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn ref_path(&self, name: &str) -> PathBuf {
        name.split('/')
            .fold(self.root.clone(), |path, part| path.join(part))
    }

    fn name_lock(&self, name: &str) -> RefResult<Arc<Mutex<()>>> {
        let mut locks = self.locks.lock().map_err(|_| RefError::Locked {
            name: name.to_string(),
        })?;
        Ok(Arc::clone(locks.entry(name.to_string()).or_default()))
    }

    /// Run `f` while holding both the in-process and the on-disk lock for `name`.
    fn with_lock<T>(&self, name: &str, f: impl FnOnce(&Path) -> RefResult<T>) -> RefResult<T> {
        validate_ref_name(name)?;
        let mutex = self.name_lock(name)?;
        let _guard = mutex.lock().map_err(|_| RefError::Locked {
            name: name.to_string(),
        })?;

        let path = self.ref_path(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let lock_path = path.with_file_name(format!(
            "{}.lock",
            path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default()
        ));
        match OpenOptions::new().write(true).create_new(true).open(&lock_path) {
            Ok(_) => {}
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(RefError::Locked {
                    name: name.to_string(),
                })
            }
            Err(e) => return Err(e.into()),
        }
        let _lock = LockFile { path: lock_path };
        f(&path)
    }

    /// Serializes checked writes of symbolic targets; `None` for direct ones.
    fn symbolic_guard(
        &self,
        name: &str,
        target: &RefTarget,
    ) -> RefResult<Option<MutexGuard<'_, ()>>> {
        if !target.is_symbolic() {
            return Ok(None);
        }
        let guard = self.symbolic.lock().map_err(|_| RefError::Locked {
            name: name.to_string(),
        })?;
        Ok(Some(guard))
    }

    fn read_path(name: &str, path: &Path) -> RefResult<Option<RefTarget>> {
        match fs::read_to_string(path) {
            Ok(text) => RefTarget::decode(name, &text).map(Some),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write_path(path: &Path, target: &RefTarget) -> RefResult<()> {
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        writeln!(tmp, "{}", target.encode())?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| RefError::Io(e.error))?;
        Ok(())
    }
}

impl RefStore for FileRefStore {
    fn read_ref(&self, name: &str) -> RefResult<Option<RefTarget>> {
        validate_ref_name(name)?;
        Self::read_path(name, &self.ref_path(name))
    }

    fn write_ref(&self, name: &str, target: &RefTarget) -> RefResult<()> {
        self.with_lock(name, |path| Self::write_path(path, target))?;
        debug!(name, %target, "wrote ref");
        Ok(())
    }

    fn delete_ref(&self, name: &str) -> RefResult<bool> {
        self.with_lock(name, |path| match fs::remove_file(path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        })
    }

    fn list_refs(&self, prefix: &str) -> RefResult<Vec<(String, RefTarget)>> {
        let mut result = Vec::new();
        if HEAD.starts_with(prefix) {
            if let Some(target) = Self::read_path(HEAD, &self.root.join(HEAD))? {
                result.push((HEAD.to_string(), target));
            }
        }
        for entry in walkdir::WalkDir::new(self.root.join("refs")).min_depth(1) {
            let entry = entry.map_err(|e| RefError::Io(std::io::Error::other(e.to_string())))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(rel) = entry.path().strip_prefix(&self.root) else {
                continue;
            };
            let name = rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            // Lock files and in-flight temporaries are not valid names.
            if !name.starts_with(prefix) || validate_ref_name(&name).is_err() {
                continue;
            }
            if let Some(target) = Self::read_path(&name, entry.path())? {
                result.push((name, target));
            }
        }
        result.sort_by(|(a, _), (b, _)| a.cmp(b));
        Ok(result)
    }

    fn compare_and_swap(
        &self,
        name: &str,
        expected: Option<&RefTarget>,
        new: &RefTarget,
    ) -> RefResult<()> {
        self.with_lock(name, |path| {
            let current = Self::read_path(name, path)?;
            if current.as_ref() != expected {
                return Err(RefError::StaleValue {
                    name: name.to_string(),
                });
            }
            Self::write_path(path, new)
        })?;
        debug!(name, target = %new, "advanced ref");
        Ok(())
    }

    fn set(&self, name: &str, target: &RefTarget, objects: &dyn ObjectStore) -> RefResult<()> {
        let _guard = self.symbolic_guard(name, target)?;
        check_target(name, target, objects, |n| self.read_ref(n))?;
        self.write_ref(name, target)
    }

    fn update(
        &self,
        name: &str,
        expected: Option<&RefTarget>,
        target: &RefTarget,
        objects: &dyn ObjectStore,
    ) -> RefResult<()> {
        let _guard = self.symbolic_guard(name, target)?;
        check_target(name, target, objects, |n| self.read_ref(n))?;
        self.compare_and_swap(name, expected, target)
    }
}
