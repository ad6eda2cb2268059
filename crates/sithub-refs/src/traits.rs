//! The [`RefStore`] trait defining the reference storage interface.

use std::collections::HashSet;

use sithub_store::ObjectStore;
use sithub_types::ObjectId;

use crate::error::{RefError, RefResult};
use crate::names::{validate_ref_name, HEAD};
use crate::types::RefTarget;

/// Storage backend for named references.
///
/// Implementations must be thread-safe (`Send + Sync`). Writes to the same
/// name are mutually exclusive; writes to different names are independent.
/// The namespace is `HEAD` plus everything under `refs/`.
pub trait RefStore: Send + Sync {
    /// Read a ref by its full name. `Ok(None)` if it does not exist.
    fn read_ref(&self, name: &str) -> RefResult<Option<RefTarget>>;

    /// Create or overwrite a ref atomically.
    ///
    /// This is the raw write: it validates the name but does not check the
    /// target against an object store. Use [`set`](Self::set) for that.
    fn write_ref(&self, name: &str, target: &RefTarget) -> RefResult<()>;

    /// Delete a ref. Returns `Ok(true)` if it existed.
    fn delete_ref(&self, name: &str) -> RefResult<bool>;

    /// All refs whose name starts with `prefix`, sorted by name.
    fn list_refs(&self, prefix: &str) -> RefResult<Vec<(String, RefTarget)>>;

    /// Replace the value of `name` only if it currently equals `expected`
    /// (`None` meaning "does not exist"); otherwise fail with
    /// [`RefError::StaleValue`].
    fn compare_and_swap(
        &self,
        name: &str,
        expected: Option<&RefTarget>,
        new: &RefTarget,
    ) -> RefResult<()>;

    /// Validated write enforcing objects-before-refs.
    ///
    /// A direct target must already be present in `objects`; a symbolic
    /// target must be a valid name and must not close a cycle.
    ///
    /// Implementations must make the check and the write atomic with respect
    /// to other symbolic writes, or two writers can close a cycle together.
    fn set(&self, name: &str, target: &RefTarget, objects: &dyn ObjectStore) -> RefResult<()> {
        check_target(name, target, objects, |n| self.read_ref(n))?;
        self.write_ref(name, target)
    }

    /// [`set`](Self::set) guarded by compare-and-swap.
    fn update(
        &self,
        name: &str,
        expected: Option<&RefTarget>,
        target: &RefTarget,
        objects: &dyn ObjectStore,
    ) -> RefResult<()> {
        check_target(name, target, objects, |n| self.read_ref(n))?;
        self.compare_and_swap(name, expected, target)
    }

    /// Follow symbolic refs from `name` to a terminal object id.
    ///
    /// Fails with `NotFound` if any link is missing (an unborn branch),
    /// `CyclicReference` if a name repeats, and `DanglingReference` if the
    /// terminal id is absent from `objects`.
    fn resolve(&self, name: &str, objects: &dyn ObjectStore) -> RefResult<ObjectId> {
        let mut seen = HashSet::new();
        let mut current = name.to_string();
        loop {
            if !seen.insert(current.clone()) {
                return Err(RefError::CyclicReference { name: current });
            }
            match self.read_ref(&current)? {
                None => return Err(RefError::NotFound { name: current }),
                Some(RefTarget::Symbolic(next)) => current = next,
                Some(RefTarget::Direct(id)) => {
                    if !objects.contains(&id)? {
                        return Err(RefError::DanglingReference {
                            name: current,
                            target: id,
                        });
                    }
                    return Ok(id);
                }
            }
        }
    }

    /// Every ref, HEAD included.
    fn list(&self) -> RefResult<Vec<(String, RefTarget)>> {
        self.list_refs("")
    }

    /// The target of HEAD, if set.
    fn head(&self) -> RefResult<Option<RefTarget>> {
        self.read_ref(HEAD)
    }
}

/// Check a prospective write of `target` to `name`.
///
/// `read` supplies the current value of other refs, so a store can run the
/// check against a view it holds locked.
pub(crate) fn check_target(
    name: &str,
    target: &RefTarget,
    objects: &dyn ObjectStore,
    read: impl Fn(&str) -> RefResult<Option<RefTarget>>,
) -> RefResult<()> {
    validate_ref_name(name)?;
    match target {
        RefTarget::Direct(id) => {
            if !objects.contains(id)? {
                return Err(RefError::DanglingReference {
                    name: name.to_string(),
                    target: *id,
                });
            }
        }
        RefTarget::Symbolic(next) => {
            validate_ref_name(next)?;
            // Walk the chain from the new target; reaching `name` means a cycle.
            let mut seen = HashSet::new();
            let mut current = next.clone();
            loop {
                if current == name || !seen.insert(current.clone()) {
                    return Err(RefError::CyclicReference {
                        name: name.to_string(),
                    });
                }
                match read(&current)? {
                    Some(RefTarget::Symbolic(following)) => current = following,
                    _ => break,
                }
            }
        }
    }
    Ok(())
}
