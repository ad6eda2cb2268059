//! In-memory reference store for testing and ephemeral use.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use sithub_store::ObjectStore;

use crate::error::{RefError, RefResult};
use crate::names::validate_ref_name;
use crate::traits::{check_target, RefStore};
use crate::types::RefTarget;

/// An in-memory implementation of [`RefStore`].
///
/// All refs live in a `HashMap` behind a `RwLock`. Compare-and-swap and the
/// checked writes run entirely under the write lock, so they are atomic with
/// respect to every other writer.
#[derive(Debug, Default)]
pub struct InMemoryRefStore {
    refs: RwLock<HashMap<String, RefTarget>>,
}

impl InMemoryRefStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<T>(_: PoisonError<T>) -> RefError {
    RefError::Locked {
        name: "<in-memory ref table>".into(),
    }
}

impl RefStore for InMemoryRefStore {
    fn read_ref(&self, name: &str) -> RefResult<Option<RefTarget>> {
        let refs = self.refs.read().map_err(poisoned)?;
        Ok(refs.get(name).cloned())
    }

    fn write_ref(&self, name: &str, target: &RefTarget) -> RefResult<()> {
        validate_ref_name(name)?;
        let mut refs = self.refs.write().map_err(poisoned)?;
        refs.insert(name.to_string(), target.clone());
        Ok(())
    }

    fn delete_ref(&self, name: &str) -> RefResult<bool> {
        let mut refs = self.refs.write().map_err(poisoned)?;
        Ok(refs.remove(name).is_some())
    }

    fn list_refs(&self, prefix: &str) -> RefResult<Vec<(String, RefTarget)>> {
        let refs = self.refs.read().map_err(poisoned)?;
        let mut result: Vec<(String, RefTarget)> = refs
            .iter()
            .filter(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        result.sort_by(|(a, _), (b, _)| a.cmp(b));
        Ok(result)
    }

    fn compare_and_swap(
        &self,
        name: &str,
        expected: Option<&RefTarget>,
        new: &RefTarget,
    ) -> RefResult<()> {
        validate_ref_name(name)?;
        let mut refs = self.refs.write().map_err(poisoned)?;
        if refs.get(name) != expected {
            return Err(RefError::StaleValue {
                name: name.to_string(),
            });
        }
        refs.insert(name.to_string(), new.clone());
        Ok(())
    }

    fn set(&self, name: &str, target: &RefTarget, objects: &dyn ObjectStore) -> RefResult<()> {
        let mut refs = self.refs.write().map_err(poisoned)?;
        check_target(name, target, objects, |n| Ok(refs.get(n).cloned()))?;
        refs.insert(name.to_string(), target.clone());
        Ok(())
    }

    fn update(
        &self,
        name: &str,
        expected: Option<&RefTarget>,
        target: &RefTarget,
        objects: &dyn ObjectStore,
    ) -> RefResult<()> {
        let mut refs = self.refs.write().map_err(poisoned)?;
        check_target(name, target, objects, |n| Ok(refs.get(n).cloned()))?;
        if refs.get(name) != expected {
            return Err(RefError::StaleValue {
                name: name.to_string(),
            });
        }
        refs.insert(name.to_string(), target.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sithub_store::{Blob, InMemoryObjectStore, ObjectStore};
    use sithub_types::ObjectId;

    fn store_with_object() -> (InMemoryObjectStore, ObjectId) {
        let objects = InMemoryObjectStore::new();
        let id = objects.put(&Blob::new(b"tip".to_vec()).into()).unwrap();
        (objects, id)
    }

    fn sym(name: &str) -> RefTarget {
        RefTarget::Symbolic(name.into())
    }

    #[test]
    fn set_and_resolve_direct() {
        let (objects, id) = store_with_object();
        let refs = InMemoryRefStore::new();
        refs.set("refs/heads/main", &id.into(), &objects).unwrap();
        assert_eq!(refs.resolve("refs/heads/main", &objects).unwrap(), id);
    }

    #[test]
    fn set_refuses_absent_object() {
        let (objects, _) = store_with_object();
        let refs = InMemoryRefStore::new();
        let ghost = ObjectId::from_bytes(b"ghost");
        let err = refs
            .set("refs/heads/main", &ghost.into(), &objects)
            .unwrap_err();
        assert!(matches!(err, RefError::DanglingReference { target, .. } if target == ghost));
        assert!(refs.read_ref("refs/heads/main").unwrap().is_none());
    }

    #[test]
    fn set_rejects_invalid_name() {
        let (objects, id) = store_with_object();
        let refs = InMemoryRefStore::new();
        assert!(matches!(
            refs.set("main", &id.into(), &objects),
            Err(RefError::InvalidName { .. })
        ));
    }

    #[test]
    fn head_follows_branch() {
        let (objects, id) = store_with_object();
        let refs = InMemoryRefStore::new();
        refs.set("HEAD", &sym("refs/heads/main"), &objects).unwrap();

        // Unborn branch.
        assert!(matches!(
            refs.resolve("HEAD", &objects),
            Err(RefError::NotFound { name }) if name == "refs/heads/main"
        ));

        refs.set("refs/heads/main", &id.into(), &objects).unwrap();
        assert_eq!(refs.resolve("HEAD", &objects).unwrap(), id);
        assert_eq!(refs.head().unwrap(), Some(sym("refs/heads/main")));
    }

    #[test]
    fn set_rejects_cycles() {
        let (objects, _) = store_with_object();
        let refs = InMemoryRefStore::new();
        refs.set("refs/heads/a", &sym("refs/heads/b"), &objects).unwrap();
        refs.set("refs/heads/b", &sym("refs/heads/c"), &objects).unwrap();
        assert!(matches!(
            refs.set("refs/heads/c", &sym("refs/heads/a"), &objects),
            Err(RefError::CyclicReference { .. })
        ));
        assert!(matches!(
            refs.set("refs/heads/self", &sym("refs/heads/self"), &objects),
            Err(RefError::CyclicReference { .. })
        ));
    }

    #[test]
    fn resolve_detects_raw_cycle() {
        let (objects, _) = store_with_object();
        let refs = InMemoryRefStore::new();
        refs.write_ref("refs/heads/a", &sym("refs/heads/b")).unwrap();
        refs.write_ref("refs/heads/b", &sym("refs/heads/a")).unwrap();
        assert!(matches!(
            refs.resolve("refs/heads/a", &objects),
            Err(RefError::CyclicReference { .. })
        ));
    }

    #[test]
    fn resolve_reports_dangling() {
        let (objects, _) = store_with_object();
        let refs = InMemoryRefStore::new();
        refs.write_ref("refs/tags/old", &ObjectId::from_bytes(b"gone").into())
            .unwrap();
        assert!(matches!(
            refs.resolve("refs/tags/old", &objects),
            Err(RefError::DanglingReference { .. })
        ));
    }

    #[test]
    fn compare_and_swap_detects_stale() {
        let (objects, id) = store_with_object();
        let other = objects.put(&Blob::new(b"other".to_vec()).into()).unwrap();
        let refs = InMemoryRefStore::new();
        let name = "refs/heads/main";

        refs.compare_and_swap(name, None, &id.into()).unwrap();
        assert!(matches!(
            refs.compare_and_swap(name, None, &other.into()),
            Err(RefError::StaleValue { .. })
        ));
        refs.update(name, Some(&id.into()), &other.into(), &objects)
            .unwrap();
        assert_eq!(refs.read_ref(name).unwrap(), Some(other.into()));
    }

    #[test]
    fn list_is_sorted_and_filtered() {
        let (objects, id) = store_with_object();
        let refs = InMemoryRefStore::new();
        refs.set("refs/tags/v1", &id.into(), &objects).unwrap();
        refs.set("refs/heads/main", &id.into(), &objects).unwrap();
        refs.set("HEAD", &sym("refs/heads/main"), &objects).unwrap();
        refs.set("refs/heads/dev", &id.into(), &objects).unwrap();

        let names: Vec<_> = refs.list().unwrap().into_iter().map(|(n, _)| n).collect();
        assert_eq!(
            names,
            ["HEAD", "refs/heads/dev", "refs/heads/main", "refs/tags/v1"]
        );
        assert_eq!(refs.list_refs("refs/heads/").unwrap().len(), 2);
    }

    #[test]
    fn delete() {
        let (objects, id) = store_with_object();
        let refs = InMemoryRefStore::new();
        refs.set("refs/heads/gone", &id.into(), &objects).unwrap();
        assert!(refs.delete_ref("refs/heads/gone").unwrap());
        assert!(!refs.delete_ref("refs/heads/gone").unwrap());
    }

    #[test]
    fn racing_symbolic_writes_never_form_cycle() {
        use std::sync::{Arc, Barrier};

        let objects = Arc::new(InMemoryObjectStore::new());
        for round in 0..50 {
            let refs = Arc::new(InMemoryRefStore::new());
            let a = format!("refs/heads/a{round}");
            let b = format!("refs/heads/b{round}");
            let barrier = Arc::new(Barrier::new(2));
            let handles: Vec<_> = [(a.clone(), b.clone()), (b.clone(), a.clone())]
                .into_iter()
                .map(|(name, target)| {
                    let refs = Arc::clone(&refs);
                    let objects = Arc::clone(&objects);
                    let barrier = Arc::clone(&barrier);
                    std::thread::spawn(move || {
                        barrier.wait();
                        refs.set(&name, &sym(&target), &*objects).is_ok()
                    })
                })
                .collect();
            let wins = handles
                .into_iter()
                .map(|h| h.join().unwrap())
                .filter(|ok| *ok)
                .count();
            assert_eq!(wins, 1);
            assert!(matches!(
                refs.resolve(&a, &*objects),
                Err(RefError::NotFound { .. })
            ));
        }
    }

    #[test]
    fn concurrent_cas_loses_no_updates() {
        use std::sync::Arc;

        let objects = Arc::new(InMemoryObjectStore::new());
        let refs = Arc::new(InMemoryRefStore::new());
        let name = "refs/heads/counter";
        let handles: Vec<_> = (0..8u8)
            .map(|i| {
                let objects = Arc::clone(&objects);
                let refs = Arc::clone(&refs);
                std::thread::spawn(move || {
                    let mut wins = 0;
                    for j in 0..20u8 {
                        let id = objects.put(&Blob::new(vec![i, j]).into()).unwrap();
                        loop {
                            let current = refs.read_ref(name).unwrap();
                            match refs.update(name, current.as_ref(), &id.into(), &*objects) {
                                Ok(()) => break,
                                Err(RefError::StaleValue { .. }) => continue,
                                Err(e) => panic!("{e}"),
                            }
                        }
                        wins += 1;
                    }
                    wins
                })
            })
            .collect();
        let total: u32 = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(total, 160);
        refs.resolve(name, &*objects).unwrap();
    }
}
