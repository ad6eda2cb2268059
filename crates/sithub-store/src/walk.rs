//! Graph traversal over the object DAG.

use std::collections::HashSet;

use sithub_types::ObjectId;

use crate::error::{StoreError, StoreResult};
use crate::traits::ObjectStore;

/// Lazy depth-first walk of everything reachable from a set of roots.
///
/// Each object is yielded at most once, before its referents (pre-order).
/// The order is deterministic for a given store content and root order.
/// A referenced id that is absent from the store ends the walk with
/// [`StoreError::NotFound`].
pub struct ReachableWalk<'a> {
    store: &'a dyn ObjectStore,
    stack: Vec<ObjectId>,
    visited: HashSet<ObjectId>,
    failed: bool,
}

impl<'a> ReachableWalk<'a> {
    pub fn new(store: &'a dyn ObjectStore, roots: &[ObjectId]) -> Self {
        Self {
            store,
            stack: roots.iter().rev().copied().collect(),
            visited: HashSet::new(),
            failed: false,
        }
    }

    fn visit(&mut self, id: ObjectId) -> StoreResult<()> {
        let obj = self.store.read(&id)?.ok_or(StoreError::NotFound(id))?;
        for child in obj.references()?.into_iter().rev() {
            if !self.visited.contains(&child) {
                self.stack.push(child);
            }
        }
        Ok(())
    }
}

impl Iterator for ReachableWalk<'_> {
    type Item = StoreResult<ObjectId>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        while let Some(id) = self.stack.pop() {
            if !self.visited.insert(id) {
                continue;
            }
            if let Err(e) = self.visit(id) {
                self.failed = true;
                return Some(Err(e));
            }
            return Some(Ok(id));
        }
        None
    }
}

/// Start a [`ReachableWalk`] from `roots`.
pub fn walk_reachable<'a>(store: &'a dyn ObjectStore, roots: &[ObjectId]) -> ReachableWalk<'a> {
    ReachableWalk::new(store, roots)
}

/// Collect the full reachable closure of `roots`.
pub fn reachable_set(store: &dyn ObjectStore, roots: &[ObjectId]) -> StoreResult<HashSet<ObjectId>> {
    walk_reachable(store, roots).collect()
}

/// Objects reachable from `roots` but not in `exclude`, ordered so that
/// every object comes after everything it references.
///
/// Traversal does not descend into excluded ids; callers pass a closed set
/// (e.g. the closure of what the receiver already has).
pub fn topo_order(
    store: &dyn ObjectStore,
    roots: &[ObjectId],
    exclude: &HashSet<ObjectId>,
) -> StoreResult<Vec<ObjectId>> {
    let mut order = Vec::new();
    let mut seen: HashSet<ObjectId> = HashSet::new();
    // (id, children already pushed)
    let mut stack: Vec<(ObjectId, bool)> = roots.iter().rev().map(|id| (*id, false)).collect();

    while let Some((id, expanded)) = stack.pop() {
        if expanded {
            order.push(id);
            continue;
        }
        if exclude.contains(&id) || !seen.insert(id) {
            continue;
        }
        let obj = store.read(&id)?.ok_or(StoreError::NotFound(id))?;
        stack.push((id, true));
        for child in obj.references()?.into_iter().rev() {
            if !seen.contains(&child) && !exclude.contains(&child) {
                stack.push((child, false));
            }
        }
    }
    Ok(order)
}
