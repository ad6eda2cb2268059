use std::collections::HashSet;

use sithub_protocol::AdvertisedRef;
use sithub_refs::{RefError, RefStore, RefTarget};
use sithub_store::{reachable_set, topo_order, ObjectStore};
use sithub_types::ObjectId;
use tracing::debug;

use crate::error::{SyncError, SyncResult};
use crate::types::Negotiation;

/// Have/want computation for both ends of a transfer.
pub struct NegotiationEngine;

impl NegotiationEngine {
    /// Tips the local repository can prove it holds: every ref that resolves
    /// to an object present in `objects`. Unborn, dangling and cyclic refs are
    /// skipped.
    pub fn compute_haves(refs: &dyn RefStore, objects: &dyn ObjectStore) -> SyncResult<Vec<ObjectId>> {
        let mut seen = HashSet::new();
        let mut haves = Vec::new();
        for (name, _) in refs.list()? {
            match refs.resolve(&name, objects) {
                Ok(id) => {
                    if seen.insert(id) {
                        haves.push(id);
                    }
                }
                Err(
                    RefError::NotFound { .. }
                    | RefError::DanglingReference { .. }
                    | RefError::CyclicReference { .. },
                ) => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(haves)
    }

    /// Direct targets in the advertisement that `objects` does not hold, in
    /// advertisement order without duplicates.
    pub fn compute_wants(
        advertised: &[AdvertisedRef],
        objects: &dyn ObjectStore,
    ) -> SyncResult<Vec<ObjectId>> {
        let mut seen = HashSet::new();
        let mut wants = Vec::new();
        for adv in advertised {
            if let RefTarget::Direct(id) = adv.target {
                if seen.insert(id) && !objects.contains(&id)? {
                    wants.push(id);
                }
            }
        }
        Ok(wants)
    }

    /// Client side: full negotiation against an advertisement.
    pub fn negotiate(
        refs: &dyn RefStore,
        objects: &dyn ObjectStore,
        advertised: &[AdvertisedRef],
    ) -> SyncResult<Negotiation> {
        let wants = Self::compute_wants(advertised, objects)?;
        let haves = Self::compute_haves(refs, objects)?;
        Ok(Negotiation { wants, haves })
    }

    /// Server side: the transfer set `reachable(wants) - reachable(haves)`,
    /// ordered so every object follows everything it references.
    ///
    /// Haves the server does not hold are ignored. A want it does not hold is
    /// [`SyncError::MissingWant`].
    pub fn plan_transfer(
        objects: &dyn ObjectStore,
        wants: &[ObjectId],
        haves: &[ObjectId],
    ) -> SyncResult<Vec<ObjectId>> {
        for want in wants {
            if !objects.contains(want)? {
                return Err(SyncError::MissingWant(*want));
            }
        }
        let mut known = Vec::with_capacity(haves.len());
        for have in haves {
            if objects.contains(have)? {
                known.push(*have);
            }
        }
        let exclude = reachable_set(objects, &known)?;
        let plan = topo_order(objects, wants, &exclude)?;
        debug!(
            wants = wants.len(),
            haves = known.len(),
            excluded = exclude.len(),
            objects = plan.len(),
            "planned transfer"
        );
        Ok(plan)
    }
}
