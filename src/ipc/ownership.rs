//! Ownership directory - the ports each team owns
//!
//! The directory is split into [`OWNER_SHARDS`] independently locked shards
//! keyed by `team mod OWNER_SHARDS`, so unrelated teams rarely contend.
//!
//! A port's owner field is only written while the shards of both the old
//! and the new owner are held. Holding the shard of the owner a port
//! currently reports therefore pins that owner. Operations that need two
//! shards always take the lower shard index first.

use alloc::collections::BTreeMap;
use alloc::sync::Arc;
use alloc::vec::Vec;
use spin::{Mutex, MutexGuard};

use super::config::OWNER_SHARDS;
use super::port::Port;
use super::{IpcError, IpcResult};
use crate::types::{PortId, TeamId};

type TeamPorts = BTreeMap<TeamId, BTreeMap<PortId, Arc<Port>>>;

/// Shard holding `team`'s port list
pub fn shard_index(team: TeamId) -> usize {
    (team.0 as u32 as usize) % OWNER_SHARDS
}

/// Per-team port lists, sharded by team id
#[derive(Debug)]
pub struct OwnershipDirectory {
    shards: [Mutex<TeamPorts>; OWNER_SHARDS],
}

impl OwnershipDirectory {
    pub fn new() -> Self {
        Self {
            shards: core::array::from_fn(|_| Mutex::new(BTreeMap::new())),
        }
    }

    fn shard(&self, team: TeamId) -> MutexGuard<'_, TeamPorts> {
        self.shards[shard_index(team)].lock()
    }

    /// Lock the shard of the port's current owner
    ///
    /// Retries if the owner changes between reading it and getting the lock.
    fn lock_owner_shard(&self, port: &Port) -> (TeamId, MutexGuard<'_, TeamPorts>) {
        loop {
            let owner = port.owner();
            let shard = self.shard(owner);
            if port.owner() == owner {
                return (owner, shard);
            }
        }
    }

    /// Add `port` to its owner's list and publish it
    ///
    /// The port becomes `Active` while the shard is still held, so a
    /// concurrent bulk delete of the owner either misses the port entirely
    /// or sees it fully published.
    pub fn insert_and_publish(&self, port: &Arc<Port>) -> bool {
        let (owner, mut shard) = self.lock_owner_shard(port);
        shard
            .entry(owner)
            .or_default()
            .insert(port.id(), port.clone());
        port.activate()
    }

    /// Remove `port` from its owner's list; false if it was not listed
    pub fn remove(&self, port: &Arc<Port>) -> bool {
        let (owner, mut shard) = self.lock_owner_shard(port);
        let Some(list) = shard.get_mut(&owner) else {
            return false;
        };

        let removed = list
            .get(&port.id())
            .is_some_and(|listed| Arc::ptr_eq(listed, port));
        if removed {
            list.remove(&port.id());
            if list.is_empty() {
                shard.remove(&owner);
            }
        }
        removed
    }

    /// Move `port` to `new_owner`'s list
    ///
    /// Fails with `BadPortId` without touching either list if the port was
    /// deleted before both shards could be locked.
    pub fn transfer(&self, port: &Arc<Port>, new_owner: TeamId) -> IpcResult<()> {
        loop {
            let old_owner = port.owner();
            let from = shard_index(old_owner);
            let to = shard_index(new_owner);

            let (mut first, mut second) = if from == to {
                (self.shards[from].lock(), None)
            } else {
                let lo = self.shards[from.min(to)].lock();
                let hi = self.shards[from.max(to)].lock();
                (lo, Some(hi))
            };

            if port.owner() != old_owner {
                continue;
            }
            if !port.is_active() {
                return Err(IpcError::BadPortId);
            }
            if old_owner == new_owner {
                return Ok(());
            }

            let (source, target) = match second.as_mut() {
                None => (&mut *first, None),
                Some(hi) if from < to => (&mut *first, Some(&mut **hi)),
                Some(hi) => (&mut **hi, Some(&mut *first)),
            };

            let moved = source
                .get_mut(&old_owner)
                .and_then(|list| list.remove(&port.id()));
            if source.get(&old_owner).is_some_and(|list| list.is_empty()) {
                source.remove(&old_owner);
            }
            let moved = moved.unwrap_or_else(|| port.clone());

            target
                .unwrap_or(source)
                .entry(new_owner)
                .or_default()
                .insert(port.id(), moved);
            port.set_owner(new_owner);
            return Ok(());
        }
    }

    /// Retire every port `team` owns
    ///
    /// Under one acquisition of the team's shard, each listed port is
    /// flipped to `Deleted` and the list is detached. Returns the ports this
    /// call retired; ports someone else was already deleting are dropped
    /// from the list and left to that deleter.
    pub fn drain_team(&self, team: TeamId) -> Vec<Arc<Port>> {
        let mut shard = self.shard(team);
        let retired = shard.remove(&team).map(retire_all).unwrap_or_default();
        drop(shard);
        retired
    }

    /// Snapshot of `team`'s ports in id order
    pub fn ports_of(&self, team: TeamId) -> Vec<Arc<Port>> {
        self.shard(team)
            .get(&team)
            .map(|list| list.values().cloned().collect())
            .unwrap_or_default()
    }
}

/// Flip each port to `Deleted`, keeping those this caller won
fn retire_all(list: BTreeMap<PortId, Arc<Port>>) -> Vec<Arc<Port>> {
    list.into_values()
        .filter(|port| port.mark_deleted())
        .collect()
}

impl Default for OwnershipDirectory {
    fn default() -> Self {
        Self::new()
    }
}
