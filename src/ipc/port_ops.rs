//! Port Operations - the public face of the port subsystem
//!
//! [`PortSystem`] bundles the registry, the ownership directory, the quota
//! tracker and the diagnostic counters into one value that the rest of the
//! kernel builds once and shares. Every user-visible port call is a method
//! on it:
//!
//! - lifecycle: `create_port`, `close_port`, `delete_port`,
//!   `delete_owned_ports`
//! - traffic: `write_port[_etc]`, `read_port[_etc]`, `port_buffer_size[_etc]`,
//!   `get_port_message_info[_etc]`
//! - queries: `find_port`, `port_count`, `get_port_info`,
//!   `get_next_port_info`
//! - ownership: `set_port_owner`
//! - readiness: `select_port`, `deselect_port`, `select`

use alloc::sync::Arc;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicUsize, Ordering};

use super::config::PortConfig;
use super::message::Message;
use super::ownership::OwnershipDirectory;
use super::port::{port_name, Port, PortIo, PortName, ReadMode, UNNAMED_PORT};
use super::quota::QuotaTracker;
use super::registry::Registry;
use super::select::{EventMask, SelectInfo, SelectSync};
use super::{IpcError, IpcResult};
use crate::kern::{CounterSnapshot, PortCounters, Platform, Timeout, WaitFlags};
use crate::types::{Credentials, PortId, TeamId};

// ============================================================================
// Port Info
// ============================================================================

/// Snapshot of one port as reported to callers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortInfo {
    pub port: PortId,
    pub team: TeamId,
    pub name: PortName,
    /// Zero once the port was closed
    pub capacity: usize,
    /// Messages currently queued
    pub queue_count: usize,
    /// Messages consumed over the port's lifetime
    pub total_count: u64,
}

/// Size and origin of a queued message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortMessageInfo {
    /// Payload size in bytes
    pub size: usize,
    pub sender: Credentials,
}

/// Diagnostic snapshot of a whole port system
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortStats {
    pub counters: CounterSnapshot,
    pub used_ports: usize,
    pub max_ports: usize,
    pub quota_committed: usize,
    pub quota_high_water: u64,
    pub quota_blocked: u64,
}

// ============================================================================
// Port System
// ============================================================================

/// All ports of one kernel instance
pub struct PortSystem<P: Platform> {
    config: PortConfig,
    platform: P,
    registry: Registry,
    owners: OwnershipDirectory,
    quota: Arc<QuotaTracker>,
    counters: PortCounters,
    used_ports: AtomicUsize,
}

impl<P: Platform> PortSystem<P> {
    pub fn new(config: PortConfig, platform: P) -> Self {
        log::debug!(
            "port system: {} ports, {} byte quota",
            config.max_ports,
            config.total_space_limit
        );
        Self {
            config,
            platform,
            registry: Registry::new(),
            owners: OwnershipDirectory::new(),
            quota: Arc::new(QuotaTracker::new(config.total_space_limit)),
            counters: PortCounters::new(),
            used_ports: AtomicUsize::new(0),
        }
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    pub fn config(&self) -> &PortConfig {
        &self.config
    }

    fn io(&self, flags: WaitFlags, timeout: Timeout) -> PortIo<'_> {
        PortIo {
            registry: &self.registry,
            quota: &self.quota,
            platform: &self.platform,
            counters: &self.counters,
            config: &self.config,
            flags,
            deadline: timeout.deadline(&self.platform),
        }
    }

    /// Resolve `id` to an active port
    fn get_port(&self, id: PortId) -> IpcResult<Arc<Port>> {
        if !id.is_valid() {
            return Err(IpcError::BadPortId);
        }
        self.registry.lookup(id).ok_or(IpcError::BadPortId)
    }

    /// Claim one unit of the port-count ceiling
    fn reserve_port_slot(&self) -> IpcResult<()> {
        let max = self.config.max_ports;
        self.used_ports
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| {
                (used < max).then_some(used + 1)
            })
            .map(|_| ())
            .map_err(|_| {
                log::warn!("port table full ({} ports)", max);
                IpcError::NoMoreResources
            })
    }

    fn release_port_slots(&self, count: usize) {
        self.used_ports.fetch_sub(count, Ordering::AcqRel);
        self.counters.ports_deleted.add(count as u64);
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Create a port owned by the calling team
    pub fn create_port(&self, capacity: usize, name: Option<&str>) -> IpcResult<PortId> {
        let team = self.platform.current_credentials().team;
        self.create_port_for(team, capacity, name)
    }

    /// Create a port owned by `team`
    pub fn create_port_for(
        &self,
        team: TeamId,
        capacity: usize,
        name: Option<&str>,
    ) -> IpcResult<PortId> {
        if capacity == 0 || capacity > self.config.max_queue_length {
            return Err(IpcError::BadValue);
        }
        if !team.is_valid() || !self.platform.team_exists(team) {
            return Err(IpcError::BadTeamId);
        }
        self.reserve_port_slot()?;

        let name = port_name(name.unwrap_or(UNNAMED_PORT));
        let port = self
            .registry
            .insert_new(|id| Arc::new(Port::new(id, team, capacity, name)));
        self.owners.insert_and_publish(&port);
        self.counters.ports_created.inc();

        log::debug!(
            "{}: created \"{}\" for {} (capacity {})",
            port.id(),
            port.name(),
            team,
            capacity
        );
        Ok(port.id())
    }

    /// Stop accepting writes; queued messages remain readable
    pub fn close_port(&self, id: PortId) -> IpcResult<()> {
        let port = self.get_port(id)?;
        port.close()?;
        // Writers waiting for quota on this port must notice.
        self.quota.wake_waiters();
        log::debug!("{}: closed", id);
        Ok(())
    }

    /// Delete a port, discarding its messages and waking every waiter
    pub fn delete_port(&self, id: PortId) -> IpcResult<()> {
        let port = self.get_port(id)?;
        if !port.mark_deleted() {
            return Err(IpcError::BadPortId);
        }

        self.registry.remove(&port);
        self.owners.remove(&port);
        port.tear_down();
        self.quota.wake_waiters();
        self.release_port_slots(1);

        log::debug!("{}: deleted", id);
        Ok(())
    }

    /// Delete every port `team` owns; returns how many were deleted
    ///
    /// Called when a team terminates.
    pub fn delete_owned_ports(&self, team: TeamId) -> usize {
        let retired = self.owners.drain_team(team);
        if retired.is_empty() {
            return 0;
        }

        self.registry.remove_all(&retired);
        for port in retired.iter() {
            port.tear_down();
        }
        self.quota.wake_waiters();
        self.release_port_slots(retired.len());

        log::debug!("{}: deleted {} owned ports", team, retired.len());
        retired.len()
    }

    // ========================================================================
    // Traffic
    // ========================================================================

    /// Write a message, waiting as long as it takes
    pub fn write_port(&self, id: PortId, code: i32, segments: &[&[u8]]) -> IpcResult<()> {
        self.write_port_etc(id, code, segments, WaitFlags::empty(), Timeout::Infinite)
    }

    /// Write a message whose payload is the concatenation of `segments`
    pub fn write_port_etc(
        &self,
        id: PortId,
        code: i32,
        segments: &[&[u8]],
        flags: WaitFlags,
        timeout: Timeout,
    ) -> IpcResult<()> {
        let port = self.get_port(id)?;
        self.io(flags, timeout).enqueue(&port, code, segments)
    }

    /// Read the next message, waiting as long as it takes
    pub fn read_port(&self, id: PortId, buffer: &mut [u8]) -> IpcResult<(i32, usize)> {
        self.read_port_etc(
            id,
            buffer,
            ReadMode::Consume,
            WaitFlags::empty(),
            Timeout::Infinite,
        )
    }

    /// Read (or peek at) the next message; returns its code and the number
    /// of bytes copied into `buffer`
    pub fn read_port_etc(
        &self,
        id: PortId,
        buffer: &mut [u8],
        mode: ReadMode,
        flags: WaitFlags,
        timeout: Timeout,
    ) -> IpcResult<(i32, usize)> {
        let port = self.get_port(id)?;
        self.io(flags, timeout).dequeue(&port, buffer, mode)
    }

    pub fn port_buffer_size(&self, id: PortId) -> IpcResult<usize> {
        self.port_buffer_size_etc(id, WaitFlags::empty(), Timeout::Infinite)
    }

    /// Payload size of the next message, without consuming it
    pub fn port_buffer_size_etc(
        &self,
        id: PortId,
        flags: WaitFlags,
        timeout: Timeout,
    ) -> IpcResult<usize> {
        let port = self.get_port(id)?;
        self.io(flags, timeout).inspect_next(&port, Message::size)
    }

    pub fn get_port_message_info(&self, id: PortId) -> IpcResult<PortMessageInfo> {
        self.get_port_message_info_etc(id, WaitFlags::empty(), Timeout::Infinite)
    }

    /// Size and sender of the next message, without consuming it
    pub fn get_port_message_info_etc(
        &self,
        id: PortId,
        flags: WaitFlags,
        timeout: Timeout,
    ) -> IpcResult<PortMessageInfo> {
        let port = self.get_port(id)?;
        self.io(flags, timeout).inspect_next(&port, |message| PortMessageInfo {
            size: message.size(),
            sender: message.sender(),
        })
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Lowest-id active port called `name`
    pub fn find_port(&self, name: &str) -> IpcResult<PortId> {
        self.registry
            .find_by_name(&port_name(name))
            .map(|port| port.id())
            .ok_or(IpcError::NameNotFound)
    }

    /// Messages currently queued on `id`
    pub fn port_count(&self, id: PortId) -> IpcResult<usize> {
        let port = self.get_port(id)?;
        let queue = port.lock_active()?;
        Ok(queue.count())
    }

    pub fn get_port_info(&self, id: PortId) -> IpcResult<PortInfo> {
        let port = self.get_port(id)?;
        fill_port_info(&port)
    }

    /// Next port of `team` after `cookie`, in id order
    ///
    /// Start with a cookie of zero. Fails with `BadValue` once the team has
    /// no further ports.
    pub fn get_next_port_info(&self, team: TeamId, cookie: &mut i32) -> IpcResult<PortInfo> {
        if !team.is_valid() || !self.platform.team_exists(team) {
            return Err(IpcError::BadTeamId);
        }

        let after = PortId(*cookie);
        for port in self.owners.ports_of(team) {
            if port.id() <= after {
                continue;
            }
            // Skip ports deleted since the snapshot.
            if let Ok(info) = fill_port_info(&port) {
                *cookie = port.id().0;
                return Ok(info);
            }
        }
        Err(IpcError::BadValue)
    }

    // ========================================================================
    // Ownership
    // ========================================================================

    /// Hand port `id` to `team`
    pub fn set_port_owner(&self, id: PortId, team: TeamId) -> IpcResult<()> {
        let port = self.get_port(id)?;
        if !team.is_valid() || !self.platform.team_exists(team) {
            return Err(IpcError::BadTeamId);
        }
        self.owners.transfer(&port, team)?;
        log::debug!("{}: now owned by {}", id, team);
        Ok(())
    }

    // ========================================================================
    // Readiness
    // ========================================================================

    /// Register interest in `mask` events on port `id`
    ///
    /// Events already pending are delivered before this returns. An empty
    /// mask registers nothing.
    pub fn select_port(
        &self,
        id: PortId,
        mask: EventMask,
        sync: Arc<SelectSync>,
    ) -> IpcResult<Arc<SelectInfo>> {
        let port = self.get_port(id)?;
        let info = SelectInfo::new(id, mask, sync);
        if !mask.is_empty() {
            port.select(info.clone())?;
        }
        Ok(info)
    }

    /// Drop a registration made with [`PortSystem::select_port`]
    pub fn deselect_port(&self, id: PortId, info: &Arc<SelectInfo>) -> IpcResult<()> {
        if info.selected().is_empty() {
            return Ok(());
        }
        let port = self.get_port(id)?;
        port.deselect(info)
    }

    /// Wait until at least one of `requests` is ready
    ///
    /// Returns every port with pending events and the events seen. A port
    /// that does not exist (or is closed) is reported as `INVALID` right
    /// away.
    pub fn select(
        &self,
        requests: &[(PortId, EventMask)],
        flags: WaitFlags,
        timeout: Timeout,
    ) -> IpcResult<Vec<(PortId, EventMask)>> {
        let deadline = timeout.deadline(&self.platform);
        let sync = SelectSync::new();

        let mut infos = Vec::with_capacity(requests.len());
        for &(id, mask) in requests {
            let info = match self.select_port(id, mask, sync.clone()) {
                Ok(info) => info,
                Err(_) => {
                    let info = SelectInfo::new(id, mask, sync.clone());
                    info.notify(EventMask::INVALID);
                    info
                }
            };
            infos.push(info);
        }

        let result = sync.wait_until(&self.platform, flags, deadline, || {
            infos.iter().any(|info| !info.events().is_empty())
        });

        for info in infos.iter() {
            // The port may be gone by now; that already dropped the entry.
            let _ = self.deselect_port(info.port(), info);
        }
        if let Err(e) = result {
            if e == IpcError::TimedOut {
                self.counters.timeouts.inc();
            }
            return Err(e);
        }

        Ok(infos
            .iter()
            .filter_map(|info| {
                let events = info.take_events();
                (!events.is_empty()).then(|| (info.port(), events))
            })
            .collect())
    }

    // ========================================================================
    // Statistics
    // ========================================================================

    pub fn max_ports(&self) -> usize {
        self.config.max_ports
    }

    /// Ports currently alive
    pub fn used_ports(&self) -> usize {
        self.used_ports.load(Ordering::Acquire)
    }

    /// Bytes of queued messages charged against the quota
    pub fn quota_committed(&self) -> usize {
        self.quota.committed()
    }

    pub fn stats(&self) -> PortStats {
        PortStats {
            counters: self.counters.snapshot(),
            used_ports: self.used_ports(),
            max_ports: self.max_ports(),
            quota_committed: self.quota.committed(),
            quota_high_water: self.quota.high_water(),
            quota_blocked: self.quota.blocked_reservations(),
        }
    }
}

fn fill_port_info(port: &Port) -> IpcResult<PortInfo> {
    let queue = port.lock_active()?;
    Ok(PortInfo {
        port: port.id(),
        team: port.owner(),
        name: port.name_key().clone(),
        capacity: queue.capacity(),
        queue_count: queue.count(),
        total_count: queue.total_count(),
    })
}
