//! Port implementation - the fundamental IPC primitive
//!
//! A port owns a bounded FIFO of [`Message`]s guarded by its own lock, two
//! wait queues (space freed / message arrived) and the readiness
//! registrations of select callers.
//!
//! Existence is decided by one atomic tri-state. The registry and the
//! ownership lists may still point at a port whose state is not `Active`
//! (not yet published, or already deleted); every lookup treats that as
//! "does not exist".
//!
//! Blocking calls drop the port lock before sleeping. After waking they
//! re-resolve the port by id and require the very same object, still
//! active, before touching the queue again.

use alloc::collections::VecDeque;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicI32, AtomicU8, Ordering};
use spin::{Mutex, MutexGuard};

use super::config::{PortConfig, PORT_NAME_LENGTH};
use super::message::Message;
use super::quota::QuotaTracker;
use super::registry::Registry;
use super::select::{EventMask, SelectInfo};
use super::{IpcError, IpcResult};
use crate::kern::copyio::{copyin_segments, copyout, segments_len};
use crate::kern::{Deadline, PortCounters, Platform, WaitFlags, WaitQueue, WaitResult};
use crate::types::{PortId, TeamId};

/// Port name storage
pub type PortName = heapless::String<PORT_NAME_LENGTH>;

/// Default name of ports created without one
pub const UNNAMED_PORT: &str = "unnamed port";

/// Build a port name, truncating on a char boundary if `name` is too long
pub fn port_name(name: &str) -> PortName {
    let mut end = name.len().min(PORT_NAME_LENGTH);
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    let mut out = PortName::new();
    // Cannot fail: `end` never exceeds the capacity.
    let _ = out.push_str(&name[..end]);
    out
}

// ============================================================================
// Port State
// ============================================================================

/// Port lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PortState {
    /// Allocated and possibly indexed, not yet published
    Unused = 0,
    /// Visible to lookups
    Active = 1,
    /// Logically gone; may still be referenced
    Deleted = 2,
}

impl PortState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => PortState::Unused,
            1 => PortState::Active,
            _ => PortState::Deleted,
        }
    }
}

/// Atomic holder of a [`PortState`] with one transition per direction
#[derive(Debug)]
struct AtomicPortState(AtomicU8);

impl AtomicPortState {
    const fn new() -> Self {
        Self(AtomicU8::new(PortState::Unused as u8))
    }

    fn load(&self) -> PortState {
        PortState::from_u8(self.0.load(Ordering::Acquire))
    }

    fn transition(&self, from: PortState, to: PortState) -> Result<(), PortState> {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(PortState::from_u8)
    }
}

/// Whether a read removes the message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadMode {
    #[default]
    Consume,
    /// Copy the head message but leave it queued
    Peek,
}

// ============================================================================
// Port Queue (lock-protected state)
// ============================================================================

/// Everything guarded by the port lock
#[derive(Debug)]
pub struct PortQueue {
    /// Maximum queued messages; zero once closed
    capacity: usize,
    /// Messages queued
    read_count: usize,
    /// Free slots not yet claimed by a writer
    write_count: usize,
    /// Messages consumed over the port's lifetime
    total_count: u64,
    messages: VecDeque<Message>,
    selectors: Vec<Arc<SelectInfo>>,
}

impl PortQueue {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            read_count: 0,
            write_count: capacity,
            total_count: 0,
            messages: VecDeque::new(),
            selectors: Vec::new(),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.capacity == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Messages currently queued
    pub fn count(&self) -> usize {
        self.read_count
    }

    pub fn free_slots(&self) -> usize {
        self.write_count
    }

    pub fn total_count(&self) -> u64 {
        self.total_count
    }

    pub fn front(&self) -> Option<&Message> {
        self.messages.front()
    }

    fn notify_select(&self, event: EventMask) {
        for info in self.selectors.iter() {
            info.notify(event);
        }
    }

    /// Deliver `INVALID` to every registration and forget them
    fn invalidate_selectors(&mut self) {
        self.notify_select(EventMask::INVALID);
        self.selectors.clear();
    }
}

// ============================================================================
// Port
// ============================================================================

/// A message port
#[derive(Debug)]
pub struct Port {
    id: PortId,
    /// Written only while the old and new owner shards are both locked
    owner: AtomicI32,
    name: PortName,
    state: AtomicPortState,
    queue: Mutex<PortQueue>,
    read_condition: WaitQueue,
    write_condition: WaitQueue,
}

impl Port {
    /// Create an unpublished port
    pub fn new(id: PortId, owner: TeamId, capacity: usize, name: PortName) -> Self {
        Self {
            id,
            owner: AtomicI32::new(owner.0),
            name,
            state: AtomicPortState::new(),
            queue: Mutex::new(PortQueue::new(capacity)),
            read_condition: WaitQueue::new(),
            write_condition: WaitQueue::new(),
        }
    }

    pub fn id(&self) -> PortId {
        self.id
    }

    pub fn owner(&self) -> TeamId {
        TeamId(self.owner.load(Ordering::Acquire))
    }

    pub(crate) fn set_owner(&self, team: TeamId) {
        self.owner.store(team.0, Ordering::Release);
    }

    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    pub(crate) fn name_key(&self) -> &PortName {
        &self.name
    }

    pub fn state(&self) -> PortState {
        self.state.load()
    }

    pub fn is_active(&self) -> bool {
        self.state() == PortState::Active
    }

    /// Publish the port (creation linearization point)
    pub(crate) fn activate(&self) -> bool {
        self.state
            .transition(PortState::Unused, PortState::Active)
            .is_ok()
    }

    /// Retire the port (deletion linearization point)
    ///
    /// Exactly one caller wins; it is responsible for unlinking the port.
    pub(crate) fn mark_deleted(&self) -> bool {
        self.state
            .transition(PortState::Active, PortState::Deleted)
            .is_ok()
    }

    pub fn lock(&self) -> MutexGuard<'_, PortQueue> {
        self.queue.lock()
    }

    /// Lock the port, failing if it is no longer active
    pub fn lock_active(&self) -> IpcResult<MutexGuard<'_, PortQueue>> {
        let queue = self.queue.lock();
        if !self.is_active() {
            return Err(IpcError::BadPortId);
        }
        Ok(queue)
    }

    /// Stop accepting writes and wake every waiter
    ///
    /// Queued messages stay readable. Closing twice is harmless.
    pub fn close(&self) -> IpcResult<()> {
        let mut queue = self.lock_active()?;
        queue.capacity = 0;
        queue.invalidate_selectors();
        drop(queue);

        self.read_condition.notify_all(WaitResult::Abnormal);
        self.write_condition.notify_all(WaitResult::Abnormal);
        Ok(())
    }

    /// Release everything a deleted port still holds
    ///
    /// Queued messages are dropped outside the lock, which returns their
    /// bytes to the quota.
    pub(crate) fn tear_down(&self) {
        let mut queue = self.lock();
        let drained = core::mem::take(&mut queue.messages);
        queue.read_count = 0;
        queue.invalidate_selectors();
        drop(queue);

        self.read_condition.notify_all(WaitResult::Abnormal);
        self.write_condition.notify_all(WaitResult::Abnormal);
        drop(drained);
    }

    /// Register a readiness interest; already-satisfied events fire at once
    pub fn select(&self, info: Arc<SelectInfo>) -> IpcResult<()> {
        let mut queue = self.lock_active()?;
        if queue.is_closed() {
            return Err(IpcError::BadPortId);
        }

        if queue.read_count > 0 {
            info.notify(EventMask::READ);
        }
        if queue.write_count > 0 {
            info.notify(EventMask::WRITE);
        }
        queue.selectors.push(info);
        Ok(())
    }

    /// Drop a registration made with [`Port::select`]
    pub fn deselect(&self, info: &Arc<SelectInfo>) -> IpcResult<()> {
        let mut queue = self.lock_active()?;
        queue.selectors.retain(|s| !Arc::ptr_eq(s, info));
        Ok(())
    }

    /// Give back a claimed queue slot after a failed write
    fn return_slot(&self) {
        let mut queue = self.lock();
        if !queue.is_closed() {
            queue.write_count += 1;
        }
        drop(queue);
        self.write_condition.notify_one();
    }
}

// ============================================================================
// Blocking I/O
// ============================================================================

/// Everything a blocking port operation needs besides the port itself
pub struct PortIo<'a> {
    pub registry: &'a Registry,
    pub quota: &'a Arc<QuotaTracker>,
    pub platform: &'a dyn Platform,
    pub counters: &'a PortCounters,
    pub config: &'a PortConfig,
    pub flags: WaitFlags,
    pub deadline: Deadline,
}

impl PortIo<'_> {
    /// Re-resolve `port` by id after sleeping and lock it
    ///
    /// Fails with `BadPortId` unless the id still names this very object
    /// and the object is still active.
    fn revalidate<'p>(&self, port: &'p Arc<Port>) -> IpcResult<MutexGuard<'p, PortQueue>> {
        match self.registry.lookup(port.id()) {
            Some(current) if Arc::ptr_eq(&current, port) => port.lock_active(),
            _ => Err(IpcError::BadPortId),
        }
    }

    fn wait_failed(&self, result: WaitResult) -> IpcResult<()> {
        match result {
            WaitResult::Normal => Ok(()),
            WaitResult::Abnormal => Err(IpcError::BadPortId),
            WaitResult::TimedOut => {
                self.counters.timeouts.inc();
                Err(IpcError::TimedOut)
            }
            WaitResult::Interrupted => Err(IpcError::Interrupted),
        }
    }

    /// Append a message, waiting for a free slot and for quota as allowed
    pub fn enqueue(&self, port: &Arc<Port>, code: i32, segments: &[&[u8]]) -> IpcResult<()> {
        let size = segments_len(segments)?;
        if size > self.config.max_message_size {
            return Err(IpcError::BadValue);
        }

        let mut queue = port.lock_active()?;
        loop {
            if queue.is_closed() {
                return Err(IpcError::BadPortId);
            }
            if queue.write_count > 0 {
                break;
            }
            if self.deadline.is_immediate() {
                return Err(IpcError::WouldBlock);
            }

            let waiter = port.write_condition.prepare();
            drop(queue);

            log::trace!("{}: writer waiting for a free slot", port.id());
            self.counters.write_blocks.inc();
            let result = waiter.wait(self.platform, self.flags, self.deadline);

            queue = self.revalidate(port)?;
            self.wait_failed(result)?;
        }

        // The slot is ours from here on; every failure below gives it back.
        queue.write_count -= 1;
        drop(queue);

        let cost = PortConfig::message_cost(size);
        let alive = || port.is_active() && !port.lock().is_closed();
        let charge = match self
            .quota
            .reserve(cost, self.platform, self.flags, self.deadline, alive)
        {
            Ok(charge) => charge,
            Err(e) => {
                port.return_slot();
                return Err(e);
            }
        };

        let data = match copyin_segments(segments, self.config.max_message_size) {
            Ok(data) => data,
            Err(e) => {
                port.return_slot();
                return Err(e.into());
            }
        };
        let message = Message::new(
            code,
            self.platform.current_credentials(),
            data,
            charge,
        );

        let mut queue = self.revalidate(port)?;
        if queue.is_closed() {
            drop(queue);
            port.return_slot();
            return Err(IpcError::BadPortId);
        }

        queue.messages.push_back(message);
        queue.read_count += 1;
        queue.notify_select(EventMask::READ);
        drop(queue);
        port.read_condition.notify_one();

        self.counters.messages_written.inc();
        self.counters.bytes_written.add(size as u64);
        Ok(())
    }

    /// Wait until at least one message is queued; returns the locked queue
    fn wait_for_message<'p>(&self, port: &'p Arc<Port>) -> IpcResult<MutexGuard<'p, PortQueue>> {
        let mut queue = port.lock_active()?;
        while queue.read_count == 0 {
            if queue.is_closed() {
                return Err(IpcError::BadPortId);
            }
            if self.deadline.is_immediate() {
                return Err(IpcError::WouldBlock);
            }

            let waiter = port.read_condition.prepare();
            drop(queue);

            log::trace!("{}: reader waiting for a message", port.id());
            self.counters.read_blocks.inc();
            let result = waiter.wait(self.platform, self.flags, self.deadline);

            queue = self.revalidate(port)?;
            self.wait_failed(result)?;
        }
        Ok(queue)
    }

    /// Take (or peek at) the head message, copying at most `buffer.len()`
    /// bytes of it; returns the message code and the bytes copied
    ///
    /// A consumed message is discarded whole, even if it was truncated.
    pub fn dequeue(
        &self,
        port: &Arc<Port>,
        buffer: &mut [u8],
        mode: ReadMode,
    ) -> IpcResult<(i32, usize)> {
        let mut queue = self.wait_for_message(port)?;

        match mode {
            ReadMode::Peek => {
                let message = queue.front().ok_or(IpcError::BadPortId)?;
                let copied = copyout(message.data(), buffer);
                let code = message.code();

                // Still available: pass the wakeup on.
                queue.notify_select(EventMask::READ);
                drop(queue);
                port.read_condition.notify_one();
                Ok((code, copied))
            }
            ReadMode::Consume => {
                let message = queue.messages.pop_front().ok_or(IpcError::BadPortId)?;
                queue.read_count -= 1;
                queue.total_count += 1;
                if !queue.is_closed() {
                    queue.write_count += 1;
                }
                queue.notify_select(EventMask::WRITE);
                drop(queue);
                port.write_condition.notify_one();

                let copied = copyout(message.data(), buffer);
                self.counters.messages_read.inc();
                Ok((message.code(), copied))
            }
        }
    }

    /// Inspect the next message without consuming it, waiting for one if
    /// allowed
    pub fn inspect_next<T>(
        &self,
        port: &Arc<Port>,
        inspect: impl FnOnce(&Message) -> T,
    ) -> IpcResult<T> {
        let queue = self.wait_for_message(port)?;
        let seen = queue.front().map(inspect).ok_or(IpcError::BadPortId)?;

        // Still available: pass the wakeup on.
        queue.notify_select(EventMask::READ);
        drop(queue);
        port.read_condition.notify_one();
        Ok(seen)
    }
}
