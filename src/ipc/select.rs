//! Port readiness notification
//!
//! A caller that wants to multiplex over several ports registers a
//! [`SelectInfo`] on each of them. All infos of one select call share a
//! [`SelectSync`], which is the single point the caller sleeps on. Ports
//! mark events on the infos as they happen:
//!
//! - a successful write marks [`EventMask::READ`]
//! - a successful read marks [`EventMask::WRITE`]
//! - close and delete mark [`EventMask::INVALID`] and drop the registration
//!
//! `INVALID` is delivered to every registration regardless of the mask it
//! was made with, so no selector can sleep forever on a port that is gone.

use alloc::sync::Arc;
use bitflags::bitflags;
use core::sync::atomic::{AtomicU32, Ordering};

use super::{IpcError, IpcResult};
use crate::kern::{Deadline, Platform, WaitFlags, WaitQueue, WaitResult};
use crate::types::PortId;

bitflags! {
    /// Readiness events a port can report
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct EventMask: u32 {
        /// A message is queued
        const READ = 0x0001;
        /// A queue slot is free
        const WRITE = 0x0002;
        /// The port was closed or deleted
        const INVALID = 0x1000;
    }
}

// ============================================================================
// Select Sync
// ============================================================================

/// Wakeup point shared by every registration of one select call
#[derive(Debug, Default)]
pub struct SelectSync {
    waiters: WaitQueue,
}

impl SelectSync {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Wake whoever sleeps on this sync
    pub fn notify(&self) {
        self.waiters.notify_all(WaitResult::Normal);
    }

    /// Sleep until `ready` holds
    ///
    /// `ready` is re-checked after the waiter is queued, so an event that
    /// fires between the first check and the sleep is not missed.
    pub fn wait_until(
        &self,
        platform: &dyn Platform,
        flags: WaitFlags,
        deadline: Deadline,
        mut ready: impl FnMut() -> bool,
    ) -> IpcResult<()> {
        loop {
            if ready() {
                return Ok(());
            }
            if deadline.is_immediate() {
                return Err(IpcError::WouldBlock);
            }

            let waiter = self.waiters.prepare();
            if ready() {
                return Ok(());
            }
            match waiter.wait(platform, flags, deadline) {
                WaitResult::Normal | WaitResult::Abnormal => continue,
                WaitResult::TimedOut => return Err(IpcError::TimedOut),
                WaitResult::Interrupted => return Err(IpcError::Interrupted),
            }
        }
    }
}

// ============================================================================
// Select Info
// ============================================================================

/// One standing readiness registration on one port
#[derive(Debug)]
pub struct SelectInfo {
    port: PortId,
    selected: EventMask,
    events: AtomicU32,
    sync: Arc<SelectSync>,
}

impl SelectInfo {
    pub fn new(port: PortId, selected: EventMask, sync: Arc<SelectSync>) -> Arc<Self> {
        Arc::new(Self {
            port,
            selected,
            events: AtomicU32::new(0),
            sync,
        })
    }

    pub fn port(&self) -> PortId {
        self.port
    }

    /// Events this registration asked for
    pub fn selected(&self) -> EventMask {
        self.selected
    }

    /// Events delivered so far
    pub fn events(&self) -> EventMask {
        EventMask::from_bits_truncate(self.events.load(Ordering::Acquire))
    }

    /// Read and clear the delivered events
    pub fn take_events(&self) -> EventMask {
        EventMask::from_bits_truncate(self.events.swap(0, Ordering::AcqRel))
    }

    /// Deliver `event` if selected; returns whether anything was delivered
    pub fn notify(&self, event: EventMask) -> bool {
        let hit = (self.selected | EventMask::INVALID) & event;
        if hit.is_empty() {
            return false;
        }
        self.events.fetch_or(hit.bits(), Ordering::AcqRel);
        self.sync.notify();
        true
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;
    use crate::kern::{HostPlatform, Timeout};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_notify_respects_mask() {
        let sync = SelectSync::new();
        let info = SelectInfo::new(PortId(1), EventMask::READ, sync);

        assert!(!info.notify(EventMask::WRITE));
        assert!(info.events().is_empty());

        assert!(info.notify(EventMask::READ));
        assert_eq!(info.events(), EventMask::READ);
    }

    #[test]
    fn test_invalid_is_always_selected() {
        let sync = SelectSync::new();
        let info = SelectInfo::new(PortId(1), EventMask::WRITE, sync);
        assert!(!info.selected().contains(EventMask::INVALID));
        assert!(info.notify(EventMask::INVALID));
        assert_eq!(info.take_events(), EventMask::INVALID);
        assert!(info.events().is_empty());
    }

    #[test]
    fn test_wait_until_woken_by_notify() {
        let platform = HostPlatform::default();
        let sync = SelectSync::new();
        let info = SelectInfo::new(PortId(4), EventMask::READ, sync.clone());

        thread::scope(|s| {
            s.spawn(|| {
                thread::sleep(Duration::from_millis(10));
                info.notify(EventMask::READ);
            });
            let result = sync.wait_until(&platform, WaitFlags::empty(), Deadline::Never, || {
                !info.events().is_empty()
            });
            assert_eq!(result, Ok(()));
        });
    }

    #[test]
    fn test_wait_until_timeout_and_nonblocking() {
        let platform = HostPlatform::default();
        let sync = SelectSync::new();

        let flags = WaitFlags::empty();
        let result = sync.wait_until(&platform, flags, Deadline::Immediate, || false);
        assert_eq!(result, Err(IpcError::WouldBlock));

        let deadline = Timeout::Relative(2_000).deadline(&platform);
        let result = sync.wait_until(&platform, flags, deadline, || false);
        assert_eq!(result, Err(IpcError::TimedOut));
    }
}
