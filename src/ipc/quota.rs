//! Global quota on queued message bytes
//!
//! Every port draws from one system-wide budget. A writer that would push
//! the committed total over the ceiling waits on a shared "space freed"
//! queue; every release wakes all such writers, since reservations of
//! different sizes may now fit. There is no per-port sub-quota and no
//! fairness between ports.

use alloc::sync::Arc;
use core::sync::atomic::{AtomicUsize, Ordering};

use super::{IpcError, IpcResult};
use crate::kern::counters::Counter;
use crate::kern::{Deadline, Platform, WaitFlags, WaitQueue, WaitResult};

/// System-wide byte budget for queued messages
#[derive(Debug)]
pub struct QuotaTracker {
    committed: AtomicUsize,
    limit: usize,
    no_space: WaitQueue,
    blocked: Counter,
    high_water: Counter,
}

impl QuotaTracker {
    pub fn new(limit: usize) -> Self {
        Self {
            committed: AtomicUsize::new(0),
            limit,
            no_space: WaitQueue::new(),
            blocked: Counter::new(),
            high_water: Counter::new(),
        }
    }

    /// Bytes currently committed
    pub fn committed(&self) -> usize {
        self.committed.load(Ordering::Acquire)
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// How many reservations had to wait for space
    pub fn blocked_reservations(&self) -> u64 {
        self.blocked.get()
    }

    /// Highest committed total observed
    pub fn high_water(&self) -> u64 {
        self.high_water.get()
    }

    /// Commit `bytes` if they fit; the total never exceeds the limit
    fn try_commit(&self, bytes: usize) -> bool {
        let limit = self.limit;
        let fits = |committed: usize| committed.checked_add(bytes).filter(|t| *t <= limit);
        match self.committed.fetch_update(Ordering::AcqRel, Ordering::Acquire, fits) {
            Ok(previous) => {
                self.high_water.update_max((previous + bytes) as u64);
                true
            }
            Err(_) => false,
        }
    }

    /// Reserve `bytes`, waiting for space if the ceiling would be exceeded
    ///
    /// The caller must not hold any port lock. `alive` is re-checked every
    /// time the reservation would sleep; once it reports false the call
    /// fails with `BadPortId`. Whoever makes it false must call
    /// [`QuotaTracker::wake_waiters`].
    pub fn reserve(
        self: &Arc<Self>,
        bytes: usize,
        platform: &dyn Platform,
        flags: WaitFlags,
        deadline: Deadline,
        alive: impl Fn() -> bool,
    ) -> IpcResult<QuotaCharge> {
        if bytes > self.limit {
            return Err(IpcError::NoMemory);
        }

        loop {
            if self.try_commit(bytes) {
                return Ok(self.charge(bytes));
            }
            if deadline.is_immediate() {
                return Err(IpcError::WouldBlock);
            }

            // Register before the re-checks so a release or a port teardown
            // racing with the failed attempt above still reaches us.
            let waiter = self.no_space.prepare();
            if self.try_commit(bytes) {
                return Ok(self.charge(bytes));
            }
            if !alive() {
                return Err(IpcError::BadPortId);
            }

            log::warn!(
                "port quota exhausted ({} of {} bytes), waiting for {} bytes",
                self.committed(),
                self.limit,
                bytes
            );
            self.blocked.inc();
            match waiter.wait(platform, flags, deadline) {
                WaitResult::Normal | WaitResult::Abnormal => continue,
                WaitResult::TimedOut => return Err(IpcError::TimedOut),
                WaitResult::Interrupted => return Err(IpcError::Interrupted),
            }
        }
    }

    /// Return `bytes` to the budget and wake every waiting reserver
    pub fn release(&self, bytes: usize) {
        self.committed.fetch_sub(bytes, Ordering::AcqRel);
        self.wake_waiters();
    }

    /// Make every waiting reserver look again
    pub fn wake_waiters(&self) {
        self.no_space.notify_all(WaitResult::Normal);
    }

    fn charge(self: &Arc<Self>, bytes: usize) -> QuotaCharge {
        QuotaCharge {
            tracker: self.clone(),
            bytes,
        }
    }
}

/// Committed bytes, released back to the tracker on drop
#[derive(Debug)]
pub struct QuotaCharge {
    tracker: Arc<QuotaTracker>,
    bytes: usize,
}

impl QuotaCharge {
    pub fn bytes(&self) -> usize {
        self.bytes
    }
}

impl Drop for QuotaCharge {
    fn drop(&mut self) {
        self.tracker.release(self.bytes);
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;
    use crate::kern::{HostPlatform, Timeout};
    use core::sync::atomic::AtomicBool;
    use std::thread;
    use std::time::Duration;

    fn reserve(
        quota: &Arc<QuotaTracker>,
        platform: &HostPlatform,
        bytes: usize,
        deadline: Deadline,
    ) -> IpcResult<QuotaCharge> {
        quota.reserve(bytes, platform, WaitFlags::empty(), deadline, || true)
    }

    #[test]
    fn test_reserve_and_release() {
        let platform = HostPlatform::default();
        let quota = Arc::new(QuotaTracker::new(100));

        let a = reserve(&quota, &platform, 60, Deadline::Never).unwrap();
        assert_eq!(quota.committed(), 60);
        assert_eq!(a.bytes(), 60);

        drop(a);
        assert_eq!(quota.committed(), 0);
        assert_eq!(quota.high_water(), 60);
    }

    #[test]
    fn test_nonblocking_over_ceiling() {
        let platform = HostPlatform::default();
        let quota = Arc::new(QuotaTracker::new(100));
        let _held = reserve(&quota, &platform, 80, Deadline::Never).unwrap();

        let result = reserve(&quota, &platform, 30, Deadline::Immediate);
        assert_eq!(result.unwrap_err(), IpcError::WouldBlock);
        assert_eq!(quota.committed(), 80);
    }

    #[test]
    fn test_reserve_times_out() {
        let platform = HostPlatform::default();
        let quota = Arc::new(QuotaTracker::new(100));
        let _held = reserve(&quota, &platform, 80, Deadline::Never).unwrap();

        let deadline = Timeout::Relative(5_000).deadline(&platform);
        let result = reserve(&quota, &platform, 30, deadline);
        assert_eq!(result.unwrap_err(), IpcError::TimedOut);
        assert_eq!(quota.committed(), 80);
        assert_eq!(quota.blocked_reservations(), 1);
    }

    #[test]
    fn test_oversized_reservation_fails() {
        let platform = HostPlatform::default();
        let quota = Arc::new(QuotaTracker::new(100));
        let result = reserve(&quota, &platform, 101, Deadline::Never);
        assert_eq!(result.unwrap_err(), IpcError::NoMemory);
    }

    #[test]
    fn test_release_wakes_blocked_reservers() {
        let platform = HostPlatform::default();
        let quota = Arc::new(QuotaTracker::new(100));
        let held = reserve(&quota, &platform, 100, Deadline::Never).unwrap();

        thread::scope(|s| {
            let waiters: std::vec::Vec<_> = (0..2)
                .map(|_| s.spawn(|| reserve(&quota, &platform, 40, Deadline::Never)))
                .collect();

            thread::sleep(Duration::from_millis(20));
            drop(held);

            for w in waiters {
                assert_eq!(w.join().unwrap().map(|c| c.bytes()), Ok(40));
            }
        });

        assert_eq!(quota.committed(), 0);
    }

    #[test]
    fn test_dead_owner_ends_the_wait() {
        let platform = HostPlatform::default();
        let quota = Arc::new(QuotaTracker::new(100));
        let _held = reserve(&quota, &platform, 100, Deadline::Never).unwrap();
        let alive = AtomicBool::new(true);

        thread::scope(|s| {
            let waiter = s.spawn(|| {
                quota.reserve(10, &platform, WaitFlags::empty(), Deadline::Never, || {
                    alive.load(Ordering::Acquire)
                })
            });
            thread::sleep(Duration::from_millis(20));

            alive.store(false, Ordering::Release);
            quota.wake_waiters();
            assert_eq!(waiter.join().unwrap().unwrap_err(), IpcError::BadPortId);
        });

        assert_eq!(quota.committed(), 100);
    }

    #[test]
    fn test_failed_attempt_never_overcommits() {
        let platform = HostPlatform::default();
        let quota = Arc::new(QuotaTracker::new(100));
        let _held = reserve(&quota, &platform, 50, Deadline::Never).unwrap();
        let done = AtomicBool::new(false);

        thread::scope(|s| {
            // Never fits next to the held 50 bytes.
            s.spawn(|| {
                while !done.load(Ordering::Acquire) {
                    let result = reserve(&quota, &platform, 60, Deadline::Immediate);
                    assert_eq!(result.unwrap_err(), IpcError::WouldBlock);
                }
            });

            for _ in 0..20_000 {
                let charge = reserve(&quota, &platform, 10, Deadline::Immediate);
                assert!(charge.is_ok());
                assert!(quota.committed() <= quota.limit());
            }
            done.store(true, Ordering::Release);
        });

        assert_eq!(quota.committed(), 50);
        assert!(quota.high_water() <= 100);
    }
}
