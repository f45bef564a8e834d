//! Scheduling Primitives - Wait queues with deadlines and interruption
//!
//! A [`WaitQueue`] is the condition-variable half of a monitor: the caller
//! enqueues a [`Waiter`] while still holding the lock that protects the
//! condition, drops that lock, then blocks in [`Waiter::wait`]. Because the
//! notifier must take the same lock before changing the condition, a wakeup
//! can never slip in between the check and the enqueue.
//!
//! Waking a thread only says "look again". Callers re-validate everything
//! they cached before sleeping, including whether the object they waited on
//! still exists.

use alloc::collections::VecDeque;
use alloc::sync::Arc;
use bitflags::bitflags;
use core::sync::atomic::{AtomicU8, Ordering};
use spin::Mutex;

use crate::kern::platform::Platform;
use crate::kern::timer::Deadline;

// ============================================================================
// Wait Results
// ============================================================================

/// Result of a wait operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WaitResult {
    /// Thread was awakened normally
    Normal = 1,
    /// Thread was awakened because the object it waited on went away
    Abnormal = 2,
    /// Thread was interrupted
    Interrupted = 3,
    /// Wait timed out
    TimedOut = 4,
}

impl WaitResult {
    fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(WaitResult::Normal),
            2 => Some(WaitResult::Abnormal),
            3 => Some(WaitResult::Interrupted),
            4 => Some(WaitResult::TimedOut),
            _ => None,
        }
    }
}

bitflags! {
    /// Modifiers for blocking operations
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct WaitFlags: u32 {
        /// A pending interrupt aborts the wait with `Interrupted`
        const CAN_INTERRUPT = 1 << 0;
    }
}

// ============================================================================
// Wait Queue
// ============================================================================

const WAIT_PENDING: u8 = 0;

#[derive(Debug)]
struct WaitSlot {
    state: AtomicU8,
}

impl WaitSlot {
    fn result(&self) -> Option<WaitResult> {
        WaitResult::from_u8(self.state.load(Ordering::Acquire))
    }

    fn signal(&self, result: WaitResult) {
        self.state.store(result as u8, Ordering::Release);
    }
}

/// FIFO queue of threads waiting on one condition
#[derive(Debug, Default)]
pub struct WaitQueue {
    waiters: Mutex<VecDeque<Arc<WaitSlot>>>,
}

impl WaitQueue {
    pub const fn new() -> Self {
        Self {
            waiters: Mutex::new(VecDeque::new()),
        }
    }

    /// Enqueue the calling thread
    ///
    /// Must be called while the lock protecting the condition is still held.
    pub fn prepare(&self) -> Waiter<'_> {
        let slot = Arc::new(WaitSlot {
            state: AtomicU8::new(WAIT_PENDING),
        });
        self.waiters.lock().push_back(slot.clone());
        Waiter { queue: self, slot }
    }

    /// Wake the longest-waiting thread
    pub fn notify_one(&self) -> bool {
        match self.waiters.lock().pop_front() {
            Some(slot) => {
                slot.signal(WaitResult::Normal);
                true
            }
            None => false,
        }
    }

    /// Wake every waiting thread with `result`
    pub fn notify_all(&self, result: WaitResult) -> usize {
        let woken: VecDeque<_> = core::mem::take(&mut *self.waiters.lock());
        for slot in woken.iter() {
            slot.signal(result);
        }
        woken.len()
    }

    /// Number of threads currently waiting
    pub fn count(&self) -> usize {
        self.waiters.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.waiters.lock().is_empty()
    }

    /// Remove a waiter that gave up; false if a notifier already claimed it
    fn cancel(&self, slot: &Arc<WaitSlot>) -> bool {
        let mut waiters = self.waiters.lock();
        match waiters.iter().position(|w| Arc::ptr_eq(w, slot)) {
            Some(pos) => {
                waiters.remove(pos);
                true
            }
            None => false,
        }
    }
}

// ============================================================================
// Waiter
// ============================================================================

/// A thread's entry in a [`WaitQueue`]
///
/// Dropping a waiter that was never woken removes it from the queue.
#[derive(Debug)]
pub struct Waiter<'a> {
    queue: &'a WaitQueue,
    slot: Arc<WaitSlot>,
}

impl Waiter<'_> {
    /// Block until notified, the deadline passes, or (with
    /// [`WaitFlags::CAN_INTERRUPT`]) an interrupt arrives
    ///
    /// A notification that races with a timeout or an interrupt wins, so a
    /// wakeup handed to this waiter is never lost.
    pub fn wait(
        self,
        platform: &dyn Platform,
        flags: WaitFlags,
        deadline: Deadline,
    ) -> WaitResult {
        loop {
            if let Some(result) = self.slot.result() {
                return result;
            }

            let abort = if deadline.expired(platform.now()) {
                Some(WaitResult::TimedOut)
            } else if flags.contains(WaitFlags::CAN_INTERRUPT) && platform.interrupt_pending() {
                Some(WaitResult::Interrupted)
            } else {
                None
            };

            if let Some(result) = abort {
                if self.queue.cancel(&self.slot) {
                    self.slot.signal(result);
                    return result;
                }
                // Claimed by a notifier in the meantime; pick up its result.
                continue;
            }

            platform.relax();
        }
    }
}

impl Drop for Waiter<'_> {
    fn drop(&mut self) {
        if self.slot.result().is_none() {
            self.queue.cancel(&self.slot);
        }
    }
}
