//! Port Subsystem Counters
//!
//! Diagnostic counters for tracking traffic and blocking through the port
//! subsystem. They are owned by a `PortSystem` rather than living in
//! statics, so independent instances (and tests) do not see each other's
//! numbers.

use core::sync::atomic::{AtomicU64, Ordering};

// ============================================================================
// Counter Type
// ============================================================================

/// Atomically updated event counter
#[derive(Debug, Default)]
pub struct Counter {
    value: AtomicU64,
}

impl Counter {
    /// Create a new counter
    pub const fn new() -> Self {
        Self {
            value: AtomicU64::new(0),
        }
    }

    /// Increment counter by 1
    #[inline]
    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment counter by n
    #[inline]
    pub fn add(&self, n: u64) {
        self.value.fetch_add(n, Ordering::Relaxed);
    }

    /// Get current value
    #[inline]
    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }

    /// Update max if current value is higher
    pub fn update_max(&self, current: u64) {
        self.value.fetch_max(current, Ordering::Relaxed);
    }
}

// ============================================================================
// Port Counters
// ============================================================================

/// Counters kept by one port system
#[derive(Debug)]
pub struct PortCounters {
    pub ports_created: Counter,
    pub ports_deleted: Counter,
    pub messages_written: Counter,
    pub messages_read: Counter,
    pub bytes_written: Counter,
    /// Waits for a free queue slot
    pub write_blocks: Counter,
    /// Waits for a message
    pub read_blocks: Counter,
    pub timeouts: Counter,
}

impl PortCounters {
    pub const fn new() -> Self {
        Self {
            ports_created: Counter::new(),
            ports_deleted: Counter::new(),
            messages_written: Counter::new(),
            messages_read: Counter::new(),
            bytes_written: Counter::new(),
            write_blocks: Counter::new(),
            read_blocks: Counter::new(),
            timeouts: Counter::new(),
        }
    }

    /// Take a consistent-enough copy for reporting
    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            ports_created: self.ports_created.get(),
            ports_deleted: self.ports_deleted.get(),
            messages_written: self.messages_written.get(),
            messages_read: self.messages_read.get(),
            bytes_written: self.bytes_written.get(),
            write_blocks: self.write_blocks.get(),
            read_blocks: self.read_blocks.get(),
            timeouts: self.timeouts.get(),
        }
    }
}

impl Default for PortCounters {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of [`PortCounters`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CounterSnapshot {
    pub ports_created: u64,
    pub ports_deleted: u64,
    pub messages_written: u64,
    pub messages_read: u64,
    pub bytes_written: u64,
    pub write_blocks: u64,
    pub read_blocks: u64,
    pub timeouts: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_basic() {
        let counter = Counter::new();
        assert_eq!(counter.get(), 0);
        counter.inc();
        counter.add(4);
        assert_eq!(counter.get(), 5);
    }

    #[test]
    fn test_counter_max() {
        let counter = Counter::new();
        counter.update_max(10);
        counter.update_max(3);
        assert_eq!(counter.get(), 10);
    }

    #[test]
    fn test_snapshot() {
        let counters = PortCounters::new();
        counters.messages_written.inc();
        counters.timeouts.add(2);
        let snap = counters.snapshot();
        assert_eq!(snap.messages_written, 1);
        assert_eq!(snap.timeouts, 2);
        assert_eq!(snap.messages_read, 0);
    }
}
