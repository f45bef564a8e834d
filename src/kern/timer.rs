//! Kernel time values and wait deadlines

use crate::kern::platform::Platform;

/// Time value in microseconds
pub type TimeValue = u64;

/// How long a blocking operation may wait
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Timeout {
    /// Wait until the condition holds
    #[default]
    Infinite,
    /// Never wait; fail with `WouldBlock` instead
    Immediate,
    /// Wait at most this many microseconds from now
    Relative(TimeValue),
    /// Wait until this absolute system time
    Absolute(TimeValue),
}

impl Timeout {
    /// Resolve against the platform clock
    pub fn deadline(self, platform: &dyn Platform) -> Deadline {
        match self {
            Timeout::Infinite => Deadline::Never,
            Timeout::Immediate | Timeout::Relative(0) => Deadline::Immediate,
            Timeout::Relative(usecs) => Deadline::At(platform.now().saturating_add(usecs)),
            Timeout::Absolute(at) => Deadline::At(at),
        }
    }
}

/// Absolute point in time a waiter gives up at
///
/// Resolved once when an operation starts so that every wait inside a single
/// operation shares the same budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deadline {
    /// Non-blocking: callers report `WouldBlock` instead of waiting
    Immediate,
    Never,
    At(TimeValue),
}

impl Deadline {
    pub fn expired(self, now: TimeValue) -> bool {
        match self {
            Deadline::Immediate => true,
            Deadline::Never => false,
            Deadline::At(at) => now >= at,
        }
    }

    /// Whether the caller asked not to block at all
    pub fn is_immediate(self) -> bool {
        self == Deadline::Immediate
    }
}
