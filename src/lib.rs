//! port_ipc - kernel message ports
//!
//! Bounded, id-addressed message queues shared between threads of different
//! teams, with blocking and non-blocking reads and writes, deadlines,
//! interruptible waits, a system-wide quota on queued bytes, per-team
//! ownership and readiness notification.
//!
//! The crate is `no_std` + `alloc`. Everything it needs from the surrounding
//! kernel (clock, credentials, team table, interrupts) comes in through
//! [`kern::Platform`]; the `std` feature adds [`kern::HostPlatform`] for
//! hosted use.

#![cfg_attr(not(any(test, feature = "std")), no_std)]

// Standard library replacement for no_std
extern crate alloc;

// Core types
pub mod types;

// Scheduling primitives, copy-in/out and platform services
pub mod kern;

// Message ports
pub mod ipc;

pub use ipc::{
    EventMask, IpcError, IpcResult, PortConfig, PortInfo, PortMessageInfo, PortStats, PortSystem,
    ReadMode, SelectInfo, SelectSync,
};
pub use kern::{Platform, Timeout, WaitFlags};
pub use types::{Credentials, PortId, TeamId};

/// Crate version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
/// Subsystem name
pub const NAME: &str = "port_ipc";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert_eq!(NAME, "port_ipc");
        assert!(!VERSION.is_empty());
    }
}
