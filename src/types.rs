//! Common types used across the port subsystem
//!
//! This module defines shared identifiers to avoid circular dependencies
//! between the `kern` and `ipc` halves of the crate.

use core::fmt;

/// Port identifier
///
/// Valid ids are strictly positive. Ids are handed out by the port system
/// from a wrapping counter and are only reused once the old port is gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct PortId(pub i32);

impl PortId {
    /// Sentinel for "no port"
    pub const INVALID: Self = Self(-1);

    /// Whether the id can name a port at all
    pub fn is_valid(self) -> bool {
        self.0 > 0
    }
}

impl fmt::Display for PortId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "port {}", self.0)
    }
}

/// Team (process) identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct TeamId(pub i32);

impl TeamId {
    /// The kernel team
    pub const KERNEL: Self = Self(1);

    /// Whether the id can name a team at all
    pub fn is_valid(self) -> bool {
        self.0 >= 0
    }
}

impl fmt::Display for TeamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "team {}", self.0)
    }
}

/// User identifier
pub type Uid = u32;

/// Group identifier
pub type Gid = u32;

/// Identity of the thread that sent a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Credentials {
    pub uid: Uid,
    pub gid: Gid,
    pub team: TeamId,
}

impl Credentials {
    pub const fn new(uid: Uid, gid: Gid, team: TeamId) -> Self {
        Self { uid, gid, team }
    }

    /// Credentials of kernel-internal senders
    pub const fn kernel() -> Self {
        Self::new(0, 0, TeamId::KERNEL)
    }
}
