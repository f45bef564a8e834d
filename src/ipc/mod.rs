//! Kernel message ports
//!
//! A port is a bounded FIFO of messages that any thread may write to and
//! read from by numeric id. Ports are owned by a team, may carry a name,
//! and share one global byte budget for queued message data.
//!
//! Layering, leaves first:
//! - [`message`]: immutable envelopes
//! - [`port`]: the queue, its counters and wait queues
//! - [`quota`]: system-wide budget for queued bytes
//! - [`registry`] and [`ownership`]: lookup by id/name and per-team lists
//! - [`select`]: readiness notification
//! - [`port_ops`]: the public [`PortSystem`] tying everything together

use core::fmt;

pub mod config;
pub mod message;
pub mod ownership;
pub mod port;
pub mod port_ops;
pub mod quota;
pub mod registry;
pub mod select;


pub use config::{PortConfig, MESSAGE_OVERHEAD, OWNER_SHARDS, PORT_NAME_LENGTH};
pub use message::Message;
pub use port::{Port, PortName, PortState, ReadMode};
pub use port_ops::{PortInfo, PortMessageInfo, PortStats, PortSystem};
pub use select::{EventMask, SelectInfo, SelectSync};

/// IPC error types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum IpcError {
    /// Port does not exist, was deleted, or is closed
    BadPortId = -0x7000,
    /// Malformed argument
    BadValue = -0x7001,
    /// Allocation failed
    NoMemory = -0x7002,
    /// System-wide port limit reached
    NoMoreResources = -0x7003,
    /// Non-blocking call would have had to wait
    WouldBlock = -0x7004,
    /// Deadline elapsed
    TimedOut = -0x7005,
    /// Wait aborted by an interrupt
    Interrupted = -0x7006,
    /// Target team does not exist
    BadTeamId = -0x7007,
    /// No active port carries the requested name
    NameNotFound = -0x7008,
}

impl IpcError {
    /// Status code as reported across the system-call boundary
    pub fn to_status(self) -> i32 {
        self as i32
    }
}

impl fmt::Display for IpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            IpcError::BadPortId => "bad port id",
            IpcError::BadValue => "bad value",
            IpcError::NoMemory => "out of memory",
            IpcError::NoMoreResources => "no more ports",
            IpcError::WouldBlock => "operation would block",
            IpcError::TimedOut => "timed out",
            IpcError::Interrupted => "interrupted",
            IpcError::BadTeamId => "bad team id",
            IpcError::NameNotFound => "name not found",
        };
        f.write_str(msg)
    }
}

impl From<crate::kern::CopyError> for IpcError {
    fn from(err: crate::kern::CopyError) -> Self {
        match err {
            crate::kern::CopyError::OutOfMemory => IpcError::NoMemory,
            _ => IpcError::BadValue,
        }
    }
}

/// Result type for IPC operations
pub type IpcResult<T> = Result<T, IpcError>;
