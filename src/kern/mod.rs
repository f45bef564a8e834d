//! Kern subsystem - Core kernel primitives used by the port subsystem
//!
//! Wait queues, time values, caller memory transfer, diagnostic counters
//! and the platform interface the port core is written against.

pub mod copyio;
pub mod counters;
pub mod platform;
pub mod sched_prim;
pub mod timer;

pub use copyio::{copyin_segments, copyout, CopyError, CopyResult};
pub use counters::{CounterSnapshot, PortCounters};
#[cfg(any(test, feature = "std"))]
pub use platform::HostPlatform;
pub use platform::Platform;
pub use sched_prim::{WaitFlags, WaitQueue, WaitResult, Waiter};
pub use timer::{Deadline, TimeValue, Timeout};
