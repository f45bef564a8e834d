//! Platform services consumed by the port subsystem
//!
//! The port core never talks to the scheduler, the clock or the team table
//! directly. Everything it needs from the surrounding kernel goes through
//! [`Platform`], which keeps the subsystem testable on a hosted target.

use crate::kern::timer::TimeValue;
use crate::types::{Credentials, TeamId};

/// Kernel services required by the port subsystem
pub trait Platform: Send + Sync {
    /// Monotonic system time in microseconds
    fn now(&self) -> TimeValue;

    /// Give the processor away while polling a wait condition
    fn relax(&self) {
        core::hint::spin_loop();
    }

    /// Identity of the calling thread
    fn current_credentials(&self) -> Credentials;

    /// Whether `team` currently exists
    fn team_exists(&self, team: TeamId) -> bool;

    /// Whether the calling thread has an interrupt (signal) pending
    fn interrupt_pending(&self) -> bool {
        false
    }
}

#[cfg(any(test, feature = "std"))]
pub use host::HostPlatform;

#[cfg(any(test, feature = "std"))]
mod host {
    extern crate std;

    use alloc::collections::BTreeSet;
    use core::cell::Cell;
    use spin::Mutex;
    use std::collections::HashSet;
    use std::thread::{self, ThreadId};
    use std::time::Instant;

    use super::Platform;
    use crate::kern::timer::TimeValue;
    use crate::types::{Credentials, TeamId};

    std::thread_local! {
        static CURRENT_CREDENTIALS: Cell<Option<Credentials>> = const { Cell::new(None) };
    }

    /// Hosted platform backed by `std`
    ///
    /// Teams must be registered before ports can be handed to them. Every
    /// thread runs with the default credentials unless it overrides them with
    /// [`HostPlatform::set_current_credentials`].
    #[derive(Debug)]
    pub struct HostPlatform {
        epoch: Instant,
        default_credentials: Credentials,
        teams: Mutex<BTreeSet<TeamId>>,
        interrupted: Mutex<HashSet<ThreadId>>,
    }

    impl HostPlatform {
        /// Create a platform whose threads run as `team` by default
        pub fn new(team: TeamId) -> Self {
            let mut teams = BTreeSet::new();
            teams.insert(TeamId::KERNEL);
            teams.insert(team);
            Self {
                epoch: Instant::now(),
                default_credentials: Credentials::new(0, 0, team),
                teams: Mutex::new(teams),
                interrupted: Mutex::new(HashSet::new()),
            }
        }

        pub fn add_team(&self, team: TeamId) {
            self.teams.lock().insert(team);
        }

        pub fn remove_team(&self, team: TeamId) {
            self.teams.lock().remove(&team);
        }

        /// Override the credentials of the calling thread
        pub fn set_current_credentials(&self, credentials: Credentials) {
            CURRENT_CREDENTIALS.with(|c| c.set(Some(credentials)));
        }

        /// Raise an interrupt for `thread`; it stays pending until cleared
        pub fn interrupt(&self, thread: ThreadId) {
            self.interrupted.lock().insert(thread);
        }

        pub fn clear_interrupt(&self, thread: ThreadId) {
            self.interrupted.lock().remove(&thread);
        }
    }

    impl Default for HostPlatform {
        fn default() -> Self {
            Self::new(TeamId::KERNEL)
        }
    }

    impl Platform for HostPlatform {
        fn now(&self) -> TimeValue {
            self.epoch.elapsed().as_micros() as TimeValue
        }

        fn relax(&self) {
            thread::yield_now();
        }

        fn current_credentials(&self) -> Credentials {
            CURRENT_CREDENTIALS
                .with(|c| c.get())
                .unwrap_or(self.default_credentials)
        }

        fn team_exists(&self, team: TeamId) -> bool {
            self.teams.lock().contains(&team)
        }

        fn interrupt_pending(&self) -> bool {
            self.interrupted.lock().contains(&thread::current().id())
        }
    }
}
