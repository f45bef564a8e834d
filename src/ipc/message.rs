//! Port message envelope

use alloc::vec::Vec;

use super::quota::QuotaCharge;
use crate::types::Credentials;

/// One message queued on a port
///
/// Immutable once built. The message carries the quota charge for its
/// bytes, so the global budget is replenished exactly when the message is
/// dropped: after it has been consumed, or when its port is torn down.
#[derive(Debug)]
pub struct Message {
    code: i32,
    sender: Credentials,
    data: Vec<u8>,
    _charge: QuotaCharge,
}

impl Message {
    pub fn new(code: i32, sender: Credentials, data: Vec<u8>, charge: QuotaCharge) -> Self {
        Self {
            code,
            sender,
            data,
            _charge: charge,
        }
    }

    /// Caller-chosen message code
    pub fn code(&self) -> i32 {
        self.code
    }

    /// Identity of the thread that wrote the message
    pub fn sender(&self) -> Credentials {
        self.sender
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Payload size in bytes
    pub fn size(&self) -> usize {
        self.data.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ipc::quota::QuotaTracker;
    use crate::kern::{Deadline, HostPlatform, WaitFlags};
    use crate::types::TeamId;
    use alloc::sync::Arc;
    use alloc::vec;

    #[test]
    fn test_message_releases_quota_on_drop() {
        let platform = HostPlatform::default();
        let quota = Arc::new(QuotaTracker::new(1024));
        let charge = quota
            .reserve(100, &platform, WaitFlags::empty(), Deadline::Never, || true)
            .unwrap();
        let msg = Message::new(
            7,
            Credentials::new(1, 2, TeamId(3)),
            vec![1, 2, 3],
            charge,
        );

        assert_eq!(msg.code(), 7);
        assert_eq!(msg.size(), 3);
        assert_eq!(msg.sender().team, TeamId(3));
        assert_eq!(quota.committed(), 100);

        drop(msg);
        assert_eq!(quota.committed(), 0);
    }
}
