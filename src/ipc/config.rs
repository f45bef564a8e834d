//! Tunables of the port subsystem

/// Number of independently locked shards in the ownership directory
pub const OWNER_SHARDS: usize = 8;

/// Maximum stored length of a port name in bytes
pub const PORT_NAME_LENGTH: usize = 32;

/// Bookkeeping bytes charged against the quota for every queued message
pub const MESSAGE_OVERHEAD: usize = 64;

/// Sizing of a port system
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortConfig {
    /// Maximum number of ports that may exist at once
    pub max_ports: usize,
    /// Largest capacity a single port may be created with
    pub max_queue_length: usize,
    /// Largest payload of a single message
    pub max_message_size: usize,
    /// Ceiling on bytes committed to queued messages across all ports
    pub total_space_limit: usize,
}

impl PortConfig {
    pub const DEFAULT_MAX_PORTS: usize = 4096;
    pub const DEFAULT_MAX_QUEUE_LENGTH: usize = 4096;
    pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 256 * 1024;
    pub const DEFAULT_TOTAL_SPACE_LIMIT: usize = 64 * 1024 * 1024;

    pub const fn new() -> Self {
        Self {
            max_ports: Self::DEFAULT_MAX_PORTS,
            max_queue_length: Self::DEFAULT_MAX_QUEUE_LENGTH,
            max_message_size: Self::DEFAULT_MAX_MESSAGE_SIZE,
            total_space_limit: Self::DEFAULT_TOTAL_SPACE_LIMIT,
        }
    }

    pub const fn with_max_ports(mut self, max_ports: usize) -> Self {
        self.max_ports = max_ports;
        self
    }

    pub const fn with_max_queue_length(mut self, max_queue_length: usize) -> Self {
        self.max_queue_length = max_queue_length;
        self
    }

    pub const fn with_max_message_size(mut self, max_message_size: usize) -> Self {
        self.max_message_size = max_message_size;
        self
    }

    pub const fn with_total_space_limit(mut self, total_space_limit: usize) -> Self {
        self.total_space_limit = total_space_limit;
        self
    }

    /// Bytes a message with `payload` bytes is charged against the quota
    pub const fn message_cost(payload: usize) -> usize {
        payload + MESSAGE_OVERHEAD
    }
}

impl Default for PortConfig {
    fn default() -> Self {
        Self::new()
    }
}
