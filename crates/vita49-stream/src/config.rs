use std::time::Duration;

use vita49_transport::TransportConfig;

use crate::discovery::DEFAULT_DISCOVERY_TIMEOUT;
use crate::queue::{DEFAULT_MAX_BYTES, DEFAULT_MAX_ITEMS};

/// Default sleep between ingest-queue polls when it is empty.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Largest frame the writer builds by default: the biggest IPv4 UDP payload
/// rounded down to whole words.
pub const DEFAULT_MAX_FRAME_BYTES: usize = 65_504;

/// Configuration for a [`crate::VrtReader`].
#[derive(Debug, Clone)]
pub struct ReaderConfig {
    pub transport: TransportConfig,
    pub max_queue_items: usize,
    pub max_queue_bytes: usize,
    /// Time allowed for initial-context discovery after the first datagram.
    pub discovery_timeout: Duration,
    /// Worker sleep when the queue is empty.
    pub poll_interval: Duration,
}

impl ReaderConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            transport: TransportConfig::new(host, port),
            ..Self::default()
        }
    }

    pub fn with_device(mut self, device: impl Into<String>) -> Self {
        self.transport.device = Some(device.into());
        self
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.transport.read_timeout = timeout;
        self
    }

    pub fn with_discovery_timeout(mut self, timeout: Duration) -> Self {
        self.discovery_timeout = timeout;
        self
    }

    pub fn with_queue_limits(mut self, max_items: usize, max_bytes: usize) -> Self {
        self.max_queue_items = max_items;
        self.max_queue_bytes = max_bytes;
        self
    }
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            transport: TransportConfig::default(),
            max_queue_items: DEFAULT_MAX_ITEMS,
            max_queue_bytes: DEFAULT_MAX_BYTES,
            discovery_timeout: DEFAULT_DISCOVERY_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// Configuration for a [`crate::VrtWriter`].
#[derive(Debug, Clone)]
pub struct WriterConfig {
    pub transport: TransportConfig,
    /// Wrap packets in VRL frames.
    pub framing: bool,
    /// Append a CRC to each frame instead of `VEND`.
    pub crc: bool,
    pub max_frame_bytes: usize,
}

impl WriterConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            transport: TransportConfig::new(host, port),
            ..Self::default()
        }
    }

    pub fn with_device(mut self, device: impl Into<String>) -> Self {
        self.transport.device = Some(device.into());
        self
    }

    pub fn with_framing(mut self, framing: bool, crc: bool) -> Self {
        self.framing = framing;
        self.crc = crc;
        self
    }

    pub fn with_max_frame_bytes(mut self, max: usize) -> Self {
        self.max_frame_bytes = max;
        self
    }
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            transport: TransportConfig::default(),
            framing: false,
            crc: false,
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
        }
    }
}
