use std::time::Duration;

/// Default requested socket buffer size: 128 MiB.
pub const DEFAULT_BUFFER_SIZE: usize = 128 * 1024 * 1024;

/// Default receive timeout.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(10);

/// Largest UDP payload.
pub const MAX_DATAGRAM_SIZE: usize = 65_536;

/// Which end of the stream a socket serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Bind to `host:port` (joining the group when multicast) and receive.
    Receive,
    /// Bind an ephemeral port and send to `host:port`.
    Send,
}

/// Socket configuration for a [`crate::DatagramTransport`].
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Local address (receive) or destination (send). Multicast groups are
    /// detected from the resolved address.
    pub host: String,
    pub port: u16,
    /// OS network device name, passed through untranslated.
    pub device: Option<String>,
    /// Requested send/receive buffer size. The OS may grant less.
    pub buffer_size: usize,
    /// Receive timeout; bounds how long stop and reconnect requests wait.
    pub read_timeout: Duration,
    pub reuse_address: bool,
    pub multicast_ttl: u32,
    pub multicast_loop: bool,
    /// Receive buffer size per datagram.
    pub max_datagram_size: usize,
}

impl TransportConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 0,
            device: None,
            buffer_size: DEFAULT_BUFFER_SIZE,
            read_timeout: DEFAULT_READ_TIMEOUT,
            reuse_address: true,
            multicast_ttl: 1,
            multicast_loop: true,
            max_datagram_size: MAX_DATAGRAM_SIZE,
        }
    }
}
