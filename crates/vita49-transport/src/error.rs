use std::net::SocketAddr;

/// Errors that can occur in datagram transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The host/port pair could not be resolved to a socket address.
    #[error("failed to resolve {host}:{port}: {source}")]
    Resolve {
        host: String,
        port: u16,
        source: std::io::Error,
    },

    /// Failed to create or bind the socket.
    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },

    /// The named network device could not be used.
    #[error("failed to use device {device}: {source}")]
    Device {
        device: String,
        source: std::io::Error,
    },

    /// Failed to join a multicast group.
    #[error("failed to join multicast group {group}: {source}")]
    Join {
        group: std::net::IpAddr,
        source: std::io::Error,
    },

    /// The remote end reported the port as unreachable (ICMP).
    #[error("destination unreachable")]
    PortUnreachable,

    /// An I/O error occurred on the socket.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Another reconnect is already waiting for the receive loop.
    #[error("reconnect already in progress")]
    ReconnectInProgress,

    /// Reconnect was requested from the receive loop thread itself.
    #[error("reconnect cannot be requested from the receive loop thread")]
    ReconnectFromLoopThread,

    /// The slot is empty: a reopen released the old socket and then failed.
    #[error("socket closed after a failed reopen")]
    Closed,

    /// The receive loop failed to reopen the socket.
    #[error("reconnect failed: {0}")]
    ReconnectFailed(Box<TransportError>),

    /// The configuration cannot produce a usable socket.
    #[error("invalid transport configuration: {0}")]
    InvalidConfig(String),
}

impl TransportError {
    /// True for errors the receive loop reports and retries after a backoff.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            TransportError::PortUnreachable | TransportError::Io(_) | TransportError::Closed
        )
    }
}

pub type Result<T> = std::result::Result<T, TransportError>;
