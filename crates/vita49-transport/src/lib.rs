//! UDP and multicast datagram transport for VITA-49 streams.
//!
//! A [`DatagramTransport`] owns one socket at a time in a swappable slot:
//! - receivers bind `host:port`, joining the group when the address is multicast
//! - senders bind an ephemeral port and connect to `host:port`
//!
//! [`DatagramTransport::reconnect`] may be called from any thread while
//! [`DatagramTransport::receive_loop`] runs; the loop thread performs the
//! reopen and hands the result back.

pub mod backoff;
pub mod config;
pub mod error;
pub mod multicast;
pub mod socket;
pub mod transport;

pub use backoff::ExponentialBackoff;
pub use config::{Role, TransportConfig, DEFAULT_BUFFER_SIZE, DEFAULT_READ_TIMEOUT, MAX_DATAGRAM_SIZE};
pub use error::{Result, TransportError};
pub use socket::{resolve, DatagramSocket, Received};
pub use transport::{DatagramTransport, LoopGuard};
