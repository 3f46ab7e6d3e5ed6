use std::io::ErrorKind;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, ToSocketAddrs, UdpSocket};

use socket2::{Domain, Protocol, Socket, Type};
use tracing::{debug, info, warn};

use crate::config::{Role, TransportConfig};
use crate::error::{Result, TransportError};
use crate::multicast;

/// Outcome of one receive call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Received {
    Datagram { len: usize, from: SocketAddr },
    /// The read timeout elapsed with nothing received.
    Timeout,
}

/// One open UDP socket. Replaced wholesale on reconnect.
#[derive(Debug)]
pub struct DatagramSocket {
    socket: UdpSocket,
    generation: u64,
    local_addr: SocketAddr,
    peer: Option<SocketAddr>,
    group: Option<IpAddr>,
}

/// Resolve `host:port`, preferring the first address returned.
pub fn resolve(host: &str, port: u16) -> Result<SocketAddr> {
    let resolve_err = |source| TransportError::Resolve {
        host: host.to_string(),
        port,
        source,
    };
    (host, port)
        .to_socket_addrs()
        .map_err(resolve_err)?
        .next()
        .ok_or_else(|| resolve_err(std::io::Error::new(ErrorKind::NotFound, "no addresses")))
}

fn unspecified(addr: &SocketAddr) -> IpAddr {
    match addr {
        SocketAddr::V4(_) => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        SocketAddr::V6(_) => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
    }
}

impl DatagramSocket {
    /// Create, configure and bind a socket for `role`.
    ///
    /// Receivers bind `host:port` (the group's port on the wildcard address
    /// when `host` is multicast, then join the group). Senders bind an
    /// ephemeral port and connect to `host:port`.
    pub fn open(config: &TransportConfig, role: Role, generation: u64) -> Result<Self> {
        if config.read_timeout.is_zero() {
            return Err(TransportError::InvalidConfig(
                "read timeout must be non-zero".to_string(),
            ));
        }
        let addr = resolve(&config.host, config.port)?;
        let group = addr.ip().is_multicast().then(|| addr.ip());
        let device = config.device.as_deref();

        let socket = Socket::new(Domain::for_address(addr), Type::DGRAM, Some(Protocol::UDP))?;
        if config.reuse_address {
            socket.set_reuse_address(true)?;
            #[cfg(all(unix, not(any(target_os = "solaris", target_os = "illumos"))))]
            socket.set_reuse_port(true)?;
        }
        size_buffers(&socket, config.buffer_size);

        let peer = match role {
            Role::Receive => {
                let bind_addr = match group {
                    Some(_) => SocketAddr::new(unspecified(&addr), addr.port()),
                    None => addr,
                };
                if let (None, Some(device)) = (group, device) {
                    multicast::bind_device(&socket, device)?;
                }
                socket
                    .bind(&bind_addr.into())
                    .map_err(|source| TransportError::Bind {
                        addr: bind_addr,
                        source,
                    })?;
                if let Some(group) = group {
                    multicast::join(&socket, group, device)?;
                }
                None
            }
            Role::Send => {
                let bind_addr = SocketAddr::new(unspecified(&addr), 0);
                match (group, device) {
                    (Some(group), _) => multicast::configure_sender(
                        &socket,
                        group,
                        device,
                        config.multicast_ttl,
                        config.multicast_loop,
                    )?,
                    (None, Some(device)) => multicast::bind_device(&socket, device)?,
                    (None, None) => {}
                }
                socket
                    .bind(&bind_addr.into())
                    .map_err(|source| TransportError::Bind {
                        addr: bind_addr,
                        source,
                    })?;
                socket.connect(&addr.into())?;
                Some(addr)
            }
        };

        socket.set_read_timeout(Some(config.read_timeout))?;
        let socket: UdpSocket = socket.into();
        let local_addr = socket.local_addr()?;

        info!(%local_addr, ?peer, ?group, generation, "datagram socket open");
        Ok(Self {
            socket,
            generation,
            local_addr,
            peer,
            group,
        })
    }

    /// Receive one datagram into `buf`, waiting at most the read timeout.
    pub fn recv(&self, buf: &mut [u8]) -> Result<Received> {
        match self.socket.recv_from(buf) {
            Ok((len, from)) => Ok(Received::Datagram { len, from }),
            Err(err)
                if matches!(
                    err.kind(),
                    ErrorKind::WouldBlock | ErrorKind::TimedOut | ErrorKind::Interrupted
                ) =>
            {
                Ok(Received::Timeout)
            }
            Err(err) if err.kind() == ErrorKind::ConnectionRefused => {
                Err(TransportError::PortUnreachable)
            }
            Err(err) => Err(TransportError::Io(err)),
        }
    }

    /// Send one datagram to the connected peer.
    pub fn send(&self, bytes: &[u8]) -> Result<usize> {
        loop {
            match self.socket.send(bytes) {
                Ok(n) => return Ok(n),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::ConnectionRefused => {
                    return Err(TransportError::PortUnreachable)
                }
                Err(err) => return Err(TransportError::Io(err)),
            }
        }
    }

    /// Monotonic identity; each reopen gets a new value.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer
    }

    pub fn multicast_group(&self) -> Option<IpAddr> {
        self.group
    }
}

/// Request large kernel buffers; the OS may clamp silently.
fn size_buffers(socket: &Socket, requested: usize) {
    if let Err(err) = socket.set_recv_buffer_size(requested) {
        warn!(requested, error = %err, "could not set receive buffer size");
    }
    if let Err(err) = socket.set_send_buffer_size(requested) {
        warn!(requested, error = %err, "could not set send buffer size");
    }
    match socket.recv_buffer_size() {
        Ok(granted) if granted < requested => {
            warn!(requested, granted, "receive buffer smaller than requested")
        }
        Ok(granted) => debug!(granted, "receive buffer sized"),
        Err(_) => {}
    }
}
