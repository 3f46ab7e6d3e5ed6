use std::io;
use std::net::{IpAddr, Ipv4Addr};

use socket2::Socket;
use tracing::info;

use crate::error::{Result, TransportError};

/// Interface index for a device name.
#[cfg(unix)]
pub fn interface_index(name: &str) -> io::Result<u32> {
    let c_name = std::ffi::CString::new(name)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "invalid interface name"))?;

    // SAFETY: c_name is a valid NUL-terminated string; if_nametoindex only
    // reads it and returns 0 on failure.
    let index = unsafe { libc::if_nametoindex(c_name.as_ptr()) };
    if index == 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(index)
}

#[cfg(not(unix))]
pub fn interface_index(_name: &str) -> io::Result<u32> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "device names are not supported on this platform",
    ))
}

fn device_index(device: &str) -> Result<u32> {
    interface_index(device).map_err(|source| TransportError::Device {
        device: device.to_string(),
        source,
    })
}

/// Join `group`, on `device` when given, otherwise on the default interface.
pub fn join(socket: &Socket, group: IpAddr, device: Option<&str>) -> Result<()> {
    let joined = match (group, device) {
        (IpAddr::V4(group), None) => socket.join_multicast_v4(&group, &Ipv4Addr::UNSPECIFIED),
        (IpAddr::V4(group), Some(device)) => {
            let index = device_index(device)?;
            socket.join_multicast_v4_n(&group, &socket2::InterfaceIndexOrAddress::Index(index))
        }
        (IpAddr::V6(group), None) => socket.join_multicast_v6(&group, 0),
        (IpAddr::V6(group), Some(device)) => socket.join_multicast_v6(&group, device_index(device)?),
    };
    joined.map_err(|source| TransportError::Join { group, source })?;
    info!(%group, device = device.unwrap_or("default"), "joined multicast group");
    Ok(())
}

/// Configure the outgoing multicast interface, TTL and loopback.
pub fn configure_sender(
    socket: &Socket,
    group: IpAddr,
    device: Option<&str>,
    ttl: u32,
    loopback: bool,
) -> Result<()> {
    match group {
        IpAddr::V4(_) => {
            socket.set_multicast_ttl_v4(ttl)?;
            socket.set_multicast_loop_v4(loopback)?;
            if let Some(device) = device {
                bind_device(socket, device)?;
            }
        }
        IpAddr::V6(_) => {
            socket.set_multicast_hops_v6(ttl)?;
            socket.set_multicast_loop_v6(loopback)?;
            if let Some(device) = device {
                socket.set_multicast_if_v6(device_index(device)?)?;
            }
        }
    }
    Ok(())
}

/// Restrict the socket to a named device.
#[cfg(any(target_os = "android", target_os = "fuchsia", target_os = "linux"))]
pub fn bind_device(socket: &Socket, device: &str) -> Result<()> {
    socket
        .bind_device(Some(device.as_bytes()))
        .map_err(|source| TransportError::Device {
            device: device.to_string(),
            source,
        })
}

#[cfg(not(any(target_os = "android", target_os = "fuchsia", target_os = "linux")))]
pub fn bind_device(_socket: &Socket, device: &str) -> Result<()> {
    Err(TransportError::Device {
        device: device.to_string(),
        source: io::Error::new(
            io::ErrorKind::Unsupported,
            "binding to a device is not supported on this platform",
        ),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[cfg(unix)]
    fn unknown_interface_name() {
        assert!(interface_index("vita49-no-such-if").is_err());
        assert!(interface_index("bad\0name").is_err());
    }
}
