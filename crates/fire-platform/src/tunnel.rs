//! Tunnel devices
//!
//! `UdpTunnel` carries raw IP datagrams inside UDP, one per message, between
//! the firewall and a local peer that owns the actual virtual interface.
//! Replies go back to whichever peer sent the most recent datagram.

use crate::error::{PlatformError, Result};
use fire_core::pipeline::TunnelIo;
use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::time::Duration;
use tracing::{debug, info};

/// How long a read waits before reporting no data
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(100);

/// Datagram tunnel over a UDP socket
#[derive(Debug)]
pub struct UdpTunnel {
    socket: UdpSocket,
    peer: Option<SocketAddr>,
    fixed_peer: bool,
}

impl UdpTunnel {
    /// Bind to `addr`, answering whoever sends to it
    pub fn bind(addr: SocketAddr, read_timeout: Duration) -> Result<Self> {
        let socket = Socket::new(Domain::for_address(addr), Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_reuse_address(true)?;
        socket.set_read_timeout(Some(read_timeout))?;
        socket.set_recv_buffer_size(1 << 20)?;
        socket.bind(&SockAddr::from(addr))?;

        let socket: UdpSocket = socket.into();
        info!(local = %socket.local_addr()?, "Tunnel socket bound");
        Ok(Self {
            socket,
            peer: None,
            fixed_peer: false,
        })
    }

    /// Only exchange datagrams with `peer`
    pub fn connect(mut self, peer: SocketAddr) -> Result<Self> {
        self.socket
            .connect(peer)
            .map_err(|e| PlatformError::Tunnel(format!("connect {peer}: {e}")))?;
        self.peer = Some(peer);
        self.fixed_peer = true;
        Ok(self)
    }

    /// Bound address
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Where replies are sent
    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }
}

impl TunnelIo for UdpTunnel {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.fixed_peer {
            return self.socket.recv(buf);
        }
        let (n, from) = self.socket.recv_from(buf)?;
        if self.peer != Some(from) {
            debug!(peer = %from, "Tunnel peer changed");
            self.peer = Some(from);
        }
        Ok(n)
    }

    fn write(&mut self, packet: &[u8]) -> io::Result<()> {
        if self.fixed_peer {
            self.socket.send(packet)?;
            return Ok(());
        }
        match self.peer {
            Some(peer) => {
                self.socket.send_to(packet, peer)?;
                Ok(())
            }
            None => Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "no tunnel peer yet",
            )),
        }
    }

    fn close(&mut self) -> io::Result<()> {
        debug!("Tunnel socket closed");
        Ok(())
    }
}
