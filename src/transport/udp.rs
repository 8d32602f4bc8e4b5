use anyhow::{Context, Result};
use std::net::{SocketAddr, UdpSocket};

use super::TransportSink;

/// UDP sink bound to an ephemeral local port and connected to one destination.
pub struct UdpSink {
    socket: UdpSocket,
    destination: SocketAddr,
}

impl UdpSink {
    pub fn connect(destination: SocketAddr) -> Result<Self> {
        let bind_addr: SocketAddr = if destination.is_ipv4() {
            SocketAddr::from(([0, 0, 0, 0], 0))
        } else {
            SocketAddr::from(([0u16; 8], 0))
        };
        let socket = UdpSocket::bind(bind_addr)
            .with_context(|| format!("bind udp socket on {}", bind_addr))?;
        socket
            .connect(destination)
            .with_context(|| format!("set udp destination {}", destination))?;
        log::info!(
            "UdpSink: sending from {} to {}",
            socket.local_addr().context("read udp local address")?,
            destination
        );
        Ok(Self {
            socket,
            destination,
        })
    }
}

impl TransportSink for UdpSink {
    fn send(&mut self, datagram: &[u8]) -> Result<()> {
        self.socket
            .send(datagram)
            .with_context(|| format!("send {} byte datagram to {}", datagram.len(), self.destination))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn datagrams_reach_the_destination() -> Result<()> {
        let receiver = UdpSocket::bind("127.0.0.1:0")?;
        receiver.set_read_timeout(Some(Duration::from_secs(5)))?;

        let mut sink = UdpSink::connect(receiver.local_addr()?)?;
        sink.send(b"unit-0")?;
        sink.send(b"unit-1")?;

        let mut buf = [0u8; 64];
        let len = receiver.recv(&mut buf)?;
        assert_eq!(&buf[..len], b"unit-0");
        let len = receiver.recv(&mut buf)?;
        assert_eq!(&buf[..len], b"unit-1");
        Ok(())
    }
}
