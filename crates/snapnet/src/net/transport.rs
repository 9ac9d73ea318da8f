use std::io;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};

use crate::msg::MsgBuf;
use crate::protocol::MAX_MSGLEN;

/// Outgoing half of the datagram layer. Channels hand it a finished packet
/// and the peer address; delivery is best effort.
pub trait Transport {
    fn send_packet(&mut self, data: &[u8], to: SocketAddr) -> io::Result<()>;
}

#[derive(Debug, Clone, Default)]
pub struct TransportStats {
    pub packets_sent: u64,
    pub packets_received: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub runt_packets: u64,
}

/// Non-blocking UDP socket.
pub struct UdpTransport {
    socket: UdpSocket,
    local_addr: SocketAddr,
    recv_buffer: [u8; MAX_MSGLEN],
    stats: TransportStats,
}

impl UdpTransport {
    pub fn bind<A: ToSocketAddrs>(addr: A) -> io::Result<Self> {
        let socket = UdpSocket::bind(addr)?;
        socket.set_nonblocking(true)?;

        let local_addr = socket.local_addr()?;

        Ok(Self {
            socket,
            local_addr,
            recv_buffer: [0u8; MAX_MSGLEN],
            stats: TransportStats::default(),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn stats(&self) -> &TransportStats {
        &self.stats
    }

    /// Drains every datagram currently queued on the socket.
    pub fn receive(&mut self) -> io::Result<Vec<(MsgBuf, SocketAddr)>> {
        let mut packets = Vec::new();

        loop {
            match self.socket.recv_from(&mut self.recv_buffer) {
                Ok((size, addr)) => {
                    if size < 4 {
                        log::debug!("runt packet of {} bytes from {}", size, addr);
                        self.stats.runt_packets += 1;
                        continue;
                    }

                    self.stats.packets_received += 1;
                    self.stats.bytes_received += size as u64;
                    packets.push((MsgBuf::from_bytes(&self.recv_buffer[..size]), addr));
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                // A previous send hit a closed port; not fatal for UDP.
                Err(ref e) if e.kind() == io::ErrorKind::ConnectionReset => continue,
                Err(e) => return Err(e),
            }
        }

        Ok(packets)
    }
}

impl Transport for UdpTransport {
    fn send_packet(&mut self, data: &[u8], to: SocketAddr) -> io::Result<()> {
        if data.len() > MAX_MSGLEN {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "Packet exceeds MTU",
            ));
        }

        let bytes = self.socket.send_to(data, to)?;

        self.stats.packets_sent += 1;
        self.stats.bytes_sent += bytes as u64;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_runt_packet_dropped() {
        let mut receiver = UdpTransport::bind("127.0.0.1:0").unwrap();
        let mut sender = UdpTransport::bind("127.0.0.1:0").unwrap();

        sender.send_packet(&[1, 2], receiver.local_addr()).unwrap();

        for _ in 0..200 {
            assert!(receiver.receive().unwrap().is_empty());
            if receiver.stats().runt_packets > 0 {
                break;
            }
            thread::sleep(Duration::from_millis(1));
        }

        assert_eq!(receiver.stats().runt_packets, 1);
        assert_eq!(receiver.stats().packets_received, 0);
        assert_eq!(sender.stats().packets_sent, 1);
    }

    #[test]
    fn test_send_rejects_oversized_datagram() {
        let mut sender = UdpTransport::bind("127.0.0.1:0").unwrap();
        let to = sender.local_addr();

        let err = sender.send_packet(&[0; MAX_MSGLEN + 1], to).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
        assert_eq!(sender.stats().packets_sent, 0);
    }
}
