use serde::{Deserialize, Serialize};

use crate::error::MsgError;
use crate::msg::MsgBuf;
use crate::protocol::{OUT_OF_BAND, pack_sequence, unpack_sequence};

/// Which end of the connection a channel lives on. Client channels stamp a
/// qport on every packet; server channels expect one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NetSrc {
    Client,
    Server,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    pub sequence: u32,
    pub reliable: bool,
    pub ack: u32,
    pub reliable_ack: bool,
    pub qport: Option<u16>,
}

impl PacketHeader {
    pub fn write(&self, msg: &mut MsgBuf) -> Result<(), MsgError> {
        msg.write(&pack_sequence(self.sequence, self.reliable).to_le_bytes())?;
        msg.write(&pack_sequence(self.ack, self.reliable_ack).to_le_bytes())?;
        if let Some(qport) = self.qport {
            msg.write(&qport.to_le_bytes())?;
        }
        Ok(())
    }

    /// Reads a header as seen by a channel on side `receiver`.
    pub fn read(msg: &mut MsgBuf, receiver: NetSrc) -> Result<Self, MsgError> {
        let (sequence, reliable) = unpack_sequence(msg.read_long()? as u32);
        let (ack, reliable_ack) = unpack_sequence(msg.read_long()? as u32);
        let qport = match receiver {
            NetSrc::Server => Some(msg.read_short()? as u16),
            NetSrc::Client => None,
        };

        Ok(Self {
            sequence,
            reliable,
            ack,
            reliable_ack,
            qport,
        })
    }

    /// Parses the header of a raw datagram without consuming it, so a server
    /// can pick the channel by address and qport first.
    pub fn peek(bytes: &[u8], receiver: NetSrc) -> Option<Self> {
        if is_out_of_band(bytes) {
            return None;
        }
        Self::read(&mut MsgBuf::from_bytes(bytes), receiver).ok()
    }
}

pub fn is_out_of_band(bytes: &[u8]) -> bool {
    bytes.len() >= 4 && bytes[..4] == OUT_OF_BAND.to_le_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_header_layout() {
        let header = PacketHeader {
            sequence: 7,
            reliable: true,
            ack: 3,
            reliable_ack: false,
            qport: Some(0xBEEF),
        };

        let mut msg = MsgBuf::new(16);
        header.write(&mut msg).unwrap();
        assert_eq!(
            msg.as_bytes(),
            &[7, 0, 0, 0x80, 3, 0, 0, 0, 0xEF, 0xBE]
        );

        msg.begin_reading();
        assert_eq!(PacketHeader::read(&mut msg, NetSrc::Server).unwrap(), header);
    }

    #[test]
    fn test_peek_rejects_short_and_out_of_band() {
        assert!(PacketHeader::peek(&[1, 0, 0, 0, 2], NetSrc::Client).is_none());
        assert!(PacketHeader::peek(&[0xFF, 0xFF, 0xFF, 0xFF, b'h', b'i', 0, 0], NetSrc::Client).is_none());

        let peeked = PacketHeader::peek(&[1, 0, 0, 0, 2, 0, 0, 0x80], NetSrc::Client).unwrap();
        assert_eq!(peeked.sequence, 1);
        assert!(peeked.reliable_ack);
        assert_eq!(peeked.qport, None);
    }
}
