use std::net::SocketAddr;
use std::time::{Duration, Instant};

use super::header::{NetSrc, PacketHeader, is_out_of_band};
use super::rate::RateBudget;
use super::stats::ChannelStats;
use super::transport::Transport;
use crate::config::ChannelConfig;
use crate::error::ChannelError;
use crate::msg::MsgBuf;
use crate::protocol::{MAX_MSGLEN, OUT_OF_BAND};

/// Outgoing reliable data. At most one payload is in flight per peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReliableSlot {
    Idle,
    /// `sent_at` is the sequence of the last packet that carried `payload`.
    Staged { payload: Vec<u8>, sent_at: u32 },
}

/// Snapshot of the sequencing state, used to check that rejected packets
/// leave the channel untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceState {
    pub incoming_sequence: u32,
    pub incoming_acknowledged: u32,
    pub incoming_reliable_sequence: bool,
    pub incoming_reliable_acknowledged: bool,
    pub outgoing_sequence: u32,
    pub reliable_sequence: bool,
    pub reliable: ReliableSlot,
}

/// Sequenced channel to one peer.
///
/// Every datagram carries unreliable data that is lost along with the
/// packet. Reliable data written to [`NetChan::message`] is staged on the
/// next transmit and repeated until the peer acknowledges it through the
/// toggle bit in its header.
#[derive(Debug)]
pub struct NetChan {
    sock: NetSrc,
    remote_address: SocketAddr,
    qport: u16,
    config: ChannelConfig,

    /// Packets lost between the last two accepted ones.
    dropped: u32,

    incoming_sequence: u32,
    incoming_acknowledged: u32,
    incoming_reliable_acknowledged: bool,
    incoming_reliable_sequence: bool,

    outgoing_sequence: u32,
    reliable_sequence: bool,
    reliable: ReliableSlot,

    /// Reliable data accumulated between transmits.
    pub message: MsgBuf,
    fatal_error: bool,

    last_sent: Instant,
    last_received: Instant,

    stats: ChannelStats,
    rate: RateBudget,
}

impl NetChan {
    pub fn new(sock: NetSrc, remote_address: SocketAddr, qport: u16, config: ChannelConfig) -> Self {
        let now = Instant::now();
        let message = MsgBuf::with_overflow(config.reliable_capacity());
        let rate = RateBudget::new(config.rate);

        Self {
            sock,
            remote_address,
            qport,
            config,
            dropped: 0,
            incoming_sequence: 0,
            incoming_acknowledged: 0,
            incoming_reliable_acknowledged: false,
            incoming_reliable_sequence: false,
            outgoing_sequence: 1,
            reliable_sequence: false,
            reliable: ReliableSlot::Idle,
            message,
            fatal_error: false,
            last_sent: now,
            last_received: now,
            stats: ChannelStats::default(),
            rate,
        }
    }

    pub fn sock(&self) -> NetSrc {
        self.sock
    }

    pub fn remote_address(&self) -> SocketAddr {
        self.remote_address
    }

    pub fn qport(&self) -> u16 {
        self.qport
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    pub fn stats(&self) -> &ChannelStats {
        &self.stats
    }

    pub fn dropped(&self) -> u32 {
        self.dropped
    }

    pub fn incoming_sequence(&self) -> u32 {
        self.incoming_sequence
    }

    pub fn incoming_acknowledged(&self) -> u32 {
        self.incoming_acknowledged
    }

    pub fn outgoing_sequence(&self) -> u32 {
        self.outgoing_sequence
    }

    pub fn reliable_slot(&self) -> &ReliableSlot {
        &self.reliable
    }

    pub fn has_fatal_error(&self) -> bool {
        self.fatal_error
    }

    pub fn last_sent(&self) -> Instant {
        self.last_sent
    }

    pub fn last_received(&self) -> Instant {
        self.last_received
    }

    pub fn sequence_state(&self) -> SequenceState {
        SequenceState {
            incoming_sequence: self.incoming_sequence,
            incoming_acknowledged: self.incoming_acknowledged,
            incoming_reliable_sequence: self.incoming_reliable_sequence,
            incoming_reliable_acknowledged: self.incoming_reliable_acknowledged,
            outgoing_sequence: self.outgoing_sequence,
            reliable_sequence: self.reliable_sequence,
            reliable: self.reliable.clone(),
        }
    }

    /// True when nothing is staged, so a new reliable payload can go out on
    /// the next transmit.
    pub fn can_reliable(&self) -> bool {
        matches!(self.reliable, ReliableSlot::Idle)
    }

    /// True when the next transmit will carry reliable data, either a
    /// retransmit of a payload the peer missed or a fresh one from `message`.
    pub fn need_reliable(&self) -> bool {
        match &self.reliable {
            ReliableSlot::Staged { sent_at, .. } => {
                self.incoming_acknowledged > *sent_at
                    && self.incoming_reliable_acknowledged != self.reliable_sequence
            }
            ReliableSlot::Idle => !self.message.is_empty(),
        }
    }

    /// Assembles and sends one datagram with any due reliable data followed by
    /// `unreliable`. Returns `Ok(false)` when the send was skipped because the
    /// reliable message overflowed.
    pub fn transmit<T: Transport + ?Sized>(
        &mut self,
        unreliable: &[u8],
        transport: &mut T,
    ) -> Result<bool, ChannelError> {
        if self.message.is_overflowed() {
            self.fatal_error = true;
            log::error!("{}: outgoing message overflow", self.remote_address);
            return Ok(false);
        }

        let send_reliable = self.need_reliable();
        let sequence = self.outgoing_sequence;

        if self.can_reliable() && !self.message.is_empty() {
            let payload = self.message.as_bytes().to_vec();
            self.message.clear();
            self.reliable_sequence = !self.reliable_sequence;
            self.reliable = ReliableSlot::Staged {
                payload,
                sent_at: sequence,
            };
        } else if send_reliable {
            if let ReliableSlot::Staged { sent_at, .. } = &mut self.reliable {
                log::debug!(
                    "{}: resending reliable from {} in {}",
                    self.remote_address,
                    sent_at,
                    sequence
                );
                *sent_at = sequence;
                self.stats.reliable_resent += 1;
            }
        }

        let header = PacketHeader {
            sequence,
            reliable: send_reliable,
            ack: self.incoming_sequence,
            reliable_ack: self.incoming_reliable_sequence,
            qport: match self.sock {
                NetSrc::Client => Some(self.qport),
                NetSrc::Server => None,
            },
        };

        let mut packet = MsgBuf::new(self.config.max_msglen);
        header.write(&mut packet)?;

        if send_reliable {
            if let ReliableSlot::Staged { payload, .. } = &self.reliable {
                packet.write(payload)?;
                self.stats.reliable_sent += 1;
            }
        }

        if packet.remaining() >= unreliable.len() {
            packet.write(unreliable)?;
        } else {
            log::warn!(
                "{}: dumped unreliable ({} bytes, {} free)",
                self.remote_address,
                unreliable.len(),
                packet.remaining()
            );
            self.stats.unreliable_dumped += 1;
        }

        self.outgoing_sequence = sequence.wrapping_add(1);
        self.last_sent = Instant::now();

        log::trace!(
            "{}: send {} bytes seq={} rel={} ack={} rack={}",
            self.remote_address,
            packet.cur_size(),
            sequence,
            send_reliable,
            header.ack,
            header.reliable_ack
        );

        transport.send_packet(packet.as_bytes(), self.remote_address)?;

        self.rate.record(packet.cur_size());
        self.stats.packets_sent += 1;
        self.stats.bytes_sent += packet.cur_size() as u64;
        Ok(true)
    }

    /// Validates and consumes the header of a datagram from the peer. On
    /// success the read cursor of `msg` sits on the payload.
    ///
    /// Stale, duplicate and malformed packets return `false` and leave the
    /// sequencing and reliable state as it was. The only field they touch is
    /// `packets_rejected` in the statistics.
    pub fn process(&mut self, msg: &mut MsgBuf) -> bool {
        if is_out_of_band(msg.as_bytes()) {
            log::debug!("{}: out of band packet on channel", self.remote_address);
            self.stats.packets_rejected += 1;
            return false;
        }

        msg.begin_reading();
        let header = match PacketHeader::read(msg, self.sock) {
            Ok(header) => header,
            Err(err) => {
                log::debug!("{}: malformed packet header: {}", self.remote_address, err);
                self.stats.packets_rejected += 1;
                return false;
            }
        };

        log::trace!(
            "{}: recv {} bytes seq={} rel={} ack={} rack={}",
            self.remote_address,
            msg.cur_size(),
            header.sequence,
            header.reliable,
            header.ack,
            header.reliable_ack
        );

        if header.sequence <= self.incoming_sequence {
            log::debug!(
                "{}: out of order packet {} at {}",
                self.remote_address,
                header.sequence,
                self.incoming_sequence
            );
            self.stats.packets_rejected += 1;
            return false;
        }

        self.dropped = header.sequence - (self.incoming_sequence + 1);
        if self.dropped > 0 {
            log::debug!(
                "{}: dropped {} packets at {}",
                self.remote_address,
                self.dropped,
                header.sequence
            );
            self.stats.packets_dropped += u64::from(self.dropped);
        }

        // The peer's toggle matches ours once it has the staged payload.
        if header.reliable_ack == self.reliable_sequence {
            self.reliable = ReliableSlot::Idle;
        }

        self.incoming_sequence = header.sequence;
        self.incoming_acknowledged = header.ack;
        self.incoming_reliable_acknowledged = header.reliable_ack;
        if header.reliable {
            self.incoming_reliable_sequence = !self.incoming_reliable_sequence;
        }

        self.last_received = Instant::now();
        self.stats.packets_received += 1;
        self.stats.bytes_received += msg.cur_size() as u64;

        true
    }

    /// Matches a datagram to this channel by IP address and qport. The source
    /// port is ignored since NAT may remap it mid-session.
    pub fn matches(&self, from: SocketAddr, qport: u16) -> bool {
        self.remote_address.ip() == from.ip() && self.qport == qport
    }

    pub fn update_remote_port(&mut self, port: u16) {
        if self.remote_address.port() != port {
            log::info!(
                "{}: fixing up translated port to {}",
                self.remote_address,
                port
            );
            self.remote_address.set_port(port);
        }
    }

    pub fn time_since_received(&self) -> Duration {
        self.last_received.elapsed()
    }

    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        self.time_since_received() > timeout
    }

    pub fn rate(&self) -> &RateBudget {
        &self.rate
    }

    pub fn set_rate(&mut self, rate: usize) {
        self.rate.set_rate(rate);
    }

    /// Checks the peer's byte budget before a snapshot is built. A suppressed
    /// frame counts as an empty send.
    pub fn rate_drop(&mut self) -> bool {
        if self.rate.should_drop() {
            self.stats.rate_suppressed += 1;
            return true;
        }
        false
    }
}

/// Sends a connectionless datagram: a `0xFFFF_FFFF` marker then `data`.
pub fn send_out_of_band<T: Transport + ?Sized>(
    transport: &mut T,
    to: SocketAddr,
    data: &[u8],
) -> Result<(), ChannelError> {
    let mut packet = MsgBuf::new(MAX_MSGLEN);
    packet.write(&OUT_OF_BAND.to_le_bytes())?;
    packet.write(data)?;
    transport.send_packet(packet.as_bytes(), to)?;
    Ok(())
}

pub fn print_out_of_band<T: Transport + ?Sized>(
    transport: &mut T,
    to: SocketAddr,
    text: &str,
) -> Result<(), ChannelError> {
    send_out_of_band(transport, to, text.as_bytes())
}
