mod channel;
mod header;
mod rate;
mod simulator;
mod stats;
mod transport;

pub use channel::{NetChan, ReliableSlot, SequenceState, print_out_of_band, send_out_of_band};
pub use header::{NetSrc, PacketHeader, is_out_of_band};
pub use rate::{RATE_MESSAGES, RateBudget};
pub use simulator::{Datagram, LinkSimulator, LinkStats};
pub use stats::{ChannelStats, PacketLossSimulation};
pub use transport::{Transport, TransportStats, UdpTransport};
