pub mod config;
pub mod delta;
pub mod error;
pub mod msg;
pub mod net;
pub mod protocol;

pub use config::ChannelConfig;
pub use delta::{
    CmdBits, EntityBits, EntityState, UserCmd, read_delta, read_delta_entity, read_delta_usercmd,
    read_entity_header, read_packet_entities, write_delta_entity, write_delta_usercmd,
    write_packet_entities, write_remove_entity,
};
pub use error::{ChannelError, MsgError};
pub use msg::MsgBuf;
pub use net::{
    ChannelStats, Datagram, LinkSimulator, NetChan, NetSrc, PacketHeader, PacketLossSimulation,
    RateBudget, ReliableSlot, SequenceState, Transport, UdpTransport, print_out_of_band,
    send_out_of_band,
};
pub use protocol::{MAX_EDICTS, MAX_MSGLEN, PACKET_HEADER, PORT_CLIENT, PORT_SERVER};
