mod entity;
mod frame;
mod usercmd;

pub use entity::{
    EntityBits, EntityState, delta_bits, read_delta, read_delta_entity, read_entity_header,
    write_delta_entity, write_remove_entity,
};
pub use frame::{read_packet_entities, write_packet_entities};
pub use usercmd::{CmdBits, UserCmd, read_delta_usercmd, usercmd_bits, write_delta_usercmd};
