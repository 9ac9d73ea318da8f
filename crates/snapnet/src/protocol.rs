pub const MAX_MSGLEN: usize = 1400;
/// Two sequence words plus the optional qport.
pub const PACKET_HEADER: usize = 10;
pub const MAX_EDICTS: usize = 1024;
pub const MAX_STRING_CHARS: usize = 2048;

pub const PORT_SERVER: u16 = 27910;
pub const PORT_CLIENT: u16 = 27901;

pub const SEQUENCE_MASK: u32 = !(1 << 31);
pub const OUT_OF_BAND: u32 = u32::MAX;

/// Beam entities always carry their old origin.
pub const RF_BEAM: u32 = 1 << 7;

#[inline]
pub fn pack_sequence(sequence: u32, flag: bool) -> u32 {
    (sequence & SEQUENCE_MASK) | (u32::from(flag) << 31)
}

#[inline]
pub fn unpack_sequence(word: u32) -> (u32, bool) {
    (word & SEQUENCE_MASK, word >> 31 != 0)
}
