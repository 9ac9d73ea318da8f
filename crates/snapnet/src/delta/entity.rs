use bitflags::bitflags;
use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::error::MsgError;
use crate::msg::MsgBuf;
use crate::protocol::{MAX_EDICTS, RF_BEAM};

bitflags! {
    /// Per-field presence mask of an entity delta, sent as 1 to 4 bytes.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct EntityBits: u32 {
        const ORIGIN1 = 1 << 0;
        const ORIGIN2 = 1 << 1;
        const ANGLE2 = 1 << 2;
        const ANGLE3 = 1 << 3;
        const FRAME8 = 1 << 4;
        const EVENT = 1 << 5;
        const REMOVE = 1 << 6;
        const MOREBITS1 = 1 << 7;

        const NUMBER16 = 1 << 8;
        const ORIGIN3 = 1 << 9;
        const ANGLE1 = 1 << 10;
        const MODEL = 1 << 11;
        const RENDERFX8 = 1 << 12;
        const EFFECTS8 = 1 << 14;
        const MOREBITS2 = 1 << 15;

        const SKIN8 = 1 << 16;
        const FRAME16 = 1 << 17;
        const RENDERFX16 = 1 << 18;
        const EFFECTS16 = 1 << 19;
        const MODEL2 = 1 << 20;
        const MODEL3 = 1 << 21;
        const MODEL4 = 1 << 22;
        const MOREBITS3 = 1 << 23;

        const OLDORIGIN = 1 << 24;
        const SKIN16 = 1 << 25;
        const SOUND = 1 << 26;
        const SOLID = 1 << 27;
    }
}

impl EntityBits {
    const MOREBITS: Self = Self::MOREBITS1
        .union(Self::MOREBITS2)
        .union(Self::MOREBITS3);
    const MODELS: [Self; 4] = [Self::MODEL, Self::MODEL2, Self::MODEL3, Self::MODEL4];
    const ORIGINS: [Self; 3] = [Self::ORIGIN1, Self::ORIGIN2, Self::ORIGIN3];
    const ANGLES: [Self; 3] = [Self::ANGLE1, Self::ANGLE2, Self::ANGLE3];

    /// Number of mask bytes on the wire once the MOREBITS chain is applied.
    fn with_chain(self) -> (Self, usize) {
        let raw = self.difference(Self::MOREBITS).bits();
        if raw & 0xFF00_0000 != 0 {
            (self | Self::MOREBITS, 4)
        } else if raw & 0x00FF_0000 != 0 {
            (self | Self::MOREBITS2 | Self::MOREBITS1, 3)
        } else if raw & 0x0000_FF00 != 0 {
            (self | Self::MOREBITS1, 2)
        } else {
            (self, 1)
        }
    }
}

/// One networked object's visible state at one tick.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct EntityState {
    pub number: u16,
    pub origin: Vec3,
    pub angles: Vec3,
    pub old_origin: Vec3,
    pub modelindex: [u8; 4],
    pub frame: u16,
    pub skinnum: u32,
    pub effects: u32,
    pub renderfx: u32,
    pub solid: u16,
    pub sound: u8,
    pub event: u8,
}

impl EntityState {
    pub fn new(number: u16) -> Self {
        Self {
            number,
            ..Default::default()
        }
    }

    pub fn is_beam(&self) -> bool {
        self.renderfx & RF_BEAM != 0
    }
}

fn validate_number(number: u16) -> Result<(), MsgError> {
    if number == 0 || usize::from(number) >= MAX_EDICTS {
        return Err(MsgError::InvalidEntityNumber(u32::from(number)));
    }
    Ok(())
}

/// Picks the 8-bit, 16-bit or combined (32-bit) flag for a changed value.
fn width_bits(value: u32, short_limit: u32, bits8: EntityBits, bits16: EntityBits) -> EntityBits {
    if value < 256 {
        bits8
    } else if value < short_limit {
        bits16
    } else {
        bits8 | bits16
    }
}

/// Computes the change mask of `to` against `from`, without the MOREBITS
/// chain.
pub fn delta_bits(from: &EntityState, to: &EntityState, new_entity: bool) -> EntityBits {
    let mut bits = EntityBits::empty();

    if to.number >= 256 {
        bits |= EntityBits::NUMBER16;
    }

    for axis in 0..3 {
        if to.origin[axis] != from.origin[axis] {
            bits |= EntityBits::ORIGINS[axis];
        }
        if to.angles[axis] != from.angles[axis] {
            bits |= EntityBits::ANGLES[axis];
        }
    }

    if to.skinnum != from.skinnum {
        bits |= width_bits(to.skinnum, 0x10000, EntityBits::SKIN8, EntityBits::SKIN16);
    }

    if to.frame != from.frame {
        bits |= if to.frame < 256 {
            EntityBits::FRAME8
        } else {
            EntityBits::FRAME16
        };
    }

    if to.effects != from.effects {
        bits |= width_bits(to.effects, 0x8000, EntityBits::EFFECTS8, EntityBits::EFFECTS16);
    }

    if to.renderfx != from.renderfx {
        bits |= width_bits(
            to.renderfx,
            0x8000,
            EntityBits::RENDERFX8,
            EntityBits::RENDERFX16,
        );
    }

    if to.solid != from.solid {
        bits |= EntityBits::SOLID;
    }

    // Events are one-shot and never compared against the baseline.
    if to.event != 0 {
        bits |= EntityBits::EVENT;
    }

    for (slot, flag) in EntityBits::MODELS.iter().enumerate() {
        if to.modelindex[slot] != from.modelindex[slot] {
            bits |= *flag;
        }
    }

    if to.sound != from.sound {
        bits |= EntityBits::SOUND;
    }

    if new_entity || to.is_beam() || to.old_origin != from.old_origin {
        bits |= EntityBits::OLDORIGIN;
    }

    bits
}

fn write_header(msg: &mut MsgBuf, bits: EntityBits, number: u16) -> Result<(), MsgError> {
    let (bits, len) = bits.with_chain();
    msg.write(&bits.bits().to_le_bytes()[..len])?;

    if bits.contains(EntityBits::NUMBER16) {
        msg.write_short(number as i16)
    } else {
        msg.write_byte(number as u8)
    }
}

fn write_sized(msg: &mut MsgBuf, value: u32, bits8: bool, bits16: bool) -> Result<(), MsgError> {
    match (bits8, bits16) {
        (true, true) => msg.write_long(value as i32),
        (true, false) => msg.write_byte(value as u8),
        (false, true) => msg.write_short(value as u16 as i16),
        (false, false) => Ok(()),
    }
}

/// Writes the fields of `to` that differ from `from`.
///
/// Nothing is written when nothing changed, unless `force` is set. A
/// `new_entity` always carries its old origin.
pub fn write_delta_entity(
    from: &EntityState,
    to: &EntityState,
    msg: &mut MsgBuf,
    force: bool,
    new_entity: bool,
) -> Result<(), MsgError> {
    validate_number(to.number)?;

    let bits = delta_bits(from, to, new_entity);
    if bits.difference(EntityBits::NUMBER16).is_empty() && !force {
        return Ok(());
    }

    write_header(msg, bits, to.number)?;

    for (slot, flag) in EntityBits::MODELS.iter().enumerate() {
        if bits.contains(*flag) {
            msg.write_byte(to.modelindex[slot])?;
        }
    }

    if bits.contains(EntityBits::FRAME8) {
        msg.write_byte(to.frame as u8)?;
    }
    if bits.contains(EntityBits::FRAME16) {
        msg.write_short(to.frame as i16)?;
    }

    write_sized(
        msg,
        to.skinnum,
        bits.contains(EntityBits::SKIN8),
        bits.contains(EntityBits::SKIN16),
    )?;
    write_sized(
        msg,
        to.effects,
        bits.contains(EntityBits::EFFECTS8),
        bits.contains(EntityBits::EFFECTS16),
    )?;
    write_sized(
        msg,
        to.renderfx,
        bits.contains(EntityBits::RENDERFX8),
        bits.contains(EntityBits::RENDERFX16),
    )?;

    for axis in 0..3 {
        if bits.contains(EntityBits::ORIGINS[axis]) {
            msg.write_coord(to.origin[axis])?;
        }
    }
    for axis in 0..3 {
        if bits.contains(EntityBits::ANGLES[axis]) {
            msg.write_angle(to.angles[axis])?;
        }
    }

    if bits.contains(EntityBits::OLDORIGIN) {
        msg.write_pos(to.old_origin)?;
    }
    if bits.contains(EntityBits::SOUND) {
        msg.write_byte(to.sound)?;
    }
    if bits.contains(EntityBits::EVENT) {
        msg.write_byte(to.event)?;
    }
    if bits.contains(EntityBits::SOLID) {
        msg.write_short(to.solid as i16)?;
    }

    Ok(())
}

/// Tells the peer that `number` left the snapshot.
pub fn write_remove_entity(number: u16, msg: &mut MsgBuf) -> Result<(), MsgError> {
    validate_number(number)?;

    let mut bits = EntityBits::REMOVE;
    if number >= 256 {
        bits |= EntityBits::NUMBER16;
    }
    write_header(msg, bits, number)
}

/// Reads the chained mask and the entity number that follows it.
pub fn read_entity_header(msg: &mut MsgBuf) -> Result<(u16, EntityBits), MsgError> {
    let mut raw = u32::from(msg.read_byte()?);
    if raw & EntityBits::MOREBITS1.bits() != 0 {
        raw |= u32::from(msg.read_byte()?) << 8;
    }
    if raw & EntityBits::MOREBITS2.bits() != 0 {
        raw |= u32::from(msg.read_byte()?) << 16;
    }
    if raw & EntityBits::MOREBITS3.bits() != 0 {
        raw |= u32::from(msg.read_byte()?) << 24;
    }

    let bits = EntityBits::from_bits_retain(raw);
    let number = if bits.contains(EntityBits::NUMBER16) {
        msg.read_short()? as u16
    } else {
        u16::from(msg.read_byte()?)
    };

    Ok((number, bits))
}

fn read_sized(msg: &mut MsgBuf, bits8: bool, bits16: bool) -> Result<Option<u32>, MsgError> {
    Ok(match (bits8, bits16) {
        (true, true) => Some(msg.read_long()? as u32),
        (true, false) => Some(u32::from(msg.read_byte()?)),
        (false, true) => Some(u32::from(msg.read_short()? as u16)),
        (false, false) => None,
    })
}

/// Rebuilds an entity from `from` plus the fields flagged in `bits`.
pub fn read_delta_entity(
    msg: &mut MsgBuf,
    from: &EntityState,
    number: u16,
    bits: EntityBits,
) -> Result<EntityState, MsgError> {
    let mut to = *from;
    to.number = number;

    for (slot, flag) in EntityBits::MODELS.iter().enumerate() {
        if bits.contains(*flag) {
            to.modelindex[slot] = msg.read_byte()?;
        }
    }

    if bits.contains(EntityBits::FRAME8) {
        to.frame = u16::from(msg.read_byte()?);
    }
    if bits.contains(EntityBits::FRAME16) {
        to.frame = msg.read_short()? as u16;
    }

    if let Some(skin) = read_sized(
        msg,
        bits.contains(EntityBits::SKIN8),
        bits.contains(EntityBits::SKIN16),
    )? {
        to.skinnum = skin;
    }
    if let Some(effects) = read_sized(
        msg,
        bits.contains(EntityBits::EFFECTS8),
        bits.contains(EntityBits::EFFECTS16),
    )? {
        to.effects = effects;
    }
    if let Some(renderfx) = read_sized(
        msg,
        bits.contains(EntityBits::RENDERFX8),
        bits.contains(EntityBits::RENDERFX16),
    )? {
        to.renderfx = renderfx;
    }

    for axis in 0..3 {
        if bits.contains(EntityBits::ORIGINS[axis]) {
            to.origin[axis] = msg.read_coord()?;
        }
    }
    for axis in 0..3 {
        if bits.contains(EntityBits::ANGLES[axis]) {
            to.angles[axis] = msg.read_angle()?;
        }
    }

    if bits.contains(EntityBits::OLDORIGIN) {
        to.old_origin = msg.read_pos()?;
    }
    if bits.contains(EntityBits::SOUND) {
        to.sound = msg.read_byte()?;
    }
    to.event = if bits.contains(EntityBits::EVENT) {
        msg.read_byte()?
    } else {
        0
    };
    if bits.contains(EntityBits::SOLID) {
        to.solid = msg.read_short()? as u16;
    }

    Ok(to)
}

/// Reads a header and the delta it introduces in one go.
pub fn read_delta(msg: &mut MsgBuf, from: &EntityState) -> Result<EntityState, MsgError> {
    let (number, bits) = read_entity_header(msg)?;
    read_delta_entity(msg, from, number, bits)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::MAX_MSGLEN;

    fn encode(from: &EntityState, to: &EntityState, force: bool, new_entity: bool) -> MsgBuf {
        let mut msg = MsgBuf::new(MAX_MSGLEN);
        write_delta_entity(from, to, &mut msg, force, new_entity).unwrap();
        msg
    }

    #[test]
    fn test_moved_entity_encodes_single_coord() {
        let mut baseline = EntityState::new(12);
        baseline.origin = Vec3::new(100.0, 0.0, 0.0);
        let mut moved = baseline;
        moved.origin.x = 108.0;

        let mut msg = encode(&baseline, &moved, false, false);
        assert_eq!(msg.as_bytes(), &[0x01, 12, 0x60, 0x03]);

        msg.begin_reading();
        let decoded = read_delta(&mut msg, &baseline).unwrap();
        assert_eq!(decoded, moved);
    }

    #[test]
    fn test_unchanged_entity_writes_nothing() {
        let mut state = EntityState::new(300);
        state.origin = Vec3::new(1.0, 2.0, 3.0);
        state.skinnum = 70_000;

        assert!(encode(&state, &state, false, false).is_empty());
        assert!(!encode(&state, &state, true, false).is_empty());
    }

    #[test]
    fn test_forced_write_of_unchanged_entity_is_header_only() {
        let state = EntityState::new(5);
        let mut msg = encode(&state, &state, true, false);
        assert_eq!(msg.as_bytes(), &[0x00, 5]);

        msg.begin_reading();
        assert_eq!(read_delta(&mut msg, &state).unwrap(), state);
    }

    #[test]
    fn test_invalid_number_is_rejected() {
        let mut msg = MsgBuf::new(64);
        let from = EntityState::default();

        let err = write_delta_entity(&from, &EntityState::new(0), &mut msg, true, false);
        assert_eq!(err, Err(MsgError::InvalidEntityNumber(0)));

        let too_big = EntityState::new(MAX_EDICTS as u16);
        let err = write_delta_entity(&from, &too_big, &mut msg, true, false);
        assert_eq!(err, Err(MsgError::InvalidEntityNumber(MAX_EDICTS as u32)));
        assert!(msg.is_empty());
    }

    #[test]
    fn test_wide_number_uses_second_mask_byte() {
        let from = EntityState::new(700);
        let mut to = from;
        to.sound = 3;

        let mut msg = encode(&from, &to, false, false);
        // SOUND lives in byte 3, so the whole chain is present.
        assert_eq!(msg.cur_size(), 4 + 2 + 1);

        msg.begin_reading();
        let (number, bits) = read_entity_header(&mut msg).unwrap();
        assert_eq!(number, 700);
        assert!(bits.contains(EntityBits::NUMBER16 | EntityBits::SOUND));
    }

    #[test]
    fn test_width_tiers() {
        let from = EntityState::new(1);
        let cases = [
            (10, EntityBits::SKIN8, 1),
            (1000, EntityBits::SKIN16, 2),
            (0x1_0000, EntityBits::SKIN8 | EntityBits::SKIN16, 4),
        ];

        for (skin, expected, payload) in cases {
            let mut to = from;
            to.skinnum = skin;
            let bits = delta_bits(&from, &to, false);
            assert_eq!(bits, expected);

            let mut msg = encode(&from, &to, false, false);
            let (_, header_len) = bits.with_chain();
            assert_eq!(msg.cur_size(), header_len + 1 + payload);

            msg.begin_reading();
            assert_eq!(read_delta(&mut msg, &from).unwrap().skinnum, skin);
        }

        let mut to = from;
        to.effects = 0x8000;
        assert_eq!(
            delta_bits(&from, &to, false),
            EntityBits::EFFECTS8 | EntityBits::EFFECTS16
        );
        to.frame = 300;
        assert!(delta_bits(&from, &to, false).contains(EntityBits::FRAME16));
    }

    #[test]
    fn test_event_is_zero_compressed() {
        let mut from = EntityState::new(2);
        from.event = 9;
        let to = EntityState { event: 0, ..from };

        // A stale event in the baseline must not resurface.
        let mut msg = encode(&from, &to, true, false);
        msg.begin_reading();
        assert_eq!(read_delta(&mut msg, &from).unwrap().event, 0);

        let repeated = EntityState { event: 9, ..from };
        assert!(delta_bits(&from, &repeated, false).contains(EntityBits::EVENT));
    }

    #[test]
    fn test_old_origin_forced_for_new_and_beam() {
        let from = EntityState::new(3);
        let to = from;

        assert!(delta_bits(&from, &to, true).contains(EntityBits::OLDORIGIN));

        let beam = EntityState {
            renderfx: RF_BEAM,
            ..from
        };
        assert!(delta_bits(&beam, &beam, false).contains(EntityBits::OLDORIGIN));
        assert!(!delta_bits(&from, &to, false).contains(EntityBits::OLDORIGIN));
    }

    #[test]
    fn test_remove_header() {
        let mut msg = MsgBuf::new(16);
        write_remove_entity(9, &mut msg).unwrap();
        write_remove_entity(512, &mut msg).unwrap();

        msg.begin_reading();
        assert_eq!(
            read_entity_header(&mut msg).unwrap(),
            (9, EntityBits::REMOVE)
        );
        let (number, bits) = read_entity_header(&mut msg).unwrap();
        assert_eq!(number, 512);
        assert!(bits.contains(EntityBits::REMOVE | EntityBits::NUMBER16));
    }

    #[test]
    fn test_truncated_delta_is_an_error() {
        let from = EntityState::new(4);
        let to = EntityState {
            origin: Vec3::new(1.0, 2.0, 3.0),
            ..from
        };
        let full = encode(&from, &to, false, false);
        let bytes = full.as_bytes();

        let mut cut = MsgBuf::from_bytes(&bytes[..bytes.len() - 1]);
        assert!(matches!(
            read_delta(&mut cut, &from),
            Err(MsgError::UnexpectedEnd { .. })
        ));
    }
}
