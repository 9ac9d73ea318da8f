use std::cmp::Ordering;

use super::entity::{
    EntityBits, EntityState, read_delta_entity, read_entity_header, write_delta_entity,
    write_remove_entity,
};
use crate::error::MsgError;
use crate::msg::MsgBuf;
use crate::protocol::MAX_EDICTS;

/// Encodes the entity list `to` against the previous list `from`.
///
/// Both lists must be sorted by entity number. Entities that appear in `to`
/// only are sent in full against `baseline(number)`, entities missing from
/// `to` are removed, and the list ends with an empty header.
pub fn write_packet_entities(
    from: &[EntityState],
    to: &[EntityState],
    baseline: impl Fn(u16) -> EntityState,
    msg: &mut MsgBuf,
) -> Result<(), MsgError> {
    debug_assert!(from.is_sorted_by_key(|e| e.number));
    debug_assert!(to.is_sorted_by_key(|e| e.number));

    let mut old = from.iter().peekable();
    let mut new = to.iter().peekable();

    loop {
        let order = match (old.peek(), new.peek()) {
            (None, None) => break,
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (Some(o), Some(n)) => o.number.cmp(&n.number),
        };

        match order {
            Ordering::Equal => {
                if let (Some(o), Some(n)) = (old.next(), new.next()) {
                    write_delta_entity(o, n, msg, false, false)?;
                }
            }
            Ordering::Greater => {
                if let Some(n) = new.next() {
                    write_delta_entity(&baseline(n.number), n, msg, true, true)?;
                }
            }
            Ordering::Less => {
                if let Some(o) = old.next() {
                    write_remove_entity(o.number, msg)?;
                }
            }
        }
    }

    msg.write_short(0)
}

/// Decodes a list written by [`write_packet_entities`] on top of `from`.
pub fn read_packet_entities(
    from: &[EntityState],
    baseline: impl Fn(u16) -> EntityState,
    msg: &mut MsgBuf,
) -> Result<Vec<EntityState>, MsgError> {
    let mut out = Vec::with_capacity(from.len());
    let mut old = from.iter().peekable();

    loop {
        let (number, bits) = read_entity_header(msg)?;
        if number == 0 {
            break;
        }
        if usize::from(number) >= MAX_EDICTS {
            return Err(MsgError::InvalidEntityNumber(u32::from(number)));
        }

        while let Some(unchanged) = old.next_if(|o| o.number < number) {
            out.push(*unchanged);
        }

        let previous = old.next_if(|o| o.number == number);

        if bits.contains(EntityBits::REMOVE) {
            if previous.is_none() {
                log::debug!("remove for entity {} not in previous frame", number);
            }
            continue;
        }

        let state = match previous {
            Some(prev) => read_delta_entity(msg, prev, number, bits)?,
            None => read_delta_entity(msg, &baseline(number), number, bits)?,
        };
        out.push(state);
    }

    out.extend(old.copied());
    Ok(out)
}
