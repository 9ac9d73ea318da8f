use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::error::MsgError;
use crate::msg::MsgBuf;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct CmdBits: u8 {
        const ANGLE1 = 1 << 0;
        const ANGLE2 = 1 << 1;
        const ANGLE3 = 1 << 2;
        const FORWARD = 1 << 3;
        const SIDE = 1 << 4;
        const UP = 1 << 5;
        const BUTTONS = 1 << 6;
        const IMPULSE = 1 << 7;
    }
}

impl CmdBits {
    const ANGLES: [Self; 3] = [Self::ANGLE1, Self::ANGLE2, Self::ANGLE3];
}

/// One client tick of control input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UserCmd {
    pub angles: [i16; 3],
    pub forwardmove: i16,
    pub sidemove: i16,
    pub upmove: i16,
    pub buttons: u8,
    pub impulse: u8,
    pub msec: u8,
    pub lightlevel: u8,
}

impl UserCmd {
    pub const BUTTON_ATTACK: u8 = 1 << 0;
    pub const BUTTON_USE: u8 = 1 << 1;
    pub const BUTTON_ANY: u8 = 1 << 7;

    #[inline]
    pub fn has_button(&self, button: u8) -> bool {
        self.buttons & button != 0
    }

    #[inline]
    pub fn set_button(&mut self, button: u8, value: bool) {
        if value {
            self.buttons |= button;
        } else {
            self.buttons &= !button;
        }
    }
}

pub fn usercmd_bits(from: &UserCmd, to: &UserCmd) -> CmdBits {
    let mut bits = CmdBits::empty();

    for (axis, flag) in CmdBits::ANGLES.iter().enumerate() {
        if to.angles[axis] != from.angles[axis] {
            bits |= *flag;
        }
    }
    if to.forwardmove != from.forwardmove {
        bits |= CmdBits::FORWARD;
    }
    if to.sidemove != from.sidemove {
        bits |= CmdBits::SIDE;
    }
    if to.upmove != from.upmove {
        bits |= CmdBits::UP;
    }
    if to.buttons != from.buttons {
        bits |= CmdBits::BUTTONS;
    }
    if to.impulse != from.impulse {
        bits |= CmdBits::IMPULSE;
    }

    bits
}

/// Writes the changed fields of `to`, then `msec` and `lightlevel`, which are
/// always present.
pub fn write_delta_usercmd(from: &UserCmd, to: &UserCmd, msg: &mut MsgBuf) -> Result<(), MsgError> {
    let bits = usercmd_bits(from, to);
    msg.write_byte(bits.bits())?;

    for (axis, flag) in CmdBits::ANGLES.iter().enumerate() {
        if bits.contains(*flag) {
            msg.write_short(to.angles[axis])?;
        }
    }
    if bits.contains(CmdBits::FORWARD) {
        msg.write_short(to.forwardmove)?;
    }
    if bits.contains(CmdBits::SIDE) {
        msg.write_short(to.sidemove)?;
    }
    if bits.contains(CmdBits::UP) {
        msg.write_short(to.upmove)?;
    }
    if bits.contains(CmdBits::BUTTONS) {
        msg.write_byte(to.buttons)?;
    }
    if bits.contains(CmdBits::IMPULSE) {
        msg.write_byte(to.impulse)?;
    }

    msg.write_byte(to.msec)?;
    msg.write_byte(to.lightlevel)
}

pub fn read_delta_usercmd(msg: &mut MsgBuf, from: &UserCmd) -> Result<UserCmd, MsgError> {
    let bits = CmdBits::from_bits_retain(msg.read_byte()?);
    let mut cmd = *from;

    for (axis, flag) in CmdBits::ANGLES.iter().enumerate() {
        if bits.contains(*flag) {
            cmd.angles[axis] = msg.read_short()?;
        }
    }
    if bits.contains(CmdBits::FORWARD) {
        cmd.forwardmove = msg.read_short()?;
    }
    if bits.contains(CmdBits::SIDE) {
        cmd.sidemove = msg.read_short()?;
    }
    if bits.contains(CmdBits::UP) {
        cmd.upmove = msg.read_short()?;
    }
    if bits.contains(CmdBits::BUTTONS) {
        cmd.buttons = msg.read_byte()?;
    }
    if bits.contains(CmdBits::IMPULSE) {
        cmd.impulse = msg.read_byte()?;
    }

    cmd.msec = msg.read_byte()?;
    cmd.lightlevel = msg.read_byte()?;

    Ok(cmd)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usercmd_roundtrip() {
        let from = UserCmd::default();
        let mut to = UserCmd {
            angles: [100, -200, 300],
            forwardmove: 400,
            sidemove: -200,
            upmove: 0,
            impulse: 7,
            msec: 16,
            lightlevel: 128,
            ..Default::default()
        };
        to.set_button(UserCmd::BUTTON_ATTACK, true);

        let mut msg = MsgBuf::new(64);
        write_delta_usercmd(&from, &to, &mut msg).unwrap();

        msg.begin_reading();
        let decoded = read_delta_usercmd(&mut msg, &from).unwrap();
        assert_eq!(decoded, to);
        assert!(decoded.has_button(UserCmd::BUTTON_ATTACK));
    }

    #[test]
    fn test_unchanged_command_still_carries_timing() {
        let cmd = UserCmd {
            forwardmove: 200,
            msec: 12,
            lightlevel: 40,
            ..Default::default()
        };

        let mut msg = MsgBuf::new(16);
        write_delta_usercmd(&cmd, &cmd, &mut msg).unwrap();
        assert_eq!(msg.as_bytes(), &[0, 12, 40]);
    }

    #[test]
    fn test_single_field_change() {
        let from = UserCmd::default();
        let to = UserCmd {
            sidemove: -1,
            ..from
        };

        let mut msg = MsgBuf::new(16);
        write_delta_usercmd(&from, &to, &mut msg).unwrap();
        assert_eq!(msg.as_bytes(), &[CmdBits::SIDE.bits(), 0xFF, 0xFF, 0, 0]);
    }
}
