use glam::Vec3;

use super::anorms::BYTE_DIRS;
use super::buffer::MsgBuf;
use crate::error::MsgError;

/// 1/8 unit precision, truncated toward zero.
#[inline]
pub fn coord_to_wire(value: f32) -> i16 {
    (value * 8.0) as i32 as i16
}

#[inline]
pub fn angle_to_wire(degrees: f32) -> u8 {
    ((degrees * 256.0 / 360.0) as i32 & 255) as u8
}

#[inline]
pub fn angle16_to_wire(degrees: f32) -> u16 {
    ((degrees * 65536.0 / 360.0) as i32 & 65535) as u16
}

/// Index of the table direction closest to `dir`, or 0 when none points the
/// same way.
pub fn dir_to_index(dir: Vec3) -> u8 {
    let mut best = 0;
    let mut best_dot = 0.0;

    for (i, candidate) in BYTE_DIRS.iter().enumerate() {
        let dot = dir.dot(*candidate);
        if dot > best_dot {
            best_dot = dot;
            best = i;
        }
    }

    best as u8
}

impl MsgBuf {
    pub fn write_char(&mut self, value: i8) -> Result<(), MsgError> {
        self.write(&value.to_le_bytes())
    }

    pub fn write_byte(&mut self, value: u8) -> Result<(), MsgError> {
        self.write(&[value])
    }

    pub fn write_short(&mut self, value: i16) -> Result<(), MsgError> {
        self.write(&value.to_le_bytes())
    }

    pub fn write_long(&mut self, value: i32) -> Result<(), MsgError> {
        self.write(&value.to_le_bytes())
    }

    pub fn write_float(&mut self, value: f32) -> Result<(), MsgError> {
        self.write(&value.to_le_bytes())
    }

    pub fn write_string(&mut self, text: &str) -> Result<(), MsgError> {
        let bytes = text.as_bytes();
        let space = self.get_space(bytes.len() + 1)?;
        space[..bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    pub fn write_coord(&mut self, value: f32) -> Result<(), MsgError> {
        self.write_short(coord_to_wire(value))
    }

    pub fn write_pos(&mut self, pos: Vec3) -> Result<(), MsgError> {
        self.write_coord(pos.x)?;
        self.write_coord(pos.y)?;
        self.write_coord(pos.z)
    }

    pub fn write_angle(&mut self, degrees: f32) -> Result<(), MsgError> {
        self.write_byte(angle_to_wire(degrees))
    }

    pub fn write_angle16(&mut self, degrees: f32) -> Result<(), MsgError> {
        self.write(&angle16_to_wire(degrees).to_le_bytes())
    }

    pub fn write_dir(&mut self, dir: Vec3) -> Result<(), MsgError> {
        self.write_byte(dir_to_index(dir))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_little_endian_layout() {
        let mut buf = MsgBuf::new(32);
        buf.write_short(0x1234).unwrap();
        buf.write_long(0x0A0B_0C0D).unwrap();
        buf.write_char(-1).unwrap();

        assert_eq!(buf.as_bytes(), &[0x34, 0x12, 0x0D, 0x0C, 0x0B, 0x0A, 0xFF]);
    }

    #[test]
    fn test_empty_string_writes_single_nul() {
        let mut buf = MsgBuf::new(8);
        buf.write_string("").unwrap();
        assert_eq!(buf.as_bytes(), &[0]);
    }

    #[test]
    fn test_coord_quantization() {
        assert_eq!(coord_to_wire(108.0), 864);
        assert_eq!(coord_to_wire(0.124), 0);
        assert_eq!(coord_to_wire(-0.125), -1);
        assert_eq!(coord_to_wire(-1.99), -15);
    }

    #[test]
    fn test_angle_quantization() {
        assert_eq!(angle_to_wire(0.0), 0);
        assert_eq!(angle_to_wire(90.0), 64);
        assert_eq!(angle_to_wire(-90.0), 192);
        assert_eq!(angle_to_wire(360.0), 0);
        assert_eq!(angle16_to_wire(180.0), 0x8000);
    }

    #[test]
    fn test_dir_picks_nearest_axis() {
        assert_eq!(dir_to_index(Vec3::X), 52);
        assert_eq!(dir_to_index(Vec3::Z), 5);
        assert_eq!(dir_to_index(Vec3::NEG_Y), 104);
        assert_eq!(dir_to_index(Vec3::ZERO), 0);
    }
}
