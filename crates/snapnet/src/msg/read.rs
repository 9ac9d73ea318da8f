use glam::Vec3;

use super::anorms::{BYTE_DIRS, NUM_VERTEX_NORMALS};
use super::buffer::MsgBuf;
use crate::error::MsgError;
use crate::protocol::MAX_STRING_CHARS;

impl MsgBuf {
    pub fn begin_reading(&mut self) {
        self.read_count = 0;
        self.truncated = false;
    }

    pub fn read_count(&self) -> usize {
        self.read_count
    }

    /// Bytes left between the read cursor and the write cursor.
    pub fn unread(&self) -> &[u8] {
        &self.data[self.read_count.min(self.data.len())..]
    }

    /// True once any read has run past the end of the data.
    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N], MsgError> {
        let available = self.data.len().saturating_sub(self.read_count);
        if N > available {
            self.read_count = self.data.len();
            self.truncated = true;
            return Err(MsgError::UnexpectedEnd {
                requested: N,
                available,
            });
        }

        let mut out = [0u8; N];
        out.copy_from_slice(&self.data[self.read_count..self.read_count + N]);
        self.read_count += N;
        Ok(out)
    }

    pub fn read_char(&mut self) -> Result<i8, MsgError> {
        self.take::<1>().map(i8::from_le_bytes)
    }

    pub fn read_byte(&mut self) -> Result<u8, MsgError> {
        self.take::<1>().map(|[b]| b)
    }

    pub fn read_short(&mut self) -> Result<i16, MsgError> {
        self.take::<2>().map(i16::from_le_bytes)
    }

    pub fn read_long(&mut self) -> Result<i32, MsgError> {
        self.take::<4>().map(i32::from_le_bytes)
    }

    pub fn read_float(&mut self) -> Result<f32, MsgError> {
        self.take::<4>().map(f32::from_le_bytes)
    }

    pub fn read_coord(&mut self) -> Result<f32, MsgError> {
        Ok(f32::from(self.read_short()?) * (1.0 / 8.0))
    }

    pub fn read_pos(&mut self) -> Result<Vec3, MsgError> {
        Ok(Vec3::new(
            self.read_coord()?,
            self.read_coord()?,
            self.read_coord()?,
        ))
    }

    /// Angles come back in the signed range, -180 up to 180 degrees.
    pub fn read_angle(&mut self) -> Result<f32, MsgError> {
        Ok(f32::from(self.read_char()?) * (360.0 / 256.0))
    }

    pub fn read_angle16(&mut self) -> Result<f32, MsgError> {
        Ok(f32::from(self.read_short()?) * (360.0 / 65536.0))
    }

    pub fn read_dir(&mut self) -> Result<Vec3, MsgError> {
        let index = self.read_byte()?;
        if usize::from(index) >= NUM_VERTEX_NORMALS {
            return Err(MsgError::InvalidDirection(index));
        }
        Ok(BYTE_DIRS[usize::from(index)])
    }

    pub fn read_data(&mut self, len: usize) -> Result<Vec<u8>, MsgError> {
        let available = self.data.len().saturating_sub(self.read_count);
        if len > available {
            self.read_count = self.data.len();
            self.truncated = true;
            return Err(MsgError::UnexpectedEnd {
                requested: len,
                available,
            });
        }

        let start = self.read_count;
        self.read_count += len;
        Ok(self.data[start..start + len].to_vec())
    }

    /// Reads up to the next NUL or the end of data. At most
    /// `MAX_STRING_CHARS - 1` bytes are consumed, and the returned string is
    /// no longer than that either, even after invalid UTF-8 is replaced.
    pub fn read_string(&mut self) -> String {
        self.read_terminated(|b| b == 0)
    }

    /// Like [`MsgBuf::read_string`] but also stops at a newline.
    pub fn read_string_line(&mut self) -> String {
        self.read_terminated(|b| b == 0 || b == b'\n')
    }

    fn read_terminated(&mut self, is_end: impl Fn(u8) -> bool) -> String {
        let mut bytes = Vec::new();
        while let Ok(b) = self.read_byte() {
            if is_end(b) {
                break;
            }
            bytes.push(b);
            if bytes.len() >= MAX_STRING_CHARS - 1 {
                break;
            }
        }

        let mut text = String::from_utf8_lossy(&bytes).into_owned();
        let mut limit = MAX_STRING_CHARS - 1;
        if text.len() > limit {
            while !text.is_char_boundary(limit) {
                limit -= 1;
            }
            text.truncate(limit);
        }
        text
    }

    /// View with sentinel reads for old callers: `-1` / `-1.0`
    /// once the data runs out, indistinguishable from a real `-1`.
    pub fn legacy(&mut self) -> Legacy<'_> {
        Legacy { msg: self }
    }
}

pub struct Legacy<'a> {
    msg: &'a mut MsgBuf,
}

impl Legacy<'_> {
    pub fn read_char(&mut self) -> i32 {
        self.msg.read_char().map_or(-1, i32::from)
    }

    pub fn read_byte(&mut self) -> i32 {
        self.msg.read_byte().map_or(-1, i32::from)
    }

    pub fn read_short(&mut self) -> i32 {
        self.msg.read_short().map_or(-1, i32::from)
    }

    pub fn read_long(&mut self) -> i32 {
        self.msg.read_long().unwrap_or(-1)
    }

    pub fn read_float(&mut self) -> f32 {
        self.msg.read_float().unwrap_or(-1.0)
    }
}
