use crate::error::MsgError;

/// A capped byte buffer with a write cursor (`cur_size`) and a read cursor.
///
/// Writes past `max_size` are fatal unless overflow is allowed, in which case
/// the pending content is discarded and [`MsgBuf::is_overflowed`] reports it
/// until [`MsgBuf::clear`] is called.
#[derive(Debug, Clone)]
pub struct MsgBuf {
    pub(super) data: Vec<u8>,
    pub(super) max_size: usize,
    pub(super) read_count: usize,
    pub(super) truncated: bool,
    overflowed: bool,
    allow_overflow: bool,
}

impl MsgBuf {
    pub fn new(max_size: usize) -> Self {
        Self {
            data: Vec::with_capacity(max_size),
            max_size,
            read_count: 0,
            truncated: false,
            overflowed: false,
            allow_overflow: false,
        }
    }

    pub fn with_overflow(max_size: usize) -> Self {
        let mut buf = Self::new(max_size);
        buf.allow_overflow = true;
        buf
    }

    /// Wraps a received datagram for reading.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let mut buf = Self::new(bytes.len());
        buf.data.extend_from_slice(bytes);
        buf
    }

    pub fn set_allow_overflow(&mut self, allow: bool) {
        self.allow_overflow = allow;
    }

    pub fn allow_overflow(&self) -> bool {
        self.allow_overflow
    }

    pub fn is_overflowed(&self) -> bool {
        self.overflowed
    }

    pub fn cur_size(&self) -> usize {
        self.data.len()
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn remaining(&self) -> usize {
        self.max_size - self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn clear(&mut self) {
        self.data.clear();
        self.read_count = 0;
        self.truncated = false;
        self.overflowed = false;
    }

    /// Reserves `length` bytes at the write cursor and returns them zeroed.
    pub fn get_space(&mut self, length: usize) -> Result<&mut [u8], MsgError> {
        if length > self.max_size {
            return Err(MsgError::TooLarge {
                length,
                max_size: self.max_size,
            });
        }

        if self.data.len() + length > self.max_size {
            if !self.allow_overflow {
                return Err(MsgError::Overflow {
                    requested: length,
                    available: self.remaining(),
                });
            }

            log::warn!(
                "message overflow: {} + {} > {}, discarding pending data",
                self.data.len(),
                length,
                self.max_size
            );
            self.data.clear();
            self.overflowed = true;
        }

        let start = self.data.len();
        self.data.resize(start + length, 0);
        Ok(&mut self.data[start..])
    }

    pub fn write(&mut self, bytes: &[u8]) -> Result<(), MsgError> {
        self.get_space(bytes.len())?.copy_from_slice(bytes);
        Ok(())
    }

    /// Appends NUL-terminated text, merging with a trailing NUL already in
    /// the buffer so consecutive prints read back as one string.
    pub fn print(&mut self, text: &str) -> Result<(), MsgError> {
        let merged = self.data.last() == Some(&0);
        if merged {
            self.data.pop();
        }

        let bytes = text.as_bytes();
        match self.get_space(bytes.len() + 1) {
            Ok(space) => {
                space[..bytes.len()].copy_from_slice(bytes);
                Ok(())
            }
            Err(err) => {
                if merged {
                    self.data.push(0);
                }
                Err(err)
            }
        }
    }
}
