//! Scratch buffer with an offset/mark cursor
//!
//! Holds either one command's payload being parsed or one response being
//! built. Inserting before the end opens a hole by shifting the trailing
//! bytes, so a length field can be spliced in once the content is known.

use log::trace;

use super::IoError;
use crate::tlv::{parse_length, parse_tag, TLVEncoder};

/// Capacity of the scratch buffer
pub const IO_BUFFER_LENGTH: usize = 1512;

/// Reference point for [`IoCursor::set_offset`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Whence {
    Start,
    Mark,
    End,
}

#[derive(Debug, Clone)]
pub struct IoCursor {
    buf: Vec<u8>,
    offset: usize,
    mark: usize,
}

impl Default for IoCursor {
    fn default() -> Self {
        Self::new()
    }
}

impl IoCursor {
    pub fn new() -> Self {
        Self {
            buf: Vec::with_capacity(IO_BUFFER_LENGTH),
            offset: 0,
            mark: 0,
        }
    }

    /// Replace the content with a command payload and rewind.
    pub fn load(&mut self, data: &[u8]) -> Result<(), IoError> {
        if data.len() > IO_BUFFER_LENGTH {
            return Err(IoError::Overflow {
                wanted: data.len(),
                capacity: IO_BUFFER_LENGTH,
            });
        }
        self.discard(true);
        self.buf.extend_from_slice(data);
        Ok(())
    }

    /// Reset the cursor. With `clear`, the previous bytes are zeroed first.
    pub fn discard(&mut self, clear: bool) {
        if clear {
            self.buf.iter_mut().for_each(|b| *b = 0);
        }
        self.buf.clear();
        self.offset = 0;
        self.mark = 0;
    }

    /// Take the buffered content, leaving the cursor empty.
    pub fn take(&mut self) -> Vec<u8> {
        let out = std::mem::take(&mut self.buf);
        self.buf = Vec::with_capacity(IO_BUFFER_LENGTH);
        self.offset = 0;
        self.mark = 0;
        out
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Bytes between the cursor and the end
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.offset
    }

    pub fn mark(&mut self) {
        self.mark = self.offset;
    }

    pub fn set_offset(&mut self, whence: Whence) {
        self.offset = match whence {
            Whence::Start => 0,
            Whence::Mark => self.mark,
            Whence::End => self.buf.len(),
        };
    }

    // ---------------------------------------------------------------------
    // Insertion
    // ---------------------------------------------------------------------

    pub fn insert(&mut self, data: &[u8]) -> Result<(), IoError> {
        let wanted = self.buf.len() + data.len();
        if wanted > IO_BUFFER_LENGTH {
            return Err(IoError::Overflow {
                wanted,
                capacity: IO_BUFFER_LENGTH,
            });
        }
        self.buf.splice(self.offset..self.offset, data.iter().copied());
        self.offset += data.len();
        Ok(())
    }

    pub fn insert_u8(&mut self, value: u8) -> Result<(), IoError> {
        self.insert(&[value])
    }

    pub fn insert_u16(&mut self, value: u16) -> Result<(), IoError> {
        self.insert(&value.to_be_bytes())
    }

    pub fn insert_u24(&mut self, value: u32) -> Result<(), IoError> {
        self.insert(&value.to_be_bytes()[1..])
    }

    pub fn insert_u32(&mut self, value: u32) -> Result<(), IoError> {
        self.insert(&value.to_be_bytes())
    }

    /// Insert a tag and length header only.
    pub fn insert_tl(&mut self, tag: u16, len: usize) -> Result<(), IoError> {
        let mut header = TLVEncoder::encode_tag(tag);
        header.extend(TLVEncoder::encode_length(len));
        self.insert(&header)
    }

    pub fn insert_tlv(&mut self, tag: u16, value: &[u8]) -> Result<(), IoError> {
        self.insert_tl(tag, value.len())?;
        self.insert(value)
    }

    // ---------------------------------------------------------------------
    // Fetching
    // ---------------------------------------------------------------------

    pub fn fetch(&mut self, len: usize) -> Result<&[u8], IoError> {
        if len > self.remaining() {
            return Err(IoError::Underflow {
                wanted: len,
                available: self.remaining(),
            });
        }
        let start = self.offset;
        self.offset += len;
        Ok(&self.buf[start..start + len])
    }

    /// Everything from the cursor to the end.
    pub fn fetch_rest(&mut self) -> &[u8] {
        let start = self.offset;
        self.offset = self.buf.len();
        &self.buf[start..]
    }

    pub fn fetch_u8(&mut self) -> Result<u8, IoError> {
        Ok(self.fetch(1)?[0])
    }

    pub fn fetch_u16(&mut self) -> Result<u16, IoError> {
        let b = self.fetch(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    pub fn fetch_u24(&mut self) -> Result<u32, IoError> {
        let b = self.fetch(3)?;
        Ok(u32::from_be_bytes([0, b[0], b[1], b[2]]))
    }

    pub fn fetch_u32(&mut self) -> Result<u32, IoError> {
        let b = self.fetch(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn fetch_tag(&mut self) -> Result<u16, IoError> {
        let (tag, size) = parse_tag(&self.buf[self.offset..])?;
        self.offset += size;
        Ok(tag)
    }

    pub fn fetch_length(&mut self) -> Result<usize, IoError> {
        let (len, size) = parse_length(&self.buf[self.offset..])?;
        self.offset += size;
        Ok(len)
    }

    pub fn fetch_tl(&mut self) -> Result<(u16, usize), IoError> {
        let tag = self.fetch_tag()?;
        let len = self.fetch_length()?;
        trace!("fetched TL {:04X}/{}", tag, len);
        Ok((tag, len))
    }
}
