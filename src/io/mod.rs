//! Command/response buffering and the transport boundary
//!
//! [`IoCursor`] is the scratch buffer handlers parse from and build into.
//! [`Channel`] sits between the transport and the dispatcher: it reassembles
//! chained commands and splits long replies into GET RESPONSE chunks.

mod channel;
mod cursor;

pub use channel::{Channel, Inbound, MAX_OUT};
pub use cursor::{IoCursor, Whence, IO_BUFFER_LENGTH};

use thiserror::Error;

use crate::apdu::SW;
use crate::tlv::TLVError;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IoError {
    #[error("read of {wanted} bytes with {available} left")]
    Underflow { wanted: usize, available: usize },

    #[error("write of {wanted} bytes exceeds the {capacity} byte buffer")]
    Overflow { wanted: usize, capacity: usize },

    #[error(transparent)]
    Tlv(#[from] TLVError),

    #[error("transport failure: {0}")]
    Transport(String),
}

impl IoError {
    pub fn sw(&self) -> u16 {
        match self {
            IoError::Underflow { .. } => SW::WRONG_LENGTH,
            IoError::Overflow { .. } => SW::NOT_ENOUGH_MEMORY,
            IoError::Tlv(_) => SW::WRONG_DATA,
            IoError::Transport(_) => SW::INTERNAL_ERROR,
        }
    }
}

/// Byte-exchange link to the host.
///
/// Each call hands over the reply to the previous command (empty on the
/// first call) and returns the next raw command, or `None` once the host
/// has gone away.
pub trait Transport {
    fn exchange(&mut self, reply: &[u8]) -> Result<Option<Vec<u8>>, IoError>;
}
