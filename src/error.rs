//! Card-level error type
//!
//! Every layer has its own `thiserror` enum; handlers return [`CardError`],
//! which folds them together and maps each onto the status word sent back
//! to the host.

use thiserror::Error;

use crate::apdu::SW;
use crate::card::StorageError;
use crate::crypto::CryptoError;
use crate::io::IoError;
use crate::tlv::TLVError;

#[derive(Debug, Error)]
pub enum CardError {
    /// Protocol outcome carried as-is to the host
    #[error("status word {0:04X}")]
    Status(u16),

    #[error("crypto provider: {0}")]
    Crypto(#[from] CryptoError),

    #[error("storage: {0}")]
    Storage(#[from] StorageError),

    #[error("malformed TLV: {0}")]
    Tlv(#[from] TLVError),

    #[error("io buffer: {0}")]
    Io(#[from] IoError),
}

pub type CardResult<T> = Result<T, CardError>;

impl CardError {
    /// Status word reported to the host
    pub fn sw(&self) -> u16 {
        match self {
            CardError::Status(sw) => *sw,
            CardError::Crypto(err) => err.sw(),
            CardError::Storage(_) => SW::MEMORY_FAILURE,
            CardError::Tlv(_) => SW::WRONG_DATA,
            CardError::Io(err) => err.sw(),
        }
    }
}

/// Shorthand for returning a bare status word from a handler.
pub fn fail<T>(sw: u16) -> CardResult<T> {
    Err(CardError::Status(sw))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_passthrough() {
        assert_eq!(CardError::Status(SW::RECORD_NOT_FOUND).sw(), 0x6A83);
        assert_eq!(fail::<()>(SW::WRONG_P1_P2).unwrap_err().sw(), 0x6B00);
    }

    #[test]
    fn test_layer_mapping() {
        assert_eq!(CardError::from(TLVError::LengthTooLong(3)).sw(), SW::WRONG_DATA);
        assert_eq!(
            CardError::from(IoError::Underflow { wanted: 2, available: 1 }).sw(),
            SW::WRONG_LENGTH
        );
        assert_eq!(
            CardError::from(CryptoError::Unsupported("brainpoolP256r1".into())).sw(),
            SW::REFERENCED_DATA_NOT_FOUND
        );
        assert_eq!(CardError::from(CryptoError::Failed("rng".into())).sw(), SW::INTERNAL_ERROR);
    }
}
