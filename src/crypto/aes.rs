//! AES-CBC Operations
//!
//! Slot-local symmetric keys (16 or 32 bytes) with a zero IV. Card
//! operations run unpadded on block-aligned data; the key export envelope
//! uses ISO 7816-4 padding.

use aes::cipher::block_padding::{Iso7816, NoPadding};
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyInit, KeyIvInit};
use aes::{Aes128, Aes256};

use super::CryptoError;

type Aes128CbcEnc = cbc::Encryptor<Aes128>;
type Aes128CbcDec = cbc::Decryptor<Aes128>;
type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

pub const BLOCK_SIZE: usize = 16;

const ZERO_IV: [u8; BLOCK_SIZE] = [0u8; BLOCK_SIZE];

/// Block padding applied around CBC
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Padding {
    None,
    Iso7816,
}

/// AES-CBC Operations
pub struct AesOperations;

impl AesOperations {
    /// Run the key schedule once to validate a key
    pub fn check_key(key: &[u8]) -> Result<(), CryptoError> {
        let valid = match key.len() {
            16 => Aes128::new_from_slice(key).is_ok(),
            32 => Aes256::new_from_slice(key).is_ok(),
            _ => false,
        };
        if valid {
            Ok(())
        } else {
            Err(CryptoError::InvalidKey(format!("AES key of {} bytes", key.len())))
        }
    }

    pub fn encrypt(key: &[u8], data: &[u8], padding: Padding) -> Result<Vec<u8>, CryptoError> {
        if padding == Padding::None && data.len() % BLOCK_SIZE != 0 {
            return Err(unaligned(data.len()));
        }
        let bad_key = |_| CryptoError::InvalidKey(format!("AES key of {} bytes", key.len()));
        let out = match key.len() {
            16 => {
                let enc = Aes128CbcEnc::new_from_slices(key, &ZERO_IV).map_err(bad_key)?;
                match padding {
                    Padding::None => enc.encrypt_padded_vec_mut::<NoPadding>(data),
                    Padding::Iso7816 => enc.encrypt_padded_vec_mut::<Iso7816>(data),
                }
            }
            32 => {
                let enc = Aes256CbcEnc::new_from_slices(key, &ZERO_IV).map_err(bad_key)?;
                match padding {
                    Padding::None => enc.encrypt_padded_vec_mut::<NoPadding>(data),
                    Padding::Iso7816 => enc.encrypt_padded_vec_mut::<Iso7816>(data),
                }
            }
            _ => return Err(CryptoError::InvalidKey(format!("AES key of {} bytes", key.len()))),
        };
        Ok(out)
    }

    pub fn decrypt(key: &[u8], data: &[u8], padding: Padding) -> Result<Vec<u8>, CryptoError> {
        if data.len() % BLOCK_SIZE != 0 {
            return Err(unaligned(data.len()));
        }
        let bad_key = |_| CryptoError::InvalidKey(format!("AES key of {} bytes", key.len()));
        let out = match key.len() {
            16 => {
                let dec = Aes128CbcDec::new_from_slices(key, &ZERO_IV).map_err(bad_key)?;
                match padding {
                    Padding::None => dec.decrypt_padded_vec_mut::<NoPadding>(data),
                    Padding::Iso7816 => dec.decrypt_padded_vec_mut::<Iso7816>(data),
                }
            }
            32 => {
                let dec = Aes256CbcDec::new_from_slices(key, &ZERO_IV).map_err(bad_key)?;
                match padding {
                    Padding::None => dec.decrypt_padded_vec_mut::<NoPadding>(data),
                    Padding::Iso7816 => dec.decrypt_padded_vec_mut::<Iso7816>(data),
                }
            }
            _ => return Err(CryptoError::InvalidKey(format!("AES key of {} bytes", key.len()))),
        };
        out.map_err(|_| CryptoError::InvalidInput("bad padding".to_string()))
    }
}

fn unaligned(len: usize) -> CryptoError {
    CryptoError::InvalidLength(format!("{} bytes is not a multiple of {}", len, BLOCK_SIZE))
}
