//! Hash Operations
//!
//! SHA-256 for PIN records and seed derivation, SHAKE256 as the extendable
//! output stretch, HMAC-SHA512 for BIP32 nodes.

use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256, Sha512};
use sha3::digest::{ExtendableOutput, Update, XofReader};
use sha3::Shake256;

use super::CryptoError;

type HmacSha512 = Hmac<Sha512>;

/// Hash Operations
pub struct HashOperations;

impl HashOperations {
    pub fn sha256(data: &[u8]) -> [u8; 32] {
        let mut hasher = Sha256::new();
        Digest::update(&mut hasher, data);
        hasher.finalize().into()
    }

    /// SHAKE256 squeezed to `len` bytes
    pub fn shake256(data: &[u8], len: usize) -> Vec<u8> {
        let mut hasher = Shake256::default();
        hasher.update(data);
        let mut reader = hasher.finalize_xof();
        let mut out = vec![0u8; len];
        reader.read(&mut out);
        out
    }

    pub fn hmac_sha512(key: &[u8], data: &[&[u8]]) -> Result<[u8; 64], CryptoError> {
        let mut mac = <HmacSha512 as Mac>::new_from_slice(key)
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        for part in data {
            Mac::update(&mut mac, part);
        }
        let mut out = [0u8; 64];
        out.copy_from_slice(&mac.finalize().into_bytes());
        Ok(out)
    }
}
