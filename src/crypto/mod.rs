//! Cryptographic Operations
//!
//! The card engine never calls a primitive directly: everything goes
//! through [`CryptoProvider`]. [`SoftwareProvider`] implements it with the
//! RustCrypto and dalek crates.

pub mod aes;
pub mod curve;
pub mod ecc;
pub mod hash;
pub mod rsa;
pub mod seed;
mod software;

pub use self::aes::{AesOperations, Padding};
pub use self::curve::{algorithm_id, normalize_curve_encoding, Curve, Direction, KeyAlgorithm};
pub use self::ecc::EccOperations;
pub use self::hash::HashOperations;
pub use self::rsa::RsaOperations;
pub use self::software::SoftwareProvider;

use thiserror::Error;

use crate::apdu::SW;
use crate::card::{EccKey, RsaKey};

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid length: {0}")]
    InvalidLength(String),

    #[error("operation failed: {0}")]
    Failed(String),

    #[error("random generator failure: {0}")]
    Rng(String),
}

impl CryptoError {
    pub fn sw(&self) -> u16 {
        match self {
            CryptoError::Unsupported(_) => SW::REFERENCED_DATA_NOT_FOUND,
            CryptoError::InvalidKey(_) | CryptoError::InvalidInput(_) => SW::WRONG_DATA,
            CryptoError::InvalidLength(_) => SW::WRONG_LENGTH,
            CryptoError::Failed(_) | CryptoError::Rng(_) => SW::INTERNAL_ERROR,
        }
    }
}

/// Cryptographic collaborator of the card engine.
///
/// Scalars and points cross this boundary in card order (big-endian, see
/// [`normalize_curve_encoding`]). RSA material travels as [`RsaKey`].
pub trait CryptoProvider {
    fn random_bytes(&self, len: usize) -> Result<Vec<u8>, CryptoError>;

    /// 32-byte private key of the BIP32 node at `path` below the master seed
    fn derive_seed(&self, path: &[u32]) -> Result<[u8; 32], CryptoError>;

    fn sha256(&self, data: &[u8]) -> [u8; 32];
    fn shake256(&self, data: &[u8], len: usize) -> Vec<u8>;

    fn rsa_generate(&self, bits: usize, exponent: u32) -> Result<RsaKey, CryptoError>;
    fn rsa_from_primes(&self, p: &[u8], q: &[u8], exponent: &[u8]) -> Result<RsaKey, CryptoError>;
    fn rsa_next_prime(&self, candidate: &[u8]) -> Vec<u8>;
    /// `input^d mod n` on a block the caller already padded
    fn rsa_private(&self, key: &RsaKey, input: &[u8]) -> Result<Vec<u8>, CryptoError>;
    fn rsa_decrypt(&self, key: &RsaKey, ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError>;

    fn ec_generate(&self, curve: Curve) -> Result<EccKey, CryptoError>;
    fn ec_from_scalar(&self, curve: Curve, scalar: &[u8]) -> Result<EccKey, CryptoError>;
    /// DER encoded ECDSA signature of a digest
    fn ecdsa_sign(&self, key: &EccKey, digest: &[u8]) -> Result<Vec<u8>, CryptoError>;
    fn eddsa_sign(&self, key: &EccKey, message: &[u8]) -> Result<Vec<u8>, CryptoError>;
    fn ecdh(&self, key: &EccKey, peer: &[u8]) -> Result<Vec<u8>, CryptoError>;

    fn aes_check_key(&self, key: &[u8]) -> Result<(), CryptoError>;
    fn aes_encrypt(&self, key: &[u8], data: &[u8], padding: Padding) -> Result<Vec<u8>, CryptoError>;
    fn aes_decrypt(&self, key: &[u8], data: &[u8], padding: Padding) -> Result<Vec<u8>, CryptoError>;

    /// Seed of key slot `slot` (0-based)
    fn slot_seed(&self, slot: usize) -> Result<[u8; 32], CryptoError> {
        self.derive_seed(&[seed::SEED_PURPOSE, slot as u32 + 1])
    }

    /// `SHAKE256(SHA256(seed ‖ name ‖ index))` squeezed to `len` bytes
    fn key_seed(&self, seed: &[u8], name: &[u8; 4], index: u16, len: usize) -> Vec<u8> {
        let mut input = Vec::with_capacity(seed.len() + 6);
        input.extend_from_slice(seed);
        input.extend_from_slice(name);
        input.extend_from_slice(&index.to_be_bytes());
        let digest = self.sha256(&input);
        self.shake256(&digest, len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_words() {
        assert_eq!(CryptoError::Unsupported("x".into()).sw(), 0x6A88);
        assert_eq!(CryptoError::InvalidKey("x".into()).sw(), 0x6A80);
        assert_eq!(CryptoError::InvalidLength("x".into()).sw(), 0x6700);
        assert_eq!(CryptoError::Rng("x".into()).sw(), 0x6F42);
    }

    #[test]
    fn test_key_seed_is_stable_and_named() {
        let provider = SoftwareProvider::new(vec![0x42; 32]);
        let seed = [1u8; 32];
        let a = provider.key_seed(&seed, b"sig ", 1, 32);
        assert_eq!(a, provider.key_seed(&seed, b"sig ", 1, 32));
        assert_ne!(a, provider.key_seed(&seed, b"dec ", 1, 32));
        assert_ne!(a, provider.key_seed(&seed, b"sig ", 2, 32));
        assert_eq!(&provider.key_seed(&seed, b"sig ", 1, 64)[..32], &a[..]);
    }

    #[test]
    fn test_slot_seed_follows_master() {
        let a = SoftwareProvider::new(vec![0x42; 32]);
        let b = SoftwareProvider::new(vec![0x43; 32]);
        assert_eq!(a.slot_seed(0).unwrap(), a.slot_seed(0).unwrap());
        assert_ne!(a.slot_seed(0).unwrap(), a.slot_seed(1).unwrap());
        assert_ne!(a.slot_seed(0).unwrap(), b.slot_seed(0).unwrap());
    }
}
