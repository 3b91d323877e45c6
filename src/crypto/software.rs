//! Software cryptographic provider
//!
//! [`CryptoProvider`] over the operating system RNG and the RustCrypto /
//! dalek crates. Holds the master seed deterministic derivations hang off.

use rand::rngs::OsRng;
use rand::RngCore;

use super::aes::{AesOperations, Padding};
use super::curve::Curve;
use super::ecc::EccOperations;
use super::hash::HashOperations;
use super::rsa::RsaOperations;
use super::seed::bip32_derive;
use super::{CryptoError, CryptoProvider};
use crate::card::{EccKey, RsaKey};

pub struct SoftwareProvider {
    master_seed: Vec<u8>,
}

impl SoftwareProvider {
    pub fn new(master_seed: Vec<u8>) -> Self {
        Self { master_seed }
    }

    /// Provider with a fresh random master seed, for ephemeral cards
    pub fn ephemeral() -> Result<Self, CryptoError> {
        let mut seed = vec![0u8; 32];
        OsRng
            .try_fill_bytes(&mut seed)
            .map_err(|e| CryptoError::Rng(e.to_string()))?;
        Ok(Self::new(seed))
    }
}

impl std::fmt::Debug for SoftwareProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SoftwareProvider").finish_non_exhaustive()
    }
}

impl CryptoProvider for SoftwareProvider {
    fn random_bytes(&self, len: usize) -> Result<Vec<u8>, CryptoError> {
        let mut out = vec![0u8; len];
        OsRng
            .try_fill_bytes(&mut out)
            .map_err(|e| CryptoError::Rng(e.to_string()))?;
        Ok(out)
    }

    fn derive_seed(&self, path: &[u32]) -> Result<[u8; 32], CryptoError> {
        if self.master_seed.is_empty() {
            return Err(CryptoError::Unsupported("no master seed".to_string()));
        }
        bip32_derive(&self.master_seed, path)
    }

    fn sha256(&self, data: &[u8]) -> [u8; 32] {
        HashOperations::sha256(data)
    }

    fn shake256(&self, data: &[u8], len: usize) -> Vec<u8> {
        HashOperations::shake256(data, len)
    }

    fn rsa_generate(&self, bits: usize, exponent: u32) -> Result<RsaKey, CryptoError> {
        RsaOperations::generate(bits, exponent)
    }

    fn rsa_from_primes(&self, p: &[u8], q: &[u8], exponent: &[u8]) -> Result<RsaKey, CryptoError> {
        RsaOperations::from_primes(p, q, exponent)
    }

    fn rsa_next_prime(&self, candidate: &[u8]) -> Vec<u8> {
        RsaOperations::next_prime(candidate)
    }

    fn rsa_private(&self, key: &RsaKey, input: &[u8]) -> Result<Vec<u8>, CryptoError> {
        RsaOperations::raw_private(key, input)
    }

    fn rsa_decrypt(&self, key: &RsaKey, ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        RsaOperations::decrypt_pkcs1(key, ciphertext)
    }

    fn ec_generate(&self, curve: Curve) -> Result<EccKey, CryptoError> {
        EccOperations::generate(curve)
    }

    fn ec_from_scalar(&self, curve: Curve, scalar: &[u8]) -> Result<EccKey, CryptoError> {
        EccOperations::from_scalar(curve, scalar)
    }

    fn ecdsa_sign(&self, key: &EccKey, digest: &[u8]) -> Result<Vec<u8>, CryptoError> {
        EccOperations::ecdsa_sign(key, digest)
    }

    fn eddsa_sign(&self, key: &EccKey, message: &[u8]) -> Result<Vec<u8>, CryptoError> {
        EccOperations::eddsa_sign(key, message)
    }

    fn ecdh(&self, key: &EccKey, peer: &[u8]) -> Result<Vec<u8>, CryptoError> {
        EccOperations::ecdh(key, peer)
    }

    fn aes_check_key(&self, key: &[u8]) -> Result<(), CryptoError> {
        AesOperations::check_key(key)
    }

    fn aes_encrypt(&self, key: &[u8], data: &[u8], padding: Padding) -> Result<Vec<u8>, CryptoError> {
        AesOperations::encrypt(key, data, padding)
    }

    fn aes_decrypt(&self, key: &[u8], data: &[u8], padding: Padding) -> Result<Vec<u8>, CryptoError> {
        AesOperations::decrypt(key, data, padding)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_bytes() {
        let provider = SoftwareProvider::ephemeral().unwrap();
        let a = provider.random_bytes(16).unwrap();
        let b = provider.random_bytes(16).unwrap();
        assert_eq!(a.len(), 16);
        assert_ne!(a, b);
    }

    #[test]
    fn test_no_master_seed() {
        let provider = SoftwareProvider::new(Vec::new());
        assert!(matches!(
            provider.derive_seed(&[1]),
            Err(CryptoError::Unsupported(_))
        ));
    }
}
