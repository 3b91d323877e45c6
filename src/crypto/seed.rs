//! Deterministic seed derivation
//!
//! A slot seed is the private key of a BIP32 secp256k1 node below the
//! master seed. Key seeds are stretched from it by
//! [`CryptoProvider::key_seed`](super::CryptoProvider::key_seed).

use k256::elliptic_curve::sec1::ToEncodedPoint;
use k256::elliptic_curve::PrimeField;
use k256::{FieldBytes, Scalar, SecretKey};

use super::hash::HashOperations;
use super::CryptoError;

/// Indices at or above this value are hardened
pub const HARDENED: u32 = 0x8000_0000;

/// First path element of every card seed ("GP" "GP", hardened)
pub const SEED_PURPOSE: u32 = 0x8047_5047;

/// Path element used for the GET CHALLENGE seed
pub const CHALLENGE_INDEX: u32 = 0x0F0F_0F0F;

const BIP32_KEY: &[u8] = b"Bitcoin seed";

fn scalar_from(bytes: &[u8]) -> Option<Scalar> {
    Option::from(Scalar::from_repr(FieldBytes::clone_from_slice(bytes)))
}

/// Derive the private key at `path` below `master`.
pub fn bip32_derive(master: &[u8], path: &[u32]) -> Result<[u8; 32], CryptoError> {
    let node = HashOperations::hmac_sha512(BIP32_KEY, &[master])?;
    let mut key = [0u8; 32];
    let mut chain = [0u8; 32];
    key.copy_from_slice(&node[..32]);
    chain.copy_from_slice(&node[32..]);

    for &index in path {
        let parent = SecretKey::from_slice(&key)
            .map_err(|_| CryptoError::InvalidKey("invalid BIP32 node".to_string()))?;
        let index_bytes = index.to_be_bytes();
        let node = if index >= HARDENED {
            HashOperations::hmac_sha512(&chain, &[&[0u8][..], &key[..], &index_bytes[..]])?
        } else {
            let point = parent.public_key().to_encoded_point(true);
            HashOperations::hmac_sha512(&chain, &[point.as_bytes(), &index_bytes[..]])?
        };

        let tweak = scalar_from(&node[..32])
            .ok_or_else(|| CryptoError::Failed("BIP32 tweak out of range".to_string()))?;
        let child = tweak + *parent.to_nonzero_scalar();
        if child == Scalar::ZERO {
            return Err(CryptoError::Failed("BIP32 child is zero".to_string()));
        }
        key.copy_from_slice(&child.to_bytes());
        chain.copy_from_slice(&node[32..]);
    }
    Ok(key)
}
