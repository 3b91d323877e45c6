//! Elliptic curve operations
//!
//! ECDSA and ECDH on the Weierstrass curves (P-256, P-384, secp256k1),
//! EdDSA on Ed25519 and X25519 key agreement. Every scalar and point that
//! enters or leaves this module is in card order; Curve25519 values are
//! converted to the little-endian form x25519-dalek expects at the edge.
//!
//! ECDSA signatures are returned DER encoded.

use ed25519_dalek::Signer;
use log::debug;
use rand::rngs::OsRng;

use super::curve::{normalize_curve_encoding, Curve, Direction};
use super::CryptoError;
use crate::card::EccKey;

macro_rules! weierstrass {
    ($name:ident, $krate:ident) => {
        mod $name {
            use ::$krate::ecdsa::signature::hazmat::PrehashSigner;
            use ::$krate::ecdsa::{Signature, SigningKey};
            use ::$krate::elliptic_curve::sec1::ToEncodedPoint;
            use ::$krate::{PublicKey, SecretKey};
            use rand::rngs::OsRng;

            use super::CryptoError;

            fn secret(scalar: &[u8]) -> Result<SecretKey, CryptoError> {
                SecretKey::from_slice(scalar).map_err(|e| CryptoError::InvalidKey(e.to_string()))
            }

            fn encode_public(secret: &SecretKey) -> Vec<u8> {
                secret.public_key().to_encoded_point(false).as_bytes().to_vec()
            }

            pub fn generate() -> (Vec<u8>, Vec<u8>) {
                let secret = SecretKey::random(&mut OsRng);
                (secret.to_bytes().to_vec(), encode_public(&secret))
            }

            pub fn public_key(scalar: &[u8]) -> Result<Vec<u8>, CryptoError> {
                Ok(encode_public(&secret(scalar)?))
            }

            pub fn sign_prehash(scalar: &[u8], digest: &[u8]) -> Result<Vec<u8>, CryptoError> {
                let key = SigningKey::from(&secret(scalar)?);
                let signature: Signature = key
                    .sign_prehash(digest)
                    .map_err(|e| CryptoError::InvalidInput(e.to_string()))?;
                Ok(signature.to_der().as_bytes().to_vec())
            }

            pub fn ecdh(scalar: &[u8], peer: &[u8]) -> Result<Vec<u8>, CryptoError> {
                let secret = secret(scalar)?;
                let peer = PublicKey::from_sec1_bytes(peer)
                    .map_err(|e| CryptoError::InvalidInput(e.to_string()))?;
                let shared =
                    ::$krate::ecdh::diffie_hellman(secret.to_nonzero_scalar(), peer.as_affine());
                Ok(shared.raw_secret_bytes().to_vec())
            }
        }
    };
}

weierstrass!(nist_p256, p256);
weierstrass!(nist_p384, p384);
weierstrass!(secp256k1, k256);

fn unsupported(curve: Curve, what: &str) -> CryptoError {
    CryptoError::Unsupported(format!("{} on {:?}", what, curve))
}

fn to_array(bytes: &[u8]) -> Result<[u8; 32], CryptoError> {
    bytes.try_into().map_err(|_| {
        CryptoError::InvalidKey(format!("expected 32 bytes, got {}", bytes.len()))
    })
}

/// Elliptic curve operations
pub struct EccOperations;

impl EccOperations {
    /// Generate a fresh key on `curve`
    pub fn generate(curve: Curve) -> Result<EccKey, CryptoError> {
        debug!("Generating {:?} keypair", curve);
        let (private, public) = match curve {
            Curve::NistP256 => nist_p256::generate(),
            Curve::NistP384 => nist_p384::generate(),
            Curve::Secp256k1 => secp256k1::generate(),
            Curve::Ed25519 => {
                let key = ed25519_dalek::SigningKey::generate(&mut OsRng);
                (key.to_bytes().to_vec(), key.verifying_key().to_bytes().to_vec())
            }
            Curve::Curve25519 => {
                let secret = x25519_dalek::StaticSecret::random_from_rng(OsRng);
                let public = x25519_dalek::PublicKey::from(&secret);
                (
                    normalize_curve_encoding(curve, &secret.to_bytes(), Direction::Inbound),
                    normalize_curve_encoding(curve, public.as_bytes(), Direction::Inbound),
                )
            }
            Curve::BrainpoolP256r1 | Curve::BrainpoolP256t1 => {
                return Err(unsupported(curve, "key generation"))
            }
        };
        Ok(EccKey { curve, private, public })
    }

    /// Complete a key from its private scalar (Ed25519: the 32-byte seed)
    pub fn from_scalar(curve: Curve, scalar: &[u8]) -> Result<EccKey, CryptoError> {
        if scalar.len() != curve.domain_len() {
            return Err(CryptoError::InvalidKey(format!(
                "{:?} scalar must be {} bytes, got {}",
                curve,
                curve.domain_len(),
                scalar.len()
            )));
        }
        let public = match curve {
            Curve::NistP256 => nist_p256::public_key(scalar)?,
            Curve::NistP384 => nist_p384::public_key(scalar)?,
            Curve::Secp256k1 => secp256k1::public_key(scalar)?,
            Curve::Ed25519 => {
                let key = ed25519_dalek::SigningKey::from_bytes(&to_array(scalar)?);
                key.verifying_key().to_bytes().to_vec()
            }
            Curve::Curve25519 => {
                let native = normalize_curve_encoding(curve, scalar, Direction::Outbound);
                let secret = x25519_dalek::StaticSecret::from(to_array(&native)?);
                let public = x25519_dalek::PublicKey::from(&secret);
                normalize_curve_encoding(curve, public.as_bytes(), Direction::Inbound)
            }
            Curve::BrainpoolP256r1 | Curve::BrainpoolP256t1 => {
                return Err(unsupported(curve, "scalar import"))
            }
        };
        Ok(EccKey {
            curve,
            private: scalar.to_vec(),
            public,
        })
    }

    /// ECDSA over an already hashed message, DER encoded
    pub fn ecdsa_sign(key: &EccKey, digest: &[u8]) -> Result<Vec<u8>, CryptoError> {
        match key.curve {
            Curve::NistP256 => nist_p256::sign_prehash(&key.private, digest),
            Curve::NistP384 => nist_p384::sign_prehash(&key.private, digest),
            Curve::Secp256k1 => secp256k1::sign_prehash(&key.private, digest),
            curve => Err(unsupported(curve, "ECDSA")),
        }
    }

    /// Ed25519 signature (64 bytes) over the message itself
    pub fn eddsa_sign(key: &EccKey, message: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if key.curve != Curve::Ed25519 {
            return Err(unsupported(key.curve, "EdDSA"));
        }
        let signing = ed25519_dalek::SigningKey::from_bytes(&to_array(&key.private)?);
        Ok(signing.sign(message).to_bytes().to_vec())
    }

    /// Shared secret X coordinate with a peer point, both in card order
    pub fn ecdh(key: &EccKey, peer: &[u8]) -> Result<Vec<u8>, CryptoError> {
        match key.curve {
            Curve::NistP256 => nist_p256::ecdh(&key.private, peer),
            Curve::NistP384 => nist_p384::ecdh(&key.private, peer),
            Curve::Secp256k1 => secp256k1::ecdh(&key.private, peer),
            Curve::Curve25519 => {
                let curve = key.curve;
                let native = normalize_curve_encoding(curve, &key.private, Direction::Outbound);
                let secret = x25519_dalek::StaticSecret::from(to_array(&native)?);
                let peer = normalize_curve_encoding(curve, peer, Direction::Outbound);
                let peer = x25519_dalek::PublicKey::from(to_array(&peer)?);
                let shared = secret.diffie_hellman(&peer);
                Ok(normalize_curve_encoding(curve, shared.as_bytes(), Direction::Inbound))
            }
            curve => Err(unsupported(curve, "ECDH")),
        }
    }
}
