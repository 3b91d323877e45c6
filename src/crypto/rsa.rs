//! RSA Operations
//!
//! Key generation (random or from supplied primes), raw private operation
//! for signatures, PKCS#1 v1.5 decryption and prime search, using the rsa
//! crate and its num-bigint-dig integers.

use log::debug;
use num_bigint_dig::prime::next_prime;
use rand::rngs::OsRng;
use rsa::traits::{PrivateKeyParts, PublicKeyParts};
use rsa::{BigUint, Pkcs1v15Encrypt, RsaPrivateKey};

use super::CryptoError;
use crate::card::RsaKey;

/// RSA Operations
pub struct RsaOperations;

impl RsaOperations {
    /// Generate a new RSA key pair with the given public exponent
    pub fn generate(bits: usize, exponent: u32) -> Result<RsaKey, CryptoError> {
        debug!("Generating RSA-{} keypair", bits);
        let e = BigUint::from(exponent);
        let key = RsaPrivateKey::new_with_exp(&mut OsRng, bits, &e)
            .map_err(|e| CryptoError::Failed(e.to_string()))?;
        Self::export(&key)
    }

    /// Build a key from its two primes and public exponent.
    ///
    /// `d` is computed as `e^-1 mod (p-1)(q-1)`.
    pub fn from_primes(p: &[u8], q: &[u8], exponent: &[u8]) -> Result<RsaKey, CryptoError> {
        let p = BigUint::from_bytes_be(p);
        let q = BigUint::from_bytes_be(q);
        let e = BigUint::from_bytes_be(exponent);
        let one = BigUint::from(1u64);
        if p <= one || q <= one || e <= one {
            return Err(CryptoError::InvalidKey("degenerate RSA component".to_string()));
        }

        let n = &p * &q;
        let phi = (&p - &one) * (&q - &one);
        let d = mod_inverse(&e, &phi)
            .ok_or_else(|| CryptoError::InvalidKey("Cannot compute private exponent d".to_string()))?;

        let key = RsaPrivateKey::from_components(n, e, d, vec![p, q])
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        key.validate()
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        Self::export(&key)
    }

    fn export(key: &RsaPrivateKey) -> Result<RsaKey, CryptoError> {
        let primes = key.primes();
        if primes.len() < 2 {
            return Err(CryptoError::InvalidKey("Missing prime factors".to_string()));
        }
        Ok(RsaKey {
            n: key.n().to_bytes_be(),
            e: key.e().to_bytes_be(),
            d: key.d().to_bytes_be(),
            p: primes[0].to_bytes_be(),
            q: primes[1].to_bytes_be(),
        })
    }

    fn load(key: &RsaKey) -> Result<RsaPrivateKey, CryptoError> {
        RsaPrivateKey::from_components(
            BigUint::from_bytes_be(&key.n),
            BigUint::from_bytes_be(&key.e),
            BigUint::from_bytes_be(&key.d),
            vec![BigUint::from_bytes_be(&key.p), BigUint::from_bytes_be(&key.q)],
        )
        .map_err(|e| CryptoError::InvalidKey(e.to_string()))
    }

    /// Raw private operation `m^d mod n`, output padded to the modulus size.
    ///
    /// The caller supplies already padded input.
    pub fn raw_private(key: &RsaKey, input: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let n = BigUint::from_bytes_be(&key.n);
        let d = BigUint::from_bytes_be(&key.d);
        let m = BigUint::from_bytes_be(input);
        if m >= n {
            return Err(CryptoError::InvalidInput("input not below modulus".to_string()));
        }
        let out = m.modpow(&d, &n).to_bytes_be();
        Ok(left_pad(&out, key.n.len()))
    }

    /// Decrypt a PKCS#1 v1.5 encrypted block
    pub fn decrypt_pkcs1(key: &RsaKey, ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let private_key = Self::load(key)?;
        private_key
            .decrypt(Pkcs1v15Encrypt, ciphertext)
            .map_err(|e| CryptoError::InvalidInput(e.to_string()))
    }

    /// Smallest prime above `candidate`, left-padded to the input width
    pub fn next_prime(candidate: &[u8]) -> Vec<u8> {
        let start = BigUint::from_bytes_be(candidate);
        let prime = next_prime(&start).to_bytes_be();
        left_pad(&prime, candidate.len())
    }
}

fn left_pad(bytes: &[u8], len: usize) -> Vec<u8> {
    if bytes.len() >= len {
        return bytes.to_vec();
    }
    let mut out = vec![0u8; len - bytes.len()];
    out.extend_from_slice(bytes);
    out
}

/// Extended Euclid over unsigned integers, tracking signs separately.
/// Returns `a^-1 mod m`, or `None` if no inverse exists.
fn mod_inverse(a: &BigUint, m: &BigUint) -> Option<BigUint> {
    let one = BigUint::from(1u64);
    let zero = BigUint::from(0u64);

    let mut old_r = m.clone();
    let mut r = a.clone();
    let (mut old_s, mut old_neg) = (zero.clone(), false);
    let (mut s, mut neg) = (one.clone(), false);

    while r != zero {
        let quotient = &old_r / &r;
        let next_r = &old_r - &quotient * &r;
        old_r = std::mem::replace(&mut r, next_r);

        // next_s = old_s - quotient * s
        let qs = &quotient * &s;
        let (next_s, next_neg) = if old_neg == neg {
            if old_s >= qs {
                (&old_s - &qs, old_neg)
            } else {
                (&qs - &old_s, !old_neg)
            }
        } else {
            (&old_s + &qs, old_neg)
        };
        old_s = std::mem::replace(&mut s, next_s);
        old_neg = std::mem::replace(&mut neg, next_neg);
    }

    if old_r != one {
        return None;
    }
    Some(if old_neg { m - &old_s } else { old_s })
}
