//! Curves and algorithm attributes
//!
//! Maps the algorithm attribute objects (C1/C2/C3) onto the algorithms the
//! card knows, and owns the one place where Curve25519 byte order flips.

use serde::{Deserialize, Serialize};

/// Algorithm IDs, first byte of the algorithm attributes
pub mod algorithm_id {
    pub const RSA: u8 = 0x01;
    pub const ECDH: u8 = 0x12;
    pub const ECDSA: u8 = 0x13;
    pub const EDDSA: u8 = 0x16;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Curve {
    Secp256k1,
    NistP256,
    NistP384,
    BrainpoolP256r1,
    BrainpoolP256t1,
    Ed25519,
    Curve25519,
}

const OID_SECP256K1: &[u8] = &[0x2B, 0x81, 0x04, 0x00, 0x0A];
const OID_NIST_P256: &[u8] = &[0x2A, 0x86, 0x48, 0xCE, 0x3D, 0x03, 0x01, 0x07];
const OID_NIST_P384: &[u8] = &[0x2B, 0x81, 0x04, 0x00, 0x22];
const OID_BRAINPOOL_P256R1: &[u8] = &[0x2B, 0x24, 0x03, 0x03, 0x02, 0x08, 0x01, 0x01, 0x07];
const OID_BRAINPOOL_P256T1: &[u8] = &[0x2B, 0x24, 0x03, 0x03, 0x02, 0x08, 0x01, 0x01, 0x08];
const OID_ED25519: &[u8] = &[0x2B, 0x06, 0x01, 0x04, 0x01, 0xDA, 0x47, 0x0F, 0x01];
const OID_CURVE25519: &[u8] = &[0x2B, 0x06, 0x01, 0x04, 0x01, 0x97, 0x55, 0x01, 0x05, 0x01];

impl Curve {
    pub const ALL: [Curve; 7] = [
        Curve::Secp256k1,
        Curve::NistP256,
        Curve::NistP384,
        Curve::BrainpoolP256r1,
        Curve::BrainpoolP256t1,
        Curve::Ed25519,
        Curve::Curve25519,
    ];

    pub fn oid(self) -> &'static [u8] {
        match self {
            Curve::Secp256k1 => OID_SECP256K1,
            Curve::NistP256 => OID_NIST_P256,
            Curve::NistP384 => OID_NIST_P384,
            Curve::BrainpoolP256r1 => OID_BRAINPOOL_P256R1,
            Curve::BrainpoolP256t1 => OID_BRAINPOOL_P256T1,
            Curve::Ed25519 => OID_ED25519,
            Curve::Curve25519 => OID_CURVE25519,
        }
    }

    pub fn from_oid(oid: &[u8]) -> Option<Curve> {
        Curve::ALL.into_iter().find(|c| c.oid() == oid)
    }

    /// Size in bytes of a scalar or field element
    pub fn domain_len(self) -> usize {
        match self {
            Curve::NistP384 => 48,
            _ => 32,
        }
    }

    pub fn is_weierstrass(self) -> bool {
        !matches!(self, Curve::Ed25519 | Curve::Curve25519)
    }
}

/// Algorithm described by a key's attribute object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAlgorithm {
    Rsa { bits: usize },
    Ecdh(Curve),
    Ecdsa(Curve),
    Eddsa(Curve),
}

impl KeyAlgorithm {
    /// Parse `01 nnnn eeee ff` for RSA or `id ‖ OID [‖ format]` for ECC.
    ///
    /// Returns `None` for empty, truncated or unknown attributes.
    pub fn from_attributes(attributes: &[u8]) -> Option<Self> {
        let (&id, rest) = attributes.split_first()?;
        match id {
            algorithm_id::RSA => {
                if rest.len() < 4 {
                    return None;
                }
                let bits = u16::from_be_bytes([rest[0], rest[1]]) as usize;
                Some(KeyAlgorithm::Rsa { bits })
            }
            algorithm_id::ECDH | algorithm_id::ECDSA | algorithm_id::EDDSA => {
                let curve = curve_from_attribute_oid(rest)?;
                Some(match id {
                    algorithm_id::ECDH => KeyAlgorithm::Ecdh(curve),
                    algorithm_id::ECDSA => KeyAlgorithm::Ecdsa(curve),
                    _ => KeyAlgorithm::Eddsa(curve),
                })
            }
            _ => None,
        }
    }

    pub fn curve(self) -> Option<Curve> {
        match self {
            KeyAlgorithm::Rsa { .. } => None,
            KeyAlgorithm::Ecdh(c) | KeyAlgorithm::Ecdsa(c) | KeyAlgorithm::Eddsa(c) => Some(c),
        }
    }
}

// The OID may be followed by an import-format byte (00 or FF)
fn curve_from_attribute_oid(oid: &[u8]) -> Option<Curve> {
    Curve::from_oid(oid).or_else(|| match oid.split_last() {
        Some((&0x00, head)) | Some((&0xFF, head)) => Curve::from_oid(head),
        _ => None,
    })
}

/// Which way an encoding crosses the card boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Into card order: from the wire, or from a provider's native form
    Inbound,
    /// Out of card order: to the wire, or into a provider's native form
    Outbound,
}

/// Convert scalar and point encodings between card order and the outside.
///
/// Card order is big-endian for every curve. Curve25519 values travel
/// little-endian on the wire and in X25519 implementations, so they are
/// reversed in both directions; every other curve passes through.
pub fn normalize_curve_encoding(curve: Curve, bytes: &[u8], direction: Direction) -> Vec<u8> {
    match (curve, direction) {
        (Curve::Curve25519, Direction::Inbound) | (Curve::Curve25519, Direction::Outbound) => {
            bytes.iter().rev().copied().collect()
        }
        _ => bytes.to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_oid_lookup() {
        for curve in Curve::ALL {
            assert_eq!(Curve::from_oid(curve.oid()), Some(curve));
        }
        assert_eq!(Curve::from_oid(&[0x2B]), None);
    }

    #[test]
    fn test_rsa_attributes() {
        let attr = [0x01, 0x08, 0x00, 0x00, 0x20, 0x01];
        assert_eq!(
            KeyAlgorithm::from_attributes(&attr),
            Some(KeyAlgorithm::Rsa { bits: 2048 })
        );
        assert_eq!(KeyAlgorithm::from_attributes(&[0x01, 0x08]), None);
        assert_eq!(KeyAlgorithm::from_attributes(&[]), None);
    }

    #[test]
    fn test_ecc_attributes_with_format_byte() {
        let mut attr = vec![algorithm_id::EDDSA];
        attr.extend_from_slice(Curve::Ed25519.oid());
        assert_eq!(
            KeyAlgorithm::from_attributes(&attr),
            Some(KeyAlgorithm::Eddsa(Curve::Ed25519))
        );
        attr[0] = algorithm_id::ECDH;
        attr.push(0xFF);
        let algo = KeyAlgorithm::from_attributes(&attr).unwrap();
        assert_eq!(algo, KeyAlgorithm::Ecdh(Curve::Ed25519));
        assert_eq!(algo.curve(), Some(Curve::Ed25519));
    }

    #[test]
    fn test_unknown_algorithm() {
        let mut attr = vec![0x42];
        attr.extend_from_slice(Curve::NistP256.oid());
        assert_eq!(KeyAlgorithm::from_attributes(&attr), None);
    }

    #[test]
    fn test_normalize_only_touches_curve25519() {
        let bytes = [1u8, 2, 3, 4];
        assert_eq!(
            normalize_curve_encoding(Curve::Curve25519, &bytes, Direction::Outbound),
            vec![4, 3, 2, 1]
        );
        let back = normalize_curve_encoding(
            Curve::Curve25519,
            &normalize_curve_encoding(Curve::Curve25519, &bytes, Direction::Outbound),
            Direction::Inbound,
        );
        assert_eq!(back, bytes);
        assert_eq!(
            normalize_curve_encoding(Curve::NistP256, &bytes, Direction::Outbound),
            bytes.to_vec()
        );
        assert_eq!(
            normalize_curve_encoding(Curve::Ed25519, &bytes, Direction::Inbound),
            bytes.to_vec()
        );
    }
}
