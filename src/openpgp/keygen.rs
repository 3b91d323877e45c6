//! Key generation and import
//!
//! GENERATE ASYMMETRIC KEY PAIR (random or derived from the slot seed),
//! public key read-back as a 7F49 template, and the 3FFF extended header
//! list import of private keys.

use log::{debug, info};

use super::applet::{Flow, OpenPGPApplet};
use crate::apdu::{APDU, SW};
use crate::card::{KeyMaterial, KeyRole};
use crate::crypto::{algorithm_id, normalize_curve_encoding, Curve, Direction, KeyAlgorithm};
use crate::error::{fail, CardError, CardResult};
use crate::tlv::{tags, TLVBuilder};

const RSA_SIZES: [usize; 4] = [1024, 2048, 3072, 4096];

/// Left-pad `bytes` with zeros to `len`; longer input is returned as is
pub(crate) fn left_pad(bytes: &[u8], len: usize) -> Vec<u8> {
    let mut out = vec![0u8; len.saturating_sub(bytes.len())];
    out.extend_from_slice(bytes);
    out
}

/// Algorithm of a key about to be generated or imported.
///
/// A known family on an unknown curve is `6A88`, anything else `6A80`.
pub(crate) fn key_algorithm(attributes: &[u8]) -> CardResult<KeyAlgorithm> {
    match KeyAlgorithm::from_attributes(attributes) {
        Some(KeyAlgorithm::Rsa { bits }) if !RSA_SIZES.contains(&bits) => {
            debug!("RSA-{} not supported", bits);
            fail(SW::WRONG_DATA)
        }
        Some(algorithm) => Ok(algorithm),
        None => match attributes.first() {
            Some(&algorithm_id::ECDH) | Some(&algorithm_id::ECDSA) | Some(&algorithm_id::EDDSA) => {
                fail(SW::REFERENCED_DATA_NOT_FOUND)
            }
            _ => fail(SW::WRONG_DATA),
        },
    }
}

/// Public key template `7F49 { 81 n ‖ 82 e }` or `7F49 { 86 W }`
pub fn encode_public_key(material: &KeyMaterial) -> CardResult<Vec<u8>> {
    let template = match material {
        KeyMaterial::Rsa(key) => TLVBuilder::new()
            .add(tags::RSA_MODULUS, &key.n)
            .add(tags::RSA_EXPONENT, &left_pad(&key.e, 4)),
        KeyMaterial::Ecc(key) => TLVBuilder::new().add(
            tags::ECC_PUBLIC_KEY,
            &normalize_curve_encoding(key.curve, &key.public, Direction::Outbound),
        ),
        KeyMaterial::Empty => return fail(SW::REFERENCED_DATA_NOT_FOUND),
    };
    Ok(template.wrap(tags::PUBLIC_KEY_TEMPLATE).build())
}

impl OpenPGPApplet {
    /// Handle GENERATE ASYMMETRIC KEY PAIR command
    pub(crate) fn handle_generate_key(&mut self, cmd: &APDU) -> CardResult<Flow> {
        let op = cmd.p1p2();
        if !matches!(op, 0x8000 | 0x8001 | 0x8100) {
            return fail(SW::INCORRECT_P1_P2);
        }
        if cmd.lc() != 2 {
            return fail(SW::WRONG_LENGTH);
        }
        let (crt, len) = self.io.fetch_tl()?;
        let role = match KeyRole::from_crt(crt) {
            Some(role) if len == 0 => role,
            _ => return fail(SW::WRONG_DATA),
        };

        if op != 0x8100 {
            let seeded = cmd.p2 == 0x01 || self.session.seed_mode;
            self.generate_key(role, seeded)?;
        }

        let key = self.slot().key(role);
        key_algorithm(&key.attributes)?;
        let material = key
            .usable_material()
            .ok_or(CardError::Status(SW::REFERENCED_DATA_NOT_FOUND))?;
        let template = encode_public_key(material)?;
        self.reply(&template)
    }

    fn generate_key(&mut self, role: KeyRole, seeded: bool) -> CardResult<()> {
        let algorithm = key_algorithm(&self.slot().key(role).attributes)?;
        let material = if seeded {
            self.derive_key(role, algorithm)?
        } else {
            match algorithm {
                KeyAlgorithm::Rsa { bits } => KeyMaterial::Rsa(
                    self.crypto.rsa_generate(bits, self.state.default_rsa_exponent)?,
                ),
                other => KeyMaterial::Ecc(self.crypto.ec_generate(curve_of(other)?)?),
            }
        };

        let slot = self.slot_mut();
        slot.key_mut(role).material = material;
        if role == KeyRole::Sig {
            slot.sig_count = 0;
        }
        self.commit()?;
        info!(
            "Generated {:?} key ({:?}, {}) in slot {}",
            role,
            algorithm,
            if seeded { "seeded" } else { "random" },
            self.session.slot
        );
        Ok(())
    }

    /// Key derived from the active slot's seed; the same seed always gives
    /// the same key.
    fn derive_key(&self, role: KeyRole, algorithm: KeyAlgorithm) -> CardResult<KeyMaterial> {
        let seed = self.crypto.slot_seed(self.session.slot)?;
        let name = role.seed_name();
        match algorithm {
            KeyAlgorithm::Rsa { bits } => {
                let half = bits / 16;
                let prime = |index: u16| {
                    let mut candidate = self.crypto.key_seed(&seed, name, index, half);
                    candidate[0] |= 0x80;
                    self.crypto.rsa_next_prime(&candidate)
                };
                let (p, q) = (prime(1), prime(2));
                let exponent = self.state.default_rsa_exponent.to_be_bytes();
                Ok(KeyMaterial::Rsa(self.crypto.rsa_from_primes(&p, &q, &exponent)?))
            }
            other => {
                let curve = curve_of(other)?;
                let scalar = self.crypto.key_seed(&seed, name, 1, curve.domain_len());
                Ok(KeyMaterial::Ecc(self.crypto.ec_from_scalar(curve, &scalar)?))
            }
        }
    }

    /// PUT DATA 3FFF: `4D { CRT, 7F48 { component lengths }, 5F48 { data } }`
    pub(crate) fn import_extended_header_list(&mut self) -> CardResult<()> {
        let (tag, _) = self.io.fetch_tl()?;
        if tag != tags::EXTENDED_HEADER_LIST {
            return fail(SW::REFERENCED_DATA_NOT_FOUND);
        }
        let (crt, crt_len) = self.io.fetch_tl()?;
        let role = KeyRole::from_crt(crt).ok_or(CardError::Status(SW::REFERENCED_DATA_NOT_FOUND))?;
        self.io.fetch(crt_len)?;

        let (tag, len) = self.io.fetch_tl()?;
        if tag != tags::PRIVATE_KEY_TEMPLATE {
            return fail(SW::REFERENCED_DATA_NOT_FOUND);
        }
        let end = self.io.offset() + len;
        let (mut len_e, mut len_p, mut len_q) = (0, 0, 0);
        while self.io.offset() < end {
            let (component, l) = self.io.fetch_tl()?;
            match component {
                0x91 => len_e = l,
                0x92 => len_p = l,
                0x93 => len_q = l,
                0x94..=0x97 => {}
                _ => return fail(SW::REFERENCED_DATA_NOT_FOUND),
            }
        }

        let (tag, _) = self.io.fetch_tl()?;
        if tag != tags::CONCATENATED_KEY_DATA {
            return fail(SW::REFERENCED_DATA_NOT_FOUND);
        }

        let attributes = &self.slot().key(role).attributes;
        let algorithm = KeyAlgorithm::from_attributes(attributes)
            .ok_or(CardError::Status(SW::REFERENCED_DATA_NOT_FOUND))?;

        let material = match algorithm {
            KeyAlgorithm::Rsa { bits } => {
                let half = bits / 16;
                if len_e == 0 || len_e > 4 || len_p > half || len_q > half {
                    debug!("RSA component sizes e={} p={} q={} refused", len_e, len_p, len_q);
                    return fail(SW::WRONG_DATA);
                }
                let e = self.io.fetch(len_e)?.to_vec();
                let p = left_pad(self.io.fetch(len_p)?, half);
                let q = left_pad(self.io.fetch(len_q)?, half);
                KeyMaterial::Rsa(self.crypto.rsa_from_primes(&p, &q, &e)?)
            }
            other => {
                let curve = curve_of(other)?;
                let scalar = self.io.fetch(curve.domain_len())?.to_vec();
                KeyMaterial::Ecc(self.crypto.ec_from_scalar(curve, &scalar)?)
            }
        };
        if !material.matches(algorithm) {
            return fail(SW::WRONG_DATA);
        }

        let slot = self.slot_mut();
        slot.key_mut(role).material = material;
        if role == KeyRole::Sig {
            slot.sig_count = 0;
        }
        info!("Imported {:?} key ({:?})", role, algorithm);
        Ok(())
    }
}

fn curve_of(algorithm: KeyAlgorithm) -> CardResult<Curve> {
    algorithm
        .curve()
        .ok_or(CardError::Status(SW::REFERENCED_DATA_NOT_FOUND))
}
