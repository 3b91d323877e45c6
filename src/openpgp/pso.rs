//! Security operations
//!
//! PERFORM SECURITY OPERATION (signature, decipher, encipher) and INTERNAL
//! AUTHENTICATE. Keys whose UIF is set suspend the command until the user
//! confirms the use.

use log::debug;

use super::applet::{Flow, OpenPGPApplet};
use super::keygen::left_pad;
use super::presentation::Prompt;
use crate::apdu::{pso, APDU, SW};
use crate::card::{KeyMaterial, KeyRole};
use crate::crypto::{
    algorithm_id, normalize_curve_encoding, CryptoError, Direction, KeyAlgorithm, Padding,
};
use crate::error::{fail, CardError, CardResult};
use crate::io::IoCursor;
use crate::tlv::{read_single, tags};

/// Digital signature counter saturates at three bytes
const MAX_SIGNATURE_COUNT: u32 = 0xFF_FFFF;

/// Padding indicator bytes of PSO:DECIPHER
const INDICATOR_RSA: u8 = 0x00;
const INDICATOR_AES: u8 = 0x02;

const DER_SEQUENCE: u16 = 0x30;
const DER_INTEGER: u16 = 0x02;

/// `SEQUENCE { INTEGER r, INTEGER s }` to `r ‖ s`, each on `len` bytes
fn der_signature_to_raw(der: &[u8], len: usize) -> CardResult<Vec<u8>> {
    let malformed = || CardError::from(CryptoError::Failed("malformed ECDSA signature".into()));
    let (sequence, _) = read_single(der, true).map_err(|_| malformed())?;
    if sequence.tag != DER_SEQUENCE || sequence.subs.len() != 2 {
        return Err(malformed());
    }

    let mut raw = Vec::with_capacity(2 * len);
    for integer in &sequence.subs {
        if integer.tag != DER_INTEGER {
            return Err(malformed());
        }
        let start = integer.value.iter().take_while(|&&b| b == 0).count();
        let value = &integer.value[start..];
        if value.len() > len {
            return Err(malformed());
        }
        raw.extend(left_pad(value, len));
    }
    Ok(raw)
}

/// EMSA-PKCS1-v1_5 block type 01 around `input`
fn pkcs1_signature_block(input: &[u8], size: usize) -> Vec<u8> {
    let mut block = Vec::with_capacity(size);
    block.extend_from_slice(&[0x00, 0x01]);
    block.resize(size - input.len() - 1, 0xFF);
    block.push(0x00);
    block.extend_from_slice(input);
    block
}

impl OpenPGPApplet {
    /// Handle PERFORM SECURITY OPERATION command
    pub(crate) fn handle_pso(&mut self, cmd: &APDU) -> CardResult<Flow> {
        match cmd.p1p2() {
            pso::CDS => {
                if let Some(flow) = self.confirm_key_use(KeyRole::Sig) {
                    return Ok(flow);
                }
                self.compute_signature(cmd)
            }
            pso::DECIPHER => {
                if let Some(flow) = self.confirm_key_use(KeyRole::Dec) {
                    return Ok(flow);
                }
                self.decipher(cmd)
            }
            pso::ENCIPHER => self.encipher(cmd),
            other => {
                debug!("PSO {:04X} not supported", other);
                fail(SW::REFERENCED_DATA_NOT_FOUND)
            }
        }
    }

    /// Handle INTERNAL AUTHENTICATE command
    pub(crate) fn handle_internal_authenticate(&mut self, cmd: &APDU) -> CardResult<Flow> {
        if let Some(flow) = self.confirm_key_use(KeyRole::Aut) {
            return Ok(flow);
        }
        let role = self.session.mse_aut;
        if let Some(KeyAlgorithm::Rsa { bits }) = self.slot().key(role).algorithm() {
            if cmd.data.len() > bits / 8 * 40 / 100 {
                debug!("Authentication input of {} bytes too long", cmd.data.len());
                return fail(SW::WRONG_LENGTH);
            }
        }
        let signature = self.sign_with(role, &cmd.data)?;
        debug!("Authenticated with {:?} key", role);
        self.reply(&signature)
    }

    /// `Some(Pending)` while a key with UIF set waits for the user
    fn confirm_key_use(&self, role: KeyRole) -> Option<Flow> {
        if self.slot().key(role).requires_confirmation() && !self.session.uif_latch {
            debug!("{:?} key use needs confirmation", role);
            return Some(Flow::Pending(Prompt::ConfirmKeyUse(role)));
        }
        None
    }

    fn compute_signature(&mut self, cmd: &APDU) -> CardResult<Flow> {
        let signature = self.sign_with(KeyRole::Sig, &cmd.data)?;

        let slot = self.slot_mut();
        slot.sig_count = (slot.sig_count + 1).min(MAX_SIGNATURE_COUNT);
        let count = slot.sig_count;
        let valid_multiple = self.state.pw_status[0];
        self.session.security.after_sign(valid_multiple);
        self.commit()?;

        debug!("Signature {} computed", count);
        self.reply(&signature)
    }

    /// Sign `input` with the key of `role` in the active slot
    fn sign_with(&self, role: KeyRole, input: &[u8]) -> CardResult<Vec<u8>> {
        let key = self.slot().key(role);
        let algorithm = key
            .algorithm()
            .ok_or(CardError::Status(SW::CONDITIONS_NOT_SATISFIED))?;
        let material = key
            .usable_material()
            .ok_or(CardError::Status(SW::CONDITIONS_NOT_SATISFIED))?;

        match (algorithm, material) {
            (KeyAlgorithm::Rsa { bits }, KeyMaterial::Rsa(rsa)) => {
                let size = bits / 8;
                if input.len() + 11 > size {
                    return fail(SW::WRONG_LENGTH);
                }
                let block = pkcs1_signature_block(input, size);
                Ok(self.crypto.rsa_private(rsa, &block)?)
            }
            (KeyAlgorithm::Ecdsa(curve), KeyMaterial::Ecc(ecc)) => {
                let len = curve.domain_len();
                let digest = &input[..input.len().min(len)];
                let der = self.crypto.ecdsa_sign(ecc, digest)?;
                der_signature_to_raw(&der, len)
            }
            (KeyAlgorithm::Eddsa(_), KeyMaterial::Ecc(ecc)) => Ok(self.crypto.eddsa_sign(ecc, input)?),
            (algorithm, _) => {
                debug!("{:?} key cannot sign", algorithm);
                fail(SW::CONDITIONS_NOT_SATISFIED)
            }
        }
    }

    fn decipher(&mut self, cmd: &APDU) -> CardResult<Flow> {
        let (&indicator, body) = cmd
            .data
            .split_first()
            .ok_or(CardError::Status(SW::WRONG_LENGTH))?;

        let plain = match indicator {
            INDICATOR_RSA => {
                let key = self.slot().key(self.session.mse_dec);
                match (key.algorithm(), key.usable_material()) {
                    (Some(KeyAlgorithm::Rsa { .. }), Some(KeyMaterial::Rsa(rsa))) => {
                        self.crypto.rsa_decrypt(rsa, body)?
                    }
                    _ => return fail(SW::CONDITIONS_NOT_SATISFIED),
                }
            }
            INDICATOR_AES => {
                let aes = &self.slot().aes_dec;
                if aes.is_empty() {
                    return fail(SW::CONDITIONS_NOT_SATISFIED);
                }
                self.crypto.aes_decrypt(aes, body, Padding::None)?
            }
            0xA6 => self.ecdh_decipher(&cmd.data)?,
            other => {
                debug!("Decipher indicator {:02X} not supported", other);
                return fail(SW::REFERENCED_DATA_NOT_FOUND);
            }
        };
        self.reply(&plain)
    }

    // A6 { 7F49 { 86 point } } against the ECDH key picked by MSE
    fn ecdh_decipher(&self, data: &[u8]) -> CardResult<Vec<u8>> {
        let mut cursor = IoCursor::new();
        cursor.load(data)?;
        for expected in [tags::CIPHER_DO, tags::PUBLIC_KEY_TEMPLATE] {
            let (tag, _) = cursor.fetch_tl()?;
            if tag != expected {
                return fail(SW::WRONG_DATA);
            }
        }
        let (tag, len) = cursor.fetch_tl()?;
        if tag != tags::ECC_PUBLIC_KEY {
            return fail(SW::WRONG_DATA);
        }
        let peer = cursor.fetch(len)?;

        let key = self.slot().key(self.session.mse_dec);
        if key.attributes.first() != Some(&algorithm_id::ECDH) {
            return fail(SW::CONDITIONS_NOT_SATISFIED);
        }
        let Some(KeyMaterial::Ecc(ecc)) = key.usable_material() else {
            return fail(SW::CONDITIONS_NOT_SATISFIED);
        };
        let peer = normalize_curve_encoding(ecc.curve, peer, Direction::Inbound);
        let shared = self.crypto.ecdh(ecc, &peer)?;
        Ok(normalize_curve_encoding(ecc.curve, &shared, Direction::Outbound))
    }

    fn encipher(&mut self, cmd: &APDU) -> CardResult<Flow> {
        let aes = &self.slot().aes_dec;
        if aes.is_empty() {
            return fail(SW::CONDITIONS_NOT_SATISFIED);
        }
        let mut out = vec![INDICATOR_AES];
        out.extend(self.crypto.aes_encrypt(aes, &cmd.data, Padding::None)?);
        self.reply(&out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{CryptoProvider, Curve};
    use crate::openpgp::testing::{admin, applet, put, run, select, verify};

    const ED25519: [u8; 10] = [0x16, 0x2B, 0x06, 0x01, 0x04, 0x01, 0xDA, 0x47, 0x0F, 0x01];
    const CV25519: [u8; 11] = [0x12, 0x2B, 0x06, 0x01, 0x04, 0x01, 0x97, 0x55, 0x01, 0x05, 0x01];
    const P256: [u8; 9] = [0x13, 0x2A, 0x86, 0x48, 0xCE, 0x3D, 0x03, 0x01, 0x07];
    const RSA1024: [u8; 6] = [0x01, 0x04, 0x00, 0x00, 0x20, 0x00];

    fn with_key(tag: u16, attributes: &[u8], crt: u8) -> OpenPGPApplet {
        let mut card = admin();
        assert_eq!(put(&mut card, tag, attributes), SW::SUCCESS);
        let generate = APDU::with_data(0x00, 0x47, 0x80, 0x01, vec![crt, 0x00]);
        assert_eq!(run(&mut card, generate).sw(), SW::SUCCESS);
        card
    }

    fn sign(digest: &[u8]) -> APDU {
        APDU::with_data(0x00, 0x2A, 0x9E, 0x9A, digest.to_vec())
    }

    fn decipher(data: Vec<u8>) -> APDU {
        APDU::with_data(0x00, 0x2A, 0x80, 0x86, data)
    }

    #[test]
    fn test_der_signature_to_raw() {
        let der = [0x30, 0x08, 0x02, 0x02, 0x00, 0x81, 0x02, 0x02, 0x01, 0x02];
        let raw = der_signature_to_raw(&der, 4).unwrap();
        assert_eq!(raw, vec![0, 0, 0, 0x81, 0, 0, 1, 2]);
        assert_eq!(der_signature_to_raw(&der, 1).unwrap_err().sw(), SW::INTERNAL_ERROR);
        assert_eq!(der_signature_to_raw(&[0x31, 0x00], 4).unwrap_err().sw(), SW::INTERNAL_ERROR);
    }

    #[test]
    fn test_pkcs1_signature_block() {
        let block = pkcs1_signature_block(&[0xAA, 0xBB], 16);
        assert_eq!(block.len(), 16);
        assert_eq!(&block[..3], &[0x00, 0x01, 0xFF]);
        assert_eq!(&block[12..], &[0xFF, 0x00, 0xAA, 0xBB]);
    }

    #[test]
    fn test_ed25519_signature() {
        let mut card = with_key(tags::ALGORITHM_ATTRIBUTES_SIG, &ED25519, 0xB6);
        assert_eq!(verify(&mut card, 0x81, b"123456"), SW::SUCCESS);
        let message = [0x33; 32];
        let response = run(&mut card, sign(&message));
        assert_eq!(response.sw(), SW::SUCCESS);
        assert_eq!(card.slot().sig_count, 1);

        let KeyMaterial::Ecc(key) = &card.slot().sig.material else {
            panic!("no Ed25519 key");
        };
        let public: [u8; 32] = key.public.as_slice().try_into().unwrap();
        let verifying = ed25519_dalek::VerifyingKey::from_bytes(&public).unwrap();
        let signature = ed25519_dalek::Signature::from_slice(&response.data).unwrap();
        assert!(verifying.verify_strict(&message, &signature).is_ok());
    }

    #[test]
    fn test_ecdsa_signature_is_raw() {
        use p256::ecdsa::signature::hazmat::PrehashVerifier;

        let mut card = with_key(tags::ALGORITHM_ATTRIBUTES_SIG, &P256, 0xB6);
        assert_eq!(verify(&mut card, 0x81, b"123456"), SW::SUCCESS);
        let digest = [0x44; 32];
        let response = run(&mut card, sign(&digest));
        assert_eq!(response.data.len(), 64);

        let KeyMaterial::Ecc(key) = &card.slot().sig.material else {
            panic!("no P-256 key");
        };
        let verifying = p256::ecdsa::VerifyingKey::from_sec1_bytes(&key.public).unwrap();
        let signature = p256::ecdsa::Signature::from_slice(&response.data).unwrap();
        assert!(verifying.verify_prehash(&digest, &signature).is_ok());
    }

    #[test]
    fn test_signature_pin_valid_once() {
        let mut card = with_key(tags::ALGORITHM_ATTRIBUTES_SIG, &ED25519, 0xB6);
        assert_eq!(run(&mut card, sign(&[1; 32])).sw(), SW::SECURITY_STATUS_NOT_SATISFIED);

        assert_eq!(verify(&mut card, 0x81, b"123456"), SW::SUCCESS);
        assert_eq!(run(&mut card, sign(&[1; 32])).sw(), SW::SUCCESS);
        assert_eq!(run(&mut card, sign(&[2; 32])).sw(), SW::SUCCESS);

        assert_eq!(put(&mut card, tags::PW_STATUS_BYTES, &[0x00]), SW::SUCCESS);
        assert_eq!(run(&mut card, sign(&[3; 32])).sw(), SW::SUCCESS);
        assert_eq!(run(&mut card, sign(&[4; 32])).sw(), SW::SECURITY_STATUS_NOT_SATISFIED);
        assert_eq!(card.slot().sig_count, 3);
    }

    #[test]
    fn test_signature_counter_saturates() {
        let mut card = with_key(tags::ALGORITHM_ATTRIBUTES_SIG, &ED25519, 0xB6);
        assert_eq!(verify(&mut card, 0x81, b"123456"), SW::SUCCESS);
        card.slot_mut().sig_count = MAX_SIGNATURE_COUNT;
        assert_eq!(run(&mut card, sign(&[1; 32])).sw(), SW::SUCCESS);
        assert_eq!(card.slot().sig_count, MAX_SIGNATURE_COUNT);
    }

    #[test]
    fn test_signature_without_key() {
        let mut card = admin();
        assert_eq!(verify(&mut card, 0x81, b"123456"), SW::SUCCESS);
        assert_eq!(run(&mut card, sign(&[1; 32])).sw(), SW::CONDITIONS_NOT_SATISFIED);
        assert_eq!(card.slot().sig_count, 0);
    }

    #[test]
    fn test_rsa_signature_and_decipher() {
        use rsa::traits::PublicKeyParts;
        use rsa::{BigUint, Pkcs1v15Encrypt, RsaPublicKey};

        let mut card = with_key(tags::ALGORITHM_ATTRIBUTES_DEC, &RSA1024, 0xB8);
        assert_eq!(put(&mut card, tags::ALGORITHM_ATTRIBUTES_SIG, &RSA1024), SW::SUCCESS);
        let generate = APDU::with_data(0x00, 0x47, 0x80, 0x01, vec![0xB6, 0x00]);
        assert_eq!(run(&mut card, generate).sw(), SW::SUCCESS);
        assert_eq!(verify(&mut card, 0x81, b"123456"), SW::SUCCESS);

        let signature = run(&mut card, sign(&[0x55; 51]));
        assert_eq!(signature.sw(), SW::SUCCESS);
        assert_eq!(signature.data.len(), 128);
        assert_eq!(run(&mut card, sign(&[0x55; 118])).sw(), SW::WRONG_LENGTH);

        let KeyMaterial::Rsa(key) = card.slot().dec.material.clone() else {
            panic!("no RSA key");
        };
        let public =
            RsaPublicKey::new(BigUint::from_bytes_be(&key.n), BigUint::from_bytes_be(&key.e)).unwrap();
        assert_eq!(public.size(), 128);
        let ciphertext = public
            .encrypt(&mut rand::rngs::OsRng, Pkcs1v15Encrypt, b"session key")
            .unwrap();

        let mut data = vec![INDICATOR_RSA];
        data.extend(ciphertext);
        let plain = run(&mut card, decipher(data));
        assert_eq!(plain.sw(), SW::SUCCESS);
        assert_eq!(plain.data, b"session key".to_vec());

        let garbage = run(&mut card, decipher(vec![0x00; 129]));
        assert_eq!(garbage.sw(), SW::WRONG_DATA);
    }

    #[test]
    fn test_aes_round_trip() {
        let mut card = admin();
        assert_eq!(verify(&mut card, 0x82, b"123456"), SW::SUCCESS);
        let encipher = APDU::with_data(0x00, 0x2A, 0x86, 0x80, vec![0x77; 32]);
        assert_eq!(run(&mut card, encipher.clone()).sw(), SW::CONDITIONS_NOT_SATISFIED);

        assert_eq!(put(&mut card, tags::AES_KEY_ENC_DEC, &[0x11; 16]), SW::SUCCESS);
        let encrypted = run(&mut card, encipher);
        assert_eq!(encrypted.sw(), SW::SUCCESS);
        assert_eq!(encrypted.data[0], INDICATOR_AES);
        assert_eq!(encrypted.data.len(), 33);

        let plain = run(&mut card, decipher(encrypted.data));
        assert_eq!(plain.data, vec![0x77; 32]);

        let unaligned = run(&mut card, decipher(vec![INDICATOR_AES, 1, 2, 3]));
        assert_eq!(unaligned.sw(), SW::WRONG_LENGTH);
    }

    #[test]
    fn test_decipher_errors() {
        let mut card = applet();
        select(&mut card);
        assert_eq!(verify(&mut card, 0x82, b"123456"), SW::SUCCESS);
        assert_eq!(run(&mut card, decipher(vec![])).sw(), SW::WRONG_LENGTH);
        assert_eq!(run(&mut card, decipher(vec![0x05, 0x00])).sw(), SW::REFERENCED_DATA_NOT_FOUND);
        assert_eq!(run(&mut card, decipher(vec![0x00; 129])).sw(), SW::CONDITIONS_NOT_SATISFIED);
        let unsupported = APDU::with_data(0x00, 0x2A, 0x9E, 0x9B, vec![0x00]);
        assert_eq!(run(&mut card, unsupported).sw(), SW::REFERENCED_DATA_NOT_FOUND);
    }

    #[test]
    fn test_ecdh_curve25519() {
        let mut card = with_key(tags::ALGORITHM_ATTRIBUTES_DEC, &CV25519, 0xB8);
        assert_eq!(verify(&mut card, 0x82, b"123456"), SW::SUCCESS);
        let KeyMaterial::Ecc(card_key) = card.slot().dec.material.clone() else {
            panic!("no Curve25519 key");
        };

        let peer = card.crypto.ec_generate(Curve::Curve25519).unwrap();
        let wire_point = normalize_curve_encoding(Curve::Curve25519, &peer.public, Direction::Outbound);
        let mut data = vec![0xA6, 0x25, 0x7F, 0x49, 0x22, 0x86, 0x20];
        data.extend_from_slice(&wire_point);

        let response = run(&mut card, decipher(data.clone()));
        assert_eq!(response.sw(), SW::SUCCESS);
        let expected = card.crypto.ecdh(&peer, &card_key.public).unwrap();
        assert_eq!(
            response.data,
            normalize_curve_encoding(Curve::Curve25519, &expected, Direction::Outbound)
        );

        data[2] = 0x7E;
        assert_eq!(run(&mut card, decipher(data)).sw(), SW::WRONG_DATA);
    }

    #[test]
    fn test_ecdh_needs_ecdh_key() {
        let mut card = with_key(tags::ALGORITHM_ATTRIBUTES_DEC, &P256, 0xB8);
        assert_eq!(verify(&mut card, 0x82, b"123456"), SW::SUCCESS);
        let mut data = vec![0xA6, 0x46, 0x7F, 0x49, 0x43, 0x86, 0x41, 0x04];
        data.extend_from_slice(&[0x01; 64]);
        assert_eq!(run(&mut card, decipher(data)).sw(), SW::CONDITIONS_NOT_SATISFIED);
    }

    #[test]
    fn test_internal_authenticate() {
        let mut card = with_key(tags::ALGORITHM_ATTRIBUTES_AUT, &ED25519, 0xA4);
        let authenticate = APDU::with_data(0x00, 0x88, 0x00, 0x00, vec![0x99; 20]);
        assert_eq!(run(&mut card, APDU::new(0x00, 0x20, 0xFF, 0x82)).sw(), SW::SUCCESS);
        assert_eq!(run(&mut card, authenticate.clone()).sw(), SW::SECURITY_STATUS_NOT_SATISFIED);
        assert_eq!(verify(&mut card, 0x82, b"123456"), SW::SUCCESS);
        let response = run(&mut card, authenticate);
        assert_eq!(response.sw(), SW::SUCCESS);
        assert_eq!(response.data.len(), 64);
        assert_eq!(card.slot().sig_count, 0);
    }

    #[test]
    fn test_key_use_confirmation() {
        let mut card = with_key(tags::ALGORITHM_ATTRIBUTES_SIG, &ED25519, 0xB6);
        assert_eq!(put(&mut card, tags::UIF_SIG, &[0x01, 0x20]), SW::SUCCESS);
        assert_eq!(verify(&mut card, 0x81, b"123456"), SW::SUCCESS);

        assert_eq!(
            card.execute(&sign(&[1; 32])).unwrap(),
            Flow::Pending(Prompt::ConfirmKeyUse(KeyRole::Sig))
        );
        assert_eq!(card.slot().sig_count, 0);

        card.session.uif_latch = true;
        assert_eq!(run(&mut card, sign(&[1; 32])).sw(), SW::SUCCESS);
        assert_eq!(card.slot().sig_count, 1);
    }
}
