//! Data objects
//!
//! SELECT DATA, GET DATA, GET NEXT DATA and PUT DATA over the card record.
//! Simple objects map onto one field; composite objects (0065, 006E, 007A)
//! are assembled in the IO buffer. Tags B6/B8/A4 carry a key in an
//! encrypted envelope so a key can be moved between cards of the same
//! master seed.

use log::{debug, info};

use super::access::{read_access, write_access};
use super::applet::{Flow, OpenPGPApplet};
use super::keygen::encode_public_key;
use super::pin_manager::is_valid_new_pin;
use super::session::DoCursor;
use crate::apdu::{APDU, SW};
use crate::card::{
    CardState, KeyMaterial, KeyRole, PinId, PinRecord, MAX_ATTRIBUTES_LENGTH, MAX_CERTIFICATE_LENGTH,
    MAX_LANG_LENGTH, MAX_NAME_LENGTH, MAX_PRIVATE_DO_LENGTH, SLOT_COUNT,
};
use crate::crypto::{KeyAlgorithm, Padding};
use crate::error::{fail, CardError, CardResult};
use crate::io::{IoCursor, IoError, Whence};
use crate::tlv::{read_list, tags, TLVBuilder};

/// Extended capabilities: SM, challenge, key import, PW status change,
/// private DOs, attribute change, PSO:DEC/ENC with AES; max challenge 254,
/// max certificate 2560, max special DO 512, PIN block 2 not supported,
/// MSE supported
pub const EXTENDED_CAPABILITIES: [u8; 10] = [0x7E, 0x00, 0x00, 0xFE, 0x0A, 0x00, 0x02, 0x00, 0x00, 0x01];

/// Extended length information: max command and response of 254 bytes
pub const EXTENDED_LENGTH_INFO: [u8; 8] = [0x02, 0x02, 0x00, 0xFE, 0x02, 0x02, 0x00, 0xFE];

const MAX_SPECIAL_DO_LENGTH: usize = 512;

const ENVELOPE_MAGIC: &[u8; 4] = b"GPGK";
const ENVELOPE_VERSION: u32 = 1;
const ENVELOPE_KEY_NAME: &[u8; 4] = b"kenc";

fn check_max(data: &[u8], max: usize) -> CardResult<()> {
    if data.len() > max {
        debug!("{} bytes exceed the {} byte limit", data.len(), max);
        return fail(SW::WRONG_LENGTH);
    }
    Ok(())
}

fn check_exact(data: &[u8], len: usize) -> CardResult<()> {
    if data.len() != len {
        debug!("{} bytes where {} are expected", data.len(), len);
        return fail(SW::WRONG_LENGTH);
    }
    Ok(())
}

/// Key addressed by a tag of a sig/dec/aut run such as C1..C3
fn role_in_run(tag: u16, first: u16) -> KeyRole {
    KeyRole::ALL[(tag - first) as usize]
}

/// Certificate record: 0 authentication, 1 decryption, 2 signature
fn certificate_role(record: u8) -> CardResult<KeyRole> {
    match record {
        0 => Ok(KeyRole::Aut),
        1 => Ok(KeyRole::Dec),
        2 => Ok(KeyRole::Sig),
        _ => fail(SW::RECORD_NOT_FOUND),
    }
}

/// Clear private part of a key, as carried inside the envelope
fn private_blob(material: &KeyMaterial) -> Vec<u8> {
    match material {
        KeyMaterial::Rsa(key) => TLVBuilder::new()
            .add(tags::RSA_PUBLIC_EXPONENT, &key.e)
            .add(tags::RSA_PRIME_P, &key.p)
            .add(tags::RSA_PRIME_Q, &key.q)
            .build(),
        KeyMaterial::Ecc(key) => TLVBuilder::new().add(tags::ECC_PRIVATE_KEY, &key.private).build(),
        KeyMaterial::Empty => Vec::new(),
    }
}

/// Encrypted key envelope.
///
/// `"GPGK" ‖ version u32 ‖ CRT ‖ attributes (u8 length) ‖ 7F49 public key
/// (u16 length) ‖ encrypted private blob (u16 length)`
#[derive(Debug, Clone, PartialEq, Eq)]
struct Envelope {
    crt: u8,
    attributes: Vec<u8>,
    public: Vec<u8>,
    encrypted: Vec<u8>,
}

impl Envelope {
    fn parse(data: &[u8]) -> CardResult<Self> {
        let malformed = |_: IoError| CardError::Status(SW::WRONG_DATA);
        let mut io = IoCursor::new();
        io.load(data).map_err(malformed)?;

        if io.fetch(4).map_err(malformed)? != ENVELOPE_MAGIC {
            debug!("Key envelope without magic");
            return fail(SW::WRONG_DATA);
        }
        let version = io.fetch_u32().map_err(malformed)?;
        if version != ENVELOPE_VERSION {
            debug!("Key envelope version {} not supported", version);
            return fail(SW::WRONG_DATA);
        }
        let crt = io.fetch_u8().map_err(malformed)?;
        let len = io.fetch_u8().map_err(malformed)? as usize;
        let attributes = io.fetch(len).map_err(malformed)?.to_vec();
        let len = io.fetch_u16().map_err(malformed)? as usize;
        let public = io.fetch(len).map_err(malformed)?.to_vec();
        let len = io.fetch_u16().map_err(malformed)? as usize;
        let encrypted = io.fetch(len).map_err(malformed)?.to_vec();
        if io.remaining() != 0 {
            return fail(SW::WRONG_DATA);
        }
        Ok(Self {
            crt,
            attributes,
            public,
            encrypted,
        })
    }

    fn write(&self, io: &mut IoCursor) -> Result<(), IoError> {
        io.insert(ENVELOPE_MAGIC)?;
        io.insert_u32(ENVELOPE_VERSION)?;
        io.insert_u8(self.crt)?;
        io.insert_u8(self.attributes.len() as u8)?;
        io.insert(&self.attributes)?;
        io.insert_u16(self.public.len() as u16)?;
        io.insert(&self.public)?;
        io.insert_u16(self.encrypted.len() as u16)?;
        io.insert(&self.encrypted)
    }
}

impl OpenPGPApplet {
    /// Handle SELECT DATA command
    pub(crate) fn handle_select_data(&mut self, cmd: &APDU) -> CardResult<Flow> {
        if cmd.p1 > 2 || cmd.p2 != 0x04 {
            return fail(SW::INCORRECT_P1_P2);
        }
        let malformed = |_: IoError| CardError::Status(SW::WRONG_DATA);

        let (tag, _) = self.io.fetch_tl().map_err(malformed)?;
        if tag != tags::TAG_LIST {
            return fail(SW::WRONG_DATA);
        }
        let (tag, len) = self.io.fetch_tl().map_err(malformed)?;
        if tag != tags::TAG_REFERENCE {
            return fail(SW::WRONG_DATA);
        }
        let selected = match len {
            1 => self.io.fetch_u8().map_err(malformed)? as u16,
            2 => self.io.fetch_u16().map_err(malformed)?,
            _ => return fail(SW::WRONG_DATA),
        };

        self.session.cursor = DoCursor {
            tag: selected,
            record: cmd.p1,
            offset: 0,
        };
        debug!("Selected DO {:04X} record {}", selected, cmd.p1);
        self.done()
    }

    /// Handle GET DATA command
    pub(crate) fn handle_get_data(&mut self, cmd: &APDU) -> CardResult<Flow> {
        let tag = cmd.p1p2();
        self.require(read_access(tag))?;
        if tag != self.session.cursor.tag {
            self.session.cursor = DoCursor {
                tag,
                record: 0,
                offset: 0,
            };
        }
        self.emit_data_object(tag)?;
        Ok(Flow::Complete)
    }

    /// Handle GET NEXT DATA command: next certificate record
    pub(crate) fn handle_get_next_data(&mut self, cmd: &APDU) -> CardResult<Flow> {
        let tag = cmd.p1p2();
        if tag != tags::CARDHOLDER_CERTIFICATE || self.session.cursor.tag != tag {
            return fail(SW::CONDITIONS_NOT_SATISFIED);
        }
        self.require(read_access(tag))?;
        self.emit_data_object(tag)?;
        self.session.cursor.record += 1;
        Ok(Flow::Complete)
    }

    /// Write the value of `tag` into the IO buffer
    fn emit_data_object(&mut self, tag: u16) -> CardResult<()> {
        self.io.discard(true);
        let state = &self.state;
        let slot_index = self.session.slot;
        let slot = &state.slots[slot_index];
        let io = &mut self.io;

        match tag {
            tags::PRIVATE_DO_1..=tags::PRIVATE_DO_4 => {
                io.insert(state.private_do((tag - tags::PRIVATE_DO_1) as usize + 1))?
            }
            tags::SLOT_INFO => {
                io.insert(&state.config_slot)?;
                io.insert_u8(slot_index as u8)?;
            }
            tags::SLOT_CONFIG => io.insert(&state.config_slot)?,
            tags::SLOT_SELECT => io.insert_u8(slot_index as u8)?,
            tags::AID => io.insert(&state.slot_aid(slot_index))?,
            tags::HISTORICAL_BYTES => io.insert(&state.histo)?,
            tags::EXTENDED_LENGTH_INFO => io.insert(&EXTENDED_LENGTH_INFO)?,
            tags::LOGIN_DATA => io.insert(&state.cardholder.login)?,
            tags::URL => io.insert(&state.cardholder.url)?,
            tags::NAME => io.insert(&state.cardholder.name)?,
            tags::LANGUAGE => io.insert(&state.cardholder.lang)?,
            tags::SEX => io.insert_u8(state.cardholder.sex)?,
            tags::CARDHOLDER_RELATED_DATA => {
                let holder = &state.cardholder;
                let value = TLVBuilder::new()
                    .add(tags::NAME, &holder.name)
                    .add(tags::LANGUAGE, &holder.lang)
                    .add(tags::SEX, &[holder.sex])
                    .build();
                io.insert(&value)?;
            }
            tags::APPLICATION_RELATED_DATA => {
                io.insert_tlv(tags::AID, &state.slot_aid(slot_index))?;
                io.insert_tlv(tags::HISTORICAL_BYTES, &state.histo)?;
                io.insert_tlv(tags::EXTENDED_LENGTH_INFO, &EXTENDED_LENGTH_INFO)?;
                io.mark();
                io.insert(&discretionary_dos(state, slot_index))?;
                // Length is known once the block is in place
                let len = io.len() - io.offset();
                io.set_offset(Whence::Mark);
                io.insert_tl(tags::DISCRETIONARY_DOS, len)?;
                io.set_offset(Whence::End);
            }
            tags::DISCRETIONARY_DOS => io.insert(&discretionary_dos(state, slot_index))?,
            tags::EXTENDED_CAPABILITIES => io.insert(&EXTENDED_CAPABILITIES)?,
            tags::ALGORITHM_ATTRIBUTES_SIG..=tags::ALGORITHM_ATTRIBUTES_AUT => {
                let role = role_in_run(tag, tags::ALGORITHM_ATTRIBUTES_SIG);
                io.insert(&slot.key(role).attributes)?
            }
            tags::PW_STATUS_BYTES => io.insert(&state.pw_status_bytes())?,
            tags::FINGERPRINTS => {
                for role in KeyRole::ALL {
                    io.insert(&slot.key(role).fingerprint)?;
                }
            }
            tags::CA_FINGERPRINTS => {
                for role in KeyRole::ALL {
                    io.insert(&slot.key(role).ca_fingerprint)?;
                }
            }
            tags::FINGERPRINT_SIG..=tags::FINGERPRINT_AUT => {
                let role = role_in_run(tag, tags::FINGERPRINT_SIG);
                io.insert(&slot.key(role).fingerprint)?
            }
            tags::CA_FINGERPRINT_1..=tags::CA_FINGERPRINT_3 => {
                let role = role_in_run(tag, tags::CA_FINGERPRINT_1);
                io.insert(&slot.key(role).ca_fingerprint)?
            }
            tags::KEY_TIMESTAMPS => {
                for role in KeyRole::ALL {
                    io.insert(&slot.key(role).date)?;
                }
            }
            tags::TIMESTAMP_SIG..=tags::TIMESTAMP_AUT => {
                let role = role_in_run(tag, tags::TIMESTAMP_SIG);
                io.insert(&slot.key(role).date)?
            }
            tags::UIF_SIG..=tags::UIF_AUT => {
                let role = role_in_run(tag, tags::UIF_SIG);
                io.insert(&slot.key(role).uif)?
            }
            tags::SECURITY_SUPPORT_TEMPLATE => {
                io.insert_tl(tags::DIGITAL_SIG_COUNTER, 3)?;
                io.insert_u24(slot.sig_count)?;
            }
            tags::DIGITAL_SIG_COUNTER => io.insert_u24(slot.sig_count)?,
            tags::CARDHOLDER_CERTIFICATE => {
                let role = certificate_role(self.session.cursor.record)?;
                io.insert(&slot.key(role).certificate)?
            }
            tags::CRT_SIG | tags::CRT_DEC | tags::CRT_AUT => {
                let role = KeyRole::from_crt(tag).ok_or(CardError::Status(SW::WRONG_DATA))?;
                return self.export_key(role);
            }
            _ => {
                debug!("GET DATA of unknown tag {:04X}", tag);
                return fail(SW::REFERENCED_DATA_NOT_FOUND);
            }
        }
        Ok(())
    }

    /// Handle PUT DATA command (both the even and the odd instruction)
    pub(crate) fn handle_put_data(&mut self, cmd: &APDU) -> CardResult<Flow> {
        let tag = cmd.p1p2();
        self.require(write_access(tag))?;
        self.session.cursor.tag = tag;
        self.store_data_object(tag, &cmd.data)?;
        self.commit()?;
        debug!("PUT DATA {:04X}: {} bytes", tag, cmd.data.len());
        self.done()
    }

    // Validate, then write; nothing is touched when a check fails
    fn store_data_object(&mut self, tag: u16, data: &[u8]) -> CardResult<()> {
        match tag {
            tags::PRIVATE_DO_1..=tags::PRIVATE_DO_4 => {
                check_max(data, MAX_PRIVATE_DO_LENGTH)?;
                let index = (tag - tags::PRIVATE_DO_1) as usize + 1;
                *self.state.private_do_mut(index) = data.to_vec();
            }
            tags::SLOT_CONFIG => {
                check_exact(data, 3)?;
                if data[0] != SLOT_COUNT as u8 || data[1] as usize >= SLOT_COUNT || data[2] > 3 {
                    return fail(SW::WRONG_DATA);
                }
                self.state.config_slot.copy_from_slice(data);
            }
            tags::SLOT_SELECT => {
                if self.state.config_slot[2] & 0x02 == 0 {
                    return fail(SW::CONDITIONS_NOT_SATISFIED);
                }
                if data.len() != 1 || data[0] as usize >= SLOT_COUNT {
                    return fail(SW::WRONG_DATA);
                }
                self.session.switch_slot(data[0] as usize);
                info!("Switched to slot {}", data[0]);
            }
            tags::AID => {
                check_exact(data, 4)?;
                self.slot_mut().serial.copy_from_slice(data);
            }
            tags::KEY_IMPORT => self.import_extended_header_list()?,
            tags::NAME => {
                check_max(data, MAX_NAME_LENGTH)?;
                self.state.cardholder.name = data.to_vec();
            }
            tags::LOGIN_DATA => {
                check_max(data, MAX_SPECIAL_DO_LENGTH)?;
                self.state.cardholder.login = data.to_vec();
            }
            tags::LANGUAGE => {
                check_max(data, MAX_LANG_LENGTH)?;
                self.state.cardholder.lang = data.to_vec();
            }
            tags::SEX => {
                check_exact(data, 1)?;
                self.state.cardholder.sex = data[0];
            }
            tags::URL => {
                check_max(data, MAX_SPECIAL_DO_LENGTH)?;
                self.state.cardholder.url = data.to_vec();
            }
            tags::CARDHOLDER_CERTIFICATE => {
                check_max(data, MAX_CERTIFICATE_LENGTH)?;
                let role = certificate_role(self.session.cursor.record)?;
                self.slot_mut().key_mut(role).certificate = data.to_vec();
            }
            tags::ALGORITHM_ATTRIBUTES_SIG..=tags::ALGORITHM_ATTRIBUTES_AUT => {
                check_max(data, MAX_ATTRIBUTES_LENGTH)?;
                let role = role_in_run(tag, tags::ALGORITHM_ATTRIBUTES_SIG);
                let key = self.slot_mut().key_mut(role);
                key.attributes = data.to_vec();
                key.material = KeyMaterial::Empty;
                info!("{:?} key attributes set, key material dropped", role);
            }
            tags::PW_STATUS_BYTES => {
                check_exact(data, 1)?;
                self.state.pw_status[0] = data[0];
            }
            tags::FINGERPRINT_SIG..=tags::FINGERPRINT_AUT => {
                check_exact(data, 20)?;
                let role = role_in_run(tag, tags::FINGERPRINT_SIG);
                self.slot_mut().key_mut(role).fingerprint = data.to_vec();
            }
            tags::CA_FINGERPRINT_1..=tags::CA_FINGERPRINT_3 => {
                check_exact(data, 20)?;
                let role = role_in_run(tag, tags::CA_FINGERPRINT_1);
                self.slot_mut().key_mut(role).ca_fingerprint = data.to_vec();
            }
            tags::TIMESTAMP_SIG..=tags::TIMESTAMP_AUT => {
                check_exact(data, 4)?;
                let role = role_in_run(tag, tags::TIMESTAMP_SIG);
                self.slot_mut().key_mut(role).date = data.to_vec();
            }
            tags::AES_KEY_DEC => {
                self.crypto.aes_check_key(data)?;
                self.state.sm_enc = data.to_vec();
            }
            tags::AES_KEY_DEC_ALT => {
                self.crypto.aes_check_key(data)?;
                self.state.sm_mac = data.to_vec();
            }
            tags::AES_KEY_ENC_DEC => {
                self.crypto.aes_check_key(data)?;
                self.slot_mut().aes_dec = data.to_vec();
            }
            tags::SM_KEYS => {
                check_exact(data, 32)?;
                let (enc, mac) = data.split_at(16);
                self.crypto.aes_check_key(enc)?;
                self.crypto.aes_check_key(mac)?;
                self.state.sm_enc = enc.to_vec();
                self.state.sm_mac = mac.to_vec();
            }
            tags::RESET_CODE => {
                if data.is_empty() {
                    self.state.rc = PinRecord::default();
                    info!("Resetting code cleared");
                } else if is_valid_new_pin(PinId::Rc, data) {
                    self.state.rc = PinRecord::new(self.crypto.as_ref(), data);
                    info!("Resetting code set");
                } else {
                    return fail(SW::WRONG_DATA);
                }
            }
            tags::UIF_SIG..=tags::UIF_AUT => {
                check_exact(data, 2)?;
                let role = role_in_run(tag, tags::UIF_SIG);
                let current = self.slot().key(role).uif[0];
                if data[0] > 2 || (current == 2 && data[0] != 2) {
                    debug!("UIF {:02X} -> {:02X} refused", current, data[0]);
                    return fail(SW::WRONG_DATA);
                }
                self.slot_mut().key_mut(role).uif = [data[0], data[1]];
            }
            tags::CRT_SIG | tags::CRT_DEC | tags::CRT_AUT => {
                let role = KeyRole::from_crt(tag).ok_or(CardError::Status(SW::WRONG_DATA))?;
                self.import_key(role, data)?;
            }
            _ => {
                debug!("PUT DATA of unknown tag {:04X}", tag);
                return fail(SW::REFERENCED_DATA_NOT_FOUND);
            }
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Key envelope
    // -------------------------------------------------------------------------

    // AES-128 key of the active slot's envelopes
    fn envelope_key(&self) -> CardResult<Vec<u8>> {
        let seed = self.crypto.slot_seed(self.session.slot)?;
        Ok(self.crypto.key_seed(&seed, ENVELOPE_KEY_NAME, 0, 16))
    }

    fn export_key(&mut self, role: KeyRole) -> CardResult<()> {
        let key = self.slot().key(role);
        let material = key
            .usable_material()
            .ok_or(CardError::Status(SW::REFERENCED_DATA_NOT_FOUND))?;
        let envelope = Envelope {
            crt: role.crt(),
            attributes: key.attributes.clone(),
            public: encode_public_key(material)?,
            encrypted: self.crypto.aes_encrypt(
                &self.envelope_key()?,
                &private_blob(material),
                Padding::Iso7816,
            )?,
        };
        self.io.discard(true);
        envelope.write(&mut self.io)?;
        debug!("Exported {:?} key", role);
        Ok(())
    }

    fn import_key(&mut self, role: KeyRole, data: &[u8]) -> CardResult<()> {
        let envelope = Envelope::parse(data)?;
        if envelope.crt != role.crt() || envelope.attributes.len() > MAX_ATTRIBUTES_LENGTH {
            return fail(SW::WRONG_DATA);
        }
        let algorithm = KeyAlgorithm::from_attributes(&envelope.attributes)
            .ok_or(CardError::Status(SW::WRONG_DATA))?;

        let blob = self
            .crypto
            .aes_decrypt(&self.envelope_key()?, &envelope.encrypted, Padding::Iso7816)
            .map_err(|_| CardError::Status(SW::WRONG_DATA))?;
        let fields = read_list(&blob, false);
        let field = |tag: u16| -> CardResult<&[u8]> {
            fields
                .iter()
                .find(|t| t.tag == tag)
                .map(|t| t.value.as_slice())
                .ok_or(CardError::Status(SW::WRONG_DATA))
        };

        let material = match algorithm {
            KeyAlgorithm::Rsa { .. } => KeyMaterial::Rsa(self.crypto.rsa_from_primes(
                field(tags::RSA_PRIME_P)?,
                field(tags::RSA_PRIME_Q)?,
                field(tags::RSA_PUBLIC_EXPONENT)?,
            )?),
            other => {
                let curve = other.curve().ok_or(CardError::Status(SW::WRONG_DATA))?;
                KeyMaterial::Ecc(self.crypto.ec_from_scalar(curve, field(tags::ECC_PRIVATE_KEY)?)?)
            }
        };
        if !material.matches(algorithm) || encode_public_key(&material)? != envelope.public {
            debug!("Key envelope does not match its public key");
            return fail(SW::WRONG_DATA);
        }

        let slot = self.slot_mut();
        let key = slot.key_mut(role);
        key.attributes = envelope.attributes;
        key.material = material;
        if role == KeyRole::Sig {
            slot.sig_count = 0;
        }
        info!("Imported {:?} key from envelope", role);
        Ok(())
    }
}

/// Content of DO 73: C0 ‖ C1..C3 ‖ C4 ‖ C5 ‖ C6 ‖ CD
fn discretionary_dos(state: &CardState, slot_index: usize) -> Vec<u8> {
    let slot = &state.slots[slot_index];
    let mut fingerprints = Vec::with_capacity(60);
    let mut ca_fingerprints = Vec::with_capacity(60);
    let mut dates = Vec::with_capacity(12);
    for role in KeyRole::ALL {
        let key = slot.key(role);
        fingerprints.extend_from_slice(&key.fingerprint);
        ca_fingerprints.extend_from_slice(&key.ca_fingerprint);
        dates.extend_from_slice(&key.date);
    }
    TLVBuilder::new()
        .add(tags::EXTENDED_CAPABILITIES, &EXTENDED_CAPABILITIES)
        .add(tags::ALGORITHM_ATTRIBUTES_SIG, &slot.sig.attributes)
        .add(tags::ALGORITHM_ATTRIBUTES_DEC, &slot.dec.attributes)
        .add(tags::ALGORITHM_ATTRIBUTES_AUT, &slot.aut.attributes)
        .add(tags::PW_STATUS_BYTES, &state.pw_status_bytes())
        .add(tags::FINGERPRINTS, &fingerprints)
        .add(tags::CA_FINGERPRINTS, &ca_fingerprints)
        .add(tags::KEY_TIMESTAMPS, &dates)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::openpgp::testing::{admin, applet, get, put, run, select, verify};
    use crate::tlv::read_single;

    #[test]
    fn test_cardholder_round_trip() {
        let mut card = admin();
        assert_eq!(put(&mut card, tags::NAME, b"Doe<<John"), SW::SUCCESS);
        assert_eq!(put(&mut card, tags::LANGUAGE, b"en"), SW::SUCCESS);
        assert_eq!(put(&mut card, tags::SEX, &[0x31]), SW::SUCCESS);
        assert_eq!(get(&mut card, tags::NAME).data, b"Doe<<John");

        let holder = get(&mut card, tags::CARDHOLDER_RELATED_DATA).data;
        let fields = read_list(&holder, false);
        assert_eq!(fields.len(), 3);
        assert_eq!(fields[0].value, b"Doe<<John");
        assert_eq!(fields[1].value, b"en");
        assert_eq!(fields[2].value, vec![0x31]);
    }

    #[test]
    fn test_length_limits() {
        let mut card = admin();
        assert_eq!(put(&mut card, tags::NAME, &[b'a'; 40]), SW::WRONG_LENGTH);
        assert_eq!(put(&mut card, tags::SEX, &[0x31, 0x32]), SW::WRONG_LENGTH);
        assert_eq!(put(&mut card, tags::FINGERPRINT_SIG, &[0u8; 19]), SW::WRONG_LENGTH);
        assert_eq!(put(&mut card, tags::PRIVATE_DO_2, &[0u8; 513]), SW::WRONG_LENGTH);
        assert_eq!(put(&mut card, tags::PW_STATUS_BYTES, &[]), SW::WRONG_LENGTH);
        assert_eq!(put(&mut card, tags::PW_STATUS_BYTES, &[0x00, 0x0C]), SW::WRONG_LENGTH);
        assert_eq!(get(&mut card, tags::PW_STATUS_BYTES).data[0], 0x01);
        assert!(get(&mut card, tags::NAME).data.is_empty());
    }

    #[test]
    fn test_access_tables() {
        let mut card = applet();
        select(&mut card);
        assert_eq!(put(&mut card, tags::NAME, b"x"), SW::SECURITY_STATUS_NOT_SATISFIED);
        assert_eq!(get(&mut card, tags::PRIVATE_DO_3).sw(), SW::SECURITY_STATUS_NOT_SATISFIED);

        assert_eq!(verify(&mut card, 0x82, b"123456"), SW::SUCCESS);
        assert_eq!(put(&mut card, tags::PRIVATE_DO_3, b"user"), SW::SUCCESS);
        assert_eq!(get(&mut card, tags::PRIVATE_DO_3).data, b"user");
        assert_eq!(put(&mut card, tags::PRIVATE_DO_2, b"admin"), SW::SECURITY_STATUS_NOT_SATISFIED);
        assert_eq!(get(&mut card, tags::PRIVATE_DO_4).sw(), SW::SECURITY_STATUS_NOT_SATISFIED);
    }

    #[test]
    fn test_unknown_tags() {
        let mut card = admin();
        assert_eq!(get(&mut card, 0x0042).sw(), SW::REFERENCED_DATA_NOT_FOUND);
        assert_eq!(put(&mut card, 0x0042, b"x"), SW::REFERENCED_DATA_NOT_FOUND);
    }

    #[test]
    fn test_application_related_data() {
        let mut card = applet();
        select(&mut card);
        let data = get(&mut card, tags::APPLICATION_RELATED_DATA).data;
        let fields = read_list(&data, false);
        assert_eq!(fields[0].tag, tags::AID);
        assert_eq!(fields[0].value.len(), 16);
        assert_eq!(fields[1].tag, tags::HISTORICAL_BYTES);
        assert_eq!(fields[2].value, EXTENDED_LENGTH_INFO);
        assert_eq!(fields[3].tag, tags::DISCRETIONARY_DOS);

        let inner = read_list(&fields[3].value, false);
        let inner_tags: Vec<u16> = inner.iter().map(|t| t.tag).collect();
        assert_eq!(inner_tags, vec![0xC0, 0xC1, 0xC2, 0xC3, 0xC4, 0xC5, 0xC6, 0xCD]);
        assert_eq!(inner[4].value, vec![0x01, 12, 12, 12, 3, 0, 3]);
        assert_eq!(inner[5].value.len(), 60);
        assert_eq!(get(&mut card, tags::DISCRETIONARY_DOS).data, fields[3].value);
    }

    #[test]
    fn test_attributes_drop_key_material() {
        let mut card = admin();
        let ed25519 = [0x16, 0x2B, 0x06, 0x01, 0x04, 0x01, 0xDA, 0x47, 0x0F, 0x01];
        assert_eq!(put(&mut card, tags::ALGORITHM_ATTRIBUTES_AUT, &ed25519), SW::SUCCESS);
        let generate = APDU::with_data(0x00, 0x47, 0x80, 0x00, vec![0xA4, 0x00]);
        assert_eq!(run(&mut card, generate).sw(), SW::SUCCESS);
        assert!(!card.slot().aut.material.is_empty());

        assert_eq!(put(&mut card, tags::ALGORITHM_ATTRIBUTES_AUT, &ed25519), SW::SUCCESS);
        assert!(card.slot().aut.material.is_empty());
        assert_eq!(put(&mut card, tags::ALGORITHM_ATTRIBUTES_AUT, &[0x16; 13]), SW::WRONG_LENGTH);
    }

    #[test]
    fn test_certificates_by_record() {
        let mut card = admin();
        let select_cert = |record: u8| {
            APDU::with_data(0x00, 0xA5, record, 0x04, vec![0x60, 0x04, 0x5C, 0x02, 0x7F, 0x21])
        };
        for (record, cert) in [(0u8, b"aut"), (1, b"dec"), (2, b"sig")] {
            assert_eq!(run(&mut card, select_cert(record)).sw(), SW::SUCCESS);
            assert_eq!(put(&mut card, tags::CARDHOLDER_CERTIFICATE, cert), SW::SUCCESS);
        }
        assert_eq!(card.slot().sig.certificate, b"sig");
        assert_eq!(card.slot().aut.certificate, b"aut");

        // GET DATA on a new tag starts at record 0, GET NEXT DATA walks on
        assert_eq!(get(&mut card, tags::NAME).sw(), SW::SUCCESS);
        assert_eq!(get(&mut card, tags::CARDHOLDER_CERTIFICATE).data, b"aut");
        let next = APDU::new(0x00, 0xCC, 0x7F, 0x21);
        assert_eq!(run(&mut card, next.clone()).data, b"aut");
        assert_eq!(run(&mut card, next.clone()).data, b"dec");
        assert_eq!(run(&mut card, next.clone()).data, b"sig");
        assert_eq!(run(&mut card, next).sw(), SW::RECORD_NOT_FOUND);

        assert_eq!(run(&mut card, select_cert(3)).sw(), SW::INCORRECT_P1_P2);
        let bad_list = APDU::with_data(0x00, 0xA5, 0x00, 0x04, vec![0x5C, 0x02, 0x7F, 0x21]);
        assert_eq!(run(&mut card, bad_list).sw(), SW::WRONG_DATA);
    }

    #[test]
    fn test_get_next_data_needs_certificate_cursor() {
        let mut card = applet();
        select(&mut card);
        assert_eq!(
            run(&mut card, APDU::new(0x00, 0xCC, 0x7F, 0x21)).sw(),
            SW::CONDITIONS_NOT_SATISFIED
        );
        assert_eq!(
            run(&mut card, APDU::new(0x00, 0xCC, 0x00, 0x5B)).sw(),
            SW::CONDITIONS_NOT_SATISFIED
        );
    }

    #[test]
    fn test_slot_objects() {
        let mut card = admin();
        assert_eq!(get(&mut card, tags::SLOT_INFO).data, vec![3, 0, 3, 0]);
        assert_eq!(put(&mut card, tags::SLOT_CONFIG, &[3, 0]), SW::WRONG_LENGTH);
        assert_eq!(put(&mut card, tags::SLOT_CONFIG, &[3, 3, 3]), SW::WRONG_DATA);
        assert_eq!(put(&mut card, tags::SLOT_SELECT, &[3]), SW::WRONG_DATA);

        card.session.mse_dec = KeyRole::Aut;
        assert_eq!(put(&mut card, tags::SLOT_SELECT, &[2]), SW::SUCCESS);
        assert_eq!(get(&mut card, tags::SLOT_SELECT).data, vec![2]);
        assert_eq!(card.session.mse_dec, KeyRole::Dec);

        assert_eq!(put(&mut card, tags::SLOT_CONFIG, &[3, 1, 1]), SW::SUCCESS);
        assert_eq!(put(&mut card, tags::SLOT_SELECT, &[0]), SW::CONDITIONS_NOT_SATISFIED);
    }

    #[test]
    fn test_aid_serial_write() {
        let mut card = admin();
        assert_eq!(put(&mut card, tags::AID, &[1, 2, 3, 4]), SW::SUCCESS);
        assert_eq!(&get(&mut card, tags::AID).data[10..14], &[1, 2, 3, 4]);
        assert_eq!(put(&mut card, tags::AID, &[1, 2, 3]), SW::WRONG_LENGTH);
    }

    #[test]
    fn test_aid_follows_slot() {
        let mut card = admin();
        let first = get(&mut card, tags::AID).data;
        assert_eq!(put(&mut card, tags::SLOT_SELECT, &[1]), SW::SUCCESS);
        let second = get(&mut card, tags::AID).data;
        assert_eq!(&second[..10], &first[..10]);
        assert_ne!(&second[10..14], &first[10..14]);
        assert_eq!(second[13] & 0x07, 1);

        // 6E carries the same AID as 4F
        let related = get(&mut card, tags::APPLICATION_RELATED_DATA).data;
        assert_eq!(&related[..2], &[0x4F, 0x10]);
        assert_eq!(&related[2..18], &second[..]);

        // Each slot keeps its own serial
        assert_eq!(put(&mut card, tags::AID, &[9, 9, 9, 9]), SW::SUCCESS);
        assert_eq!(put(&mut card, tags::SLOT_SELECT, &[0]), SW::SUCCESS);
        assert_eq!(get(&mut card, tags::AID).data, first);
        assert_eq!(put(&mut card, tags::SLOT_SELECT, &[1]), SW::SUCCESS);
        assert_eq!(&get(&mut card, tags::AID).data[10..14], &[9, 9, 9, 9]);
    }

    #[test]
    fn test_symmetric_keys() {
        let mut card = admin();
        assert_eq!(put(&mut card, tags::AES_KEY_ENC_DEC, &[0x11; 16]), SW::SUCCESS);
        assert_eq!(card.slot().aes_dec, vec![0x11; 16]);
        assert_eq!(put(&mut card, tags::AES_KEY_ENC_DEC, &[0x11; 15]), SW::WRONG_DATA);
        assert_eq!(put(&mut card, tags::SM_KEYS, &[0x22; 32]), SW::SUCCESS);
        assert_eq!(card.state.sm_enc, vec![0x22; 16]);
        assert_eq!(card.state.sm_mac, vec![0x22; 16]);
        assert_eq!(put(&mut card, tags::SM_KEYS, &[0x22; 16]), SW::WRONG_LENGTH);
    }

    #[test]
    fn test_resetting_code() {
        let mut card = admin();
        assert_eq!(put(&mut card, tags::RESET_CODE, b"1234567"), SW::WRONG_DATA);
        assert_eq!(put(&mut card, tags::RESET_CODE, b"12345678"), SW::SUCCESS);
        assert!(card.state.rc.is_set());
        assert_eq!(card.state.pw_status_bytes()[5], 3);
        assert_eq!(put(&mut card, tags::RESET_CODE, &[]), SW::SUCCESS);
        assert!(!card.state.rc.is_set());
    }

    #[test]
    fn test_uif_lock() {
        let mut card = admin();
        assert_eq!(put(&mut card, tags::UIF_SIG, &[0x03, 0x20]), SW::WRONG_DATA);
        assert_eq!(put(&mut card, tags::UIF_SIG, &[0x01]), SW::WRONG_LENGTH);
        assert_eq!(put(&mut card, tags::UIF_SIG, &[0x02, 0x20]), SW::SUCCESS);
        assert_eq!(get(&mut card, tags::UIF_SIG).data, vec![0x02, 0x20]);
        assert_eq!(put(&mut card, tags::UIF_SIG, &[0x00, 0x20]), SW::WRONG_DATA);
    }

    #[test]
    fn test_pw_status_and_counter() {
        let mut card = admin();
        assert_eq!(put(&mut card, tags::PW_STATUS_BYTES, &[0x00]), SW::SUCCESS);
        assert_eq!(get(&mut card, tags::PW_STATUS_BYTES).data[0], 0x00);
        assert_eq!(get(&mut card, tags::SECURITY_SUPPORT_TEMPLATE).data, vec![0x93, 3, 0, 0, 0]);
        assert_eq!(get(&mut card, tags::DIGITAL_SIG_COUNTER).data, vec![0, 0, 0]);
    }

    #[test]
    fn test_key_envelope_round_trip() {
        let mut card = admin();
        let p256 = [0x13, 0x2A, 0x86, 0x48, 0xCE, 0x3D, 0x03, 0x01, 0x07];
        assert_eq!(put(&mut card, tags::ALGORITHM_ATTRIBUTES_DEC, &p256), SW::SUCCESS);
        let generate = APDU::with_data(0x00, 0x47, 0x80, 0x00, vec![0xB8, 0x00]);
        assert_eq!(run(&mut card, generate).sw(), SW::SUCCESS);
        let original = card.slot().dec.material.clone();

        let envelope = get(&mut card, tags::CRT_DEC);
        assert_eq!(envelope.sw(), SW::SUCCESS);
        assert_eq!(&envelope.data[..4], b"GPGK");
        let (public, _) = read_single(&envelope.data[4 + 4 + 1 + 1 + p256.len() + 2..], false).unwrap();
        assert_eq!(public.tag, tags::PUBLIC_KEY_TEMPLATE);

        // Into another slot key: wrong CRT
        assert_eq!(put(&mut card, tags::CRT_AUT, &envelope.data), SW::WRONG_DATA);

        assert_eq!(put(&mut card, tags::ALGORITHM_ATTRIBUTES_DEC, &p256), SW::SUCCESS);
        assert!(card.slot().dec.material.is_empty());
        assert_eq!(put(&mut card, tags::CRT_DEC, &envelope.data), SW::SUCCESS);
        assert_eq!(card.slot().dec.material, original);

        let mut tampered = envelope.data.clone();
        let last = tampered.len() - 1;
        tampered[last] ^= 0x01;
        assert_eq!(put(&mut card, tags::CRT_DEC, &tampered), SW::WRONG_DATA);
        assert_eq!(put(&mut card, tags::CRT_DEC, b"GPGX"), SW::WRONG_DATA);
    }

    #[test]
    fn test_export_requires_admin_and_key() {
        let mut card = applet();
        select(&mut card);
        assert_eq!(get(&mut card, tags::CRT_SIG).sw(), SW::SECURITY_STATUS_NOT_SATISFIED);
        assert_eq!(verify(&mut card, 0x83, b"12345678"), SW::SUCCESS);
        assert_eq!(get(&mut card, tags::CRT_SIG).sw(), SW::REFERENCED_DATA_NOT_FOUND);
    }
}
