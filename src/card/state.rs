//! Card state data structures
//!
//! The single persistent record of the card: identity, cardholder data,
//! PIN records and the key slots. Byte fields are stored base64 encoded
//! when serialized to JSON.

use serde::{Deserialize, Serialize};

use crate::crypto::{Curve, CryptoError, CryptoProvider, KeyAlgorithm};

/// Custom serde module for base64 encoding of byte vectors
pub(crate) mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &Vec<u8>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if bytes.is_empty() {
            serializer.serialize_str("")
        } else {
            serializer.serialize_str(&STANDARD.encode(bytes))
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s: String = Deserialize::deserialize(deserializer)?;
        if s.is_empty() {
            return Ok(Vec::new());
        }
        STANDARD.decode(&s).map_err(serde::de::Error::custom)
    }
}

/// Marker written once the record holds an installed card
pub const MAGIC: &[u8; 8] = b"GPGCARD3";

pub const SLOT_COUNT: usize = 3;

/// Lifecycle byte, stored at [`HISTO_LIFECYCLE`] in the historical bytes
pub const LIFECYCLE_ACTIVATED: u8 = 0x07;
pub const LIFECYCLE_TERMINATED: u8 = 0x03;
pub const HISTO_LIFECYCLE: usize = 7;

pub const MAX_NAME_LENGTH: usize = 39;
pub const MAX_LANG_LENGTH: usize = 8;
pub const MAX_PRIVATE_DO_LENGTH: usize = 512;
pub const MAX_CERTIFICATE_LENGTH: usize = 2560;
pub const MAX_ATTRIBUTES_LENGTH: usize = 12;
pub const MAX_PIN_LENGTH: usize = 12;
pub const MAX_CHALLENGE_LENGTH: usize = 254;

pub const DEFAULT_RSA_EXPONENT: u32 = 0x010001;
pub const DEFAULT_PW1: &[u8] = b"123456";
pub const DEFAULT_PW3: &[u8] = b"12345678";
pub const PIN_RETRIES: u8 = 3;

/// RID, application, version 2.0, manufacturer 2C97
pub const AID_PREFIX: [u8; 10] = [0xD2, 0x76, 0x00, 0x01, 0x24, 0x01, 0x02, 0x00, 0x2C, 0x97];

const DEFAULT_HISTO: [u8; 10] = [0x00, 0x31, 0xC5, 0x73, 0xC0, 0x01, 0x80, 0x7F, 0x90, 0x00];

/// RSA-2048, 32-bit exponent, import format e,p,q with n
pub const DEFAULT_ATTRIBUTES: [u8; 6] = [0x01, 0x08, 0x00, 0x00, 0x20, 0x01];

/// How VERIFY over the PIN-operation class obtains the PIN
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PinMode {
    /// Typed on the host, on-device entry refused
    Host,
    /// Typed on the device
    Screen,
    /// Typed on the host, confirmed on the device
    Confirm,
    /// Accepted without interaction
    Trust,
}

/// The three stored PINs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinId {
    Pw1,
    Pw3,
    Rc,
}

/// Hashed PIN with its retry counter
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinRecord {
    pub length: u8,
    pub counter: u8,
    #[serde(with = "base64_bytes")]
    pub hash: Vec<u8>,
}

impl PinRecord {
    pub fn new(crypto: &dyn CryptoProvider, pin: &[u8]) -> Self {
        Self {
            length: pin.len() as u8,
            counter: PIN_RETRIES,
            hash: crypto.sha256(pin).to_vec(),
        }
    }

    pub fn is_set(&self) -> bool {
        self.length > 0 && !self.hash.is_empty()
    }

    pub fn is_blocked(&self) -> bool {
        self.counter == 0
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardholderData {
    #[serde(with = "base64_bytes")]
    pub name: Vec<u8>,
    #[serde(with = "base64_bytes")]
    pub lang: Vec<u8>,
    pub sex: u8,
    #[serde(with = "base64_bytes")]
    pub login: Vec<u8>,
    #[serde(with = "base64_bytes")]
    pub url: Vec<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RsaKey {
    #[serde(with = "base64_bytes")]
    pub n: Vec<u8>,
    #[serde(with = "base64_bytes")]
    pub e: Vec<u8>,
    #[serde(with = "base64_bytes")]
    pub d: Vec<u8>,
    #[serde(with = "base64_bytes")]
    pub p: Vec<u8>,
    #[serde(with = "base64_bytes")]
    pub q: Vec<u8>,
}

/// ECC key pair, scalar and point in card order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EccKey {
    pub curve: Curve,
    #[serde(with = "base64_bytes")]
    pub private: Vec<u8>,
    #[serde(with = "base64_bytes")]
    pub public: Vec<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum KeyMaterial {
    #[default]
    Empty,
    Rsa(RsaKey),
    Ecc(EccKey),
}

impl KeyMaterial {
    pub fn is_empty(&self) -> bool {
        matches!(self, KeyMaterial::Empty)
    }

    /// True when the material is of the family (and curve) the attributes describe
    pub fn matches(&self, algorithm: KeyAlgorithm) -> bool {
        match (self, algorithm) {
            (KeyMaterial::Rsa(key), KeyAlgorithm::Rsa { bits }) => key.n.len() * 8 == bits,
            (KeyMaterial::Ecc(key), algo) => algo.curve() == Some(key.curve),
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Key {
    #[serde(with = "base64_bytes")]
    pub attributes: Vec<u8>,
    pub material: KeyMaterial,
    #[serde(with = "base64_bytes")]
    pub fingerprint: Vec<u8>,
    #[serde(with = "base64_bytes")]
    pub ca_fingerprint: Vec<u8>,
    #[serde(with = "base64_bytes")]
    pub certificate: Vec<u8>,
    #[serde(with = "base64_bytes")]
    pub date: Vec<u8>,
    pub uif: [u8; 2],
}

impl Default for Key {
    fn default() -> Self {
        Self {
            attributes: Vec::new(),
            material: KeyMaterial::Empty,
            fingerprint: vec![0u8; 20],
            ca_fingerprint: vec![0u8; 20],
            certificate: Vec::new(),
            date: vec![0u8; 4],
            uif: [0, 0],
        }
    }
}

impl Key {
    fn with_attributes(attributes: &[u8]) -> Self {
        Self {
            attributes: attributes.to_vec(),
            ..Self::default()
        }
    }

    pub fn algorithm(&self) -> Option<KeyAlgorithm> {
        KeyAlgorithm::from_attributes(&self.attributes)
    }

    /// Usable material that agrees with the attributes
    pub fn usable_material(&self) -> Option<&KeyMaterial> {
        let algorithm = self.algorithm()?;
        if self.material.matches(algorithm) {
            Some(&self.material)
        } else {
            None
        }
    }

    /// UIF enabled (01) or locked on (02)
    pub fn requires_confirmation(&self) -> bool {
        self.uif[0] != 0
    }
}

/// Signature, decryption or authentication key of a slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyRole {
    Sig,
    Dec,
    Aut,
}

impl KeyRole {
    pub const ALL: [KeyRole; 3] = [KeyRole::Sig, KeyRole::Dec, KeyRole::Aut];

    /// Control reference template tag selecting the key
    pub fn crt(self) -> u8 {
        match self {
            KeyRole::Sig => 0xB6,
            KeyRole::Dec => 0xB8,
            KeyRole::Aut => 0xA4,
        }
    }

    pub fn from_crt(tag: u16) -> Option<Self> {
        match tag {
            0xB6 => Some(KeyRole::Sig),
            0xB8 => Some(KeyRole::Dec),
            0xA4 => Some(KeyRole::Aut),
            _ => None,
        }
    }

    /// Name mixed into the key seed
    pub fn seed_name(self) -> &'static [u8; 4] {
        match self {
            KeyRole::Sig => b"sig ",
            KeyRole::Dec => b"dec ",
            KeyRole::Aut => b"aut ",
        }
    }

    /// Position in C5/C6/CD style concatenations
    pub fn index(self) -> usize {
        match self {
            KeyRole::Sig => 0,
            KeyRole::Dec => 1,
            KeyRole::Aut => 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeySlot {
    pub serial: [u8; 4],
    pub sig: Key,
    pub dec: Key,
    pub aut: Key,
    pub sig_count: u32,
    #[serde(with = "base64_bytes")]
    pub aes_dec: Vec<u8>,
}

impl KeySlot {
    fn new(serial: [u8; 4], attributes: &[u8]) -> Self {
        Self {
            serial,
            sig: Key::with_attributes(attributes),
            dec: Key::with_attributes(attributes),
            aut: Key::with_attributes(attributes),
            sig_count: 0,
            aes_dec: Vec::new(),
        }
    }

    pub fn key(&self, role: KeyRole) -> &Key {
        match role {
            KeyRole::Sig => &self.sig,
            KeyRole::Dec => &self.dec,
            KeyRole::Aut => &self.aut,
        }
    }

    pub fn key_mut(&mut self, role: KeyRole) -> &mut Key {
        match role {
            KeyRole::Sig => &mut self.sig,
            KeyRole::Dec => &mut self.dec,
            KeyRole::Aut => &mut self.aut,
        }
    }
}

/// Complete card state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardState {
    #[serde(with = "base64_bytes")]
    pub magic: Vec<u8>,
    #[serde(with = "base64_bytes")]
    pub aid: Vec<u8>,
    #[serde(with = "base64_bytes")]
    pub histo: Vec<u8>,
    pub cardholder: CardholderData,
    #[serde(with = "base64_bytes")]
    pub private_do_1: Vec<u8>,
    #[serde(with = "base64_bytes")]
    pub private_do_2: Vec<u8>,
    #[serde(with = "base64_bytes")]
    pub private_do_3: Vec<u8>,
    #[serde(with = "base64_bytes")]
    pub private_do_4: Vec<u8>,
    pub pw_status: [u8; 4],
    pub pw1: PinRecord,
    pub pw3: PinRecord,
    pub rc: PinRecord,
    /// Slot count, default slot, policy flags
    pub config_slot: [u8; 3],
    pub default_rsa_exponent: u32,
    pub pin_mode: PinMode,
    pub slots: Vec<KeySlot>,
    #[serde(with = "base64_bytes")]
    pub sm_enc: Vec<u8>,
    #[serde(with = "base64_bytes")]
    pub sm_mac: Vec<u8>,
}

impl CardState {
    /// Fresh card in the given lifecycle state.
    ///
    /// A terminated card keeps only its identity: no PINs, no attributes.
    pub fn install(crypto: &dyn CryptoProvider, lifecycle: u8) -> Result<Self, CryptoError> {
        let mut aid = AID_PREFIX.to_vec();
        aid.extend(crypto.random_bytes(4)?);
        aid[13] &= !0x07;
        aid.extend_from_slice(&[0x00, 0x00]);

        let mut histo = DEFAULT_HISTO.to_vec();
        histo[HISTO_LIFECYCLE] = lifecycle;

        let activated = lifecycle == LIFECYCLE_ACTIVATED;
        let attributes: &[u8] = if activated { &DEFAULT_ATTRIBUTES } else { &[] };
        let slots = (0..SLOT_COUNT)
            .map(|i| {
                let mut serial = [aid[10], aid[11], aid[12], aid[13]];
                serial[3] |= i as u8;
                KeySlot::new(serial, attributes)
            })
            .collect();

        let mut state = Self {
            magic: MAGIC.to_vec(),
            aid,
            histo,
            cardholder: CardholderData::default(),
            private_do_1: Vec::new(),
            private_do_2: Vec::new(),
            private_do_3: Vec::new(),
            private_do_4: Vec::new(),
            pw_status: [0; 4],
            pw1: PinRecord::default(),
            pw3: PinRecord::default(),
            rc: PinRecord::default(),
            config_slot: [0; 3],
            default_rsa_exponent: 0,
            pin_mode: PinMode::Host,
            slots,
            sm_enc: Vec::new(),
            sm_mac: Vec::new(),
        };

        if activated {
            state.cardholder.sex = 0x39;
            state.pw1 = PinRecord::new(crypto, DEFAULT_PW1);
            state.pw3 = PinRecord::new(crypto, DEFAULT_PW3);
            let max = MAX_PIN_LENGTH as u8;
            state.pw_status = [0x01, max, max, max];
            state.config_slot = [SLOT_COUNT as u8, 0, 3];
            state.default_rsa_exponent = DEFAULT_RSA_EXPONENT;
            state.pin_mode = PinMode::Confirm;
        }
        Ok(state)
    }

    pub fn is_installed(&self) -> bool {
        self.magic == MAGIC && self.slots.len() == SLOT_COUNT
    }

    pub fn lifecycle(&self) -> u8 {
        self.histo.get(HISTO_LIFECYCLE).copied().unwrap_or(0)
    }

    pub fn is_terminated(&self) -> bool {
        self.lifecycle() == LIFECYCLE_TERMINATED
    }

    pub fn pin(&self, id: PinId) -> &PinRecord {
        match id {
            PinId::Pw1 => &self.pw1,
            PinId::Pw3 => &self.pw3,
            PinId::Rc => &self.rc,
        }
    }

    pub fn pin_mut(&mut self, id: PinId) -> &mut PinRecord {
        match id {
            PinId::Pw1 => &mut self.pw1,
            PinId::Pw3 => &mut self.pw3,
            PinId::Rc => &mut self.rc,
        }
    }

    /// Private use object 1..=4
    pub fn private_do(&self, index: usize) -> &[u8] {
        match index {
            1 => &self.private_do_1,
            2 => &self.private_do_2,
            3 => &self.private_do_3,
            _ => &self.private_do_4,
        }
    }

    pub fn private_do_mut(&mut self, index: usize) -> &mut Vec<u8> {
        match index {
            1 => &mut self.private_do_1,
            2 => &mut self.private_do_2,
            3 => &mut self.private_do_3,
            _ => &mut self.private_do_4,
        }
    }

    /// AID as reported while `slot` is active: bytes 10..14 carry the
    /// slot's serial number.
    pub fn slot_aid(&self, slot: usize) -> Vec<u8> {
        let mut aid = self.aid.clone();
        if let (Some(keys), Some(serial)) = (self.slots.get(slot), aid.get_mut(10..14)) {
            serial.copy_from_slice(&keys.serial);
        }
        aid
    }

    /// C4: PW status bytes followed by the PW1, RC and PW3 counters
    pub fn pw_status_bytes(&self) -> Vec<u8> {
        let mut out = self.pw_status.to_vec();
        out.extend_from_slice(&[self.pw1.counter, self.rc.counter, self.pw3.counter]);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::SoftwareProvider;

    fn provider() -> SoftwareProvider {
        SoftwareProvider::new(vec![7u8; 32])
    }

    #[test]
    fn test_install_defaults() {
        let state = CardState::install(&provider(), LIFECYCLE_ACTIVATED).unwrap();
        assert!(state.is_installed());
        assert!(!state.is_terminated());
        assert_eq!(&state.aid[..10], &AID_PREFIX);
        assert_eq!(state.aid.len(), 16);
        assert_eq!(state.aid[13] & 0x07, 0);
        assert_eq!(&state.aid[14..], &[0, 0]);
        assert_eq!(state.histo[HISTO_LIFECYCLE], LIFECYCLE_ACTIVATED);
        assert_eq!(state.pw_status, [0x01, 12, 12, 12]);
        assert_eq!(state.config_slot, [3, 0, 3]);
        assert_eq!(state.cardholder.sex, 0x39);
        assert_eq!(state.pw1.length, 6);
        assert_eq!(state.pw3.length, 8);
        assert_eq!(state.pw_status_bytes(), vec![0x01, 12, 12, 12, 3, 0, 3]);
        for slot in &state.slots {
            for role in KeyRole::ALL {
                assert_eq!(slot.key(role).attributes, DEFAULT_ATTRIBUTES.to_vec());
                assert!(slot.key(role).material.is_empty());
            }
        }
    }

    #[test]
    fn test_slot_serials() {
        let state = CardState::install(&provider(), LIFECYCLE_ACTIVATED).unwrap();
        let aids: Vec<Vec<u8>> = (0..SLOT_COUNT).map(|slot| state.slot_aid(slot)).collect();
        assert_eq!(aids[0], state.aid);
        for (slot, aid) in aids.iter().enumerate() {
            assert_eq!(&aid[..10], &state.aid[..10]);
            assert_eq!(&aid[10..13], &state.aid[10..13]);
            assert_eq!(aid[13] & 0x07, slot as u8);
            assert_eq!(&aid[14..], &[0, 0]);
        }
    }

    #[test]
    fn test_install_terminated_is_blank() {
        let state = CardState::install(&provider(), LIFECYCLE_TERMINATED).unwrap();
        assert!(state.is_terminated());
        assert!(state.pw3.is_blocked());
        assert!(!state.pw1.is_set());
        assert!(state.slots[0].sig.attributes.is_empty());
    }

    #[test]
    fn test_default_pin_hash() {
        let record = PinRecord::new(&provider(), DEFAULT_PW1);
        assert_eq!(
            hex::encode(&record.hash),
            "8d969eef6ecad3c29a3a629280e686cf0c3f5d5a86aff3ca12020c923adc6c92"
        );
    }

    #[test]
    fn test_material_must_match_attributes() {
        let mut key = Key::with_attributes(&DEFAULT_ATTRIBUTES);
        key.material = KeyMaterial::Rsa(RsaKey {
            n: vec![0xFF; 128],
            ..RsaKey::default()
        });
        // 1024-bit material under RSA-2048 attributes
        assert!(key.usable_material().is_none());

        key.material = KeyMaterial::Rsa(RsaKey {
            n: vec![0xFF; 256],
            ..RsaKey::default()
        });
        assert!(key.usable_material().is_some());
    }

    #[test]
    fn test_serialization_round_trip() {
        let mut state = CardState::install(&provider(), LIFECYCLE_ACTIVATED).unwrap();
        state.slots[1].dec.material = KeyMaterial::Ecc(EccKey {
            curve: Curve::Curve25519,
            private: vec![1; 32],
            public: vec![2; 32],
        });
        state.cardholder.name = b"Doe<<John".to_vec();
        let json = serde_json::to_string(&state).unwrap();
        assert!(json.contains("\"kind\":\"ecc\""));
        let parsed: CardState = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, state);
    }
}
