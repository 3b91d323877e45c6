//! TLV (Tag-Length-Value) encoding and decoding
//!
//! BER-TLV as used by the OpenPGP card data objects, plus the tag space the
//! card understands.
//!
//! # Example
//! ```ignore
//! use gpgcard::tlv::{read_list, TLVBuilder};
//!
//! let data = TLVBuilder::new().add(0x5B, b"Doe<<John").wrap(0x65).build();
//! let tlvs = read_list(&data, true);
//! assert_eq!(tlvs[0].find(0x5B).unwrap().value, b"Doe<<John");
//! ```

mod encoder;
mod parser;

pub use encoder::{TLVBuilder, TLVEncoder};
pub use parser::{parse_length, parse_tag, read_list, read_single, TLVError, TLV};

/// Render bytes as spaced hex for log lines
pub fn hexify(value: &[u8]) -> String {
    value.iter().map(|b| format!("{:02X}", b)).collect::<Vec<_>>().join(" ")
}

/// OpenPGP card data object tags
pub mod tags {
    // Private use DOs
    pub const PRIVATE_DO_1: u16 = 0x0101;
    pub const PRIVATE_DO_2: u16 = 0x0102;
    pub const PRIVATE_DO_3: u16 = 0x0103;
    pub const PRIVATE_DO_4: u16 = 0x0104;

    // Slot configuration (vendor extension)
    pub const SLOT_INFO: u16 = 0x01F0;
    pub const SLOT_CONFIG: u16 = 0x01F1;
    pub const SLOT_SELECT: u16 = 0x01F2;

    // Application identification
    pub const AID: u16 = 0x004F;
    pub const HISTORICAL_BYTES: u16 = 0x5F52;
    pub const EXTENDED_LENGTH_INFO: u16 = 0x7F66;

    // Cardholder data
    pub const CARDHOLDER_RELATED_DATA: u16 = 0x0065;
    pub const NAME: u16 = 0x005B;
    pub const LANGUAGE: u16 = 0x5F2D;
    pub const SEX: u16 = 0x5F35;
    pub const LOGIN_DATA: u16 = 0x005E;
    pub const URL: u16 = 0x5F50;

    // Application related data
    pub const APPLICATION_RELATED_DATA: u16 = 0x006E;
    pub const DISCRETIONARY_DOS: u16 = 0x0073;
    pub const EXTENDED_CAPABILITIES: u16 = 0x00C0;
    pub const ALGORITHM_ATTRIBUTES_SIG: u16 = 0x00C1;
    pub const ALGORITHM_ATTRIBUTES_DEC: u16 = 0x00C2;
    pub const ALGORITHM_ATTRIBUTES_AUT: u16 = 0x00C3;
    pub const PW_STATUS_BYTES: u16 = 0x00C4;
    pub const FINGERPRINTS: u16 = 0x00C5;
    pub const CA_FINGERPRINTS: u16 = 0x00C6;
    pub const FINGERPRINT_SIG: u16 = 0x00C7;
    pub const FINGERPRINT_DEC: u16 = 0x00C8;
    pub const FINGERPRINT_AUT: u16 = 0x00C9;
    pub const CA_FINGERPRINT_1: u16 = 0x00CA;
    pub const CA_FINGERPRINT_2: u16 = 0x00CB;
    pub const CA_FINGERPRINT_3: u16 = 0x00CC;
    pub const KEY_TIMESTAMPS: u16 = 0x00CD;
    pub const TIMESTAMP_SIG: u16 = 0x00CE;
    pub const TIMESTAMP_DEC: u16 = 0x00CF;
    pub const TIMESTAMP_AUT: u16 = 0x00D0;

    // Symmetric keys and resetting code
    pub const AES_KEY_DEC: u16 = 0x00D1;
    pub const AES_KEY_DEC_ALT: u16 = 0x00D2;
    pub const RESET_CODE: u16 = 0x00D3;
    pub const AES_KEY_ENC_DEC: u16 = 0x00D5;
    pub const SM_KEYS: u16 = 0x00F4;

    // UIF (User Interaction Flag)
    pub const UIF_SIG: u16 = 0x00D6;
    pub const UIF_DEC: u16 = 0x00D7;
    pub const UIF_AUT: u16 = 0x00D8;

    // Security support template
    pub const SECURITY_SUPPORT_TEMPLATE: u16 = 0x007A;
    pub const DIGITAL_SIG_COUNTER: u16 = 0x0093;

    // Key data
    pub const CARDHOLDER_CERTIFICATE: u16 = 0x7F21;
    pub const PUBLIC_KEY_TEMPLATE: u16 = 0x7F49;
    pub const KEY_IMPORT: u16 = 0x3FFF;
    pub const EXTENDED_HEADER_LIST: u16 = 0x004D;
    pub const PRIVATE_KEY_TEMPLATE: u16 = 0x7F48;
    pub const CONCATENATED_KEY_DATA: u16 = 0x5F48;

    // CRT (Control Reference Template) tags, also the key export/import tags
    pub const CRT_SIG: u16 = 0x00B6;
    pub const CRT_DEC: u16 = 0x00B8;
    pub const CRT_AUT: u16 = 0x00A4;

    // Public key components (within 7F49)
    pub const RSA_MODULUS: u16 = 0x81;
    pub const RSA_EXPONENT: u16 = 0x82;
    pub const ECC_PUBLIC_KEY: u16 = 0x86;

    // Private key components (within 7F48)
    pub const RSA_PUBLIC_EXPONENT: u16 = 0x91;
    pub const RSA_PRIME_P: u16 = 0x92;
    pub const RSA_PRIME_Q: u16 = 0x93;
    pub const ECC_PRIVATE_KEY: u16 = 0x92;

    // SELECT DATA / MSE
    pub const TAG_LIST: u16 = 0x0060;
    pub const TAG_REFERENCE: u16 = 0x005C;
    pub const KEY_REFERENCE: u16 = 0x0083;

    // Cipher DO prefix for PSO:DEC with ECDH
    pub const CIPHER_DO: u16 = 0x00A6;
}
