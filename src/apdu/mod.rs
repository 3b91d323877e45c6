//! APDU (Application Protocol Data Unit) handling
//!
//! Flat structs and functions for ISO 7816-4 command and response APDUs,
//! plus the instruction, class and PSO constants understood by the card.
//!
//! # Example
//! ```ignore
//! use gpgcard::apdu::{parse_apdu, Response};
//!
//! let raw = &[0x00, 0x20, 0x00, 0x81, 0x06, 0x31, 0x32, 0x33, 0x34, 0x35, 0x36];
//! let apdu = parse_apdu(raw).unwrap();
//! assert_eq!(apdu.ins, 0x20);
//! assert_eq!(apdu.lc(), 6);
//! ```

mod response;
mod status;

pub use response::Response;
pub use status::SW;

use thiserror::Error;

/// Errors that can occur during APDU parsing
#[derive(Debug, Error, PartialEq, Eq)]
pub enum APDUError {
    #[error("APDU too short: expected at least 4 bytes, got {0}")]
    TooShort(usize),

    #[error("Lc does not match the command body length")]
    InvalidLength,

    #[error("Invalid extended APDU format")]
    InvalidExtendedFormat,
}

/// A parsed APDU command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct APDU {
    /// Class byte (CLA)
    pub cla: u8,
    /// Instruction byte (INS)
    pub ins: u8,
    /// Parameter 1 (P1)
    pub p1: u8,
    /// Parameter 2 (P2)
    pub p2: u8,
    /// Command data (may be empty)
    pub data: Vec<u8>,
    /// Expected response length (Le), None if not specified
    pub le: Option<u32>,
}

impl APDU {
    /// Create a new APDU with just the header (CLA, INS, P1, P2)
    pub fn new(cla: u8, ins: u8, p1: u8, p2: u8) -> Self {
        Self {
            cla,
            ins,
            p1,
            p2,
            data: Vec::new(),
            le: None,
        }
    }

    /// Create a new APDU with data
    pub fn with_data(cla: u8, ins: u8, p1: u8, p2: u8, data: Vec<u8>) -> Self {
        Self {
            data,
            ..Self::new(cla, ins, p1, p2)
        }
    }

    /// Check if this is a chained APDU (CLA bit 4 set)
    pub fn is_chained(&self) -> bool {
        (self.cla & cla::CHAINING_BIT) != 0
    }

    /// Get P1-P2 combined as a u16 (tag for DATA commands, operation for PSO)
    pub fn p1p2(&self) -> u16 {
        ((self.p1 as u16) << 8) | (self.p2 as u16)
    }

    /// Length of the command data field
    pub fn lc(&self) -> usize {
        self.data.len()
    }

    /// Header identity used to match chained fragments: CLA without the
    /// chaining bit, INS, P1 and P2.
    pub fn chain_key(&self) -> (u8, u8, u8, u8) {
        (self.cla & !cla::CHAINING_BIT, self.ins, self.p1, self.p2)
    }

    /// Encode the command, short form when it fits, extended otherwise.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut raw = vec![self.cla, self.ins, self.p1, self.p2];
        let short = self.data.len() <= 0xFF && self.le.map_or(true, |le| le <= 0x100);
        if short {
            if !self.data.is_empty() {
                raw.push(self.data.len() as u8);
                raw.extend_from_slice(&self.data);
            }
            if let Some(le) = self.le {
                raw.push(le as u8);
            }
        } else {
            raw.push(0x00);
            if !self.data.is_empty() {
                raw.extend_from_slice(&(self.data.len() as u16).to_be_bytes());
                raw.extend_from_slice(&self.data);
            }
            if let Some(le) = self.le {
                raw.extend_from_slice(&(le as u16).to_be_bytes());
            }
        }
        raw
    }
}

/// Parse raw bytes into an APDU
///
/// Supports both short and extended APDU formats:
/// - Short: CLA INS P1 P2 [Lc Data] [Le]
/// - Extended: CLA INS P1 P2 00 [Lc1 Lc2 Data] [Le1 Le2]
pub fn parse_apdu(raw: &[u8]) -> Result<APDU, APDUError> {
    if raw.len() < 4 {
        return Err(APDUError::TooShort(raw.len()));
    }

    let mut apdu = APDU::new(raw[0], raw[1], raw[2], raw[3]);
    let body = &raw[4..];

    match body.len() {
        0 => {}
        1 => apdu.le = Some(short_le(body[0])),
        // A short Lc is never zero, so a leading zero introduces the extended form
        n if body[0] == 0x00 && n >= 3 => parse_extended_body(&mut apdu, &body[1..])?,
        _ => parse_short_body(&mut apdu, body)?,
    }

    Ok(apdu)
}

fn short_le(byte: u8) -> u32 {
    if byte == 0 {
        0x100
    } else {
        byte as u32
    }
}

fn extended_le(word: u16) -> u32 {
    if word == 0 {
        0x10000
    } else {
        word as u32
    }
}

fn parse_short_body(apdu: &mut APDU, body: &[u8]) -> Result<(), APDUError> {
    let lc = body[0] as usize;
    if lc == 0 {
        return Err(APDUError::InvalidLength);
    }
    match body.len().checked_sub(1 + lc) {
        Some(0) => {}
        Some(1) => apdu.le = Some(short_le(body[1 + lc])),
        _ => return Err(APDUError::InvalidLength),
    }
    apdu.data = body[1..1 + lc].to_vec();
    Ok(())
}

fn parse_extended_body(apdu: &mut APDU, body: &[u8]) -> Result<(), APDUError> {
    let word = u16::from_be_bytes([body[0], body[1]]);

    // Case 2E: extended Le only
    if body.len() == 2 {
        apdu.le = Some(extended_le(word));
        return Ok(());
    }

    let lc = word as usize;
    if lc == 0 {
        return Err(APDUError::InvalidExtendedFormat);
    }
    match body.len().checked_sub(2 + lc) {
        Some(0) => {}
        Some(2) => {
            let le = u16::from_be_bytes([body[2 + lc], body[3 + lc]]);
            apdu.le = Some(extended_le(le));
        }
        _ => return Err(APDUError::InvalidExtendedFormat),
    }
    apdu.data = body[2..2 + lc].to_vec();
    Ok(())
}

/// Class bytes accepted by the card
pub mod cla {
    pub const PLAIN: u8 = 0x00;
    pub const CHAINED: u8 = 0x10;
    /// On-device PIN entry variant of VERIFY
    pub const PIN_OPERATION: u8 = 0xEF;

    pub const CHAINING_BIT: u8 = 0x10;

    pub fn is_supported(cla: u8) -> bool {
        matches!(cla, PLAIN | CHAINED | PIN_OPERATION)
    }
}

/// OpenPGP Instruction bytes
pub mod ins {
    pub const SELECT: u8 = 0xA4;
    pub const SELECT_DATA: u8 = 0xA5;
    pub const GET_DATA: u8 = 0xCA;
    pub const GET_NEXT_DATA: u8 = 0xCC;
    pub const VERIFY: u8 = 0x20;
    pub const CHANGE_REFERENCE_DATA: u8 = 0x24;
    pub const RESET_RETRY_COUNTER: u8 = 0x2C;
    pub const PUT_DATA: u8 = 0xDA;
    pub const PUT_DATA_ODD: u8 = 0xDB;
    pub const GENERATE_ASYMMETRIC_KEY_PAIR: u8 = 0x47;
    pub const PSO: u8 = 0x2A;
    pub const INTERNAL_AUTHENTICATE: u8 = 0x88;
    pub const MSE: u8 = 0x22;
    pub const GET_CHALLENGE: u8 = 0x84;
    pub const GET_RESPONSE: u8 = 0xC0;
    pub const TERMINATE_DF: u8 = 0xE6;
    pub const ACTIVATE_FILE: u8 = 0x44;
}

/// PSO (Perform Security Operation) P1-P2 values
pub mod pso {
    /// Compute Digital Signature (P1=0x9E, P2=0x9A)
    pub const CDS: u16 = 0x9E9A;
    /// Decipher (P1=0x80, P2=0x86)
    pub const DECIPHER: u16 = 0x8086;
    /// Encipher (P1=0x86, P2=0x80)
    pub const ENCIPHER: u16 = 0x8680;
}
