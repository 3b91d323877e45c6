//! APDU Response handling
//!
//! A reply is the response data followed by the two status bytes.

use super::status::SW;
use crate::error::CardError;

/// A card response: data plus SW1/SW2.
///
/// # Example
/// ```ignore
/// let response = Response::success(vec![0x01, 0x02]);
/// assert!(response.is_okay());
/// assert_eq!(response.to_bytes(), vec![0x01, 0x02, 0x90, 0x00]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Response data (without status words)
    pub data: Vec<u8>,
    pub sw1: u8,
    pub sw2: u8,
}

impl Response {
    pub fn new(data: Vec<u8>, sw: u16) -> Self {
        Self {
            data,
            sw1: (sw >> 8) as u8,
            sw2: sw as u8,
        }
    }

    /// Success (0x9000) with data
    pub fn success(data: Vec<u8>) -> Self {
        Self::new(data, SW::SUCCESS)
    }

    /// Empty success (0x9000)
    pub fn ok() -> Self {
        Self::success(Vec::new())
    }

    /// Error response, never carries data
    pub fn error(sw: u16) -> Self {
        Self::new(Vec::new(), sw)
    }

    /// PIN counter warning (0x63Cx)
    pub fn counter_warning(retries: u8) -> Self {
        Self::error(SW::counter_warning(retries))
    }

    /// True for 0x9000 and 0x61xx
    pub fn is_okay(&self) -> bool {
        SW::is_success(self.sw())
    }

    pub fn sw(&self) -> u16 {
        ((self.sw1 as u16) << 8) | (self.sw2 as u16)
    }

    /// Serialize as `data ‖ SW1 ‖ SW2`
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut result = Vec::with_capacity(self.data.len() + 2);
        result.extend_from_slice(&self.data);
        result.push(self.sw1);
        result.push(self.sw2);
        result
    }

    /// Split a raw reply frame back into a response.
    pub fn from_bytes(frame: &[u8]) -> Option<Self> {
        if frame.len() < 2 {
            return None;
        }
        let split = frame.len() - 2;
        Some(Self {
            data: frame[..split].to_vec(),
            sw1: frame[split],
            sw2: frame[split + 1],
        })
    }
}

impl Default for Response {
    fn default() -> Self {
        Self::ok()
    }
}

impl From<u16> for Response {
    fn from(sw: u16) -> Self {
        Self::error(sw)
    }
}

impl From<CardError> for Response {
    fn from(err: CardError) -> Self {
        Self::error(err.sw())
    }
}
