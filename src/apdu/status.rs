//! Status Word (SW) constants for APDU responses
//!
//! ISO 7816-4 and OpenPGP card status words returned by the engine.

/// Status Word constants
#[allow(dead_code)]
pub struct SW;

#[allow(dead_code)]
impl SW {
    // Success
    pub const SUCCESS: u16 = 0x9000;

    // Warnings
    pub const STATE_TERMINATED: u16 = 0x6285;

    // Execution errors
    pub const MEMORY_FAILURE: u16 = 0x6581;

    // Checking errors
    pub const WRONG_LENGTH: u16 = 0x6700;

    pub const SECURITY_STATUS_NOT_SATISFIED: u16 = 0x6982;
    pub const AUTH_METHOD_BLOCKED: u16 = 0x6983;
    pub const REFERENCE_DATA_NOT_USABLE: u16 = 0x6984;
    pub const CONDITIONS_NOT_SATISFIED: u16 = 0x6985;
    pub const COMMAND_NOT_ALLOWED: u16 = 0x6986;

    pub const WRONG_DATA: u16 = 0x6A80;
    pub const FILE_NOT_FOUND: u16 = 0x6A82;
    pub const RECORD_NOT_FOUND: u16 = 0x6A83;
    pub const NOT_ENOUGH_MEMORY: u16 = 0x6A84;
    pub const INCORRECT_P1_P2: u16 = 0x6A86;
    pub const REFERENCED_DATA_NOT_FOUND: u16 = 0x6A88;

    pub const WRONG_P1_P2: u16 = 0x6B00;

    pub const INS_NOT_SUPPORTED: u16 = 0x6D00;
    pub const CLA_NOT_SUPPORTED: u16 = 0x6E00;

    /// Provider-defined internal error
    pub const INTERNAL_ERROR: u16 = 0x6F42;

    /// Create a "more data available" status word (61xx)
    #[inline]
    pub fn bytes_remaining(remaining: u8) -> u16 {
        0x6100 | (remaining as u16)
    }

    /// Create a PIN counter warning (63Cx)
    #[inline]
    pub fn counter_warning(retries: u8) -> u16 {
        0x63C0 | ((retries & 0x0F) as u16)
    }

    /// Check if a status word indicates success (9000 or 61xx)
    #[inline]
    pub fn is_success(sw: u16) -> bool {
        sw == Self::SUCCESS || Self::is_more_data(sw)
    }

    #[inline]
    pub fn is_more_data(sw: u16) -> bool {
        (sw & 0xFF00) == 0x6100
    }

    #[inline]
    pub fn is_counter_warning(sw: u16) -> bool {
        (sw & 0xFFF0) == 0x63C0
    }

    /// Extract the retry count from a counter warning (63Cx)
    #[inline]
    pub fn get_retry_count(sw: u16) -> Option<u8> {
        if Self::is_counter_warning(sw) {
            Some((sw & 0x0F) as u8)
        } else {
            None
        }
    }
}
