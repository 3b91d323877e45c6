//! Security State for OpenPGP card
//!
//! Tracks which PIN references have been verified in the current session.
//! PW1 appears twice: once for signing (81) and once for decryption and
//! authentication (82), both checked against the same PW1 record.

use crate::card::PinId;

/// PIN references a session can hold verified
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecurityCondition {
    /// PW1 verified for signing (81)
    Pw1Sign,
    /// PW1 verified for decryption and authentication (82)
    Pw1Other,
    /// Admin PIN (83)
    Pw3,
    /// Resetting code
    ResetCode,
}

impl SecurityCondition {
    /// Reference named by a VERIFY / CHANGE REFERENCE DATA P2
    pub fn from_reference(p2: u8) -> Option<Self> {
        match p2 {
            0x81 => Some(SecurityCondition::Pw1Sign),
            0x82 => Some(SecurityCondition::Pw1Other),
            0x83 => Some(SecurityCondition::Pw3),
            _ => None,
        }
    }

    /// Stored record the reference is checked against
    pub fn pin(self) -> PinId {
        match self {
            SecurityCondition::Pw1Sign | SecurityCondition::Pw1Other => PinId::Pw1,
            SecurityCondition::Pw3 => PinId::Pw3,
            SecurityCondition::ResetCode => PinId::Rc,
        }
    }

    // Slot in the verified bitmap, 0 is unused
    fn index(self) -> usize {
        match self {
            SecurityCondition::Pw1Sign => 1,
            SecurityCondition::Pw1Other => 2,
            SecurityCondition::Pw3 => 3,
            SecurityCondition::ResetCode => 4,
        }
    }
}

/// Verified bitmap of the current session
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SecurityState {
    verified: [bool; 5],
}

impl SecurityState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_verified(&mut self, condition: SecurityCondition) {
        self.verified[condition.index()] = true;
    }

    pub fn is_verified(&self, condition: SecurityCondition) -> bool {
        self.verified[condition.index()]
    }

    pub fn clear(&mut self, condition: SecurityCondition) {
        self.verified[condition.index()] = false;
    }

    /// Clear all security conditions (first SELECT, power cycle, reinstall)
    pub fn clear_all(&mut self) {
        self.verified = [false; 5];
    }

    /// Called after a signature. PW1 for signing stays verified only when
    /// PW status byte 0 allows several signatures per verification.
    pub fn after_sign(&mut self, pw1_valid_multiple: u8) {
        if pw1_valid_multiple == 0 {
            self.clear(SecurityCondition::Pw1Sign);
        }
    }
}
