//! Access conditions
//!
//! Which PIN an instruction needs, and which PIN guards reading or writing
//! each data object. The applet evaluates the conditions against the
//! session before a handler runs.

use crate::apdu::{ins, pso, APDU, SW};
use crate::tlv::tags;

/// Access conditions for instructions and data objects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessCondition {
    Always,
    /// PW1 verified for signing (81)
    Pw1Sign,
    /// PW1 verified for decryption / authentication (82)
    Pw1Other,
    /// Either PW1 reference
    Pw1Any,
    Pw3,
    /// PW3 verified, or PW3 blocked so a locked-out card can still be reset
    Pw3OrBlocked,
}

impl AccessCondition {
    /// Status word answered when the condition does not hold
    pub fn denied_status(self) -> u16 {
        match self {
            AccessCondition::Pw3OrBlocked => SW::CONDITIONS_NOT_SATISFIED,
            _ => SW::SECURITY_STATUS_NOT_SATISFIED,
        }
    }
}

/// Condition for running an instruction at all
pub fn instruction_access(cmd: &APDU) -> AccessCondition {
    match cmd.ins {
        ins::GENERATE_ASYMMETRIC_KEY_PAIR => {
            if cmd.p1 == 0x81 {
                AccessCondition::Always
            } else {
                AccessCondition::Pw3
            }
        }
        ins::PSO => match cmd.p1p2() {
            pso::CDS => AccessCondition::Pw1Sign,
            pso::DECIPHER | pso::ENCIPHER => AccessCondition::Pw1Other,
            _ => AccessCondition::Pw1Any,
        },
        ins::INTERNAL_AUTHENTICATE => AccessCondition::Pw1Other,
        ins::TERMINATE_DF => AccessCondition::Pw3OrBlocked,
        _ => AccessCondition::Always,
    }
}

/// Condition for GET DATA / GET NEXT DATA on `tag`.
///
/// Tags outside the table are left to the handler, which answers
/// referenced-data-not-found.
pub fn read_access(tag: u16) -> AccessCondition {
    match tag {
        tags::PRIVATE_DO_3 => AccessCondition::Pw1Any,
        tags::PRIVATE_DO_4 => AccessCondition::Pw3,
        tags::CRT_SIG | tags::CRT_DEC | tags::CRT_AUT => AccessCondition::Pw3,
        _ => AccessCondition::Always,
    }
}

/// Condition for PUT DATA on `tag`
pub fn write_access(tag: u16) -> AccessCondition {
    match tag {
        tags::PRIVATE_DO_1 | tags::PRIVATE_DO_3 | tags::SLOT_SELECT => AccessCondition::Pw1Any,
        _ => AccessCondition::Pw3,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_read_is_free() {
        let read = APDU::with_data(0x00, 0x47, 0x81, 0x00, vec![0xB6, 0x00]);
        let generate = APDU::with_data(0x00, 0x47, 0x80, 0x00, vec![0xB6, 0x00]);
        assert_eq!(instruction_access(&read), AccessCondition::Always);
        assert_eq!(instruction_access(&generate), AccessCondition::Pw3);
    }

    #[test]
    fn test_pso_references() {
        let cds = APDU::new(0x00, 0x2A, 0x9E, 0x9A);
        let dec = APDU::new(0x00, 0x2A, 0x80, 0x86);
        let enc = APDU::new(0x00, 0x2A, 0x86, 0x80);
        assert_eq!(instruction_access(&cds), AccessCondition::Pw1Sign);
        assert_eq!(instruction_access(&dec), AccessCondition::Pw1Other);
        assert_eq!(instruction_access(&enc), AccessCondition::Pw1Other);
        assert_eq!(
            instruction_access(&APDU::new(0x00, 0x88, 0x00, 0x00)),
            AccessCondition::Pw1Other
        );
    }

    #[test]
    fn test_terminate_denial_status() {
        let cond = instruction_access(&APDU::new(0x00, 0xE6, 0x00, 0x00));
        assert_eq!(cond, AccessCondition::Pw3OrBlocked);
        assert_eq!(cond.denied_status(), SW::CONDITIONS_NOT_SATISFIED);
        assert_eq!(AccessCondition::Pw3.denied_status(), SW::SECURITY_STATUS_NOT_SATISFIED);
    }

    #[test]
    fn test_data_object_tables() {
        assert_eq!(read_access(tags::PRIVATE_DO_1), AccessCondition::Always);
        assert_eq!(read_access(tags::PRIVATE_DO_3), AccessCondition::Pw1Any);
        assert_eq!(read_access(tags::PRIVATE_DO_4), AccessCondition::Pw3);
        assert_eq!(read_access(tags::CRT_DEC), AccessCondition::Pw3);
        assert_eq!(read_access(tags::APPLICATION_RELATED_DATA), AccessCondition::Always);

        assert_eq!(write_access(tags::PRIVATE_DO_1), AccessCondition::Pw1Any);
        assert_eq!(write_access(tags::PRIVATE_DO_2), AccessCondition::Pw3);
        assert_eq!(write_access(tags::SLOT_SELECT), AccessCondition::Pw1Any);
        assert_eq!(write_access(tags::NAME), AccessCondition::Pw3);
        assert_eq!(write_access(tags::KEY_IMPORT), AccessCondition::Pw3);
    }
}
