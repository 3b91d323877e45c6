//! PIN Manager for OpenPGP card
//!
//! Handles PIN verification, change, and retry counter management. PINs are
//! kept as SHA-256 hashes. The retry counter is decremented and persisted
//! before the comparison, so a check that is interrupted still costs a try.

use log::{debug, info};

use super::access::AccessCondition;
use super::applet::{Flow, OpenPGPApplet};
use super::presentation::Prompt;
use super::security_state::SecurityCondition;
use crate::apdu::{cla, APDU, SW};
use crate::card::{PinId, PinMode, PinRecord, MAX_PIN_LENGTH, PIN_RETRIES};
use crate::error::{fail, CardError, CardResult};

/// Outcome of checking a candidate PIN against a stored record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinCheck {
    Verified,
    Mismatch { remaining: u8 },
    /// Counter already at zero, nothing compared
    Blocked,
}

impl PinCheck {
    /// `63Cn` while tries remain, `6983` once blocked
    pub fn into_result(self) -> CardResult<()> {
        match self {
            PinCheck::Verified => Ok(()),
            PinCheck::Mismatch { remaining: 0 } | PinCheck::Blocked => {
                fail(SW::AUTH_METHOD_BLOCKED)
            }
            PinCheck::Mismatch { remaining } => fail(SW::counter_warning(remaining)),
        }
    }
}

/// Minimum length of a new PIN
pub fn min_pin_length(id: PinId) -> usize {
    match id {
        PinId::Pw1 => 6,
        PinId::Pw3 | PinId::Rc => 8,
    }
}

pub fn is_valid_new_pin(id: PinId, pin: &[u8]) -> bool {
    (min_pin_length(id)..=MAX_PIN_LENGTH).contains(&pin.len())
}

impl OpenPGPApplet {
    /// Check `pin` against the stored record of `id`
    pub(crate) fn check_pin(&mut self, id: PinId, pin: &[u8]) -> CardResult<PinCheck> {
        if self.state.pin(id).is_blocked() {
            debug!("{:?} is blocked", id);
            return Ok(PinCheck::Blocked);
        }

        self.state.pin_mut(id).counter -= 1;
        self.commit()?;

        let hash = self.crypto.sha256(pin);
        let record = self.state.pin(id);
        if record.is_set() && record.hash[..] == hash[..] {
            self.state.pin_mut(id).counter = PIN_RETRIES;
            self.commit()?;
            Ok(PinCheck::Verified)
        } else {
            debug!("{:?} mismatch, {} tries left", id, record.counter);
            Ok(PinCheck::Mismatch {
                remaining: record.counter,
            })
        }
    }

    /// Handle VERIFY command
    pub(crate) fn handle_verify(&mut self, cmd: &APDU) -> CardResult<Flow> {
        let reference = SecurityCondition::from_reference(cmd.p2)
            .ok_or(CardError::Status(SW::INCORRECT_P1_P2))?;

        match cmd.p1 {
            0x00 => {}
            0xFF => {
                if !cmd.data.is_empty() {
                    return fail(SW::WRONG_LENGTH);
                }
                self.session.security.clear(reference);
                debug!("{:?} reset", reference);
                return self.done();
            }
            _ => return fail(SW::INCORRECT_P1_P2),
        }

        if cmd.data.is_empty() {
            if cmd.cla == cla::PIN_OPERATION {
                return self.request_verification(reference);
            }
            if self.session.security.is_verified(reference) {
                return self.done();
            }
            return fail(SW::counter_warning(self.state.pin(reference.pin()).counter));
        }

        self.verify_entered_pin(reference, &cmd.data)
    }

    /// Check a PIN typed on the host or on the device
    pub(crate) fn verify_entered_pin(
        &mut self,
        reference: SecurityCondition,
        pin: &[u8],
    ) -> CardResult<Flow> {
        self.session.security.clear(reference);
        self.check_pin(reference.pin(), pin)?.into_result()?;
        self.session.security.set_verified(reference);
        debug!("{:?} verified", reference);
        self.done()
    }

    // VERIFY without a PIN: the PIN mode decides who vouches for the user
    fn request_verification(&mut self, reference: SecurityCondition) -> CardResult<Flow> {
        if self.state.pin(reference.pin()).is_blocked() {
            return fail(SW::AUTH_METHOD_BLOCKED);
        }
        match self.state.pin_mode {
            PinMode::Screen => Ok(Flow::Pending(Prompt::EnterPin(reference))),
            PinMode::Confirm => Ok(Flow::Pending(Prompt::ConfirmPin(reference))),
            PinMode::Trust => {
                self.session.security.set_verified(reference);
                debug!("{:?} trusted", reference);
                self.done()
            }
            PinMode::Host => fail(SW::CONDITIONS_NOT_SATISFIED),
        }
    }

    /// Handle CHANGE REFERENCE DATA command
    pub(crate) fn handle_change_reference_data(&mut self, cmd: &APDU) -> CardResult<Flow> {
        let reference = match cmd.p2 {
            0x81 => SecurityCondition::Pw1Sign,
            0x83 => SecurityCondition::Pw3,
            _ => return fail(SW::INCORRECT_P1_P2),
        };
        self.session.security.clear(reference);

        let id = reference.pin();
        let current_len = (self.state.pin(id).length as usize).min(cmd.lc());
        let (current, new_pin) = cmd.data.split_at(current_len);
        self.check_pin(id, current)?.into_result()?;

        if !is_valid_new_pin(id, new_pin) {
            debug!("New {:?} of {} bytes refused", id, new_pin.len());
            return fail(SW::WRONG_DATA);
        }
        *self.state.pin_mut(id) = PinRecord::new(self.crypto.as_ref(), new_pin);
        self.commit()?;
        info!("{:?} changed", id);
        self.done()
    }

    /// Handle RESET RETRY COUNTER command
    pub(crate) fn handle_reset_retry_counter(&mut self, cmd: &APDU) -> CardResult<Flow> {
        if cmd.p2 != 0x81 || !(cmd.p1 == 0x00 || cmd.p1 == 0x02) {
            return fail(SW::INCORRECT_P1_P2);
        }

        let new_pin = if cmd.p1 == 0x02 {
            self.require(AccessCondition::Pw3)?;
            &cmd.data[..]
        } else {
            let rc = self.state.pin(PinId::Rc);
            if !rc.is_set() {
                return fail(SW::SECURITY_STATUS_NOT_SATISFIED);
            }
            let rc_len = (rc.length as usize).min(cmd.lc());
            let (code, new_pin) = cmd.data.split_at(rc_len);
            if self.check_pin(PinId::Rc, code)? != PinCheck::Verified {
                return fail(SW::SECURITY_STATUS_NOT_SATISFIED);
            }
            new_pin
        };

        if !is_valid_new_pin(PinId::Pw1, new_pin) {
            return fail(SW::WRONG_DATA);
        }
        self.state.pw1 = PinRecord::new(self.crypto.as_ref(), new_pin);
        self.commit()?;
        info!("PW1 reset");
        self.done()
    }
}
