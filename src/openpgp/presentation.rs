//! User-facing collaborator
//!
//! Confirmations and on-device PIN entry happen outside the engine. The
//! engine announces what it needs through [`Presentation`], suspends the
//! command, and continues once the host hands back an [`Outcome`].

use log::debug;

use super::security_state::SecurityCondition;
use crate::card::KeyRole;

/// What the user is asked for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Prompt {
    /// Confirm one use of a key whose UIF is set
    ConfirmKeyUse(KeyRole),
    /// Confirm the verification of a PIN typed on the host
    ConfirmPin(SecurityCondition),
    /// Type a PIN on the device
    EnterPin(SecurityCondition),
}

/// Answer to a prompt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Confirmed,
    Denied,
    /// PIN entered on the device
    Pin(Vec<u8>),
}

pub trait Presentation {
    fn request_confirmation(&mut self, prompt: &Prompt);

    fn request_pin_entry(&mut self, reference: SecurityCondition);

    /// Block until the user answers. Used by the transport loop, which
    /// has no other way to wait.
    fn await_outcome(&mut self, _prompt: &Prompt) -> Outcome {
        Outcome::Denied
    }
}

/// Presentation without a user: every request is logged and denied
#[derive(Debug, Default, Clone, Copy)]
pub struct NullPresentation;

impl Presentation for NullPresentation {
    fn request_confirmation(&mut self, prompt: &Prompt) {
        debug!("No presentation for {:?}", prompt);
    }

    fn request_pin_entry(&mut self, reference: SecurityCondition) {
        debug!("No presentation for PIN entry of {:?}", reference);
    }
}
