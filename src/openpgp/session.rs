//! Volatile session state
//!
//! Everything the card forgets on power loss: the active slot, the keys
//! selected by MSE, verified PINs, the data object cursor and the
//! confirmation latch.

use super::security_state::SecurityState;
use crate::apdu::APDU;
use crate::card::KeyRole;

/// Position of GET DATA / GET NEXT DATA browsing
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DoCursor {
    pub tag: u16,
    pub record: u8,
    pub offset: usize,
}

/// Header of the command being processed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandHeader {
    pub cla: u8,
    pub ins: u8,
    pub p1: u8,
    pub p2: u8,
    pub lc: usize,
    pub le: Option<u32>,
}

impl From<&APDU> for CommandHeader {
    fn from(cmd: &APDU) -> Self {
        Self {
            cla: cmd.cla,
            ins: cmd.ins,
            p1: cmd.p1,
            p2: cmd.p2,
            lc: cmd.lc(),
            le: cmd.le,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionState {
    /// Active key slot
    pub slot: usize,
    /// Key used by PSO:DEC
    pub mse_dec: KeyRole,
    /// Key used by INTERNAL AUTHENTICATE
    pub mse_aut: KeyRole,
    pub security: SecurityState,
    pub cursor: DoCursor,
    /// Set while a confirmed operation is re-run
    pub uif_latch: bool,
    /// Derive generated keys from the slot seed even for P2=00
    pub seed_mode: bool,
    /// Set by the first SELECT of the session
    pub selected: bool,
    pub header: Option<CommandHeader>,
}

impl SessionState {
    pub fn new(slot: usize, seed_mode: bool) -> Self {
        Self {
            slot,
            mse_dec: KeyRole::Dec,
            mse_aut: KeyRole::Aut,
            security: SecurityState::new(),
            cursor: DoCursor::default(),
            uif_latch: false,
            seed_mode,
            selected: false,
            header: None,
        }
    }

    pub fn reset_mse(&mut self) {
        self.mse_dec = KeyRole::Dec;
        self.mse_aut = KeyRole::Aut;
    }

    /// Make `slot` active; MSE choices do not carry over.
    pub fn switch_slot(&mut self, slot: usize) {
        self.slot = slot;
        self.reset_mse();
    }

    pub fn reset_cursor(&mut self) {
        self.cursor = DoCursor::default();
    }
}
