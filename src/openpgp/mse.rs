//! MANAGE SECURITY ENVIRONMENT
//!
//! Lets the host swap which key serves PSO:DECIPHER and INTERNAL
//! AUTHENTICATE. The choice lasts for the session and is dropped on SELECT
//! or slot change.

use log::debug;

use super::applet::{Flow, OpenPGPApplet};
use crate::apdu::{APDU, SW};
use crate::card::KeyRole;
use crate::error::{fail, CardResult};
use crate::tlv::tags;

const SET_FOR_COMPUTATION: u8 = 0x41;

impl OpenPGPApplet {
    /// Handle MANAGE SECURITY ENVIRONMENT command
    pub(crate) fn handle_mse(&mut self, cmd: &APDU) -> CardResult<Flow> {
        let template = cmd.p2 as u16;
        if cmd.p1 != SET_FOR_COMPUTATION || !(template == tags::CRT_AUT || template == tags::CRT_DEC) {
            return fail(SW::INCORRECT_P1_P2);
        }

        let role = match cmd.data[..] {
            [0x83, 0x01, 0x02] => KeyRole::Dec,
            [0x83, 0x01, 0x03] => KeyRole::Aut,
            _ => return fail(SW::WRONG_DATA),
        };

        if template == tags::CRT_AUT {
            self.session.mse_aut = role;
        } else {
            self.session.mse_dec = role;
        }
        debug!("MSE {:02X}: {:?} key selected", cmd.p2, role);
        self.done()
    }
}
