//! GET CHALLENGE
//!
//! Random bytes for the host. Non-standard P1 bits ask for a length in P2,
//! a value derived from the master seed instead of the RNG, or the next
//! prime above the result.

use log::debug;

use super::applet::{Flow, OpenPGPApplet};
use crate::apdu::{APDU, SW};
use crate::card::MAX_CHALLENGE_LENGTH;
use crate::crypto::seed::{CHALLENGE_INDEX, SEED_PURPOSE};
use crate::error::{fail, CardResult};

/// P1 flag: length is in P2 rather than Le
const LENGTH_IN_P2: u8 = 0x80;
/// P1 flags: derive from the seed and the command data
const SEEDED: u8 = 0x82;
/// P1 flags: return the next prime
const PRIME: u8 = 0x81;

impl OpenPGPApplet {
    /// Handle GET CHALLENGE command
    pub(crate) fn handle_get_challenge(&mut self, cmd: &APDU) -> CardResult<Flow> {
        let len = if cmd.p1 & LENGTH_IN_P2 != 0 {
            cmd.p2 as usize
        } else {
            cmd.le.unwrap_or(0) as usize
        };
        if len == 0 || len > MAX_CHALLENGE_LENGTH {
            return fail(SW::WRONG_LENGTH);
        }

        let mut challenge = if cmd.p1 & SEEDED == SEEDED {
            let mut input = self.crypto.derive_seed(&[SEED_PURPOSE, CHALLENGE_INDEX])?.to_vec();
            input.extend_from_slice(b"rnd");
            input.extend_from_slice(&cmd.data);
            let digest = self.crypto.sha256(&input);
            self.crypto.shake256(&digest, len)
        } else {
            self.crypto.random_bytes(len)?
        };
        if cmd.p1 & PRIME == PRIME {
            challenge = self.crypto.rsa_next_prime(&challenge);
        }

        debug!("Challenge of {} bytes (P1={:02X})", challenge.len(), cmd.p1);
        self.reply(&challenge)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::seed::bip32_derive;
    use crate::crypto::{CryptoProvider, SoftwareProvider};
    use crate::openpgp::testing::{applet, run, select};

    fn challenge(p1: u8, p2: u8, le: Option<u32>, data: &[u8]) -> APDU {
        let mut cmd = APDU::with_data(0x00, 0x84, p1, p2, data.to_vec());
        cmd.le = le;
        cmd
    }

    #[test]
    fn test_random_challenge() {
        let mut card = applet();
        select(&mut card);
        let first = run(&mut card, challenge(0x00, 0x00, Some(16), &[]));
        assert_eq!(first.sw(), SW::SUCCESS);
        assert_eq!(first.data.len(), 16);
        assert_ne!(run(&mut card, challenge(0x00, 0x00, Some(16), &[])).data, first.data);
    }

    #[test]
    fn test_lengths() {
        let mut card = applet();
        select(&mut card);
        assert_eq!(run(&mut card, challenge(0x00, 0x00, None, &[])).sw(), SW::WRONG_LENGTH);
        assert_eq!(run(&mut card, challenge(0x00, 0x00, Some(255), &[])).sw(), SW::WRONG_LENGTH);
        assert_eq!(run(&mut card, challenge(0x80, 0x00, Some(8), &[])).sw(), SW::WRONG_LENGTH);
        assert_eq!(run(&mut card, challenge(0x80, 0xFE, None, &[])).data.len(), 254);
    }

    #[test]
    fn test_seeded_challenge() {
        let mut card = applet();
        select(&mut card);
        let first = run(&mut card, challenge(0x82, 0x20, None, b"label"));
        assert_eq!(first.data.len(), 32);
        assert_eq!(run(&mut card, challenge(0x82, 0x20, None, b"label")).data, first.data);
        assert_ne!(run(&mut card, challenge(0x82, 0x20, None, b"other")).data, first.data);
    }

    #[test]
    fn test_seeded_challenge_value() {
        let provider = SoftwareProvider::new(vec![0x42; 32]);
        let mut input = bip32_derive(&[0x42; 32], &[SEED_PURPOSE, CHALLENGE_INDEX])
            .unwrap()
            .to_vec();
        input.extend_from_slice(b"rndlabel");
        let expected = provider.shake256(&provider.sha256(&input), 32);

        let mut card = applet();
        select(&mut card);
        let got = run(&mut card, challenge(0x82, 0x20, None, b"label"));
        assert_eq!(got.sw(), SW::SUCCESS);
        assert_eq!(got.data, expected);
    }

    #[test]
    fn test_seeded_prime() {
        let mut card = applet();
        select(&mut card);
        let prime = run(&mut card, challenge(0x83, 0x10, None, b"p"));
        assert_eq!(prime.sw(), SW::SUCCESS);
        // Odd, and stable for the same input
        assert_eq!(prime.data.last().map(|b| b & 1), Some(1));
        assert_eq!(run(&mut card, challenge(0x83, 0x10, None, b"p")).data, prime.data);
    }
}
