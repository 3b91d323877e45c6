//! Command chaining and response chunking
//!
//! Both are small state machines advanced exactly once per transport round
//! trip. A chained command is acknowledged fragment by fragment until the
//! last one arrives; a reply longer than [`MAX_OUT`] is sent in chunks
//! trailed by `61 xx`, each released by a GET RESPONSE.

use log::debug;

use super::cursor::IO_BUFFER_LENGTH;
use crate::apdu::{cla, ins, parse_apdu, Response, APDU, SW};

/// Largest frame (data and status word) sent in one exchange
pub const MAX_OUT: usize = 0xFE;

/// Outcome of feeding one raw command to the channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// Answered by the channel itself, send as-is
    Reply(Vec<u8>),
    /// A complete command for the dispatcher
    Command(APDU),
}

#[derive(Debug, Default)]
pub struct Channel {
    chain: Option<APDU>,
    outgoing: Vec<u8>,
}

fn status_frame(sw: u16) -> Vec<u8> {
    sw.to_be_bytes().to_vec()
}

impl Channel {
    pub fn new() -> Self {
        Self::default()
    }

    /// True while a chained command is being accumulated
    pub fn is_chaining(&self) -> bool {
        self.chain.is_some()
    }

    /// True while reply chunks are waiting for GET RESPONSE
    pub fn has_pending_reply(&self) -> bool {
        !self.outgoing.is_empty()
    }

    pub fn reset(&mut self) {
        self.chain = None;
        self.outgoing.clear();
    }

    pub fn receive(&mut self, raw: &[u8]) -> Inbound {
        let apdu = match parse_apdu(raw) {
            Ok(apdu) => apdu,
            Err(e) => {
                debug!("Malformed command: {}", e);
                self.reset();
                return Inbound::Reply(status_frame(SW::WRONG_LENGTH));
            }
        };

        if self.has_pending_reply() {
            if apdu.ins == ins::GET_RESPONSE && apdu.p1 == 0 && apdu.p2 == 0 {
                return Inbound::Reply(self.next_chunk());
            }
            debug!("INS {:02X} while reply chunks pending, dropping reply", apdu.ins);
            self.outgoing.clear();
            return Inbound::Reply(status_frame(SW::COMMAND_NOT_ALLOWED));
        }

        if !cla::is_supported(apdu.cla) {
            self.chain = None;
            return Inbound::Reply(status_frame(SW::CLA_NOT_SUPPORTED));
        }

        let head = match self.chain.take() {
            Some(mut head) => {
                if head.chain_key() != apdu.chain_key() {
                    debug!(
                        "Chained fragment {:02X?} does not match {:02X?}, chain abandoned",
                        apdu.chain_key(),
                        head.chain_key()
                    );
                    return Inbound::Reply(status_frame(SW::COMMAND_NOT_ALLOWED));
                }
                head.data.extend_from_slice(&apdu.data);
                head.cla = apdu.cla;
                head.le = apdu.le;
                head
            }
            None => apdu,
        };

        if head.data.len() > IO_BUFFER_LENGTH {
            debug!("Command payload of {} bytes exceeds the buffer", head.data.len());
            return Inbound::Reply(status_frame(SW::WRONG_LENGTH));
        }

        if head.is_chained() {
            debug!("Chaining INS {:02X}: {} bytes so far", head.ins, head.data.len());
            self.chain = Some(head);
            return Inbound::Reply(status_frame(SW::SUCCESS));
        }
        Inbound::Command(head)
    }

    /// Frame a reply, returning the first chunk and keeping the rest.
    pub fn send(&mut self, response: &Response) -> Vec<u8> {
        self.outgoing = response.to_bytes();
        self.next_chunk()
    }

    fn next_chunk(&mut self) -> Vec<u8> {
        if self.outgoing.len() <= MAX_OUT {
            return std::mem::take(&mut self.outgoing);
        }
        let rest = self.outgoing.split_off(MAX_OUT - 2);
        let mut chunk = std::mem::replace(&mut self.outgoing, rest);
        // The remaining frame still carries the final status word
        let pending = (self.outgoing.len() - 2).min(MAX_OUT - 2);
        chunk.extend_from_slice(&SW::bytes_remaining(pending as u8).to_be_bytes());
        chunk
    }
}
