//! OpenPGP Applet implementation
//!
//! Main dispatcher for OpenPGP card commands. The applet owns the card
//! record, the session and the collaborators; every command flows through
//! [`OpenPGPApplet::transmit`] (raw frames, chaining and chunking) or
//! [`OpenPGPApplet::execute`] (a complete command), and handlers live in the
//! sibling modules as further `impl OpenPGPApplet` blocks.

use log::{debug, info, warn};

use super::access::{instruction_access, AccessCondition};
use super::presentation::{NullPresentation, Outcome, Presentation, Prompt};
use super::security_state::SecurityCondition;
use super::session::{CommandHeader, SessionState};
use crate::apdu::{cla, ins, Response, APDU, SW};
use crate::card::{CardState, KeySlot, Persistence, LIFECYCLE_ACTIVATED, LIFECYCLE_TERMINATED};
use crate::config::{ConfigError, EngineConfig};
use crate::crypto::CryptoProvider;
use crate::error::{fail, CardError, CardResult};
use crate::io::{Channel, Inbound, IoCursor, IoError, Transport};

/// Result of running one command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Reply is in the IO buffer
    Complete,
    /// Suspended until the user answers the prompt
    Pending(Prompt),
}

/// Handle for resuming a suspended command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResumeToken(u64);

/// Answer to one raw command frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Exchange {
    /// Frame to send back to the host
    Reply(Vec<u8>),
    /// No reply yet; call [`OpenPGPApplet::resume`] with the token
    Pending(ResumeToken),
}

#[derive(Debug)]
struct PendingOperation {
    token: ResumeToken,
    command: APDU,
    prompt: Prompt,
}

/// OpenPGP Card Applet
pub struct OpenPGPApplet {
    pub(crate) state: CardState,
    store: Box<dyn Persistence>,
    pub(crate) crypto: Box<dyn CryptoProvider>,
    presentation: Box<dyn Presentation>,
    pub(crate) session: SessionState,
    pub(crate) io: IoCursor,
    channel: Channel,
    pending: Option<PendingOperation>,
    next_token: u64,
}

impl OpenPGPApplet {
    /// Load the card record, installing a fresh activated card when the
    /// store is empty or holds something else.
    pub fn new(
        mut store: Box<dyn Persistence>,
        crypto: Box<dyn CryptoProvider>,
        presentation: Box<dyn Presentation>,
    ) -> CardResult<Self> {
        let state = match store.load()? {
            Some(state) if state.is_installed() => state,
            _ => {
                let state = CardState::install(crypto.as_ref(), LIFECYCLE_ACTIVATED)?;
                store.commit(&state)?;
                info!("Installed card {}", hex::encode_upper(&state.aid));
                state
            }
        };
        let default_slot = Self::default_slot_of(&state);
        Ok(Self {
            state,
            store,
            crypto,
            presentation,
            session: SessionState::new(default_slot, false),
            io: IoCursor::new(),
            channel: Channel::new(),
            pending: None,
            next_token: 1,
        })
    }

    /// Applet over the file store and software provider named by `config`
    pub fn from_config(config: &EngineConfig) -> Result<Self, ConfigError> {
        let crypto = config.provider()?;
        let mut applet = Self::new(
            Box::new(config.store()),
            Box::new(crypto),
            Box::new(NullPresentation),
        )?;
        applet.session.seed_mode = config.seed_mode;
        Ok(applet)
    }

    /// Replace the presentation collaborator
    pub fn with_presentation(mut self, presentation: Box<dyn Presentation>) -> Self {
        self.presentation = presentation;
        self
    }

    fn default_slot_of(state: &CardState) -> usize {
        let slot = state.config_slot[1] as usize;
        if slot < state.slots.len() {
            slot
        } else {
            0
        }
    }

    pub fn state(&self) -> &CardState {
        &self.state
    }

    pub fn session(&self) -> &SessionState {
        &self.session
    }

    /// Prompt of the suspended command, if any
    pub fn pending_prompt(&self) -> Option<Prompt> {
        self.pending.as_ref().map(|p| p.prompt)
    }

    pub fn set_seed_mode(&mut self, enabled: bool) {
        self.session.seed_mode = enabled;
    }

    pub fn set_pin_mode(&mut self, mode: crate::card::PinMode) -> CardResult<()> {
        self.state.pin_mode = mode;
        self.commit()
    }

    /// Slot made active at power-up, switched to immediately
    pub fn set_default_slot(&mut self, slot: usize) -> CardResult<()> {
        if slot >= self.state.slots.len() {
            return fail(SW::WRONG_DATA);
        }
        self.state.config_slot[1] = slot as u8;
        self.session.switch_slot(slot);
        self.commit()
    }

    /// Wipe the card and start over with default PINs and no keys
    pub fn factory_reset(&mut self) -> CardResult<()> {
        self.state = CardState::install(self.crypto.as_ref(), LIFECYCLE_ACTIVATED)?;
        self.commit()?;
        self.reset();
        info!("Factory reset, new card {}", hex::encode_upper(&self.state.aid));
        Ok(())
    }

    /// Power cycle: the session is lost, the card record stays
    pub fn reset(&mut self) {
        let seed_mode = self.session.seed_mode;
        self.session = SessionState::new(Self::default_slot_of(&self.state), seed_mode);
        self.channel.reset();
        self.io.discard(true);
        self.pending = None;
    }

    // =========================================================================
    // Transport side
    // =========================================================================

    /// Feed one raw command frame.
    ///
    /// Chained fragments and GET RESPONSE are answered by the channel; a
    /// complete command runs and its reply is framed. Any pending operation
    /// is cancelled.
    pub fn transmit(&mut self, raw: &[u8]) -> Exchange {
        if let Some(pending) = self.pending.take() {
            debug!("Command received while {:?} pending, cancelled", pending.prompt);
        }

        let cmd = match self.channel.receive(raw) {
            Inbound::Reply(frame) => return Exchange::Reply(frame),
            Inbound::Command(cmd) => cmd,
        };

        match self.execute(&cmd) {
            Ok(Flow::Complete) => {
                let data = self.io.take();
                Exchange::Reply(self.channel.send(&Response::success(data)))
            }
            Ok(Flow::Pending(prompt)) => {
                self.io.discard(true);
                match prompt {
                    Prompt::EnterPin(reference) => self.presentation.request_pin_entry(reference),
                    _ => self.presentation.request_confirmation(&prompt),
                }
                let token = ResumeToken(self.next_token);
                self.next_token += 1;
                debug!("INS {:02X} suspended on {:?}", cmd.ins, prompt);
                self.pending = Some(PendingOperation {
                    token,
                    command: cmd,
                    prompt,
                });
                Exchange::Pending(token)
            }
            Err(err) => {
                self.io.discard(true);
                debug!("INS {:02X} failed: {}", cmd.ins, err);
                Exchange::Reply(self.channel.send(&Response::from(err)))
            }
        }
    }

    /// Finish a suspended command with the user's answer
    pub fn resume(&mut self, token: ResumeToken, outcome: Outcome) -> Vec<u8> {
        let pending = match self.pending.take() {
            Some(pending) if pending.token == token => pending,
            other => {
                debug!("Resume with unknown token {:?}", token);
                self.pending = other;
                return self.channel.send(&Response::error(SW::CONDITIONS_NOT_SATISFIED));
            }
        };

        let result = self.complete_pending(&pending, outcome);
        let response = match result {
            Ok(Flow::Complete) => Response::success(self.io.take()),
            Ok(Flow::Pending(prompt)) => {
                debug!("Resumed command asked again for {:?}", prompt);
                self.io.discard(true);
                Response::error(SW::CONDITIONS_NOT_SATISFIED)
            }
            Err(err) => {
                self.io.discard(true);
                debug!("Resumed INS {:02X} failed: {}", pending.command.ins, err);
                Response::from(err)
            }
        };
        self.channel.send(&response)
    }

    fn complete_pending(&mut self, pending: &PendingOperation, outcome: Outcome) -> CardResult<Flow> {
        match (pending.prompt, outcome) {
            (_, Outcome::Denied) => {
                debug!("User denied {:?}", pending.prompt);
                fail(SW::CONDITIONS_NOT_SATISFIED)
            }
            (Prompt::ConfirmKeyUse(role), Outcome::Confirmed) => {
                debug!("Use of {:?} key confirmed", role);
                self.session.uif_latch = true;
                let result = self.execute(&pending.command);
                self.session.uif_latch = false;
                result
            }
            (Prompt::ConfirmPin(reference), Outcome::Confirmed) => {
                self.session.security.set_verified(reference);
                self.done()
            }
            (Prompt::EnterPin(reference), Outcome::Pin(pin)) => {
                self.io.discard(true);
                self.verify_entered_pin(reference, &pin)
            }
            (prompt, outcome) => {
                debug!("Outcome {:?} does not answer {:?}", outcome, prompt);
                fail(SW::CONDITIONS_NOT_SATISFIED)
            }
        }
    }

    /// Drive a transport until the host goes away.
    ///
    /// Suspended commands are resolved by blocking on the presentation.
    pub fn serve<T: Transport>(&mut self, transport: &mut T) -> Result<(), IoError> {
        let mut reply = Vec::new();
        while let Some(raw) = transport.exchange(&reply)? {
            reply = match self.transmit(&raw) {
                Exchange::Reply(frame) => frame,
                Exchange::Pending(token) => {
                    let outcome = match self.pending_prompt() {
                        Some(prompt) => self.presentation.await_outcome(&prompt),
                        None => Outcome::Denied,
                    };
                    self.resume(token, outcome)
                }
            };
        }
        info!("Transport closed");
        Ok(())
    }

    // =========================================================================
    // Dispatch
    // =========================================================================

    /// Run one complete command; the reply, if any, is left in the IO buffer.
    pub(crate) fn execute(&mut self, cmd: &APDU) -> CardResult<Flow> {
        debug!(
            "APDU CLA={:02X} INS={:02X} P1={:02X} P2={:02X} Lc={}",
            cmd.cla,
            cmd.ins,
            cmd.p1,
            cmd.p2,
            cmd.lc()
        );
        if !cla::is_supported(cmd.cla) {
            return fail(SW::CLA_NOT_SUPPORTED);
        }
        self.session.header = Some(CommandHeader::from(cmd));
        self.io.load(&cmd.data)?;

        match cmd.ins {
            ins::ACTIVATE_FILE => return self.handle_activate(),
            ins::TERMINATE_DF => return self.handle_terminate(),
            _ => {}
        }

        if self.state.is_terminated() {
            debug!("Card terminated, INS {:02X} refused", cmd.ins);
            return fail(SW::STATE_TERMINATED);
        }

        self.require(instruction_access(cmd))?;

        match cmd.ins {
            ins::SELECT => self.handle_select(cmd),
            ins::SELECT_DATA => self.handle_select_data(cmd),
            ins::GET_DATA => self.handle_get_data(cmd),
            ins::GET_NEXT_DATA => self.handle_get_next_data(cmd),
            ins::PUT_DATA | ins::PUT_DATA_ODD => self.handle_put_data(cmd),
            ins::VERIFY => self.handle_verify(cmd),
            ins::CHANGE_REFERENCE_DATA => self.handle_change_reference_data(cmd),
            ins::RESET_RETRY_COUNTER => self.handle_reset_retry_counter(cmd),
            ins::GENERATE_ASYMMETRIC_KEY_PAIR => self.handle_generate_key(cmd),
            ins::PSO => self.handle_pso(cmd),
            ins::INTERNAL_AUTHENTICATE => self.handle_internal_authenticate(cmd),
            ins::MSE => self.handle_mse(cmd),
            ins::GET_CHALLENGE => self.handle_get_challenge(cmd),
            // The channel answers GET RESPONSE while chunks are pending
            ins::GET_RESPONSE => fail(SW::CONDITIONS_NOT_SATISFIED),
            _ => fail(SW::INS_NOT_SUPPORTED),
        }
    }

    /// Handle SELECT command
    fn handle_select(&mut self, cmd: &APDU) -> CardResult<Flow> {
        if cmd.p1 != 0x04 {
            return fail(SW::WRONG_P1_P2);
        }
        if cmd.data.len() < 6 || cmd.data[..6] != self.state.aid[..6] {
            debug!("SELECT of foreign AID {}", hex::encode_upper(&cmd.data));
            return fail(SW::FILE_NOT_FOUND);
        }

        self.session.reset_cursor();
        self.session.reset_mse();
        if !self.session.selected {
            self.session.security.clear_all();
            self.session.selected = true;
        }
        debug!("OpenPGP application selected, slot {}", self.session.slot);
        self.done()
    }

    /// Handle TERMINATE DF: the card forgets everything but its identity
    fn handle_terminate(&mut self) -> CardResult<Flow> {
        self.require(AccessCondition::Pw3OrBlocked)?;
        self.state = CardState::install(self.crypto.as_ref(), LIFECYCLE_TERMINATED)?;
        self.commit()?;
        self.reset();
        info!("Card terminated");
        self.done()
    }

    /// Handle ACTIVATE FILE: a terminated card is re-installed
    fn handle_activate(&mut self) -> CardResult<Flow> {
        if self.state.is_terminated() {
            self.state = CardState::install(self.crypto.as_ref(), LIFECYCLE_ACTIVATED)?;
            self.commit()?;
            self.reset();
            info!("Card activated, new card {}", hex::encode_upper(&self.state.aid));
        }
        self.done()
    }

    // =========================================================================
    // Helpers shared by the handlers
    // =========================================================================

    pub(crate) fn is_satisfied(&self, condition: AccessCondition) -> bool {
        let security = &self.session.security;
        match condition {
            AccessCondition::Always => true,
            AccessCondition::Pw1Sign => security.is_verified(SecurityCondition::Pw1Sign),
            AccessCondition::Pw1Other => security.is_verified(SecurityCondition::Pw1Other),
            AccessCondition::Pw1Any => {
                security.is_verified(SecurityCondition::Pw1Sign)
                    || security.is_verified(SecurityCondition::Pw1Other)
            }
            AccessCondition::Pw3 => security.is_verified(SecurityCondition::Pw3),
            AccessCondition::Pw3OrBlocked => {
                security.is_verified(SecurityCondition::Pw3) || self.state.pw3.is_blocked()
            }
        }
    }

    pub(crate) fn require(&self, condition: AccessCondition) -> CardResult<()> {
        if self.is_satisfied(condition) {
            Ok(())
        } else {
            debug!("Access condition {:?} not satisfied", condition);
            fail(condition.denied_status())
        }
    }

    /// Persist the whole card record
    pub(crate) fn commit(&mut self) -> CardResult<()> {
        self.store.commit(&self.state).map_err(|e| {
            warn!("Failed to persist card state: {}", e);
            CardError::from(e)
        })
    }

    /// Active key slot
    pub(crate) fn slot(&self) -> &KeySlot {
        &self.state.slots[self.session.slot]
    }

    pub(crate) fn slot_mut(&mut self) -> &mut KeySlot {
        &mut self.state.slots[self.session.slot]
    }

    /// Finish with an empty reply
    pub(crate) fn done(&mut self) -> CardResult<Flow> {
        self.io.discard(true);
        Ok(Flow::Complete)
    }

    /// Replace the IO buffer with `data` as the reply
    pub(crate) fn reply(&mut self, data: &[u8]) -> CardResult<Flow> {
        self.io.discard(true);
        self.io.insert(data)?;
        Ok(Flow::Complete)
    }
}
