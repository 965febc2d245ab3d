//! Request ARC Initiation / Termination: ask the audio system to open or
//! close the Audio Return Channel and wait for it to confirm.

use crate::action::{ActionContext, ControlResult, FeatureAction, LocalEvent, RequestToken};
use crate::error::ClientError;
use rustcec_core::types::{DeviceType, LogicalAddress, Opcode};
use rustcec_core::CecMessage;
use rustcec_link::SendResult;
use std::time::Duration;

/// Which way the Audio Return Channel should go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ArcDirection {
    Initiation,
    Termination,
}

impl ArcDirection {
    pub fn request(self, source: LogicalAddress, avr: LogicalAddress) -> CecMessage {
        match self {
            Self::Initiation => CecMessage::request_arc_initiation(source, avr),
            Self::Termination => CecMessage::request_arc_termination(source, avr),
        }
    }

    pub const fn request_opcode(self) -> Opcode {
        match self {
            Self::Initiation => Opcode::RequestArcInitiation,
            Self::Termination => Opcode::RequestArcTermination,
        }
    }

    /// The message the audio system answers with when it complies.
    pub const fn confirmation_opcode(self) -> Opcode {
        match self {
            Self::Initiation => Opcode::InitiateArc,
            Self::Termination => Opcode::TerminateArc,
        }
    }

    /// Local state reverted when the request fails.
    pub const fn rollback(self) -> LocalEvent {
        match self {
            Self::Initiation => LocalEvent::ArcDisabled,
            Self::Termination => LocalEvent::ArcTransmissionDisabled,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ArcConfig {
    pub response_timeout: Duration,
    /// Re-sends after a timeout before giving up.
    pub request_retries: u32,
}

impl Default for ArcConfig {
    fn default() -> Self {
        Self {
            response_timeout: Duration::from_millis(2000),
            request_retries: 0,
        }
    }
}

impl ArcConfig {
    pub fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = timeout;
        self
    }

    pub fn with_request_retries(mut self, retries: u32) -> Self {
        self.request_retries = retries;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    WaitingForRequestArcResponse,
    Finished,
}

type ArcCallback = Box<dyn FnOnce(ControlResult) + Send>;

/// One ARC request to the audio system, in either direction.
pub struct RequestArcAction {
    direction: ArcDirection,
    source: LogicalAddress,
    avr: LogicalAddress,
    config: ArcConfig,
    state: State,
    send_token: Option<RequestToken>,
    pending_timer: Option<RequestToken>,
    resends: u32,
    callback: Option<ArcCallback>,
}

impl RequestArcAction {
    pub const INITIATION_NAME: &'static str = "RequestArcInitiationAction";
    pub const TERMINATION_NAME: &'static str = "RequestArcTerminationAction";

    pub fn is_arc_action(name: &str) -> bool {
        name == Self::INITIATION_NAME || name == Self::TERMINATION_NAME
    }

    /// Fails unless `source` is the TV and `avr` the audio system.
    pub fn new(
        direction: ArcDirection,
        source: LogicalAddress,
        avr: LogicalAddress,
        config: ArcConfig,
        callback: impl FnOnce(ControlResult) + Send + 'static,
    ) -> Result<Self, ClientError> {
        if source != LogicalAddress::Tv {
            return Err(ClientError::InvalidAddressType {
                address: source,
                expected: DeviceType::Tv,
            });
        }
        if avr != LogicalAddress::AudioSystem {
            return Err(ClientError::InvalidAddressType {
                address: avr,
                expected: DeviceType::AudioSystem,
            });
        }
        Ok(Self {
            direction,
            source,
            avr,
            config,
            state: State::Idle,
            send_token: None,
            pending_timer: None,
            resends: 0,
            callback: Some(Box::new(callback)),
        })
    }

    fn send_request(&mut self, ctx: &mut ActionContext<'_>) {
        self.pending_timer = Some(ctx.arm_timer(self.config.response_timeout));
        self.send_token = Some(ctx.send_command(self.direction.request(self.source, self.avr)));
    }

    fn fail(&mut self, ctx: &mut ActionContext<'_>) {
        ctx.notify(self.direction.rollback());
        self.finish_with(ctx, ControlResult::TargetNotAvailable);
    }

    fn finish_with(&mut self, ctx: &mut ActionContext<'_>, result: ControlResult) {
        if self.pending_timer.take().is_some() {
            ctx.clear_timer();
        }
        self.send_token = None;
        self.state = State::Finished;
        log::debug!("arc {:?} with {}: {result:?}", self.direction, self.avr);
        if let Some(callback) = self.callback.take() {
            callback(result);
        }
    }
}

impl FeatureAction for RequestArcAction {
    fn name(&self) -> &'static str {
        match self.direction {
            ArcDirection::Initiation => Self::INITIATION_NAME,
            ArcDirection::Termination => Self::TERMINATION_NAME,
        }
    }

    fn start(&mut self, ctx: &mut ActionContext<'_>) {
        self.state = State::WaitingForRequestArcResponse;
        self.send_request(ctx);
    }

    fn handle_send_result(
        &mut self,
        ctx: &mut ActionContext<'_>,
        token: RequestToken,
        result: SendResult,
    ) {
        if self.state != State::WaitingForRequestArcResponse || self.send_token != Some(token) {
            return;
        }
        if !result.is_success() {
            log::warn!(
                "arc {:?}: sending {:?} to {} failed ({result:?})",
                self.direction,
                self.direction.request_opcode(),
                self.avr
            );
            self.fail(ctx);
        }
    }

    fn process_command(&mut self, ctx: &mut ActionContext<'_>, message: &CecMessage) -> bool {
        if self.state != State::WaitingForRequestArcResponse {
            return false;
        }
        if message.source != self.avr {
            log::warn!(
                "arc {:?}: ignoring {message}, expected source {}",
                self.direction,
                self.avr
            );
            return false;
        }
        if message.is_feature_abort_of(self.direction.request_opcode()) {
            log::warn!(
                "arc {:?}: {} refused the request ({:?})",
                self.direction,
                self.avr,
                message.abort_reason()
            );
            self.fail(ctx);
            return true;
        }
        if message.has_opcode(self.direction.confirmation_opcode()) {
            self.finish_with(ctx, ControlResult::Success);
            // The TV still has to act on the confirmation itself.
            return false;
        }
        false
    }

    fn handle_timer_event(&mut self, ctx: &mut ActionContext<'_>, token: RequestToken) {
        if self.state != State::WaitingForRequestArcResponse || self.pending_timer != Some(token) {
            return;
        }
        self.pending_timer = None;
        if self.resends < self.config.request_retries {
            self.resends += 1;
            log::debug!(
                "arc {:?}: no answer from {}, re-sending ({}/{})",
                self.direction,
                self.avr,
                self.resends,
                self.config.request_retries
            );
            self.send_request(ctx);
            return;
        }
        self.fail(ctx);
    }

    fn finish(&mut self, ctx: &mut ActionContext<'_>) {
        if self.pending_timer.take().is_some() {
            ctx.clear_timer();
        }
        self.send_token = None;
        self.state = State::Finished;
    }

    fn is_finished(&self) -> bool {
        self.state == State::Finished
    }
}
