//! The contract between feature actions and the controller that drives them.
//!
//! Actions never touch the link or a clock. Each entry point receives an
//! [`ActionContext`] and records what it wants done as [`Effect`]s; the
//! controller performs them and reports completion back through tokens.

use crate::cache::MessageCache;
use crate::local_device::{LocalDevice, PortId};
use rustcec_core::types::{DeviceType, LogicalAddress, Opcode, PhysicalAddress};
use rustcec_core::CecMessage;
use rustcec_link::SendResult;
use std::time::Duration;

/// Identifies one timer, transmission or poll issued by an action.
///
/// Tokens are never reused within a controller, so a late event carrying an
/// old token can be told apart from the one an action is waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestToken(u64);

/// Monotonic [`RequestToken`] allocator.
#[derive(Debug, Default)]
pub struct TokenSource {
    next: u64,
}

impl TokenSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_token(&mut self) -> RequestToken {
        self.next += 1;
        RequestToken(self.next)
    }
}

/// Side effects on the local device reported by an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalEvent {
    /// A device's place in the topology became known.
    SwitchInfoUpdated {
        logical_address: LogicalAddress,
        device_type: DeviceType,
        physical_address: PhysicalAddress,
    },
    ArcDisabled,
    ArcTransmissionDisabled,
    /// Messages held back during discovery may now be processed.
    BufferedCommandsReleased,
}

/// Which addresses a poll covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollStrategy {
    /// Every device address except the local one.
    RemoteDevices,
    /// Only the audio system.
    SystemAudio,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOrder {
    Ascending,
    Reverse,
}

/// A request to probe which logical addresses acknowledge a polling message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollRequest {
    pub source: LogicalAddress,
    pub candidates: Vec<LogicalAddress>,
    /// Attempts per candidate before it counts as absent; at least one.
    pub attempts: u32,
}

impl PollRequest {
    pub fn new(
        local: &LocalDevice,
        strategy: PollStrategy,
        order: PollOrder,
        attempts: u32,
    ) -> Self {
        let me = local.logical_address;
        let wanted = |address: &LogicalAddress| match strategy {
            PollStrategy::RemoteDevices => *address != me,
            PollStrategy::SystemAudio => *address == LogicalAddress::AudioSystem && *address != me,
        };
        let candidates = match order {
            PollOrder::Ascending => LogicalAddress::device_addresses().filter(wanted).collect(),
            PollOrder::Reverse => LogicalAddress::device_addresses()
                .rev()
                .filter(wanted)
                .collect(),
        };
        Self {
            source: me,
            candidates,
            attempts: attempts.max(1),
        }
    }
}

/// Outcome reported to an ARC request's caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ControlResult {
    Success,
    TargetNotAvailable,
}

/// Work an action asks the controller to perform.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Send {
        token: RequestToken,
        message: CecMessage,
    },
    /// Replaces the action's pending timer, if any.
    ArmTimer {
        token: RequestToken,
        delay: Duration,
    },
    ClearTimer,
    Poll {
        token: RequestToken,
        request: PollRequest,
    },
    Local(LocalEvent),
}

/// Read access to controller state plus an effect sink, lent to an action
/// for the duration of one call.
pub struct ActionContext<'a> {
    local: &'a LocalDevice,
    cache: &'a MessageCache,
    tokens: &'a mut TokenSource,
    effects: Vec<Effect>,
}

impl<'a> ActionContext<'a> {
    pub fn new(
        local: &'a LocalDevice,
        cache: &'a MessageCache,
        tokens: &'a mut TokenSource,
    ) -> Self {
        Self {
            local,
            cache,
            tokens,
            effects: Vec::new(),
        }
    }

    pub fn local_device(&self) -> &LocalDevice {
        self.local
    }

    pub fn port_id(&self, physical_address: PhysicalAddress) -> Option<PortId> {
        self.local.port_id(physical_address)
    }

    pub fn cached_message(&self, address: LogicalAddress, opcode: Opcode) -> Option<CecMessage> {
        self.cache.get(address, opcode).copied()
    }

    /// Queues `message` for transmission. The result arrives through
    /// [`FeatureAction::handle_send_result`] under the returned token.
    pub fn send_command(&mut self, message: CecMessage) -> RequestToken {
        let token = self.tokens.next_token();
        self.effects.push(Effect::Send { token, message });
        token
    }

    pub fn arm_timer(&mut self, delay: Duration) -> RequestToken {
        let token = self.tokens.next_token();
        self.effects.push(Effect::ArmTimer { token, delay });
        token
    }

    pub fn clear_timer(&mut self) {
        self.effects.push(Effect::ClearTimer);
    }

    pub fn poll_devices(&mut self, request: PollRequest) -> RequestToken {
        let token = self.tokens.next_token();
        self.effects.push(Effect::Poll { token, request });
        token
    }

    pub fn notify(&mut self, event: LocalEvent) {
        self.effects.push(Effect::Local(event));
    }

    pub fn into_effects(self) -> Vec<Effect> {
        self.effects
    }
}

/// A protocol procedure running on behalf of the local device.
pub trait FeatureAction: Send {
    fn name(&self) -> &'static str;

    fn start(&mut self, ctx: &mut ActionContext<'_>);

    /// Offers an inbound message. Returns `true` when the action consumed it
    /// and the local device should not process it further.
    fn process_command(&mut self, ctx: &mut ActionContext<'_>, message: &CecMessage) -> bool;

    fn handle_timer_event(&mut self, ctx: &mut ActionContext<'_>, token: RequestToken);

    fn handle_send_result(
        &mut self,
        _ctx: &mut ActionContext<'_>,
        _token: RequestToken,
        _result: SendResult,
    ) {
    }

    fn handle_poll_result(
        &mut self,
        _ctx: &mut ActionContext<'_>,
        _token: RequestToken,
        _acked: &[LogicalAddress],
    ) {
    }

    /// Cancels the action without reporting a result.
    fn finish(&mut self, ctx: &mut ActionContext<'_>);

    fn is_finished(&self) -> bool;

    /// Whether unrelated messages should be buffered while this action runs.
    fn defers_local_processing(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rustcec_core::types::PhysicalAddress;

    #[test]
    fn tokens_are_monotonic() {
        let mut tokens = TokenSource::new();
        let a = tokens.next_token();
        let b = tokens.next_token();
        assert!(b > a);
        assert_ne!(a, b);
    }

    #[test]
    fn remote_poll_skips_local_address_in_reverse() {
        let tv = LocalDevice::tv();
        let request = PollRequest::new(&tv, PollStrategy::RemoteDevices, PollOrder::Reverse, 0);
        assert_eq!(request.attempts, 1);
        assert_eq!(request.candidates.len(), 14);
        assert_eq!(request.candidates.first(), Some(&LogicalAddress::SpecificUse));
        assert_eq!(request.candidates.last(), Some(&LogicalAddress::Recorder1));
        assert!(!request.candidates.contains(&LogicalAddress::Tv));
    }

    #[test]
    fn system_audio_poll_targets_audio_system() {
        let player = LocalDevice::source(LogicalAddress::Playback1, PhysicalAddress::new(0x1000));
        let request = PollRequest::new(&player, PollStrategy::SystemAudio, PollOrder::Ascending, 2);
        assert_eq!(request.candidates, vec![LogicalAddress::AudioSystem]);
        assert_eq!(request.attempts, 2);
    }

    #[test]
    fn context_collects_effects_in_order() {
        let tv = LocalDevice::tv();
        let cache = MessageCache::new();
        let mut tokens = TokenSource::new();
        let mut ctx = ActionContext::new(&tv, &cache, &mut tokens);

        let timer = ctx.arm_timer(Duration::from_millis(5));
        let send = ctx.send_command(CecMessage::give_osd_name(
            LogicalAddress::Tv,
            LogicalAddress::Playback1,
        ));
        ctx.notify(LocalEvent::ArcDisabled);

        let effects = ctx.into_effects();
        assert_eq!(effects.len(), 3);
        assert!(matches!(effects[0], Effect::ArmTimer { token, .. } if token == timer));
        assert!(matches!(effects[1], Effect::Send { token, .. } if token == send));
        assert_eq!(effects[2], Effect::Local(LocalEvent::ArcDisabled));
    }
}
