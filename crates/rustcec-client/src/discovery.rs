//! Device discovery: poll the bus, then walk every responding address
//! through the identity queries one stage at a time.

use crate::action::{
    ActionContext, FeatureAction, LocalEvent, PollOrder, PollRequest, PollStrategy, RequestToken,
};
use crate::local_device::PortId;
use rustcec_core::types::{
    DeviceType, LogicalAddress, Opcode, PhysicalAddress, PowerStatus, VendorId,
};
use rustcec_core::CecMessage;
use std::fmt;
use std::time::Duration;

/// Receives the discovered devices once discovery completes.
pub type DiscoveryCallback = Box<dyn FnOnce(Vec<HdmiDeviceInfo>) + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryState {
    WaitingForDevicePolling,
    /// Settling delay between the poll and the first query.
    WaitingForDevices,
    WaitingForPhysicalAddress,
    WaitingForOsdName,
    WaitingForVendorId,
    WaitingForPower,
    Finished,
}

/// Discovery tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DiscoveryConfig {
    pub delay_period: Duration,
    pub query_timeout: Duration,
    /// Timeouts per query before the stage gives up on a device.
    pub retry_limit: u32,
    /// Polling attempts per logical address.
    pub poll_retries: u32,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            delay_period: Duration::ZERO,
            query_timeout: Duration::from_millis(2000),
            retry_limit: 5,
            poll_retries: 1,
        }
    }
}

impl DiscoveryConfig {
    pub fn with_delay_period(mut self, delay: Duration) -> Self {
        self.delay_period = delay;
        self
    }

    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = timeout;
        self
    }

    pub fn with_retry_limit(mut self, limit: u32) -> Self {
        self.retry_limit = limit;
        self
    }

    pub fn with_poll_retries(mut self, retries: u32) -> Self {
        self.poll_retries = retries;
        self
    }
}

/// A device found by discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct HdmiDeviceInfo {
    pub logical_address: LogicalAddress,
    pub physical_address: PhysicalAddress,
    pub port_id: Option<PortId>,
    pub device_type: DeviceType,
    pub vendor_id: VendorId,
    pub display_name: String,
    pub power_status: PowerStatus,
}

impl fmt::Display for HdmiDeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {:?} \"{}\" vendor={} power={:?}",
            self.logical_address,
            self.physical_address,
            self.device_type,
            self.display_name,
            self.vendor_id,
            self.power_status
        )?;
        if let Some(port) = self.port_id {
            write!(f, " port={port}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct DiscoveredDevice {
    logical_address: LogicalAddress,
    physical_address: Option<PhysicalAddress>,
    port_id: Option<PortId>,
    device_type: DeviceType,
    vendor_id: VendorId,
    display_name: String,
    power_status: PowerStatus,
}

impl DiscoveredDevice {
    fn new(logical_address: LogicalAddress) -> Self {
        Self {
            logical_address,
            physical_address: None,
            port_id: None,
            device_type: logical_address
                .primary_device_type()
                .unwrap_or(DeviceType::Reserved),
            vendor_id: VendorId::UNKNOWN,
            display_name: String::new(),
            power_status: PowerStatus::Unknown,
        }
    }

    fn into_info(self) -> HdmiDeviceInfo {
        HdmiDeviceInfo {
            logical_address: self.logical_address,
            physical_address: self.physical_address.unwrap_or(PhysicalAddress::INVALID),
            port_id: self.port_id,
            device_type: self.device_type,
            vendor_id: self.vendor_id,
            display_name: self.display_name,
            power_status: self.power_status,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    PhysicalAddress,
    OsdName,
    VendorId,
    Power,
}

impl Stage {
    const fn state(self) -> DiscoveryState {
        match self {
            Self::PhysicalAddress => DiscoveryState::WaitingForPhysicalAddress,
            Self::OsdName => DiscoveryState::WaitingForOsdName,
            Self::VendorId => DiscoveryState::WaitingForVendorId,
            Self::Power => DiscoveryState::WaitingForPower,
        }
    }

    const fn of(state: DiscoveryState) -> Option<Self> {
        match state {
            DiscoveryState::WaitingForPhysicalAddress => Some(Self::PhysicalAddress),
            DiscoveryState::WaitingForOsdName => Some(Self::OsdName),
            DiscoveryState::WaitingForVendorId => Some(Self::VendorId),
            DiscoveryState::WaitingForPower => Some(Self::Power),
            _ => None,
        }
    }

    const fn next(self) -> Option<Self> {
        match self {
            Self::PhysicalAddress => Some(Self::OsdName),
            Self::OsdName => Some(Self::VendorId),
            Self::VendorId => Some(Self::Power),
            Self::Power => None,
        }
    }

    fn query(self, source: LogicalAddress, destination: LogicalAddress) -> CecMessage {
        match self {
            Self::PhysicalAddress => CecMessage::give_physical_address(source, destination),
            Self::OsdName => CecMessage::give_osd_name(source, destination),
            Self::VendorId => CecMessage::give_device_vendor_id(source, destination),
            Self::Power => CecMessage::give_device_power_status(source, destination),
        }
    }

    const fn query_opcode(self) -> Opcode {
        match self {
            Self::PhysicalAddress => Opcode::GivePhysicalAddress,
            Self::OsdName => Opcode::GiveOsdName,
            Self::VendorId => Opcode::GiveDeviceVendorId,
            Self::Power => Opcode::GiveDevicePowerStatus,
        }
    }

    const fn response_opcode(self) -> Opcode {
        match self {
            Self::PhysicalAddress => Opcode::ReportPhysicalAddress,
            Self::OsdName => Opcode::SetOsdName,
            Self::VendorId => Opcode::DeviceVendorId,
            Self::Power => Opcode::ReportPowerStatus,
        }
    }

    const fn accepts_feature_abort(self) -> bool {
        !matches!(self, Self::PhysicalAddress)
    }

    /// Whether a device that never answers survives the stage.
    const fn keeps_silent_device(self) -> bool {
        matches!(self, Self::OsdName | Self::Power)
    }
}

enum QueryOutcome {
    /// A query is on the bus and the retry timer is armed.
    Pending,
    /// The current device was settled without waiting.
    Resolved,
}

/// Discovers the devices on the bus on behalf of the local device.
pub struct DeviceDiscoveryAction {
    config: DiscoveryConfig,
    state: DiscoveryState,
    devices: Vec<DiscoveredDevice>,
    processed: usize,
    retries: u32,
    poll_token: Option<RequestToken>,
    pending_timer: Option<RequestToken>,
    callback: Option<DiscoveryCallback>,
}

impl DeviceDiscoveryAction {
    pub const NAME: &'static str = "DeviceDiscoveryAction";

    pub fn new(
        config: DiscoveryConfig,
        callback: impl FnOnce(Vec<HdmiDeviceInfo>) + Send + 'static,
    ) -> Self {
        Self {
            config,
            state: DiscoveryState::WaitingForDevicePolling,
            devices: Vec::new(),
            processed: 0,
            retries: 0,
            poll_token: None,
            pending_timer: None,
            callback: Some(Box::new(callback)),
        }
    }

    pub fn state(&self) -> DiscoveryState {
        self.state
    }

    fn enter_stage(&mut self, ctx: &mut ActionContext<'_>, stage: Stage) {
        log::debug!(
            "discovery: entering {:?} for {} device(s)",
            stage.state(),
            self.devices.len()
        );
        self.state = stage.state();
        self.processed = 0;
        self.retries = 0;
        self.check_and_proceed_stage(ctx);
    }

    fn check_and_proceed_stage(&mut self, ctx: &mut ActionContext<'_>) {
        loop {
            if self.devices.is_empty() {
                self.wrap_up_and_finish(ctx);
                return;
            }
            let Some(stage) = Stage::of(self.state) else {
                return;
            };
            if self.processed >= self.devices.len() {
                match stage.next() {
                    Some(next) => {
                        log::debug!("discovery: {:?} -> {:?}", self.state, next.state());
                        self.state = next.state();
                        self.processed = 0;
                        self.retries = 0;
                        continue;
                    }
                    None => {
                        self.wrap_up_and_finish(ctx);
                        return;
                    }
                }
            }
            match self.send_query(ctx, stage) {
                QueryOutcome::Pending => return,
                QueryOutcome::Resolved => continue,
            }
        }
    }

    fn send_query(&mut self, ctx: &mut ActionContext<'_>, stage: Stage) -> QueryOutcome {
        let address = self.devices[self.processed].logical_address;
        if !address.is_valid_device_address() {
            self.processed += 1;
            self.retries = 0;
            return QueryOutcome::Resolved;
        }
        if let Some(cached) = ctx.cached_message(address, stage.response_opcode()) {
            if self.apply_response(ctx, stage, &cached) {
                return QueryOutcome::Resolved;
            }
        }
        self.send_current_query(ctx, stage, address);
        QueryOutcome::Pending
    }

    fn send_current_query(
        &mut self,
        ctx: &mut ActionContext<'_>,
        stage: Stage,
        address: LogicalAddress,
    ) {
        let source = ctx.local_device().logical_address;
        ctx.send_command(stage.query(source, address));
        self.pending_timer = Some(ctx.arm_timer(self.config.query_timeout));
    }

    /// Records a response (or accepted feature abort) for the device under
    /// the cursor and advances the cursor. Returns `false` when the message
    /// is not from that device or carries no usable payload.
    fn apply_response(
        &mut self,
        ctx: &mut ActionContext<'_>,
        stage: Stage,
        message: &CecMessage,
    ) -> bool {
        let Some(current) = self.devices.get_mut(self.processed) else {
            return false;
        };
        if current.logical_address != message.source {
            log::warn!(
                "discovery: unexpected {message} while waiting on {} in {:?}",
                current.logical_address,
                self.state
            );
            return false;
        }

        if stage.accepts_feature_abort() && message.is_feature_abort_of(stage.query_opcode()) {
            log::debug!(
                "discovery: {} rejected {:?}",
                current.logical_address,
                stage.query_opcode()
            );
        } else {
            match stage {
                Stage::PhysicalAddress => {
                    let (Some(physical_address), Some(device_type)) =
                        (message.physical_address(), message.reported_device_type())
                    else {
                        return false;
                    };
                    current.physical_address = Some(physical_address);
                    current.port_id = ctx.port_id(physical_address);
                    current.device_type = device_type;
                    if ctx.local_device().is_tv() {
                        ctx.notify(LocalEvent::SwitchInfoUpdated {
                            logical_address: current.logical_address,
                            device_type,
                            physical_address,
                        });
                    }
                }
                Stage::OsdName => {
                    current.display_name = String::from_utf8_lossy(message.params()).into_owned();
                }
                Stage::VendorId => {
                    let Some(vendor_id) = message.vendor_id() else {
                        return false;
                    };
                    current.vendor_id = vendor_id;
                }
                Stage::Power => {
                    let Some(power_status) = message.power_status() else {
                        return false;
                    };
                    current.power_status = power_status;
                }
            }
        }

        if self.pending_timer.take().is_some() {
            ctx.clear_timer();
        }
        self.processed += 1;
        self.retries = 0;
        true
    }

    fn wrap_up_and_finish(&mut self, ctx: &mut ActionContext<'_>) {
        if self.pending_timer.take().is_some() {
            ctx.clear_timer();
        }
        self.state = DiscoveryState::Finished;
        let devices: Vec<HdmiDeviceInfo> = self
            .devices
            .drain(..)
            .map(DiscoveredDevice::into_info)
            .collect();
        log::info!("discovery finished with {} device(s)", devices.len());
        for device in &devices {
            log::info!("  {device}");
        }
        if let Some(callback) = self.callback.take() {
            callback(devices);
        }
        if ctx.local_device().is_tv() {
            ctx.notify(LocalEvent::BufferedCommandsReleased);
        }
    }
}

impl FeatureAction for DeviceDiscoveryAction {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn start(&mut self, ctx: &mut ActionContext<'_>) {
        self.devices.clear();
        self.processed = 0;
        self.retries = 0;
        self.state = DiscoveryState::WaitingForDevicePolling;
        let request = PollRequest::new(
            ctx.local_device(),
            PollStrategy::RemoteDevices,
            PollOrder::Reverse,
            self.config.poll_retries,
        );
        self.poll_token = Some(ctx.poll_devices(request));
    }

    fn process_command(&mut self, ctx: &mut ActionContext<'_>, message: &CecMessage) -> bool {
        let Some(stage) = Stage::of(self.state) else {
            return false;
        };
        let Some(opcode) = message.opcode else {
            return false;
        };
        let rejected =
            stage.accepts_feature_abort() && message.is_feature_abort_of(stage.query_opcode());
        let expected = opcode == stage.response_opcode() || rejected;
        if !expected {
            return false;
        }
        if self.apply_response(ctx, stage, message) {
            self.check_and_proceed_stage(ctx);
        }
        true
    }

    fn handle_poll_result(
        &mut self,
        ctx: &mut ActionContext<'_>,
        token: RequestToken,
        acked: &[LogicalAddress],
    ) {
        if self.state == DiscoveryState::Finished || self.poll_token != Some(token) {
            return;
        }
        self.poll_token = None;
        log::debug!("discovery: poll acknowledged by {acked:?}");
        if acked.is_empty() {
            self.wrap_up_and_finish(ctx);
            return;
        }
        self.devices = acked.iter().copied().map(DiscoveredDevice::new).collect();
        if self.config.delay_period > Duration::ZERO {
            self.state = DiscoveryState::WaitingForDevices;
            self.pending_timer = Some(ctx.arm_timer(self.config.delay_period));
        } else {
            self.enter_stage(ctx, Stage::PhysicalAddress);
        }
    }

    fn handle_timer_event(&mut self, ctx: &mut ActionContext<'_>, token: RequestToken) {
        if self.state == DiscoveryState::Finished || self.pending_timer != Some(token) {
            return;
        }
        self.pending_timer = None;
        if self.state == DiscoveryState::WaitingForDevices {
            self.enter_stage(ctx, Stage::PhysicalAddress);
            return;
        }
        let Some(stage) = Stage::of(self.state) else {
            return;
        };
        let Some(address) = self.devices.get(self.processed).map(|d| d.logical_address) else {
            return;
        };
        log::debug!(
            "discovery: timeout in {:?} at index {} ({address})",
            self.state,
            self.processed
        );

        self.retries += 1;
        if self.retries < self.config.retry_limit {
            self.send_current_query(ctx, stage, address);
            return;
        }

        self.retries = 0;
        if stage.keeps_silent_device() {
            self.processed += 1;
        } else {
            log::debug!("discovery: dropping {address}, no answer to {:?}", stage.query_opcode());
            self.devices.remove(self.processed);
        }
        self.check_and_proceed_stage(ctx);
    }

    fn finish(&mut self, ctx: &mut ActionContext<'_>) {
        if self.pending_timer.take().is_some() {
            ctx.clear_timer();
        }
        self.poll_token = None;
        self.state = DiscoveryState::Finished;
    }

    fn is_finished(&self) -> bool {
        self.state == DiscoveryState::Finished
    }

    fn defers_local_processing(&self) -> bool {
        self.state != DiscoveryState::Finished
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{Effect, TokenSource};
    use crate::cache::MessageCache;
    use crate::local_device::LocalDevice;
    use std::sync::{Arc, Mutex};

    type Found = Arc<Mutex<Vec<Vec<HdmiDeviceInfo>>>>;

    struct Harness {
        local: LocalDevice,
        cache: MessageCache,
        tokens: TokenSource,
        action: DeviceDiscoveryAction,
        found: Found,
        timer: Option<RequestToken>,
        poll: Option<RequestToken>,
        sent: Vec<CecMessage>,
        events: Vec<LocalEvent>,
    }

    impl Harness {
        fn new(config: DiscoveryConfig) -> Self {
            let found: Found = Arc::new(Mutex::new(Vec::new()));
            let sink = found.clone();
            Self {
                local: LocalDevice::tv(),
                cache: MessageCache::new(),
                tokens: TokenSource::new(),
                action: DeviceDiscoveryAction::new(config, move |devices| {
                    sink.lock().unwrap().push(devices);
                }),
                found,
                timer: None,
                poll: None,
                sent: Vec::new(),
                events: Vec::new(),
            }
        }

        fn run<R>(
            &mut self,
            f: impl FnOnce(&mut DeviceDiscoveryAction, &mut ActionContext<'_>) -> R,
        ) -> R {
            let mut ctx = ActionContext::new(&self.local, &self.cache, &mut self.tokens);
            let out = f(&mut self.action, &mut ctx);
            for effect in ctx.into_effects() {
                match effect {
                    Effect::Send { message, .. } => self.sent.push(message),
                    Effect::ArmTimer { token, .. } => self.timer = Some(token),
                    Effect::ClearTimer => self.timer = None,
                    Effect::Poll { token, .. } => self.poll = Some(token),
                    Effect::Local(event) => self.events.push(event),
                }
            }
            out
        }

        fn start(&mut self) {
            self.run(|action, ctx| action.start(ctx));
        }

        fn poll_result(&mut self, acked: &[LogicalAddress]) {
            let token = self.poll.take().unwrap();
            self.run(|action, ctx| action.handle_poll_result(ctx, token, acked));
        }

        fn receive(&mut self, message: CecMessage) -> bool {
            self.run(|action, ctx| action.process_command(ctx, &message))
        }

        fn fire_timer(&mut self) {
            let token = self.timer.take().unwrap();
            self.run(|action, ctx| action.handle_timer_event(ctx, token));
        }

        fn last_sent(&self) -> CecMessage {
            *self.sent.last().unwrap()
        }

        fn results(&self) -> Vec<Vec<HdmiDeviceInfo>> {
            self.found.lock().unwrap().clone()
        }
    }

    const TV: LogicalAddress = LogicalAddress::Tv;
    const PLAYER: LogicalAddress = LogicalAddress::Playback1;
    const AVR: LogicalAddress = LogicalAddress::AudioSystem;

    fn quick() -> DiscoveryConfig {
        DiscoveryConfig::default().with_query_timeout(Duration::from_millis(10))
    }

    #[test]
    fn start_polls_remote_devices_in_reverse() {
        let mut h = Harness::new(quick());
        let effects = {
            let mut ctx = ActionContext::new(&h.local, &h.cache, &mut h.tokens);
            h.action.start(&mut ctx);
            ctx.into_effects()
        };
        let Effect::Poll { request, .. } = &effects[0] else {
            panic!("expected a poll, got {effects:?}");
        };
        assert_eq!(request.candidates[0], LogicalAddress::SpecificUse);
        assert!(!request.candidates.contains(&TV));
        assert_eq!(h.action.state(), DiscoveryState::WaitingForDevicePolling);
    }

    #[test]
    fn empty_poll_reports_empty_list_without_queries() {
        let mut h = Harness::new(quick());
        h.start();
        h.poll_result(&[]);
        assert!(h.sent.is_empty());
        assert_eq!(h.results(), vec![Vec::new()]);
        assert!(h.action.is_finished());
        assert_eq!(h.events, vec![LocalEvent::BufferedCommandsReleased]);
    }

    #[test]
    fn silent_osd_keeps_device_with_empty_name() {
        let mut h = Harness::new(quick());
        h.start();
        h.poll_result(&[PLAYER]);
        assert_eq!(h.last_sent(), CecMessage::give_physical_address(TV, PLAYER));

        assert!(h.receive(CecMessage::report_physical_address(
            PLAYER,
            PhysicalAddress::new(0x1000),
            DeviceType::Playback,
        )));
        assert_eq!(h.action.state(), DiscoveryState::WaitingForOsdName);
        assert_eq!(h.last_sent(), CecMessage::give_osd_name(TV, PLAYER));

        for _ in 0..4 {
            h.fire_timer();
            assert_eq!(h.last_sent(), CecMessage::give_osd_name(TV, PLAYER));
        }
        h.fire_timer();
        assert_eq!(h.action.state(), DiscoveryState::WaitingForVendorId);
        assert_eq!(h.last_sent(), CecMessage::give_device_vendor_id(TV, PLAYER));

        assert!(h.receive(CecMessage::device_vendor_id(PLAYER, VendorId::new(0x00E091))));
        assert_eq!(h.last_sent(), CecMessage::give_device_power_status(TV, PLAYER));
        assert!(h.receive(CecMessage::report_power_status(PLAYER, TV, PowerStatus::Standby)));

        let results = h.results();
        assert_eq!(results.len(), 1);
        let device = &results[0][0];
        assert_eq!(device.logical_address, PLAYER);
        assert_eq!(device.physical_address, PhysicalAddress::new(0x1000));
        assert_eq!(device.port_id, Some(PortId(1)));
        assert_eq!(device.device_type, DeviceType::Playback);
        assert_eq!(device.display_name, "");
        assert_eq!(device.vendor_id, VendorId::new(0x00E091));
        assert_eq!(device.power_status, PowerStatus::Standby);
        assert!(h.events.contains(&LocalEvent::SwitchInfoUpdated {
            logical_address: PLAYER,
            device_type: DeviceType::Playback,
            physical_address: PhysicalAddress::new(0x1000),
        }));
    }

    #[test]
    fn silent_physical_address_drops_device() {
        let mut h = Harness::new(quick().with_retry_limit(2));
        h.start();
        h.poll_result(&[AVR, PLAYER]);
        assert_eq!(h.last_sent(), CecMessage::give_physical_address(TV, AVR));
        h.fire_timer();
        h.fire_timer();
        // AVR dropped; the player now sits under the cursor.
        assert_eq!(h.last_sent(), CecMessage::give_physical_address(TV, PLAYER));
        h.receive(CecMessage::report_physical_address(
            PLAYER,
            PhysicalAddress::new(0x2000),
            DeviceType::Playback,
        ));
        h.receive(CecMessage::set_osd_name(PLAYER, TV, "Player"));
        h.receive(CecMessage::feature_abort(
            PLAYER,
            TV,
            Opcode::GiveDeviceVendorId,
            rustcec_core::types::AbortReason::UnrecognizedOpcode,
        ));
        h.fire_timer();
        h.fire_timer();

        let results = h.results();
        assert_eq!(results[0].len(), 1);
        let device = &results[0][0];
        assert_eq!(device.logical_address, PLAYER);
        assert_eq!(device.display_name, "Player");
        assert_eq!(device.vendor_id, VendorId::UNKNOWN);
        assert_eq!(device.power_status, PowerStatus::Unknown);
    }

    #[test]
    fn silent_vendor_id_drops_device() {
        let mut h = Harness::new(quick().with_retry_limit(1));
        h.start();
        h.poll_result(&[PLAYER]);
        h.receive(CecMessage::report_physical_address(
            PLAYER,
            PhysicalAddress::new(0x1000),
            DeviceType::Playback,
        ));
        h.receive(CecMessage::set_osd_name(PLAYER, TV, "BD"));
        assert_eq!(h.action.state(), DiscoveryState::WaitingForVendorId);
        h.fire_timer();
        assert_eq!(h.results(), vec![Vec::new()]);
        assert!(h.action.is_finished());
    }

    #[test]
    fn cached_response_skips_the_query() {
        let mut h = Harness::new(quick());
        h.cache.put(&CecMessage::report_physical_address(
            PLAYER,
            PhysicalAddress::new(0x3000),
            DeviceType::Playback,
        ));
        h.cache.put(&CecMessage::set_osd_name(PLAYER, TV, "Cached"));
        h.start();
        h.poll_result(&[PLAYER]);

        assert_eq!(h.sent, vec![CecMessage::give_device_vendor_id(TV, PLAYER)]);
        assert_eq!(h.action.state(), DiscoveryState::WaitingForVendorId);
        h.receive(CecMessage::device_vendor_id(PLAYER, VendorId::new(1)));
        h.receive(CecMessage::report_power_status(PLAYER, TV, PowerStatus::On));
        let results = h.results();
        assert_eq!(results[0][0].physical_address, PhysicalAddress::new(0x3000));
        assert_eq!(results[0][0].display_name, "Cached");
    }

    #[test]
    fn stages_visit_every_device_before_advancing() {
        let mut h = Harness::new(quick());
        h.start();
        h.poll_result(&[AVR, PLAYER]);
        h.receive(CecMessage::report_physical_address(
            AVR,
            PhysicalAddress::new(0x1000),
            DeviceType::AudioSystem,
        ));
        assert_eq!(h.last_sent(), CecMessage::give_physical_address(TV, PLAYER));
        h.receive(CecMessage::report_physical_address(
            PLAYER,
            PhysicalAddress::new(0x1100),
            DeviceType::Playback,
        ));
        assert_eq!(h.last_sent(), CecMessage::give_osd_name(TV, AVR));

        let queried: Vec<_> = h.sent.iter().filter_map(|m| m.opcode).collect();
        assert_eq!(
            queried,
            vec![
                Opcode::GivePhysicalAddress,
                Opcode::GivePhysicalAddress,
                Opcode::GiveOsdName
            ]
        );
    }

    #[test]
    fn response_from_other_device_is_ignored() {
        let mut h = Harness::new(quick());
        h.start();
        h.poll_result(&[PLAYER]);
        let consumed = h.receive(CecMessage::report_physical_address(
            AVR,
            PhysicalAddress::new(0x2000),
            DeviceType::AudioSystem,
        ));
        assert!(consumed);
        assert_eq!(h.action.state(), DiscoveryState::WaitingForPhysicalAddress);
        assert!(h.timer.is_some());
        assert!(!h.receive(CecMessage::active_source(AVR, PhysicalAddress::new(0x2000))));
    }

    #[test]
    fn settling_delay_precedes_queries() {
        let mut h = Harness::new(quick().with_delay_period(Duration::from_millis(50)));
        h.start();
        h.poll_result(&[PLAYER]);
        assert_eq!(h.action.state(), DiscoveryState::WaitingForDevices);
        assert!(h.sent.is_empty());
        h.fire_timer();
        assert_eq!(h.last_sent(), CecMessage::give_physical_address(TV, PLAYER));
    }

    #[test]
    fn stale_timer_is_ignored() {
        let mut h = Harness::new(quick());
        h.start();
        h.poll_result(&[PLAYER]);
        let stale = h.timer.unwrap();
        h.receive(CecMessage::report_physical_address(
            PLAYER,
            PhysicalAddress::new(0x1000),
            DeviceType::Playback,
        ));
        let sent_before = h.sent.len();
        h.run(|action, ctx| action.handle_timer_event(ctx, stale));
        assert_eq!(h.sent.len(), sent_before);
        assert_eq!(h.action.state(), DiscoveryState::WaitingForOsdName);
    }

    #[test]
    fn callback_runs_once_and_finish_suppresses_it() {
        let mut h = Harness::new(quick());
        h.start();
        h.poll_result(&[]);
        h.run(|action, ctx| action.finish(ctx));
        assert_eq!(h.results().len(), 1);

        let mut cancelled = Harness::new(quick());
        cancelled.start();
        let poll = cancelled.poll.take().unwrap();
        cancelled.run(|action, ctx| action.finish(ctx));
        cancelled.run(|action, ctx| action.handle_poll_result(ctx, poll, &[PLAYER]));
        assert!(cancelled.results().is_empty());
        assert!(cancelled.sent.is_empty());
    }

    #[test]
    fn rejected_osd_name_and_power_keep_device() {
        use rustcec_core::types::AbortReason;

        let mut h = Harness::new(quick());
        h.start();
        h.poll_result(&[PLAYER]);
        h.receive(CecMessage::report_physical_address(
            PLAYER,
            PhysicalAddress::new(0x1000),
            DeviceType::Playback,
        ));
        assert!(h.receive(CecMessage::feature_abort(
            PLAYER,
            TV,
            Opcode::GiveOsdName,
            AbortReason::Refused,
        )));
        assert_eq!(h.action.state(), DiscoveryState::WaitingForVendorId);
        h.receive(CecMessage::device_vendor_id(PLAYER, VendorId::new(0x000CB8)));
        assert_eq!(h.action.state(), DiscoveryState::WaitingForPower);
        assert!(h.receive(CecMessage::feature_abort(
            PLAYER,
            TV,
            Opcode::GiveDevicePowerStatus,
            AbortReason::UnrecognizedOpcode,
        )));

        let results = h.results();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].len(), 1);
        let device = &results[0][0];
        assert_eq!(device.physical_address, PhysicalAddress::new(0x1000));
        assert_eq!(device.display_name, "");
        assert_eq!(device.vendor_id, VendorId::new(0x000CB8));
        assert_eq!(device.power_status, PowerStatus::Unknown);
    }

    #[test]
    fn physical_address_abort_is_not_an_answer() {
        use rustcec_core::types::AbortReason;

        let mut h = Harness::new(quick());
        h.start();
        h.poll_result(&[PLAYER]);
        let sent_before = h.sent.len();
        assert!(!h.receive(CecMessage::feature_abort(
            PLAYER,
            TV,
            Opcode::GivePhysicalAddress,
            AbortReason::Refused,
        )));
        assert_eq!(h.action.state(), DiscoveryState::WaitingForPhysicalAddress);
        assert_eq!(h.sent.len(), sent_before);
        assert!(h.timer.is_some());
        assert!(h.results().is_empty());
    }

    #[test]
    fn wrong_source_does_not_count_as_a_retry() {
        let mut h = Harness::new(quick().with_retry_limit(2));
        h.start();
        h.poll_result(&[PLAYER]);
        h.fire_timer();
        assert_eq!(h.last_sent(), CecMessage::give_physical_address(TV, PLAYER));
        assert!(h.results().is_empty());

        assert!(h.receive(CecMessage::report_physical_address(
            AVR,
            PhysicalAddress::new(0x2000),
            DeviceType::AudioSystem,
        )));
        assert_eq!(h.action.state(), DiscoveryState::WaitingForPhysicalAddress);
        assert!(h.results().is_empty());

        h.fire_timer();
        assert_eq!(h.results(), vec![Vec::new()]);
        assert!(h.action.is_finished());
    }
}
