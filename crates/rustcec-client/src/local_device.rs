//! The local CEC device the actions run on behalf of, and the device-level
//! message handling that sits behind the actions.

use crate::action::LocalEvent;
use rustcec_core::types::{
    DeviceType, LogicalAddress, Opcode, PhysicalAddress, PowerStatus, VendorId,
};
use rustcec_core::CecMessage;
use std::collections::BTreeMap;
use std::fmt;

/// Identifier of a local HDMI input port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PortId(pub u8);

impl fmt::Display for PortId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One HDMI input of the local device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PortInfo {
    pub id: PortId,
    pub physical_address: PhysicalAddress,
}

/// Whether the local device is the display or a source feeding it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum LocalRole {
    Tv,
    Source,
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LocalDevice {
    pub role: LocalRole,
    pub logical_address: LogicalAddress,
    pub physical_address: PhysicalAddress,
    pub osd_name: String,
    pub vendor_id: VendorId,
    pub ports: Vec<PortInfo>,
}

impl LocalDevice {
    /// A TV at the root of the topology with inputs 1 through 4.
    pub fn tv() -> Self {
        let ports = (1..=4u8)
            .filter_map(|port| {
                PhysicalAddress::ROOT.child(port).map(|physical_address| PortInfo {
                    id: PortId(port),
                    physical_address,
                })
            })
            .collect();
        Self {
            role: LocalRole::Tv,
            logical_address: LogicalAddress::Tv,
            physical_address: PhysicalAddress::ROOT,
            osd_name: "TV".to_string(),
            vendor_id: VendorId::UNKNOWN,
            ports,
        }
    }

    /// A source device without inputs.
    pub fn source(logical_address: LogicalAddress, physical_address: PhysicalAddress) -> Self {
        Self {
            role: LocalRole::Source,
            logical_address,
            physical_address,
            osd_name: String::new(),
            vendor_id: VendorId::UNKNOWN,
            ports: Vec::new(),
        }
    }

    pub fn with_osd_name(mut self, name: impl Into<String>) -> Self {
        self.osd_name = name.into();
        self
    }

    pub fn with_vendor_id(mut self, vendor_id: VendorId) -> Self {
        self.vendor_id = vendor_id;
        self
    }

    pub fn with_ports(mut self, ports: Vec<PortInfo>) -> Self {
        self.ports = ports;
        self
    }

    pub fn is_tv(&self) -> bool {
        self.role == LocalRole::Tv
    }

    pub fn device_type(&self) -> DeviceType {
        match self.role {
            LocalRole::Tv => DeviceType::Tv,
            LocalRole::Source => self
                .logical_address
                .primary_device_type()
                .unwrap_or(DeviceType::Playback),
        }
    }

    /// Maps a device's physical address to the local input it hangs off.
    ///
    /// Without a port table the input nibble itself is used as the id.
    pub fn port_id(&self, target: PhysicalAddress) -> Option<PortId> {
        let nibble = target.child_port_under(self.physical_address)?;
        if self.ports.is_empty() {
            return Some(PortId(nibble));
        }
        let child = self.physical_address.child(nibble)?;
        self.ports
            .iter()
            .find(|port| port.physical_address == child)
            .map(|port| port.id)
    }
}

/// A device's position in the HDMI topology as the local device knows it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SwitchInfo {
    pub logical_address: LogicalAddress,
    pub device_type: DeviceType,
    pub physical_address: PhysicalAddress,
    pub port_id: Option<PortId>,
}

/// Messages a TV holds back while discovery is rebuilding its device list.
const DEFERRED_OPCODES: [Opcode; 4] = [
    Opcode::ActiveSource,
    Opcode::RoutingChange,
    Opcode::InitiateArc,
    Opcode::SetSystemAudioMode,
];

/// Device-level bookkeeping for messages no action claimed.
#[derive(Debug, Default)]
pub struct LocalDeviceHandler {
    arc_enabled: bool,
    topology: BTreeMap<LogicalAddress, SwitchInfo>,
    buffered: Vec<CecMessage>,
}

impl LocalDeviceHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc_enabled(&self) -> bool {
        self.arc_enabled
    }

    pub fn topology(&self) -> Vec<SwitchInfo> {
        self.topology.values().copied().collect()
    }

    pub fn buffered_len(&self) -> usize {
        self.buffered.len()
    }

    /// Handles one inbound message and returns the replies to transmit.
    ///
    /// `deferring` is set while an action asks for unrelated messages to be
    /// held back; a TV then buffers them until
    /// [`LocalEvent::BufferedCommandsReleased`].
    pub fn handle_message(
        &mut self,
        local: &LocalDevice,
        message: &CecMessage,
        deferring: bool,
    ) -> Vec<CecMessage> {
        let Some(opcode) = message.opcode else {
            return Vec::new();
        };
        if message.source == local.logical_address {
            return Vec::new();
        }
        if !message.is_broadcast() && message.destination != local.logical_address {
            return Vec::new();
        }
        if deferring && local.is_tv() && DEFERRED_OPCODES.contains(&opcode) {
            log::debug!("deferring {message} until device discovery completes");
            self.buffered.push(*message);
            return Vec::new();
        }

        let me = local.logical_address;
        let from_audio_system =
            local.is_tv() && message.source == LogicalAddress::AudioSystem;
        match opcode {
            Opcode::GivePhysicalAddress => vec![CecMessage::report_physical_address(
                me,
                local.physical_address,
                local.device_type(),
            )],
            Opcode::GiveOsdName => vec![CecMessage::set_osd_name(
                me,
                message.source,
                &local.osd_name,
            )],
            Opcode::GiveDeviceVendorId => vec![CecMessage::device_vendor_id(me, local.vendor_id)],
            Opcode::GiveDevicePowerStatus => vec![CecMessage::report_power_status(
                me,
                message.source,
                PowerStatus::On,
            )],
            Opcode::InitiateArc if from_audio_system => {
                self.arc_enabled = true;
                vec![CecMessage::report_arc_initiated(me, message.source)]
            }
            Opcode::TerminateArc if from_audio_system => {
                self.arc_enabled = false;
                vec![CecMessage::report_arc_terminated(me, message.source)]
            }
            Opcode::ReportPhysicalAddress if local.is_tv() => {
                if let (Some(physical_address), Some(device_type)) =
                    (message.physical_address(), message.reported_device_type())
                {
                    self.update_switch_info(local, message.source, device_type, physical_address);
                }
                Vec::new()
            }
            _ => Vec::new(),
        }
    }

    /// Applies a side effect reported by an action. Returns buffered messages
    /// that must now be processed, in arrival order.
    pub fn apply_event(&mut self, local: &LocalDevice, event: &LocalEvent) -> Vec<CecMessage> {
        match *event {
            LocalEvent::SwitchInfoUpdated {
                logical_address,
                device_type,
                physical_address,
            } => {
                self.update_switch_info(local, logical_address, device_type, physical_address);
                Vec::new()
            }
            LocalEvent::ArcDisabled | LocalEvent::ArcTransmissionDisabled => {
                self.arc_enabled = false;
                Vec::new()
            }
            LocalEvent::BufferedCommandsReleased => std::mem::take(&mut self.buffered),
        }
    }

    fn update_switch_info(
        &mut self,
        local: &LocalDevice,
        logical_address: LogicalAddress,
        device_type: DeviceType,
        physical_address: PhysicalAddress,
    ) {
        self.topology.insert(
            logical_address,
            SwitchInfo {
                logical_address,
                device_type,
                physical_address,
                port_id: local.port_id(physical_address),
            },
        );
    }
}
