//! Lightweight simulated CEC device.
//!
//! [`SimulatedDevice`] answers the identity queries and ARC requests a TV
//! sends, as configured by a [`SimulatedProfile`]. Each answer can be turned
//! into a `<Feature Abort>` or into silence to model misbehaving hardware.

use crate::ClientError;
use rustcec_core::types::{
    AbortReason, DeviceType, LogicalAddress, Opcode, PhysicalAddress, PowerStatus, VendorId,
};
use rustcec_core::CecMessage;
use rustcec_link::CecLink;

/// How a simulated device reacts to one kind of query.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Reply<T> {
    Answer(T),
    Abort,
    Silent,
}

/// How a simulated audio system reacts to ARC requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ArcResponse {
    #[default]
    Accept,
    Refuse,
    Ignore,
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct SimulatedProfile {
    pub physical_address: PhysicalAddress,
    pub device_type: DeviceType,
    pub answers_physical_address: bool,
    pub osd_name: Reply<String>,
    pub vendor_id: Reply<VendorId>,
    pub power_status: Reply<PowerStatus>,
    pub arc: ArcResponse,
}

impl Default for SimulatedProfile {
    fn default() -> Self {
        Self {
            physical_address: PhysicalAddress::new(0x1000),
            device_type: DeviceType::Playback,
            answers_physical_address: true,
            osd_name: Reply::Answer(String::new()),
            vendor_id: Reply::Answer(VendorId::UNKNOWN),
            power_status: Reply::Answer(PowerStatus::On),
            arc: ArcResponse::Accept,
        }
    }
}

impl SimulatedProfile {
    pub fn new(physical_address: PhysicalAddress, device_type: DeviceType) -> Self {
        Self {
            physical_address,
            device_type,
            ..Self::default()
        }
    }

    pub fn with_osd_name(mut self, name: Reply<String>) -> Self {
        self.osd_name = name;
        self
    }

    pub fn with_vendor_id(mut self, vendor_id: Reply<VendorId>) -> Self {
        self.vendor_id = vendor_id;
        self
    }

    pub fn with_power_status(mut self, power_status: Reply<PowerStatus>) -> Self {
        self.power_status = power_status;
        self
    }

    pub fn with_arc(mut self, arc: ArcResponse) -> Self {
        self.arc = arc;
        self
    }

    pub fn silent_physical_address(mut self) -> Self {
        self.answers_physical_address = false;
        self
    }
}

/// A simulated CEC device.
pub struct SimulatedDevice<L: CecLink> {
    address: LogicalAddress,
    profile: SimulatedProfile,
    link: L,
}

impl<L: CecLink> SimulatedDevice<L> {
    pub fn new(address: LogicalAddress, link: L, profile: SimulatedProfile) -> Self {
        Self {
            address,
            profile,
            link,
        }
    }

    pub fn address(&self) -> LogicalAddress {
        self.address
    }

    pub fn profile(&self) -> &SimulatedProfile {
        &self.profile
    }

    /// Broadcast `<Report Physical Address>`, as a device does after joining
    /// the bus.
    pub async fn announce(&self) -> Result<(), ClientError> {
        self.link
            .send(&CecMessage::report_physical_address(
                self.address,
                self.profile.physical_address,
                self.profile.device_type,
            ))
            .await?;
        Ok(())
    }

    /// Run the device loop, answering requests until the link closes.
    pub async fn run(&self) -> Result<(), ClientError> {
        loop {
            let message = self.link.recv().await?;
            let Some(reply) = self.respond(&message) else {
                continue;
            };
            if let Err(e) = self.link.send(&reply).await {
                log::debug!("simulator {}: reply {reply} failed: {e}", self.address);
            }
        }
    }

    /// The reply to `message`, if the profile calls for one.
    pub fn respond(&self, message: &CecMessage) -> Option<CecMessage> {
        if message.destination != self.address || message.source == self.address {
            return None;
        }
        let opcode = message.opcode?;
        let me = self.address;
        let to = message.source;
        let profile = &self.profile;
        match opcode {
            Opcode::GivePhysicalAddress => profile.answers_physical_address.then(|| {
                CecMessage::report_physical_address(
                    me,
                    profile.physical_address,
                    profile.device_type,
                )
            }),
            Opcode::GiveOsdName => self.answer(&profile.osd_name, opcode, to, |name| {
                CecMessage::set_osd_name(me, to, name)
            }),
            Opcode::GiveDeviceVendorId => self.answer(&profile.vendor_id, opcode, to, |id| {
                CecMessage::device_vendor_id(me, *id)
            }),
            Opcode::GiveDevicePowerStatus => {
                self.answer(&profile.power_status, opcode, to, |status| {
                    CecMessage::report_power_status(me, to, *status)
                })
            }
            Opcode::RequestArcInitiation | Opcode::RequestArcTermination => match profile.arc {
                ArcResponse::Accept if opcode == Opcode::RequestArcInitiation => {
                    Some(CecMessage::initiate_arc(me, to))
                }
                ArcResponse::Accept => Some(CecMessage::terminate_arc(me, to)),
                ArcResponse::Refuse => Some(CecMessage::feature_abort(
                    me,
                    to,
                    opcode,
                    AbortReason::Refused,
                )),
                ArcResponse::Ignore => None,
            },
            Opcode::GetCecVersion | Opcode::Unknown(_) => Some(CecMessage::feature_abort(
                me,
                to,
                opcode,
                AbortReason::UnrecognizedOpcode,
            )),
            _ => None,
        }
    }

    fn answer<T>(
        &self,
        reply: &Reply<T>,
        opcode: Opcode,
        to: LogicalAddress,
        build: impl FnOnce(&T) -> CecMessage,
    ) -> Option<CecMessage> {
        match reply {
            Reply::Answer(value) => Some(build(value)),
            Reply::Abort => Some(CecMessage::feature_abort(
                self.address,
                to,
                opcode,
                AbortReason::UnrecognizedOpcode,
            )),
            Reply::Silent => None,
        }
    }
}
