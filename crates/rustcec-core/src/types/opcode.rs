/// CEC opcodes used by the rustcec crate family.
///
/// Opcodes outside this subset decode as [`Unknown`](Self::Unknown) and are
/// passed through untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Opcode {
    FeatureAbort,
    ImageViewOn,
    Standby,
    GiveOsdName,
    SetOsdName,
    SetSystemAudioMode,
    RoutingChange,
    ActiveSource,
    GivePhysicalAddress,
    ReportPhysicalAddress,
    DeviceVendorId,
    GiveDeviceVendorId,
    GiveDevicePowerStatus,
    ReportPowerStatus,
    CecVersion,
    GetCecVersion,
    InitiateArc,
    ReportArcInitiated,
    ReportArcTerminated,
    RequestArcInitiation,
    RequestArcTermination,
    TerminateArc,
    Abort,
    Unknown(u8),
}

impl Opcode {
    /// Converts this opcode to its wire value.
    pub const fn to_u8(self) -> u8 {
        match self {
            Self::FeatureAbort => 0x00,
            Self::ImageViewOn => 0x04,
            Self::Standby => 0x36,
            Self::GiveOsdName => 0x46,
            Self::SetOsdName => 0x47,
            Self::SetSystemAudioMode => 0x72,
            Self::RoutingChange => 0x80,
            Self::ActiveSource => 0x82,
            Self::GivePhysicalAddress => 0x83,
            Self::ReportPhysicalAddress => 0x84,
            Self::DeviceVendorId => 0x87,
            Self::GiveDeviceVendorId => 0x8C,
            Self::GiveDevicePowerStatus => 0x8F,
            Self::ReportPowerStatus => 0x90,
            Self::CecVersion => 0x9E,
            Self::GetCecVersion => 0x9F,
            Self::InitiateArc => 0xC0,
            Self::ReportArcInitiated => 0xC1,
            Self::ReportArcTerminated => 0xC2,
            Self::RequestArcInitiation => 0xC3,
            Self::RequestArcTermination => 0xC4,
            Self::TerminateArc => 0xC5,
            Self::Abort => 0xFF,
            Self::Unknown(v) => v,
        }
    }

    /// Creates an `Opcode` from its wire value.
    pub const fn from_u8(value: u8) -> Self {
        match value {
            0x00 => Self::FeatureAbort,
            0x04 => Self::ImageViewOn,
            0x36 => Self::Standby,
            0x46 => Self::GiveOsdName,
            0x47 => Self::SetOsdName,
            0x72 => Self::SetSystemAudioMode,
            0x80 => Self::RoutingChange,
            0x82 => Self::ActiveSource,
            0x83 => Self::GivePhysicalAddress,
            0x84 => Self::ReportPhysicalAddress,
            0x87 => Self::DeviceVendorId,
            0x8C => Self::GiveDeviceVendorId,
            0x8F => Self::GiveDevicePowerStatus,
            0x90 => Self::ReportPowerStatus,
            0x9E => Self::CecVersion,
            0x9F => Self::GetCecVersion,
            0xC0 => Self::InitiateArc,
            0xC1 => Self::ReportArcInitiated,
            0xC2 => Self::ReportArcTerminated,
            0xC3 => Self::RequestArcInitiation,
            0xC4 => Self::RequestArcTermination,
            0xC5 => Self::TerminateArc,
            0xFF => Self::Abort,
            v => Self::Unknown(v),
        }
    }
}
