/// Operand of `<Report Power Status>`.
///
/// [`Unknown`](Self::Unknown) is the sentinel for a device that never
/// answered; it has no wire value of its own and encodes as `0xFF`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PowerStatus {
    On,
    Standby,
    TransientToOn,
    TransientToStandby,
    #[default]
    Unknown,
}

impl PowerStatus {
    pub const fn to_u8(self) -> u8 {
        match self {
            Self::On => 0,
            Self::Standby => 1,
            Self::TransientToOn => 2,
            Self::TransientToStandby => 3,
            Self::Unknown => 0xFF,
        }
    }

    pub const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::On,
            1 => Self::Standby,
            2 => Self::TransientToOn,
            3 => Self::TransientToStandby,
            _ => Self::Unknown,
        }
    }
}
