/// Reason operand of `<Feature Abort>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AbortReason {
    UnrecognizedOpcode,
    NotInCorrectMode,
    CannotProvideSource,
    InvalidOperand,
    Refused,
    UnableToDetermine,
    Unknown(u8),
}

impl AbortReason {
    pub const fn to_u8(self) -> u8 {
        match self {
            Self::UnrecognizedOpcode => 0,
            Self::NotInCorrectMode => 1,
            Self::CannotProvideSource => 2,
            Self::InvalidOperand => 3,
            Self::Refused => 4,
            Self::UnableToDetermine => 5,
            Self::Unknown(v) => v,
        }
    }

    pub const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::UnrecognizedOpcode,
            1 => Self::NotInCorrectMode,
            2 => Self::CannotProvideSource,
            3 => Self::InvalidOperand,
            4 => Self::Refused,
            5 => Self::UnableToDetermine,
            v => Self::Unknown(v),
        }
    }
}
