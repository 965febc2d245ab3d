use crate::types::DeviceType;
use core::fmt;

/// A 4-bit CEC logical address.
///
/// Address 15 doubles as the broadcast destination and the "unregistered"
/// source; both spellings map to [`Unregistered`](Self::Unregistered).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LogicalAddress {
    Tv,
    Recorder1,
    Recorder2,
    Tuner1,
    Playback1,
    AudioSystem,
    Tuner2,
    Tuner3,
    Playback2,
    Recorder3,
    Tuner4,
    Playback3,
    Backup1,
    Backup2,
    SpecificUse,
    Unregistered,
}

impl LogicalAddress {
    /// Destination used for broadcast frames.
    pub const BROADCAST: Self = Self::Unregistered;

    /// Converts this address to its 4-bit wire value.
    pub const fn to_u8(self) -> u8 {
        match self {
            Self::Tv => 0,
            Self::Recorder1 => 1,
            Self::Recorder2 => 2,
            Self::Tuner1 => 3,
            Self::Playback1 => 4,
            Self::AudioSystem => 5,
            Self::Tuner2 => 6,
            Self::Tuner3 => 7,
            Self::Playback2 => 8,
            Self::Recorder3 => 9,
            Self::Tuner4 => 10,
            Self::Playback3 => 11,
            Self::Backup1 => 12,
            Self::Backup2 => 13,
            Self::SpecificUse => 14,
            Self::Unregistered => 15,
        }
    }

    /// Creates an address from the low nibble of `value`.
    pub const fn from_u8(value: u8) -> Self {
        match value & 0x0F {
            0 => Self::Tv,
            1 => Self::Recorder1,
            2 => Self::Recorder2,
            3 => Self::Tuner1,
            4 => Self::Playback1,
            5 => Self::AudioSystem,
            6 => Self::Tuner2,
            7 => Self::Tuner3,
            8 => Self::Playback2,
            9 => Self::Recorder3,
            10 => Self::Tuner4,
            11 => Self::Playback3,
            12 => Self::Backup1,
            13 => Self::Backup2,
            14 => Self::SpecificUse,
            _ => Self::Unregistered,
        }
    }

    /// Returns `true` for addresses a device can own (`Tv` up to, but not
    /// including, `Unregistered`).
    pub const fn is_valid_device_address(self) -> bool {
        let raw = self.to_u8();
        raw >= Self::Tv.to_u8() && raw < Self::Unregistered.to_u8()
    }

    /// Every address a device can own, in ascending order.
    pub fn device_addresses() -> impl DoubleEndedIterator<Item = Self> {
        (0..Self::Unregistered.to_u8()).map(Self::from_u8)
    }

    /// The primary device type implied by the address class.
    pub const fn primary_device_type(self) -> Option<DeviceType> {
        match self {
            Self::Tv | Self::SpecificUse => Some(DeviceType::Tv),
            Self::Recorder1 | Self::Recorder2 | Self::Recorder3 => Some(DeviceType::Recorder),
            Self::Tuner1 | Self::Tuner2 | Self::Tuner3 | Self::Tuner4 => Some(DeviceType::Tuner),
            Self::Playback1 | Self::Playback2 | Self::Playback3 => Some(DeviceType::Playback),
            Self::AudioSystem => Some(DeviceType::AudioSystem),
            Self::Backup1 | Self::Backup2 => Some(DeviceType::Reserved),
            Self::Unregistered => None,
        }
    }
}

impl fmt::Display for LogicalAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:X}", self.to_u8())
    }
}

#[cfg(test)]
mod tests {
    use super::LogicalAddress;
    use crate::types::DeviceType;

    #[test]
    fn wire_values_round_trip_through_low_nibble() {
        for raw in 0u8..16 {
            assert_eq!(LogicalAddress::from_u8(raw).to_u8(), raw);
        }
        assert_eq!(LogicalAddress::from_u8(0xF4), LogicalAddress::Playback1);
    }

    #[test]
    fn unregistered_is_not_a_device_address() {
        assert!(LogicalAddress::Tv.is_valid_device_address());
        assert!(LogicalAddress::SpecificUse.is_valid_device_address());
        assert!(!LogicalAddress::Unregistered.is_valid_device_address());
        assert_eq!(LogicalAddress::device_addresses().count(), 15);
        assert_eq!(
            LogicalAddress::device_addresses().next_back(),
            Some(LogicalAddress::SpecificUse)
        );
    }

    #[test]
    fn address_classes_imply_device_types() {
        assert_eq!(
            LogicalAddress::Playback2.primary_device_type(),
            Some(DeviceType::Playback)
        );
        assert_eq!(
            LogicalAddress::AudioSystem.primary_device_type(),
            Some(DeviceType::AudioSystem)
        );
        assert_eq!(LogicalAddress::Unregistered.primary_device_type(), None);
    }
}
