/// CEC device types as carried in `<Report Physical Address>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DeviceType {
    Tv,
    Recorder,
    Reserved,
    Tuner,
    Playback,
    AudioSystem,
    PureCecSwitch,
    VideoProcessor,
    Unknown(u8),
}

impl DeviceType {
    pub const fn to_u8(self) -> u8 {
        match self {
            Self::Tv => 0,
            Self::Recorder => 1,
            Self::Reserved => 2,
            Self::Tuner => 3,
            Self::Playback => 4,
            Self::AudioSystem => 5,
            Self::PureCecSwitch => 6,
            Self::VideoProcessor => 7,
            Self::Unknown(v) => v,
        }
    }

    pub const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Tv,
            1 => Self::Recorder,
            2 => Self::Reserved,
            3 => Self::Tuner,
            4 => Self::Playback,
            5 => Self::AudioSystem,
            6 => Self::PureCecSwitch,
            7 => Self::VideoProcessor,
            v => Self::Unknown(v),
        }
    }
}
