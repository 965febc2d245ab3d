use core::fmt;

/// A 24-bit IEEE OUI as carried in `<Device Vendor ID>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct VendorId(u32);

impl VendorId {
    /// Sentinel for a vendor id that was never reported.
    pub const UNKNOWN: Self = Self(0x00FF_FFFF);

    /// Creates a vendor id from the low 24 bits of `raw`.
    pub const fn new(raw: u32) -> Self {
        Self(raw & 0x00FF_FFFF)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }

    pub const fn is_known(self) -> bool {
        self.0 != Self::UNKNOWN.0
    }
}

impl Default for VendorId {
    fn default() -> Self {
        Self::UNKNOWN
    }
}

impl fmt::Display for VendorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:06X}", self.0)
    }
}
