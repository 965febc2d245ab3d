use core::fmt;

/// A CEC physical address: four nibbles `a.b.c.d` describing the path from
/// the root display through the HDMI topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PhysicalAddress(u16);

impl PhysicalAddress {
    /// The root of the topology (the TV).
    pub const ROOT: Self = Self(0x0000);
    /// Reported by devices that have not yet resolved their position.
    pub const INVALID: Self = Self(0xFFFF);

    pub const fn new(raw: u16) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u16 {
        self.0
    }

    pub const fn is_valid(self) -> bool {
        self.0 != Self::INVALID.0
    }

    /// Returns nibble `index` (0 is the most significant).
    pub const fn nibble(self, index: u8) -> u8 {
        ((self.0 >> (12 - 4 * (index as u16 & 0x3))) & 0x0F) as u8
    }

    /// Number of hops below the root, i.e. the count of leading non-zero
    /// nibbles.
    pub const fn depth(self) -> u8 {
        let mut depth = 0;
        while depth < 4 && self.nibble(depth) != 0 {
            depth += 1;
        }
        depth
    }

    /// The input-port nibble of `parent` through which `self` is reached.
    ///
    /// Returns `None` when `self` is not strictly below `parent`.
    pub const fn child_port_under(self, parent: Self) -> Option<u8> {
        if !self.is_valid() || !parent.is_valid() {
            return None;
        }
        let depth = parent.depth();
        if depth >= 4 {
            return None;
        }
        let mut i = 0;
        while i < depth {
            if self.nibble(i) != parent.nibble(i) {
                return None;
            }
            i += 1;
        }
        match self.nibble(depth) {
            0 => None,
            port => Some(port),
        }
    }

    /// The address of the child reached through `port` of `self`.
    pub const fn child(self, port: u8) -> Option<Self> {
        let depth = self.depth();
        if depth >= 4 || port == 0 || port > 0x0F {
            return None;
        }
        Some(Self(self.0 | ((port as u16) << (12 - 4 * depth as u16))))
    }
}

impl fmt::Display for PhysicalAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:x}.{:x}.{:x}.{:x}",
            self.nibble(0),
            self.nibble(1),
            self.nibble(2),
            self.nibble(3)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::PhysicalAddress;

    #[test]
    fn depth_counts_leading_nibbles() {
        assert_eq!(PhysicalAddress::ROOT.depth(), 0);
        assert_eq!(PhysicalAddress::new(0x1000).depth(), 1);
        assert_eq!(PhysicalAddress::new(0x2130).depth(), 3);
        assert_eq!(PhysicalAddress::new(0x1234).depth(), 4);
    }

    #[test]
    fn child_port_resolves_path_below_parent() {
        let tv = PhysicalAddress::ROOT;
        assert_eq!(PhysicalAddress::new(0x1000).child_port_under(tv), Some(1));
        assert_eq!(PhysicalAddress::new(0x3200).child_port_under(tv), Some(3));

        let switch = PhysicalAddress::new(0x2000);
        assert_eq!(PhysicalAddress::new(0x2400).child_port_under(switch), Some(4));
        assert_eq!(PhysicalAddress::new(0x1400).child_port_under(switch), None);
        assert_eq!(switch.child_port_under(switch), None);
        assert_eq!(PhysicalAddress::INVALID.child_port_under(tv), None);
    }

    #[test]
    fn child_appends_nibble_at_next_depth() {
        assert_eq!(
            PhysicalAddress::new(0x1000).child(2),
            Some(PhysicalAddress::new(0x1200))
        );
        assert_eq!(PhysicalAddress::new(0x1234).child(1), None);
        assert_eq!(PhysicalAddress::ROOT.child(0), None);
    }

    #[test]
    #[cfg(feature = "std")]
    fn displays_dotted_form() {
        use std::string::ToString;
        assert_eq!(PhysicalAddress::new(0x1200).to_string(), "1.2.0.0");
        assert_eq!(PhysicalAddress::INVALID.to_string(), "f.f.f.f");
    }
}
