use rustcec_core::types::{LogicalAddress, Opcode};
use rustcec_core::CecMessage;
use std::collections::HashMap;

/// Opcodes whose latest message is worth remembering per source.
const CACHEABLE_OPCODES: [Opcode; 4] = [
    Opcode::SetOsdName,
    Opcode::ReportPhysicalAddress,
    Opcode::DeviceVendorId,
    Opcode::CecVersion,
];

/// Most recently seen message per `(source, opcode)`.
///
/// Filled by the controller's inbound path; actions consult it to answer a
/// query without touching the bus.
#[derive(Debug, Default, Clone)]
pub struct MessageCache {
    entries: HashMap<(LogicalAddress, Opcode), CecMessage>,
}

impl MessageCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_cacheable(opcode: Opcode) -> bool {
        CACHEABLE_OPCODES.contains(&opcode)
    }

    /// Stores `message` if its opcode is cacheable, replacing any older entry
    /// from the same source. Returns whether it was stored.
    pub fn put(&mut self, message: &CecMessage) -> bool {
        let Some(opcode) = message.opcode else {
            return false;
        };
        if !Self::is_cacheable(opcode) || !message.source.is_valid_device_address() {
            return false;
        }
        self.entries.insert((message.source, opcode), *message);
        true
    }

    pub fn get(&self, address: LogicalAddress, opcode: Opcode) -> Option<&CecMessage> {
        self.entries.get(&(address, opcode))
    }

    /// Drops everything learned from `address`, e.g. after it left the bus.
    pub fn flush_messages_from(&mut self, address: LogicalAddress) {
        self.entries.retain(|(source, _), _| *source != address);
    }

    pub fn flush_all(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::MessageCache;
    use rustcec_core::types::{DeviceType, LogicalAddress, Opcode, PhysicalAddress, PowerStatus};
    use rustcec_core::CecMessage;

    #[test]
    fn keeps_latest_cacheable_message_per_source() {
        let mut cache = MessageCache::new();
        let first = CecMessage::set_osd_name(LogicalAddress::Playback1, LogicalAddress::Tv, "Old");
        let second = CecMessage::set_osd_name(LogicalAddress::Playback1, LogicalAddress::Tv, "New");
        assert!(cache.put(&first));
        assert!(cache.put(&second));

        let cached = cache
            .get(LogicalAddress::Playback1, Opcode::SetOsdName)
            .unwrap();
        assert_eq!(cached.osd_name(), Some("New"));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn ignores_uncacheable_opcodes() {
        let mut cache = MessageCache::new();
        let power = CecMessage::report_power_status(
            LogicalAddress::Playback1,
            LogicalAddress::Tv,
            PowerStatus::On,
        );
        assert!(!cache.put(&power));
        assert!(!cache.put(&CecMessage::polling(
            LogicalAddress::Tv,
            LogicalAddress::Playback1
        )));
        assert!(cache.is_empty());
    }

    #[test]
    fn flush_removes_only_that_source() {
        let mut cache = MessageCache::new();
        cache.put(&CecMessage::report_physical_address(
            LogicalAddress::Playback1,
            PhysicalAddress::new(0x1000),
            DeviceType::Playback,
        ));
        cache.put(&CecMessage::report_physical_address(
            LogicalAddress::AudioSystem,
            PhysicalAddress::new(0x2000),
            DeviceType::AudioSystem,
        ));

        cache.flush_messages_from(LogicalAddress::Playback1);
        assert!(cache
            .get(LogicalAddress::Playback1, Opcode::ReportPhysicalAddress)
            .is_none());
        assert!(cache
            .get(LogicalAddress::AudioSystem, Opcode::ReportPhysicalAddress)
            .is_some());

        cache.flush_all();
        assert!(cache.is_empty());
    }
}
