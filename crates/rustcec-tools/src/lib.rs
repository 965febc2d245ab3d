use clap::ValueEnum;
use rustcec_client::{ArcDirection, SimulatedDevice, SimulatedProfile};
use rustcec_core::types::LogicalAddress;
use rustcec_link::{LinkError, VirtualBus};
use serde::Deserialize;
use std::path::Path;
use tokio::task::JoinHandle;

/// CLI-friendly ARC direction.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ArcDirectionArg {
    Initiate,
    Terminate,
}

impl ArcDirectionArg {
    pub const fn into_direction(self) -> ArcDirection {
        match self {
            Self::Initiate => ArcDirection::Initiation,
            Self::Terminate => ArcDirection::Termination,
        }
    }
}

/// Parses a logical address given as decimal (`5`) or hex (`0x5`).
pub fn parse_logical_address(s: &str) -> Result<LogicalAddress, String> {
    let value = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => s.parse::<u8>(),
    }
    .map_err(|e| format!("invalid logical address '{s}': {e}"))?;
    if value > 14 {
        return Err(format!("logical address {value} is not a device address"));
    }
    Ok(LogicalAddress::from_u8(value))
}

/// One simulated device in a bus description.
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceSpec {
    pub logical_address: u8,
    #[serde(flatten)]
    pub profile: SimulatedProfile,
}

/// A simulated CEC bus, as read from a JSON file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BusSpec {
    #[serde(default)]
    pub devices: Vec<DeviceSpec>,
}

impl BusSpec {
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, Box<dyn std::error::Error>> {
        let text = std::fs::read_to_string(path)?;
        Ok(Self::from_json(&text)?)
    }

    /// Attaches every described device to `bus` and runs it in the background.
    /// Each device first broadcasts its physical address, as on hotplug.
    pub async fn spawn(&self, bus: &VirtualBus) -> Result<Vec<JoinHandle<()>>, LinkError> {
        let mut tasks = Vec::with_capacity(self.devices.len());
        for spec in &self.devices {
            let address = LogicalAddress::from_u8(spec.logical_address);
            let link = bus.attach(address).await?;
            let sim = SimulatedDevice::new(address, link, spec.profile.clone());
            tasks.push(tokio::spawn(async move {
                if let Err(e) = sim.announce().await {
                    log::debug!("simulated device {address} announce failed: {e}");
                }
                if let Err(e) = sim.run().await {
                    log::debug!("simulated device {address} stopped: {e}");
                }
            }));
        }
        Ok(tasks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rustcec_client::{ArcResponse, Reply};
    use rustcec_core::types::{DeviceType, PhysicalAddress, PowerStatus};
    use rustcec_link::CecLink;

    #[test]
    fn parses_bundled_bus() {
        let spec = BusSpec::from_json(include_str!("../buses/living_room.json")).unwrap();
        assert_eq!(spec.devices.len(), 3);
        let player = &spec.devices[0].profile;
        assert_eq!(player.physical_address, PhysicalAddress::new(0x1000));
        assert_eq!(player.osd_name, Reply::Answer("Blu-ray".to_string()));
        assert_eq!(player.power_status, Reply::Answer(PowerStatus::Standby));

        let avr = &spec.devices[1].profile;
        assert_eq!(avr.device_type, DeviceType::AudioSystem);
        assert_eq!(avr.arc, ArcResponse::Accept);
        assert_eq!(spec.devices[2].profile.osd_name, Reply::Silent);
        assert!(spec.devices[2].profile.answers_physical_address);
    }

    #[test]
    fn logical_address_parsing() {
        assert_eq!(parse_logical_address("5"), Ok(LogicalAddress::AudioSystem));
        assert_eq!(parse_logical_address("0xE"), Ok(LogicalAddress::SpecificUse));
        assert!(parse_logical_address("15").is_err());
        assert!(parse_logical_address("tv").is_err());
    }

    #[tokio::test]
    async fn spawn_attaches_devices() {
        let spec = BusSpec::from_json(include_str!("../buses/living_room.json")).unwrap();
        let bus = VirtualBus::new();
        let tasks = spec.spawn(&bus).await.unwrap();
        assert_eq!(tasks.len(), 3);
        assert_eq!(
            bus.attached().await,
            vec![
                LogicalAddress::Playback1,
                LogicalAddress::AudioSystem,
                LogicalAddress::Playback2
            ]
        );
        for task in tasks {
            task.abort();
        }
    }

    #[tokio::test]
    async fn spawned_devices_announce_themselves() {
        let spec = BusSpec::from_json(include_str!("../buses/living_room.json")).unwrap();
        let bus = VirtualBus::new();
        let tv = bus.attach(LogicalAddress::Tv).await.unwrap();
        let tasks = spec.spawn(&bus).await.unwrap();

        let mut announced = Vec::new();
        for _ in 0..spec.devices.len() {
            let message = tokio::time::timeout(std::time::Duration::from_secs(1), tv.recv())
                .await
                .unwrap()
                .unwrap();
            assert!(message.is_broadcast());
            assert!(message.physical_address().is_some());
            announced.push(message.source);
        }
        announced.sort();
        assert_eq!(
            announced,
            vec![
                LogicalAddress::Playback1,
                LogicalAddress::AudioSystem,
                LogicalAddress::Playback2
            ]
        );
        for task in tasks {
            task.abort();
        }
    }
}
