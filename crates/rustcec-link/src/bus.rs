//! In-memory CEC bus.
//!
//! [`VirtualBus`] connects any number of [`VirtualLink`] endpoints, each
//! owning one logical address. Frames travel encoded, the way they would on
//! the wire, and are decoded on receipt. Directed frames are acknowledged only
//! when the destination is attached; broadcast frames always succeed.

use crate::{CecLink, LinkError};
use rustcec_core::encoding::writer::Writer;
use rustcec_core::message::MAX_FRAME_LEN;
use rustcec_core::types::LogicalAddress;
use rustcec_core::CecMessage;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

type FrameSender = mpsc::UnboundedSender<Vec<u8>>;

#[derive(Debug, Default)]
struct BusState {
    endpoints: HashMap<LogicalAddress, FrameSender>,
}

/// Shared handle to an in-memory CEC bus.
#[derive(Debug, Clone, Default)]
pub struct VirtualBus {
    state: Arc<Mutex<BusState>>,
}

impl VirtualBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches a new endpoint owning `address`.
    pub async fn attach(&self, address: LogicalAddress) -> Result<VirtualLink, LinkError> {
        if !address.is_valid_device_address() {
            return Err(LinkError::InvalidAddress(address.to_u8()));
        }
        let mut state = self.state.lock().await;
        if let Some(existing) = state.endpoints.get(&address) {
            if !existing.is_closed() {
                return Err(LinkError::AddressInUse(address.to_u8()));
            }
        }
        let (tx, rx) = mpsc::unbounded_channel();
        state.endpoints.insert(address, tx);
        Ok(VirtualLink {
            address,
            bus: self.clone(),
            rx: Arc::new(Mutex::new(rx)),
        })
    }

    /// Removes the endpoint owning `address`, if any.
    pub async fn detach(&self, address: LogicalAddress) {
        self.state.lock().await.endpoints.remove(&address);
    }

    /// Addresses with a live endpoint, ascending.
    pub async fn attached(&self) -> Vec<LogicalAddress> {
        let state = self.state.lock().await;
        let mut addresses: Vec<_> = state
            .endpoints
            .iter()
            .filter(|(_, tx)| !tx.is_closed())
            .map(|(address, _)| *address)
            .collect();
        addresses.sort();
        addresses
    }

    async fn transmit(
        &self,
        sender: LogicalAddress,
        message: &CecMessage,
    ) -> Result<(), LinkError> {
        let mut buf = [0u8; MAX_FRAME_LEN];
        let mut w = Writer::new(&mut buf);
        message
            .encode(&mut w)
            .map_err(|_| LinkError::Failed)?;
        let frame = w.as_written().to_vec();
        log::trace!("bus: {sender} sends {message}");

        let mut state = self.state.lock().await;
        state.endpoints.retain(|_, tx| !tx.is_closed());

        if message.is_broadcast() {
            for (address, tx) in &state.endpoints {
                if *address != sender {
                    let _ = tx.send(frame.clone());
                }
            }
            return Ok(());
        }

        if message.destination == sender {
            return Err(LinkError::Nack);
        }
        let Some(tx) = state.endpoints.get(&message.destination) else {
            return Err(LinkError::Nack);
        };
        if message.is_polling() {
            return Ok(());
        }
        tx.send(frame).map_err(|_| LinkError::Nack)
    }
}

/// One endpoint on a [`VirtualBus`].
#[derive(Debug, Clone)]
pub struct VirtualLink {
    address: LogicalAddress,
    bus: VirtualBus,
    rx: Arc<Mutex<mpsc::UnboundedReceiver<Vec<u8>>>>,
}

impl VirtualLink {
    pub fn address(&self) -> LogicalAddress {
        self.address
    }

    pub fn bus(&self) -> &VirtualBus {
        &self.bus
    }
}

impl CecLink for VirtualLink {
    async fn send(&self, message: &CecMessage) -> Result<(), LinkError> {
        self.bus.transmit(self.address, message).await
    }

    async fn recv(&self) -> Result<CecMessage, LinkError> {
        let mut rx = self.rx.lock().await;
        let Some(frame) = rx.recv().await else {
            return Err(LinkError::Closed);
        };
        Ok(CecMessage::decode(&frame)?)
    }
}

#[cfg(test)]
mod tests {
    use super::VirtualBus;
    use crate::{CecLink, LinkError};
    use rustcec_core::types::LogicalAddress;
    use rustcec_core::CecMessage;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn directed_frame_reaches_destination_only() {
        let bus = VirtualBus::new();
        let tv = bus.attach(LogicalAddress::Tv).await.unwrap();
        let player = bus.attach(LogicalAddress::Playback1).await.unwrap();
        let avr = bus.attach(LogicalAddress::AudioSystem).await.unwrap();

        let query = CecMessage::give_osd_name(LogicalAddress::Tv, LogicalAddress::Playback1);
        tv.send(&query).await.unwrap();

        assert_eq!(player.recv().await.unwrap(), query);
        assert!(timeout(Duration::from_millis(20), avr.recv()).await.is_err());
    }

    #[tokio::test]
    async fn polling_acks_attached_addresses() {
        let bus = VirtualBus::new();
        let tv = bus.attach(LogicalAddress::Tv).await.unwrap();
        let _player = bus.attach(LogicalAddress::Playback1).await.unwrap();

        let present = CecMessage::polling(LogicalAddress::Tv, LogicalAddress::Playback1);
        let absent = CecMessage::polling(LogicalAddress::Tv, LogicalAddress::Recorder1);
        assert!(tv.send(&present).await.is_ok());
        assert!(matches!(tv.send(&absent).await, Err(LinkError::Nack)));
    }

    #[tokio::test]
    async fn broadcast_skips_sender() {
        let bus = VirtualBus::new();
        let tv = bus.attach(LogicalAddress::Tv).await.unwrap();
        let player = bus.attach(LogicalAddress::Playback1).await.unwrap();

        let msg = CecMessage::report_physical_address(
            LogicalAddress::Playback1,
            rustcec_core::types::PhysicalAddress::new(0x1000),
            rustcec_core::types::DeviceType::Playback,
        );
        player.send(&msg).await.unwrap();
        assert_eq!(tv.recv().await.unwrap(), msg);
        assert!(timeout(Duration::from_millis(20), player.recv()).await.is_err());
    }

    #[tokio::test]
    async fn address_cannot_be_attached_twice() {
        let bus = VirtualBus::new();
        let _first = bus.attach(LogicalAddress::Playback1).await.unwrap();
        assert!(matches!(
            bus.attach(LogicalAddress::Playback1).await,
            Err(LinkError::AddressInUse(4))
        ));
        assert_eq!(bus.attached().await, vec![LogicalAddress::Playback1]);
    }

    #[tokio::test]
    async fn detached_destination_nacks() {
        let bus = VirtualBus::new();
        let tv = bus.attach(LogicalAddress::Tv).await.unwrap();
        let _avr = bus.attach(LogicalAddress::AudioSystem).await.unwrap();
        bus.detach(LogicalAddress::AudioSystem).await;

        let request =
            CecMessage::request_arc_initiation(LogicalAddress::Tv, LogicalAddress::AudioSystem);
        assert!(matches!(tv.send(&request).await, Err(LinkError::Nack)));
    }
}
