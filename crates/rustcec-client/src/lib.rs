pub mod action;
pub mod arc;
pub mod cache;
pub mod controller;
pub mod discovery;
pub mod dispatch;
pub mod error;
pub mod local_device;
pub mod simulator;

pub use action::{
    ActionContext, ControlResult, Effect, FeatureAction, LocalEvent, PollOrder, PollRequest,
    PollStrategy, RequestToken,
};
pub use arc::{ArcConfig, ArcDirection, RequestArcAction};
pub use cache::MessageCache;
pub use controller::{CecControllerBuilder, CecControllerHandle};
pub use discovery::{DeviceDiscoveryAction, DiscoveryConfig, DiscoveryState, HdmiDeviceInfo};
pub use dispatch::{ActionEnv, ActionId, Dispatcher};
pub use error::ClientError;
pub use local_device::{LocalDevice, LocalDeviceHandler, LocalRole, PortId, PortInfo, SwitchInfo};
pub use rustcec_link::SendResult;
pub use simulator::{ArcResponse, Reply, SimulatedDevice, SimulatedProfile};
