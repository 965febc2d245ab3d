use rustcec_core::types::{DeviceType, LogicalAddress};
use rustcec_link::LinkError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("link error: {0}")]
    Link(#[from] LinkError),
    #[error("encode error: {0}")]
    Encode(#[from] rustcec_core::EncodeError),
    #[error("decode error: {0}")]
    Decode(#[from] rustcec_core::DecodeError),
    #[error("logical address {address} is not a {expected:?} address")]
    InvalidAddressType {
        address: LogicalAddress,
        expected: DeviceType,
    },
    #[error("controller is no longer running")]
    ControllerClosed,
    #[error("action finished without reporting a result")]
    Cancelled,
}
