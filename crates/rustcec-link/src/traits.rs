use rustcec_core::{CecMessage, DecodeError};
use thiserror::Error;

/// Errors that can occur at the link layer.
#[derive(Debug, Error)]
pub enum LinkError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid frame: {0}")]
    InvalidFrame(#[from] DecodeError),
    #[error("frame not acknowledged")]
    Nack,
    #[error("bus busy")]
    Busy,
    #[error("transmit failed")]
    Failed,
    #[error("logical address {0} cannot own an endpoint")]
    InvalidAddress(u8),
    #[error("logical address {0} already in use")]
    AddressInUse(u8),
    #[error("link closed")]
    Closed,
}

/// Local delivery status of one transmitted frame.
///
/// This only reports whether the frame made it onto the bus and was
/// acknowledged; it says nothing about the remote device's answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SendResult {
    Success,
    Nack,
    Busy,
    Failed,
}

impl SendResult {
    pub fn from_outcome(outcome: &Result<(), LinkError>) -> Self {
        match outcome {
            Ok(()) => Self::Success,
            Err(LinkError::Nack) => Self::Nack,
            Err(LinkError::Busy) => Self::Busy,
            Err(_) => Self::Failed,
        }
    }

    pub const fn is_success(self) -> bool {
        matches!(self, Self::Success)
    }
}

/// Async trait for transmitting and receiving CEC frames.
///
/// A polling message (a frame without an opcode) resolves `Ok(())` when the
/// destination acknowledged it and `Err(LinkError::Nack)` otherwise.
pub trait CecLink: Send + Sync {
    /// Transmits `message`, resolving with its local delivery status.
    async fn send(&self, message: &CecMessage) -> Result<(), LinkError>;

    /// Receives the next frame addressed to this link (directed or broadcast).
    async fn recv(&self) -> Result<CecMessage, LinkError>;
}

#[cfg(test)]
mod tests {
    use super::{LinkError, SendResult};

    #[test]
    fn send_result_classifies_outcomes() {
        assert_eq!(SendResult::from_outcome(&Ok(())), SendResult::Success);
        assert_eq!(SendResult::from_outcome(&Err(LinkError::Nack)), SendResult::Nack);
        assert_eq!(SendResult::from_outcome(&Err(LinkError::Busy)), SendResult::Busy);
        assert_eq!(SendResult::from_outcome(&Err(LinkError::Closed)), SendResult::Failed);
        assert!(!SendResult::Nack.is_success());
    }
}
