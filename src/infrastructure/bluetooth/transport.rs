//! Radio Transport Module
//!
//! The seam between the beacon controller and whatever actually emits
//! advertisements. Implementations hold only the state the radio needs.

use crate::domain::models::{
    ChannelMap, DeviceAddress, FailureReason, FailureStage, PowerLevel,
};
use crate::infrastructure::bluetooth::protocol::AdvertisementFrame;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("radio rejected advertising configuration: {0}")]
    Configuration(String),
    #[error("radio rejected advertisement payload: {0}")]
    Payload(String),
    #[error("radio failed to start advertising: {0}")]
    Start(String),
    #[error("radio does not support this: {0}")]
    Unsupported(String),
}

impl From<&TransportError> for FailureReason {
    fn from(err: &TransportError) -> Self {
        let (stage, message) = match err {
            TransportError::Configuration(m) | TransportError::Unsupported(m) => {
                (FailureStage::Configuration, m)
            }
            TransportError::Payload(m) => (FailureStage::Payload, m),
            TransportError::Start(m) => (FailureStage::Start, m),
        };
        FailureReason {
            stage,
            message: message.clone(),
        }
    }
}

/// Address and radio parameters for one transmit session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdvertisingConfig {
    pub address: DeviceAddress,
    pub min_interval_ms: u16,
    pub max_interval_ms: u16,
    pub channel_map: ChannelMap,
    pub power_level: PowerLevel,
}

/// Platform advertising primitive
///
/// `stop` must be a no-op when nothing is being emitted. The other calls
/// must tolerate being repeated with the radio already in the target state.
pub trait BeaconTransport {
    fn configure(&mut self, config: &AdvertisingConfig) -> Result<(), TransportError>;

    fn set_payload(&mut self, frame: &AdvertisementFrame) -> Result<(), TransportError>;

    /// Begin emitting with the last configuration and payload
    fn start(&mut self) -> Result<(), TransportError>;

    fn stop(&mut self);

    /// The radio's own address, for the host-hardware address policy
    fn hardware_address(&self) -> Result<DeviceAddress, TransportError>;

    /// True when the platform always advertises from the hardware address
    fn address_fixed_by_platform(&self) -> bool {
        false
    }

    /// Give the radio back to the platform on shutdown
    fn release(&mut self) {
        self.stop();
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_reason_stage() {
        let reason = FailureReason::from(&TransportError::Payload("too long".into()));
        assert_eq!(reason.stage, FailureStage::Payload);
        assert_eq!(reason.to_string(), "payload failed: too long");

        let reason = FailureReason::from(&TransportError::Unsupported("no address".into()));
        assert_eq!(reason.stage, FailureStage::Configuration);
    }
}
