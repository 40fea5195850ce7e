//! Dry-Run Transport
//!
//! Stands in for a radio on hosts without advertising support: every
//! frame that would have gone on air is written to the log instead.

use crate::domain::models::DeviceAddress;
use crate::infrastructure::bluetooth::protocol::{hex_string, AdvertisementFrame};
use crate::infrastructure::bluetooth::transport::{
    AdvertisingConfig, BeaconTransport, TransportError,
};
use tracing::{debug, info, trace};

#[derive(Debug, Default)]
pub struct DryRunTransport {
    hardware_address: Option<DeviceAddress>,
    config: Option<AdvertisingConfig>,
    frame: Option<AdvertisementFrame>,
    emitting: bool,
}

impl DryRunTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pretend the host radio owns `address`
    pub fn with_hardware_address(mut self, address: DeviceAddress) -> Self {
        self.hardware_address = Some(address);
        self
    }

    #[cfg(test)]
    pub fn is_emitting(&self) -> bool {
        self.emitting
    }
}

impl BeaconTransport for DryRunTransport {
    fn configure(&mut self, config: &AdvertisingConfig) -> Result<(), TransportError> {
        if self.config.as_ref() != Some(config) {
            debug!(
                "Dry run config: addr={} interval={}..{}ms channels={:#04x} power={}dBm",
                config.address,
                config.min_interval_ms,
                config.max_interval_ms,
                config.channel_map.bits(),
                config.power_level.dbm()
            );
        }
        self.config = Some(config.clone());
        Ok(())
    }

    fn set_payload(&mut self, frame: &AdvertisementFrame) -> Result<(), TransportError> {
        for (ad_type, value) in frame.ad_structures() {
            trace!("AD {:#04x}: {}", ad_type, hex_string(value));
        }
        self.frame = Some(frame.clone());
        Ok(())
    }

    fn start(&mut self) -> Result<(), TransportError> {
        let config = self
            .config
            .as_ref()
            .ok_or_else(|| TransportError::Start("not configured".to_string()))?;
        let frame = self
            .frame
            .as_ref()
            .ok_or_else(|| TransportError::Start("no payload".to_string()))?;

        if !self.emitting {
            info!("[dry run] {} -> {}", config.address, frame.to_hex());
        }
        self.emitting = true;
        Ok(())
    }

    fn stop(&mut self) {
        self.emitting = false;
    }

    fn hardware_address(&self) -> Result<DeviceAddress, TransportError> {
        self.hardware_address.ok_or_else(|| {
            TransportError::Unsupported("dry run has no hardware address".to_string())
        })
    }
}
