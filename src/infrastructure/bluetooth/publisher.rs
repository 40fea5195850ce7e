//! Windows Advertisement Publisher
//!
//! Emits frames through `BluetoothLEAdvertisementPublisher`. The OS owns
//! the Flags structure and the advertising address, so only the remaining
//! AD structures are handed over and the address must be the adapter's.

use crate::domain::models::DeviceAddress;
use crate::infrastructure::bluetooth::protocol::{AdvertisementFrame, AD_TYPE_FLAGS};
use crate::infrastructure::bluetooth::transport::{
    AdvertisingConfig, BeaconTransport, TransportError,
};
use anyhow::Result;
use tracing::{debug, info, warn};
use windows::core::Interface;
use windows::Devices::Bluetooth::Advertisement::{
    BluetoothLEAdvertisementDataSection, BluetoothLEAdvertisementPublisher,
    BluetoothLEAdvertisementPublisherStatus,
};
use windows::Devices::Bluetooth::BluetoothAdapter;
use windows::Foundation::{IReference, PropertyValue};
use windows::Storage::Streams::DataWriter;
use windows_future::IAsyncOperation;

pub struct WindowsAdvertisementPublisher {
    adapter_address: DeviceAddress,
    config: Option<AdvertisingConfig>,
    publisher: Option<BluetoothLEAdvertisementPublisher>,
}

impl WindowsAdvertisementPublisher {
    /// Open the default adapter and check it can advertise
    pub async fn new() -> Result<Self> {
        let request: IAsyncOperation<BluetoothAdapter> = BluetoothAdapter::GetDefaultAsync()?;
        let adapter = request.await?;

        if !adapter.IsLowEnergySupported()? {
            anyhow::bail!("Default Bluetooth adapter does not support LE");
        }
        if !adapter.IsPeripheralRoleSupported()? {
            anyhow::bail!("Default Bluetooth adapter cannot advertise (no peripheral role)");
        }

        let adapter_address = DeviceAddress::from_u64(adapter.BluetoothAddress()?);
        info!("Using Bluetooth adapter {}", adapter_address);

        Ok(Self {
            adapter_address,
            config: None,
            publisher: None,
        })
    }

    fn build_publisher(
        &self,
        config: &AdvertisingConfig,
        frame: &AdvertisementFrame,
    ) -> windows::core::Result<BluetoothLEAdvertisementPublisher> {
        let publisher = BluetoothLEAdvertisementPublisher::new()?;
        let sections = publisher.Advertisement()?.DataSections()?;

        for (ad_type, value) in frame.ad_structures() {
            if ad_type == AD_TYPE_FLAGS {
                continue;
            }
            let writer = DataWriter::new()?;
            writer.WriteBytes(value)?;
            let section =
                BluetoothLEAdvertisementDataSection::Create(ad_type, &writer.DetachBuffer()?)?;
            sections.Append(&section)?;
        }

        let power: IReference<i16> =
            PropertyValue::CreateInt16(config.power_level.dbm() as i16)?.cast()?;
        publisher.SetPreferredTransmitPowerLevelInDBm(&power)?;

        Ok(publisher)
    }
}

impl BeaconTransport for WindowsAdvertisementPublisher {
    fn configure(&mut self, config: &AdvertisingConfig) -> Result<(), TransportError> {
        if config.address != self.adapter_address {
            return Err(TransportError::Configuration(format!(
                "adapter advertises as {}, cannot use {}",
                self.adapter_address, config.address
            )));
        }

        if self.config.as_ref() != Some(config) {
            debug!(
                "Interval {}..{}ms and channel map {:#04x} are managed by the OS",
                config.min_interval_ms,
                config.max_interval_ms,
                config.channel_map.bits()
            );
        }
        self.config = Some(config.clone());
        Ok(())
    }

    fn set_payload(&mut self, frame: &AdvertisementFrame) -> Result<(), TransportError> {
        let config = self
            .config
            .as_ref()
            .ok_or_else(|| TransportError::Payload("publisher not configured".to_string()))?;

        // Sections are fixed once a publisher starts; build a fresh one
        let publisher = self
            .build_publisher(config, frame)
            .map_err(|e| TransportError::Payload(e.message().to_string()))?;

        self.stop();
        self.publisher = Some(publisher);
        Ok(())
    }

    fn start(&mut self) -> Result<(), TransportError> {
        let publisher = self
            .publisher
            .as_ref()
            .ok_or_else(|| TransportError::Start("no payload set".to_string()))?;

        if publisher.Status().ok() == Some(BluetoothLEAdvertisementPublisherStatus::Started) {
            return Ok(());
        }

        publisher
            .Start()
            .map_err(|e| TransportError::Start(e.message().to_string()))?;

        match publisher.Status() {
            Ok(BluetoothLEAdvertisementPublisherStatus::Aborted) => Err(TransportError::Start(
                "publisher aborted by the Bluetooth stack".to_string(),
            )),
            Ok(_) => Ok(()),
            Err(e) => Err(TransportError::Start(e.message().to_string())),
        }
    }

    fn stop(&mut self) {
        if let Some(publisher) = &self.publisher {
            let running = matches!(
                publisher.Status(),
                Ok(BluetoothLEAdvertisementPublisherStatus::Started)
                    | Ok(BluetoothLEAdvertisementPublisherStatus::Waiting)
            );
            if running {
                if let Err(e) = publisher.Stop() {
                    warn!("Failed to stop publisher: {}", e.message());
                }
            }
        }
    }

    fn hardware_address(&self) -> Result<DeviceAddress, TransportError> {
        Ok(self.adapter_address)
    }

    fn address_fixed_by_platform(&self) -> bool {
        true
    }

    fn release(&mut self) {
        self.stop();
        self.publisher = None;
        self.config = None;
    }
}
