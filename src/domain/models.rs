use rand::Rng;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Vendor OUI of the impersonated device family (00:25:DF)
pub const VENDOR_OUI: [u8; 3] = [0x00, 0x25, 0xDF];

/// A 6-byte link-layer address, most significant octet first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceAddress([u8; 6]);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AddressParseError {
    #[error("expected 6 colon-separated octets, got {0}")]
    WrongLength(usize),
    #[error("invalid octet '{0}'")]
    InvalidOctet(String),
}

impl DeviceAddress {
    pub const fn new(octets: [u8; 6]) -> Self {
        Self(octets)
    }

    /// Vendor prefix followed by three random device-specific octets
    pub fn with_vendor_prefix<R: Rng>(oui: [u8; 3], rng: &mut R) -> Self {
        let mut octets = [0u8; 6];
        octets[..3].copy_from_slice(&oui);
        rng.fill(&mut octets[3..]);
        Self(octets)
    }

    /// Build from the 48-bit integer form used by host Bluetooth stacks
    #[cfg_attr(not(windows), allow(dead_code))]
    pub fn from_u64(raw: u64) -> Self {
        let bytes = raw.to_be_bytes();
        let mut octets = [0u8; 6];
        octets.copy_from_slice(&bytes[2..]);
        Self(octets)
    }

    pub fn octets(&self) -> [u8; 6] {
        self.0
    }

    pub fn vendor_prefix(&self) -> [u8; 3] {
        [self.0[0], self.0[1], self.0[2]]
    }
}

impl fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let o = self.octets();
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            o[0], o[1], o[2], o[3], o[4], o[5]
        )
    }
}

impl FromStr for DeviceAddress {
    type Err = AddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.trim().split(':').collect();
        if parts.len() != 6 {
            return Err(AddressParseError::WrongLength(parts.len()));
        }

        let mut octets = [0u8; 6];
        for (octet, part) in octets.iter_mut().zip(parts) {
            if part.len() != 2 {
                return Err(AddressParseError::InvalidOctet(part.to_string()));
            }
            *octet = u8::from_str_radix(part, 16)
                .map_err(|_| AddressParseError::InvalidOctet(part.to_string()))?;
        }
        Ok(Self(octets))
    }
}

impl Serialize for DeviceAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for DeviceAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// How the advertising address of a transmit session is chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AddressPolicy {
    /// Fixed vendor OUI, random lower half, regenerated every session
    RandomizedVendorPrefix {
        #[serde(default = "default_oui")]
        oui: [u8; 3],
    },
    /// The host radio's own address, never modified
    HostHardwareAddress,
}

fn default_oui() -> [u8; 3] {
    VENDOR_OUI
}

impl Default for AddressPolicy {
    fn default() -> Self {
        Self::RandomizedVendorPrefix { oui: VENDOR_OUI }
    }
}

/// Primary advertising channels to emit on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelMap {
    #[default]
    All,
    Ch37,
    Ch38,
    Ch39,
}

impl ChannelMap {
    /// HCI channel map bitmask
    pub fn bits(&self) -> u8 {
        match self {
            Self::All => 0x07,
            Self::Ch37 => 0x01,
            Self::Ch38 => 0x02,
            Self::Ch39 => 0x04,
        }
    }
}

/// Requested transmit power
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PowerLevel {
    Minus40,
    Minus20,
    Minus12,
    Minus6,
    Zero,
    Plus4,
    #[default]
    Plus6,
}

impl PowerLevel {
    pub fn dbm(&self) -> i8 {
        match self {
            Self::Minus40 => -40,
            Self::Minus20 => -20,
            Self::Minus12 => -12,
            Self::Minus6 => -6,
            Self::Zero => 0,
            Self::Plus4 => 4,
            Self::Plus6 => 6,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BeaconState {
    #[default]
    Idle,
    Transmitting,
    TransmittingFuzzing,
}

impl BeaconState {
    pub fn is_active(&self) -> bool {
        !matches!(self, Self::Idle)
    }
}

/// Which radio step rejected a transmission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureStage {
    Configuration,
    Payload,
    Start,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureReason {
    pub stage: FailureStage,
    pub message: String,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stage = match self.stage {
            FailureStage::Configuration => "configuration",
            FailureStage::Payload => "payload",
            FailureStage::Start => "start",
        };
        write!(f, "{} failed: {}", stage, self.message)
    }
}

/// Feedback emitted by the beacon controller for whatever renders it
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BeaconEvent {
    TransmissionStarted { address: DeviceAddress, fuzz: bool },
    TransmissionFailed(FailureReason),
    TransmissionStopped,
    /// Bytes written at payload offsets 10, 11, 20, 21
    FuzzTick { counter: u16, mutated_bytes: [u8; 4] },
    /// One advertisement went out; `fuzzed` marks a mutated payload
    Pulse { fuzzed: bool },
}

/// Point-in-time view of the controller for display layers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BeaconStatus {
    pub state: BeaconState,
    pub counter: u16,
    pub last_mutation: Option<[u8; 4]>,
    pub address: Option<DeviceAddress>,
}
