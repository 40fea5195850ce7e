//! Beacon Advertisement Protocol
//!
//! Wire layout of the spoofed advertisement and the counter-driven payload
//! mutation used while fuzzing.
//!
//! # Frame Structure (31 bytes, legacy advertising ceiling)
//!
//! ```text
//! [0]     : 0x02  AD length (flags)
//! [1]     : 0x01  AD type Flags
//! [2]     : 0x06  LE General Discoverable, BR/EDR not supported
//! [3]     : 0x1B  AD length (1 type + 2 uuid + 24 payload)
//! [4]     : 0x16  AD type Service Data, 16-bit UUID
//! [5-6]   : 0x6C 0xFE  service UUID 0xFE6C, little-endian
//! [7-30]  : 24 payload bytes
//! ```

/// Service data UUID of the impersonated protocol
pub const SERVICE_UUID: u16 = 0xFE6C;

pub const PAYLOAD_LEN: usize = 24;

/// Legacy advertising data limit
pub const MAX_FRAME_LEN: usize = 31;

pub const AD_TYPE_FLAGS: u8 = 0x01;
pub const AD_TYPE_SERVICE_DATA_16: u8 = 0x16;

/// LE General Discoverable | BR/EDR Not Supported
pub const FLAGS_VALUE: u8 = 0x06;

const SERVICE_DATA_LEN: u8 = (1 + 2 + PAYLOAD_LEN) as u8;

/// Payload offsets rewritten on every fuzz tick
pub const MUTATION_OFFSETS: [usize; 4] = [10, 11, 20, 21];

pub type Payload = [u8; PAYLOAD_LEN];

/// Unmodified payload identifying the impersonated device
pub const BASE_PAYLOAD: Payload = [
    0x01, 0x58, 0x38, 0x37, 0x30, 0x30, 0x32, 0x46, //
    0x50, 0x34, 0x01, 0x02, 0x00, 0x00, 0x00, 0x00, //
    0xCE, 0x1B, 0x33, 0x00, 0x00, 0x02, 0x00, 0x00,
];

/// A complete advertisement, replaced rather than edited
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdvertisementFrame {
    bytes: [u8; MAX_FRAME_LEN],
}

impl AdvertisementFrame {
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Iterate the AD structures as `(ad_type, value)` pairs
    pub fn ad_structures(&self) -> AdStructures<'_> {
        AdStructures {
            remaining: &self.bytes,
        }
    }

    /// Space separated upper-case hex, for logs
    pub fn to_hex(&self) -> String {
        hex_string(&self.bytes)
    }
}

pub struct AdStructures<'a> {
    remaining: &'a [u8],
}

impl<'a> Iterator for AdStructures<'a> {
    type Item = (u8, &'a [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        let (&len, rest) = self.remaining.split_first()?;
        let len = len as usize;
        // Zero length marks early termination of significant data
        if len == 0 || len > rest.len() {
            self.remaining = &[];
            return None;
        }
        let (structure, rest) = rest.split_at(len);
        self.remaining = rest;
        Some((structure[0], &structure[1..]))
    }
}

/// Build the flags + service-data advertisement around a 24-byte payload
pub fn build_frame(payload: &Payload) -> AdvertisementFrame {
    let mut bytes = [0u8; MAX_FRAME_LEN];
    let uuid = SERVICE_UUID.to_le_bytes();

    bytes[..7].copy_from_slice(&[
        0x02,
        AD_TYPE_FLAGS,
        FLAGS_VALUE,
        SERVICE_DATA_LEN,
        AD_TYPE_SERVICE_DATA_16,
        uuid[0],
        uuid[1],
    ]);
    bytes[7..].copy_from_slice(payload);

    AdvertisementFrame { bytes }
}

/// The four bytes a given counter writes at [`MUTATION_OFFSETS`]
///
/// The second pair is shifted by a nibble so two distinct protocol fields
/// see different bit patterns on the same tick.
pub fn mutation_bytes(counter: u16) -> [u8; 4] {
    [
        (counter >> 8) as u8,
        counter as u8,
        (counter >> 4) as u8,
        (counter << 4) as u8,
    ]
}

/// Copy of `base` with the mutation bytes for `counter` applied
pub fn apply_mutation(base: &Payload, counter: u16) -> Payload {
    let mut payload = *base;
    for (offset, byte) in MUTATION_OFFSETS.iter().zip(mutation_bytes(counter)) {
        payload[*offset] = byte;
    }
    payload
}

pub fn hex_string(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}
