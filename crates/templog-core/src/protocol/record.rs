//! Configuration record encoding
//!
//! The record armed into the device by the `i` exchange. Layout (28 bytes,
//! little-endian):
//! - 4 bytes: start timestamp, epoch seconds (u32)
//! - 4 bytes: wake-up interval, seconds (u32)
//! - 16 bytes: personal ID, UTF-8, at most 15 bytes, NUL padded
//! - 4 bytes: checksum, sum of the 24 preceding bytes mod 2^32 (u32)

use byteorder::{ByteOrder, LittleEndian};

/// Size of the encoded record
pub const RECORD_LEN: usize = 28;

/// Size of the identifier field
pub const ID_FIELD_LEN: usize = 16;

/// Longest identifier kept; the last byte of the field stays NUL
pub const ID_MAX_BYTES: usize = ID_FIELD_LEN - 1;

/// Bytes covered by the checksum
const PAYLOAD_LEN: usize = 4 + 4 + ID_FIELD_LEN;

/// Configuration record sent to the device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfigRecord {
    /// Start time, epoch seconds (low 32 bits of the requested value)
    pub timestamp: u32,
    /// Sampling interval in seconds
    pub wakeup_interval: u32,
    /// NUL-padded identifier field
    pub personal_id: [u8; ID_FIELD_LEN],
}

impl ConfigRecord {
    /// Build a record. Timestamps past `u32::MAX` keep their low 32 bits.
    pub fn new(timestamp: u64, personal_id: &str, wakeup_interval: u32) -> Self {
        Self {
            timestamp: truncate_timestamp(timestamp),
            wakeup_interval,
            personal_id: encode_identifier(personal_id),
        }
    }

    /// Identifier as text, without the padding
    pub fn personal_id_text(&self) -> String {
        let end = self
            .personal_id
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(ID_FIELD_LEN);
        String::from_utf8_lossy(&self.personal_id[..end]).into_owned()
    }

    fn payload(&self) -> [u8; PAYLOAD_LEN] {
        let mut bytes = [0u8; PAYLOAD_LEN];
        LittleEndian::write_u32(&mut bytes[0..4], self.timestamp);
        LittleEndian::write_u32(&mut bytes[4..8], self.wakeup_interval);
        bytes[8..PAYLOAD_LEN].copy_from_slice(&self.personal_id);
        bytes
    }

    /// Checksum over the timestamp, interval and identifier fields
    pub fn checksum(&self) -> u32 {
        checksum(&self.payload())
    }

    /// Encode the record to raw bytes
    pub fn to_bytes(&self) -> [u8; RECORD_LEN] {
        let payload = self.payload();
        let mut bytes = [0u8; RECORD_LEN];
        bytes[..PAYLOAD_LEN].copy_from_slice(&payload);
        LittleEndian::write_u32(&mut bytes[PAYLOAD_LEN..], checksum(&payload));
        bytes
    }
}

/// Low 32 bits of an epoch timestamp
pub fn truncate_timestamp(timestamp: u64) -> u32 {
    (timestamp & u64::from(u32::MAX)) as u32
}

/// UTF-8 bytes of `id`, cut to [`ID_MAX_BYTES`] and NUL padded.
///
/// Truncation is by byte, so a multi-byte character may be split.
pub fn encode_identifier(id: &str) -> [u8; ID_FIELD_LEN] {
    let mut field = [0u8; ID_FIELD_LEN];
    let bytes = id.as_bytes();
    let len = bytes.len().min(ID_MAX_BYTES);
    field[..len].copy_from_slice(&bytes[..len]);
    field
}

/// Unsigned byte sum, wrapping at 2^32
pub fn checksum(bytes: &[u8]) -> u32 {
    bytes
        .iter()
        .fold(0u32, |acc, &b| acc.wrapping_add(u32::from(b)))
}
