//! On-disk record layout for the append log.
//!
//! Each record is a sequence of consecutive fields with no padding:
//!
//! ```text
//! [8 bytes: timestamp (little-endian u64)]
//! [4 bytes: key length (little-endian u32)]
//! [key bytes]
//! [4 bytes: value length (little-endian u32)]
//! [value bytes]
//! ```
//!
//! A value length of `u32::MAX` marks a tombstone (logical delete); a
//! tombstone record carries no value bytes. Zero-length values are ordinary
//! values, so empty values round-trip.
//!
//! The total record length is recoverable from the header fields alone
//! (`FIXED_OVERHEAD + key_len + value_len`), which is what lets the key
//! directory address records by offset and length.

use crate::error::{LogError, LogResult};

/// Fixed bytes per record: timestamp + key length + value length.
pub const FIXED_OVERHEAD: u32 = 16;

/// Value-length marker for a tombstone record.
pub const TOMBSTONE_LEN: u32 = u32::MAX;

/// A single decoded log record.
///
/// `value` is `None` for tombstones. Records are immutable once written;
/// this type only exists in memory on either side of the codec.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogRecord {
    /// Seconds since the Unix epoch at write time.
    pub timestamp: u64,
    /// The record's key.
    pub key: Vec<u8>,
    /// The record's value, or `None` for a tombstone.
    pub value: Option<Vec<u8>>,
}

impl LogRecord {
    /// Total encoded length of this record in bytes.
    pub fn encoded_len(&self) -> u64 {
        let value_len = self.value.as_ref().map_or(0, Vec::len) as u64;
        FIXED_OVERHEAD as u64 + self.key.len() as u64 + value_len
    }

    /// Encode into a single contiguous buffer.
    ///
    /// Fails with [`LogError::RecordTooLarge`] if the key or value exceeds
    /// the 4-byte length field (the tombstone marker is reserved).
    pub fn encode(&self) -> LogResult<Vec<u8>> {
        if self.key.len() >= TOMBSTONE_LEN as usize {
            return Err(LogError::RecordTooLarge { len: self.key.len() });
        }
        let value_len = match &self.value {
            Some(value) => {
                if value.len() >= TOMBSTONE_LEN as usize {
                    return Err(LogError::RecordTooLarge { len: value.len() });
                }
                value.len() as u32
            }
            None => TOMBSTONE_LEN,
        };

        let mut buf = Vec::with_capacity(self.encoded_len() as usize);
        buf.extend_from_slice(&self.timestamp.to_le_bytes());
        buf.extend_from_slice(&(self.key.len() as u32).to_le_bytes());
        buf.extend_from_slice(&self.key);
        buf.extend_from_slice(&value_len.to_le_bytes());
        if let Some(value) = &self.value {
            buf.extend_from_slice(value);
        }
        Ok(buf)
    }

    /// Decode a record from a buffer containing exactly one record.
    ///
    /// `offset` is the record's position in the log, used only for error
    /// reporting.
    pub fn decode(buf: &[u8], offset: u64) -> LogResult<Self> {
        let corrupt = |reason: &str| LogError::Corrupt {
            offset,
            reason: reason.to_string(),
        };

        if buf.len() < 12 {
            return Err(corrupt("record shorter than its fixed header"));
        }
        let timestamp = u64::from_le_bytes(buf[0..8].try_into().expect("sliced 8 bytes"));
        let key_len = u32::from_le_bytes(buf[8..12].try_into().expect("sliced 4 bytes")) as usize;

        let key_end = 12 + key_len;
        if buf.len() < key_end + 4 {
            return Err(corrupt("declared key length runs past the record"));
        }
        let key = buf[12..key_end].to_vec();
        let value_len =
            u32::from_le_bytes(buf[key_end..key_end + 4].try_into().expect("sliced 4 bytes"));

        let value = if value_len == TOMBSTONE_LEN {
            if buf.len() != key_end + 4 {
                return Err(corrupt("tombstone record carries value bytes"));
            }
            None
        } else {
            let value_end = key_end + 4 + value_len as usize;
            if buf.len() != value_end {
                return Err(corrupt("declared value length disagrees with the record"));
            }
            Some(buf[key_end + 4..value_end].to_vec())
        };

        Ok(Self {
            timestamp,
            key,
            value,
        })
    }
}
