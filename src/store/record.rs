//! On-disk record framing for the file store
//!
//! ```text
//! [key_len: u16 LE][value_len: u32 LE][key][zstd(value)]
//! ```
//!
//! `value_len` is the length of the compressed value.

use crate::{Error, Result};

/// Size of the fixed record prefix
pub(crate) const RECORD_HEADER_SIZE: usize = 6;

const COMPRESSION_LEVEL: i32 = 3;

/// Fixed-size prefix of a record
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct RecordHeader {
    pub(crate) key_len: u16,
    pub(crate) value_len: u32,
}

impl RecordHeader {
    pub(crate) fn parse(buf: &[u8; RECORD_HEADER_SIZE]) -> Self {
        RecordHeader {
            key_len: u16::from_le_bytes([buf[0], buf[1]]),
            value_len: u32::from_le_bytes([buf[2], buf[3], buf[4], buf[5]]),
        }
    }

    /// Length of the record body following the header
    pub(crate) fn body_len(&self) -> u64 {
        self.key_len as u64 + self.value_len as u64
    }
}

/// Append an encoded record to `out`, returning the compressed value size
pub(crate) fn encode_into(out: &mut Vec<u8>, key: &[u8], value: &[u8]) -> Result<u32> {
    let key_len: u16 = key
        .len()
        .try_into()
        .map_err(|_| Error::Corruption(format!("Key too long: {} bytes", key.len())))?;
    let compressed = zstd::encode_all(value, COMPRESSION_LEVEL)?;
    let value_len: u32 = compressed
        .len()
        .try_into()
        .map_err(|_| Error::Corruption(format!("Value too long: {} bytes", value.len())))?;

    out.extend_from_slice(&key_len.to_le_bytes());
    out.extend_from_slice(&value_len.to_le_bytes());
    out.extend_from_slice(key);
    out.extend_from_slice(&compressed);
    Ok(value_len)
}

/// Decompress a stored value
pub(crate) fn decode_value(data: &[u8]) -> Result<Vec<u8>> {
    Ok(zstd::decode_all(data)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_layout() {
        let mut out = Vec::new();
        let value_len = encode_into(&mut out, b"key", b"hello world").unwrap();

        let mut header = [0u8; RECORD_HEADER_SIZE];
        header.copy_from_slice(&out[..RECORD_HEADER_SIZE]);
        let header = RecordHeader::parse(&header);
        assert_eq!(header.key_len, 3);
        assert_eq!(header.value_len, value_len);
        assert_eq!(out.len() as u64, RECORD_HEADER_SIZE as u64 + header.body_len());

        let value_start = RECORD_HEADER_SIZE + 3;
        assert_eq!(&out[RECORD_HEADER_SIZE..value_start], b"key");
        assert_eq!(decode_value(&out[value_start..]).unwrap(), b"hello world");
    }

    #[test]
    fn test_rejects_oversized_key() {
        let key = vec![0u8; u16::MAX as usize + 1];
        assert!(encode_into(&mut Vec::new(), &key, b"v").is_err());
    }
}
