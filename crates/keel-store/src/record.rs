//! Record format for the append-only log.
//!
//! Each record is self-describing:
//!
//! ```text
//! offset  len        field
//! 0       1          type (0 = insert, 1 = delete)
//! 1       4          key length (LE u32)
//! 5       4          value length (LE u32; 0 for deletes)
//! 9       key_len    key bytes
//! 9+k     value_len  value bytes (absent for deletes)
//! ```
//!
//! The log is append-only; superseded records stay behind as unreachable
//! garbage until a future compaction pass.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use keel_common::{KeelError, Result};

/// Size of the fixed record header.
pub const RECORD_HEADER_SIZE: usize = 9;

/// Record kinds in the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RecordType {
    /// A key/value pair.
    Insert = 0,
    /// A tombstone marking the key as deleted.
    Delete = 1,
}

/// One log record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub record_type: RecordType,
    pub key: Bytes,
    pub value: Bytes,
}

impl Record {
    /// Creates an insert record for `key -> value`.
    pub fn insert(key: &[u8], value: &[u8]) -> Self {
        Self {
            record_type: RecordType::Insert,
            key: Bytes::copy_from_slice(key),
            value: Bytes::copy_from_slice(value),
        }
    }

    /// Creates a tombstone for `key`.
    pub fn tombstone(key: &[u8]) -> Self {
        Self {
            record_type: RecordType::Delete,
            key: Bytes::copy_from_slice(key),
            value: Bytes::new(),
        }
    }

    pub fn is_tombstone(&self) -> bool {
        self.record_type == RecordType::Delete
    }

    /// On-disk size of this record.
    pub fn encoded_len(&self) -> usize {
        RECORD_HEADER_SIZE + self.key.len() + self.value.len()
    }

    /// Serializes this record.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        buf.put_u8(self.record_type as u8);
        buf.put_u32_le(self.key.len() as u32);
        buf.put_u32_le(self.value.len() as u32);
        buf.put_slice(&self.key);
        buf.put_slice(&self.value);
        buf.freeze()
    }

    /// Deserializes a record from `data`. `offset` is the record's position
    /// in the log, used only for error context.
    pub fn decode(mut data: &[u8], offset: u64) -> Result<Record> {
        if data.len() < RECORD_HEADER_SIZE {
            return Err(KeelError::CorruptRecord {
                offset,
                reason: "record header truncated".to_string(),
            });
        }

        let record_type = match data.get_u8() {
            0 => RecordType::Insert,
            1 => RecordType::Delete,
            other => {
                return Err(KeelError::CorruptRecord {
                    offset,
                    reason: format!("unknown record type {other}"),
                })
            }
        };
        let key_len = data.get_u32_le() as usize;
        let value_len = data.get_u32_le() as usize;

        if data.remaining() < key_len + value_len {
            return Err(KeelError::CorruptRecord {
                offset,
                reason: format!(
                    "record body truncated: need {} bytes, have {}",
                    key_len + value_len,
                    data.remaining()
                ),
            });
        }

        let key = data.copy_to_bytes(key_len);
        let value = data.copy_to_bytes(value_len);

        Ok(Record {
            record_type,
            key,
            value,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_record_roundtrip() {
        let record = Record::insert(b"hello", b"world");
        let encoded = record.encode();

        assert_eq!(encoded.len(), record.encoded_len());
        assert_eq!(encoded.len(), 9 + 5 + 5);

        let decoded = Record::decode(&encoded, 0).unwrap();
        assert_eq!(decoded, record);
        assert!(!decoded.is_tombstone());
    }

    #[test]
    fn test_tombstone_roundtrip() {
        let record = Record::tombstone(b"gone");
        let encoded = record.encode();

        assert_eq!(encoded.len(), 9 + 4);

        let decoded = Record::decode(&encoded, 0).unwrap();
        assert!(decoded.is_tombstone());
        assert_eq!(decoded.key.as_ref(), b"gone");
        assert!(decoded.value.is_empty());
    }

    #[test]
    fn test_record_wire_layout() {
        let record = Record::insert(b"ab", b"xyz");
        let encoded = record.encode();

        assert_eq!(encoded[0], 0);
        assert_eq!(&encoded[1..5], &2u32.to_le_bytes());
        assert_eq!(&encoded[5..9], &3u32.to_le_bytes());
        assert_eq!(&encoded[9..11], b"ab");
        assert_eq!(&encoded[11..14], b"xyz");
    }

    #[test]
    fn test_empty_key_and_value() {
        let record = Record::insert(b"", b"");
        let encoded = record.encode();
        assert_eq!(encoded.len(), RECORD_HEADER_SIZE);

        let decoded = Record::decode(&encoded, 0).unwrap();
        assert!(decoded.key.is_empty());
        assert!(decoded.value.is_empty());
    }

    #[test]
    fn test_binary_payload_roundtrip() {
        let key = [0u8, 1, 2, 255, 254];
        let value = [9u8; 300];
        let record = Record::insert(&key, &value);

        let decoded = Record::decode(&record.encode(), 0).unwrap();
        assert_eq!(decoded.key.as_ref(), &key);
        assert_eq!(decoded.value.as_ref(), &value[..]);
    }

    #[test]
    fn test_decode_truncated_header() {
        let err = Record::decode(&[0, 1, 2], 64).unwrap_err();
        match err {
            KeelError::CorruptRecord { offset, reason } => {
                assert_eq!(offset, 64);
                assert!(reason.contains("header"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_decode_truncated_body() {
        let record = Record::insert(b"key", b"value");
        let encoded = record.encode();

        let err = Record::decode(&encoded[..encoded.len() - 2], 0).unwrap_err();
        assert!(matches!(err, KeelError::CorruptRecord { .. }));
    }

    #[test]
    fn test_decode_unknown_type() {
        let mut encoded = Record::insert(b"k", b"v").encode().to_vec();
        encoded[0] = 7;

        let err = Record::decode(&encoded, 0).unwrap_err();
        match err {
            KeelError::CorruptRecord { reason, .. } => {
                assert!(reason.contains("unknown record type"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_decode_ignores_trailing_bytes() {
        // Records are concatenated; a decode must only consume its own span.
        let mut stream = Record::insert(b"a", b"1").encode().to_vec();
        stream.extend_from_slice(&Record::insert(b"b", b"2").encode());

        let first = Record::decode(&stream, 0).unwrap();
        assert_eq!(first.key.as_ref(), b"a");

        let second = Record::decode(&stream[first.encoded_len()..], 0).unwrap();
        assert_eq!(second.key.as_ref(), b"b");
    }
}
