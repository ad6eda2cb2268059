use sithub_crypto::StreamChecksum;
use sithub_store::StoredObject;
use sithub_types::ObjectId;

use crate::entry::{kind_tag, END_TAG, PACK_MAGIC, PACK_VERSION};
use crate::error::{PackError, PackResult};

const ZSTD_LEVEL: i32 = 3;

/// Incremental encoder for an object stream.
///
/// The writer hands back byte chunks instead of owning a sink, so the caller
/// decides how they reach the wire. Every chunk it produces is folded into a
/// running checksum that the end marker carries.
///
/// ```text
/// header  = "SHPK" | version u32 BE | count u32 BE
/// record  = tag u8 | id [32] | raw len varint | compressed len varint
///           | crc32 u32 BE | zstd bytes
/// end     = 0u8 | count u32 BE | blake3 of all preceding bytes [32]
/// ```
#[derive(Debug)]
pub struct PackWriter {
    checksum: StreamChecksum,
    expected: u32,
    written: u32,
}

impl PackWriter {
    /// Start a stream announcing `object_count` records. Returns the writer
    /// and the header bytes.
    pub fn new(object_count: u32) -> (Self, Vec<u8>) {
        let mut header = Vec::with_capacity(12);
        header.extend_from_slice(PACK_MAGIC);
        header.extend_from_slice(&PACK_VERSION.to_be_bytes());
        header.extend_from_slice(&object_count.to_be_bytes());

        let mut checksum = StreamChecksum::new();
        checksum.update(&header);
        let writer = Self {
            checksum,
            expected: object_count,
            written: 0,
        };
        (writer, header)
    }

    /// Encode one record. `id` must be the object's id; the receiver rejects
    /// the stream otherwise.
    pub fn encode_object(&mut self, id: &ObjectId, obj: &StoredObject) -> PackResult<Vec<u8>> {
        let compressed = zstd::encode_all(obj.data.as_slice(), ZSTD_LEVEL)
            .map_err(|e| PackError::CompressionFailed(e.to_string()))?;

        let mut record = Vec::with_capacity(compressed.len() + 64);
        record.push(kind_tag(obj.kind));
        record.extend_from_slice(id.as_bytes());
        encode_varint(&mut record, obj.data.len() as u64);
        encode_varint(&mut record, compressed.len() as u64);
        record.extend_from_slice(&crc32fast::hash(&compressed).to_be_bytes());
        record.extend_from_slice(&compressed);

        self.checksum.update(&record);
        self.written += 1;
        Ok(record)
    }

    /// Number of records encoded so far.
    pub fn written(&self) -> u32 {
        self.written
    }

    /// Produce the end marker. Fails if the record count differs from the
    /// header's.
    pub fn finish(mut self) -> PackResult<Vec<u8>> {
        if self.written != self.expected {
            return Err(PackError::CountMismatch {
                expected: self.expected,
                actual: self.written,
            });
        }
        let mut trailer = Vec::with_capacity(37);
        trailer.push(END_TAG);
        trailer.extend_from_slice(&self.written.to_be_bytes());
        self.checksum.update(&trailer);
        trailer.extend_from_slice(&self.checksum.digest());
        Ok(trailer)
    }
}

/// Encode a complete stream in memory.
pub fn encode_all(objects: &[StoredObject]) -> PackResult<Vec<u8>> {
    let (mut writer, mut out) = PackWriter::new(objects.len() as u32);
    for obj in objects {
        out.extend(writer.encode_object(&obj.compute_id(), obj)?);
    }
    out.extend(writer.finish()?);
    Ok(out)
}

/// Encode a u64 as a LEB128 variable-length integer.
pub(crate) fn encode_varint(buf: &mut Vec<u8>, mut value: u64) {
    loop {
        let mut byte = (value & 0x7F) as u8;
        value >>= 7;
        if value > 0 {
            byte |= 0x80;
        }
        buf.push(byte);
        if value == 0 {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sithub_store::ObjectKind;

    #[test]
    fn varint_encodings() {
        let cases: [(u64, &[u8]); 4] = [
            (0, &[0x00]),
            (42, &[0x2a]),
            (300, &[0xac, 0x02]),
            (u64::MAX, &[0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0x01]),
        ];
        for (value, expected) in cases {
            let mut buf = Vec::new();
            encode_varint(&mut buf, value);
            assert_eq!(buf, expected, "value {value}");
        }
    }

    #[test]
    fn header_layout() {
        let (_, header) = PackWriter::new(7);
        assert_eq!(&header[..4], b"SHPK");
        assert_eq!(&header[4..8], &1u32.to_be_bytes());
        assert_eq!(&header[8..12], &7u32.to_be_bytes());
    }

    #[test]
    fn trailer_carries_checksum_of_prefix() {
        let obj = StoredObject::new(ObjectKind::Blob, b"payload".to_vec());
        let bytes = encode_all(std::slice::from_ref(&obj)).unwrap();
        let (prefix, digest) = bytes.split_at(bytes.len() - 32);
        assert_eq!(digest, blake3::hash(prefix).as_bytes());
        // tag 0 followed by count 1 just before the digest
        assert_eq!(&prefix[prefix.len() - 5..], &[0, 0, 0, 0, 1]);
    }

    #[test]
    fn finish_rejects_short_stream() {
        let (writer, _) = PackWriter::new(2);
        assert!(matches!(
            writer.finish(),
            Err(PackError::CountMismatch { expected: 2, actual: 0 })
        ));
    }
}
