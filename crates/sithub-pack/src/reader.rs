use std::io::ErrorKind;

use sithub_crypto::StreamChecksum;
use sithub_store::StoredObject;
use sithub_types::ObjectId;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::trace;

use crate::entry::{kind_from_tag, END_TAG, MAX_RECORD_SIZE, PACK_MAGIC, PACK_VERSION};
use crate::error::{PackError, PackResult};

const READ_CHUNK: u64 = 64 * 1024;

/// Incremental decoder for an object stream arriving over an async reader.
///
/// Records are yielded one at a time as they are validated (CRC, size, id
/// re-hash), so a receiver can store each object before the next arrives.
/// The stream is only complete once [`next_object`](Self::next_object)
/// returns `Ok(None)`, which happens after the end marker's count and
/// checksum have been verified. EOF anywhere before that is
/// [`PackError::Truncated`].
#[derive(Debug)]
pub struct PackStreamReader<R> {
    inner: R,
    checksum: StreamChecksum,
    expected: u32,
    received: u32,
    finished: bool,
}

impl<R: AsyncRead + Unpin> PackStreamReader<R> {
    /// Read and validate the stream header.
    pub async fn open(inner: R) -> PackResult<Self> {
        let mut reader = Self {
            inner,
            checksum: StreamChecksum::new(),
            expected: 0,
            received: 0,
            finished: false,
        };
        let mut magic = [0u8; 4];
        reader.read_tracked(&mut magic).await?;
        if &magic != PACK_MAGIC {
            return Err(PackError::InvalidMagic { actual: magic });
        }
        let version = reader.read_u32().await?;
        if version != PACK_VERSION {
            return Err(PackError::UnsupportedVersion(version));
        }
        reader.expected = reader.read_u32().await?;
        Ok(reader)
    }

    /// Number of records the header announced.
    pub fn expected_count(&self) -> u32 {
        self.expected
    }

    /// Number of records yielded so far.
    pub fn received_count(&self) -> u32 {
        self.received
    }

    /// Give back the underlying reader, e.g. to continue a framed session.
    pub fn into_inner(self) -> R {
        self.inner
    }

    /// Next validated object, or `None` once the end marker checks out.
    pub async fn next_object(&mut self) -> PackResult<Option<(ObjectId, StoredObject)>> {
        if self.finished {
            return Ok(None);
        }
        let offset = self.checksum.len();
        let tag = self.read_u8().await?;
        if tag == END_TAG {
            self.read_end_marker().await?;
            return Ok(None);
        }
        let kind = kind_from_tag(tag).ok_or_else(|| PackError::CorruptEntry {
            offset,
            reason: format!("unknown record tag {tag}"),
        })?;

        let mut id_bytes = [0u8; 32];
        self.read_tracked(&mut id_bytes).await?;
        let id = ObjectId::from_hash(id_bytes);
        let raw_len = self.read_varint(offset).await?;
        let compressed_len = self.read_varint(offset).await?;
        if compressed_len > MAX_RECORD_SIZE || raw_len > MAX_RECORD_SIZE {
            return Err(PackError::CorruptEntry {
                offset,
                reason: format!("record too large: {compressed_len} compressed, {raw_len} raw"),
            });
        }
        let crc = self.read_u32().await?;
        let compressed = self.read_payload(compressed_len).await?;

        if crc32fast::hash(&compressed) != crc {
            return Err(PackError::CrcMismatch { id });
        }
        let data = inflate(&compressed, raw_len)
            .map_err(|e| PackError::DecompressionFailed(e.to_string()))?;
        if data.len() as u64 != raw_len {
            return Err(PackError::CorruptEntry {
                offset,
                reason: format!("size mismatch: expected {raw_len}, got {}", data.len()),
            });
        }
        let obj = StoredObject::new(kind, data);
        let actual = obj.compute_id();
        if actual != id {
            return Err(PackError::IdMismatch {
                expected: id,
                actual,
            });
        }

        self.received += 1;
        if self.received > self.expected {
            return Err(PackError::CountMismatch {
                expected: self.expected,
                actual: self.received,
            });
        }
        trace!(%id, %kind, "decoded pack record");
        Ok(Some((id, obj)))
    }

    async fn read_end_marker(&mut self) -> PackResult<()> {
        let count = self.read_u32().await?;
        let computed = self.checksum.digest();
        let mut digest = [0u8; 32];
        self.read_raw(&mut digest).await?;
        if digest != computed {
            return Err(PackError::ChecksumMismatch);
        }
        if count != self.expected || count != self.received {
            return Err(PackError::CountMismatch {
                expected: self.expected,
                actual: self.received,
            });
        }
        self.finished = true;
        Ok(())
    }

    /// Read a payload of `len` bytes in bounded chunks, so memory follows
    /// what actually arrives rather than the announced length.
    async fn read_payload(&mut self, len: u64) -> PackResult<Vec<u8>> {
        let mut payload = Vec::with_capacity(len.min(READ_CHUNK) as usize);
        let mut remaining = len;
        while remaining > 0 {
            let n = remaining.min(READ_CHUNK) as usize;
            let start = payload.len();
            payload.resize(start + n, 0);
            self.read_tracked(&mut payload[start..]).await?;
            remaining -= n as u64;
        }
        Ok(payload)
    }

    async fn read_raw(&mut self, buf: &mut [u8]) -> PackResult<()> {
        match self.inner.read_exact(buf).await {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => Err(PackError::Truncated {
                offset: self.checksum.len(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    async fn read_tracked(&mut self, buf: &mut [u8]) -> PackResult<()> {
        self.read_raw(buf).await?;
        self.checksum.update(buf);
        Ok(())
    }

    async fn read_u8(&mut self) -> PackResult<u8> {
        let mut b = [0u8; 1];
        self.read_tracked(&mut b).await?;
        Ok(b[0])
    }

    async fn read_u32(&mut self) -> PackResult<u32> {
        let mut b = [0u8; 4];
        self.read_tracked(&mut b).await?;
        Ok(u32::from_be_bytes(b))
    }

    async fn read_varint(&mut self, offset: u64) -> PackResult<u64> {
        let mut value: u64 = 0;
        let mut shift = 0;
        loop {
            let byte = self.read_u8().await?;
            if shift >= 64 || (shift == 63 && byte & 0x7E != 0) {
                return Err(PackError::CorruptEntry {
                    offset,
                    reason: "varint overflow".into(),
                });
            }
            value |= ((byte & 0x7F) as u64) << shift;
            if byte & 0x80 == 0 {
                return Ok(value);
            }
            shift += 7;
        }
    }
}

/// Decompress at most one byte past `raw_len`; anything longer is already
/// a size mismatch.
fn inflate(compressed: &[u8], raw_len: u64) -> std::io::Result<Vec<u8>> {
    use std::io::Read;

    let decoder = zstd::stream::read::Decoder::new(compressed)?;
    let mut data = Vec::with_capacity(raw_len.min(READ_CHUNK) as usize);
    decoder.take(raw_len + 1).read_to_end(&mut data)?;
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::kind_tag;
    use crate::writer::{encode_all, encode_varint, PackWriter};
    use proptest::prelude::*;
    use sithub_store::ObjectKind;

    fn objects(n: usize) -> Vec<StoredObject> {
        (0..n)
            .map(|i| StoredObject::new(ObjectKind::Blob, format!("object-{i}").into_bytes()))
            .collect()
    }

    async fn decode(bytes: &[u8]) -> PackResult<Vec<(ObjectId, StoredObject)>> {
        let mut reader = PackStreamReader::open(bytes).await?;
        let mut out = Vec::new();
        while let Some(item) = reader.next_object().await? {
            out.push(item);
        }
        Ok(out)
    }

    #[tokio::test]
    async fn decodes_in_order() {
        let objs = objects(10);
        let bytes = encode_all(&objs).unwrap();
        let decoded = decode(&bytes).await.unwrap();
        assert_eq!(decoded.len(), 10);
        for ((id, obj), original) in decoded.iter().zip(&objs) {
            assert_eq!(*id, original.compute_id());
            assert_eq!(obj, original);
        }
    }

    #[tokio::test]
    async fn empty_stream() {
        let bytes = encode_all(&[]).unwrap();
        assert!(decode(&bytes).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_end_marker_is_truncated() {
        let objs = objects(10);
        let (mut writer, mut bytes) = PackWriter::new(10);
        for obj in &objs[..9] {
            bytes.extend(writer.encode_object(&obj.compute_id(), obj).unwrap());
        }
        let mut reader = PackStreamReader::open(bytes.as_slice()).await.unwrap();
        for _ in 0..9 {
            assert!(reader.next_object().await.unwrap().is_some());
        }
        assert!(matches!(
            reader.next_object().await,
            Err(PackError::Truncated { .. })
        ));
    }

    #[tokio::test]
    async fn cut_inside_record_is_truncated() {
        let bytes = encode_all(&objects(3)).unwrap();
        let cut = &bytes[..bytes.len() - 50];
        assert!(matches!(decode(cut).await, Err(PackError::Truncated { .. })));
    }

    #[tokio::test]
    async fn bad_magic_and_version() {
        let mut bytes = encode_all(&objects(1)).unwrap();
        bytes[0] = b'X';
        assert!(matches!(decode(&bytes).await, Err(PackError::InvalidMagic { .. })));

        let mut bytes = encode_all(&objects(1)).unwrap();
        bytes[4..8].copy_from_slice(&9u32.to_be_bytes());
        assert!(matches!(
            decode(&bytes).await,
            Err(PackError::UnsupportedVersion(9))
        ));
    }

    #[tokio::test]
    async fn flipped_payload_byte_fails_crc() {
        let mut bytes = encode_all(&objects(1)).unwrap();
        // Last byte of the single record's payload sits just before the 37-byte end marker.
        let pos = bytes.len() - 38;
        bytes[pos] ^= 0x01;
        assert!(matches!(decode(&bytes).await, Err(PackError::CrcMismatch { .. })));
    }

    fn raw_record(
        tag: u8,
        id: &ObjectId,
        raw_len: u64,
        compressed: &[u8],
        announced: u64,
    ) -> Vec<u8> {
        let mut record = vec![tag];
        record.extend_from_slice(id.as_bytes());
        encode_varint(&mut record, raw_len);
        encode_varint(&mut record, announced);
        record.extend_from_slice(&crc32fast::hash(compressed).to_be_bytes());
        record.extend_from_slice(compressed);
        record
    }

    #[tokio::test]
    async fn payload_inflating_past_raw_len_is_rejected() {
        let big = vec![0u8; 1 << 20];
        let compressed = zstd::encode_all(big.as_slice(), 3).unwrap();
        let (_, mut bytes) = PackWriter::new(1);
        bytes.extend(raw_record(
            kind_tag(ObjectKind::Blob),
            &ObjectId::from_bytes(&big),
            10,
            &compressed,
            compressed.len() as u64,
        ));
        let mut reader = PackStreamReader::open(bytes.as_slice()).await.unwrap();
        assert!(matches!(
            reader.next_object().await,
            Err(PackError::CorruptEntry { .. })
        ));
    }

    #[tokio::test]
    async fn huge_announced_payload_with_short_body_is_truncated() {
        let (_, mut bytes) = PackWriter::new(1);
        bytes.extend(raw_record(
            kind_tag(ObjectKind::Blob),
            &ObjectId::from_bytes(b"x"),
            MAX_RECORD_SIZE,
            &[0u8; 100],
            MAX_RECORD_SIZE,
        ));
        let mut reader = PackStreamReader::open(bytes.as_slice()).await.unwrap();
        assert!(matches!(
            reader.next_object().await,
            Err(PackError::Truncated { .. })
        ));
    }

    #[tokio::test]
    async fn wrong_id_is_rejected() {
        let obj = StoredObject::new(ObjectKind::Blob, b"real".to_vec());
        let (mut writer, mut bytes) = PackWriter::new(1);
        bytes.extend(writer.encode_object(&ObjectId::from_bytes(b"lie"), &obj).unwrap());
        bytes.extend(writer.finish().unwrap());
        assert!(matches!(decode(&bytes).await, Err(PackError::IdMismatch { .. })));
    }

    #[tokio::test]
    async fn tampered_trailer_fails_checksum() {
        let mut bytes = encode_all(&objects(2)).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        assert!(matches!(decode(&bytes).await, Err(PackError::ChecksumMismatch)));
    }

    #[tokio::test]
    async fn early_end_marker_is_count_mismatch() {
        // Header promises two records but the end marker follows the first.
        let objs = objects(2);
        let (mut writer, mut bytes) = PackWriter::new(2);
        bytes.extend(writer.encode_object(&objs[0].compute_id(), &objs[0]).unwrap());
        let mut checksum = StreamChecksum::new();
        checksum.update(&bytes);
        let marker = [0u8, 0, 0, 0, 1];
        checksum.update(&marker);
        bytes.extend_from_slice(&marker);
        bytes.extend_from_slice(&checksum.digest());
        assert!(matches!(
            decode(&bytes).await,
            Err(PackError::CountMismatch { expected: 2, actual: 1 })
        ));
    }

    #[tokio::test]
    async fn trees_and_commits_keep_their_kind() {
        let objs = vec![
            StoredObject::new(ObjectKind::Tree, b"{\"entries\":[]}".to_vec()),
            StoredObject::new(ObjectKind::Commit, b"{}".to_vec()),
        ];
        let decoded = decode(&encode_all(&objs).unwrap()).await.unwrap();
        assert_eq!(decoded[0].1.kind, ObjectKind::Tree);
        assert_eq!(decoded[1].1.kind, ObjectKind::Commit);
    }

    proptest! {
        #[test]
        fn varint_decoder_matches_encoder(value in any::<u64>()) {
            let mut buf = Vec::new();
            encode_varint(&mut buf, value);
            let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
            let decoded = rt.block_on(async {
                let mut reader = PackStreamReader {
                    inner: buf.as_slice(),
                    checksum: StreamChecksum::new(),
                    expected: 0,
                    received: 0,
                    finished: false,
                };
                reader.read_varint(0).await
            }).unwrap();
            prop_assert_eq!(decoded, value);
        }
    }
}
