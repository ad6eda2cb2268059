use sithub_types::ObjectId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PackError {
    #[error("invalid pack magic: expected SHPK, got {actual:?}")]
    InvalidMagic { actual: [u8; 4] },

    #[error("unsupported pack version: {0}")]
    UnsupportedVersion(u32),

    /// The stream ended before the end marker.
    #[error("object stream truncated at byte {offset}")]
    Truncated { offset: u64 },

    #[error("CRC32 mismatch for object {id}")]
    CrcMismatch { id: ObjectId },

    /// The decompressed payload does not hash to the id it was sent under.
    #[error("object sent as {expected} hashes to {actual}")]
    IdMismatch { expected: ObjectId, actual: ObjectId },

    #[error("pack checksum mismatch")]
    ChecksumMismatch,

    #[error("object count mismatch: header says {expected}, got {actual}")]
    CountMismatch { expected: u32, actual: u32 },

    #[error("corrupt pack entry at offset {offset}: {reason}")]
    CorruptEntry { offset: u64, reason: String },

    #[error("decompression failed: {0}")]
    DecompressionFailed(String),

    #[error("compression failed: {0}")]
    CompressionFailed(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type PackResult<T> = Result<T, PackError>;
