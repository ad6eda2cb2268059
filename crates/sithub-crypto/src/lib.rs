//! Hashing primitives for SitHub.
//!
//! Provides domain-separated BLAKE3 digests for objects and an incremental
//! checksum for transfer streams. All crypto operations wrap `blake3`; there
//! is no custom cryptography here.

pub mod checksum;
pub mod hasher;

pub use checksum::StreamChecksum;
pub use hasher::ContentHasher;
