//! Object stream ("pack") format for SitHub transfers.
//!
//! A pack carries a transfer set from an upload session to a fetch client:
//! a fixed header, one zstd-compressed, CRC-checked record per object, and
//! an explicit end marker holding the record count and a BLAKE3 checksum of
//! everything before it. A receiver that never sees a valid end marker knows
//! the stream was cut short.
//!
//! - [`PackWriter`]: incremental encoder producing byte chunks
//! - [`PackStreamReader`]: async decoder validating each record as it arrives

pub mod entry;
pub mod error;
pub mod reader;
pub mod writer;

pub use entry::{kind_from_tag, kind_tag, PACK_MAGIC, PACK_VERSION};
pub use error::{PackError, PackResult};
pub use reader::PackStreamReader;
pub use writer::{encode_all, PackWriter};
