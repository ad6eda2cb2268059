//! Wire protocol for SitHub transfers.
//!
//! Defines the framing, message types and serialization used between a fetch
//! client and an upload session, plus parsing of remote locations.

pub mod codec;
pub mod endpoint;
pub mod error;
pub mod message;

pub use codec::{read_message, reject_remote_error, write_message, FrameCodec};
pub use endpoint::{RemoteLocation, DEFAULT_PORT};
pub use error::{ProtocolError, ProtocolResult};
pub use message::{agent, codes, AdvertisedRef, WireMessage, MAX_MESSAGE_SIZE, PROTOCOL_VERSION};
