use serde::{Deserialize, Serialize};
use sithub_refs::RefTarget;
use sithub_types::ObjectId;

pub const PROTOCOL_VERSION: u32 = 1;
pub const MAX_MESSAGE_SIZE: usize = 64 * 1024 * 1024;

/// One entry of a reference advertisement.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdvertisedRef {
    pub name: String,
    pub target: RefTarget,
}

impl AdvertisedRef {
    pub fn new(name: impl Into<String>, target: RefTarget) -> Self {
        Self {
            name: name.into(),
            target,
        }
    }
}

/// All message types exchanged between a fetch client and an upload session.
///
/// A session runs `Hello`/`HelloAck`, then any number of `ListRefsRequest`
/// round trips, then at most one `FetchRequest`. A `FetchAccepted` reply is
/// followed on the same connection by a raw object stream.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum WireMessage {
    Hello { version: u32, agent: String },
    HelloAck { version: u32, agent: String },
    ListRefsRequest,
    ListRefsResponse { refs: Vec<AdvertisedRef> },
    FetchRequest { wants: Vec<ObjectId>, haves: Vec<ObjectId> },
    FetchAccepted { object_count: u32 },
    Error { code: u32, message: String },
}

impl WireMessage {
    pub fn type_tag(&self) -> u8 {
        match self {
            Self::Hello { .. } => 1,
            Self::HelloAck { .. } => 2,
            Self::ListRefsRequest => 3,
            Self::ListRefsResponse { .. } => 4,
            Self::FetchRequest { .. } => 5,
            Self::FetchAccepted { .. } => 6,
            Self::Error { .. } => 255,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Hello { .. } => "Hello",
            Self::HelloAck { .. } => "HelloAck",
            Self::ListRefsRequest => "ListRefsRequest",
            Self::ListRefsResponse { .. } => "ListRefsResponse",
            Self::FetchRequest { .. } => "FetchRequest",
            Self::FetchAccepted { .. } => "FetchAccepted",
            Self::Error { .. } => "Error",
        }
    }

    pub fn error(code: u32, message: impl Into<String>) -> Self {
        Self::Error {
            code,
            message: message.into(),
        }
    }
}

/// Agent string sent in the handshake.
pub fn agent() -> String {
    format!("sithub/{}", env!("CARGO_PKG_VERSION"))
}

/// Codes carried by [`WireMessage::Error`].
pub mod codes {
    pub const VERSION_MISMATCH: u32 = 1;
    pub const BAD_REQUEST: u32 = 2;
    pub const UNKNOWN_WANT: u32 = 3;
    pub const INTERNAL: u32 = 500;
}
