use sithub_pack::PackError;
use sithub_protocol::ProtocolError;
use sithub_refs::RefError;
use sithub_store::StoreError;
use sithub_types::ObjectId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    /// The source could not be reached or opened.
    #[error("source unreachable: {location}: {reason}")]
    SourceUnreachable { location: String, reason: String },

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The object stream was malformed, damaged or cut short.
    #[error("pack error: {0}")]
    Pack(#[from] PackError),

    /// A received object references something not yet stored.
    #[error("object {id} arrived before its referent {missing}")]
    ForwardReference { id: ObjectId, missing: ObjectId },

    /// A wanted object is not available (server side) or was never received
    /// (client side).
    #[error("wanted object {0} is missing")]
    MissingWant(ObjectId),

    #[error("timed out during {stage} after {secs}s")]
    Timeout { stage: &'static str, secs: u64 },

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("ref error: {0}")]
    Ref(#[from] RefError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SyncError {
    /// Whether this error means the received data cannot be trusted, as
    /// opposed to the source simply being unavailable.
    pub fn is_integrity_failure(&self) -> bool {
        matches!(
            self,
            Self::Pack(_) | Self::ForwardReference { .. } | Self::MissingWant(_)
        )
    }
}

pub type SyncResult<T> = Result<T, SyncError>;
