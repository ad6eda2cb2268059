use std::future::Future;
use std::time::Duration;

use sithub_protocol::AdvertisedRef;
use sithub_types::ObjectId;

use crate::error::{SyncError, SyncResult};

/// Result of the have/want computation on the client.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Negotiation {
    /// Advertised tips the client lacks.
    pub wants: Vec<ObjectId>,
    /// Tips the client already holds.
    pub haves: Vec<ObjectId>,
}

impl Negotiation {
    pub fn is_up_to_date(&self) -> bool {
        self.wants.is_empty()
    }
}

/// What a completed fetch produced.
#[derive(Clone, Debug, Default)]
pub struct FetchResult {
    /// The source's reference advertisement, to be written by the caller
    /// now that every object it names is stored.
    pub refs: Vec<AdvertisedRef>,
    pub negotiation: Negotiation,
    pub objects_received: u32,
}

/// What an upload session sent.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UploadStats {
    pub refs_advertised: usize,
    pub objects_sent: u32,
    pub bytes_sent: u64,
}

/// Network limits for a clone or fetch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CloneOptions {
    /// Bound on establishing the connection.
    pub connect_timeout: Duration,
    /// Bound on each individual read or write once connected.
    pub io_timeout: Duration,
}

impl CloneOptions {
    pub fn from_secs(connect_timeout_secs: u64, io_timeout_secs: u64) -> Self {
        Self {
            connect_timeout: Duration::from_secs(connect_timeout_secs),
            io_timeout: Duration::from_secs(io_timeout_secs),
        }
    }
}

impl Default for CloneOptions {
    fn default() -> Self {
        Self::from_secs(10, 60)
    }
}

/// Run `fut`, failing with [`SyncError::Timeout`] if it outlives `limit`.
pub(crate) async fn within<T, E, F>(limit: Duration, stage: &'static str, fut: F) -> SyncResult<T>
where
    F: Future<Output = Result<T, E>>,
    SyncError: From<E>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(res) => res.map_err(SyncError::from),
        Err(_) => Err(SyncError::Timeout {
            stage,
            secs: limit.as_secs(),
        }),
    }
}
