use std::time::{SystemTime, UNIX_EPOCH};

use sithub_store::Signature;
use sithub_types::ObjectId;

/// Input to [`Repository::commit`](crate::Repository::commit).
///
/// Parents default to the current tip of the branch `HEAD` names (none for
/// an unborn branch).
#[derive(Clone, Debug)]
pub struct CommitRequest {
    pub tree: ObjectId,
    pub message: String,
    pub author: Signature,
    pub timestamp: i64,
    pub parents: Option<Vec<ObjectId>>,
}

impl CommitRequest {
    pub fn new(tree: ObjectId, message: impl Into<String>) -> Self {
        Self {
            tree,
            message: message.into(),
            author: Signature::new("SitHub", "sithub@localhost"),
            timestamp: now_secs(),
            parents: None,
        }
    }

    pub fn with_author(mut self, author: Signature) -> Self {
        self.author = author;
        self
    }

    pub fn with_timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_parents(mut self, parents: Vec<ObjectId>) -> Self {
        self.parents = Some(parents);
        self
    }
}

/// What [`Repository::commit`](crate::Repository::commit) wrote.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommitResult {
    pub commit: ObjectId,
    /// The ref that now points at `commit`.
    pub updated_ref: String,
    pub parents: Vec<ObjectId>,
}

fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs() as i64)
}
