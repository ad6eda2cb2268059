//! Repository transfer for SitHub.
//!
//! A fetch client and an upload session speak the framed protocol from
//! `sithub-protocol` over any [`RemoteTransport`]. The session plans the
//! transfer set from the client's wants and haves and streams it as a pack;
//! the client verifies and stores each object as it arrives. Refs are never
//! touched here: [`fetch`] hands the advertisement back so the caller can
//! publish refs only after every object they reach is stored.

pub mod error;
pub mod fetch;
pub mod negotiation;
pub mod transport;
pub mod types;
pub mod upload;
pub mod verifier;

pub use error::{SyncError, SyncResult};
pub use fetch::{fetch, receive_pack, FetchClient};
pub use negotiation::NegotiationEngine;
pub use transport::{BoxConnection, Connection, LocalTransport, RemoteTransport, TcpTransport};
pub use types::{CloneOptions, FetchResult, Negotiation, UploadStats};
pub use upload::UploadSession;
pub use verifier::ReceiveVerifier;
