//! TCP server for SitHub.
//!
//! Hosts a single repository. Each accepted connection runs one upload
//! session in its own task, so a `sithub://host:port` clone sees exactly
//! what a local clone of the same repository would.

pub mod config;
pub mod error;
pub mod server;

pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use server::Server;
