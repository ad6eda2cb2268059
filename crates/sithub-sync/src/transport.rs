use std::sync::Arc;

use async_trait::async_trait;
use sithub_refs::RefStore;
use sithub_store::ObjectStore;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tracing::{debug, warn};

use crate::error::{SyncError, SyncResult};
use crate::upload::UploadSession;

/// Buffer size of the in-process pipe used for local clones.
const LOCAL_PIPE_CAPACITY: usize = 64 * 1024;

/// A bidirectional byte stream to an upload session.
pub trait Connection: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> Connection for T {}

pub type BoxConnection = Box<dyn Connection>;

/// Opens connections to a clone source.
///
/// The fetch client speaks the same protocol over every transport, so a
/// local clone exercises exactly the code path a network clone does.
#[async_trait]
pub trait RemoteTransport: Send + Sync {
    async fn connect(&self) -> SyncResult<BoxConnection>;

    /// Human-readable name of the source, for logs and errors.
    fn describe(&self) -> String;
}

/// Serves a repository on the same machine through an in-memory pipe.
pub struct LocalTransport {
    objects: Arc<dyn ObjectStore>,
    refs: Arc<dyn RefStore>,
    label: String,
}

impl LocalTransport {
    pub fn new(objects: Arc<dyn ObjectStore>, refs: Arc<dyn RefStore>) -> Self {
        Self {
            objects,
            refs,
            label: "local".to_string(),
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }
}

#[async_trait]
impl RemoteTransport for LocalTransport {
    async fn connect(&self) -> SyncResult<BoxConnection> {
        let (client, server) = tokio::io::duplex(LOCAL_PIPE_CAPACITY);
        let session = UploadSession::new(Arc::clone(&self.objects), Arc::clone(&self.refs));
        let label = self.label.clone();
        tokio::spawn(async move {
            match session.serve(server).await {
                Ok(stats) => debug!(source = %label, objects = stats.objects_sent, "local upload finished"),
                Err(e) => warn!(source = %label, error = %e, "local upload failed"),
            }
        });
        Ok(Box::new(client))
    }

    fn describe(&self) -> String {
        self.label.clone()
    }
}

/// Connects to a `sithub serve` process over TCP.
#[derive(Clone, Debug)]
pub struct TcpTransport {
    host: String,
    port: u16,
}

impl TcpTransport {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

#[async_trait]
impl RemoteTransport for TcpTransport {
    async fn connect(&self) -> SyncResult<BoxConnection> {
        let stream = TcpStream::connect((self.host.as_str(), self.port))
            .await
            .map_err(|e| SyncError::SourceUnreachable {
                location: self.describe(),
                reason: e.to_string(),
            })?;
        stream.set_nodelay(true)?;
        debug!(peer = %self.describe(), "connected");
        Ok(Box::new(stream))
    }

    fn describe(&self) -> String {
        format!("sithub://{}:{}", self.host, self.port)
    }
}
