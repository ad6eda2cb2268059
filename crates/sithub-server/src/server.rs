use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use sithub_repo::Repository;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};

/// SitHub repository server.
pub struct Server {
    config: ServerConfig,
    repo: Arc<Repository>,
}

impl Server {
    /// Open the configured repository. Fails if it is missing or an
    /// incomplete clone.
    pub fn new(config: ServerConfig) -> ServerResult<Self> {
        config.validate()?;
        let repo = Repository::open(&config.repo_path)?;
        Ok(Self {
            config,
            repo: Arc::new(repo),
        })
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Serve until the process is killed.
    pub async fn serve(self) -> ServerResult<()> {
        self.serve_with_shutdown(std::future::pending()).await
    }

    /// Serve until `shutdown` resolves, then wait for open sessions.
    pub async fn serve_with_shutdown<F>(self, shutdown: F) -> ServerResult<()>
    where
        F: Future<Output = ()>,
    {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        self.run(listener, shutdown).await
    }

    /// Accept loop over an already bound listener.
    pub async fn run<F>(self, listener: TcpListener, shutdown: F) -> ServerResult<()>
    where
        F: Future<Output = ()>,
    {
        let max = u32::try_from(self.config.max_connections)
            .map_err(|_| ServerError::Config("max_connections out of range".into()))?;
        let limit = Arc::new(Semaphore::new(max as usize));
        tokio::pin!(shutdown);

        info!(
            addr = %listener.local_addr()?,
            repo = %self.repo.path().display(),
            max_connections = max,
            "server listening"
        );

        loop {
            let permit = tokio::select! {
                _ = &mut shutdown => break,
                permit = Arc::clone(&limit).acquire_owned() => {
                    permit.map_err(|e| ServerError::Internal(e.to_string()))?
                }
            };
            let (stream, peer) = tokio::select! {
                _ = &mut shutdown => break,
                accepted = listener.accept() => match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        warn!(error = %e, "accept failed");
                        continue;
                    }
                },
            };
            let repo = Arc::clone(&self.repo);
            let io_timeout = self.config.io_timeout();
            tokio::spawn(async move {
                let _permit = permit;
                handle_connection(&repo, stream, peer, io_timeout).await;
            });
        }

        info!("shutting down; waiting for open sessions");
        let _drained = limit
            .acquire_many(max)
            .await
            .map_err(|e| ServerError::Internal(e.to_string()))?;
        info!("server stopped");
        Ok(())
    }
}

async fn handle_connection(
    repo: &Repository,
    stream: TcpStream,
    peer: SocketAddr,
    io_timeout: std::time::Duration,
) {
    if let Err(e) = stream.set_nodelay(true) {
        debug!(%peer, error = %e, "set_nodelay failed");
    }
    debug!(%peer, "connection accepted");
    match repo.upload_session().with_io_timeout(io_timeout).serve(stream).await {
        Ok(stats) => info!(
            %peer,
            refs = stats.refs_advertised,
            objects = stats.objects_sent,
            bytes = stats.bytes_sent,
            "session finished"
        ),
        Err(e) => warn!(%peer, error = %e, "session failed"),
    }
}
