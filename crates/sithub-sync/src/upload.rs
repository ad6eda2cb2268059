use std::sync::Arc;
use std::time::Duration;

use sithub_pack::PackWriter;
use sithub_protocol::{
    agent, codes, read_message, write_message, AdvertisedRef, ProtocolError, WireMessage,
    PROTOCOL_VERSION,
};
use sithub_refs::RefStore;
use sithub_store::ObjectStore;
use sithub_types::ObjectId;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info};

use crate::error::{SyncError, SyncResult};
use crate::negotiation::NegotiationEngine;
use crate::types::{within, UploadStats};

/// Server role of the transfer protocol for one connection.
///
/// Answers the handshake, serves reference advertisements, and for a fetch
/// request streams the transfer set as a pack. The session ends after the
/// pack is sent or when the client hangs up.
#[derive(Clone)]
pub struct UploadSession {
    objects: Arc<dyn ObjectStore>,
    refs: Arc<dyn RefStore>,
    io_timeout: Duration,
}

impl UploadSession {
    pub fn new(objects: Arc<dyn ObjectStore>, refs: Arc<dyn RefStore>) -> Self {
        Self {
            objects,
            refs,
            io_timeout: Duration::from_secs(60),
        }
    }

    pub fn with_io_timeout(mut self, io_timeout: Duration) -> Self {
        self.io_timeout = io_timeout;
        self
    }

    pub async fn serve<S>(self, mut stream: S) -> SyncResult<UploadStats>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let mut stats = UploadStats::default();

        match within(self.io_timeout, "handshake", read_message(&mut stream)).await? {
            WireMessage::Hello { version, agent: peer } if version == PROTOCOL_VERSION => {
                debug!(%peer, "client hello");
                self.send(
                    &mut stream,
                    &WireMessage::HelloAck {
                        version: PROTOCOL_VERSION,
                        agent: agent(),
                    },
                )
                .await?;
            }
            WireMessage::Hello { version, .. } => {
                let reply = WireMessage::error(
                    codes::VERSION_MISMATCH,
                    format!("server speaks version {PROTOCOL_VERSION}"),
                );
                self.send(&mut stream, &reply).await?;
                return Err(ProtocolError::VersionMismatch {
                    local: PROTOCOL_VERSION,
                    remote: version,
                }
                .into());
            }
            other => return self.reject(&mut stream, "Hello", &other).await,
        }

        loop {
            let msg = match within(self.io_timeout, "request", read_message(&mut stream)).await {
                Ok(msg) => msg,
                Err(SyncError::Protocol(ProtocolError::ConnectionClosed)) => {
                    debug!("client closed session");
                    return Ok(stats);
                }
                Err(e) => return Err(e),
            };
            match msg {
                WireMessage::ListRefsRequest => {
                    let refs = self.advertisement()?;
                    stats.refs_advertised = refs.len();
                    self.send(&mut stream, &WireMessage::ListRefsResponse { refs })
                        .await?;
                }
                WireMessage::FetchRequest { wants, haves } => {
                    let plan = match self.plan(wants, haves).await {
                        Ok(plan) => plan,
                        Err(SyncError::MissingWant(id)) => {
                            let reply = WireMessage::error(
                                codes::UNKNOWN_WANT,
                                format!("not available: {id}"),
                            );
                            self.send(&mut stream, &reply).await?;
                            return Err(SyncError::MissingWant(id));
                        }
                        Err(e) => {
                            let reply = WireMessage::error(codes::INTERNAL, e.to_string());
                            // Best effort; the original error is what matters.
                            let _ = self.send(&mut stream, &reply).await;
                            return Err(e);
                        }
                    };
                    self.send_pack(&mut stream, &plan, &mut stats).await?;
                    info!(
                        objects = stats.objects_sent,
                        bytes = stats.bytes_sent,
                        "upload complete"
                    );
                    return Ok(stats);
                }
                other => return self.reject(&mut stream, "ListRefsRequest or FetchRequest", &other).await,
            }
        }
    }

    fn advertisement(&self) -> SyncResult<Vec<AdvertisedRef>> {
        Ok(self
            .refs
            .list()?
            .into_iter()
            .map(|(name, target)| AdvertisedRef::new(name, target))
            .collect())
    }

    async fn plan(&self, wants: Vec<ObjectId>, haves: Vec<ObjectId>) -> SyncResult<Vec<ObjectId>> {
        let objects = Arc::clone(&self.objects);
        tokio::task::spawn_blocking(move || {
            NegotiationEngine::plan_transfer(&*objects, &wants, &haves)
        })
        .await
        .map_err(|e| SyncError::Io(std::io::Error::other(e)))?
    }

    async fn send_pack<S>(&self, stream: &mut S, plan: &[ObjectId], stats: &mut UploadStats) -> SyncResult<()>
    where
        S: AsyncWrite + Unpin + Send,
    {
        let count = u32::try_from(plan.len()).map_err(|_| {
            SyncError::Io(std::io::Error::other("transfer set exceeds u32 objects"))
        })?;
        self.send(stream, &WireMessage::FetchAccepted { object_count: count })
            .await?;

        let (mut writer, header) = PackWriter::new(count);
        self.write_chunk(stream, &header, stats).await?;
        for id in plan {
            let obj = self.objects.read_required(id)?;
            let record = writer.encode_object(id, &obj)?;
            self.write_chunk(stream, &record, stats).await?;
            stats.objects_sent += 1;
        }
        let trailer = writer.finish()?;
        self.write_chunk(stream, &trailer, stats).await?;
        within(self.io_timeout, "send", stream.flush()).await?;
        Ok(())
    }

    async fn write_chunk<S>(&self, stream: &mut S, bytes: &[u8], stats: &mut UploadStats) -> SyncResult<()>
    where
        S: AsyncWrite + Unpin + Send,
    {
        within(self.io_timeout, "send", stream.write_all(bytes)).await?;
        stats.bytes_sent += bytes.len() as u64;
        Ok(())
    }

    async fn send<S>(&self, stream: &mut S, msg: &WireMessage) -> SyncResult<()>
    where
        S: AsyncWrite + Unpin + Send,
    {
        within(self.io_timeout, "send", write_message(stream, msg)).await
    }

    async fn reject<S, T>(&self, stream: &mut S, expected: &'static str, got: &WireMessage) -> SyncResult<T>
    where
        S: AsyncWrite + Unpin + Send,
    {
        let reply = WireMessage::error(codes::BAD_REQUEST, format!("expected {expected}"));
        let _ = self.send(stream, &reply).await;
        Err(ProtocolError::UnexpectedMessage {
            expected,
            actual: got.type_name(),
        }
        .into())
    }
}

impl std::fmt::Debug for UploadSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadSession")
            .field("io_timeout", &self.io_timeout)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sithub_pack::PackStreamReader;
    use sithub_refs::{InMemoryRefStore, RefTarget};
    use sithub_store::{Blob, InMemoryObjectStore};

    fn session_with_blob() -> (UploadSession, ObjectId) {
        let objects = Arc::new(InMemoryObjectStore::new());
        let refs = Arc::new(InMemoryRefStore::new());
        let id = objects.put(&Blob::new(b"served".to_vec()).into()).unwrap();
        refs.set("refs/heads/main", &id.into(), &*objects).unwrap();
        refs.set("HEAD", &RefTarget::Symbolic("refs/heads/main".into()), &*objects)
            .unwrap();
        (UploadSession::new(objects, refs), id)
    }

    async fn hello<S: AsyncRead + AsyncWrite + Unpin + Send>(client: &mut S) {
        write_message(
            client,
            &WireMessage::Hello {
                version: PROTOCOL_VERSION,
                agent: "test".into(),
            },
        )
        .await
        .unwrap();
        assert!(matches!(
            read_message(client).await.unwrap(),
            WireMessage::HelloAck { version: 1, .. }
        ));
    }

    #[tokio::test]
    async fn advertises_then_streams_pack() {
        let (session, id) = session_with_blob();
        let (mut client, server) = tokio::io::duplex(4096);
        let task = tokio::spawn(session.serve(server));

        hello(&mut client).await;
        write_message(&mut client, &WireMessage::ListRefsRequest).await.unwrap();
        let WireMessage::ListRefsResponse { refs } = read_message(&mut client).await.unwrap() else {
            panic!("expected advertisement");
        };
        assert_eq!(refs.len(), 2);
        assert_eq!(refs[0].name, "HEAD");

        write_message(
            &mut client,
            &WireMessage::FetchRequest {
                wants: vec![id],
                haves: vec![],
            },
        )
        .await
        .unwrap();
        assert_eq!(
            read_message(&mut client).await.unwrap(),
            WireMessage::FetchAccepted { object_count: 1 }
        );
        let mut pack = PackStreamReader::open(&mut client).await.unwrap();
        let (got, _) = pack.next_object().await.unwrap().unwrap();
        assert_eq!(got, id);
        assert!(pack.next_object().await.unwrap().is_none());

        let stats = task.await.unwrap().unwrap();
        assert_eq!(stats.objects_sent, 1);
        assert_eq!(stats.refs_advertised, 2);
    }

    #[tokio::test]
    async fn version_mismatch_is_reported() {
        let (session, _) = session_with_blob();
        let (mut client, server) = tokio::io::duplex(4096);
        let task = tokio::spawn(session.serve(server));
        write_message(
            &mut client,
            &WireMessage::Hello {
                version: 99,
                agent: "future".into(),
            },
        )
        .await
        .unwrap();
        assert!(matches!(
            read_message(&mut client).await.unwrap(),
            WireMessage::Error { code: codes::VERSION_MISMATCH, .. }
        ));
        assert!(matches!(
            task.await.unwrap(),
            Err(SyncError::Protocol(ProtocolError::VersionMismatch { remote: 99, .. }))
        ));
    }

    #[tokio::test]
    async fn unknown_want_gets_error_reply() {
        let (session, _) = session_with_blob();
        let (mut client, server) = tokio::io::duplex(4096);
        let task = tokio::spawn(session.serve(server));
        hello(&mut client).await;
        write_message(
            &mut client,
            &WireMessage::FetchRequest {
                wants: vec![ObjectId::from_bytes(b"nope")],
                haves: vec![],
            },
        )
        .await
        .unwrap();
        assert!(matches!(
            read_message(&mut client).await.unwrap(),
            WireMessage::Error { code: codes::UNKNOWN_WANT, .. }
        ));
        assert!(matches!(task.await.unwrap(), Err(SyncError::MissingWant(_))));
    }

    #[tokio::test]
    async fn hangup_after_listing_is_clean() {
        let (session, _) = session_with_blob();
        let (mut client, server) = tokio::io::duplex(4096);
        let task = tokio::spawn(session.serve(server));
        hello(&mut client).await;
        drop(client);
        let stats = task.await.unwrap().unwrap();
        assert_eq!(stats.objects_sent, 0);
    }

    #[tokio::test]
    async fn idle_client_times_out() {
        let (session, _) = session_with_blob();
        let session = session.with_io_timeout(Duration::from_millis(20));
        let (_client, server) = tokio::io::duplex(4096);
        assert!(matches!(
            session.serve(server).await,
            Err(SyncError::Timeout { stage: "handshake", .. })
        ));
    }
}
