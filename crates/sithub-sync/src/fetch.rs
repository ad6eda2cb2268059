use std::time::Duration;

use sithub_pack::PackStreamReader;
use sithub_protocol::{
    agent, read_message, reject_remote_error, write_message, AdvertisedRef, ProtocolError,
    WireMessage, PROTOCOL_VERSION,
};
use sithub_refs::RefStore;
use sithub_store::ObjectStore;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info};

use crate::error::{SyncError, SyncResult};
use crate::negotiation::NegotiationEngine;
use crate::transport::RemoteTransport;
use crate::types::{within, CloneOptions, FetchResult, Negotiation};
use crate::verifier::ReceiveVerifier;

/// Client role of the transfer protocol over one connection.
pub struct FetchClient<C> {
    conn: C,
    io_timeout: Duration,
}

impl<C> FetchClient<C>
where
    C: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(conn: C, io_timeout: Duration) -> Self {
        Self { conn, io_timeout }
    }

    pub async fn handshake(&mut self) -> SyncResult<()> {
        self.send(&WireMessage::Hello {
            version: PROTOCOL_VERSION,
            agent: agent(),
        })
        .await?;
        match self.recv("handshake").await? {
            WireMessage::HelloAck { version, agent } if version == PROTOCOL_VERSION => {
                debug!(server = %agent, "handshake complete");
                Ok(())
            }
            WireMessage::HelloAck { version, .. } => Err(ProtocolError::VersionMismatch {
                local: PROTOCOL_VERSION,
                remote: version,
            }
            .into()),
            other => Err(unexpected("HelloAck", &other)),
        }
    }

    pub async fn list_refs(&mut self) -> SyncResult<Vec<AdvertisedRef>> {
        self.send(&WireMessage::ListRefsRequest).await?;
        match self.recv("list-refs").await? {
            WireMessage::ListRefsResponse { refs } => Ok(refs),
            other => Err(unexpected("ListRefsResponse", &other)),
        }
    }

    /// Request `negotiation.wants` and store the pack that follows.
    ///
    /// Returns the number of objects received. Each object is checked and
    /// written as it arrives; the call only succeeds once the stream's end
    /// marker has been verified.
    pub async fn fetch(
        mut self,
        negotiation: &Negotiation,
        objects: &dyn ObjectStore,
    ) -> SyncResult<u32> {
        self.send(&WireMessage::FetchRequest {
            wants: negotiation.wants.clone(),
            haves: negotiation.haves.clone(),
        })
        .await?;
        let announced = match self.recv("fetch").await? {
            WireMessage::FetchAccepted { object_count } => object_count,
            other => return Err(unexpected("FetchAccepted", &other)),
        };
        receive_pack(&mut self.conn, objects, announced, self.io_timeout).await
    }

    async fn send(&mut self, msg: &WireMessage) -> SyncResult<()> {
        within(self.io_timeout, "send", write_message(&mut self.conn, msg)).await
    }

    async fn recv(&mut self, stage: &'static str) -> SyncResult<WireMessage> {
        let msg = within(self.io_timeout, stage, read_message(&mut self.conn)).await?;
        Ok(reject_remote_error(msg)?)
    }
}

fn unexpected(expected: &'static str, got: &WireMessage) -> SyncError {
    ProtocolError::UnexpectedMessage {
        expected,
        actual: got.type_name(),
    }
    .into()
}

/// Read a pack from `reader`, verifying and storing each object in arrival
/// order.
///
/// Objects written before a failure stay in the store. They are unreachable
/// from any ref the caller has not yet written.
pub async fn receive_pack<R>(
    reader: R,
    objects: &dyn ObjectStore,
    announced: u32,
    io_timeout: Duration,
) -> SyncResult<u32>
where
    R: AsyncRead + Unpin,
{
    let mut pack = within(io_timeout, "pack header", PackStreamReader::open(reader)).await?;
    if pack.expected_count() != announced {
        return Err(sithub_pack::PackError::CountMismatch {
            expected: announced,
            actual: pack.expected_count(),
        }
        .into());
    }
    let verifier = ReceiveVerifier::new(objects);
    while let Some((id, obj)) = within(io_timeout, "pack", pack.next_object()).await? {
        verifier.check(&id, &obj)?;
        objects.write(&obj)?;
    }
    Ok(pack.received_count())
}

/// Fetch everything reachable from the source's refs that `objects` lacks.
///
/// The advertisement is returned rather than written: the caller updates
/// its refs only after this returns `Ok`, which guarantees every object the
/// new refs reach is stored.
pub async fn fetch(
    transport: &dyn RemoteTransport,
    objects: &dyn ObjectStore,
    refs: &dyn RefStore,
    options: &CloneOptions,
) -> SyncResult<FetchResult> {
    let source = transport.describe();
    let conn = match tokio::time::timeout(options.connect_timeout, transport.connect()).await {
        Ok(conn) => conn?,
        Err(_) => {
            return Err(SyncError::Timeout {
                stage: "connect",
                secs: options.connect_timeout.as_secs(),
            })
        }
    };

    let mut client = FetchClient::new(conn, options.io_timeout);
    client.handshake().await?;
    let advertised = client.list_refs().await?;
    let negotiation = NegotiationEngine::negotiate(refs, objects, &advertised)?;
    debug!(
        %source,
        refs = advertised.len(),
        wants = negotiation.wants.len(),
        haves = negotiation.haves.len(),
        "negotiated"
    );

    let objects_received = if negotiation.is_up_to_date() {
        0
    } else {
        client.fetch(&negotiation, objects).await?
    };
    ReceiveVerifier::new(objects).check_complete(&negotiation.wants)?;
    info!(%source, objects = objects_received, "fetch complete");

    Ok(FetchResult {
        refs: advertised,
        negotiation,
        objects_received,
    })
}
