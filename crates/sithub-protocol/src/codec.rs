use std::io::ErrorKind;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::trace;

use crate::error::{ProtocolError, ProtocolResult};
use crate::message::{WireMessage, MAX_MESSAGE_SIZE};

/// Codec for framed protocol messages: `[u32 BE len][u8 tag][bincode payload]`,
/// where `len` counts the tag byte plus the payload.
pub struct FrameCodec;

impl FrameCodec {
    pub fn encode(msg: &WireMessage) -> ProtocolResult<Vec<u8>> {
        let payload =
            bincode::serialize(msg).map_err(|e| ProtocolError::Serialization(e.to_string()))?;
        if payload.len() > MAX_MESSAGE_SIZE {
            return Err(ProtocolError::MessageTooLarge {
                size: payload.len(),
                max: MAX_MESSAGE_SIZE,
            });
        }
        let len = (payload.len() + 1) as u32;
        let mut buf = Vec::with_capacity(4 + 1 + payload.len());
        buf.extend_from_slice(&len.to_be_bytes());
        buf.push(msg.type_tag());
        buf.extend_from_slice(&payload);
        Ok(buf)
    }

    /// Decode one framed message from the front of `data`.
    /// Returns the message and the number of bytes consumed.
    pub fn decode(data: &[u8]) -> ProtocolResult<(WireMessage, usize)> {
        if data.len() < 4 {
            return Err(ProtocolError::FramingError("too short".into()));
        }
        let len = Self::check_len([data[0], data[1], data[2], data[3]])?;
        let total = 4 + len;
        if data.len() < total {
            return Err(ProtocolError::FramingError(format!(
                "incomplete: have {}, need {}",
                data.len(),
                total
            )));
        }
        let msg = Self::decode_body(data[4], &data[5..total])?;
        Ok((msg, total))
    }

    fn check_len(prefix: [u8; 4]) -> ProtocolResult<usize> {
        let len = u32::from_be_bytes(prefix) as usize;
        if len < 1 {
            return Err(ProtocolError::FramingError("zero-length frame".into()));
        }
        if len - 1 > MAX_MESSAGE_SIZE {
            return Err(ProtocolError::MessageTooLarge {
                size: len - 1,
                max: MAX_MESSAGE_SIZE,
            });
        }
        Ok(len)
    }

    fn decode_body(tag: u8, payload: &[u8]) -> ProtocolResult<WireMessage> {
        let msg: WireMessage = bincode::deserialize(payload)
            .map_err(|e| ProtocolError::Deserialization(e.to_string()))?;
        if msg.type_tag() != tag {
            return Err(ProtocolError::InvalidMessageType(tag));
        }
        Ok(msg)
    }
}

/// Write one framed message and flush.
pub async fn write_message<W>(writer: &mut W, msg: &WireMessage) -> ProtocolResult<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let frame = FrameCodec::encode(msg)?;
    writer.write_all(&frame).await?;
    writer.flush().await?;
    trace!(message = msg.type_name(), bytes = frame.len(), "sent");
    Ok(())
}

/// Read one framed message.
///
/// EOF before the first byte of a frame is [`ProtocolError::ConnectionClosed`];
/// EOF inside a frame is a [`ProtocolError::FramingError`].
pub async fn read_message<R>(reader: &mut R) -> ProtocolResult<WireMessage>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut prefix = [0u8; 4];
    let first = reader.read(&mut prefix[..1]).await?;
    if first == 0 {
        return Err(ProtocolError::ConnectionClosed);
    }
    read_frame_part(reader, &mut prefix[1..]).await?;
    let len = FrameCodec::check_len(prefix)?;

    let mut body = vec![0u8; len];
    read_frame_part(reader, &mut body).await?;
    let msg = FrameCodec::decode_body(body[0], &body[1..])?;
    trace!(message = msg.type_name(), bytes = len + 4, "received");
    Ok(msg)
}

async fn read_frame_part<R>(reader: &mut R, buf: &mut [u8]) -> ProtocolResult<()>
where
    R: AsyncRead + Unpin + ?Sized,
{
    match reader.read_exact(buf).await {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
            Err(ProtocolError::FramingError("connection closed mid-frame".into()))
        }
        Err(e) => Err(e.into()),
    }
}

/// Turn an `Error` message into [`ProtocolError::RemoteError`], pass anything
/// else through.
pub fn reject_remote_error(msg: WireMessage) -> ProtocolResult<WireMessage> {
    match msg {
        WireMessage::Error { code, message } => Err(ProtocolError::RemoteError { code, message }),
        other => Ok(other),
    }
}
