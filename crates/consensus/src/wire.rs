//! Framing shared by the consensus module's ingress and service links.
//!
//! Ingress frames are `u32` length followed by the payload. Service-link
//! messages additionally carry the originating `u64` session id so responses
//! can be routed back to the right client connection.

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Write one ingress frame.
pub async fn write_frame<W>(writer: &mut W, payload: &[u8]) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let length = u32::try_from(payload.len())
        .map_err(|_| std::io::Error::from(std::io::ErrorKind::InvalidInput))?;

    writer.write_u32(length).await?;
    writer.write_all(payload).await
}

/// Read one ingress frame. Returns `None` on a clean end of stream.
pub async fn read_frame<R>(reader: &mut R) -> std::io::Result<Option<Bytes>>
where
    R: AsyncRead + Unpin,
{
    let length = match reader.read_u32().await {
        Ok(length) => length,
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    };

    let mut payload = vec![0u8; length as usize];
    reader.read_exact(&mut payload).await?;

    Ok(Some(Bytes::from(payload)))
}

/// Write one service-link message.
pub async fn write_message<W>(
    writer: &mut W,
    session_id: u64,
    payload: &[u8],
) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_u64(session_id).await?;
    write_frame(writer, payload).await
}

/// Read one service-link message. Returns `None` on a clean end of stream.
pub async fn read_message<R>(reader: &mut R) -> std::io::Result<Option<(u64, Bytes)>>
where
    R: AsyncRead + Unpin,
{
    let session_id = match reader.read_u64().await {
        Ok(session_id) => session_id,
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    };

    let payload = read_frame(reader)
        .await?
        .ok_or_else(|| std::io::Error::from(std::io::ErrorKind::UnexpectedEof))?;

    Ok(Some((session_id, payload)))
}
