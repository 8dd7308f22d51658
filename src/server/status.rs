use crate::common::{HandshakeInfo, ProxyError, ProxyResult, is_connection_error};
use crate::protocol::FrameReader;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{Duration, timeout};
use tracing::{debug, info};

/// Status responses carry the server icon, so allow generous frames.
pub const MAX_STATUS_FRAME: usize = 256 * 1024;

/// Move one frame from `reader` to `writer`. `false` when the reader ended
/// or stayed silent for `limit`.
async fn relay_frame<R, W>(
    frames: &mut FrameReader,
    reader: &mut R,
    writer: &mut W,
    limit: Duration,
) -> ProxyResult<bool>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    match timeout(limit, frames.read_frame(reader)).await {
        Ok(Ok(Some(frame))) => {
            writer.write_all(&frame).await?;
            writer.flush().await?;
            Ok(true)
        }
        Ok(Ok(None)) | Err(_) => Ok(false),
        Ok(Err(e)) => Err(e),
    }
}

/// Forward a status/ping connection: handshake, at most one status request
/// with its response, at most one ping with its pong. Both sockets are shut
/// down afterwards whatever happened. Returns the number of frames relayed
/// after the handshake.
pub async fn relay_status_exchange(
    session_id: &str,
    mut client: TcpStream,
    mut backend: TcpStream,
    initial: &[u8],
    handshake: Option<&HandshakeInfo>,
    limit: Duration,
) -> ProxyResult<usize> {
    // An undecodable handshake is passed through untouched; a decoded one
    // goes alone and whatever followed it is treated as client frames.
    let split = handshake.map_or(initial.len(), |info| info.frame_len.min(initial.len()));
    let (head, rest) = initial.split_at(split);

    let result = async {
        backend.write_all(head).await?;
        backend.flush().await?;

        let mut client_frames = FrameReader::with_buffered(rest, MAX_STATUS_FRAME);
        let mut backend_frames = FrameReader::new(MAX_STATUS_FRAME);
        let mut relayed = 0;

        // request -> response, then ping -> pong
        for _ in 0..2 {
            if !relay_frame(&mut client_frames, &mut client, &mut backend, limit).await? {
                break;
            }
            relayed += 1;
            if !relay_frame(&mut backend_frames, &mut backend, &mut client, limit).await? {
                break;
            }
            relayed += 1;
        }
        Ok::<usize, ProxyError>(relayed)
    }
    .await;

    let _ = client.shutdown().await;
    let _ = backend.shutdown().await;

    match &result {
        Ok(relayed) => info!(
            "Session {}: status exchange finished after {} frames",
            session_id, relayed
        ),
        Err(ProxyError::Io(e)) if is_connection_error(e) => {
            info!("Session {}: status exchange closed early: {}", session_id, e)
        }
        Err(e) => debug!("Session {}: status exchange aborted: {}", session_id, e),
    }
    result
}
