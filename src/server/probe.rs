use crate::protocol::PROBE_PAYLOAD;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::{Duration, timeout};
use tracing::debug;

/// Check whether `host:port` accepts TCP connections.
///
/// A successful connect within `limit` counts as up. The probe payload is
/// best effort and the connection is always shut down afterwards.
pub async fn probe_backend(host: &str, port: u16, limit: Duration) -> bool {
    match timeout(limit, TcpStream::connect((host, port))).await {
        Ok(Ok(mut stream)) => {
            if let Err(e) = stream.write_all(&PROBE_PAYLOAD).await {
                debug!("Probe payload to {}:{} failed: {}", host, port, e);
            }
            let _ = stream.shutdown().await;
            true
        }
        Ok(Err(e)) => {
            debug!("Probe of {}:{} failed: {}", host, port, e);
            false
        }
        Err(_) => {
            debug!("Probe of {}:{} timed out", host, port);
            false
        }
    }
}
