use crate::common::{ProxyError, ProxyResult};
use tokio::net::TcpStream;
use tokio::time::{Duration, timeout};
use tracing::debug;

/// Low latency and dead-peer detection for a relayed socket.
pub fn tune_socket(stream: &TcpStream, label: &str) {
    if let Err(e) = stream.set_nodelay(true) {
        debug!("Failed to set TCP_NODELAY on {} stream: {}", label, e);
    }

    let socket_ref = socket2::SockRef::from(stream);
    if let Err(e) = socket_ref.set_keepalive(true) {
        debug!("Failed to set SO_KEEPALIVE on {} stream: {}", label, e);
    }
}

/// Connect to `host:port`, mapping every failure to `BackendUnreachable`.
pub async fn connect_backend(host: &str, port: u16, limit: Duration) -> ProxyResult<TcpStream> {
    let addr = format!("{}:{}", host, port);
    match timeout(limit, TcpStream::connect((host, port))).await {
        Ok(Ok(stream)) => {
            tune_socket(&stream, "backend");
            Ok(stream)
        }
        Ok(Err(e)) => Err(ProxyError::BackendUnreachable {
            addr,
            reason: e.to_string(),
        }),
        Err(_) => Err(ProxyError::BackendUnreachable {
            addr,
            reason: format!("connect timed out after {}s", limit.as_secs_f64()),
        }),
    }
}
