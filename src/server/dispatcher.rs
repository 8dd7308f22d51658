use crate::common::{ProxyError, ProxyResult, is_connection_error};
use crate::protocol::{Route, read_handshake, route};
use crate::server::config::ProxyConfig;
use crate::server::session::{new_session_id, run_session};
use crate::server::status::relay_status_exchange;
use crate::server::utils::{connect_backend, tune_socket};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Bind the player-facing listener. Failing here is fatal for the process.
pub async fn bind(config: &ProxyConfig) -> ProxyResult<TcpListener> {
    let addr = config.listen_addr();
    TcpListener::bind(&addr)
        .await
        .map_err(|source| ProxyError::Bind { addr, source })
}

async fn wait_shutdown(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

/// Accept players until the process ends.
pub async fn serve(listener: TcpListener, config: Arc<ProxyConfig>) -> ProxyResult<()> {
    let (_tx, rx) = watch::channel(false);
    serve_with_shutdown(listener, config, rx).await
}

/// Accept players until `shutdown` turns true or its sender is dropped.
///
/// Every connection gets its own task before any byte is read from it, so a
/// slow handshake or status exchange never holds up the next accept. Live
/// sessions are aborted on shutdown.
pub async fn serve_with_shutdown(
    listener: TcpListener,
    config: Arc<ProxyConfig>,
    mut shutdown: watch::Receiver<bool>,
) -> ProxyResult<()> {
    if let Ok(addr) = listener.local_addr() {
        info!(
            "Proxy active on {} -> {}",
            addr,
            config.target_addr()
        );
    }

    let mut sessions = JoinSet::new();

    loop {
        tokio::select! {
            _ = wait_shutdown(&mut shutdown) => break,
            Some(joined) = sessions.join_next(), if !sessions.is_empty() => {
                if let Err(e) = joined {
                    if e.is_panic() {
                        error!("Connection task panicked: {}", e);
                    }
                }
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    let config = config.clone();
                    sessions.spawn(handle_connection(stream, peer, config));
                }
                Err(e) => error!("Failed to accept client: {}", e),
            },
        }
    }

    info!("Proxy stopping, aborting {} live connections", sessions.len());
    sessions.shutdown().await;
    Ok(())
}

/// Classify one accepted connection and run it to completion.
pub async fn handle_connection(client: TcpStream, peer: SocketAddr, config: Arc<ProxyConfig>) {
    let id = new_session_id();
    info!("Session {}: New connection from {}", id, peer);
    tune_socket(&client, "client");

    match dispatch(&id, client, config).await {
        Ok(()) => {}
        Err(e @ ProxyError::BackendUnreachable { .. }) => warn!("Session {}: {}", id, e),
        Err(ProxyError::Io(e)) if is_connection_error(&e) => {
            info!("Session {}: Connection closed: {}", id, e)
        }
        Err(e) => error!("Session {}: Error: {}", id, e),
    }
}

async fn dispatch(id: &str, mut client: TcpStream, config: Arc<ProxyConfig>) -> ProxyResult<()> {
    let initial = read_handshake(&mut client, config.handshake_timeout).await?;
    if initial.is_empty() {
        debug!("Session {}: closed before sending a handshake", id);
        return Ok(());
    }

    let (decision, parse_error) = route(&initial);
    if let Some(e) = parse_error {
        info!(
            "Session {}: Packet parsing error: {}; forwarding as opaque bytes",
            id, e
        );
    }

    let backend = match connect_backend(
        &config.target_host,
        config.target_port,
        config.connect_timeout,
    )
    .await
    {
        Ok(backend) => backend,
        Err(e) => {
            let _ = client.shutdown().await;
            return Err(e);
        }
    };

    match decision {
        Route::Session(info) => {
            info!(
                "Session {}: Packet verified! Host: {}, Port: {}, Protocol: {}",
                id, info.hostname, info.port, info.protocol_version
            );
            run_session(id.to_string(), config, client, backend, initial).await
        }
        Route::Status(info) => {
            // failures are logged by the exchange
            let _ = relay_status_exchange(
                id,
                client,
                backend,
                &initial,
                info.as_ref(),
                config.status_timeout,
            )
            .await;
            Ok(())
        }
    }
}
