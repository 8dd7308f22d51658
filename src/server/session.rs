//! A relayed player session: one client socket, one backend socket and the
//! three tasks that move bytes between them.
//!
//! Writes to the client come from the backend relay, the heartbeat filler and
//! the limbo state machine, so they all go through `Session::send_to_client`,
//! which holds the client write half behind a mutex. The backend write half is
//! owned by the client relay alone.
//!
//! Closing is signalled through a watch channel that every blocked read also
//! waits on; `Session::close` flips it once and shuts down the client write
//! half. Whichever relay direction ends first calls it.

use crate::common::{LimboState, ProxyResult, is_connection_error};
use crate::protocol::{HEARTBEAT, is_disconnect_frame};
use crate::server::config::ProxyConfig;
use crate::server::limbo::run_limbo;
use crate::server::utils::{log_data_sample, log_transfer_summary};
use bytes::BytesMut;
use rand::Rng;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{Mutex, watch};
use tokio::time::{Instant, interval_at};
use tracing::{debug, error, info, warn};

/// Short random id used to tag a connection's log lines.
pub fn new_session_id() -> String {
    format!("{:05x}", rand::thread_rng().gen_range(0..0x10_0000u32))
}

pub struct Session {
    id: String,
    config: Arc<ProxyConfig>,
    backend_alive: AtomicBool,
    limbo_entered: AtomicBool,
    limbo_state: std::sync::Mutex<LimboState>,
    client_writer: Mutex<OwnedWriteHalf>,
    closed: watch::Sender<bool>,
}

impl Session {
    pub fn new(id: String, config: Arc<ProxyConfig>, client_writer: OwnedWriteHalf) -> Self {
        let (closed, _) = watch::channel(false);
        Self {
            id,
            config,
            backend_alive: AtomicBool::new(true),
            limbo_entered: AtomicBool::new(false),
            limbo_state: std::sync::Mutex::new(LimboState::Active),
            client_writer: Mutex::new(client_writer),
            closed,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    pub fn is_backend_alive(&self) -> bool {
        self.backend_alive.load(Ordering::SeqCst)
    }

    pub fn mark_backend_dead(&self) {
        self.backend_alive.store(false, Ordering::SeqCst);
    }

    /// Claim the single limbo run of this session. Only the first caller
    /// gets `true`.
    pub fn try_enter_limbo(&self) -> bool {
        self.limbo_entered
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub fn limbo_state(&self) -> LimboState {
        match self.limbo_state.lock() {
            Ok(state) => *state,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    /// Move the limbo state forward. Backward or repeated moves are refused.
    pub fn advance(&self, next: LimboState) -> bool {
        let mut state = match self.limbo_state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };
        if next <= *state {
            warn!(
                "Session {}: refused limbo transition {:?} -> {:?}",
                self.id, *state, next
            );
            return false;
        }
        debug!("Session {}: limbo {:?} -> {:?}", self.id, *state, next);
        *state = next;
        true
    }

    /// Write one whole packet to the client.
    ///
    /// Gives up as soon as the session closes, so a client that stopped
    /// reading cannot keep the writer locked.
    pub async fn send_to_client(&self, bytes: &[u8]) -> io::Result<()> {
        let mut signal = self.closed.subscribe();
        let mut writer = self.client_writer.lock().await;
        tokio::select! {
            result = async {
                writer.write_all(bytes).await?;
                writer.flush().await
            } => result,
            _ = wait_closed(&mut signal) => Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "session closed",
            )),
        }
    }

    pub fn close_signal(&self) -> watch::Receiver<bool> {
        self.closed.subscribe()
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    /// Tear the session down. Safe to call any number of times.
    pub async fn close(&self) {
        if self.closed.send_replace(true) {
            return;
        }
        info!("Session {}: Final resource cleanup", self.id);
        let mut writer = self.client_writer.lock().await;
        if let Err(e) = writer.shutdown().await {
            debug!("Session {}: client shutdown: {}", self.id, e);
        }
    }
}

/// Wait until the session is closed.
pub(crate) async fn wait_closed(signal: &mut watch::Receiver<bool>) {
    let _ = signal.wait_for(|closed| *closed).await;
}

/// How the backend relay loop ended.
enum BackendExit {
    Closed,
    Limbo,
}

/// Relay a classified session until both directions are done.
///
/// `initial` is everything read from the client so far, handshake included;
/// it is forwarded to the backend before relaying starts.
pub async fn run_session(
    id: String,
    config: Arc<ProxyConfig>,
    client: TcpStream,
    backend: TcpStream,
    initial: BytesMut,
) -> ProxyResult<()> {
    let (client_reader, client_writer) = client.into_split();
    let (backend_reader, mut backend_writer) = backend.into_split();

    let session = Arc::new(Session::new(id, config, client_writer));

    if let Err(e) = async {
        backend_writer.write_all(&initial).await?;
        backend_writer.flush().await
    }
    .await
    {
        session.close().await;
        return Err(e.into());
    }

    info!("Session {}: The player has passed through the proxy", session.id());

    let to_client = tokio::spawn(relay_backend_to_client(session.clone(), backend_reader));
    let to_backend = tokio::spawn(relay_client_to_backend(
        session.clone(),
        client_reader,
        backend_writer,
    ));
    let heartbeat = tokio::spawn(heartbeat_filler(session.clone()));

    let (a, b, c) = tokio::join!(to_client, to_backend, heartbeat);
    for joined in [a, b, c] {
        if let Err(e) = joined {
            error!("Session {}: task failed: {}", session.id(), e);
        }
    }
    session.close().await;

    info!("Session {}: closed", session.id());
    Ok(())
}

async fn relay_backend_to_client(session: Arc<Session>, mut backend: OwnedReadHalf) {
    let id = session.id().to_string();
    let marker = session.config().disconnect_marker.clone().into_bytes();
    let data_logging = session.config().data_logging;
    let mut signal = session.close_signal();
    let mut buffer = vec![0u8; session.config().buffer_size];
    let mut total_bytes: u64 = 0;
    let start_time = Instant::now();

    let exit = loop {
        let n = tokio::select! {
            result = backend.read(&mut buffer) => match result {
                Ok(0) => {
                    info!("Session {}: backend closed the connection", id);
                    break BackendExit::Closed;
                }
                Ok(n) => n,
                Err(e) => {
                    if is_connection_error(&e) {
                        info!("Session {}: server -> client: Connection closed: {}", id, e);
                    } else {
                        error!("Session {}: Error reading from backend: {}", id, e);
                    }
                    break BackendExit::Closed;
                }
            },
            _ = wait_closed(&mut signal) => break BackendExit::Closed,
        };

        let chunk = &buffer[..n];
        if is_disconnect_frame(chunk, &marker) {
            if session.try_enter_limbo() {
                info!("Session {}: Server went offline. Entering limbo mode...", id);
                session.mark_backend_dead();
                break BackendExit::Limbo;
            }
            break BackendExit::Closed;
        }

        log_data_sample(&id, "server -> client", chunk, data_logging);

        if let Err(e) = session.send_to_client(chunk).await {
            if is_connection_error(&e) {
                info!("Session {}: server -> client: Connection closed: {}", id, e);
            } else {
                error!("Session {}: Error writing to client: {}", id, e);
            }
            break BackendExit::Closed;
        }
        total_bytes += n as u64;
    };

    log_transfer_summary(&id, "server -> client", total_bytes, start_time.elapsed());

    if let BackendExit::Limbo = exit {
        drop(backend);
        let state = run_limbo(&session).await;
        debug!("Session {}: limbo finished in {:?}", id, state);
    }

    session.close().await;
}

async fn relay_client_to_backend(
    session: Arc<Session>,
    mut client: OwnedReadHalf,
    mut backend: OwnedWriteHalf,
) {
    let id = session.id().to_string();
    let data_logging = session.config().data_logging;
    let mut signal = session.close_signal();
    let mut buffer = vec![0u8; session.config().buffer_size];
    let mut total_bytes: u64 = 0;
    let mut dropped_bytes: u64 = 0;
    let start_time = Instant::now();

    loop {
        let n = tokio::select! {
            result = client.read(&mut buffer) => match result {
                Ok(0) => {
                    info!("Session {}: The player left the server. Closing the session.", id);
                    session.mark_backend_dead();
                    break;
                }
                Ok(n) => n,
                Err(e) => {
                    if is_connection_error(&e) {
                        info!("Session {}: client -> server: Connection closed: {}", id, e);
                    } else {
                        error!("Session {}: Error reading from client: {}", id, e);
                    }
                    break;
                }
            },
            _ = wait_closed(&mut signal) => break,
        };

        if !session.is_backend_alive() {
            dropped_bytes += n as u64;
            continue;
        }

        log_data_sample(&id, "client -> server", &buffer[..n], data_logging);

        // The backend going away surfaces through limbo, not here.
        match backend.write_all(&buffer[..n]).await {
            Ok(()) => total_bytes += n as u64,
            Err(e) => debug!("Session {}: client -> server write dropped: {}", id, e),
        }
    }

    if dropped_bytes > 0 {
        debug!(
            "Session {}: dropped {} client bytes while the backend was down",
            id, dropped_bytes
        );
    }
    log_transfer_summary(&id, "client -> server", total_bytes, start_time.elapsed());

    let _ = backend.shutdown().await;
    session.close().await;
}

/// Keep a player in limbo from timing out by sending empty frames.
async fn heartbeat_filler(session: Arc<Session>) {
    let period = session.config().heartbeat_interval;
    let mut signal = session.close_signal();
    let mut ticker = interval_at(Instant::now() + period, period);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = wait_closed(&mut signal) => break,
        }
        if session.is_backend_alive() || session.is_closed() {
            continue;
        }
        if let Err(e) = session.send_to_client(&HEARTBEAT).await {
            debug!("Session {}: heartbeat failed, client gone: {}", session.id(), e);
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    /// A connected loopback pair: (proxy side, peer side).
    async fn socket_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (connected, accepted) = tokio::join!(TcpStream::connect(addr), listener.accept());
        (accepted.unwrap().0, connected.unwrap())
    }

    async fn test_session() -> (Session, OwnedReadHalf, TcpStream) {
        let (proxy_side, peer) = socket_pair().await;
        let (reader, writer) = proxy_side.into_split();
        let session = Session::new(new_session_id(), Arc::new(ProxyConfig::default()), writer);
        (session, reader, peer)
    }

    #[test]
    fn session_ids_are_five_hex_chars() {
        let id = new_session_id();
        assert_eq!(id.len(), 5);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[tokio::test]
    async fn limbo_is_entered_once() {
        let (session, _reader, _peer) = test_session().await;
        assert!(session.try_enter_limbo());
        assert!(!session.try_enter_limbo());
        assert!(!session.try_enter_limbo());
    }

    #[tokio::test]
    async fn limbo_state_only_moves_forward() {
        let (session, _reader, _peer) = test_session().await;
        assert_eq!(session.limbo_state(), LimboState::Active);
        assert!(session.advance(LimboState::Frozen));
        assert!(session.advance(LimboState::PollingDown));
        assert!(!session.advance(LimboState::WaitingGrace));
        assert!(!session.advance(LimboState::PollingDown));
        assert_eq!(session.limbo_state(), LimboState::PollingDown);
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let (session, _reader, mut peer) = test_session().await;
        session.send_to_client(b"hi").await.unwrap();

        session.close().await;
        session.close().await;
        assert!(session.is_closed());

        let mut received = Vec::new();
        peer.read_to_end(&mut received).await.unwrap();
        assert_eq!(received, b"hi");

        drop(peer);
        session.close().await;
        assert!(session.send_to_client(b"late").await.is_err());
    }

    #[tokio::test]
    async fn close_interrupts_a_write_the_client_never_reads() {
        let (session, _reader, _peer) = test_session().await;
        let session = Arc::new(session);

        let stuck = {
            let session = session.clone();
            tokio::spawn(async move { session.send_to_client(&vec![0u8; 64 * 1024 * 1024]).await })
        };
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;

        tokio::time::timeout(std::time::Duration::from_secs(2), session.close())
            .await
            .unwrap();
        let result = tokio::time::timeout(std::time::Duration::from_secs(2), stuck)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn close_wakes_waiting_readers() {
        let (session, _reader, _peer) = test_session().await;
        let mut signal = session.close_signal();
        let waiter = tokio::spawn(async move { wait_closed(&mut signal).await });

        session.close().await;
        tokio::time::timeout(std::time::Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }
}
