//! Transparent proxy in front of a Minecraft server that keeps players
//! connected while the server restarts.
//!
//! Connections are classified from their handshake. Status pings are relayed
//! once and closed; login sessions are relayed in both directions until the
//! backend sends a disconnect carrying the configured marker. The player is
//! then held on a title screen until the backend answers probes again and is
//! finally handed a transfer packet back to it.

pub mod common;
pub mod protocol;
pub mod server;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub const DEFAULT_BUFFER_SIZE: usize = 32 * 1024;

pub const DEFAULT_CONNECTION_TIMEOUT: u64 = 5;

pub const HEARTBEAT_INTERVAL: u64 = 10;

pub const LIMBO_POLL_INTERVAL: u64 = 3;

pub const PROBE_TIMEOUT: u64 = 2;

pub const STATUS_TIMEOUT_MS: u64 = 1000;

pub use common::{
    HandshakeInfo, LimboState, NextState, ProtocolError, ProxyError, ProxyResult,
    is_connection_error,
};
pub use protocol::{
    FrameReader, Route, TitleSlot, TitleTimes, classify, decode_varint, encode_varint,
    handshake_packet, is_disconnect_frame, read_handshake, title_packet, title_times_packet,
    transfer_packet,
};
pub use server::{
    Args, DataLogging, DotCycle, ProxyConfig, Session, TitleStyle, bind, handle_connection,
    probe_backend, serve, serve_with_shutdown,
};
