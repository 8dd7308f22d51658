use std::io;
use thiserror::Error;

/// Wire-level decode and encode failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("VarInt ended before its final byte")]
    MalformedVarInt,

    #[error("VarInt longer than 5 bytes")]
    VarIntTooLong,

    #[error("Malformed handshake: {0}")]
    MalformedHandshake(String),

    #[error("Unexpected packet id 0x{0:02x}")]
    UnexpectedPacketId(u32),

    #[error("Payload of {len} bytes exceeds the {max} byte limit")]
    PayloadTooLarge { len: usize, max: usize },

    #[error("Frame of {len} bytes exceeds the {max} byte limit")]
    FrameTooLarge { len: usize, max: usize },
}

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("Backend {addr} unreachable: {reason}")]
    BackendUnreachable { addr: String, reason: String },

    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Other: {0}")]
    Msg(String),
}

impl From<&str> for ProxyError {
    fn from(s: &str) -> Self {
        ProxyError::Msg(s.to_string())
    }
}

impl From<String> for ProxyError {
    fn from(s: String) -> Self {
        ProxyError::Msg(s)
    }
}

pub type ProxyResult<T> = std::result::Result<T, ProxyError>;

/// True for errors that mean the peer went away rather than a local fault.
pub fn is_connection_error(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::BrokenPipe
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionRefused
            | io::ErrorKind::TimedOut
            | io::ErrorKind::UnexpectedEof
    )
}
