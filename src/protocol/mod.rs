//! Minecraft wire format pieces the proxy needs: VarInts, framing, the
//! handshake and the handful of packets it injects itself.

pub mod frame;
pub mod handshake;
pub mod packets;
pub mod varint;

pub use frame::*;
pub use handshake::*;
pub use packets::*;
pub use varint::*;
