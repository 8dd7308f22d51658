//! Logging and socket helpers shared by the server side.

pub mod logging;
pub mod network;

pub use logging::*;
pub use network::*;
