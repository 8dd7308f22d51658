//! Shared types and the error taxonomy used across the proxy.

pub mod errors;
pub mod types;

pub use errors::*;
pub use types::*;
