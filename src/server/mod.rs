pub mod config;
pub mod dispatcher;
pub mod limbo;
pub mod probe;
pub mod session;
pub mod status;
pub mod utils;

pub use config::{Args, DataLogging, ProxyConfig, TitleStyle};
pub use dispatcher::{bind, handle_connection, serve, serve_with_shutdown};
pub use limbo::{DotCycle, run_limbo};
pub use probe::probe_backend;
pub use session::{Session, new_session_id, run_session};
pub use status::relay_status_exchange;
