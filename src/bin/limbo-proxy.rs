use clap::Parser;
use limbo_proxy::{Args, ProxyConfig, bind, serve_with_shutdown};
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    let config = match ProxyConfig::try_from(args) {
        Ok(config) => Arc::new(config),
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    info!(
        "Limbo proxy {} starting: transfer target {}:{}, disconnect marker {:?}",
        limbo_proxy::VERSION,
        config.transfer_host,
        config.transfer_port,
        config.disconnect_marker
    );
    info!(
        "Grace periods - Shutdown: {}s, Initialization: {}s, data logging: {:?}",
        config.shutdown_grace.as_secs(),
        config.init_grace.as_secs(),
        config.data_logging
    );

    let listener = match bind(&config).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let (stop_tx, stop_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl-C, shutting down gracefully...");
            let _ = stop_tx.send(true);
        }
    });

    match serve_with_shutdown(listener, config, stop_rx).await {
        Ok(()) => {
            info!("Proxy server stopped.");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Proxy server failed: {}", e);
            ExitCode::FAILURE
        }
    }
}
