use crate::common::{ProxyError, ProxyResult};
use crate::protocol::{TitleSlot, TitleTimes, title_packet, transfer_packet};
use clap::{Parser, ValueEnum};
use std::time::Duration;
use tracing::warn;

/// Placeholder in the offline subtitle replaced by the animated dots.
pub const DOTS_PLACEHOLDER: &str = "%dots%";

/// How much relayed payload to echo into the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum DataLogging {
    #[default]
    Off,
    Minimal,
    Verbose,
}

/// Command-line arguments for the limbo proxy
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Address to listen on for players
    #[arg(long = "listen-host", default_value = "0.0.0.0")]
    pub listen_host: String,

    /// Port to listen on for players
    #[arg(long = "port", short = 'p', default_value = "25565")]
    pub port: u16,

    /// Backend server host
    #[arg(long = "target-host", short = 'H', default_value = "127.0.0.1")]
    pub target_host: String,

    /// Backend server port
    #[arg(long = "target-port", short = 'P', default_value = "25566")]
    pub target_port: u16,

    /// Host players are transferred to once the backend is back
    #[arg(long = "transfer-host", default_value = "127.0.0.1")]
    pub transfer_host: String,

    /// Port players are transferred to once the backend is back
    #[arg(long = "transfer-port", default_value = "25565")]
    pub transfer_port: u16,

    #[arg(long = "offline-title", default_value = "Server restarting")]
    pub offline_title: String,

    /// Subtitle while waiting; `%dots%` cycles through one to three dots
    #[arg(long = "offline-subtitle", default_value = "Please wait%dots%")]
    pub offline_subtitle: String,

    #[arg(long = "offline-color", default_value = "#FF5555")]
    pub offline_color: String,

    #[arg(long = "online-title", default_value = "Server online")]
    pub online_title: String,

    #[arg(long = "online-subtitle", default_value = "Sending you back...")]
    pub online_subtitle: String,

    #[arg(long = "online-color", default_value = "#55FF55")]
    pub online_color: String,

    /// Seconds to wait after the shutdown notice before probing the backend
    #[arg(long = "shutdown-grace", default_value = "10")]
    pub shutdown_grace: u64,

    /// Seconds to wait after the backend answers before transferring
    #[arg(long = "init-grace", default_value = "5")]
    pub init_grace: u64,

    /// Title fade-in in ticks
    #[arg(long = "fade-in", default_value = "0")]
    pub fade_in: u32,

    /// Title stay time in ticks
    #[arg(long = "stay", default_value = "100")]
    pub stay: u32,

    /// Title fade-out in ticks
    #[arg(long = "fade-out", default_value = "20")]
    pub fade_out: u32,

    /// Text that marks a backend disconnect packet as a planned shutdown
    #[arg(long = "disconnect-marker", short = 'm', default_value = "Server closed")]
    pub disconnect_marker: String,

    /// Seconds between liveness probes while the backend is down
    #[arg(long = "poll-interval", default_value = "3")]
    pub poll_interval: u64,

    /// Seconds between keep-alive bytes sent to players in limbo
    #[arg(long = "heartbeat-interval", default_value = "10")]
    pub heartbeat_interval: u64,

    /// Liveness probe connect timeout in seconds
    #[arg(long = "probe-timeout", default_value = "2")]
    pub probe_timeout: u64,

    /// Per-read timeout of the status/ping exchange in milliseconds
    #[arg(long = "status-timeout", default_value = "1000")]
    pub status_timeout: u64,

    /// Backend connect timeout in seconds
    #[arg(long = "connection-timeout", short = 't', default_value = "5")]
    pub connection_timeout: u64,

    /// Seconds a new connection has to deliver its handshake
    #[arg(long = "handshake-timeout", default_value = "5")]
    pub handshake_timeout: u64,

    /// Data logging level (off, minimal, verbose)
    #[arg(long = "data-logging", short = 'd', value_enum, default_value = "off")]
    pub data_logging: DataLogging,

    /// Size of relay buffers in KB (32-1024)
    #[arg(long = "buffer-size", short = 'b', default_value = "32")]
    pub buffer_size: u32,
}

/// Text and color of one limbo title screen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TitleStyle {
    pub title: String,
    pub subtitle: String,
    pub color: String,
}

/// Immutable settings shared by every session.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub listen_host: String,
    pub listen_port: u16,
    pub target_host: String,
    pub target_port: u16,
    pub transfer_host: String,
    pub transfer_port: u16,
    pub offline: TitleStyle,
    pub online: TitleStyle,
    pub title_times: TitleTimes,
    pub disconnect_marker: String,
    pub shutdown_grace: Duration,
    pub init_grace: Duration,
    pub poll_interval: Duration,
    pub heartbeat_interval: Duration,
    pub probe_timeout: Duration,
    pub status_timeout: Duration,
    pub connect_timeout: Duration,
    pub handshake_timeout: Duration,
    pub buffer_size: usize,
    pub data_logging: DataLogging,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            listen_host: "0.0.0.0".into(),
            listen_port: 25565,
            target_host: "127.0.0.1".into(),
            target_port: 25566,
            transfer_host: "127.0.0.1".into(),
            transfer_port: 25565,
            offline: TitleStyle {
                title: "Server restarting".into(),
                subtitle: format!("Please wait{DOTS_PLACEHOLDER}"),
                color: "#FF5555".into(),
            },
            online: TitleStyle {
                title: "Server online".into(),
                subtitle: "Sending you back...".into(),
                color: "#55FF55".into(),
            },
            title_times: TitleTimes {
                fade_in: 0,
                stay: 100,
                fade_out: 20,
            },
            disconnect_marker: "Server closed".into(),
            shutdown_grace: Duration::from_secs(10),
            init_grace: Duration::from_secs(5),
            poll_interval: Duration::from_secs(crate::LIMBO_POLL_INTERVAL),
            heartbeat_interval: Duration::from_secs(crate::HEARTBEAT_INTERVAL),
            probe_timeout: Duration::from_secs(crate::PROBE_TIMEOUT),
            status_timeout: Duration::from_millis(crate::STATUS_TIMEOUT_MS),
            connect_timeout: Duration::from_secs(crate::DEFAULT_CONNECTION_TIMEOUT),
            handshake_timeout: Duration::from_secs(crate::DEFAULT_CONNECTION_TIMEOUT),
            buffer_size: crate::DEFAULT_BUFFER_SIZE,
            data_logging: DataLogging::Off,
        }
    }
}

impl ProxyConfig {
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.listen_host, self.listen_port)
    }

    pub fn target_addr(&self) -> String {
        format!("{}:{}", self.target_host, self.target_port)
    }

    /// Offline subtitle with the dot animation frame substituted in.
    pub fn offline_subtitle(&self, dots: &str) -> String {
        self.offline.subtitle.replace(DOTS_PLACEHOLDER, dots)
    }

    /// Check that every packet the limbo screen can send encodes.
    pub fn validate(&self) -> ProxyResult<()> {
        let offline_subtitles = (1..=3).map(|n| self.offline_subtitle(&".".repeat(n)));

        let mut lines = vec![
            (TitleSlot::Title, self.offline.title.clone(), &self.offline.color),
            (TitleSlot::Title, self.online.title.clone(), &self.online.color),
            (TitleSlot::Subtitle, self.online.subtitle.clone(), &self.online.color),
        ];
        lines.extend(offline_subtitles.map(|s| (TitleSlot::Subtitle, s, &self.offline.color)));

        for (slot, text, color) in lines {
            title_packet(slot, &text, color)
                .map_err(|e| ProxyError::Config(format!("{slot:?} {text:?}: {e}")))?;
        }

        if self.transfer_host.is_empty() {
            return Err(ProxyError::Config("transfer host is empty".into()));
        }
        transfer_packet(&self.transfer_host, self.transfer_port)
            .map_err(|e| ProxyError::Config(format!("transfer target: {e}")))?;

        if self.buffer_size == 0 {
            return Err(ProxyError::Config("buffer size must be positive".into()));
        }
        if self.heartbeat_interval.is_zero() {
            return Err(ProxyError::Config("heartbeat interval must be positive".into()));
        }
        Ok(())
    }
}

impl TryFrom<Args> for ProxyConfig {
    type Error = ProxyError;

    fn try_from(args: Args) -> ProxyResult<Self> {
        let buffer_size = if args.buffer_size < 32 {
            warn!("Buffer size too small, setting to minimum 32KB");
            32 * 1024
        } else if args.buffer_size > 1024 {
            warn!("Buffer size too large, setting to maximum 1024KB");
            1024 * 1024
        } else {
            args.buffer_size as usize * 1024
        };

        let config = ProxyConfig {
            listen_host: args.listen_host,
            listen_port: args.port,
            target_host: args.target_host,
            target_port: args.target_port,
            transfer_host: args.transfer_host,
            transfer_port: args.transfer_port,
            offline: TitleStyle {
                title: args.offline_title,
                subtitle: args.offline_subtitle,
                color: args.offline_color,
            },
            online: TitleStyle {
                title: args.online_title,
                subtitle: args.online_subtitle,
                color: args.online_color,
            },
            title_times: TitleTimes {
                fade_in: args.fade_in,
                stay: args.stay,
                fade_out: args.fade_out,
            },
            disconnect_marker: args.disconnect_marker,
            shutdown_grace: Duration::from_secs(args.shutdown_grace),
            init_grace: Duration::from_secs(args.init_grace),
            poll_interval: Duration::from_secs(args.poll_interval),
            heartbeat_interval: Duration::from_secs(args.heartbeat_interval),
            probe_timeout: Duration::from_secs(args.probe_timeout),
            status_timeout: Duration::from_millis(args.status_timeout),
            connect_timeout: Duration::from_secs(args.connection_timeout),
            handshake_timeout: Duration::from_secs(args.handshake_timeout),
            buffer_size,
            data_logging: args.data_logging,
        };
        config.validate()?;
        Ok(config)
    }
}
