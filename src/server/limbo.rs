//! Holding a player while the backend restarts.
//!
//! Runs inline in the backend relay task once a marked disconnect arrives:
//! freeze the title overlay, give the backend time to exit, show the offline
//! screen until a liveness probe succeeds, show the online screen, then send
//! a transfer packet and close. The client relay keeps draining the player's
//! input meanwhile.

use crate::common::{LimboState, ProtocolError};
use crate::protocol::{TitleSlot, title_packet, title_times_packet, transfer_packet};
use crate::server::probe::probe_backend;
use crate::server::session::{Session, wait_closed};
use std::io;
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::{Duration, sleep};
use tracing::{debug, info, warn};

/// One to three dots, repeating.
#[derive(Debug, Clone)]
pub struct DotCycle {
    count: usize,
}

impl DotCycle {
    pub const MAX_DOTS: usize = 3;

    pub fn new() -> Self {
        Self { count: 1 }
    }
}

impl Default for DotCycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Iterator for DotCycle {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        let dots = ".".repeat(self.count);
        self.count = self.count % Self::MAX_DOTS + 1;
        Some(dots)
    }
}

#[derive(Debug, Error)]
enum LimboAbort {
    #[error("session closed")]
    SessionClosed,

    #[error("client write failed: {0}")]
    ClientWrite(#[from] io::Error),

    #[error(transparent)]
    Encode(#[from] ProtocolError),
}

/// Sleep for `period` unless the session closes first.
async fn pause(period: Duration, signal: &mut watch::Receiver<bool>) -> Result<(), LimboAbort> {
    tokio::select! {
        _ = sleep(period) => Ok(()),
        _ = wait_closed(signal) => Err(LimboAbort::SessionClosed),
    }
}

async fn show_screen(
    session: &Session,
    title: &str,
    subtitle: &str,
    color: &str,
) -> Result<(), LimboAbort> {
    session
        .send_to_client(&title_packet(TitleSlot::Title, title, color)?)
        .await?;
    session
        .send_to_client(&title_packet(TitleSlot::Subtitle, subtitle, color)?)
        .await?;
    Ok(())
}

async fn drive(session: &Session) -> Result<(), LimboAbort> {
    let config = session.config();
    let id = session.id();
    let mut signal = session.close_signal();

    session.advance(LimboState::Frozen);
    session
        .send_to_client(&title_times_packet(config.title_times))
        .await?;

    session.advance(LimboState::WaitingGrace);
    info!(
        "Session {}: Waiting {}s for the server to shut down completely",
        id,
        config.shutdown_grace.as_secs_f64()
    );
    pause(config.shutdown_grace, &mut signal).await?;

    session.advance(LimboState::PollingDown);
    let mut dots = DotCycle::new();
    loop {
        let up = tokio::select! {
            up = probe_backend(&config.target_host, config.target_port, config.probe_timeout) => up,
            _ = wait_closed(&mut signal) => return Err(LimboAbort::SessionClosed),
        };
        if up {
            break;
        }
        info!("Session {}: Server still offline... waiting...", id);

        let subtitle = config.offline_subtitle(&dots.next().unwrap_or_default());
        show_screen(session, &config.offline.title, &subtitle, &config.offline.color).await?;
        pause(config.poll_interval, &mut signal).await?;
    }

    session.advance(LimboState::PollingUpConfirmed);
    show_screen(
        session,
        &config.online.title,
        &config.online.subtitle,
        &config.online.color,
    )
    .await?;
    info!(
        "Session {}: Server detected! Waiting {}s for final initialization",
        id,
        config.init_grace.as_secs_f64()
    );
    pause(config.init_grace, &mut signal).await?;

    session.advance(LimboState::Transferring);
    let transfer = transfer_packet(&config.transfer_host, config.transfer_port)?;
    session.send_to_client(&transfer).await?;
    info!(
        "Session {}: Transfer packet sent to {}:{}. Player should be reconnecting now.",
        id, config.transfer_host, config.transfer_port
    );
    Ok(())
}

/// Run the limbo sequence to completion or until the session goes away.
/// Always ends `CLOSED` with the session torn down.
pub async fn run_limbo(session: &Session) -> LimboState {
    match drive(session).await {
        Ok(()) => {}
        Err(LimboAbort::SessionClosed) => {
            info!("Session {}: Player left during limbo", session.id())
        }
        Err(LimboAbort::ClientWrite(e)) => {
            debug!("Session {}: limbo stopped, client gone: {}", session.id(), e)
        }
        Err(e) => warn!("Session {}: limbo aborted: {}", session.id(), e),
    }

    session.advance(LimboState::Closed);
    session.close().await;
    session.limbo_state()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dots_cycle_one_to_three() {
        let frames: Vec<String> = DotCycle::new().take(7).collect();
        assert_eq!(frames, vec![".", "..", "...", ".", "..", "...", "."]);
        assert!(frames.iter().all(|d| d.len() <= DotCycle::MAX_DOTS));
    }

    #[test]
    fn offline_subtitle_gets_the_dots() {
        let config = crate::server::config::ProxyConfig::default();
        let mut dots = DotCycle::new();
        dots.next();
        assert_eq!(
            config.offline_subtitle(&dots.next().unwrap()),
            "Please wait.."
        );
    }
}
