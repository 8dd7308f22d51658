use crate::server::config::DataLogging;
use std::time::Duration;
use tracing::{debug, info};

pub fn log_data_sample(session_id: &str, direction: &str, data: &[u8], level: DataLogging) {
    let size = data.len();
    match level {
        DataLogging::Verbose => {
            let preview = &data[..std::cmp::min(200, size)];
            let hex_dump = preview
                .iter()
                .map(|b| format!("{:02x}", b))
                .collect::<Vec<_>>()
                .join(" ");

            let ascii_dump: String = preview
                .iter()
                .map(|&b| if (32..=126).contains(&b) { b as char } else { '.' })
                .collect();

            info!("Session {}: {} data[{}]: Hex: {}", session_id, direction, size, hex_dump);
            info!("Session {}: {} data[{}]: ASCII: {}", session_id, direction, size, ascii_dump);
        }
        DataLogging::Minimal => {
            if size > 0 {
                debug!(
                    "Session {}: {} data preview[{}]: {:?}",
                    session_id,
                    direction,
                    size,
                    &data[..std::cmp::min(50, size)]
                );
            }
        }
        DataLogging::Off => {
            if size > 10000 {
                debug!("Session {}: {} data size: {} bytes", session_id, direction, size);
            }
        }
    }
}

pub fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.2} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.2} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

pub fn log_transfer_summary(session_id: &str, direction: &str, bytes: u64, elapsed: Duration) {
    let secs = elapsed.as_secs_f64();
    let rate = if secs > 0.0 { bytes as f64 / secs } else { bytes as f64 };

    info!(
        "Session {}: {} transferred {} in {:.2}s ({:.2} KB/s)",
        session_id,
        direction,
        format_bytes(bytes),
        secs,
        rate / 1024.0
    );
}
