use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One inbound request to the callback listener that carried a tracking id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallbackEvent {
    pub position: u64,
    pub source_ip: String,
    pub protocol: String,
    pub referer: String,
    pub user_agent: String,
    pub timestamp: DateTime<Utc>,
    pub raw_path: String,
}

impl CallbackEvent {
    /// Single-line entry for the hit log.
    pub fn log_line(&self) -> String {
        format!(
            "[{}] ID={} IP={} Protocol={} Referer={}",
            self.timestamp.format("%Y-%m-%d %H:%M:%S"),
            self.position,
            self.source_ip,
            self.protocol,
            self.referer
        )
    }
}

/// Parse a tracking id; anything but a positive integer reads as no id.
pub fn parse_tracking_id(raw: &str) -> Option<u64> {
    raw.trim().parse::<u64>().ok().filter(|id| *id > 0)
}
