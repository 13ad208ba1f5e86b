use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fmt;

/// Status code recorded when no HTTP response was received.
pub const NO_STATUS_CODE: i32 = -1;
/// Latency recorded when no HTTP response was received.
pub const NO_LATENCY: f64 = -1.0;

/// Latest known observable state of one monitored endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteStatus {
    pub url: String,
    pub is_online: bool,
    pub status_code: i32,
    pub latency_ms: f64,
    pub port_open: bool,
    pub port_checked: u16,
    pub last_check: DateTime<Utc>,
    pub error_message: String,
}

impl SiteStatus {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            is_online: false,
            status_code: NO_STATUS_CODE,
            latency_ms: NO_LATENCY,
            port_open: false,
            port_checked: 443,
            last_check: Utc::now(),
            error_message: String::new(),
        }
    }

    pub fn is_online_code(code: i32) -> bool {
        (200..400).contains(&code)
    }

    /// Overwrites every probe-derived field. `is_online` is always recomputed
    /// from the status code and never set independently.
    pub fn apply(&mut self, probe: &CheckOutcome) {
        self.status_code = probe.status_code;
        self.latency_ms = probe.latency_ms;
        self.is_online = Self::is_online_code(probe.status_code);
        self.port_open = probe.port_open;
        self.port_checked = probe.port;
        self.last_check = probe.finished_at;
        self.error_message = probe.error.clone();
    }
}

/// Raw result of one HTTP + TCP check sequence, before it is applied.
#[derive(Debug, Clone)]
pub struct CheckOutcome {
    pub status_code: i32,
    pub latency_ms: f64,
    pub error: String,
    pub port: u16,
    pub port_open: bool,
    pub finished_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertKind {
    Down,
    Recovered,
}

impl fmt::Display for AlertKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlertKind::Down => f.write_str("down"),
            AlertKind::Recovered => f.write_str("recovered"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertEntry {
    pub url: String,
    pub alert_type: AlertKind,
    pub message: String,
    pub status_code: i32,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Summary {
    pub total: usize,
    pub online: usize,
    pub offline: usize,
    pub running: bool,
    pub check_interval: u64,
    pub timeout: u64,
}

/// Everything guarded by the monitor's single lock.
#[derive(Debug, Default)]
pub struct MonitorState {
    pub sites: HashMap<String, SiteStatus>,
    /// Generation of each live registration; bumped on every fresh `register`.
    pub registrations: HashMap<String, u64>,
    pub next_registration: u64,
    /// Online flag as of the previous check; absent means never checked.
    pub previous: HashMap<String, bool>,
    /// Oldest first; read newest first.
    pub alerts: Vec<AlertEntry>,
}
