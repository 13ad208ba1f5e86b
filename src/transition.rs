use chrono::Utc;
use std::collections::HashMap;

use crate::models::{AlertEntry, AlertKind, SiteStatus};

/// Decides whether the check just applied to `status` is a reportable transition.
///
/// `previous` is the online flag from the prior check, `None` if there was none.
/// Only an offline first check alerts; an online first check is silent.
pub fn detect(status: &SiteStatus, previous: Option<bool>) -> Option<AlertEntry> {
    let (kind, message) = match previous {
        None if !status.is_online => (
            AlertKind::Down,
            down_message(status, "Site is unreachable"),
        ),
        Some(prev) if prev != status.is_online => {
            if status.is_online {
                (
                    AlertKind::Recovered,
                    format!("Site is back online (HTTP {})", status.status_code),
                )
            } else {
                (AlertKind::Down, down_message(status, "Site is down"))
            }
        }
        _ => return None,
    };

    Some(AlertEntry {
        url: status.url.clone(),
        alert_type: kind,
        message,
        status_code: status.status_code,
        timestamp: Utc::now(),
    })
}

fn down_message(status: &SiteStatus, fallback: &str) -> String {
    if status.error_message.is_empty() {
        format!("{fallback} (HTTP {})", status.status_code)
    } else {
        status.error_message.clone()
    }
}

/// Runs [`detect`] and records the current flag as the new previous state,
/// whether or not an alert was produced. Callers must hold the state lock
/// across the status update and this call.
pub fn evaluate(previous: &mut HashMap<String, bool>, status: &SiteStatus) -> Option<AlertEntry> {
    let alert = detect(status, previous.get(&status.url).copied());
    previous.insert(status.url.clone(), status.is_online);
    alert
}
