use anyhow::Context;
use chrono::Utc;
use tracing::{debug, info, warn};

use crate::bus::{AlertObserver, StatusObserver};
use crate::models::{AlertEntry, AlertKind, SiteStatus};
use crate::utils::{extract_domain, format_latency, status_description};

/// Writes every status update and alert to the tracing log.
pub struct LogNotifier;

impl StatusObserver for LogNotifier {
    fn on_status(&self, status: &SiteStatus) -> anyhow::Result<()> {
        let state = if status.is_online { "ONLINE" } else { "OFFLINE" };
        if status.status_code < 0 {
            info!("{} {} ({})", state, status.url, status.error_message);
        } else {
            info!(
                "{} {} HTTP {} {} | {} | port {} {}",
                state,
                status.url,
                status.status_code,
                status_description(status.status_code),
                format_latency(status.latency_ms),
                status.port_checked,
                if status.port_open { "open" } else { "closed" }
            );
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "log"
    }
}

impl AlertObserver for LogNotifier {
    fn on_alert(&self, alert: &AlertEntry) -> anyhow::Result<()> {
        warn!("ALERT [{}] {}: {}", alert.alert_type, alert.url, alert.message);
        Ok(())
    }

    fn name(&self) -> &str {
        "log"
    }
}

/// Posts each alert to a Discord-compatible webhook. Delivery happens on a
/// separate task so a slow webhook never holds up the check that raised it.
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }
}

impl AlertObserver for WebhookNotifier {
    fn on_alert(&self, alert: &AlertEntry) -> anyhow::Result<()> {
        let runtime = tokio::runtime::Handle::try_current()
            .context("webhook delivery needs a tokio runtime")?;

        let request = self.client.post(&self.url).json(&webhook_payload(alert));
        let target = alert.url.clone();
        runtime.spawn(async move {
            match request.send().await.and_then(|r| r.error_for_status()) {
                Ok(_) => debug!("Webhook delivered for {}", target),
                Err(e) => warn!("Webhook delivery for {} failed: {}", target, e),
            }
        });
        Ok(())
    }

    fn name(&self) -> &str {
        "webhook"
    }
}

pub fn webhook_payload(alert: &AlertEntry) -> serde_json::Value {
    let (title, color) = match alert.alert_type {
        AlertKind::Down => ("Site Down", 0xE74C3C),
        AlertKind::Recovered => ("Site Recovered", 0x2ECC71),
    };
    let code = if alert.status_code < 0 {
        "N/A".to_string()
    } else {
        alert.status_code.to_string()
    };

    serde_json::json!({
        "username": "SitePulse",
        "embeds": [{
            "title": title,
            "color": color,
            "fields": [
                { "name": "Site", "value": extract_domain(&alert.url), "inline": true },
                { "name": "HTTP", "value": code, "inline": true },
                { "name": "Reason", "value": alert.message, "inline": false }
            ],
            "timestamp": alert.timestamp.to_rfc3339(),
            "footer": { "text": format!("Reported {}", Utc::now().format("%Y-%m-%d %H:%M:%S UTC")) }
        }]
    })
}
