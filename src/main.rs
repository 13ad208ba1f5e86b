use anyhow::Result;
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn};

use sitepulse::notify::{LogNotifier, WebhookNotifier};
use sitepulse::{api, Monitor, MonitorConfig};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env()
            .add_directive(tracing::Level::INFO.into()))
        .with_ansi(true)
        .init();

    let config_path = std::env::args().nth(1).unwrap_or_else(|| "config.json".into());
    let config = MonitorConfig::load(&config_path)?;

    let monitor = Arc::new(Monitor::new(&config)?);
    monitor.bus().on_status_update(LogNotifier);
    monitor.bus().on_alert(LogNotifier);
    if let Some(url) = &config.webhook_url {
        monitor.bus().on_alert(WebhookNotifier::new(url.clone()));
        info!("Forwarding alerts to webhook");
    }

    for site in &config.sites {
        if let Err(e) = monitor.register(site).await {
            warn!("Skipping {}: {}", site, e);
        }
    }

    let monitor_for_api = Arc::clone(&monitor);
    let api_port = config.api_port;
    tokio::spawn(async move {
        if let Err(e) = api::start_server(api_port, monitor_for_api).await {
            tracing::error!("{:#}", e);
        }
    });

    if config.autostart {
        monitor.start();
    }

    signal::ctrl_c().await?;
    info!("Shutdown signal received. Stopping monitor...");
    monitor.stop().await;

    Ok(())
}
