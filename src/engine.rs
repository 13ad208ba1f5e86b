use anyhow::{Context, Result};
use chrono::Utc;
use futures::stream::{FuturesUnordered, StreamExt};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::bus::NotificationBus;
use crate::checker;
use crate::config::{self, MonitorConfig};
use crate::error::MonitorError;
use crate::models::{AlertEntry, AlertKind, CheckOutcome, MonitorState, SiteStatus, Summary};
use crate::transition;
use crate::utils::normalize_url;

/// How long `stop` waits for the periodic cycle before detaching it.
const STOP_GRACE: Duration = Duration::from_secs(5);

struct Settings {
    check_interval: u64,
    timeout: u64,
}

struct CycleHandle {
    token: CancellationToken,
    task: JoinHandle<()>,
}

/// The monitoring engine. Shared as `Arc<Monitor>`; every check, periodic or
/// one-off, runs on its own tokio task against the same state.
pub struct Monitor {
    state: Arc<Mutex<MonitorState>>,
    bus: NotificationBus,
    http_client: reqwest::Client,
    settings: RwLock<Settings>,
    concurrency_limiter: Arc<Semaphore>,
    running: AtomicBool,
    cycle: parking_lot::Mutex<Option<CycleHandle>>,
}

impl Monitor {
    pub fn new(config: &MonitorConfig) -> Result<Self> {
        let http_client = checker::build_client(&config.user_agent, config.max_redirects)
            .context("Failed to build HTTP client")?;

        Ok(Self {
            state: Arc::new(Mutex::new(MonitorState::default())),
            bus: NotificationBus::new(),
            http_client,
            settings: RwLock::new(Settings {
                check_interval: config.check_interval,
                timeout: config.timeout,
            }),
            concurrency_limiter: Arc::new(Semaphore::new(config.max_concurrency.max(1))),
            running: AtomicBool::new(false),
            cycle: parking_lot::Mutex::new(None),
        })
    }

    pub fn bus(&self) -> &NotificationBus {
        &self.bus
    }

    /// Validates and normalizes `raw`, then starts monitoring it.
    ///
    /// Already-registered endpoints are returned as they are, with no new check.
    /// A new endpoint gets a default status and an immediate background check.
    pub async fn register(self: &Arc<Self>, raw: &str) -> Result<SiteStatus, MonitorError> {
        let url = normalize_url(raw)?;

        let status = {
            let mut state = self.state.lock().await;
            if let Some(existing) = state.sites.get(&url) {
                return Ok(existing.clone());
            }
            let status = SiteStatus::new(url.clone());
            state.next_registration += 1;
            let generation = state.next_registration;
            state.registrations.insert(url.clone(), generation);
            state.sites.insert(url.clone(), status.clone());
            status
        };

        info!("Monitoring {}", url);
        self.force_check(&url);
        Ok(status)
    }

    /// Stops monitoring `url`. Returns false if it was not registered.
    pub async fn deregister(&self, url: &str) -> bool {
        let key = lookup_key(url);
        let mut state = self.state.lock().await;
        state.previous.remove(&key);
        state.registrations.remove(&key);
        let removed = state.sites.remove(&key).is_some();
        if removed {
            info!("Stopped monitoring {}", key);
        }
        removed
    }

    pub async fn get(&self, url: &str) -> Option<SiteStatus> {
        self.state.lock().await.sites.get(&lookup_key(url)).cloned()
    }

    /// Point-in-time copy of every status, ordered by URL.
    pub async fn list(&self) -> Vec<SiteStatus> {
        let state = self.state.lock().await;
        let mut sites: Vec<_> = state.sites.values().cloned().collect();
        drop(state);
        sites.sort_by(|a, b| a.url.cmp(&b.url));
        sites
    }

    /// Newest first.
    pub async fn list_alerts(&self) -> Vec<AlertEntry> {
        self.state.lock().await.alerts.iter().rev().cloned().collect()
    }

    pub async fn clear_alerts(&self) {
        self.state.lock().await.alerts.clear();
    }

    pub async fn summary(&self) -> Summary {
        let (total, online) = {
            let state = self.state.lock().await;
            let online = state.sites.values().filter(|s| s.is_online).count();
            (state.sites.len(), online)
        };
        let settings = self.settings.read();
        Summary {
            total,
            online,
            offline: total - online,
            running: self.is_running(),
            check_interval: settings.check_interval,
            timeout: settings.timeout,
        }
    }

    /// Checks `url` on a new task without waiting for it. Unregistered URLs are
    /// ignored by the task. Must be called from within a tokio runtime.
    pub fn force_check(self: &Arc<Self>, url: &str) -> JoinHandle<()> {
        let monitor = Arc::clone(self);
        let key = lookup_key(url);
        tokio::spawn(async move {
            monitor.check_site(&key).await;
        })
    }

    pub fn set_interval(&self, secs: u64) -> Result<(), MonitorError> {
        config::validate_interval(secs)?;
        self.settings.write().check_interval = secs;
        info!("Check interval set to {}s", secs);
        Ok(())
    }

    pub fn set_timeout(&self, secs: u64) -> Result<(), MonitorError> {
        config::validate_timeout(secs)?;
        self.settings.write().timeout = secs;
        info!("Request timeout set to {}s", secs);
        Ok(())
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.settings.read().check_interval)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.settings.read().timeout)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Launches the periodic cycle. Returns false if it was already running.
    pub fn start(self: &Arc<Self>) -> bool {
        let mut cycle = self.cycle.lock();
        if self.running.swap(true, Ordering::SeqCst) {
            return false;
        }

        let token = CancellationToken::new();
        let task = tokio::spawn(Arc::clone(self).run(token.clone()));
        *cycle = Some(CycleHandle { token, task });
        true
    }

    /// Signals the periodic cycle to stop and waits up to a few seconds for it.
    /// In-flight probes are never interrupted; a cycle still busy after the
    /// grace period is detached and exits once its probes finish.
    pub async fn stop(&self) -> bool {
        let handle = {
            let mut cycle = self.cycle.lock();
            self.running.store(false, Ordering::SeqCst);
            cycle.take()
        };
        let Some(CycleHandle { token, task }) = handle else {
            return false;
        };

        token.cancel();
        match tokio::time::timeout(STOP_GRACE, task).await {
            Ok(_) => info!("Monitoring stopped"),
            Err(_) => warn!("Periodic cycle still busy after {:?}; detached", STOP_GRACE),
        }
        true
    }

    async fn run(self: Arc<Self>, token: CancellationToken) {
        info!("Monitoring active, checking every {}s", self.settings.read().check_interval);

        while !token.is_cancelled() {
            let started = Instant::now();
            let (total, checked) = self.check_all_sites(&token).await;
            debug!(
                "Cycle completed {}/{} checks in {:.2}s",
                checked,
                total,
                started.elapsed().as_secs_f64()
            );

            let remaining = self.check_interval().saturating_sub(started.elapsed());
            tokio::select! {
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(remaining) => {}
            }
        }

        info!("Periodic cycle exited");
    }

    async fn check_all_sites(self: &Arc<Self>, token: &CancellationToken) -> (usize, usize) {
        let urls: Vec<String> = self.state.lock().await.sites.keys().cloned().collect();
        let total = urls.len();
        let mut tasks = FuturesUnordered::new();

        for url in urls {
            let monitor = Arc::clone(self);
            let token = token.clone();
            tasks.push(tokio::spawn(async move {
                let _permit = monitor.concurrency_limiter.acquire().await.ok();
                if token.is_cancelled() {
                    return false;
                }
                monitor.check_site(&url).await
            }));
        }

        let mut checked = 0;
        while let Some(join_res) = tasks.next().await {
            if let Ok(true) = join_res {
                checked += 1;
            }
        }
        (total, checked)
    }

    /// Probes `url` and applies the result. Returns false when the URL is not
    /// registered, or was deregistered while the probes ran.
    async fn check_site(&self, url: &str) -> bool {
        let Some(generation) = self.state.lock().await.registrations.get(url).copied() else {
            return false;
        };

        let (host, port) = checker::resolve_host_port(url);
        let timeout = self.timeout();

        let http = checker::probe_http(&self.http_client, url, timeout).await;
        let port_open = if host.is_empty() {
            false
        } else {
            checker::probe_tcp(&host, port, timeout).await
        };

        let outcome = CheckOutcome {
            status_code: http.status_code,
            latency_ms: http.latency_ms,
            error: http.error,
            port,
            port_open,
            finished_at: Utc::now(),
        };

        let Some((status, alert)) = self.apply(url, generation, &outcome).await else {
            debug!("{} was removed while being checked", url);
            return false;
        };

        debug!(
            "{} -> HTTP {} in {:.0}ms, port {} {}",
            status.url,
            status.status_code,
            status.latency_ms,
            status.port_checked,
            if status.port_open { "open" } else { "closed" }
        );

        self.bus.publish_status(&status);
        if let Some(alert) = alert {
            match alert.alert_type {
                AlertKind::Down => error!("[CHANGE] {} -> down: {}", alert.url, alert.message),
                AlertKind::Recovered => warn!("[CHANGE] {} -> recovered: {}", alert.url, alert.message),
            }
            self.bus.publish_alert(&alert);
        }
        true
    }

    /// Status update, transition detection and previous-state update happen
    /// under one lock acquisition so racing checks of the same URL stay consistent.
    /// Outcomes from a registration other than `generation` are dropped.
    async fn apply(
        &self,
        url: &str,
        generation: u64,
        outcome: &CheckOutcome,
    ) -> Option<(SiteStatus, Option<AlertEntry>)> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;

        if state.registrations.get(url) != Some(&generation) {
            return None;
        }
        let status = state.sites.get_mut(url)?;
        status.apply(outcome);
        let snapshot = status.clone();

        let alert = transition::evaluate(&mut state.previous, &snapshot);
        if let Some(alert) = &alert {
            state.alerts.push(alert.clone());
        }
        Some((snapshot, alert))
    }
}

/// Registry key for a caller-supplied URL: the normalized form when the input
/// is valid, otherwise the trimmed input (which can never be registered).
fn lookup_key(url: &str) -> String {
    normalize_url(url).unwrap_or_else(|_| url.trim().to_string())
}
