use std::sync::Arc;
use std::time::{Duration, Instant};

use sitepulse::{AlertEntry, AlertKind, Monitor, MonitorConfig, SiteStatus};
use tokio::sync::mpsc::{self, error::TryRecvError, UnboundedReceiver};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct Harness {
    monitor: Arc<Monitor>,
    statuses: UnboundedReceiver<SiteStatus>,
    alerts: UnboundedReceiver<AlertEntry>,
}

fn harness(config: MonitorConfig) -> Harness {
    let monitor = Arc::new(Monitor::new(&config).unwrap());

    let (status_tx, statuses) = mpsc::unbounded_channel();
    monitor.bus().on_status_update(move |s: &SiteStatus| -> anyhow::Result<()> {
        status_tx.send(s.clone())?;
        Ok(())
    });
    let (alert_tx, alerts) = mpsc::unbounded_channel();
    monitor.bus().on_alert(move |a: &AlertEntry| -> anyhow::Result<()> {
        alert_tx.send(a.clone())?;
        Ok(())
    });

    Harness { monitor, statuses, alerts }
}

fn config() -> MonitorConfig {
    MonitorConfig {
        timeout: 2,
        max_redirects: 5,
        ..MonitorConfig::default()
    }
}

async fn next<T>(rx: &mut UnboundedReceiver<T>) -> T {
    tokio::time::timeout(Duration::from_secs(10), rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("channel closed")
}

fn closed_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

async fn mount(server: &MockServer, template: ResponseTemplate) {
    server.reset().await;
    Mock::given(method("GET")).respond_with(template).mount(server).await;
}

#[tokio::test]
async fn first_check_online_is_silent() {
    let server = MockServer::start().await;
    mount(&server, ResponseTemplate::new(200)).await;
    let mut h = harness(config());

    let registered = h.monitor.register(&server.uri()).await.unwrap();
    assert_eq!(registered.url, server.uri());
    assert!(!registered.is_online);
    assert_eq!(registered.status_code, -1);

    let status = next(&mut h.statuses).await;
    assert!(status.is_online);
    assert_eq!(status.status_code, 200);
    assert!(status.latency_ms >= 0.0);
    assert!(status.port_open);
    assert_eq!(status.port_checked, server.address().port());
    assert!(status.error_message.is_empty());

    assert!(h.monitor.list_alerts().await.is_empty());
    assert_eq!(h.monitor.get(&server.uri()).await, Some(status));
}

#[tokio::test]
async fn timeout_after_online_raises_down_alert() {
    let server = MockServer::start().await;
    mount(&server, ResponseTemplate::new(200)).await;
    let mut h = harness(MonitorConfig { timeout: 1, ..config() });
    let url = server.uri();

    h.monitor.register(&url).await.unwrap();
    assert!(next(&mut h.statuses).await.is_online);

    mount(&server, ResponseTemplate::new(200).set_delay(Duration::from_secs(3))).await;
    h.monitor.force_check(&url).await.unwrap();

    let status = h.monitor.get(&url).await.unwrap();
    assert!(!status.is_online);
    assert_eq!(status.status_code, -1);
    assert_eq!(status.latency_ms, -1.0);
    assert_eq!(status.error_message, "Connection timeout");

    let alert = next(&mut h.alerts).await;
    assert_eq!(alert.alert_type, AlertKind::Down);
    assert_eq!(alert.message, "Connection timeout");
    assert_eq!(alert.status_code, -1);
    assert_eq!(h.monitor.list_alerts().await.len(), 1);
}

#[tokio::test]
async fn recovery_is_reported_newest_first() {
    let server = MockServer::start().await;
    mount(&server, ResponseTemplate::new(500)).await;
    let mut h = harness(config());
    let url = server.uri();

    h.monitor.register(&url).await.unwrap();
    let status = next(&mut h.statuses).await;
    assert!(!status.is_online);
    assert_eq!(status.status_code, 500);

    let down = next(&mut h.alerts).await;
    assert_eq!(down.alert_type, AlertKind::Down);
    assert_eq!(down.message, "Site is unreachable (HTTP 500)");

    mount(&server, ResponseTemplate::new(200)).await;
    h.monitor.force_check(&url).await.unwrap();

    let recovered = next(&mut h.alerts).await;
    assert_eq!(recovered.alert_type, AlertKind::Recovered);
    assert_eq!(recovered.message, "Site is back online (HTTP 200)");

    let log = h.monitor.list_alerts().await;
    assert_eq!(log.len(), 2);
    assert_eq!(log[0].alert_type, AlertKind::Recovered);
    assert_eq!(log[1].alert_type, AlertKind::Down);

    h.monitor.clear_alerts().await;
    assert!(h.monitor.list_alerts().await.is_empty());
}

#[tokio::test]
async fn stable_state_raises_no_further_alerts() {
    let server = MockServer::start().await;
    mount(&server, ResponseTemplate::new(404)).await;
    let mut h = harness(config());
    let url = server.uri();

    h.monitor.register(&url).await.unwrap();
    next(&mut h.statuses).await;
    assert_eq!(h.monitor.list_alerts().await.len(), 1);

    let checks: Vec<_> = (0..5).map(|_| h.monitor.force_check(&url)).collect();
    for check in checks {
        check.await.unwrap();
    }

    assert_eq!(h.monitor.list_alerts().await.len(), 1);
    next(&mut h.alerts).await;
    assert!(matches!(h.alerts.try_recv(), Err(TryRecvError::Empty)));
}

#[tokio::test]
async fn refused_connection_is_offline_with_closed_port() {
    let mut h = harness(config());
    let port = closed_port();
    let url = format!("http://127.0.0.1:{port}");

    h.monitor.register(&url).await.unwrap();
    let status = next(&mut h.statuses).await;
    assert!(!status.is_online);
    assert_eq!(status.status_code, -1);
    assert_eq!(status.error_message, "Connection failed");
    assert!(!status.port_open);
    assert_eq!(status.port_checked, port);

    let alert = next(&mut h.alerts).await;
    assert_eq!(alert.alert_type, AlertKind::Down);
    assert_eq!(alert.message, "Connection failed");
}

#[tokio::test]
async fn redirect_loop_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/loop"))
        .respond_with(ResponseTemplate::new(302).insert_header("Location", "/loop"))
        .mount(&server)
        .await;
    let mut h = harness(config());

    h.monitor.register(&format!("{}/loop", server.uri())).await.unwrap();
    let status = next(&mut h.statuses).await;
    assert_eq!(status.status_code, -1);
    assert_eq!(status.error_message, "Too many redirects");
}

#[tokio::test]
async fn registering_twice_checks_once() {
    let mut h = harness(config());
    let url = format!("http://127.0.0.1:{}", closed_port());

    let first = h.monitor.register(&url).await.unwrap();
    let second = h.monitor.register(&url).await.unwrap();
    assert_eq!(first.url, second.url);
    assert_eq!(h.monitor.list().await.len(), 1);

    next(&mut h.statuses).await;
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(matches!(h.statuses.try_recv(), Err(TryRecvError::Empty)));
    assert_eq!(h.monitor.list_alerts().await.len(), 1);
}

#[tokio::test]
async fn deregistering_resets_first_check_state() {
    let mut h = harness(config());
    let url = format!("http://127.0.0.1:{}", closed_port());

    h.monitor.register(&url).await.unwrap();
    next(&mut h.statuses).await;
    assert_eq!(h.monitor.list_alerts().await.len(), 1);

    assert!(h.monitor.deregister(&url).await);
    assert!(!h.monitor.deregister(&url).await);
    assert!(h.monitor.get(&url).await.is_none());

    h.monitor.register(&url).await.unwrap();
    next(&mut h.statuses).await;
    let log = h.monitor.list_alerts().await;
    assert_eq!(log.len(), 2);
    assert!(log.iter().all(|a| a.alert_type == AlertKind::Down));
}

#[tokio::test]
async fn check_started_before_reregistration_is_discarded() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(1)))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    let mut h = harness(config());
    let url = server.uri();

    h.monitor.register(&url).await.unwrap();
    let deadline = Instant::now() + Duration::from_secs(5);
    while server.received_requests().await.unwrap_or_default().is_empty() {
        assert!(Instant::now() < deadline, "first check never reached the server");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    assert!(h.monitor.deregister(&url).await);
    h.monitor.register(&url).await.unwrap();

    let status = next(&mut h.statuses).await;
    assert_eq!(status.status_code, 500);
    assert_eq!(next(&mut h.alerts).await.alert_type, AlertKind::Down);

    // Outlive the delayed response to the first registration's check.
    tokio::time::sleep(Duration::from_secs(2)).await;

    let status = h.monitor.get(&url).await.unwrap();
    assert!(!status.is_online);
    assert_eq!(status.status_code, 500);
    assert!(matches!(h.statuses.try_recv(), Err(TryRecvError::Empty)));
    assert!(matches!(h.alerts.try_recv(), Err(TryRecvError::Empty)));
    let log = h.monitor.list_alerts().await;
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].alert_type, AlertKind::Down);
}

#[tokio::test]
async fn force_check_of_unknown_url_is_a_noop() {
    let mut h = harness(config());

    h.monitor.force_check("http://127.0.0.1:9").await.unwrap();

    assert!(h.monitor.list().await.is_empty());
    assert!(h.monitor.get("http://127.0.0.1:9").await.is_none());
    assert!(matches!(h.statuses.try_recv(), Err(TryRecvError::Empty)));
}

#[tokio::test]
async fn failing_observers_do_not_break_checks() {
    let mut h = harness(config());
    h.monitor.bus().on_status_update(|_: &SiteStatus| -> anyhow::Result<()> {
        anyhow::bail!("dashboard went away")
    });
    h.monitor.bus().on_alert(|_: &AlertEntry| -> anyhow::Result<()> { panic!("alert view crashed") });

    let url = format!("http://127.0.0.1:{}", closed_port());
    h.monitor.register(&url).await.unwrap();

    assert_eq!(next(&mut h.statuses).await.url, url);
    assert_eq!(next(&mut h.alerts).await.url, url);
    assert_eq!(h.monitor.list_alerts().await.len(), 1);
}

#[tokio::test]
async fn periodic_cycle_rechecks_every_site() {
    let server = MockServer::start().await;
    mount(&server, ResponseTemplate::new(200)).await;
    let mut h = harness(MonitorConfig { check_interval: 1, ..config() });

    h.monitor.register(&server.uri()).await.unwrap();
    assert!(h.monitor.start());
    assert!(h.monitor.is_running());

    for _ in 0..3 {
        assert!(next(&mut h.statuses).await.is_online);
    }

    assert!(h.monitor.stop().await);
    assert!(!h.monitor.is_running());
    assert!(h.monitor.list_alerts().await.is_empty());
}

#[tokio::test]
async fn stop_is_prompt_with_long_interval() {
    let h = harness(MonitorConfig { check_interval: 120, ..config() });

    assert!(h.monitor.start());
    tokio::time::sleep(Duration::from_millis(300)).await;

    let started = Instant::now();
    assert!(h.monitor.stop().await);
    assert!(started.elapsed() < Duration::from_secs(2));
    assert!(!h.monitor.is_running());

    assert!(h.monitor.start());
    assert!(h.monitor.stop().await);
}

#[tokio::test]
async fn summary_counts_online_and_offline() {
    let server = MockServer::start().await;
    mount(&server, ResponseTemplate::new(200)).await;
    let mut h = harness(config());

    h.monitor.register(&server.uri()).await.unwrap();
    h.monitor
        .register(&format!("http://127.0.0.1:{}", closed_port()))
        .await
        .unwrap();
    next(&mut h.statuses).await;
    next(&mut h.statuses).await;

    let summary = h.monitor.summary().await;
    assert_eq!(summary.total, 2);
    assert_eq!(summary.online, 1);
    assert_eq!(summary.offline, 1);
    assert!(!summary.running);
}
