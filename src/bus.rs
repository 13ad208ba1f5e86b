use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::error;

use crate::models::{AlertEntry, SiteStatus};

pub trait StatusObserver: Send + Sync {
    fn on_status(&self, status: &SiteStatus) -> anyhow::Result<()>;

    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

pub trait AlertObserver: Send + Sync {
    fn on_alert(&self, alert: &AlertEntry) -> anyhow::Result<()>;

    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

impl<F> StatusObserver for F
where
    F: Fn(&SiteStatus) -> anyhow::Result<()> + Send + Sync,
{
    fn on_status(&self, status: &SiteStatus) -> anyhow::Result<()> {
        self(status)
    }
}

impl<F> AlertObserver for F
where
    F: Fn(&AlertEntry) -> anyhow::Result<()> + Send + Sync,
{
    fn on_alert(&self, alert: &AlertEntry) -> anyhow::Result<()> {
        self(alert)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

type Registrations<O> = RwLock<Vec<(ObserverId, Arc<O>)>>;

#[derive(Default)]
pub struct NotificationBus {
    next_id: AtomicU64,
    status_observers: Registrations<dyn StatusObserver>,
    alert_observers: Registrations<dyn AlertObserver>,
}

impl NotificationBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_status_update(&self, observer: impl StatusObserver + 'static) -> ObserverId {
        let id = self.next_id();
        let observer: Arc<dyn StatusObserver> = Arc::new(observer);
        self.status_observers.write().push((id, observer));
        id
    }

    pub fn on_alert(&self, observer: impl AlertObserver + 'static) -> ObserverId {
        let id = self.next_id();
        let observer: Arc<dyn AlertObserver> = Arc::new(observer);
        self.alert_observers.write().push((id, observer));
        id
    }

    /// Returns false if `id` was not registered.
    pub fn remove_status_observer(&self, id: ObserverId) -> bool {
        remove(&self.status_observers, id)
    }

    pub fn remove_alert_observer(&self, id: ObserverId) -> bool {
        remove(&self.alert_observers, id)
    }

    /// Delivers `status` to every status observer; returns how many failed.
    pub fn publish_status(&self, status: &SiteStatus) -> usize {
        let observers = snapshot(&self.status_observers);
        deliver(&observers, |o| o.name().to_string(), |o| o.on_status(status))
    }

    /// Delivers `alert` to every alert observer; returns how many failed.
    pub fn publish_alert(&self, alert: &AlertEntry) -> usize {
        let observers = snapshot(&self.alert_observers);
        deliver(&observers, |o| o.name().to_string(), |o| o.on_alert(alert))
    }

    pub fn status_observer_count(&self) -> usize {
        self.status_observers.read().len()
    }

    pub fn alert_observer_count(&self) -> usize {
        self.alert_observers.read().len()
    }

    fn next_id(&self) -> ObserverId {
        ObserverId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }
}

fn remove<O: ?Sized>(registrations: &Registrations<O>, id: ObserverId) -> bool {
    let mut observers = registrations.write();
    let before = observers.len();
    observers.retain(|(existing, _)| *existing != id);
    observers.len() != before
}

// Cloned out so observers can (un)register from inside a callback.
fn snapshot<O: ?Sized>(registrations: &Registrations<O>) -> Vec<Arc<O>> {
    registrations.read().iter().map(|(_, o)| Arc::clone(o)).collect()
}

fn deliver<O: ?Sized>(
    observers: &[Arc<O>],
    name: impl Fn(&O) -> String,
    call: impl Fn(&O) -> anyhow::Result<()>,
) -> usize {
    let mut failures = 0;
    for observer in observers {
        match panic::catch_unwind(AssertUnwindSafe(|| call(observer))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                failures += 1;
                error!("Observer {} failed: {:#}", name(observer), e);
            }
            Err(_) => {
                failures += 1;
                error!("Observer {} panicked", name(observer));
            }
        }
    }
    failures
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AlertKind;
    use chrono::Utc;
    use std::sync::atomic::AtomicUsize;

    fn alert() -> AlertEntry {
        AlertEntry {
            url: "https://example.com".into(),
            alert_type: AlertKind::Down,
            message: "Connection failed".into(),
            status_code: -1,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn every_observer_sees_each_event_once() {
        let bus = NotificationBus::new();
        let hits = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let hits = hits.clone();
            bus.on_status_update(move |_: &SiteStatus| -> anyhow::Result<()> {
                hits.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });
        }

        let failures = bus.publish_status(&SiteStatus::new("https://example.com"));
        assert_eq!(failures, 0);
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn failing_observers_are_isolated() {
        let bus = NotificationBus::new();
        let hits = Arc::new(AtomicUsize::new(0));

        bus.on_alert(|_: &AlertEntry| -> anyhow::Result<()> { anyhow::bail!("observer is broken") });
        bus.on_alert(|_: &AlertEntry| -> anyhow::Result<()> { panic!("observer exploded") });
        let counter = hits.clone();
        bus.on_alert(move |_: &AlertEntry| -> anyhow::Result<()> {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        assert_eq!(bus.publish_alert(&alert()), 2);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn removed_observers_stop_receiving() {
        let bus = NotificationBus::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let id = bus.on_status_update(move |_: &SiteStatus| -> anyhow::Result<()> {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        bus.publish_status(&SiteStatus::new("https://example.com"));
        assert!(bus.remove_status_observer(id));
        assert!(!bus.remove_status_observer(id));
        bus.publish_status(&SiteStatus::new("https://example.com"));

        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(bus.status_observer_count(), 0);
    }

    #[test]
    fn alert_observers_can_be_removed() {
        let bus = NotificationBus::new();
        let id = bus.on_alert(|_: &AlertEntry| -> anyhow::Result<()> { Ok(()) });
        assert_eq!(bus.alert_observer_count(), 1);
        assert!(bus.remove_alert_observer(id));
        assert_eq!(bus.alert_observer_count(), 0);
    }
}
