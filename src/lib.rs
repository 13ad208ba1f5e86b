//! Background web availability monitor.
//!
//! A [`Monitor`] tracks a dynamic set of URLs, probes each one over HTTP and
//! TCP on a periodic cycle or on demand, and reports status updates and
//! online/offline transitions to observers registered on its
//! [`NotificationBus`].

pub mod api;
pub mod bus;
pub mod checker;
pub mod config;
pub mod engine;
pub mod error;
pub mod models;
pub mod notify;
pub mod transition;
pub mod utils;

pub use bus::{AlertObserver, NotificationBus, ObserverId, StatusObserver};
pub use config::MonitorConfig;
pub use engine::Monitor;
pub use error::MonitorError;
pub use models::{AlertEntry, AlertKind, SiteStatus, Summary};
