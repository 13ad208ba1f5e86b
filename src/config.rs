use serde::{Deserialize, Serialize};
use std::path::Path;

use anyhow::{Context, Result};

use crate::error::MonitorError;

pub const MIN_CHECK_INTERVAL: u64 = 5;
pub const MAX_CHECK_INTERVAL: u64 = 120;
pub const MIN_TIMEOUT: u64 = 3;
pub const MAX_TIMEOUT: u64 = 30;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MonitorConfig {
    #[serde(default)]
    pub sites: Vec<String>,
    #[serde(default = "default_check_interval")]
    pub check_interval: u64,
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,
    #[serde(default = "default_api_port")]
    pub api_port: u16,
    #[serde(default)]
    pub webhook_url: Option<String>,
    #[serde(default = "default_autostart")]
    pub autostart: bool,
}

fn default_check_interval() -> u64 { 30 }
fn default_timeout() -> u64 { 10 }
fn default_max_concurrency() -> usize { 16 }
fn default_user_agent() -> String { "SitePulse/1.0 (Web Availability Monitor)".into() }
fn default_max_redirects() -> usize { 30 }
fn default_api_port() -> u16 { 3000 }
fn default_autostart() -> bool { true }

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            sites: Vec::new(),
            check_interval: default_check_interval(),
            timeout: default_timeout(),
            max_concurrency: default_max_concurrency(),
            user_agent: default_user_agent(),
            max_redirects: default_max_redirects(),
            api_port: default_api_port(),
            webhook_url: None,
            autostart: default_autostart(),
        }
    }
}

impl MonitorConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: MonitorConfig = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), MonitorError> {
        validate_interval(self.check_interval)?;
        validate_timeout(self.timeout)?;
        Ok(())
    }
}

pub fn validate_interval(secs: u64) -> Result<(), MonitorError> {
    check_range("check_interval", secs, MIN_CHECK_INTERVAL, MAX_CHECK_INTERVAL)
}

pub fn validate_timeout(secs: u64) -> Result<(), MonitorError> {
    check_range("timeout", secs, MIN_TIMEOUT, MAX_TIMEOUT)
}

fn check_range(name: &'static str, value: u64, min: u64, max: u64) -> Result<(), MonitorError> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(MonitorError::InvalidSetting { name, value, min, max })
    }
}
