use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MonitorError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Invalid URL: No domain found")]
    MissingHost,

    #[error("Invalid domain: {0}")]
    InvalidDomain(String),

    #[error("{name} must be between {min} and {max} seconds (got {value})")]
    InvalidSetting {
        name: &'static str,
        value: u64,
        min: u64,
        max: u64,
    },
}

pub type Result<T> = std::result::Result<T, MonitorError>;
