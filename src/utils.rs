use once_cell::sync::Lazy;
use regex::Regex;
use url::{ParseError, Url};

use crate::error::{MonitorError, Result};

static DOMAIN_PATTERN: Lazy<std::result::Result<Regex, regex::Error>> = Lazy::new(|| {
    Regex::new(
        r"^[a-zA-Z0-9]([a-zA-Z0-9\-]{0,61}[a-zA-Z0-9])?(\.[a-zA-Z0-9]([a-zA-Z0-9\-]{0,61}[a-zA-Z0-9])?)*$",
    )
});

/// Hosts are rejected outright if the label grammar failed to compile.
fn is_valid_domain(host: &str) -> bool {
    DOMAIN_PATTERN.as_ref().is_ok_and(|pattern| pattern.is_match(host))
}

/// Turns raw user input into the absolute URL used as an endpoint key.
///
/// Input without an `http://` or `https://` prefix is assumed to be https.
/// The returned string is the trimmed, prefixed input; it is not re-serialized
/// by the URL parser, so `example.com` becomes `https://example.com`.
pub fn normalize_url(raw: &str) -> Result<String> {
    let trimmed = raw.trim();
    let url = if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    };

    let parsed = match Url::parse(&url) {
        Ok(parsed) => parsed,
        Err(ParseError::EmptyHost) => return Err(MonitorError::MissingHost),
        Err(e) => return Err(MonitorError::InvalidUrl(e.to_string())),
    };

    let host = parsed.host_str().ok_or(MonitorError::MissingHost)?;
    if host.is_empty() {
        return Err(MonitorError::MissingHost);
    }
    if !is_valid_domain(host) {
        return Err(MonitorError::InvalidDomain(host.to_string()));
    }

    Ok(url)
}

/// `host[:port]` of a URL, or the input unchanged when it does not parse.
pub fn extract_domain(url: &str) -> String {
    match Url::parse(url) {
        Ok(parsed) => match (parsed.host_str(), parsed.port()) {
            (Some(host), Some(port)) => format!("{host}:{port}"),
            (Some(host), None) if !host.is_empty() => host.to_string(),
            _ => url.to_string(),
        },
        Err(_) => url.to_string(),
    }
}

pub fn status_description(code: i32) -> &'static str {
    match code {
        200 => "OK",
        201 => "Created",
        204 => "No Content",
        301 => "Moved Permanently",
        302 => "Found",
        304 => "Not Modified",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        408 => "Request Timeout",
        429 => "Too Many Requests",
        500 => "Internal Server Error",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        504 => "Gateway Timeout",
        _ => "Unknown Status",
    }
}

pub fn format_latency(latency_ms: f64) -> String {
    if latency_ms < 0.0 {
        "N/A".into()
    } else if latency_ms < 1000.0 {
        format!("{latency_ms:.0} ms")
    } else {
        format!("{:.2} s", latency_ms / 1000.0)
    }
}
