use std::error::Error as StdError;
use std::io;
use std::time::{Duration, Instant};

use reqwest::{redirect, Client};
use tokio::net::TcpStream;
use url::{Host, Url};

use crate::models::{NO_LATENCY, NO_STATUS_CODE};

pub const TIMEOUT_MESSAGE: &str = "Connection timeout";
pub const CONNECT_MESSAGE: &str = "Connection failed";
pub const TLS_MESSAGE: &str = "SSL certificate error";
pub const REDIRECT_MESSAGE: &str = "Too many redirects";

#[derive(Debug, Clone, PartialEq)]
pub struct HttpProbe {
    pub status_code: i32,
    pub latency_ms: f64,
    pub error: String,
}

impl HttpProbe {
    fn failed(error: impl Into<String>) -> Self {
        Self {
            status_code: NO_STATUS_CODE,
            latency_ms: NO_LATENCY,
            error: error.into(),
        }
    }
}

pub fn build_client(user_agent: &str, max_redirects: usize) -> reqwest::Result<Client> {
    Client::builder()
        .user_agent(user_agent)
        .redirect(redirect::Policy::limited(max_redirects))
        .build()
}

/// One GET request, redirects followed, bounded by `timeout`.
pub async fn probe_http(client: &Client, url: &str, timeout: Duration) -> HttpProbe {
    let start = Instant::now();
    match client.get(url).timeout(timeout).send().await {
        Ok(response) => HttpProbe {
            status_code: i32::from(response.status().as_u16()),
            latency_ms: start.elapsed().as_secs_f64() * 1000.0,
            error: String::new(),
        },
        Err(e) => HttpProbe::failed(classify_http_error(&e)),
    }
}

fn classify_http_error(err: &reqwest::Error) -> String {
    if err.is_timeout() {
        TIMEOUT_MESSAGE.into()
    } else if err.is_redirect() {
        REDIRECT_MESSAGE.into()
    } else if is_tls_failure(err) {
        TLS_MESSAGE.into()
    } else if err.is_connect() {
        CONNECT_MESSAGE.into()
    } else {
        err.to_string()
    }
}

/// Walks the source chain looking for a TLS handshake or certificate failure.
/// rustls errors reach us boxed inside `io::Error`, whose `source()` skips the
/// boxed error itself, so each `io::Error` is unwrapped with `get_ref`.
/// The outermost message is skipped since it embeds the request URL.
fn is_tls_failure(err: &(dyn StdError + 'static)) -> bool {
    let mut current = err.source();
    while let Some(e) = current {
        if is_rustls_error(e) {
            return true;
        }
        if let Some(inner) = e.downcast_ref::<io::Error>().and_then(io::Error::get_ref) {
            if is_rustls_error(inner) {
                return true;
            }
        }
        let text = e.to_string().to_ascii_lowercase();
        if text.contains("certificate") || text.contains("tls") || text.contains("ssl") {
            return true;
        }
        current = e.source();
    }
    false
}

fn is_rustls_error(err: &(dyn StdError + 'static)) -> bool {
    err.downcast_ref::<rustls::Error>().is_some()
}

/// True iff a TCP handshake with `host:port` completes within `timeout`.
/// Name resolution counts against the same timeout.
pub async fn probe_tcp(host: &str, port: u16, timeout: Duration) -> bool {
    if host.is_empty() {
        return false;
    }
    matches!(
        tokio::time::timeout(timeout, TcpStream::connect((host, port))).await,
        Ok(Ok(_))
    )
}

/// Host and port a TCP probe should target for `url`. Unparseable or host-less
/// URLs yield an empty host and port 443.
pub fn resolve_host_port(url: &str) -> (String, u16) {
    let Ok(parsed) = Url::parse(url) else {
        return (String::new(), 443);
    };
    let host = match parsed.host() {
        Some(Host::Domain(domain)) => domain.to_string(),
        Some(Host::Ipv4(ip)) => ip.to_string(),
        Some(Host::Ipv6(ip)) => ip.to_string(),
        None => return (String::new(), 443),
    };
    let port = parsed
        .port()
        .unwrap_or(if parsed.scheme() == "https" { 443 } else { 80 });
    (host, port)
}
