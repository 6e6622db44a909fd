use std::sync::OnceLock;
use std::time::Duration;

use anyhow::anyhow;
use log::warn;
use reqwest::blocking::Client;
use reqwest::StatusCode;

pub struct HttpClient;

impl HttpClient {
    pub fn shared() -> &'static Client {
        static CLIENT: OnceLock<Client> = OnceLock::new();
        CLIENT.get_or_init(|| {
            let timeout = resolve_timeout();
            reqwest::blocking::Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_else(|err| {
                    warn!("[http] failed to build shared client: {err}");
                    reqwest::blocking::Client::new()
                })
        })
    }
}

fn resolve_timeout() -> Duration {
    const DEFAULT_TIMEOUT_SECS: u64 = 15;
    let timeout = std::env::var("CERTFETCH_HTTP_TIMEOUT_SECS")
        .ok()
        .and_then(|raw| raw.parse::<u64>().ok())
        .unwrap_or(DEFAULT_TIMEOUT_SECS);
    if timeout == 0 {
        warn!("[http] invalid timeout value; using default");
        return Duration::from_secs(DEFAULT_TIMEOUT_SECS);
    }
    Duration::from_secs(timeout)
}

pub fn status_error(provider: &str, status: StatusCode, body: Option<String>) -> anyhow::Error {
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return anyhow!("{provider} authentication failed");
    }
    if status == StatusCode::TOO_MANY_REQUESTS {
        return anyhow!("{provider} rate limit exceeded");
    }
    if let Some(body) = body.filter(|body| !body.is_empty()) {
        return anyhow!("{provider} API error: {body}");
    }
    anyhow!("{provider} API error: {status}")
}
