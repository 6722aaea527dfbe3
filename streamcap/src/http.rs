//! Shared HTTP client construction.
//!
//! Each remote endpoint gets its own client with a browser-like header set
//! and a user agent drawn from a small pool, so repeated scans do not
//! present one fixed fingerprint.

use rand::prelude::IndexedRandom;
use reqwest::Client;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

use crate::Result;

/// Mobile-heavy user-agent pool.
const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Linux; Android 10; SM-G975F Build/QP1A.190711.020) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/84.0.4147.89 Mobile Safari/537.36",
    "Mozilla/5.0 (Linux; Android 11; Redmi Note 8T) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/95.0.4638.69 Mobile Safari/537.36 EdgA/95.0.1020.48",
    "Mozilla/5.0 (Linux; Android 9; Moto X4) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/84.0.4147.125 Mobile Safari/537.36",
    "Mozilla/5.0 (iPhone; CPU iPhone OS 14_8 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) GSA/180.0.400278405 Mobile/15E148 Safari/604.1",
    "Mozilla/5.0 (iPad; CPU OS 14_2 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) CriOS/87.0.4280.77 Mobile/15E148 Safari/604.1",
    "Mozilla/5.0 (Linux; Android 11; SM-G991W) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/93.0.4577.62 Mobile Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_14_6) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/87.0.4280.66 Safari/537.36",
    "Mozilla/5.0 (Linux; Android 10; CPH2035) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/86.0.4240.114 Mobile Safari/537.36",
];

/// Pick a user agent for this process run.
pub fn pick_user_agent() -> &'static str {
    let mut rng = rand::rng();
    USER_AGENTS.choose(&mut rng).copied().unwrap_or(USER_AGENTS[0])
}

fn base_headers(pairs: &[(&str, &str)]) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for (key, value) in pairs {
        if let (Ok(name), Ok(val)) = (
            HeaderName::from_bytes(key.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            headers.insert(name, val);
        }
    }
    headers
}

/// Client for the JSON room-listing endpoint.
pub fn listing_client() -> Result<Client> {
    let headers = base_headers(&[
        ("accept", "application/json, text/plain, */*"),
        ("accept-language", "en-US,en;q=0.9"),
        ("cache-control", "no-cache"),
        ("pragma", "no-cache"),
        ("sec-fetch-dest", "document"),
        ("sec-fetch-mode", "navigate"),
        ("sec-fetch-site", "cross-site"),
    ]);
    let client = Client::builder()
        .user_agent(pick_user_agent())
        .default_headers(headers)
        .gzip(true)
        .deflate(true)
        .build()?;
    Ok(client)
}

/// Client for the lightweight per-room thumbnail probe.
pub fn probe_client() -> Result<Client> {
    let headers = base_headers(&[
        ("accept", "image/avif,image/webp,image/png,*/*;q=0.8"),
        ("accept-language", "en-US,en;q=0.9"),
        ("cache-control", "no-cache"),
        ("pragma", "no-cache"),
        ("sec-fetch-dest", "image"),
        ("sec-fetch-mode", "no-cors"),
        ("sec-fetch-site", "cross-site"),
    ]);
    let client = Client::builder()
        .user_agent(pick_user_agent())
        .default_headers(headers)
        .build()?;
    Ok(client)
}

/// Client for the playback-URL resolution endpoint.
pub fn resolver_client(referer_base: &str) -> Result<Client> {
    let headers = base_headers(&[
        ("accept", "*/*"),
        ("accept-language", "en-US,en;q=0.9"),
        ("origin", referer_base),
        ("sec-fetch-dest", "empty"),
        ("sec-fetch-mode", "cors"),
        ("sec-fetch-site", "same-origin"),
        ("x-requested-with", "XMLHttpRequest"),
    ]);
    let client = Client::builder()
        .user_agent(pick_user_agent())
        .default_headers(headers)
        .gzip(true)
        .deflate(true)
        .build()?;
    Ok(client)
}
