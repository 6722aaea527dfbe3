//! Playback-URL resolution.
//!
//! One remote call per target against the edge-URL endpoint, classified into
//! the error taxonomy. Callers decide whether to re-resolve; there is no
//! retry in here.

use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};
use url::Url;

use crate::config::Settings;
use crate::http::resolver_client;
use crate::{Error, Result};

/// Outcome of one resolution attempt. Immutable once produced.
#[derive(Debug, Clone)]
pub struct ResolutionResult {
    pub name: String,
    pub success: bool,
    pub url: Option<String>,
    pub domain: Option<String>,
    pub room_status: String,
    pub status_code: u16,
}

impl ResolutionResult {
    /// Failure placeholder carrying the remote status for the caller.
    fn failed(name: &str, status_code: u16) -> Self {
        Self {
            name: name.to_string(),
            success: false,
            url: None,
            domain: None,
            room_status: "failed".to_string(),
            status_code,
        }
    }

    /// A synthesized result for a target whose edge domain is already known;
    /// used when chaining sessions after a clean time-limit cutoff.
    pub fn from_known_domain(name: &str, url: String, domain: String) -> Self {
        Self {
            name: name.to_string(),
            success: true,
            url: Some(url),
            domain: Some(domain),
            room_status: "public".to_string(),
            status_code: 200,
        }
    }

    /// Source exists but is not currently live.
    pub fn is_idle(&self) -> bool {
        self.success && self.url.is_none() && self.status_code == 200
    }
}

/// Wire payload of the edge-URL endpoint. Only the consumed fields.
#[derive(Debug, Deserialize)]
pub struct EdgePayload {
    pub success: bool,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub room_status: String,
}

/// Classify one remote response into a result or a taxonomy error.
///
/// Priority order: 429, non-200, not-found payload, idle payload, live.
pub fn classify(name: &str, status_code: u16, payload: Option<&EdgePayload>) -> Result<ResolutionResult> {
    if status_code == 429 {
        return Err(Error::rate_limited(name, status_code));
    }
    if status_code != 200 {
        return Err(Error::unreachable(name, status_code));
    }

    let payload = payload.ok_or_else(|| Error::unreachable(name, status_code))?;

    if !payload.success {
        return Err(Error::not_found(name));
    }

    if payload.url.is_empty() {
        // Known source, currently idle. Not an error.
        return Ok(ResolutionResult {
            name: name.to_string(),
            success: true,
            url: None,
            domain: None,
            room_status: payload.room_status.clone(),
            status_code,
        });
    }

    let domain = Url::parse(&payload.url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_string()));

    Ok(ResolutionResult {
        name: name.to_string(),
        success: true,
        url: Some(payload.url.clone()),
        domain,
        room_status: if payload.room_status.is_empty() {
            "public".to_string()
        } else {
            payload.room_status.clone()
        },
        status_code,
    })
}

/// Resolves playable URLs for batches of target names.
pub struct UrlResolver {
    client: Client,
    edge_url: String,
    referer_base: String,
    timeout: Duration,
}

impl UrlResolver {
    pub fn new(settings: &Settings) -> Result<Self> {
        Ok(Self {
            client: resolver_client(&settings.referer_base)?,
            edge_url: settings.edge_url.clone(),
            referer_base: settings.referer_base.clone(),
            timeout: settings.resolve_timeout,
        })
    }

    /// Resolve every name concurrently under one cancellation scope.
    ///
    /// Cancellation returns whatever completed so far; this never hangs past
    /// the per-request timeout. Classified failures are logged and folded
    /// into `success = false` results.
    pub async fn resolve(&self, names: &[String], cancel: &CancellationToken) -> Vec<ResolutionResult> {
        let started = std::time::Instant::now();
        let mut tasks = JoinSet::new();

        for name in names {
            let client = self.client.clone();
            let edge_url = self.edge_url.clone();
            let referer = format!("{}/{}/", self.referer_base, name);
            let timeout = self.timeout;
            let name = name.clone();
            tasks.spawn(async move { fetch_one(client, edge_url, referer, timeout, name).await });
        }

        let mut results = Vec::with_capacity(names.len());
        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    tasks.abort_all();
                    break;
                }
                joined = tasks.join_next() => {
                    match joined {
                        Some(Ok(result)) => results.push(result),
                        Some(Err(_)) => continue,
                        None => break,
                    }
                }
            }
        }

        debug!(
            "Resolved {} of {} streamer(s) in {:.4} seconds",
            results.len(),
            names.len(),
            started.elapsed().as_secs_f64()
        );

        results
    }

    /// Resolve a single name, surfacing the classified error to the caller
    /// instead of folding it. Used by the console `get` command.
    pub async fn resolve_one(&self, name: &str) -> Result<ResolutionResult> {
        let referer = format!("{}/{}/", self.referer_base, name);
        let response = self
            .client
            .post(&self.edge_url)
            .header("referer", referer)
            .form(&[("room_slug", name), ("bandwidth", "high")])
            .timeout(self.timeout)
            .send()
            .await?;

        let status_code = response.status().as_u16();
        let payload = response.json::<EdgePayload>().await.ok();
        classify(name, status_code, payload.as_ref())
    }
}

async fn fetch_one(
    client: Client,
    edge_url: String,
    referer: String,
    timeout: Duration,
    name: String,
) -> ResolutionResult {
    let response = client
        .post(&edge_url)
        .header("referer", referer)
        .form(&[("room_slug", name.as_str()), ("bandwidth", "high")])
        .timeout(timeout)
        .send()
        .await;

    let response = match response {
        Ok(response) => response,
        Err(e) => {
            error!("Stream data request failed for {name}: {e}");
            return ResolutionResult::failed(&name, 0);
        }
    };

    let status_code = response.status().as_u16();
    let payload = response.json::<EdgePayload>().await.ok();

    match classify(&name, status_code, payload.as_ref()) {
        Ok(result) => result,
        Err(e) => {
            error!("{e}");
            ResolutionResult::failed(&name, status_code)
        }
    }
}
