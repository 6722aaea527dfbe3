//! Followed-target liveness checks.
//!
//! Cheap per-target probes against the stream-thumbnail endpoint decide
//! which followed-but-idle targets are worth a full URL resolution.

use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::Rng;
use reqwest::Client;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::Result;
use crate::capture::CaptureRequest;
use crate::config::Settings;
use crate::console::tables;
use crate::database::repositories::TargetRepository;
use crate::http::probe_client;
use crate::monitor::RateGate;
use crate::resolver::UrlResolver;

/// Split probe results into online (200) and offline (201 and up) names.
/// Probes that never reached the remote (status 0) land in neither bucket.
pub fn partition_by_status(results: Vec<(u16, String)>) -> (Vec<String>, Vec<String>) {
    let mut online = Vec::new();
    let mut offline = Vec::new();
    for (status_code, name) in results {
        if status_code == 200 {
            online.push(name);
        } else if status_code >= 201 {
            offline.push(name);
        }
    }
    (online, offline)
}

/// Periodic liveness checker for followed targets.
pub struct StatusChecker {
    client: Client,
    targets: Arc<dyn TargetRepository>,
    gate: RateGate,
    resolver: Arc<UrlResolver>,
    capture_tx: mpsc::Sender<CaptureRequest>,
    settings: Settings,
}

impl StatusChecker {
    pub fn new(
        targets: Arc<dyn TargetRepository>,
        gate: RateGate,
        resolver: Arc<UrlResolver>,
        capture_tx: mpsc::Sender<CaptureRequest>,
        settings: Settings,
    ) -> Result<Self> {
        Ok(Self {
            client: probe_client()?,
            targets,
            gate,
            resolver,
            capture_tx,
            settings,
        })
    }

    /// Run forever on the randomized cadence until cancelled.
    ///
    /// The status tables are printed at most once per process lifetime; the
    /// latch lives here, owned by the loop, not in any global.
    pub async fn run(self, cancel: CancellationToken) {
        let mut tables_shown = false;

        loop {
            let started = Instant::now();
            if let Err(e) = self.cycle(&cancel, &mut tables_shown).await {
                warn!("Streamer check failed: {e}");
            }
            info!(
                "Streamer check completed: {:.4} seconds",
                started.elapsed().as_secs_f64()
            );

            let delay = {
                let mut rng = rand::rng();
                Duration::from_secs_f64(rng.random_range(
                    self.settings.checker_cadence.min_secs..self.settings.checker_cadence.max_secs,
                ))
            };
            info!(
                "Next streamer check: {}min {}sec",
                delay.as_secs() / 60,
                delay.as_secs() % 60
            );
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// One check cycle over every followed idle target.
    async fn cycle(&self, cancel: &CancellationToken, tables_shown: &mut bool) -> Result<()> {
        let followed = self
            .targets
            .followed_idle(self.settings.staleness_days)
            .await?;
        if followed.is_empty() {
            info!("Zero streamers are designated for capture");
            return Ok(());
        }

        self.gate
            .pause_if_recent(self.settings.rate_cooldown, "status check")
            .await;

        let results = self.probe_all(&followed).await;
        let (online, offline) = partition_by_status(results);

        if !*tables_shown {
            let offline_rows = self.targets.offline_details(&offline).await?;
            tables::print_offline_table(&offline_rows);
            let online_rows = self.targets.recorded_counts(&online).await?;
            tables::print_online_table(&online_rows);
        }
        *tables_shown = true;

        if online.is_empty() {
            return Ok(());
        }

        for resolution in self.resolver.resolve(&online, cancel).await {
            if !resolution.success {
                continue;
            }
            if self
                .capture_tx
                .send(CaptureRequest::Resolved(resolution))
                .await
                .is_err()
            {
                warn!("Capture supervisor is gone; dropping capture request");
                break;
            }
        }

        Ok(())
    }

    /// Probe every name in parallel, grouped by the listing page size.
    async fn probe_all(&self, names: &[String]) -> Vec<(u16, String)> {
        let started = Instant::now();
        let mut tasks = JoinSet::new();

        for group in names.chunks(self.settings.page_size) {
            for name in group {
                let client = self.client.clone();
                let url = format!("{}/stream?room={}", self.settings.thumb_base, name);
                let timeout = self.settings.probe_timeout;
                let name = name.clone();
                tasks.spawn(async move {
                    match client.get(&url).timeout(timeout).send().await {
                        Ok(response) => (response.status().as_u16(), name),
                        Err(e) => {
                            debug!("Liveness probe failed for {name}: {e}");
                            (0, name)
                        }
                    }
                });
            }
        }

        let mut results = Vec::with_capacity(names.len());
        while let Some(joined) = tasks.join_next().await {
            if let Ok(result) = joined {
                results.push(result);
            }
        }

        debug!(
            "Status for {} streamer(s) in {:.4} seconds",
            results.len(),
            started.elapsed().as_secs_f64()
        );
        results
    }
}
