//! Full room-listing scans.
//!
//! Periodically walks the remote service's paginated room listing to keep
//! aggregate online counts and the discovered-target set current. The page
//! order, batch sizing, and inter-batch delays are all randomized so the
//! scan does not present a fixed access pattern to the rate limiter.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::Rng;
use rand::distr::Alphanumeric;
use rand::seq::SliceRandom;
use reqwest::Client;
use serde::Deserialize;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::config::{DelayRange, Settings};
use crate::Result;
use crate::database::models::RoomRow;
use crate::database::repositories::{StatKind, StatRepository, TargetRepository};
use crate::http::listing_client;

/// One page of the room listing. Only the consumed fields.
#[derive(Debug, Deserialize)]
struct RoomListPayload {
    #[serde(default)]
    rooms: Vec<ListedRoom>,
    #[serde(default)]
    total_count: i64,
}

#[derive(Debug, Deserialize)]
struct ListedRoom {
    username: String,
    #[serde(default)]
    num_followers: i64,
    #[serde(default)]
    num_users: i64,
}

/// Ascending page offsets for a listing of `total` rooms.
pub fn page_offsets(total: i64, page_size: usize) -> Vec<i64> {
    if total <= 0 {
        return Vec::new();
    }
    (0..total).step_by(page_size.max(1)).collect()
}

/// Requests per batch for a scan of `total_pages` pages.
///
/// Larger scans use smaller batches: the full ceiling up to 54 pages, half
/// the page count through 70, a 2.5 divisor through 86, and the ceiling
/// again beyond that (a scan that large is already dominated by the
/// inter-batch rests).
pub fn batch_limit(total_pages: usize, ceiling: usize) -> usize {
    let limit = match total_pages {
        55..=70 => total_pages / 2,
        71..=86 => (total_pages as f64 / 2.5).floor() as usize,
        _ => ceiling,
    };
    limit.max(1)
}

/// Placeholder row substituted for a page that failed or came back empty.
/// The fixed suffix keeps these rows identifiable in the database.
fn placeholder_row() -> RoomRow {
    let mut rng = rand::rng();
    let noise: String = (0..10)
        .map(|_| rng.sample(Alphanumeric) as char)
        .collect::<String>()
        .to_lowercase();
    RoomRow {
        name: format!("{noise}a9a9ab8b8"),
        followers: 0,
        viewers: 0,
    }
}

fn sample_delay(range: DelayRange) -> Duration {
    let mut rng = rand::rng();
    Duration::from_secs_f64(rng.random_range(range.min_secs..range.max_secs))
}

/// Periodic room-listing scanner.
pub struct OnlinePoller {
    client: Client,
    targets: Arc<dyn TargetRepository>,
    stats: Arc<dyn StatRepository>,
    settings: Settings,
}

impl OnlinePoller {
    pub fn new(
        targets: Arc<dyn TargetRepository>,
        stats: Arc<dyn StatRepository>,
        settings: Settings,
    ) -> Result<Self> {
        Ok(Self {
            client: listing_client()?,
            targets,
            stats,
            settings,
        })
    }

    /// Run forever on the randomized outer cadence until cancelled.
    pub async fn run(self, cancel: CancellationToken) {
        // Let the status checker take the first swing at the API.
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(self.settings.poller_initial_delay) => {}
        }

        loop {
            let started = Instant::now();
            if let Err(e) = self.scan(&cancel).await {
                error!("Room listing scan failed: {e}");
            }
            debug!(
                "Processed room listing in {:.3} seconds",
                started.elapsed().as_secs_f64()
            );

            let delay = sample_delay(self.settings.poller_cadence);
            info!("Next site query: {}min {}sec", delay.as_secs() / 60, delay.as_secs() % 60);
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// One full scan: total count, then every listing page in randomized
    /// batched order, then a single de-duplicated bulk write.
    pub async fn scan(&self, cancel: &CancellationToken) -> Result<()> {
        let total = self.fetch_total().await?;
        self.stats.record(StatKind::Total, total).await?;
        info!("{total} streamers online");

        let offsets = scan_order(page_offsets(total, self.settings.page_size));
        if offsets.is_empty() {
            return Ok(());
        }

        let limit = batch_limit(offsets.len(), self.settings.batch_ceiling);
        let batches: Vec<&[i64]> = offsets.chunks(limit).collect();
        let num_batches = batches.len();

        let mut observed: Vec<RoomRow> = Vec::new();
        for (index, batch) in batches.iter().enumerate() {
            if cancel.is_cancelled() {
                info!("Room listing scan interrupted");
                return Ok(());
            }

            observed.extend(self.fetch_batch(batch).await);

            // Rest between batches, tightened when the scan is large.
            if index < num_batches - 1 {
                let range = if num_batches > 2 {
                    self.settings.batch_rest_loaded
                } else {
                    self.settings.batch_rest
                };
                let delay = sample_delay(range);
                debug!(
                    "Next listing batch in {}min {}sec",
                    delay.as_secs() / 60,
                    delay.as_secs() % 60
                );
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        info!("Room listing scan interrupted");
                        return Ok(());
                    }
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }

        let unique = dedupe(observed);
        self.stats.record(StatKind::Batch, unique.len() as i64).await?;
        self.targets.upsert_discovered(&unique).await?;
        debug!("Recorded {} unique rooms", unique.len());

        Ok(())
    }

    async fn fetch_total(&self) -> Result<i64> {
        let url = format!("{}0", self.settings.room_list_url);
        let response = self
            .client
            .get(&url)
            .timeout(self.settings.listing_timeout)
            .send()
            .await?;

        if response.status().as_u16() != 200 {
            return Err(crate::Error::unreachable(
                "room listing",
                response.status().as_u16(),
            ));
        }

        let payload: RoomListPayload = response.json().await?;
        Ok(payload.total_count)
    }

    async fn fetch_batch(&self, offsets: &[i64]) -> Vec<RoomRow> {
        let started = Instant::now();
        let mut tasks = JoinSet::new();

        for &offset in offsets {
            let client = self.client.clone();
            let url = format!("{}{offset}", self.settings.room_list_url);
            let timeout = self.settings.listing_timeout;
            let failure_pause = self.settings.page_failure_pause;
            tasks.spawn(async move { fetch_page(client, url, timeout, failure_pause).await });
        }

        let mut rows = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            if let Ok(page_rows) = joined {
                rows.extend(page_rows);
            }
        }

        debug!(
            "Processed {} rooms in {:.4} seconds",
            rows.len(),
            started.elapsed().as_secs_f64()
        );
        rows
    }
}

/// Processing order for a scan: the last page first (it is the page most
/// likely to have shifted away as the listing changes), the rest shuffled.
fn scan_order(mut offsets: Vec<i64>) -> Vec<i64> {
    let Some(last) = offsets.pop() else {
        return offsets;
    };
    let mut rng = rand::rng();
    offsets.shuffle(&mut rng);
    offsets.insert(0, last);
    offsets
}

fn dedupe(rows: Vec<RoomRow>) -> Vec<RoomRow> {
    let mut seen = HashSet::new();
    rows.into_iter()
        .filter(|row| seen.insert(row.clone()))
        .collect()
}

async fn fetch_page(
    client: Client,
    url: String,
    timeout: Duration,
    failure_pause: Duration,
) -> Vec<RoomRow> {
    let response = match client.get(&url).timeout(timeout).send().await {
        Ok(response) => response,
        Err(e) => {
            error!("Listing page request failed: {e}");
            tokio::time::sleep(failure_pause).await;
            return vec![placeholder_row()];
        }
    };

    if response.status().as_u16() != 200 {
        error!("Listing page returned {}", response.status());
        tokio::time::sleep(failure_pause).await;
        return vec![placeholder_row()];
    }

    let payload: RoomListPayload = match response.json().await {
        Ok(payload) => payload,
        Err(e) => {
            error!("Listing page decode failed: {e}");
            return vec![placeholder_row()];
        }
    };

    // A zero-length page means the offset no longer exists.
    if payload.rooms.is_empty() {
        return vec![placeholder_row()];
    }

    payload
        .rooms
        .into_iter()
        .map(|room| RoomRow {
            name: room.username,
            followers: room.num_followers,
            viewers: room.num_users,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offsets_step_by_page_size() {
        assert_eq!(page_offsets(270, 90), vec![0, 90, 180]);
        assert_eq!(page_offsets(271, 90), vec![0, 90, 180, 270]);
        assert_eq!(page_offsets(0, 90), Vec::<i64>::new());
        assert_eq!(page_offsets(-5, 90), Vec::<i64>::new());
        assert_eq!(page_offsets(89, 90), vec![0]);
    }

    #[test]
    fn scan_order_puts_last_page_first() {
        let ordered = scan_order(page_offsets(900, 90));
        assert_eq!(ordered[0], 810);
        let mut sorted = ordered.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, page_offsets(900, 90));
    }

    #[test]
    fn scan_order_keeps_single_page() {
        assert_eq!(scan_order(vec![0]), vec![0]);
        assert_eq!(scan_order(Vec::new()), Vec::<i64>::new());
    }

    #[test]
    fn batch_limit_bands() {
        assert_eq!(batch_limit(1, 54), 54);
        assert_eq!(batch_limit(54, 54), 54);
        assert_eq!(batch_limit(55, 54), 27);
        assert_eq!(batch_limit(70, 54), 35);
        assert_eq!(batch_limit(71, 54), 28);
        assert_eq!(batch_limit(86, 54), 34);
        assert_eq!(batch_limit(87, 54), 54);
    }

    #[test]
    fn batch_limit_band_starts_never_increase() {
        // Entering a higher load band never increases the batch size.
        assert!(batch_limit(55, 54) <= batch_limit(54, 54));
        assert!(batch_limit(71, 54) <= batch_limit(70, 54));
    }

    #[test]
    fn placeholder_rows_are_marked() {
        let row = placeholder_row();
        assert!(row.name.ends_with("a9a9ab8b8"));
        assert_eq!(row.followers, 0);
        assert_eq!(row.viewers, 0);
    }

    #[test]
    fn dedupe_drops_exact_duplicates() {
        let rows = vec![
            RoomRow { name: "a".into(), followers: 1, viewers: 2 },
            RoomRow { name: "a".into(), followers: 1, viewers: 2 },
            RoomRow { name: "b".into(), followers: 1, viewers: 2 },
        ];
        assert_eq!(dedupe(rows).len(), 2);
    }
}
