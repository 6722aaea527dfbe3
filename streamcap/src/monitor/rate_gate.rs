//! The shared guard against calling the remote service too frequently.

use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use tracing::{info, warn};

use crate::database::repositories::StatRepository;

/// Tracks the most recent remote call (via the stats table) and answers
/// "is it safe to issue another batch right now".
#[derive(Clone)]
pub struct RateGate {
    stats: Arc<dyn StatRepository>,
    guard: Duration,
}

impl RateGate {
    pub fn new(stats: Arc<dyn StatRepository>, guard: Duration) -> Self {
        Self { stats, guard }
    }

    /// True when the most recent recorded remote call is younger than the
    /// guard window. No prior call (or a store read failure) reads as "not
    /// recent" — the caller proceeds and the remote side arbitrates.
    pub async fn recent_call(&self) -> bool {
        let last = match self.stats.last_call().await {
            Ok(last) => last,
            Err(e) => {
                warn!("Rate gate could not read the stats table: {e}");
                return false;
            }
        };

        match last {
            Some(last) => {
                let elapsed = Local::now().naive_local() - last;
                elapsed
                    .to_std()
                    .map(|elapsed| elapsed < self.guard)
                    .unwrap_or(false)
            }
            None => false,
        }
    }

    /// Sleep out the cool-down when a call happened too recently.
    ///
    /// Returns true when a pause was taken, so callers can log resumption.
    pub async fn pause_if_recent(&self, cooldown: Duration, caller: &str) -> bool {
        if !self.recent_call().await {
            return false;
        }
        info!("Awaiting api rest ({caller})");
        tokio::time::sleep(cooldown).await;
        info!("Resuming api calls ({caller})");
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Result;
    use crate::database::repositories::StatKind;
    use async_trait::async_trait;
    use chrono::{Duration as ChronoDuration, NaiveDateTime};

    struct FixedStats(Option<NaiveDateTime>);

    #[async_trait]
    impl StatRepository for FixedStats {
        async fn record(&self, _kind: StatKind, _value: i64) -> Result<()> {
            Ok(())
        }

        async fn last_call(&self) -> Result<Option<NaiveDateTime>> {
            Ok(self.0)
        }
    }

    fn gate(last: Option<NaiveDateTime>) -> RateGate {
        RateGate::new(Arc::new(FixedStats(last)), Duration::from_secs(100))
    }

    #[tokio::test]
    async fn no_prior_call_is_not_recent() {
        assert!(!gate(None).recent_call().await);
    }

    #[tokio::test]
    async fn call_inside_guard_window_is_recent() {
        let last = Local::now().naive_local() - ChronoDuration::seconds(30);
        assert!(gate(Some(last)).recent_call().await);
    }

    #[tokio::test]
    async fn call_outside_guard_window_is_not_recent() {
        let last = Local::now().naive_local() - ChronoDuration::seconds(300);
        assert!(!gate(Some(last)).recent_call().await);
    }

    #[tokio::test]
    async fn future_timestamp_is_treated_as_not_recent() {
        // Clock skew: a "last call" in the future must not wedge the gate.
        let last = Local::now().naive_local() + ChronoDuration::seconds(500);
        assert!(!gate(Some(last)).recent_call().await);
    }
}
