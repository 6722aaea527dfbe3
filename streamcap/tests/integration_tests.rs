//! Integration tests for the capture orchestration core.
//!
//! These drive the real repositories against an in-memory SQLite database
//! and walk the state transitions the supervisor performs, without any
//! network or recorder processes.

use streamcap::Error;
use streamcap::capture::{DrainOutcome, drain_outcome};
use streamcap::database::repositories::{
    SqlxStatRepository, SqlxTargetRepository, StatKind, StatRepository, TargetRepository,
};
use streamcap::database::{DbPool, init_pool, run_migrations};
use streamcap::resolver::{EdgePayload, classify};

/// Helper to create a test database pool with migrations applied.
async fn setup_test_db() -> DbPool {
    let pool = init_pool("sqlite::memory:")
        .await
        .expect("Failed to create test pool");

    run_migrations(&pool).await.expect("Failed to run migrations");

    pool
}

async fn setup_repos() -> (SqlxTargetRepository, SqlxStatRepository) {
    let pool = setup_test_db().await;
    (
        SqlxTargetRepository::new(pool.clone()),
        SqlxStatRepository::new(pool),
    )
}

mod database_tests {
    use super::*;

    #[tokio::test]
    async fn migrations_create_the_schema() {
        let pool = setup_test_db().await;

        let tables: Vec<(String,)> =
            sqlx::query_as("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
                .fetch_all(&pool)
                .await
                .expect("Failed to query tables");

        let table_names: Vec<&str> = tables.iter().map(|t| t.0.as_str()).collect();
        assert!(table_names.contains(&"streamers"), "streamers table missing");
        assert!(table_names.contains(&"stats"), "stats table missing");
    }

    #[tokio::test]
    async fn stats_reject_unknown_kinds() {
        let pool = setup_test_db().await;
        let result = sqlx::query("INSERT INTO stats (kind, value) VALUES ('bogus', 1)")
            .execute(&pool)
            .await;
        assert!(result.is_err());
    }
}

mod invariant_tests {
    use super::*;

    /// pid != null implies follow != null and block_date == null, at every
    /// state the supervisor's own transitions produce.
    #[tokio::test]
    async fn pid_invariant_holds_across_capture_transitions() {
        let (targets, _) = setup_repos().await;

        targets
            .upsert_followed("alice", "Chaturbate", Some("edge1.example.net"))
            .await
            .unwrap();
        targets.assign_pid("alice", 1234).await.unwrap();

        let record = targets.get("alice").await.unwrap().unwrap();
        assert!(record.pid.is_some());
        assert!(record.follow.is_some());
        assert!(record.block_date.is_none());

        targets.clear_pid(1234).await.unwrap();
        let record = targets.get("alice").await.unwrap().unwrap();
        assert!(record.pid.is_none());
    }

    #[tokio::test]
    async fn spawning_on_blocked_or_unfollowed_targets_is_rejected() {
        let (targets, _) = setup_repos().await;

        targets.upsert_followed("eve", "Chaturbate", None).await.unwrap();
        targets.block("eve", "dmca").await.unwrap();
        assert!(targets.assign_pid("eve", 1).await.is_err());

        targets.upsert_followed("fred", "Chaturbate", None).await.unwrap();
        targets.unfollow("fred").await.unwrap();
        assert!(targets.assign_pid("fred", 2).await.is_err());

        // Neither rejection may have left a pid behind.
        assert!(targets.active_pids().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn at_most_one_session_per_target() {
        let (targets, _) = setup_repos().await;

        targets.upsert_followed("alice", "Chaturbate", None).await.unwrap();
        targets.assign_pid("alice", 1111).await.unwrap();

        let second = targets.assign_pid("alice", 2222).await;
        assert!(matches!(second, Err(Error::StoreWriteFailed { .. })));
        assert_eq!(targets.pid_for("alice").await.unwrap(), Some(1111));
        // The rejected spawn must not bump the session counter either.
        assert_eq!(targets.get("alice").await.unwrap().unwrap().recorded, 1);
    }
}

mod scenario_tests {
    use super::*;

    fn live_payload(url: &str) -> EdgePayload {
        serde_json::from_value(serde_json::json!({
            "success": true,
            "url": url,
            "room_status": "public",
        }))
        .unwrap()
    }

    /// Normal follow cycle: probe says online, resolution succeeds, a
    /// session runs to its deadline, draining chains the next session.
    #[tokio::test]
    async fn normal_follow_cycle() {
        let (targets, _) = setup_repos().await;

        targets.upsert_followed("alice", "Chaturbate", None).await.unwrap();

        // StatusChecker finds alice idle and followed.
        assert_eq!(
            targets.followed_idle(100).await.unwrap(),
            vec!["alice".to_string()]
        );

        // UrlResolver returns a live URL.
        let payload = live_payload("https://edge3.example.net/live-hls/amlst:alice/playlist.m3u8");
        let resolution = classify("alice", 200, Some(&payload)).unwrap();
        assert!(resolution.success);

        // Spawning persists the pid.
        targets
            .upsert_followed("alice", "Chaturbate", resolution.domain.as_deref())
            .await
            .unwrap();
        targets.assign_pid("alice", 1234).await.unwrap();
        assert!(targets.followed_idle(100).await.unwrap().is_empty());

        // The recorder reaches its configured duration; draining re-reads
        // state, clears the pid, and decides to restart.
        let status = targets.capture_status("alice").await.unwrap();
        targets.clear_pid(1234).await.unwrap();
        assert_eq!(drain_outcome(status.as_ref()), DrainOutcome::Restart);

        // The chained session is admissible again.
        targets.assign_pid("alice", 1235).await.unwrap();
        let record = targets.get("alice").await.unwrap().unwrap();
        assert_eq!(record.recorded, 2);
        assert_eq!(record.domain.as_deref(), Some("edge3.example.net"));
    }

    /// Block during capture: draining observes the block and stops the
    /// chain instead of restarting.
    #[tokio::test]
    async fn block_during_capture() {
        let (targets, _) = setup_repos().await;

        targets.upsert_followed("alice", "Chaturbate", None).await.unwrap();
        targets.assign_pid("alice", 1234).await.unwrap();

        // External block command lands while the session is running.
        targets.block("alice", " requested removal").await.unwrap();

        let status = targets.capture_status("alice").await.unwrap();
        targets.clear_pid(1234).await.unwrap();
        assert_eq!(drain_outcome(status.as_ref()), DrainOutcome::Stop);

        let record = targets.get("alice").await.unwrap().unwrap();
        assert!(record.pid.is_none());
        assert!(record.block_date.is_some());
        // And a new session can not start.
        assert!(targets.assign_pid("alice", 9999).await.is_err());
    }

    /// Rate-limited resolution: a remote answering 429 yields a classified
    /// rate-limit failure for every name, never a crash, and no session.
    #[tokio::test]
    async fn rate_limited_resolution_batch() {
        let names = ["a", "b", "c", "d", "e"];
        for name in names {
            let result = classify(name, 429, None);
            match result {
                Err(Error::RemoteRateLimited { name: n, status }) => {
                    assert_eq!(n, name);
                    assert_eq!(status, 429);
                }
                other => panic!("expected RemoteRateLimited, got {other:?}"),
            }
        }
    }

    /// No stats row was written by a rate-limited batch, so the gate sees
    /// no recent call and a later cycle proceeds immediately.
    #[tokio::test]
    async fn rate_limited_batch_leaves_the_gate_cold() {
        let (_, stats) = setup_repos().await;
        assert!(stats.last_call().await.unwrap().is_none());

        stats.record(StatKind::Total, 1000).await.unwrap();
        assert!(stats.last_call().await.unwrap().is_some());
    }

    /// Stale pid at startup: the reaper clears it and the next checker
    /// cycle is free to re-capture the target.
    #[tokio::test]
    async fn stale_pid_at_startup() {
        let (targets, _) = setup_repos().await;

        targets.upsert_followed("bob", "Chaturbate", None).await.unwrap();

        // Persist a pid whose process is definitely gone.
        let mut child = std::process::Command::new("true").spawn().unwrap();
        let dead = child.id() as i64;
        child.wait().unwrap();
        targets.assign_pid("bob", dead).await.unwrap();

        assert!(targets.followed_idle(100).await.unwrap().is_empty());

        streamcap::reaper::reconcile(&targets).await;

        assert_eq!(targets.pid_for("bob").await.unwrap(), None);
        assert_eq!(
            targets.followed_idle(100).await.unwrap(),
            vec!["bob".to_string()]
        );
    }
}
