use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use streamcap::capture::{CaptureRequest, CaptureSupervisor};
use streamcap::config::Settings;
use streamcap::console::Console;
use streamcap::database::repositories::{SqlxStatRepository, SqlxTargetRepository};
use streamcap::monitor::{OnlinePoller, RateGate, StatusChecker};
use streamcap::resolver::UrlResolver;
use streamcap::{database, logging, reaper};

/// Backlog of pending capture requests before senders wait.
const CAPTURE_QUEUE_DEPTH: usize = 64;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::from_env();
    let _log_guard = logging::init(&settings.log_dir)?;

    let pool = database::init_pool(&settings.database_url).await?;
    database::run_migrations(&pool).await?;

    let targets = Arc::new(SqlxTargetRepository::new(pool.clone()));
    let stats = Arc::new(SqlxStatRepository::new(pool));

    // Repair any "capturing" rows left behind by an unclean shutdown before
    // the pollers get a chance to act on them.
    reaper::reconcile(targets.as_ref()).await;

    let gate = RateGate::new(stats.clone(), settings.rate_guard);
    let resolver = Arc::new(UrlResolver::new(&settings)?);
    let cancel = CancellationToken::new();

    let (capture_tx, capture_rx) = mpsc::channel::<CaptureRequest>(CAPTURE_QUEUE_DEPTH);

    let supervisor = CaptureSupervisor::new(
        targets.clone(),
        gate.clone(),
        resolver.clone(),
        settings.clone(),
        capture_tx.clone(),
    );
    tokio::spawn(supervisor.run(capture_rx, cancel.clone()));

    let poller = OnlinePoller::new(targets.clone(), stats.clone(), settings.clone())?;
    tokio::spawn(poller.run(cancel.clone()));

    let checker = StatusChecker::new(
        targets.clone(),
        gate.clone(),
        resolver.clone(),
        capture_tx.clone(),
        settings.clone(),
    )?;
    tokio::spawn(checker.run(cancel.clone()));

    tracing::info!("streamcap initialized");

    // The console owns the foreground; leaving it cancels the loops.
    // Recorder processes are detached on purpose and keep running; the next
    // boot reconciles them.
    Console::new(targets, gate, resolver, capture_tx, settings.clone())
        .run(cancel.clone())
        .await;

    cancel.cancel();
    tracing::info!("streamcap shutting down");

    Ok(())
}
