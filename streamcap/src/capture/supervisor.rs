//! Capture supervision.
//!
//! One request channel feeds the supervisor; every accepted request becomes
//! a spawned recorder process plus a monitor task that owns the session from
//! then on. A finished session re-enters through the same channel, so the
//! restart path is identical to a first capture.

use std::process::Stdio;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::Result;
use crate::capture::progress::ProgressTracker;
use crate::capture::session::{CaptureSession, synthesized_url};
use crate::config::Settings;
use crate::database::models::CaptureStatus;
use crate::database::repositories::TargetRepository;
use crate::monitor::RateGate;
use crate::resolver::{ResolutionResult, UrlResolver};

/// A request to start (or chain) a capture for one target.
#[derive(Debug)]
pub enum CaptureRequest {
    /// A finished resolution: from the status checker, the console, or a
    /// clean restart with a synthesized URL.
    Resolved(ResolutionResult),
    /// The target must be re-resolved first (the recorder exited early).
    Reresolve(String),
}

/// What happens to a target's capture chain after a session drains.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainOutcome {
    Restart,
    Stop,
}

/// Draining decision: restart only while the target is still followed and
/// not blocked. A missing row stops the chain.
pub fn drain_outcome(status: Option<&CaptureStatus>) -> DrainOutcome {
    match status {
        Some(status) if status.followed() && !status.blocked() => DrainOutcome::Restart,
        _ => DrainOutcome::Stop,
    }
}

/// Owns the request loop and spawns one monitor per accepted session.
pub struct CaptureSupervisor {
    targets: Arc<dyn TargetRepository>,
    gate: RateGate,
    resolver: Arc<UrlResolver>,
    settings: Settings,
    requests_tx: mpsc::Sender<CaptureRequest>,
}

impl CaptureSupervisor {
    pub fn new(
        targets: Arc<dyn TargetRepository>,
        gate: RateGate,
        resolver: Arc<UrlResolver>,
        settings: Settings,
        requests_tx: mpsc::Sender<CaptureRequest>,
    ) -> Self {
        Self {
            targets,
            gate,
            resolver,
            settings,
            requests_tx,
        }
    }

    /// Consume capture requests until cancelled.
    pub async fn run(self, mut requests_rx: mpsc::Receiver<CaptureRequest>, cancel: CancellationToken) {
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return,
                request = requests_rx.recv() => {
                    match request {
                        Some(request) => {
                            if let Err(e) = self.handle(request, &cancel).await {
                                warn!("Capture request failed: {e}");
                            }
                        }
                        None => return,
                    }
                }
            }
        }
    }

    async fn handle(&self, request: CaptureRequest, cancel: &CancellationToken) -> Result<()> {
        let resolution = match request {
            CaptureRequest::Resolved(resolution) => resolution,
            CaptureRequest::Reresolve(name) => {
                let mut results = self.resolver.resolve(&[name], cancel).await;
                match results.pop() {
                    Some(resolution) if resolution.success => resolution,
                    // Failures were already logged; the next checker cycle
                    // will try again.
                    _ => return Ok(()),
                }
            }
        };

        if !resolution.success {
            return Ok(());
        }

        // Every resolution attempt lands in the registry, live or not.
        self.targets
            .upsert_followed(
                &resolution.name,
                &self.settings.site_name,
                resolution.domain.as_deref(),
            )
            .await?;

        if resolution.is_idle() {
            info!("{} is {}", resolution.name, resolution.room_status);
            return Ok(());
        }

        self.start_session(resolution).await
    }

    /// Spawning: at-most-one guard, recorder launch, durable pid marker,
    /// ownership hand-off to the monitor task.
    async fn start_session(&self, resolution: ResolutionResult) -> Result<()> {
        let name = resolution.name.clone();

        if self.targets.pid_for(&name).await?.is_some() {
            info!("Already capturing {name}");
            return Ok(());
        }

        let Some(session) = CaptureSession::build(&resolution, &self.settings) else {
            return Ok(());
        };

        tokio::fs::create_dir_all(&session.dir).await?;

        let mut command = process_utils::detached_command(&self.settings.recorder_bin);
        command
            .args(session.recorder_args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null());

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                error!(
                    "{}",
                    crate::Error::SpawnFailed {
                        name: name.clone(),
                        source: e
                    }
                );
                return Ok(());
            }
        };

        let Some(pid) = child.id() else {
            warn!("Recorder for {name} exited before it could be registered");
            let _ = child.wait().await;
            return Ok(());
        };

        if let Err(e) = self.targets.assign_pid(&name, pid as i64).await {
            // Losing the durable marker means nothing may keep recording.
            error!("{e}");
            let _ = child.kill().await;
            return Ok(());
        }

        info!("Capturing {name}");

        let monitor = SessionMonitor {
            targets: self.targets.clone(),
            gate: self.gate.clone(),
            settings: self.settings.clone(),
            requests_tx: self.requests_tx.clone(),
        };
        tokio::spawn(monitor.run(child, session, pid));

        Ok(())
    }
}

/// Owns a session from spawn until the draining decision.
struct SessionMonitor {
    targets: Arc<dyn TargetRepository>,
    gate: RateGate,
    settings: Settings,
    requests_tx: mpsc::Sender<CaptureRequest>,
}

impl SessionMonitor {
    async fn run(self, mut child: tokio::process::Child, session: CaptureSession, pid: u32) {
        let mut tracker = ProgressTracker::default();

        if let Some(stdout) = child.stdout.take() {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                tracker.observe(&line);
                if tracker.limit_reached(session.capture_secs) {
                    break;
                }
            }
        }

        // EOF or the end marker: the recorder is done or about to be. Reap it.
        match child.wait().await {
            Ok(status) => debug!("Recorder for {} exited with {status}", session.name),
            Err(e) => warn!("Failed to reap recorder for {}: {e}", session.name),
        }

        let clean_cutoff = tracker.limit_reached(session.capture_secs);
        info!("{} from {} stopped", session.name, session.site);

        self.drain(session, pid, clean_cutoff).await;
    }

    /// Draining: let the remote side register the disconnect, re-read the
    /// target's state, clear the durable marker, then restart or stop.
    async fn drain(self, session: CaptureSession, pid: u32, clean_cutoff: bool) {
        self.gate
            .pause_if_recent(self.settings.rate_cooldown, "capture drain")
            .await;
        tokio::time::sleep(self.settings.drain_settle).await;

        let status = match self.targets.capture_status(&session.name).await {
            Ok(status) => status,
            Err(e) => {
                warn!("Could not re-read state for {}: {e}", session.name);
                None
            }
        };

        if let Err(e) = self.targets.clear_pid(pid as i64).await {
            warn!("Could not clear pid {pid} for {}: {e}", session.name);
        }

        match drain_outcome(status.as_ref()) {
            DrainOutcome::Stop => {
                info!("Capture chain stopped for {}", session.name);
            }
            DrainOutcome::Restart => {
                let domain = status
                    .as_ref()
                    .and_then(|s| s.domain.clone())
                    .or_else(|| session.domain.clone());

                let request = match domain {
                    // A clean full-length cutoff means the target was still
                    // live; chain straight back onto the known edge host.
                    Some(domain) if clean_cutoff => {
                        let url = synthesized_url(&session.name, &domain);
                        CaptureRequest::Resolved(ResolutionResult::from_known_domain(
                            &session.name,
                            url,
                            domain,
                        ))
                    }
                    _ => CaptureRequest::Reresolve(session.name.clone()),
                };

                if self.requests_tx.send(request).await.is_err() {
                    warn!(
                        "Capture supervisor is gone; {} will be picked up next cycle",
                        session.name
                    );
                }
            }
        }
    }
}
