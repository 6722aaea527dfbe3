//! Startup reconciliation of persisted recorder pids.
//!
//! A session's draining step never runs when the process dies uncleanly,
//! leaving rows that claim a recording with no process behind it. This runs
//! once at boot, before any poller, and clears those ghosts.

use tracing::{debug, info, warn};

use crate::database::repositories::TargetRepository;

/// Cross-check every persisted pid against the OS process table.
///
/// Only a definitive "no such process" clears a row; anything ambiguous is
/// left alone so a live session is never clobbered. Never fails the boot.
pub async fn reconcile(targets: &dyn TargetRepository) {
    let active = match targets.active_pids().await {
        Ok(active) => active,
        Err(e) => {
            warn!("Could not read persisted pids: {e}");
            return;
        }
    };

    if active.is_empty() {
        return;
    }

    info!("Validating previous capture activity");

    for (name, pid) in active {
        let Ok(pid_u32) = u32::try_from(pid) else {
            warn!("Persisted pid {pid} for {name} is out of range; leaving it");
            continue;
        };

        if process_utils::process_exists(pid_u32) {
            continue;
        }

        if let Err(e) = targets.clear_pid(pid).await {
            warn!("Could not clear stale pid {pid} for {name}: {e}");
        } else {
            debug!("Clearing inactive capture status for {name}");
        }
    }
}
