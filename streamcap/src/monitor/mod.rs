//! Polling loops that watch the remote service.
//!
//! - Rate gating shared by every component that talks to the remote API
//! - Full room-listing scans feeding aggregate stats and the discovered set
//! - Followed-target liveness checks feeding the capture supervisor

mod online_poller;
mod rate_gate;
mod status_checker;

pub use online_poller::{OnlinePoller, batch_limit, page_offsets};
pub use rate_gate::RateGate;
pub use status_checker::{StatusChecker, partition_by_status};
