//! Recording-session lifecycle: construction, progress monitoring, and the
//! supervisor state machine that chains sessions while a target stays live.

mod progress;
mod session;
mod supervisor;

pub use progress::{ProgressTracker, is_end_marker, parse_out_time_secs};
pub use session::{CaptureSession, synthesized_url};
pub use supervisor::{CaptureRequest, CaptureSupervisor, DrainOutcome, drain_outcome};
