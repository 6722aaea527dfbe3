//! Runtime configuration.
//!
//! Typed defaults with environment overrides. The timing values mirror what
//! the remote service tolerates in practice; they are deliberately not all
//! exposed as knobs.

use std::path::PathBuf;
use std::time::Duration;

/// Default capture session length in seconds.
const DEFAULT_CAPTURE_SECS: u64 = 1800;

/// Inclusive delay range in seconds, sampled uniformly per sleep.
#[derive(Debug, Clone, Copy)]
pub struct DelayRange {
    pub min_secs: f64,
    pub max_secs: f64,
}

impl DelayRange {
    pub const fn new(min_secs: f64, max_secs: f64) -> Self {
        Self { min_secs, max_secs }
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    /// SQLite database URL.
    pub database_url: String,
    /// Root directory for recorded video files.
    pub video_dir: PathBuf,
    /// Directory for rolling log files.
    pub log_dir: PathBuf,
    /// Wall-clock length of one capture session, seconds.
    pub capture_secs: u64,
    /// Recorder binary to spawn.
    pub recorder_bin: String,

    /// Site display name and short slug used in paths and filenames.
    pub site_name: String,
    pub site_slug: String,

    /// Paginated room-listing endpoint; the page offset is appended.
    pub room_list_url: String,
    /// Per-room playback URL resolution endpoint.
    pub edge_url: String,
    /// Lightweight liveness probe host (stream thumbnail service).
    pub thumb_base: String,
    /// Referer base for resolution requests.
    pub referer_base: String,

    /// Rooms per listing page, also the status-probe group size.
    pub page_size: usize,
    /// Requests per listing batch before the inter-batch rest.
    pub batch_ceiling: usize,

    /// A remote call younger than this makes `recent_call()` true.
    pub rate_guard: Duration,
    /// Cool-down slept by pollers and the capture drain when the gate is hot.
    pub rate_cooldown: Duration,
    /// Shorter cool-down used by interactive console commands.
    pub console_cooldown: Duration,
    /// Fixed settle sleep after a recorder exits, before deciding restart.
    pub drain_settle: Duration,

    /// Per-request timeouts.
    pub probe_timeout: Duration,
    pub resolve_timeout: Duration,
    pub listing_timeout: Duration,
    /// Sleep after a listing page comes back non-200.
    pub page_failure_pause: Duration,

    /// Followed targets unseen for this many days are skipped by the checker.
    pub staleness_days: i64,

    /// Outer cadences and inter-batch delays, all randomized.
    pub poller_initial_delay: Duration,
    pub poller_cadence: DelayRange,
    pub checker_cadence: DelayRange,
    pub batch_rest: DelayRange,
    pub batch_rest_loaded: DelayRange,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_url: "sqlite:streamcap.sqlite3?mode=rwc".to_string(),
            video_dir: PathBuf::from("downloads/videos"),
            log_dir: PathBuf::from("logs"),
            capture_secs: DEFAULT_CAPTURE_SECS,
            recorder_bin: "ffmpeg".to_string(),
            site_name: "Chaturbate".to_string(),
            site_slug: "CB".to_string(),
            room_list_url:
                "https://chaturbate.com/api/ts/roomlist/room-list/?genders=f&limit=90&offset="
                    .to_string(),
            edge_url: "https://chaturbate.com/get_edge_hls_url_ajax/".to_string(),
            thumb_base: "https://jpeg.live.mmcdn.com".to_string(),
            referer_base: "https://chaturbate.com".to_string(),
            page_size: 90,
            batch_ceiling: 54,
            rate_guard: Duration::from_secs(100),
            rate_cooldown: Duration::from_secs(90),
            console_cooldown: Duration::from_secs(60),
            drain_settle: Duration::from_secs(9),
            probe_timeout: Duration::from_secs(9),
            resolve_timeout: Duration::from_secs(15),
            listing_timeout: Duration::from_secs(25),
            page_failure_pause: Duration::from_secs(17),
            staleness_days: 100,
            poller_initial_delay: Duration::from_secs(57),
            poller_cadence: DelayRange::new(601.05, 899.7),
            checker_cadence: DelayRange::new(290.05, 345.7),
            batch_rest: DelayRange::new(109.05, 150.78),
            batch_rest_loaded: DelayRange::new(62.05, 120.78),
        }
    }
}

impl Settings {
    /// Build settings from the environment on top of the defaults.
    ///
    /// Recognized variables: `DATABASE_URL`, `STREAMCAP_VIDEO_DIR`,
    /// `STREAMCAP_LOG_DIR`, `STREAMCAP_CAPTURE_SECS`, `STREAMCAP_FFMPEG`.
    pub fn from_env() -> Self {
        let mut settings = Self::default();

        if let Ok(url) = std::env::var("DATABASE_URL") {
            settings.database_url = url;
        }
        if let Ok(dir) = std::env::var("STREAMCAP_VIDEO_DIR") {
            settings.video_dir = PathBuf::from(dir);
        }
        if let Ok(dir) = std::env::var("STREAMCAP_LOG_DIR") {
            settings.log_dir = PathBuf::from(dir);
        }
        if let Ok(secs) = std::env::var("STREAMCAP_CAPTURE_SECS") {
            match secs.parse::<u64>() {
                Ok(parsed) if parsed > 0 => settings.capture_secs = parsed,
                _ => tracing::warn!(
                    "Ignoring invalid STREAMCAP_CAPTURE_SECS value: {:?}",
                    secs
                ),
            }
        }
        if let Ok(bin) = std::env::var("STREAMCAP_FFMPEG") {
            settings.recorder_bin = bin;
        }

        settings
    }
}
