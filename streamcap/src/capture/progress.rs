//! Recorder progress-stream parsing.
//!
//! With `-progress pipe:1` ffmpeg writes key=value lines to stdout:
//! periodic `out_time_ms=` elapsed markers (microseconds, despite the name)
//! and a terminal `progress=end`.

/// Parse an `out_time_ms=` line into elapsed whole seconds (rounded up).
pub fn parse_out_time_secs(line: &str) -> Option<u64> {
    let value = line.strip_prefix("out_time_ms=")?.trim();
    let micros: i64 = value.parse().ok()?;
    if micros < 0 {
        return None;
    }
    Some((micros as f64 / 1e6).ceil() as u64)
}

/// True for the terminal `progress=end` marker.
pub fn is_end_marker(line: &str) -> bool {
    matches!(line.trim().strip_prefix("progress="), Some("end"))
}

/// Accumulates progress markers for one session.
#[derive(Debug, Default)]
pub struct ProgressTracker {
    elapsed_secs: u64,
    ended: bool,
}

impl ProgressTracker {
    pub fn observe(&mut self, line: &str) {
        if let Some(secs) = parse_out_time_secs(line) {
            self.elapsed_secs = secs;
        }
        if is_end_marker(line) {
            self.ended = true;
        }
    }

    pub fn elapsed_secs(&self) -> u64 {
        self.elapsed_secs
    }

    /// The configured capture length was reached and the recorder flagged a
    /// clean end: the expected cutoff of a full-length session.
    pub fn limit_reached(&self, capture_secs: u64) -> bool {
        self.ended && self.elapsed_secs >= capture_secs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_time_is_microseconds_rounded_up() {
        assert_eq!(parse_out_time_secs("out_time_ms=1800000000"), Some(1800));
        assert_eq!(parse_out_time_secs("out_time_ms=1799000001"), Some(1800));
        assert_eq!(parse_out_time_secs("out_time_ms=0"), Some(0));
        assert_eq!(parse_out_time_secs("out_time_ms=-9223372036854775808"), None);
        assert_eq!(parse_out_time_secs("frame=100"), None);
        assert_eq!(parse_out_time_secs("out_time_ms=abc"), None);
    }

    #[test]
    fn end_marker_detection() {
        assert!(is_end_marker("progress=end"));
        assert!(!is_end_marker("progress=continue"));
        assert!(!is_end_marker("speed=1.0x"));
    }

    #[test]
    fn tracker_flags_a_clean_full_length_cutoff() {
        let mut tracker = ProgressTracker::default();
        tracker.observe("out_time_ms=900000000");
        tracker.observe("progress=continue");
        assert!(!tracker.limit_reached(1800));

        tracker.observe("out_time_ms=1800000000");
        assert!(!tracker.limit_reached(1800)); // no end marker yet

        tracker.observe("progress=end");
        assert!(tracker.limit_reached(1800));
        assert_eq!(tracker.elapsed_secs(), 1800);
    }

    #[test]
    fn early_end_is_not_a_limit_cutoff() {
        let mut tracker = ProgressTracker::default();
        tracker.observe("out_time_ms=120000000");
        tracker.observe("progress=end");
        assert!(!tracker.limit_reached(1800));
    }
}
