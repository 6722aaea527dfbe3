//! Capture session construction.
//!
//! A session is the in-memory description of one bounded recording attempt:
//! resolved URL, output location, recorder metadata, and the argv handed to
//! the recorder process. Only the spawned pid outlives it.

use std::path::PathBuf;

use chrono::Local;
use rand::Rng;
use rand::distr::Alphanumeric;

use crate::config::Settings;
use crate::resolver::ResolutionResult;

/// One bounded-duration recording attempt. Owned by the supervisor during
/// spawning, then by the session's monitor task.
#[derive(Debug, Clone)]
pub struct CaptureSession {
    pub name: String,
    pub site: String,
    pub url: String,
    pub domain: Option<String>,
    pub dir: PathBuf,
    pub file: PathBuf,
    pub capture_secs: u64,
}

impl CaptureSession {
    /// Build a session from a successful live resolution. Returns `None`
    /// when the resolution carries no URL.
    pub fn build(resolution: &ResolutionResult, settings: &Settings) -> Option<Self> {
        let url = resolution.url.clone()?;
        let dir = settings
            .video_dir
            .join(&settings.site_name)
            .join(&resolution.name);
        let file = dir.join(filename(&resolution.name, &settings.site_slug));

        Some(Self {
            name: resolution.name.clone(),
            site: settings.site_name.clone(),
            url,
            domain: resolution.domain.clone(),
            dir,
            file,
            capture_secs: settings.capture_secs,
        })
    }

    /// Recorder argv: bounded duration, stream copy without re-encoding,
    /// machine-readable progress on stdout, and `+faststart` so a partial
    /// file stays playable.
    pub fn recorder_args(&self) -> Vec<String> {
        let mut args = vec![
            "-hide_banner".to_string(),
            "-loglevel".to_string(),
            "error".to_string(),
            "-progress".to_string(),
            "pipe:1".to_string(),
            "-i".to_string(),
            self.url.clone(),
        ];
        args.extend(metadata_args(&self.name, &self.site));
        args.extend([
            "-t".to_string(),
            self.capture_secs.to_string(),
            "-c:v".to_string(),
            "copy".to_string(),
            "-c:a".to_string(),
            "copy".to_string(),
            "-movflags".to_string(),
            "+faststart".to_string(),
            self.file.to_string_lossy().into_owned(),
        ]);
        args
    }
}

/// `{name} [SLUG] (%Y-%m-%d) %H%M%S.mkv`
fn filename(name: &str, slug: &str) -> String {
    let now = Local::now();
    format!(
        "{name} [{}] {}.mkv",
        slug.to_uppercase(),
        now.format("(%Y-%m-%d) %H%M%S")
    )
}

/// Descriptive container tags, rendered as `-metadata key=value` pairs.
fn metadata_args(name: &str, site: &str) -> Vec<String> {
    let today = Local::now().format("%Y-%m-%d").to_string();
    let tags = [
        ("title", format!("{name} Live - {today}")),
        ("artist", name.to_string()),
        ("album_artist", name.to_string()),
        ("publisher", site.to_string()),
        ("description", format!("{name} live cam performance on {today}")),
        ("genre", "webcam".to_string()),
        ("copyright", "Creative Commons".to_string()),
        ("album", format!("{name} {site}")),
        ("date", today.clone()),
        ("year", today),
    ];

    let mut args = Vec::with_capacity(tags.len() * 2);
    for (key, value) in tags {
        args.push("-metadata".to_string());
        args.push(format!("{key}={value}"));
    }
    args
}

/// Playback URL synthesized from a known edge domain, used to chain the next
/// session after a clean time-limit cutoff without another remote call.
pub fn synthesized_url(name: &str, domain: &str) -> String {
    let mut rng = rand::rng();
    let nonce: String = (0..64)
        .map(|_| rng.sample(Alphanumeric) as char)
        .collect::<String>()
        .to_lowercase();
    format!("https://{domain}/live-hls/amlst:{name}-sd-{nonce}_trns_h264/playlist.m3u8")
}
