//! Worker configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Worker configuration, read from the environment.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Sleep between empty claim attempts
    pub poll_interval: Duration,
    /// Root for per-job scratch directories
    pub work_dir: PathBuf,
    /// Stable location for final artifacts
    pub output_dir: PathBuf,
    /// Kill any single FFmpeg invocation that exceeds this
    pub ffmpeg_timeout: Duration,
    /// Whether the stale-job sweeper runs at all
    pub stale_sweep_enabled: bool,
    /// Age at which a processing job counts as orphaned
    pub stale_after: Duration,
    /// Interval between sweeper runs
    pub sweep_interval: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            work_dir: PathBuf::from("/tmp/montage/work"),
            output_dir: PathBuf::from("/tmp/montage/renders"),
            ffmpeg_timeout: Duration::from_secs(600),
            stale_sweep_enabled: false,
            stale_after: Duration::from_secs(3600),
            sweep_interval: Duration::from_secs(60),
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            poll_interval: env_secs("WORKER_POLL_INTERVAL_SECS", defaults.poll_interval),
            work_dir: std::env::var("WORKER_WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.work_dir),
            output_dir: std::env::var("WORKER_OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.output_dir),
            ffmpeg_timeout: env_secs("WORKER_FFMPEG_TIMEOUT_SECS", defaults.ffmpeg_timeout),
            stale_sweep_enabled: std::env::var("MONTAGE_STALE_SWEEP")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(defaults.stale_sweep_enabled),
            stale_after: env_secs("WORKER_STALE_AFTER_SECS", defaults.stale_after),
            sweep_interval: env_secs("WORKER_SWEEP_INTERVAL_SECS", defaults.sweep_interval),
        }
    }
}

fn env_secs(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .map(Duration::from_secs)
        .unwrap_or(default)
}
