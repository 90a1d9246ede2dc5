//! Monitor configuration.
//!
//! Every value has a default and can be overridden from the environment, so the
//! daemon runs without a config file.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use acoustic_core::{AcousticProfile, DeviationPolicy};
use serde::{Deserialize, Serialize};

use crate::error::{MonitorError, MonitorResult};

/// Timing, capacity and scoring settings for the monitor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Clip length requested by the baseline loop.
    pub baseline_clip: Duration,
    /// Clip length requested by the periodic sampling loop.
    pub sample_clip: Duration,
    /// Extra wait on top of the clip length before a capture counts as failed.
    pub capture_margin: Duration,
    /// Bound on a single classifier call.
    pub classify_timeout: Duration,
    /// Pause between consecutive baseline captures.
    pub baseline_rearm_delay: Duration,
    /// Pause after a transient capture or classification failure.
    pub retry_backoff: Duration,
    /// Pause when the baseline loop finds the sensor mid-capture.
    pub busy_retry_delay: Duration,
    /// Period of the global sampling tick.
    pub sample_interval: Duration,
    /// Maximum number of alerts retained.
    pub alert_capacity: usize,
    /// Number of raw baseline samples retained per sensor.
    pub baseline_history_limit: usize,
    pub deviation: DeviationPolicy,
    /// Profile substituted when a sensor cannot capture audio at all.
    pub synthetic_profile: AcousticProfile,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            baseline_clip: Duration::from_millis(1000),
            sample_clip: Duration::from_millis(30_000),
            capture_margin: Duration::from_millis(2000),
            classify_timeout: Duration::from_millis(30_000),
            baseline_rearm_delay: Duration::from_millis(100),
            retry_backoff: Duration::from_millis(2000),
            busy_retry_delay: Duration::from_millis(500),
            sample_interval: Duration::from_secs(60),
            alert_capacity: 50,
            baseline_history_limit: 3600,
            deviation: DeviationPolicy::default(),
            synthetic_profile: AcousticProfile::nominal(),
        }
    }
}

impl MonitorConfig {
    /// Defaults overridden by `ACOUSTIC_*` environment variables.
    pub fn from_env() -> MonitorResult<Self> {
        let defaults = Self::default();
        let config = Self {
            baseline_clip: env_millis("ACOUSTIC_BASELINE_CLIP_MS", defaults.baseline_clip)?,
            sample_clip: env_millis("ACOUSTIC_SAMPLE_CLIP_MS", defaults.sample_clip)?,
            capture_margin: env_millis("ACOUSTIC_CAPTURE_MARGIN_MS", defaults.capture_margin)?,
            classify_timeout: env_millis("ACOUSTIC_CLASSIFY_TIMEOUT_MS", defaults.classify_timeout)?,
            baseline_rearm_delay: env_millis(
                "ACOUSTIC_BASELINE_REARM_MS",
                defaults.baseline_rearm_delay,
            )?,
            retry_backoff: env_millis("ACOUSTIC_RETRY_BACKOFF_MS", defaults.retry_backoff)?,
            busy_retry_delay: env_millis("ACOUSTIC_BUSY_RETRY_MS", defaults.busy_retry_delay)?,
            sample_interval: env_parse::<u64>("ACOUSTIC_SAMPLE_INTERVAL_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.sample_interval),
            alert_capacity: env_parse("ACOUSTIC_ALERT_CAPACITY")?.unwrap_or(defaults.alert_capacity),
            baseline_history_limit: env_parse("ACOUSTIC_BASELINE_HISTORY")?
                .unwrap_or(defaults.baseline_history_limit),
            ..defaults
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> MonitorResult<()> {
        let durations = [
            ("baseline_clip", self.baseline_clip),
            ("sample_clip", self.sample_clip),
            ("capture_margin", self.capture_margin),
            ("classify_timeout", self.classify_timeout),
            ("baseline_rearm_delay", self.baseline_rearm_delay),
            ("retry_backoff", self.retry_backoff),
            ("busy_retry_delay", self.busy_retry_delay),
            ("sample_interval", self.sample_interval),
        ];
        if let Some((name, _)) = durations.iter().find(|(_, d)| d.is_zero()) {
            return Err(MonitorError::Config(format!("{name} must be greater than zero")));
        }
        if self.alert_capacity == 0 {
            return Err(MonitorError::Config("alert_capacity must be greater than zero".into()));
        }
        if self.baseline_history_limit == 0 {
            return Err(MonitorError::Config(
                "baseline_history_limit must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    /// How long a capture of `clip` may take before it counts as failed.
    pub fn capture_deadline(&self, clip: Duration) -> Duration {
        clip + self.capture_margin
    }
}

/// Settings used only by the `acoustic-monitor` daemon.
#[derive(Debug, Clone, PartialEq)]
pub struct DaemonConfig {
    pub redis_url: Option<String>,
    pub sensors_file: Option<PathBuf>,
    pub capture_command: String,
    pub classifier_command: String,
    pub classifier_args: Vec<String>,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            redis_url: std::env::var("REDIS_URL").ok(),
            sensors_file: std::env::var("ACOUSTIC_SENSORS_FILE").map(PathBuf::from).ok(),
            capture_command: std::env::var("ACOUSTIC_CAPTURE_CMD")
                .unwrap_or_else(|_| "arecord".to_string()),
            classifier_command: std::env::var("ACOUSTIC_CLASSIFIER_CMD")
                .unwrap_or_else(|_| "python3".to_string()),
            classifier_args: std::env::var("ACOUSTIC_CLASSIFIER_ARGS")
                .unwrap_or_else(|_| "classify.py".to_string())
                .split_whitespace()
                .map(str::to_string)
                .collect(),
        }
    }
}

fn env_parse<T: FromStr>(key: &str) -> MonitorResult<Option<T>> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| MonitorError::Config(format!("{key}: cannot parse {raw:?}"))),
        Err(_) => Ok(None),
    }
}

fn env_millis(key: &str, default: Duration) -> MonitorResult<Duration> {
    Ok(env_parse::<u64>(key)?
        .map(Duration::from_millis)
        .unwrap_or(default))
}
