// Engine configuration
//
// EngineConfig can be created directly, tuned with the `with_*` builder methods,
// or loaded from BAYSYNC_* environment variables. The grace period and the
// automatic suppression window are deliberately separate settings.

use std::env;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Configuration for one engine instance
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EngineConfig {
    /// Window within which identical notifications collapse into one
    #[serde(with = "duration_millis")]
    pub dedup_window: Duration,

    /// Maximum notifications kept in the global list
    pub max_notifications: usize,

    /// Time after a call during which automatic delay detection stays quiet
    #[serde(with = "duration_millis")]
    pub grace_period: Duration,

    /// Minimum time between two automatic delay alerts for one (slot, driver)
    #[serde(with = "duration_millis")]
    pub auto_suppression: Duration,

    /// Age beyond which a time event is considered stale for elapsed display
    #[serde(with = "duration_millis")]
    pub stale_after: Duration,

    /// How often the delay monitor scans called slots
    #[serde(with = "duration_millis")]
    pub monitor_interval: Duration,

    /// Buffer size of each in-process signal channel
    pub signal_capacity: usize,

    /// Whether delay alerts trigger an audio cue
    pub audio_enabled: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            dedup_window: Duration::from_secs(30),
            max_notifications: 50,
            grace_period: Duration::from_secs(120),
            auto_suppression: Duration::from_secs(60),
            stale_after: Duration::from_secs(24 * 60 * 60),
            monitor_interval: Duration::from_secs(15),
            signal_capacity: 256,
            audio_enabled: true,
        }
    }
}

impl EngineConfig {
    /// Create a new configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Create configuration from environment variables
    ///
    /// Environment variables (durations in milliseconds):
    /// - `BAYSYNC_DEDUP_WINDOW_MS` (default: 30000)
    /// - `BAYSYNC_MAX_NOTIFICATIONS` (default: 50)
    /// - `BAYSYNC_GRACE_PERIOD_MS` (default: 120000)
    /// - `BAYSYNC_AUTO_SUPPRESSION_MS` (default: 60000)
    /// - `BAYSYNC_STALE_AFTER_MS` (default: 86400000)
    /// - `BAYSYNC_MONITOR_INTERVAL_MS` (default: 15000)
    /// - `BAYSYNC_SIGNAL_CAPACITY` (default: 256)
    /// - `BAYSYNC_AUDIO_ENABLED` (default: true)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            dedup_window: env_millis("BAYSYNC_DEDUP_WINDOW_MS", defaults.dedup_window),
            max_notifications: env_parse("BAYSYNC_MAX_NOTIFICATIONS", defaults.max_notifications),
            grace_period: env_millis("BAYSYNC_GRACE_PERIOD_MS", defaults.grace_period),
            auto_suppression: env_millis("BAYSYNC_AUTO_SUPPRESSION_MS", defaults.auto_suppression),
            stale_after: env_millis("BAYSYNC_STALE_AFTER_MS", defaults.stale_after),
            monitor_interval: env_millis("BAYSYNC_MONITOR_INTERVAL_MS", defaults.monitor_interval),
            signal_capacity: env_parse("BAYSYNC_SIGNAL_CAPACITY", defaults.signal_capacity),
            audio_enabled: env::var("BAYSYNC_AUDIO_ENABLED")
                .map(|v| v.to_lowercase() == "true" || v == "1")
                .unwrap_or(defaults.audio_enabled),
        }
    }

    /// Set the notification dedup window
    pub fn with_dedup_window(mut self, window: Duration) -> Self {
        self.dedup_window = window;
        self
    }

    /// Set the notification list bound
    pub fn with_max_notifications(mut self, max: usize) -> Self {
        self.max_notifications = max.max(1);
        self
    }

    /// Set the post-call grace period
    pub fn with_grace_period(mut self, grace: Duration) -> Self {
        self.grace_period = grace;
        self
    }

    /// Set the automatic delay suppression window
    pub fn with_auto_suppression(mut self, window: Duration) -> Self {
        self.auto_suppression = window;
        self
    }

    /// Set the stale cutoff for elapsed display
    pub fn with_stale_after(mut self, stale_after: Duration) -> Self {
        self.stale_after = stale_after;
        self
    }

    /// Set the delay monitor scan interval
    pub fn with_monitor_interval(mut self, interval: Duration) -> Self {
        self.monitor_interval = interval;
        self
    }

    /// Set the in-process signal buffer size
    pub fn with_signal_capacity(mut self, capacity: usize) -> Self {
        self.signal_capacity = capacity.max(1);
        self
    }

    /// Enable or disable the audio cue
    pub fn with_audio(mut self, enabled: bool) -> Self {
        self.audio_enabled = enabled;
        self
    }
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    match env::var(name) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!(name, value = %raw, "Invalid value in environment, using default");
            default
        }),
        Err(_) => default,
    }
}

fn env_millis(name: &str, default: Duration) -> Duration {
    Duration::from_millis(env_parse(name, default.as_millis() as u64))
}

/// Serde support for Duration as milliseconds
mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();

        assert_eq!(config.dedup_window, Duration::from_secs(30));
        assert_eq!(config.max_notifications, 50);
        assert_eq!(config.grace_period, Duration::from_secs(120));
        assert_eq!(config.auto_suppression, Duration::from_secs(60));
        assert_eq!(config.stale_after, Duration::from_secs(86_400));
        assert!(config.audio_enabled);
    }

    #[test]
    fn test_builder() {
        let config = EngineConfig::new()
            .with_dedup_window(Duration::from_secs(5))
            .with_max_notifications(0)
            .with_grace_period(Duration::from_secs(10))
            .with_auto_suppression(Duration::from_secs(20))
            .with_audio(false);

        assert_eq!(config.dedup_window, Duration::from_secs(5));
        assert_eq!(config.max_notifications, 1);
        assert_eq!(config.grace_period, Duration::from_secs(10));
        assert_eq!(config.auto_suppression, Duration::from_secs(20));
        assert!(!config.audio_enabled);
    }

    #[test]
    fn test_serialization_uses_millis() {
        let config = EngineConfig::default();
        let json = serde_json::to_value(&config).unwrap();

        assert_eq!(json["dedup_window"], 30_000);
        assert_eq!(json["grace_period"], 120_000);

        let parsed: EngineConfig = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, config);
    }
}
