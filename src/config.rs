//! Runtime tunables, with environment overrides.

use std::time::Duration;

use thiserror::Error;

/// Overrides [`ScoringConfig::subscription_buffer`].
pub const SUBSCRIPTION_BUFFER_VAR: &str = "BROKER_SUBSCRIPTION_BUFFER_DEFAULT";
/// Overrides [`ScoringConfig::publish_interval`].
pub const PUBLISH_INTERVAL_VAR: &str = "ENGINE_PUBLISH_INTERVAL";
/// Overrides [`ScoringConfig::poll_interval`].
pub const POLL_INTERVAL_VAR: &str = "MANAGER_POLL_INTERVAL";
/// Overrides [`ScoringConfig::persist_interval`].
pub const PERSIST_INTERVAL_VAR: &str = "KEEPER_PERSIST_INTERVAL";
/// Overrides [`ScoringConfig::start_window`].
pub const START_WINDOW_VAR: &str = "MANAGER_START_WINDOW";

/// Configuration loading errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// An environment value could not be parsed.
    #[error("invalid value {value:?} for {key}")]
    InvalidValue {
        /// Environment variable name.
        key: &'static str,
        /// Raw value that failed to parse.
        value: String,
    },
}

/// Timing and buffering knobs shared by the runtime tasks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoringConfig {
    /// Buffer size for outside subscribers such as SSE streams; 0 is
    /// unbounded. Engine drivers and the keeper always subscribe unbounded.
    pub subscription_buffer: usize,
    /// How often a driver publishes dirty scores.
    pub publish_interval: Duration,
    /// How often the manager looks for contests to start.
    pub poll_interval: Duration,
    /// How often the keeper flushes scores to the repository.
    pub persist_interval: Duration,
    /// Contests starting within this distance of now get an engine.
    pub start_window: Duration,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            subscription_buffer: 0,
            publish_interval: Duration::from_millis(100),
            poll_interval: Duration::from_secs(10),
            persist_interval: Duration::from_secs(60),
            start_window: Duration::from_secs(60 * 60),
        }
    }
}

impl ScoringConfig {
    /// Defaults overlaid with the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Overlays the defaults with whatever `lookup` returns per variable name.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(value) = lookup(SUBSCRIPTION_BUFFER_VAR) {
            config.subscription_buffer = value.trim().parse().map_err(|_| ConfigError::InvalidValue {
                key: SUBSCRIPTION_BUFFER_VAR,
                value: value.clone(),
            })?;
        }

        let durations: [(&'static str, &mut Duration); 4] = [
            (PUBLISH_INTERVAL_VAR, &mut config.publish_interval),
            (POLL_INTERVAL_VAR, &mut config.poll_interval),
            (PERSIST_INTERVAL_VAR, &mut config.persist_interval),
            (START_WINDOW_VAR, &mut config.start_window),
        ];

        for (key, slot) in durations {
            if let Some(value) = lookup(key) {
                *slot = parse_duration(&value).ok_or(ConfigError::InvalidValue { key, value })?;
            }
        }

        Ok(config)
    }
}

/// Parses `250ms`, `10s`, `5m`, `1h` or a bare millisecond count.
pub fn parse_duration(raw: &str) -> Option<Duration> {
    let raw = raw.trim();

    let (digits, unit) = match raw.find(|c: char| !c.is_ascii_digit()) {
        Some(idx) => raw.split_at(idx),
        None => (raw, "ms"),
    };

    let n: u64 = digits.parse().ok()?;

    match unit {
        "ms" => Some(Duration::from_millis(n)),
        "s" => Some(Duration::from_secs(n)),
        "m" => Some(Duration::from_secs(n.checked_mul(60)?)),
        "h" => Some(Duration::from_secs(n.checked_mul(60 * 60)?)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use hashbrown::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_without_overrides() {
        let config = ScoringConfig::from_lookup(lookup(&[])).expect("config");
        assert_eq!(config, ScoringConfig::default());
        assert_eq!(config.publish_interval, Duration::from_millis(100));
        assert_eq!(config.poll_interval, Duration::from_secs(10));
    }

    #[test]
    fn overrides_apply() {
        let config = ScoringConfig::from_lookup(lookup(&[
            (SUBSCRIPTION_BUFFER_VAR, "128"),
            (PUBLISH_INTERVAL_VAR, "250ms"),
            (POLL_INTERVAL_VAR, "30s"),
            (PERSIST_INTERVAL_VAR, "2m"),
            (START_WINDOW_VAR, "2h"),
        ]))
        .expect("config");

        assert_eq!(config.subscription_buffer, 128);
        assert_eq!(config.publish_interval, Duration::from_millis(250));
        assert_eq!(config.poll_interval, Duration::from_secs(30));
        assert_eq!(config.persist_interval, Duration::from_secs(120));
        assert_eq!(config.start_window, Duration::from_secs(7200));
    }

    #[test]
    fn bare_number_is_milliseconds() {
        assert_eq!(parse_duration("500"), Some(Duration::from_millis(500)));
        assert_eq!(parse_duration("1x"), None);
        assert_eq!(parse_duration("ms"), None);
    }

    #[test]
    fn invalid_value_names_the_key() {
        let err = ScoringConfig::from_lookup(lookup(&[(POLL_INTERVAL_VAR, "soon")])).expect_err("invalid");
        assert_eq!(
            err,
            ConfigError::InvalidValue {
                key: POLL_INTERVAL_VAR,
                value: "soon".to_string()
            }
        );
    }
}
