//! Configuration for listener timeouts and polling

use std::time::Duration;

use tracing::warn;

/// Tunable timing parameters for the listener subsystem
#[derive(Debug, Clone)]
pub struct Config {
    /// How long `start` waits for the worker to confirm hook registration
    pub start_timeout: Duration,

    /// How long `stop`/`unload` block waiting for confirmed termination
    pub stop_timeout: Duration,

    /// How long the hook adapter waits for its hook thread to exit during
    /// unregistration before reporting `TeardownTimeout`
    pub teardown_timeout: Duration,

    /// Sampling interval of the polling hook adapter
    pub poll_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            start_timeout: Duration::from_secs(2),
            stop_timeout: Duration::from_secs(3),
            teardown_timeout: Duration::from_secs(2),
            poll_interval: Duration::from_millis(10),
        }
    }
}

impl Config {
    /// Load configuration, with `KEYWATCH_*_MS` environment overrides on
    /// top of the defaults. Unparsable values are warned about and ignored.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(ms) = read_ms("KEYWATCH_START_TIMEOUT_MS") {
            config.start_timeout = ms;
        }
        if let Some(ms) = read_ms("KEYWATCH_STOP_TIMEOUT_MS") {
            config.stop_timeout = ms;
        }
        if let Some(ms) = read_ms("KEYWATCH_TEARDOWN_TIMEOUT_MS") {
            config.teardown_timeout = ms;
        }
        if let Some(ms) = read_ms("KEYWATCH_POLL_INTERVAL_MS") {
            config.poll_interval = ms;
        }

        config
    }
}

fn read_ms(var: &str) -> Option<Duration> {
    let raw = std::env::var(var).ok()?;
    match raw.parse::<u64>() {
        Ok(ms) => Some(Duration::from_millis(ms)),
        Err(_) => {
            warn!(var, value = %raw, "ignoring unparsable timeout override");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.start_timeout, Duration::from_secs(2));
        assert_eq!(config.stop_timeout, Duration::from_secs(3));
        assert!(config.poll_interval < config.stop_timeout);
    }

    // One test for all env-var cases: the variables are process-global
    // and tests run in parallel, so split tests would race each other
    #[test]
    fn test_env_overrides() {
        std::env::set_var("KEYWATCH_STOP_TIMEOUT_MS", "1500");
        std::env::set_var("KEYWATCH_START_TIMEOUT_MS", "soon");

        let config = Config::from_env();
        assert_eq!(config.stop_timeout, Duration::from_millis(1500));
        // Unparsable value keeps the default
        assert_eq!(config.start_timeout, Duration::from_secs(2));
        // Unset variables keep theirs
        assert_eq!(config.teardown_timeout, Duration::from_secs(2));

        std::env::remove_var("KEYWATCH_STOP_TIMEOUT_MS");
        std::env::remove_var("KEYWATCH_START_TIMEOUT_MS");
    }
}
