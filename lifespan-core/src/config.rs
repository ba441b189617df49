use std::time::Duration;

use crate::error::TtlError;

/// Environment variable holding the sweep interval in milliseconds
pub const INTERVAL_ENV: &str = "LIFESPAN_SWEEP_INTERVAL_MS";

/// Environment variable holding the entry lifespan in milliseconds
pub const LIFESPAN_ENV: &str = "LIFESPAN_TTL_MS";

/// Configuration shared by [`TtlMap`](crate::TtlMap) and [`TtlList`](crate::TtlList)
///
/// # Example
///
/// ```rust
/// use lifespan_core::TtlConfig;
/// use std::time::Duration;
///
/// let config = TtlConfig::default()
///     .with_interval(Duration::from_millis(50))
///     .with_lifespan(Duration::from_millis(500));
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TtlConfig {
    /// Time between background sweeps (default: 1 second). Must be non-zero.
    pub interval: Duration,
    /// How long an entry lives after it was stamped (default: 60 seconds)
    pub lifespan: Duration,
}

impl Default for TtlConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            lifespan: Duration::from_secs(60),
        }
    }
}

impl TtlConfig {
    /// Creates a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the sweep interval
    ///
    /// Expired entries may survive up to one interval past their lifespan.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Sets the entry lifespan
    pub fn with_lifespan(mut self, lifespan: Duration) -> Self {
        self.lifespan = lifespan;
        self
    }

    /// Create a configuration from environment variables.
    ///
    /// Reads:
    /// - `LIFESPAN_SWEEP_INTERVAL_MS` - sweep interval (defaults to 1000)
    /// - `LIFESPAN_TTL_MS` - entry lifespan (defaults to 60000)
    ///
    /// Missing or unparsable values fall back to the defaults. The result is
    /// not validated; a zero interval is rejected when a container is built.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let interval = read_millis(INTERVAL_ENV).unwrap_or(defaults.interval);
        let lifespan = read_millis(LIFESPAN_ENV).unwrap_or(defaults.lifespan);

        Self { interval, lifespan }
    }

    /// Checks that the interval is non-zero
    pub fn validate(&self) -> Result<(), TtlError> {
        validate_interval(self.interval)
    }
}

pub(crate) fn validate_interval(interval: Duration) -> Result<(), TtlError> {
    if interval.is_zero() {
        return Err(TtlError::Configuration(
            "sweep interval must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

fn read_millis(var: &str) -> Option<Duration> {
    std::env::var(var)
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_millis)
}
