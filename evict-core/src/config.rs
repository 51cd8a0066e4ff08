//! Immutable per-run configuration.

use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unsupported control-plane protocol version {0:?} (expected \"v3\" or \"v4\")")]
    UnsupportedProtocolVersion(String),
}

/// Control-plane protocol variant, fixed at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlVersion {
    V3,
    V4,
}

impl FromStr for ControlVersion {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "v3" => Ok(Self::V3),
            "v4" => Ok(Self::V4),
            other => Err(ConfigError::UnsupportedProtocolVersion(other.to_string())),
        }
    }
}

impl std::fmt::Display for ControlVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::V3 => write!(f, "v3"),
            Self::V4 => write!(f, "v4"),
        }
    }
}

/// Operator-facing parameters, immutable for the lifetime of the run.
#[derive(Debug, Clone)]
pub struct EvictorConfig {
    /// Metrics backend address.
    pub metrics_address: String,
    /// Control-plane address.
    pub control_address: String,
    /// Control-plane protocol variant.
    pub control_version: ControlVersion,
    /// Cap on concurrently evicted stores.
    pub max_evicted: usize,
    /// Tick interval of the control loop.
    pub interval: Duration,
    /// Latency threshold separating good from bad readings.
    pub threshold: Duration,
    /// How long latency must stay above threshold before eviction.
    pub pending_for_evict: Duration,
    /// How long latency must stay below threshold before recovery.
    pub pending_for_recover: Duration,
    /// Bad links required before a node is Unhealthy rather than Unstable.
    pub bad_link_fuse: u32,
}

impl EvictorConfig {
    /// Minimum lookback that guarantees the evaluator enough history to
    /// assert either sustained condition.
    pub fn required_max_time_range(&self) -> Duration {
        self.interval
            .max(self.pending_for_evict)
            .max(self.pending_for_recover)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(interval: u64, evict: u64, recover: u64) -> EvictorConfig {
        EvictorConfig {
            metrics_address: "http://localhost:9090".to_string(),
            control_address: "http://localhost:2379".to_string(),
            control_version: ControlVersion::V3,
            max_evicted: 10,
            interval: Duration::from_secs(interval),
            threshold: Duration::from_secs(1),
            pending_for_evict: Duration::from_secs(evict),
            pending_for_recover: Duration::from_secs(recover),
            bad_link_fuse: 1,
        }
    }

    #[test]
    fn required_range_is_max_of_three_durations() {
        assert_eq!(
            config(15, 60, 30).required_max_time_range(),
            Duration::from_secs(60)
        );
        assert_eq!(
            config(120, 60, 30).required_max_time_range(),
            Duration::from_secs(120)
        );
        assert_eq!(
            config(15, 60, 90).required_max_time_range(),
            Duration::from_secs(90)
        );
    }

    #[test]
    fn version_parses_known_variants() {
        assert_eq!("v3".parse::<ControlVersion>().unwrap(), ControlVersion::V3);
        assert_eq!("v4".parse::<ControlVersion>().unwrap(), ControlVersion::V4);
    }

    #[test]
    fn version_rejects_unknown_variant() {
        let err = "v5".parse::<ControlVersion>().unwrap_err();
        assert!(matches!(err, ConfigError::UnsupportedProtocolVersion(v) if v == "v5"));
    }
}
