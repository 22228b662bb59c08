//! Stream session configuration.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::StreamError;

/// When the chunk buffer hands accumulated fragments to the transport.
///
/// Serialized externally tagged, e.g. `flush_threshold = { fragments = 3 }`
/// or `flush_threshold = { bytes = 4096 }` in TOML.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlushThreshold {
    /// Flush once this many fragments are pending.
    Fragments(usize),
    /// Flush once at least this many bytes are pending.
    Bytes(usize),
}

impl FlushThreshold {
    /// Flush every fragment as its own chunk.
    pub const UNBUFFERED: Self = Self::Fragments(1);

    /// Check if the threshold is reached.
    pub fn is_reached(&self, pending_fragments: usize, pending_bytes: usize) -> bool {
        match *self {
            Self::Fragments(limit) => pending_fragments >= limit,
            Self::Bytes(limit) => pending_bytes >= limit,
        }
    }

    /// Check if every fragment is flushed on its own.
    pub fn is_unbuffered(&self) -> bool {
        matches!(self, Self::Fragments(1) | Self::Bytes(1))
    }

    fn validate(&self) -> Result<(), StreamError> {
        match *self {
            Self::Fragments(0) => Err(StreamError::InvalidConfig(
                "flush_threshold.fragments must be at least 1".to_string(),
            )),
            Self::Bytes(0) => Err(StreamError::InvalidConfig(
                "flush_threshold.bytes must be at least 1".to_string(),
            )),
            _ => Ok(()),
        }
    }
}

impl Default for FlushThreshold {
    fn default() -> Self {
        Self::UNBUFFERED
    }
}

impl fmt::Display for FlushThreshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fragments(n) => write!(f, "{} fragment(s)", n),
            Self::Bytes(n) => write!(f, "{} byte(s)", n),
        }
    }
}

/// How a session realizes the per-item wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionModel {
    /// Suspend on the async timer; no thread is held while waiting.
    #[default]
    Cooperative,
    /// Park a dedicated thread for the duration of each wait.
    Blocking,
}

impl ExecutionModel {
    /// Parse from a config or query string value.
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "cooperative" | "async" => Some(Self::Cooperative),
            "blocking" | "thread" => Some(Self::Blocking),
            _ => None,
        }
    }
}

impl fmt::Display for ExecutionModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cooperative => write!(f, "cooperative"),
            Self::Blocking => write!(f, "blocking"),
        }
    }
}

/// Configuration for a single stream session.
///
/// `items` and `delay_ms` have no defaults and must always be supplied.
/// `delay_ms` may be fractional, e.g. `delay_ms = 0.25` for 250µs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Number of items the source yields.
    pub items: usize,
    /// Wait before each item.
    #[serde(rename = "delay_ms", with = "delay_millis")]
    pub delay: Duration,
    /// Chunk buffering policy.
    #[serde(default)]
    pub flush_threshold: FlushThreshold,
    /// Fixed shuffle seed. A fresh random order is drawn when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl StreamConfig {
    /// Create a new stream configuration.
    pub fn new(items: usize, delay: Duration) -> Self {
        Self {
            items,
            delay,
            flush_threshold: FlushThreshold::default(),
            seed: None,
        }
    }

    /// Set the flush threshold.
    pub fn with_flush_threshold(mut self, threshold: FlushThreshold) -> Self {
        self.flush_threshold = threshold;
        self
    }

    /// Fix the shuffle seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Per-item delay.
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Lower bound on the time needed to exhaust the source.
    pub fn minimum_duration(&self) -> Duration {
        self.delay()
            .saturating_mul(u32::try_from(self.items).unwrap_or(u32::MAX))
    }

    /// Reject configurations the pipeline cannot honor.
    pub fn validate(&self) -> Result<(), StreamError> {
        self.flush_threshold.validate()?;
        if self.items > u32::MAX as usize {
            return Err(StreamError::InvalidConfig(format!(
                "items must not exceed {}",
                u32::MAX
            )));
        }
        Ok(())
    }
}

/// `delay_ms` as whole or fractional milliseconds, without losing
/// sub-millisecond precision.
mod delay_millis {
    use std::time::Duration;

    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    const NANOS_PER_MILLI: u128 = 1_000_000;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Millis {
        Whole(u64),
        Fractional(f64),
    }

    pub fn serialize<S: Serializer>(delay: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        let nanos = delay.as_nanos();
        if nanos % NANOS_PER_MILLI == 0 {
            serializer.serialize_u64(u64::try_from(nanos / NANOS_PER_MILLI).unwrap_or(u64::MAX))
        } else {
            serializer.serialize_f64(nanos as f64 / NANOS_PER_MILLI as f64)
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        match Millis::deserialize(deserializer)? {
            Millis::Whole(ms) => Ok(Duration::from_millis(ms)),
            Millis::Fractional(ms) => {
                let nanos = (ms * NANOS_PER_MILLI as f64).round();
                if !nanos.is_finite() || nanos < 0.0 || nanos >= u64::MAX as f64 {
                    return Err(D::Error::custom(format!("invalid delay_ms {}", ms)));
                }
                Ok(Duration::from_nanos(nanos as u64))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_threshold_is_unbuffered() {
        assert_eq!(FlushThreshold::default(), FlushThreshold::Fragments(1));
        assert!(FlushThreshold::default().is_unbuffered());
    }

    #[test]
    fn test_threshold_reached() {
        let by_count = FlushThreshold::Fragments(3);
        assert!(!by_count.is_reached(2, 1000));
        assert!(by_count.is_reached(3, 0));

        let by_size = FlushThreshold::Bytes(16);
        assert!(!by_size.is_reached(10, 15));
        assert!(by_size.is_reached(1, 16));
    }

    #[test]
    fn test_zero_threshold_rejected() {
        let config = StreamConfig::new(3, Duration::from_millis(10))
            .with_flush_threshold(FlushThreshold::Fragments(0));
        assert!(matches!(
            config.validate(),
            Err(StreamError::InvalidConfig(_))
        ));

        let config = config.with_flush_threshold(FlushThreshold::Bytes(0));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_minimum_duration() {
        let config = StreamConfig::new(5, Duration::from_secs(1));
        assert_eq!(config.minimum_duration(), Duration::from_secs(5));

        let empty = StreamConfig::new(0, Duration::from_secs(1));
        assert_eq!(empty.minimum_duration(), Duration::ZERO);
    }

    #[test]
    fn test_sub_millisecond_delay_is_kept() {
        let config = StreamConfig::new(10, Duration::from_micros(900));
        assert_eq!(config.delay(), Duration::from_micros(900));
        assert_eq!(config.minimum_duration(), Duration::from_micros(9000));

        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["delay_ms"], 0.9);
        let parsed: StreamConfig = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, config);

        let whole = serde_json::to_value(StreamConfig::new(1, Duration::from_millis(5))).unwrap();
        assert_eq!(whole["delay_ms"], 5);
    }

    #[test]
    fn test_parse_fractional_delay() {
        let config: StreamConfig = toml::from_str("items = 2\ndelay_ms = 0.25\n").unwrap();
        assert_eq!(config.delay(), Duration::from_micros(250));

        let negative: Result<StreamConfig, _> = toml::from_str("items = 2\ndelay_ms = -1.0\n");
        assert!(negative.is_err());
    }

    #[test]
    fn test_parse_toml_with_threshold() {
        let config: StreamConfig = toml::from_str(
            r#"
            items = 10
            delay_ms = 100
            flush_threshold = { fragments = 3 }
            "#,
        )
        .unwrap();

        assert_eq!(config.items, 10);
        assert_eq!(config.delay(), Duration::from_millis(100));
        assert_eq!(config.flush_threshold, FlushThreshold::Fragments(3));
        assert_eq!(config.seed, None);
    }

    #[test]
    fn test_missing_items_is_an_error() {
        let parsed: Result<StreamConfig, _> = serde_json::from_str(r#"{"delay_ms": 5}"#);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_execution_model_parse() {
        assert_eq!(ExecutionModel::parse("Blocking"), Some(ExecutionModel::Blocking));
        assert_eq!(ExecutionModel::parse("async"), Some(ExecutionModel::Cooperative));
        assert_eq!(ExecutionModel::parse("threads"), None);
    }
}
