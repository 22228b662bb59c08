//! Per-request overrides from the query string.

use std::time::Duration;

use edge_sdk::prelude::{ExecutionModel, FlushThreshold, StreamConfig, StreamError};
use serde::Deserialize;

/// `?n=&delay_ms=&flush=&flush_bytes=&seed=&mode=`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StreamQuery {
    /// Item count.
    pub n: Option<usize>,
    /// Per-item delay in milliseconds.
    pub delay_ms: Option<u64>,
    /// Flush every `flush` fragments.
    pub flush: Option<usize>,
    /// Flush once `flush_bytes` bytes are pending.
    pub flush_bytes: Option<usize>,
    /// Fixed shuffle seed.
    pub seed: Option<u64>,
    /// `cooperative` or `blocking`.
    pub mode: Option<String>,
}

impl StreamQuery {
    /// Apply the overrides on top of `defaults`.
    pub fn resolve(
        &self,
        defaults: &StreamConfig,
        execution: ExecutionModel,
        max_items: usize,
    ) -> Result<(StreamConfig, ExecutionModel), StreamError> {
        let items = self.n.unwrap_or(defaults.items);
        if items > max_items {
            return Err(StreamError::InvalidConfig(format!(
                "n={} exceeds the limit of {}",
                items, max_items
            )));
        }

        let delay = self
            .delay_ms
            .map(Duration::from_millis)
            .unwrap_or_else(|| defaults.delay());
        let mut config = StreamConfig::new(items, delay)
            .with_flush_threshold(self.threshold(defaults.flush_threshold)?);
        config.seed = self.seed.or(defaults.seed);
        config.validate()?;

        let execution = match &self.mode {
            Some(mode) => ExecutionModel::parse(mode).ok_or_else(|| {
                StreamError::InvalidConfig(format!("unknown mode `{}`", mode))
            })?,
            None => execution,
        };

        Ok((config, execution))
    }

    fn threshold(&self, default: FlushThreshold) -> Result<FlushThreshold, StreamError> {
        match (self.flush, self.flush_bytes) {
            (Some(_), Some(_)) => Err(StreamError::InvalidConfig(
                "flush and flush_bytes are mutually exclusive".to_string(),
            )),
            (Some(fragments), None) => Ok(FlushThreshold::Fragments(fragments)),
            (None, Some(bytes)) => Ok(FlushThreshold::Bytes(bytes)),
            (None, None) => Ok(default),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defaults() -> StreamConfig {
        StreamConfig::new(5, Duration::from_secs(1))
    }

    #[test]
    fn test_empty_query_keeps_defaults() {
        let (config, execution) = StreamQuery::default()
            .resolve(&defaults(), ExecutionModel::Blocking, 100)
            .unwrap();
        assert_eq!(config, defaults());
        assert_eq!(execution, ExecutionModel::Blocking);
    }

    #[test]
    fn test_overrides_apply() {
        let query = StreamQuery {
            n: Some(10),
            delay_ms: Some(100),
            flush: Some(3),
            seed: Some(4),
            mode: Some("blocking".to_string()),
            ..Default::default()
        };
        let (config, execution) = query
            .resolve(&defaults(), ExecutionModel::Cooperative, 100)
            .unwrap();

        assert_eq!(config.items, 10);
        assert_eq!(config.delay(), Duration::from_millis(100));
        assert_eq!(config.flush_threshold, FlushThreshold::Fragments(3));
        assert_eq!(config.seed, Some(4));
        assert_eq!(execution, ExecutionModel::Blocking);
    }

    #[test]
    fn test_rejects_bad_overrides() {
        let too_many = StreamQuery {
            n: Some(101),
            ..Default::default()
        };
        let both = StreamQuery {
            flush: Some(2),
            flush_bytes: Some(64),
            ..Default::default()
        };
        let zero = StreamQuery {
            flush: Some(0),
            ..Default::default()
        };
        let mode = StreamQuery {
            mode: Some("parallel".to_string()),
            ..Default::default()
        };

        for query in [too_many, both, zero, mode] {
            assert!(matches!(
                query.resolve(&defaults(), ExecutionModel::Cooperative, 100),
                Err(StreamError::InvalidConfig(_))
            ));
        }
    }
}
