//! CLI configuration.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result};
use edge_sdk::prelude::{ExecutionModel, FlushThreshold, LogFormat, LogLevel, StreamConfig};
use serde::{Deserialize, Serialize};

/// File names searched for, in order, in each directory.
pub const CONFIG_NAMES: [&str; 3] = ["edge.toml", ".edge.toml", "edge.json"];

/// CLI configuration file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CliConfig {
    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Default stream settings.
    #[serde(default)]
    pub stream: StreamSection,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl CliConfig {
    /// Load config from a file.
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path))?;

        if path.ends_with(".json") {
            serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse JSON config: {}", path))
        } else {
            toml::from_str(&content)
                .with_context(|| format!("Failed to parse TOML config: {}", path))
        }
    }

    /// Save config to a file.
    pub fn save(&self, path: &str) -> Result<()> {
        let content = if path.ends_with(".json") {
            serde_json::to_string_pretty(self)?
        } else {
            toml::to_string_pretty(self)?
        };

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path))
    }

    /// Stream defaults as a [`StreamConfig`].
    pub fn stream_config(&self) -> StreamConfig {
        let mut config = StreamConfig::new(
            self.stream.items,
            Duration::from_millis(self.stream.delay_ms),
        )
        .with_flush_threshold(self.stream.flush_threshold);
        config.seed = self.stream.seed;
        config
    }

    /// Session log level; an unparseable value falls back to info.
    pub fn log_level(&self) -> LogLevel {
        self.logging.level.parse().unwrap_or(LogLevel::Info)
    }

    /// Check the config, returning `(errors, warnings)`.
    pub fn check(&self) -> (Vec<String>, Vec<String>) {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        if self.server.listen.parse::<SocketAddr>().is_err() {
            errors.push(format!(
                "server.listen '{}' is not a socket address",
                self.server.listen
            ));
        }

        if let Err(e) = self.stream_config().validate() {
            errors.push(format!("stream: {}", e));
        }

        if self.stream.items > self.server.max_items {
            errors.push(format!(
                "stream.items ({}) exceeds server.max_items ({})",
                self.stream.items, self.server.max_items
            ));
        }

        if self.logging.level.parse::<LogLevel>().is_err() {
            errors.push(format!("logging.level '{}' is unknown", self.logging.level));
        }

        if self.stream.delay_ms == 0 {
            warnings.push("stream.delay_ms is 0; items will not be staggered".to_string());
        }

        if let FlushThreshold::Fragments(k) = self.stream.flush_threshold {
            if k > self.stream.items.max(1) {
                warnings.push(format!(
                    "stream.flush_threshold ({} fragments) exceeds the item count",
                    k
                ));
            }
        }

        (errors, warnings)
    }
}

/// HTTP server settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen address.
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Upper bound on `n` accepted from a query string.
    #[serde(default = "default_max_items")]
    pub max_items: usize,

    /// Page title.
    #[serde(default = "default_title")]
    pub title: String,
}

fn default_listen() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_max_items() -> usize {
    1000
}

fn default_title() -> String {
    "Shadow DOM streaming".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            max_items: default_max_items(),
            title: default_title(),
        }
    }
}

/// `[stream]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamSection {
    /// Number of items.
    #[serde(default = "default_items")]
    pub items: usize,

    /// Per-item delay in milliseconds.
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,

    /// Fixed shuffle seed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,

    /// Execution model.
    #[serde(default)]
    pub execution: ExecutionModel,

    /// Flush policy.
    #[serde(default)]
    pub flush_threshold: FlushThreshold,
}

fn default_items() -> usize {
    20
}

fn default_delay_ms() -> u64 {
    500
}

impl Default for StreamSection {
    fn default() -> Self {
        Self {
            items: default_items(),
            delay_ms: default_delay_ms(),
            seed: None,
            execution: ExecutionModel::default(),
            flush_threshold: FlushThreshold::default(),
        }
    }
}

/// `[logging]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Minimum level: trace, debug, info, warn, error.
    #[serde(default = "default_level")]
    pub level: String,

    /// Session entry format.
    #[serde(default)]
    pub format: LogFormat,
}

fn default_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: LogFormat::default(),
        }
    }
}

/// Generate a default edge.toml config file.
pub fn generate_default_config() -> String {
    r#"# Edge streaming configuration

[server]
listen = "127.0.0.1:8080"
max_items = 1000
title = "Shadow DOM streaming"

[stream]
items = 20
delay_ms = 500
# seed = 42
execution = "cooperative"

[stream.flush_threshold]
fragments = 1
# bytes = 4096

[logging]
level = "info"
format = "json"
"#
    .to_string()
}
