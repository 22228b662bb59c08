//! CLI command implementations.

pub mod config;
pub mod render;
pub mod serve;

use anyhow::{Context as _, Result};
use clap::{Args, Subcommand};
use shadow_dom_streaming::{AppState, StreamQuery};

/// Stream overrides shared by `serve` and `render`.
#[derive(Args, Debug, Default)]
pub struct StreamArgs {
    /// Number of items.
    #[arg(short = 'n', long)]
    pub items: Option<usize>,

    /// Per-item delay in milliseconds.
    #[arg(long)]
    pub delay_ms: Option<u64>,

    /// Flush every N fragments.
    #[arg(long, conflicts_with = "flush_bytes")]
    pub flush: Option<usize>,

    /// Flush once N bytes are pending.
    #[arg(long)]
    pub flush_bytes: Option<usize>,

    /// Fixed shuffle seed.
    #[arg(long)]
    pub seed: Option<u64>,

    /// Execution model: cooperative or blocking.
    #[arg(short, long)]
    pub mode: Option<String>,
}

impl StreamArgs {
    /// Apply the flags on top of the state's defaults, bounded by its
    /// `max_items` like a query string.
    pub fn apply(&self, mut state: AppState) -> Result<AppState> {
        let query = StreamQuery {
            n: self.items,
            delay_ms: self.delay_ms,
            flush: self.flush,
            flush_bytes: self.flush_bytes,
            seed: self.seed,
            mode: self.mode.clone(),
        };
        let (defaults, execution) = query
            .resolve(&state.defaults, state.execution, state.max_items)
            .context("Invalid stream options")?;
        state.defaults = defaults;
        state.execution = execution;
        Ok(state)
    }
}

/// Arguments for the serve command.
#[derive(Args)]
pub struct ServeArgs {
    /// Listen address (overrides server.listen).
    #[arg(short, long)]
    pub listen: Option<String>,

    #[command(flatten)]
    pub stream: StreamArgs,
}

/// Arguments for the render command.
#[derive(Args)]
pub struct RenderArgs {
    #[command(flatten)]
    pub stream: StreamArgs,

    /// Do not print the session summary.
    #[arg(short, long)]
    pub quiet: bool,
}

/// Arguments for the config command.
#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration.
    Show,
    /// Get a config value.
    Get {
        /// Config key (dot-separated).
        key: String,
    },
    /// Set a config value.
    Set {
        /// Config key (dot-separated).
        key: String,
        /// Value to set.
        value: String,
    },
    /// Initialize a new config file.
    Init {
        /// Force overwrite existing config.
        #[arg(short, long)]
        force: bool,
    },
    /// Validate the config file.
    Validate,
}

#[cfg(test)]
mod tests {
    use super::*;
    use edge_sdk::prelude::{ExecutionModel, FlushThreshold, StreamConfig};

    fn state() -> AppState {
        AppState::new(StreamConfig::new(4, std::time::Duration::from_millis(10)))
            .with_max_items(10)
    }

    #[test]
    fn test_no_flags_keep_file_values() {
        let applied = StreamArgs::default().apply(state()).unwrap();
        assert_eq!(applied.defaults, state().defaults);
        assert_eq!(applied.execution, ExecutionModel::Cooperative);
    }

    #[test]
    fn test_flags_override() {
        let args = StreamArgs {
            items: Some(6),
            flush_bytes: Some(128),
            mode: Some("blocking".to_string()),
            ..Default::default()
        };
        let applied = args.apply(state()).unwrap();
        assert_eq!(applied.defaults.items, 6);
        assert_eq!(applied.defaults.delay(), std::time::Duration::from_millis(10));
        assert_eq!(applied.defaults.flush_threshold, FlushThreshold::Bytes(128));
        assert_eq!(applied.execution, ExecutionModel::Blocking);
    }

    #[test]
    fn test_flags_respect_max_items() {
        let args = StreamArgs {
            items: Some(11),
            ..Default::default()
        };
        assert!(args.apply(state()).is_err());
    }
}
