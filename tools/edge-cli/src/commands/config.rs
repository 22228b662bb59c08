//! Configuration management commands.

use anyhow::{bail, Result};
use edge_sdk::prelude::{ExecutionModel, FlushThreshold, LogFormat, LogLevel};

use super::{ConfigArgs, ConfigCommand};
use crate::config::{generate_default_config, CliConfig};
use crate::context::Context;

/// Run the config command.
pub async fn run(args: ConfigArgs, ctx: &Context) -> Result<()> {
    match args.command {
        ConfigCommand::Show => show_config(ctx),
        ConfigCommand::Get { key } => get_config(&key, ctx),
        ConfigCommand::Set { key, value } => set_config(&key, &value, ctx),
        ConfigCommand::Init { force } => init_config(force, ctx),
        ConfigCommand::Validate => validate_config(ctx),
    }
}

fn show_config(ctx: &Context) -> Result<()> {
    if ctx.output.is_json() {
        ctx.output.json(&ctx.config);
        return Ok(());
    }

    ctx.output.header("Current Configuration");
    match &ctx.config_path {
        Some(path) => ctx.output.kv("file", &path.display().to_string()),
        None => ctx.output.kv("file", "(defaults)"),
    }

    let config = &ctx.config;

    ctx.output.section("server");
    ctx.output.kv("listen", &config.server.listen);
    ctx.output.kv("max_items", &config.server.max_items.to_string());
    ctx.output.kv("title", &config.server.title);

    ctx.output.section("stream");
    ctx.output.kv("items", &config.stream.items.to_string());
    ctx.output.kv("delay_ms", &config.stream.delay_ms.to_string());
    ctx.output
        .kv("flush_threshold", &config.stream.flush_threshold.to_string());
    if let Some(seed) = config.stream.seed {
        ctx.output.kv("seed", &seed.to_string());
    }
    ctx.output.kv("execution", &config.stream.execution.to_string());

    ctx.output.section("logging");
    ctx.output.kv("level", &config.logging.level);
    ctx.output.kv("format", format_name(config.logging.format));

    Ok(())
}

fn get_config(key: &str, ctx: &Context) -> Result<()> {
    let value = get_config_value(&ctx.config, key)?;

    if ctx.output.is_json() {
        ctx.output.json(&serde_json::json!({ "key": key, "value": value }));
    } else {
        println!("{}", value);
    }

    Ok(())
}

fn set_config(key: &str, value: &str, ctx: &Context) -> Result<()> {
    let Some(path) = &ctx.config_path else {
        bail!("No config file found. Run `edge config init` to create one.");
    };
    let path = path.to_string_lossy();

    let mut config = CliConfig::load(&path)?;
    set_config_value(&mut config, key, value)?;
    config.save(&path)?;

    ctx.output.success(&format!("Set {} = {}", key, value));

    Ok(())
}

fn init_config(force: bool, ctx: &Context) -> Result<()> {
    let config_path = ctx.cwd.join("edge.toml");

    if config_path.exists() && !force {
        bail!(
            "Config file already exists: {}. Use --force to overwrite.",
            config_path.display()
        );
    }

    std::fs::write(&config_path, generate_default_config())?;

    ctx.output.success(&format!("Created: {}", config_path.display()));

    Ok(())
}

fn validate_config(ctx: &Context) -> Result<()> {
    ctx.output.header("Validating configuration");

    let (errors, warnings) = ctx.config.check();

    if errors.is_empty() && warnings.is_empty() {
        ctx.output.success("Configuration is valid");
        return Ok(());
    }

    for error in &errors {
        ctx.output.error(&format!("Error: {}", error));
    }

    for warning in &warnings {
        ctx.output.warn(&format!("Warning: {}", warning));
    }

    if !errors.is_empty() {
        bail!("Configuration has {} error(s)", errors.len());
    }

    ctx.output.success("Configuration is valid (with warnings)");

    Ok(())
}

fn format_name(format: LogFormat) -> &'static str {
    match format {
        LogFormat::Json => "json",
        LogFormat::Human => "human",
    }
}

fn get_config_value(config: &CliConfig, key: &str) -> Result<String> {
    let parts: Vec<&str> = key.split('.').collect();

    match parts.as_slice() {
        ["server", "listen"] => Ok(config.server.listen.clone()),
        ["server", "max_items"] => Ok(config.server.max_items.to_string()),
        ["server", "title"] => Ok(config.server.title.clone()),
        ["stream", "items"] => Ok(config.stream.items.to_string()),
        ["stream", "delay_ms"] => Ok(config.stream.delay_ms.to_string()),
        ["stream", "seed"] => Ok(config
            .stream
            .seed
            .map(|s| s.to_string())
            .unwrap_or_else(|| "none".to_string())),
        ["stream", "execution"] => Ok(config.stream.execution.to_string()),
        ["stream", "flush_threshold"] => Ok(config.stream.flush_threshold.to_string()),
        ["logging", "level"] => Ok(config.logging.level.clone()),
        ["logging", "format"] => Ok(format_name(config.logging.format).to_string()),
        _ => bail!("Unknown config key: {}", key),
    }
}

fn set_config_value(config: &mut CliConfig, key: &str, value: &str) -> Result<()> {
    let parts: Vec<&str> = key.split('.').collect();

    match parts.as_slice() {
        ["server", "listen"] => config.server.listen = value.to_string(),
        ["server", "max_items"] => config.server.max_items = value.parse()?,
        ["server", "title"] => config.server.title = value.to_string(),
        ["stream", "items"] => config.stream.items = value.parse()?,
        ["stream", "delay_ms"] => config.stream.delay_ms = value.parse()?,
        ["stream", "seed"] => {
            config.stream.seed = match value {
                "none" | "" => None,
                seed => Some(seed.parse()?),
            }
        }
        ["stream", "execution"] => {
            config.stream.execution = match ExecutionModel::parse(value) {
                Some(execution) => execution,
                None => bail!("Unknown execution model: {}", value),
            }
        }
        ["stream", "flush_threshold", "fragments"] => {
            config.stream.flush_threshold = FlushThreshold::Fragments(value.parse()?)
        }
        ["stream", "flush_threshold", "bytes"] => {
            config.stream.flush_threshold = FlushThreshold::Bytes(value.parse()?)
        }
        ["logging", "level"] => {
            value.parse::<LogLevel>().map_err(anyhow::Error::msg)?;
            config.logging.level = value.to_string();
        }
        ["logging", "format"] => {
            config.logging.format = match value {
                "json" => LogFormat::Json,
                "human" => LogFormat::Human,
                _ => bail!("Unknown log format: {}", value),
            }
        }
        _ => bail!("Unknown or read-only config key: {}", key),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_known_keys() {
        let config = CliConfig::default();
        assert_eq!(get_config_value(&config, "server.listen").unwrap(), "127.0.0.1:8080");
        assert_eq!(get_config_value(&config, "stream.seed").unwrap(), "none");
        assert_eq!(
            get_config_value(&config, "stream.flush_threshold").unwrap(),
            "1 fragment(s)"
        );
        assert!(get_config_value(&config, "deploy.canary").is_err());
    }

    #[test]
    fn test_set_values() {
        let mut config = CliConfig::default();
        set_config_value(&mut config, "stream.items", "12").unwrap();
        set_config_value(&mut config, "stream.seed", "9").unwrap();
        set_config_value(&mut config, "stream.execution", "blocking").unwrap();
        set_config_value(&mut config, "stream.flush_threshold.bytes", "256").unwrap();
        set_config_value(&mut config, "logging.format", "human").unwrap();

        assert_eq!(config.stream.items, 12);
        assert_eq!(config.stream.seed, Some(9));
        assert_eq!(config.stream.execution, ExecutionModel::Blocking);
        assert_eq!(config.stream.flush_threshold, FlushThreshold::Bytes(256));
        assert_eq!(config.logging.format, LogFormat::Human);
    }

    #[test]
    fn test_set_rejects_bad_values() {
        let mut config = CliConfig::default();
        assert!(set_config_value(&mut config, "stream.items", "many").is_err());
        assert!(set_config_value(&mut config, "stream.execution", "threads").is_err());
        assert!(set_config_value(&mut config, "logging.level", "loud").is_err());
        assert!(set_config_value(&mut config, "workload.name", "x").is_err());
        assert_eq!(config, CliConfig::default());
    }
}
