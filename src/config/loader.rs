use std::path::Path;

use config::{Config, Environment, File, FileFormat};
use eyre::{Context, Result};
use uuid::Uuid;

use crate::config::models::{DEFAULT_UPSTREAM_TIMEOUT_SECS, GatewayConfig};

/// Prefix for environment overrides, e.g. `ZENTRO__LISTEN_ADDR=127.0.0.1:9000`.
const ENV_PREFIX: &str = "ZENTRO";

/// Load configuration from a file using the config crate and normalize it.
/// Supports JSON (default), YAML and TOML, chosen by extension.
pub async fn load_config(config_path: &str) -> Result<GatewayConfig> {
    load_config_sync(config_path)
}

/// Load configuration synchronously
pub fn load_config_sync(config_path: &str) -> Result<GatewayConfig> {
    load_config_unchecked(config_path).map(normalize)
}

/// Read and deserialize the file without assigning ids or resolving defaults.
pub fn load_config_unchecked(config_path: &str) -> Result<GatewayConfig> {
    let config_path = Path::new(config_path);

    let format = match config_path.extension().and_then(|ext| ext.to_str()) {
        Some("yaml") | Some("yml") => FileFormat::Yaml,
        Some("toml") => FileFormat::Toml,
        _ => FileFormat::Json,
    };

    let settings = Config::builder()
        .add_source(File::new(
            config_path
                .to_str()
                .ok_or_else(|| eyre::eyre!("Invalid UTF-8 path: {}", config_path.display()))?,
            format,
        ))
        .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"))
        .build()
        .with_context(|| format!("Failed to build config from {}", config_path.display()))?;

    settings.try_deserialize().with_context(|| {
        format!(
            "Failed to deserialize config from {}",
            config_path.display()
        )
    })
}

/// Parse a JSON document (as served by a remote provider) and normalize it.
pub fn parse_json_config(content: &str) -> Result<GatewayConfig> {
    let config: GatewayConfig =
        serde_json::from_str(content).context("Failed to parse JSON config")?;
    Ok(normalize(config))
}

/// Assign missing route ids and resolve zero-valued defaults.
///
/// Applying it twice yields the same configuration.
pub fn normalize(mut config: GatewayConfig) -> GatewayConfig {
    config.config.health = config.config.health.with_defaults();
    if config.config.upstream_timeout_secs == 0 {
        config.config.upstream_timeout_secs = DEFAULT_UPSTREAM_TIMEOUT_SECS;
    }

    for route in &mut config.routes {
        if route.id.is_empty() {
            let short = Uuid::new_v4().simple().to_string();
            route.id = if route.name.is_empty() {
                short
            } else {
                format!("{}@{}", route.name, short)
            };
        }
        if let Some(health) = route.health {
            route.health = Some(health.with_defaults());
        }
    }

    config
}
