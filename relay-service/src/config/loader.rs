//! Configuration loading from files and environment variables.

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, Environment, File};

use crate::error::{ServiceError, ServiceResult};

use super::RelayConfig;

/// Bare environment variables accepted alongside the `RELAY_` ones, mapped to
/// their config keys. These take precedence over every other source.
const ENV_OVERRIDES: &[(&str, &str)] = &[
    ("PORT", "server.port"),
    ("ORIGIN", "server.cors_origin"),
    ("OPENAI_API_KEY", "openai.api_key"),
];

/// Load configuration from `config.*`, `RELAY_*` env vars and the bare
/// override variables.
pub fn load_config() -> ServiceResult<RelayConfig> {
    let builder = Config::builder()
        .add_source(File::with_name("config").required(false))
        .add_source(
            Environment::with_prefix("RELAY")
                .separator("__")
                .try_parsing(true),
        );

    build(apply_env_overrides(builder, |name| std::env::var(name).ok())?)
}

fn apply_env_overrides(
    mut builder: ConfigBuilder<DefaultState>,
    lookup: impl Fn(&str) -> Option<String>,
) -> ServiceResult<ConfigBuilder<DefaultState>> {
    for (var, key) in ENV_OVERRIDES {
        let value = lookup(var).filter(|v| !v.trim().is_empty());
        builder = builder
            .set_override_option(*key, value)
            .map_err(|e| ServiceError::Config {
                message: format!("Invalid value for {}: {}", var, e),
            })?;
    }
    Ok(builder)
}

fn build(builder: ConfigBuilder<DefaultState>) -> ServiceResult<RelayConfig> {
    builder
        .build()
        .map_err(|e| ServiceError::Config {
            message: format!("Failed to build config: {}", e),
        })?
        .try_deserialize()
        .map_err(|e| ServiceError::Config {
            message: format!("Failed to deserialize config: {}", e),
        })
}
