//! Configuration loading.
//!
//! Layers, lowest precedence first: defaults, TOML file, `SESSION_PROXY_*`
//! environment variables. CLI overrides are applied by the binary before
//! [`finalize`] runs validation.

use std::fs;
use std::path::Path;

use crate::config::schema::ProxyConfig;
use crate::config::validation::{validate_config, ValidationError};
use crate::session::Token;

/// Prefix shared by every environment override.
pub const ENV_PREFIX: &str = "SESSION_PROXY_";

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid value for {var}: '{value}'")]
    Env { var: String, value: String },

    #[error("token environment variable {0} is not set or empty")]
    MissingToken(String),

    #[error("admin API enabled but {0} is not set")]
    MissingAdminKey(String),

    #[error("invalid session: {0}")]
    InvalidSession(String),

    #[error("validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Parse a TOML document into a configuration (no validation).
pub fn parse_config(content: &str) -> Result<ProxyConfig, ConfigError> {
    Ok(toml::from_str(content)?)
}

/// Load configuration from an optional TOML file plus the process environment.
///
/// The result is not yet validated; call [`finalize`] once CLI overrides are in.
pub fn load_config(path: Option<&Path>) -> Result<ProxyConfig, ConfigError> {
    let mut config = match path {
        Some(path) => {
            let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
                path: path.display().to_string(),
                source,
            })?;
            parse_config(&content)?
        }
        None => ProxyConfig::default(),
    };

    apply_env(&mut config, |key| std::env::var(key).ok())?;
    Ok(config)
}

/// Overlay `SESSION_PROXY_*` variables onto `config`.
///
/// `lookup` abstracts the environment so tests need not mutate process state.
pub fn apply_env<F>(config: &mut ProxyConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |name: &str| {
        let var = format!("{}{}", ENV_PREFIX, name);
        lookup(&var).map(|value| (var, value))
    };

    if let Some((var, value)) = get("LISTEN_PORT") {
        config.listen_port = Some(parse_env(&var, &value)?);
    }
    if let Some((var, value)) = get("BIND_HOST") {
        config.bind_host = parse_env(&var, &value)?;
    }
    if let Some((_, value)) = get("BACKEND_HOST") {
        config.backend.host = value;
    }
    if let Some((var, value)) = get("BACKEND_PORT") {
        config.backend.port = Some(parse_env(&var, &value)?);
    }
    if let Some((var, value)) = get("BACKEND_PROTOCOL") {
        config.backend.protocol = parse_env(&var, &value)?;
    }
    if let Some((_, value)) = get("SESSION_FILE") {
        config.backend.session_file = Some(value.into());
    }
    if let Some((var, value)) = get("REQUEST_TIMEOUT_MS") {
        config.timeouts.request_ms = parse_env(&var, &value)?;
    }
    if let Some((var, value)) = get("DRAIN_TIMEOUT_MS") {
        config.timeouts.drain_ms = parse_env(&var, &value)?;
    }
    if let Some((var, value)) = get("RECLAIM_PORT") {
        config.reclaim_port = parse_env(&var, &value)?;
    }
    if let Some((var, value)) = get("MAX_BODY_BYTES") {
        config.limits.max_body_bytes = parse_env(&var, &value)?;
    }
    if let Some((var, value)) = get("LOG_FORMAT") {
        config.observability.log_format = parse_env(&var, &value)?;
    }

    Ok(())
}

fn parse_env<T: std::str::FromStr>(var: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Env {
        var: var.to_string(),
        value: value.to_string(),
    })
}

/// Run semantic validation over the fully layered configuration.
pub fn finalize(config: ProxyConfig) -> Result<ProxyConfig, ConfigError> {
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Read the backend token from the configured credential source.
pub fn resolve_token<F>(config: &ProxyConfig, lookup: F) -> Result<Token, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let var = &config.credentials.token_env;
    match lookup(var) {
        Some(value) if !value.is_empty() => Ok(Token::new(value)),
        _ => Err(ConfigError::MissingToken(var.clone())),
    }
}

/// Read the admin bearer key, required only when the admin API is enabled.
pub fn resolve_admin_key<F>(config: &ProxyConfig, lookup: F) -> Result<Option<Token>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if !config.admin.enabled {
        return Ok(None);
    }
    let var = &config.admin.api_key_env;
    match lookup(var) {
        Some(value) if !value.is_empty() => Ok(Some(Token::new(value))),
        _ => Err(ConfigError::MissingAdminKey(var.clone())),
    }
}
