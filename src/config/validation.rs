//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check required fields (listen port, backend discovery)
//! - Validate value ranges (timeouts > 0, well-formed host)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use crate::config::schema::ProxyConfig;

/// A single semantic problem with the configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("missing required field `{0}`")]
    Missing(&'static str),

    #[error("invalid `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Validate a fully layered configuration.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listen_port.is_none() {
        errors.push(ValidationError::Missing("listen_port"));
    }

    if config.backend.session_file.is_none() {
        match config.backend.port {
            None => errors.push(ValidationError::Missing("backend_port")),
            Some(0) => errors.push(ValidationError::Invalid {
                field: "backend_port",
                reason: "must be between 1 and 65535".into(),
            }),
            Some(_) => {}
        }
        if let Err(reason) = check_host(&config.backend.host) {
            errors.push(ValidationError::Invalid { field: "backend_host", reason });
        }
    }

    if config.credentials.token_env.trim().is_empty() {
        errors.push(ValidationError::Invalid {
            field: "credentials.token_env",
            reason: "environment variable name must not be empty".into(),
        });
    }

    let timeouts = [
        ("request_timeout_ms", config.timeouts.request_ms),
        ("drain_timeout_ms", config.timeouts.drain_ms),
        ("connect_timeout_ms", config.timeouts.connect_ms),
        ("probe_timeout_ms", config.timeouts.probe_ms),
    ];
    for (field, value) in timeouts {
        if value == 0 {
            errors.push(ValidationError::Invalid {
                field,
                reason: "must be greater than zero".into(),
            });
        }
    }

    if config.max_connections == 0 {
        errors.push(ValidationError::Invalid {
            field: "max_connections",
            reason: "must be greater than zero".into(),
        });
    }

    if config.limits.max_body_bytes == 0 {
        errors.push(ValidationError::Invalid {
            field: "limits.max_body_bytes",
            reason: "must be greater than zero".into(),
        });
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<std::net::SocketAddr>().is_err()
    {
        errors.push(ValidationError::Invalid {
            field: "observability.metrics_address",
            reason: format!("'{}' is not a socket address", config.observability.metrics_address),
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Check that `host` is a syntactically valid host name or IP literal.
pub fn check_host(host: &str) -> Result<(), String> {
    if host.trim().is_empty() {
        return Err("host must not be empty".into());
    }
    // Unbracketed IPv6 literal, as a session file or the admin API may send it.
    if host.parse::<std::net::Ipv6Addr>().is_ok() {
        return Ok(());
    }
    url::Host::parse(host)
        .map(|_| ())
        .map_err(|e| format!("'{}' is not a valid host: {}", host, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete() -> ProxyConfig {
        let mut config = ProxyConfig::default();
        config.listen_port = Some(9999);
        config.backend.port = Some(59066);
        config
    }

    #[test]
    fn complete_config_passes() {
        assert!(validate_config(&complete()).is_ok());
    }

    #[test]
    fn reports_every_missing_field() {
        let errors = validate_config(&ProxyConfig::default()).unwrap_err();
        assert!(errors.contains(&ValidationError::Missing("listen_port")));
        assert!(errors.contains(&ValidationError::Missing("backend_port")));
    }

    #[test]
    fn session_file_replaces_static_port() {
        let mut config = complete();
        config.backend.port = None;
        config.backend.session_file = Some("/tmp/session.toml".into());
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn rejects_zero_timeouts_and_bad_host() {
        let mut config = complete();
        config.timeouts.request_ms = 0;
        config.backend.host = "bad host".into();
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn host_checks() {
        assert!(check_host("localhost").is_ok());
        assert!(check_host("127.0.0.1").is_ok());
        assert!(check_host("[::1]").is_ok());
        assert!(check_host("::1").is_ok());
        assert!(check_host("fe80::1:2").is_ok());
        assert!(check_host("::1::2").is_err());
        assert!(check_host("").is_err());
        assert!(check_host("a b").is_err());
    }
}
