//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.
//! The session token is deliberately absent: only the *name* of the
//! environment variable holding it is configurable.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default environment variable carrying the backend token.
pub const DEFAULT_TOKEN_ENV: &str = "SESSION_PROXY_TOKEN";

/// Default environment variable carrying the admin API key.
pub const DEFAULT_ADMIN_KEY_ENV: &str = "SESSION_PROXY_ADMIN_KEY";

/// Root configuration for the proxy.
///
/// Immutable once the process has started; changing it requires a restart.
/// Only the session itself can be replaced at runtime.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Port of the client-facing HTTP/1.1 listener. Required.
    pub listen_port: Option<u16>,

    /// Interface the listener binds to.
    pub bind_host: IpAddr,

    /// Authorize terminating the process that holds `listen_port`.
    pub reclaim_port: bool,

    /// Maximum concurrent client connections (backpressure).
    pub max_connections: usize,

    /// Where the backend address comes from.
    pub backend: BackendConfig,

    /// Where the backend credential comes from.
    pub credentials: CredentialConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Request size limits.
    pub limits: LimitsConfig,

    /// Admin API settings.
    pub admin: AdminConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            listen_port: None,
            bind_host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            reclaim_port: false,
            max_connections: 1024,
            backend: BackendConfig::default(),
            credentials: CredentialConfig::default(),
            timeouts: TimeoutConfig::default(),
            limits: LimitsConfig::default(),
            admin: AdminConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

impl ProxyConfig {
    /// Socket address of the client-facing listener.
    pub fn listen_addr(&self) -> Option<SocketAddr> {
        self.listen_port.map(|port| SocketAddr::new(self.bind_host, port))
    }
}

/// Wire protocol the backend requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackendProtocol {
    /// Plain HTTP/1.1.
    Http1,
    /// HTTP/2 over cleartext with prior knowledge (no upgrade dance).
    #[default]
    Http2,
}

impl std::fmt::Display for BackendProtocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendProtocol::Http1 => write!(f, "http1"),
            BackendProtocol::Http2 => write!(f, "http2"),
        }
    }
}

impl std::str::FromStr for BackendProtocol {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "http1" | "http/1.1" | "h1" => Ok(BackendProtocol::Http1),
            "http2" | "http/2" | "h2" | "h2c" => Ok(BackendProtocol::Http2),
            other => Err(format!("unknown backend protocol '{}'", other)),
        }
    }
}

/// Backend discovery configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Backend host name or IP literal.
    pub host: String,

    /// Backend port. Required unless `session_file` is set.
    pub port: Option<u16>,

    /// Protocol spoken towards the backend.
    pub protocol: BackendProtocol,

    /// Optional session file, watched for changes.
    pub session_file: Option<PathBuf>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: None,
            protocol: BackendProtocol::default(),
            session_file: None,
        }
    }
}

/// Resolved source of the backend address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoverySource {
    /// Fixed host and port from configuration.
    Static { host: String, port: u16 },
    /// A session file rewritten by whatever launches the backend.
    SessionFile(PathBuf),
}

impl BackendConfig {
    /// The configured discovery source, if the config is complete enough to
    /// name one. A session file takes precedence over a static address.
    pub fn discovery_source(&self) -> Option<DiscoverySource> {
        if let Some(path) = &self.session_file {
            return Some(DiscoverySource::SessionFile(path.clone()));
        }
        self.port.map(|port| DiscoverySource::Static {
            host: self.host.clone(),
            port,
        })
    }
}

/// Credential source configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CredentialConfig {
    /// Name of the environment variable holding the token.
    pub token_env: String,
}

impl Default for CredentialConfig {
    fn default() -> Self {
        Self {
            token_env: DEFAULT_TOKEN_ENV.to_string(),
        }
    }
}

/// Timeout configuration, all in milliseconds.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Hard deadline for a backend exchange (through response headers).
    pub request_ms: u64,

    /// Grace period for in-flight requests during shutdown.
    pub drain_ms: u64,

    /// TCP connect timeout towards the backend.
    pub connect_ms: u64,

    /// Reachability probe timeout used by `set_session`.
    pub probe_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request_ms: 30_000,
            drain_ms: 5_000,
            connect_ms: 2_000,
            probe_ms: 1_000,
        }
    }
}

impl TimeoutConfig {
    pub fn request(&self) -> Duration {
        Duration::from_millis(self.request_ms)
    }

    pub fn drain(&self) -> Duration {
        Duration::from_millis(self.drain_ms)
    }

    pub fn connect(&self) -> Duration {
        Duration::from_millis(self.connect_ms)
    }

    pub fn probe(&self) -> Duration {
        Duration::from_millis(self.probe_ms)
    }
}

/// Request size limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Upper bound on a buffered request body.
    pub max_body_bytes: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_body_bytes: 16 * 1024 * 1024, // 16MB
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable the admin API.
    pub enabled: bool,

    /// Admin API bind address.
    pub bind_address: SocketAddr,

    /// Environment variable holding the bearer key.
    pub api_key_env: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bind_address: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 9998),
            api_key_env: DEFAULT_ADMIN_KEY_ENV.to_string(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format '{}'", other)),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::default(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
