//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML, optional)
//!     → loader.rs (parse & deserialize, env overlay)
//!     → [CLI overrides applied by the binary]
//!     → validation.rs (semantic checks, all errors at once)
//!     → ProxyConfig (validated, immutable)
//!     → shared by value/Arc with all subsystems
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require a restart
//! - The token is never a config field, only the env var that holds it
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::ConfigError;
pub use schema::{
    AdminConfig, BackendConfig, BackendProtocol, CredentialConfig, DiscoverySource, LimitsConfig,
    LogFormat, ObservabilityConfig, ProxyConfig, TimeoutConfig,
};
