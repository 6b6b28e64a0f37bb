//! Session file parsing.
//!
//! A session file is a small TOML document written by whatever launches the
//! backend:
//!
//! ```toml
//! host = "localhost"
//! port = 59066
//! token = "..."   # optional; falls back to the credential env var
//! ```

use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::config::ConfigError;
use crate::session::Token;

#[derive(Deserialize)]
struct RawSessionFile {
    #[serde(default = "default_host")]
    host: String,
    port: u16,
    #[serde(default)]
    token: Option<String>,
}

fn default_host() -> String {
    "localhost".to_string()
}

/// Session input read from a file, not yet validated or probed.
#[derive(Debug, Clone)]
pub struct SessionSpec {
    pub host: String,
    pub port: u16,
    pub token: Token,
}

/// Parse session file contents. `fallback_token` is used when the file has
/// no `token` key (or an empty one).
pub fn parse_session_file(
    content: &str,
    fallback_token: Option<&Token>,
) -> Result<SessionSpec, ConfigError> {
    let raw: RawSessionFile = toml::from_str(content)?;
    let token = match raw.token {
        Some(token) if !token.is_empty() => Token::new(token),
        _ => fallback_token
            .cloned()
            .ok_or_else(|| ConfigError::MissingToken("session file token".into()))?,
    };
    Ok(SessionSpec {
        host: raw.host,
        port: raw.port,
        token,
    })
}

/// Read and parse a session file from disk.
pub fn load_session_file(
    path: &Path,
    fallback_token: Option<&Token>,
) -> Result<SessionSpec, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    parse_session_file(&content, fallback_token)
}
