//! Outbound credential injection.
//!
//! The header is derived from the session on every call; nothing here is
//! cached, so a rotated session is used by the very next request.

use axum::http::HeaderValue;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};

use crate::error::ProxyError;
use crate::session::Session;

/// `"Basic " + base64(token + ":")` for the given session.
pub fn build_auth_header(session: &Session) -> Result<String, ProxyError> {
    let token = session.token();
    if token.is_empty() {
        return Err(ProxyError::InvalidSession("token is empty".into()));
    }
    Ok(format!("Basic {}", encode_basic(token.expose())))
}

/// The header as a sensitive `HeaderValue`, so hyper and tower-http skip it
/// when formatting headers.
pub fn auth_header_value(session: &Session) -> Result<HeaderValue, ProxyError> {
    let header = build_auth_header(session)?;
    let mut value = HeaderValue::from_str(&header)
        .map_err(|_| ProxyError::InvalidSession("token is not header-safe".into()))?;
    value.set_sensitive(true);
    Ok(value)
}

/// Basic-auth encoding with the token as user name and an empty password.
pub(crate) fn encode_basic(token: &str) -> String {
    BASE64.encode(format!("{}:", token))
}
