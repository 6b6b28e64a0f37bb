use std::time::UNIX_EPOCH;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use super::AdminState;
use crate::error::{ErrorBody, ProxyError};
use crate::lifecycle::LifecycleState;
use crate::session::{Session, Token};

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub state: LifecycleState,
    pub in_flight: u64,
    pub session_active: bool,
}

/// Public view of a session. Deliberately has no token field.
#[derive(Serialize)]
pub struct SessionView {
    pub host: String,
    pub port: u16,
    pub created_at: u64,
}

impl From<&Session> for SessionView {
    fn from(session: &Session) -> Self {
        Self {
            host: session.backend_host().to_string(),
            port: session.backend_port(),
            created_at: session
                .created_at()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0),
        }
    }
}

#[derive(Deserialize)]
pub struct SetSessionRequest {
    pub host: Option<String>,
    pub port: u16,
    pub token: String,
}

pub async fn get_status(State(state): State<AdminState>) -> Json<SystemStatus> {
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        state: *state.lifecycle.borrow(),
        in_flight: state.tracker.active_count(),
        session_active: state.registry.has_session(),
    })
}

pub async fn get_session(State(state): State<AdminState>) -> Response {
    match state.registry.get_active_session() {
        Ok(session) => Json(SessionView::from(session.as_ref())).into_response(),
        Err(e) => (StatusCode::NOT_FOUND, Json(ErrorBody { error: e.to_string() })).into_response(),
    }
}

pub async fn put_session(
    State(state): State<AdminState>,
    payload: Result<Json<SetSessionRequest>, JsonRejection>,
) -> Response {
    // The rejection text can quote the body, which carries the token.
    let Ok(Json(request)) = payload else {
        return ProxyError::BadRequest("expected JSON {host?, port, token}".into()).into_response();
    };

    let host = request
        .host
        .or_else(|| {
            state
                .registry
                .get_active_session()
                .ok()
                .map(|s| s.backend_host().to_string())
        })
        .unwrap_or_else(|| state.default_host.clone());
    let token = Token::new(request.token);

    match state.registry.set_session(&host, request.port, token.clone()).await {
        Ok(session) => Json(SessionView::from(session.as_ref())).into_response(),
        Err(e) => {
            let message = token.scrub(&e.to_string());
            tracing::warn!(error_class = e.class(), error = %message, "Session update rejected");
            (e.status(), Json(ErrorBody { error: message })).into_response()
        }
    }
}
