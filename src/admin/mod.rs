//! Admin API on a separate loopback listener.
//!
//! `GET /admin/status`, `GET /admin/session`, `PUT /admin/session`.
//! Every route requires the bearer key; the token is accepted on PUT but never
//! returned or logged.

pub mod auth;
pub mod handlers;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    middleware,
    routing::get,
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use self::auth::admin_auth_middleware;
use self::handlers::*;
use crate::error::StartupError;
use crate::lifecycle::shutdown::triggered;
use crate::lifecycle::LifecycleState;
use crate::net::InFlightTracker;
use crate::session::{SessionRegistry, Token};

#[derive(Clone)]
pub struct AdminState {
    pub registry: Arc<SessionRegistry>,
    pub tracker: InFlightTracker,
    pub lifecycle: watch::Receiver<LifecycleState>,
    pub api_key: Token,
    /// Host used by `PUT /admin/session` when the body omits one and no session exists.
    pub default_host: String,
}

pub fn setup_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/session", get(get_session).put(put_session))
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware))
        .with_state(state)
}

/// Bind the admin listener and serve it until `stop` fires.
pub async fn serve(
    addr: SocketAddr,
    state: AdminState,
    mut stop: watch::Receiver<bool>,
) -> Result<JoinHandle<()>, StartupError> {
    let listener = TcpListener::bind(addr).await.map_err(|source| StartupError::Bind {
        addr: addr.to_string(),
        source,
    })?;
    tracing::info!(address = %addr, "Admin API listening");

    let app = setup_admin_router(state);
    Ok(tokio::spawn(async move {
        let shutdown = async move { triggered(&mut stop).await };
        if let Err(e) = axum::serve(listener, app).with_graceful_shutdown(shutdown).await {
            tracing::error!(error = %e, "Admin API stopped");
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use std::time::Duration;
    use tower::ServiceExt;

    fn state() -> (AdminState, watch::Sender<LifecycleState>) {
        let (tx, rx) = watch::channel(LifecycleState::Listening);
        let state = AdminState {
            registry: Arc::new(SessionRegistry::new(Duration::from_millis(300))),
            tracker: InFlightTracker::new(),
            lifecycle: rx,
            api_key: Token::new("admin-key"),
            default_host: "127.0.0.1".into(),
        };
        (state, tx)
    }

    async fn body_string(response: axum::response::Response) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn rejects_missing_key() {
        let (state, _tx) = state();
        let response = setup_admin_router(state)
            .oneshot(Request::get("/admin/status").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn status_reports_lifecycle() {
        let (state, _tx) = state();
        let response = setup_admin_router(state)
            .oneshot(
                Request::get("/admin/status")
                    .header("authorization", "Bearer admin-key")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_string(response).await;
        assert!(body.contains("\"state\":\"listening\""));
        assert!(body.contains("\"session_active\":false"));
    }

    #[tokio::test]
    async fn put_session_never_echoes_token() {
        let backend = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = backend.local_addr().unwrap().port();
        let (state, _tx) = state();
        let registry = Arc::clone(&state.registry);
        let router = setup_admin_router(state);

        let response = router
            .clone()
            .oneshot(
                Request::put("/admin/session")
                    .header("authorization", "Bearer admin-key")
                    .header("content-type", "application/json")
                    .body(Body::from(format!(
                        r#"{{"host":"127.0.0.1","port":{},"token":"sekrit-token"}}"#,
                        port
                    )))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(!body_string(response).await.contains("sekrit-token"));
        assert_eq!(registry.get_active_session().unwrap().backend_port(), port);

        let response = router
            .oneshot(
                Request::get("/admin/session")
                    .header("authorization", "Bearer admin-key")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let body = body_string(response).await;
        assert!(body.contains(&format!("\"port\":{}", port)));
        assert!(!body.contains("sekrit-token"));
    }

    #[tokio::test]
    async fn malformed_body_does_not_leak() {
        let (state, _tx) = state();
        let response = setup_admin_router(state)
            .oneshot(
                Request::put("/admin/session")
                    .header("authorization", "Bearer admin-key")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"port":"nope","token":"sekrit-token"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(!body_string(response).await.contains("sekrit-token"));
    }

    #[tokio::test]
    async fn rejected_session_keeps_previous() {
        let (state, _tx) = state();
        let registry = Arc::clone(&state.registry);
        let response = setup_admin_router(state)
            .oneshot(
                Request::put("/admin/session")
                    .header("authorization", "Bearer admin-key")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"port":0,"token":"x"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(!registry.has_session());
    }
}
