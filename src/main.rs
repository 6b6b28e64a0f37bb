//! Session proxy.
//!
//! Accepts HTTP/1.1 from a local client and forwards every request to a
//! dynamically addressed backend, injecting its Basic credential.
//!
//! # Architecture Overview
//!
//! ```text
//!                     ┌────────────────────────────────────────────────────┐
//!                     │                   SESSION PROXY                    │
//!   Client (HTTP/1.1) │  ┌─────────┐   ┌─────────┐   ┌───────────┐         │
//!   ──────────────────┼─▶│   net   │──▶│  http   │──▶│  forward  │─────────┼──▶ Backend
//!                     │  │listener │   │ bridge  │   │  client   │ h2 / h1 │    (host:port)
//!                     │  └─────────┘   └────┬────┘   └─────┬─────┘         │
//!                     │                     │              │               │
//!                     │               ┌─────▼──────┐  credentials         │
//!                     │               │  session   │◀── file watcher      │
//!                     │               │  registry  │◀── admin API         │
//!                     │               └────────────┘                       │
//!                     │  lifecycle: Unbound → Binding → Listening →        │
//!                     │             Draining → Stopped                     │
//!                     └────────────────────────────────────────────────────┘
//! ```
//!
//! # Exit codes
//! - 0: clean shutdown
//! - 1: configuration error (missing token, malformed session input, bad flags)
//! - 2: listen port unavailable

use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;

use session_proxy::admin::{self, AdminState};
use session_proxy::config::loader::{self, ConfigError};
use session_proxy::config::validation::ValidationError;
use session_proxy::config::{BackendProtocol, DiscoverySource, LogFormat, ProxyConfig};
use session_proxy::error::StartupError;
use session_proxy::lifecycle::{signals, startup, LifecycleManager};
use session_proxy::observability::{logging, metrics};
use session_proxy::session::{self, watcher, SessionFileWatcher, SessionRegistry, SessionSpec, Token};
use session_proxy::ProxyServer;

/// Command-line overrides. The backend token is deliberately not a flag:
/// it is read from the environment only.
#[derive(Parser, Debug)]
#[command(name = "session-proxy", version, about = "HTTP/1.1 to backend session proxy")]
struct Cli {
    /// Optional TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Client-facing listen port
    #[arg(long)]
    listen_port: Option<u16>,

    /// Backend host
    #[arg(long)]
    backend_host: Option<String>,

    /// Backend port
    #[arg(long)]
    backend_port: Option<u16>,

    /// Backend protocol (http1 or http2)
    #[arg(long)]
    backend_protocol: Option<BackendProtocol>,

    /// Session file to read and watch for backend rotation
    #[arg(long)]
    session_file: Option<PathBuf>,

    /// Backend request timeout in milliseconds
    #[arg(long)]
    request_timeout_ms: Option<u64>,

    /// Drain grace period in milliseconds
    #[arg(long)]
    drain_timeout_ms: Option<u64>,

    /// Terminate the process holding the listen port
    #[arg(long)]
    reclaim_port: bool,

    /// Log output format (pretty or json)
    #[arg(long)]
    log_format: Option<LogFormat>,
}

impl Cli {
    fn apply(self, config: &mut ProxyConfig) {
        if let Some(port) = self.listen_port {
            config.listen_port = Some(port);
        }
        if let Some(host) = self.backend_host {
            config.backend.host = host;
        }
        if let Some(port) = self.backend_port {
            config.backend.port = Some(port);
        }
        if let Some(protocol) = self.backend_protocol {
            config.backend.protocol = protocol;
        }
        if let Some(path) = self.session_file {
            config.backend.session_file = Some(path);
        }
        if let Some(ms) = self.request_timeout_ms {
            config.timeouts.request_ms = ms;
        }
        if let Some(ms) = self.drain_timeout_ms {
            config.timeouts.drain_ms = ms;
        }
        if self.reclaim_port {
            config.reclaim_port = true;
        }
        if let Some(format) = self.log_format {
            config.observability.log_format = format;
        }
    }
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() { ExitCode::from(1) } else { ExitCode::SUCCESS };
        }
    };

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("error: failed to start runtime: {}", e);
            return ExitCode::from(1);
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, exit_code = e.exit_code(), "Session proxy failed");
            eprintln!("error: {}", e);
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run(cli: Cli) -> Result<(), StartupError> {
    let mut config = loader::load_config(cli.config.as_deref())?;
    cli.apply(&mut config);
    let config = loader::finalize(config)?;

    logging::init(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "session-proxy starting");

    let env = |key: &str| std::env::var(key).ok();
    let admin_key = loader::resolve_admin_key(&config, env)?;
    let initial = initial_session(&config, env)?;

    tracing::info!(
        listen_addr = ?config.listen_addr(),
        backend_protocol = %config.backend.protocol,
        request_timeout_ms = config.timeouts.request_ms,
        drain_timeout_ms = config.timeouts.drain_ms,
        "Configuration loaded"
    );

    let lifecycle = LifecycleManager::new(&config)?;
    let listener = lifecycle.bind().await?;

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let registry = Arc::new(SessionRegistry::new(config.timeouts.probe()));
    if let Some(spec) = initial.spec {
        tokio::spawn(startup::bootstrap_session(
            Arc::clone(&registry),
            spec,
            lifecycle.draining(),
        ));
    }

    // Keep the watcher handle alive for the lifetime of the server.
    let _session_watcher = match &config.backend.session_file {
        Some(path) => {
            let (file_watcher, updates) = SessionFileWatcher::new(path, initial.env_token.clone());
            match file_watcher.run() {
                Ok(handle) => {
                    tokio::spawn(watcher::apply_updates(
                        Arc::clone(&registry),
                        updates,
                        lifecycle.draining(),
                    ));
                    Some(handle)
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Session file watcher unavailable; rotation disabled");
                    None
                }
            }
        }
        None => None,
    };

    if let Some(api_key) = admin_key {
        let state = AdminState {
            registry: Arc::clone(&registry),
            tracker: lifecycle.tracker().clone(),
            lifecycle: lifecycle.subscribe(),
            api_key,
            default_host: config.backend.host.clone(),
        };
        admin::serve(config.admin.bind_address, state, lifecycle.draining()).await?;
    }

    let server = ProxyServer::new(&config, registry, lifecycle.handles());
    lifecycle
        .serve(listener, server.into_router(), signals::shutdown_signal())
        .await?;

    tracing::info!("Shutdown complete");
    Ok(())
}

struct InitialSession {
    spec: Option<SessionSpec>,
    env_token: Option<Token>,
}

/// Resolve and validate the startup session without touching the network.
fn initial_session<F>(config: &ProxyConfig, env: F) -> Result<InitialSession, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let source = config
        .backend
        .discovery_source()
        .ok_or(ConfigError::Validation(vec![ValidationError::Missing("backend_port")]))?;

    let (spec, env_token) = match source {
        DiscoverySource::Static { host, port } => {
            let token = loader::resolve_token(config, &env)?;
            (Some(SessionSpec { host, port, token: token.clone() }), Some(token))
        }
        DiscoverySource::SessionFile(path) => {
            let env_token = loader::resolve_token(config, &env).ok();
            match session::load_session_file(&path, env_token.as_ref()) {
                Ok(spec) => (Some(spec), env_token),
                Err(ConfigError::Io { path, source }) if source.kind() == io::ErrorKind::NotFound => {
                    // The watcher installs the session once the file appears,
                    // which still needs a token from somewhere.
                    if env_token.is_none() {
                        return Err(ConfigError::MissingToken(config.credentials.token_env.clone()));
                    }
                    tracing::warn!(path = %path, "Session file not present yet; waiting for it");
                    (None, env_token)
                }
                Err(e) => return Err(e),
            }
        }
    };

    if let Some(spec) = &spec {
        session::registry::validate(&spec.host, spec.port, &spec.token)
            .map_err(|e| ConfigError::InvalidSession(spec.token.scrub(&e.to_string())))?;
    }
    Ok(InitialSession { spec, env_token })
}
