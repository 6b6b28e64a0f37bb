//! Session file watcher for on-demand rotation.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::{mpsc, watch};

use crate::lifecycle::shutdown::triggered;
use crate::session::file::{load_session_file, SessionSpec};
use crate::session::{SessionRegistry, Token};

/// Watches a session file and emits a fresh [`SessionSpec`] whenever it changes.
pub struct SessionFileWatcher {
    path: PathBuf,
    fallback_token: Option<Token>,
    update_tx: mpsc::UnboundedSender<SessionSpec>,
}

impl SessionFileWatcher {
    /// Create a new watcher.
    ///
    /// Returns the watcher and a receiver for session updates.
    pub fn new(
        path: &Path,
        fallback_token: Option<Token>,
    ) -> (Self, mpsc::UnboundedReceiver<SessionSpec>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();
        (
            Self {
                path: path.to_path_buf(),
                fallback_token,
                update_tx,
            },
            update_rx,
        )
    }

    /// Start watching. The returned handle must be kept alive.
    ///
    /// The parent directory is watched rather than the file itself, so
    /// atomic replace-by-rename from the writer is still observed.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let tx = self.update_tx;
        let path = self.path.clone();
        let fallback = self.fallback_token;
        let file_name = path.file_name().map(|n| n.to_os_string());

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    let relevant = event
                        .paths
                        .iter()
                        .any(|p| p.file_name().map(|n| n.to_os_string()) == file_name);
                    if !relevant || !(event.kind.is_modify() || event.kind.is_create()) {
                        return;
                    }
                    match load_session_file(&path, fallback.as_ref()) {
                        Ok(spec) => {
                            tracing::info!(path = ?path, "Session file changed");
                            let _ = tx.send(spec);
                        }
                        Err(e) => {
                            // Writers may be mid-write; the next event retries.
                            tracing::warn!(path = ?path, error = %e, "Ignoring unreadable session file");
                        }
                    }
                }
                Err(e) => tracing::error!(error = ?e, "Session watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        watcher.watch(&dir, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?self.path, "Session file watcher started");
        Ok(watcher)
    }
}

/// Apply session updates to the registry until the channel closes or
/// `stop` flips to true.
pub async fn apply_updates(
    registry: Arc<SessionRegistry>,
    mut updates: mpsc::UnboundedReceiver<SessionSpec>,
    mut stop: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            update = updates.recv() => {
                let Some(spec) = update else { break };
                let token = spec.token.clone();
                if let Err(e) = registry.set_session(&spec.host, spec.port, spec.token).await {
                    tracing::warn!(
                        backend = %format!("{}:{}", spec.host, spec.port),
                        error_class = e.class(),
                        error = %token.scrub(&e.to_string()),
                        "Session update rejected; keeping current session"
                    );
                }
            }
            _ = triggered(&mut stop) => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn updates_are_applied_to_registry() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let registry = Arc::new(SessionRegistry::new(Duration::from_millis(500)));
        let (tx, rx) = mpsc::unbounded_channel();
        let (stop_tx, stop_rx) = watch::channel(false);
        let task = tokio::spawn(apply_updates(Arc::clone(&registry), rx, stop_rx));

        tx.send(SessionSpec {
            host: "127.0.0.1".into(),
            port,
            token: Token::new("rotated"),
        })
        .unwrap();

        for _ in 0..50 {
            if registry.has_session() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(registry.get_active_session().unwrap().token().expose(), "rotated");

        stop_tx.send(true).unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn file_changes_reach_the_channel() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.toml");
        std::fs::write(&path, "port = 1\ntoken = \"a\"\n").unwrap();

        let (watcher, mut rx) = SessionFileWatcher::new(&path, None);
        let _handle = watcher.run().unwrap();

        tokio::time::sleep(Duration::from_millis(200)).await;
        std::fs::write(&path, "port = 2\ntoken = \"b\"\n").unwrap();

        let spec = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let spec = rx.recv().await.unwrap();
                if spec.port == 2 {
                    return spec;
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(spec.token.expose(), "b");
    }
}
