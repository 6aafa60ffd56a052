use super::error::{Result, SocketError};
use crate::history::Snapshot;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{oneshot, watch};

/// Shared view of a run's state that the control socket reports back over
/// `GET /status`, kept fresh by the Agent as the graph progresses. Carries
/// the full Status Snapshot (not just a coarse status enum) so a parent run
/// or the CLI can read per-step state without going through the History
/// Store.
#[derive(Debug, Clone)]
pub struct StatusView {
    pub snapshot: Snapshot,
}

impl StatusView {
    pub fn new(snapshot: Snapshot) -> Self {
        Self { snapshot }
    }
}

/// A listener bound to one run's control socket. `GET /status` answers with
/// the current [`StatusView`] as JSON; `POST /stop` triggers the cancellation
/// signal the Agent is watching and returns immediately.
pub struct Server {
    listener: UnixListener,
    path: PathBuf,
    status: watch::Receiver<StatusView>,
    stop_tx: Arc<std::sync::Mutex<Option<oneshot::Sender<()>>>>,
}

impl Server {
    /// Binds the control socket at `path`, probing for and removing a stale
    /// socket left behind by a crashed run first. Returns
    /// [`SocketError::RunAlreadyActive`] if another process answers on it.
    pub async fn bind(
        path: impl Into<PathBuf>,
        status: watch::Receiver<StatusView>,
        stop_tx: oneshot::Sender<()>,
    ) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        if path.exists() {
            if is_live(&path).await {
                return Err(SocketError::RunAlreadyActive(path));
            }
            std::fs::remove_file(&path)?;
        }

        let listener = UnixListener::bind(&path)?;
        // Socket must be private to this user before the run is reported
        // as active; a world-writable control socket would let any local
        // user stop someone else's run.
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))?;

        Ok(Self {
            listener,
            path,
            status,
            stop_tx: Arc::new(std::sync::Mutex::new(Some(stop_tx))),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Serves requests until the socket is closed or the process exits.
    /// Intended to run as its own `tokio::spawn`ed task.
    pub async fn serve(self) {
        loop {
            match self.listener.accept().await {
                Ok((stream, _addr)) => {
                    let status = self.status.clone();
                    let stop_tx = Arc::clone(&self.stop_tx);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, status, stop_tx).await {
                            tracing::debug!(error = %e, "control socket connection failed");
                        }
                    });
                }
                Err(e) => {
                    tracing::warn!(error = %e, "control socket accept failed");
                    break;
                }
            }
        }
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

async fn handle_connection(
    mut stream: UnixStream,
    status: watch::Receiver<StatusView>,
    stop_tx: Arc<std::sync::Mutex<Option<oneshot::Sender<()>>>>,
) -> std::io::Result<()> {
    let mut buf = [0u8; 4096];
    let n = stream.read(&mut buf).await?;
    let request = String::from_utf8_lossy(&buf[..n]);
    let mut lines = request.lines();
    let request_line = lines.next().unwrap_or_default();
    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or_default();
    let path = parts.next().unwrap_or_default();

    let (status_code, body) = match (method, path) {
        ("GET", "/status") => {
            let view = status.borrow().clone();
            let body = serde_json::to_string(&view.snapshot).unwrap_or_else(|_| "{}".to_string());
            (200, body)
        }
        ("POST", "/stop") => {
            if let Some(tx) = stop_tx.lock().unwrap().take() {
                let _ = tx.send(());
            }
            (200, "{}".to_string())
        }
        _ => (404, "{\"error\":\"not found\"}".to_string()),
    };

    let reason = if status_code == 200 { "OK" } else { "Not Found" };
    let response = format!(
        "HTTP/1.0 {status_code} {reason}\r\nContent-Length: {len}\r\n\r\n{body}",
        len = body.len(),
    );
    stream.write_all(response.as_bytes()).await?;
    stream.shutdown().await?;
    Ok(())
}

/// Probes a socket path with a short-timeout `GET /status`; an answer means
/// the owning Agent is still alive.
async fn is_live(path: &Path) -> bool {
    use dagu_support::client::{ControlClient, ControlClientConfig};
    use std::time::Duration;

    let client = ControlClient::new(ControlClientConfig::new().with_timeout(Duration::from_millis(500)));
    matches!(client.get(path, "/status").await, Ok(resp) if resp.status == 200)
}
