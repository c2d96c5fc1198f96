//! Unix socket control server.
//!
//! Listens on a Unix domain socket for newline-delimited JSON requests.
//! Each line is a [`Request`](crate::command::Request); each reply line is
//! a [`Response`](crate::command::Response). Connections only parse and
//! frame; execution happens on the panic-isolated worker pool.

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::command::worker::{self, Job};
use crate::command::{Request, Response, Router};

/// Start the control server, accepting connections until `cancel` fires.
pub async fn serve(
    router: Router,
    socket_path: &Path,
    workers: usize,
    cancel: CancellationToken,
) -> io::Result<()> {
    // Remove a stale socket file if it exists, but check for an active
    // server first. The connect probe runs on the blocking pool so an
    // unresponsive peer can't wedge the runtime.
    if socket_path.exists() {
        let path_owned = socket_path.to_path_buf();
        let is_active = tokio::time::timeout(
            Duration::from_secs(3),
            tokio::task::spawn_blocking(move || {
                std::os::unix::net::UnixStream::connect(&path_owned).is_ok()
            }),
        )
        .await;

        match is_active {
            Ok(Ok(true)) => {
                return Err(io::Error::new(
                    io::ErrorKind::AddrInUse,
                    format!(
                        "another server is already listening on {}",
                        socket_path.display()
                    ),
                ));
            }
            _ => {
                // Socket exists but nothing answered — stale, safe to remove.
                std::fs::remove_file(socket_path)?;
            }
        }
    }

    if let Some(parent) = socket_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let listener = UnixListener::bind(socket_path)?;

    // Restrict socket permissions to owner only (0600).
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(0o600))?;
    }

    let jobs = worker::spawn_workers(router, workers, cancel.clone());
    tracing::info!(path = %socket_path.display(), workers, "control socket listening");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::debug!("control server received cancel signal, stopping accept loop");
                break;
            }
            result = listener.accept() => {
                match result {
                    Ok((stream, _addr)) => {
                        let jobs = jobs.clone();
                        tokio::spawn(async move {
                            if let Err(e) = handle_client(stream, jobs).await {
                                tracing::debug!(?e, "client connection ended");
                            }
                        });
                    }
                    Err(e) => {
                        tracing::error!(?e, "failed to accept Unix socket connection");
                        // Backoff to prevent a tight loop under sustained accept errors.
                        tokio::time::sleep(Duration::from_millis(100)).await;
                    }
                }
            }
        }
    }
    Ok(())
}

/// Compute the default Unix socket path for this user.
pub fn default_socket_path() -> PathBuf {
    let runtime_dir = std::env::var("XDG_RUNTIME_DIR")
        .unwrap_or_else(|_| format!("/tmp/pmux-{}", whoami()));
    PathBuf::from(runtime_dir).join("pmux.sock")
}

fn whoami() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("LOGNAME"))
        .unwrap_or_else(|_| "unknown".to_string())
}

/// Handle one client connection: read request lines, execute through the
/// worker pool, write response lines.
async fn handle_client(stream: UnixStream, jobs: mpsc::Sender<Job>) -> io::Result<()> {
    let (read_half, mut write_half) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let response = match serde_json::from_str::<Request>(&line) {
            Ok(request) => {
                let (reply_tx, reply_rx) = oneshot::channel();
                if jobs
                    .send(Job {
                        request,
                        reply: reply_tx,
                    })
                    .await
                    .is_err()
                {
                    // Workers are gone; the server is shutting down.
                    break;
                }
                reply_rx
                    .await
                    .unwrap_or_else(|_| Response::failure("request dropped by worker"))
            }
            Err(e) => Response::failure(format!("bad request: {e}")),
        };

        let mut payload = serde_json::to_vec(&response)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        payload.push(b'\n');
        write_half.write_all(&payload).await?;
        write_half.flush().await?;
    }
    Ok(())
}
