//! Panic-isolated command workers.
//!
//! Handlers run inside `catch_unwind`, so a command that blows up produces
//! a failure response and a logged stack trace instead of taking the server
//! down. After a recovered panic the worker restarts its loop following an
//! exponential backoff; a successful iteration resets the backoff.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, Mutex};
use tokio_util::sync::CancellationToken;

use super::{Request, Response, Router};

/// First restart delay after a panic.
pub const INITIAL_BACKOFF: Duration = Duration::from_millis(100);
/// Upper bound on the restart delay.
pub const MAX_BACKOFF: Duration = Duration::from_secs(5);

/// The restart delay following one more consecutive failure: double the
/// current delay, clamped to [`MAX_BACKOFF`]. The clamp also covers
/// multiplication overflow, so the delay can never decrease.
pub fn next_backoff(current: Duration) -> Duration {
    current
        .checked_mul(2)
        .map_or(MAX_BACKOFF, |d| d.min(MAX_BACKOFF))
}

/// One unit of work: a request and the channel its response returns on.
pub struct Job {
    pub request: Request,
    pub reply: oneshot::Sender<Response>,
}

/// Spawn `count` workers dispatching through the router. Jobs sent on the
/// returned channel are picked up by whichever worker is free.
pub fn spawn_workers(
    router: Router,
    count: usize,
    cancel: CancellationToken,
) -> mpsc::Sender<Job> {
    spawn_workers_with(move |req| router.dispatch(req), count, cancel)
}

/// Worker pool over an arbitrary handler; the production path goes through
/// [`spawn_workers`], tests inject misbehaving handlers here.
pub fn spawn_workers_with<F>(
    handler: F,
    count: usize,
    cancel: CancellationToken,
) -> mpsc::Sender<Job>
where
    F: Fn(&Request) -> Response + Send + Sync + 'static,
{
    let (tx, rx) = mpsc::channel::<Job>(64);
    let rx = Arc::new(Mutex::new(rx));
    let handler = Arc::new(handler);
    for id in 0..count.max(1) {
        tokio::spawn(run_worker(id, handler.clone(), rx.clone(), cancel.clone()));
    }
    tx
}

async fn run_worker<F>(
    id: usize,
    handler: Arc<F>,
    rx: Arc<Mutex<mpsc::Receiver<Job>>>,
    cancel: CancellationToken,
) where
    F: Fn(&Request) -> Response + Send + Sync + 'static,
{
    let mut backoff = INITIAL_BACKOFF;
    loop {
        let job = tokio::select! {
            _ = cancel.cancelled() => {
                tracing::debug!(worker = id, "worker stopping");
                return;
            }
            job = async { rx.lock().await.recv().await } => match job {
                Some(job) => job,
                None => return,
            },
        };
        let command = job.request.command.clone();
        match catch_unwind(AssertUnwindSafe(|| handler(&job.request))) {
            Ok(response) => {
                backoff = INITIAL_BACKOFF;
                let _ = job.reply.send(response);
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                tracing::error!(
                    worker = id,
                    command = %command,
                    panic = %message,
                    backtrace = %std::backtrace::Backtrace::force_capture(),
                    "command handler panicked, restarting worker after backoff"
                );
                let _ = job
                    .reply
                    .send(Response::failure(format!("{command}: internal error: {message}")));
                tokio::time::sleep(backoff).await;
                backoff = next_backoff(backoff);
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
