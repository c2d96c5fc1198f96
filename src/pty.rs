//! The pane-process boundary.
//!
//! The control plane does not do process I/O itself; it hands a
//! [`SpawnContext`] to a [`PaneBackend`] and records the resulting pid and
//! tty path on the pane. The native backend wraps `portable-pty`; the null
//! backend spawns nothing and exists for tests.

use std::collections::HashMap;
use std::io::Read;
use std::path::PathBuf;
use std::sync::Mutex;

use portable_pty::{native_pty_system, CommandBuilder, PtyPair, PtySize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PtyError {
    #[error("failed to open pty: {0}")]
    OpenPty(#[source] anyhow::Error),

    #[error("failed to spawn command: {0}")]
    SpawnCommand(#[source] anyhow::Error),

    #[error("failed to clone reader: {0}")]
    CloneReader(#[source] anyhow::Error),
}

/// What the control plane tells the spawning subsystem about a new pane.
#[derive(Debug, Clone)]
pub struct SpawnContext {
    pub rows: u16,
    pub cols: u16,
    /// Already-resolved working directory (flag, worktree, session root or
    /// server cwd, in that order — resolved by the caller).
    pub cwd: Option<PathBuf>,
    /// Shell override; falls back to `$SHELL`, then `/bin/sh`.
    pub shell: Option<String>,
}

/// A freshly spawned pane process.
pub struct PaneHandle {
    pub pid: Option<u32>,
    pub tty_path: Option<String>,
    /// Output side of the pseudo-terminal. The router drains this on a
    /// blocking thread to feed activity tracking.
    pub reader: Option<Box<dyn Read + Send>>,
}

/// The process-spawning collaborator the command handlers talk to.
pub trait PaneBackend: Send + Sync {
    /// Spawn a process for the pane with the given id.
    fn spawn(&self, pane_id: u64, ctx: &SpawnContext) -> Result<PaneHandle, PtyError>;

    /// Release the pane's process: signal its process group and drop the
    /// pty pair. Unknown ids are a no-op.
    fn release(&self, pane_id: u64);
}

struct PtyEntry {
    pair: PtyPair,
    _child: Box<dyn portable_pty::Child + Send + Sync>,
    pid: Option<u32>,
}

/// Backend that spawns real shells on pseudo-terminals.
#[derive(Default)]
pub struct NativeBackend {
    ptys: Mutex<HashMap<u64, PtyEntry>>,
}

impl NativeBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PaneBackend for NativeBackend {
    fn spawn(&self, pane_id: u64, ctx: &SpawnContext) -> Result<PaneHandle, PtyError> {
        let pty_system = native_pty_system();
        let size = PtySize {
            rows: ctx.rows,
            cols: ctx.cols,
            pixel_width: 0,
            pixel_height: 0,
        };
        let pair = pty_system.openpty(size).map_err(PtyError::OpenPty)?;

        let shell = ctx
            .shell
            .clone()
            .or_else(|| std::env::var("SHELL").ok())
            .unwrap_or_else(|| "/bin/sh".to_string());
        let mut cmd = CommandBuilder::new(&shell);
        cmd.env(
            "TERM",
            std::env::var("TERM").unwrap_or_else(|_| "xterm-256color".to_string()),
        );
        if let Some(ref dir) = ctx.cwd {
            cmd.cwd(dir);
        }

        let child = pair.slave.spawn_command(cmd).map_err(PtyError::SpawnCommand)?;
        let pid = child.process_id();
        let reader = pair
            .master
            .try_clone_reader()
            .map_err(PtyError::CloneReader)?;
        let tty_path = slave_tty_path(&pair);

        let mut ptys = self.ptys.lock().expect("pty table mutex poisoned");
        ptys.insert(
            pane_id,
            PtyEntry {
                pair,
                _child: child,
                pid,
            },
        );
        Ok(PaneHandle {
            pid,
            tty_path,
            reader: Some(reader),
        })
    }

    fn release(&self, pane_id: u64) {
        let entry = {
            let mut ptys = self.ptys.lock().expect("pty table mutex poisoned");
            ptys.remove(&pane_id)
        };
        if let Some(entry) = entry {
            if let Some(pid) = entry.pid {
                signal_process_group(pid);
            }
            // Dropping the entry closes the pty pair; a shell that ignored
            // the signal sees EOF/HUP on its controlling terminal.
            drop(entry);
        }
    }
}

/// Send SIGHUP to the child's process group.
///
/// Signals the entire group (negative pid) so processes spawned by the shell
/// receive it too; portable_pty calls setsid() when spawning, so the child
/// leads its own group.
fn signal_process_group(pid: u32) {
    if pid == 0 || pid > i32::MAX as u32 {
        tracing::warn!(pid, "PID is 0 or exceeds i32::MAX, cannot send signal");
        return;
    }
    #[cfg(unix)]
    unsafe {
        libc::kill(-(pid as i32), libc::SIGHUP);
    }
}

/// Resolve the slave tty device path of a pty pair, when the platform lets us.
#[cfg(target_os = "linux")]
fn slave_tty_path(pair: &PtyPair) -> Option<String> {
    use std::ffi::CStr;

    let fd = pair.master.as_raw_fd()?;
    let mut buf = [0 as libc::c_char; 128];
    let rc = unsafe { libc::ptsname_r(fd, buf.as_mut_ptr(), buf.len()) };
    if rc != 0 {
        return None;
    }
    let cstr = unsafe { CStr::from_ptr(buf.as_ptr()) };
    cstr.to_str().ok().map(str::to_string)
}

#[cfg(not(target_os = "linux"))]
fn slave_tty_path(_pair: &PtyPair) -> Option<String> {
    None
}

/// Backend that spawns nothing. Panes get no pid and no tty; used by unit
/// and integration tests where real shells would only add noise.
#[derive(Default)]
pub struct NullBackend;

impl NullBackend {
    pub fn new() -> Self {
        Self
    }
}

impl PaneBackend for NullBackend {
    fn spawn(&self, _pane_id: u64, _ctx: &SpawnContext) -> Result<PaneHandle, PtyError> {
        Ok(PaneHandle {
            pid: None,
            tty_path: None,
            reader: None,
        })
    }

    fn release(&self, _pane_id: u64) {}
}
