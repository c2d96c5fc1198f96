//! Session, window and pane entities.
//!
//! The tree is owned by the [`SessionManager`](crate::manager::SessionManager);
//! everything here is plain data. Back-references (pane → window → session)
//! are stored as ids and resolved through the manager, never as owning links.

use std::path::PathBuf;
use std::time::{Instant, SystemTime};

/// Validate a session name. Names must be 1-64 chars, alphanumeric/hyphens/
/// underscores. The charset deliberately excludes `:`, `.` and `%`, which are
/// structural characters in target strings.
pub fn validate_session_name(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("session name must not be empty".into());
    }
    if name.len() > 64 {
        return Err(format!("session name too long ({} chars, max 64)", name.len()));
    }
    if !name.chars().all(|c| c.is_alphanumeric() || c == '-' || c == '_') {
        return Err(format!("session name contains invalid characters: {name}"));
    }
    Ok(())
}

/// Parse an external pane identifier of the form `%<digits>`.
pub fn parse_pane_id(s: &str) -> Option<u64> {
    let digits = s.strip_prefix('%')?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// A single terminal endpoint.
///
/// Pane ids are globally unique and monotonically assigned for the lifetime
/// of the process, so an external reference (`%N`) stays valid even after
/// display indexes shift.
#[derive(Debug, Clone)]
pub struct Pane {
    /// Globally unique id, never reused.
    pub id: u64,
    /// Display index within the owning window, 0-based and contiguous.
    pub index: usize,
    /// Width in character cells.
    pub width: u16,
    /// Height in character cells.
    pub height: u16,
    /// At most one pane per window carries this flag.
    pub active: bool,
    /// Path of the pseudo-terminal device, once a process is attached.
    pub tty_path: Option<String>,
    /// Pid of the attached process, if any.
    pub pid: Option<u32>,
    /// Owning session, as a plain id.
    pub session_id: u64,
    /// Owning session's name, the addressing key. Sessions are never
    /// renamed, so this stays in sync with the registry.
    pub session_name: String,
    /// Owning window, as its in-session index.
    pub window_index: usize,
}

impl Pane {
    /// External identifier, `%` followed by the pane id.
    pub fn external_id(&self) -> String {
        format!("%{}", self.id)
    }

    /// Target string of the owning window, `name:index`. Remains resolvable
    /// after this pane is destroyed, which directional navigation relies on.
    pub fn window_target(&self) -> String {
        format!("{}:{}", self.session_name, self.window_index)
    }
}

/// An ordered arrangement of panes within a session.
#[derive(Debug, Clone)]
pub struct Window {
    /// Index within the owning session, 0-based and contiguous.
    pub index: usize,
    pub name: String,
    /// Panes in display order (not creation order).
    pub panes: Vec<Pane>,
    /// Index of the active pane. Always valid while the window has panes,
    /// except transiently inside a removal holding the write lock.
    pub active_pn: usize,
    /// Owning session, as a plain id.
    pub session_id: u64,
}

impl Window {
    /// The pane at `active_pn` when that index is valid, else the first
    /// pane. Only `None` for a window with zero panes, which the manager
    /// never lets escape its lock scope.
    pub fn active_pane(&self) -> Option<&Pane> {
        self.panes.get(self.active_pn).or_else(|| self.panes.first())
    }
}

/// Worktree metadata attached to a session. The path overrides the session
/// root when resolving a working directory for new panes.
#[derive(Debug, Clone)]
pub struct WorktreeInfo {
    pub path: PathBuf,
    pub branch: Option<String>,
}

/// A named, top-level container of windows.
#[derive(Debug, Clone)]
pub struct Session {
    /// Unique id, assigned at creation, never reused.
    pub id: u64,
    /// Unique among live sessions; the primary addressing key.
    pub name: String,
    /// Wall-clock creation time, for display.
    pub created_at: SystemTime,
    /// Monotonic creation time, for idle arithmetic.
    pub created_instant: Instant,
    /// Monotonic timestamp of the most recent activity, if any.
    pub last_activity: Option<Instant>,
    pub is_idle: bool,
    /// Windows in display order.
    pub windows: Vec<Window>,
    /// Root working directory for new panes, if configured.
    pub root_path: Option<PathBuf>,
    /// Worktree override, preferred over `root_path` when present.
    pub worktree: Option<WorktreeInfo>,
}

impl Session {
    /// Monotonic reference point for idle checks: the last activity, or the
    /// creation instant when no activity was ever recorded.
    pub fn activity_reference(&self) -> Instant {
        self.last_activity.unwrap_or(self.created_instant)
    }
}
