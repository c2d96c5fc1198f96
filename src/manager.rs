//! The session registry: one lock around the whole session/window/pane tree.
//!
//! Every operation acquires the registry's reader/writer lock for its full
//! duration, so no caller can observe a partially applied mutation. Reads
//! (resolution, listing, accessors) take the shared mode; mutations take the
//! exclusive mode. No operation calls out to a collaborator while holding
//! the lock, and lock hold times are bounded by in-memory traversal only.
//!
//! Structural and idle-state changes bump a revision counter under the write
//! lock, published through a `watch` channel so change-watchers can detect
//! "something changed" without diffing the tree.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use parking_lot::RwLock;
use tokio::sync::watch;

use crate::activity::IdlePolicy;
use crate::entity::{
    parse_pane_id, validate_session_name, Pane, Session, Window, WorktreeInfo,
};
use crate::format::FormatContext;
use crate::target::{parse_target, TargetSpec};

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("duplicate session name: {0}")]
    DuplicateName(String),

    #[error("invalid session name: {0}")]
    InvalidName(String),

    #[error("can't find {0}")]
    NotFound(String),

    #[error("invalid index in target: {0}")]
    InvalidIndex(String),

    #[error("index out of range: {0}")]
    OutOfRange(String),

    #[error("window has no panes")]
    NoPanes,
}

/// Which way a pane is divided by a split.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitOrientation {
    /// Side by side; the new pane takes half the width.
    Horizontal,
    /// Stacked; the new pane takes half the height.
    Vertical,
}

struct ManagerInner {
    /// Sessions in creation order (ascending id).
    sessions: Vec<Session>,
    next_session_id: u64,
    next_pane_id: u64,
    state_rev: u64,
}

/// Owns all sessions, windows and panes, and serializes access to them.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<RwLock<ManagerInner>>,
    policy: IdlePolicy,
    rev_tx: Arc<watch::Sender<u64>>,
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionManager {
    pub fn new() -> Self {
        Self::with_policy(IdlePolicy::default())
    }

    pub fn with_policy(policy: IdlePolicy) -> Self {
        let (rev_tx, _) = watch::channel(0);
        Self {
            inner: Arc::new(RwLock::new(ManagerInner {
                sessions: Vec::new(),
                next_session_id: 0,
                next_pane_id: 0,
                state_rev: 0,
            })),
            policy,
            rev_tx: Arc::new(rev_tx),
        }
    }

    /// Bump the state revision. Must be called with the write lock held,
    /// after the mutation is fully applied.
    fn mark_state_mutation_locked(&self, inner: &mut ManagerInner) {
        inner.state_rev += 1;
        self.rev_tx.send_replace(inner.state_rev);
    }

    /// Subscribe to state-revision changes. Receivers see a monotonically
    /// increasing counter; equal values mean nothing changed in between.
    pub fn subscribe_state(&self) -> watch::Receiver<u64> {
        self.rev_tx.subscribe()
    }

    /// Current state revision.
    pub fn state_rev(&self) -> u64 {
        self.inner.read().state_rev
    }

    fn locate_pane(inner: &ManagerInner, id: u64) -> Option<(usize, usize, usize)> {
        for (si, session) in inner.sessions.iter().enumerate() {
            for (wi, window) in session.windows.iter().enumerate() {
                if let Some(pi) = window.panes.iter().position(|p| p.id == id) {
                    return Some((si, wi, pi));
                }
            }
        }
        None
    }

    fn session_position(inner: &ManagerInner, name: &str) -> Option<usize> {
        inner.sessions.iter().position(|s| s.name == name)
    }

    // ── Creation ───────────────────────────────────────────────────────

    /// Create a session with one window containing one pane.
    ///
    /// Fails with `DuplicateName` if the name is already in use, leaving
    /// the registry unchanged. Returns snapshots of the new session and its
    /// initial pane.
    pub fn create_session(
        &self,
        name: &str,
        window_name: &str,
        width: u16,
        height: u16,
    ) -> Result<(Session, Pane), RegistryError> {
        validate_session_name(name).map_err(RegistryError::InvalidName)?;
        let mut inner = self.inner.write();
        if Self::session_position(&inner, name).is_some() {
            return Err(RegistryError::DuplicateName(name.to_string()));
        }

        let session_id = inner.next_session_id;
        inner.next_session_id += 1;
        let pane_id = inner.next_pane_id;
        inner.next_pane_id += 1;

        let window_name = if window_name.is_empty() {
            "0".to_string()
        } else {
            window_name.to_string()
        };
        let pane = Pane {
            id: pane_id,
            index: 0,
            width,
            height,
            active: true,
            tty_path: None,
            pid: None,
            session_id,
            session_name: name.to_string(),
            window_index: 0,
        };
        let window = Window {
            index: 0,
            name: window_name,
            panes: vec![pane.clone()],
            active_pn: 0,
            session_id,
        };
        let session = Session {
            id: session_id,
            name: name.to_string(),
            created_at: SystemTime::now(),
            created_instant: Instant::now(),
            last_activity: None,
            is_idle: false,
            windows: vec![window],
            root_path: None,
            worktree: None,
        };
        let snapshot = session.clone();
        inner.sessions.push(session);
        self.mark_state_mutation_locked(&mut inner);
        tracing::info!(session = %name, pane = %pane.external_id(), "session created");
        Ok((snapshot, pane))
    }

    // ── Resolution ─────────────────────────────────────────────────────

    /// Resolve a target string to a pane under one shared-lock acquisition.
    ///
    /// `caller` is the pane id of the requesting client, consulted only by
    /// the empty target.
    pub fn resolve_target(
        &self,
        target: &str,
        caller: Option<u64>,
    ) -> Result<Pane, RegistryError> {
        let spec = parse_target(target)?;
        let inner = self.inner.read();
        Self::resolve_spec(&inner, &spec, caller).map(|p| p.clone())
    }

    fn resolve_spec<'a>(
        inner: &'a ManagerInner,
        spec: &TargetSpec,
        caller: Option<u64>,
    ) -> Result<&'a Pane, RegistryError> {
        match spec {
            TargetSpec::CallerOrDefault => {
                if let Some(id) = caller {
                    if let Some((si, wi, pi)) = Self::locate_pane(inner, id) {
                        return Ok(&inner.sessions[si].windows[wi].panes[pi]);
                    }
                }
                let session = inner
                    .sessions
                    .iter()
                    .min_by_key(|s| s.id)
                    .ok_or_else(|| RegistryError::NotFound("any session".to_string()))?;
                let window = session
                    .windows
                    .first()
                    .ok_or_else(|| RegistryError::NotFound(session.name.clone()))?;
                window.active_pane().ok_or(RegistryError::NoPanes)
            }
            TargetSpec::PaneId(id) => {
                let (si, wi, pi) = Self::locate_pane(inner, *id)
                    .ok_or_else(|| RegistryError::NotFound(format!("pane %{id}")))?;
                Ok(&inner.sessions[si].windows[wi].panes[pi])
            }
            TargetSpec::Session(name) => {
                let si = Self::session_position(inner, name)
                    .ok_or_else(|| RegistryError::NotFound(format!("session: {name}")))?;
                let window = inner.sessions[si]
                    .windows
                    .first()
                    .ok_or_else(|| RegistryError::NotFound(name.clone()))?;
                window.active_pane().ok_or(RegistryError::NoPanes)
            }
            TargetSpec::Indexed {
                session,
                window,
                pane,
            } => {
                let si = Self::session_position(inner, session)
                    .ok_or_else(|| RegistryError::NotFound(format!("session: {session}")))?;
                let windows = &inner.sessions[si].windows;
                let w = match window {
                    None => windows
                        .first()
                        .ok_or_else(|| RegistryError::NotFound(session.clone()))?,
                    Some(wi) => windows.get(*wi).ok_or_else(|| {
                        RegistryError::OutOfRange(format!("{session}:{wi}"))
                    })?,
                };
                match pane {
                    None => w.active_pane().ok_or(RegistryError::NoPanes),
                    Some(pi) => w.panes.get(*pi).ok_or_else(|| {
                        RegistryError::OutOfRange(format!("{session}:{}.{pi}", w.index))
                    }),
                }
            }
        }
    }

    /// Resolve a target string to a session: its own name form, any pane it
    /// contains, or the empty target (lowest-id session).
    pub fn resolve_session_target(&self, target: &str) -> Result<Session, RegistryError> {
        let spec = parse_target(target)?;
        let inner = self.inner.read();
        let session = match &spec {
            TargetSpec::CallerOrDefault => inner
                .sessions
                .iter()
                .min_by_key(|s| s.id)
                .ok_or_else(|| RegistryError::NotFound("any session".to_string()))?,
            TargetSpec::PaneId(id) => {
                let (si, _, _) = Self::locate_pane(&inner, *id)
                    .ok_or_else(|| RegistryError::NotFound(format!("pane %{id}")))?;
                &inner.sessions[si]
            }
            TargetSpec::Session(name)
            | TargetSpec::Indexed { session: name, .. } => {
                let si = Self::session_position(&inner, name)
                    .ok_or_else(|| RegistryError::NotFound(format!("session: {name}")))?;
                &inner.sessions[si]
            }
        };
        Ok(session.clone())
    }

    /// Return the ordered pane list of the window containing `window_key`.
    ///
    /// The whole list is produced under one shared-lock acquisition; callers
    /// must consume the returned snapshot as one unit rather than re-querying
    /// pane by pane, or they reintroduce the inconsistent-read window this
    /// method exists to close.
    pub fn list_panes_by_window_target(
        &self,
        window_key: &str,
        exclude_id: Option<u64>,
        active_only: bool,
    ) -> Result<Vec<Pane>, RegistryError> {
        let spec = parse_target(window_key)?;
        let inner = self.inner.read();
        let window: &Window = match &spec {
            TargetSpec::CallerOrDefault => {
                return Err(RegistryError::NotFound("window target".to_string()))
            }
            TargetSpec::PaneId(id) => {
                let (si, wi, _) = Self::locate_pane(&inner, *id)
                    .ok_or_else(|| RegistryError::NotFound(format!("pane %{id}")))?;
                &inner.sessions[si].windows[wi]
            }
            TargetSpec::Session(name) => {
                let si = Self::session_position(&inner, name)
                    .ok_or_else(|| RegistryError::NotFound(format!("session: {name}")))?;
                inner.sessions[si]
                    .windows
                    .first()
                    .ok_or_else(|| RegistryError::NotFound(name.clone()))?
            }
            TargetSpec::Indexed {
                session, window, ..
            } => {
                let si = Self::session_position(&inner, session)
                    .ok_or_else(|| RegistryError::NotFound(format!("session: {session}")))?;
                let windows = &inner.sessions[si].windows;
                match window {
                    None => windows
                        .first()
                        .ok_or_else(|| RegistryError::NotFound(session.clone()))?,
                    Some(wi) => windows.get(*wi).ok_or_else(|| {
                        RegistryError::OutOfRange(format!("{session}:{wi}"))
                    })?,
                }
            }
        };
        let active_id = window.active_pane().map(|p| p.id);
        Ok(window
            .panes
            .iter()
            .filter(|p| exclude_id != Some(p.id))
            .filter(|p| !active_only || Some(p.id) == active_id)
            .cloned()
            .collect())
    }

    // ── Activity and idle state ────────────────────────────────────────

    /// Stamp the owning session's last-activity time.
    ///
    /// Returns true exactly when this call transitions the session from
    /// idle to active. Unparseable or unknown pane ids are a no-op.
    pub fn update_activity_by_pane_id(&self, pane_id: &str) -> bool {
        let Some(id) = parse_pane_id(pane_id) else {
            return false;
        };
        let mut inner = self.inner.write();
        let Some((si, _, _)) = Self::locate_pane(&inner, id) else {
            return false;
        };
        let woke = {
            let session = &mut inner.sessions[si];
            session.last_activity = Some(Instant::now());
            if session.is_idle {
                session.is_idle = false;
                tracing::debug!(session = %session.name, "session woke from idle");
                true
            } else {
                false
            }
        };
        if woke {
            self.mark_state_mutation_locked(&mut inner);
        }
        woke
    }

    /// Compare every session's inactivity span against the idle threshold
    /// and flip `is_idle` where it disagrees. Returns true iff at least one
    /// session changed. Calling this twice with no intervening time or
    /// activity yields `false` the second time.
    pub fn check_idle_state(&self) -> bool {
        let threshold = self.policy.idle_threshold;
        let mut inner = self.inner.write();
        let mut changed = false;
        for session in &mut inner.sessions {
            let should_idle = session.activity_reference().elapsed() >= threshold;
            if session.is_idle != should_idle {
                session.is_idle = should_idle;
                tracing::debug!(session = %session.name, idle = should_idle, "idle flag flipped");
                changed = true;
            }
        }
        if changed {
            self.mark_state_mutation_locked(&mut inner);
        }
        changed
    }

    /// How long a poller should sleep before the next `check_idle_state`:
    /// short while anything is active, long when everything (or nothing)
    /// is idle.
    pub fn recommended_idle_check_interval(&self) -> Duration {
        let inner = self.inner.read();
        if inner.sessions.iter().any(|s| !s.is_idle) {
            self.policy.active_check_interval
        } else {
            self.policy.idle_check_interval
        }
    }

    // ── Accessors and simple mutators ──────────────────────────────────

    /// Whether a pane with the given external id (`%N`) exists.
    pub fn has_pane(&self, id: &str) -> bool {
        let Some(id) = parse_pane_id(id) else {
            return false;
        };
        let inner = self.inner.read();
        Self::locate_pane(&inner, id).is_some()
    }

    /// Set a session's root working directory.
    pub fn set_root_path(&self, session: &str, path: PathBuf) -> Result<(), RegistryError> {
        let mut inner = self.inner.write();
        let si = Self::session_position(&inner, session)
            .ok_or_else(|| RegistryError::NotFound(format!("session: {session}")))?;
        inner.sessions[si].root_path = Some(path);
        self.mark_state_mutation_locked(&mut inner);
        Ok(())
    }

    /// Attach worktree metadata to a session.
    pub fn set_worktree_info(
        &self,
        session: &str,
        info: WorktreeInfo,
    ) -> Result<(), RegistryError> {
        let mut inner = self.inner.write();
        let si = Self::session_position(&inner, session)
            .ok_or_else(|| RegistryError::NotFound(format!("session: {session}")))?;
        inner.sessions[si].worktree = Some(info);
        self.mark_state_mutation_locked(&mut inner);
        Ok(())
    }

    /// Snapshot of all sessions, in creation order.
    pub fn sessions(&self) -> Vec<Session> {
        self.inner.read().sessions.clone()
    }

    /// Snapshot of one session by name.
    pub fn get_session(&self, name: &str) -> Option<Session> {
        let inner = self.inner.read();
        Self::session_position(&inner, name).map(|si| inner.sessions[si].clone())
    }

    /// Snapshot of one session by id.
    pub fn get_session_by_id(&self, id: u64) -> Option<Session> {
        let inner = self.inner.read();
        inner.sessions.iter().find(|s| s.id == id).cloned()
    }

    /// Build the layered pane/window/session context for format expansion,
    /// all under one shared-lock acquisition. Layers for a dangling pane id
    /// are `None` and expand to `"0"`/`""`.
    pub fn format_context(&self, pane_id: u64) -> FormatContext {
        let inner = self.inner.read();
        match Self::locate_pane(&inner, pane_id) {
            Some((si, wi, pi)) => FormatContext {
                pane: Some(inner.sessions[si].windows[wi].panes[pi].clone()),
                window: Some(inner.sessions[si].windows[wi].clone()),
                session: Some(inner.sessions[si].clone()),
            },
            None => FormatContext::default(),
        }
    }

    // ── Structural mutation ────────────────────────────────────────────

    /// Split the given pane, inserting the new pane directly after it in
    /// display order. The new pane takes half the target's width (horizontal)
    /// or height (vertical), becomes the window's active pane, and is
    /// returned as a snapshot with no process attached yet.
    pub fn split_pane(
        &self,
        target_pane: u64,
        orientation: SplitOrientation,
    ) -> Result<Pane, RegistryError> {
        let mut inner = self.inner.write();
        let (si, wi, pi) = Self::locate_pane(&inner, target_pane)
            .ok_or_else(|| RegistryError::NotFound(format!("pane %{target_pane}")))?;
        let pane_id = inner.next_pane_id;
        inner.next_pane_id += 1;

        let session_id = inner.sessions[si].id;
        let session_name = inner.sessions[si].name.clone();
        let window = &mut inner.sessions[si].windows[wi];
        let (width, height) = {
            let target = &window.panes[pi];
            (target.width, target.height)
        };
        let (new_size, target_size) = match orientation {
            SplitOrientation::Horizontal => {
                let new_w = width / 2;
                ((new_w, height), (width - new_w, height))
            }
            SplitOrientation::Vertical => {
                let new_h = height / 2;
                ((width, new_h), (width, height - new_h))
            }
        };
        {
            let target = &mut window.panes[pi];
            target.width = target_size.0;
            target.height = target_size.1;
        }
        for pane in window.panes.iter_mut() {
            pane.active = false;
        }
        let new_pane = Pane {
            id: pane_id,
            index: pi + 1,
            width: new_size.0,
            height: new_size.1,
            active: true,
            tty_path: None,
            pid: None,
            session_id,
            session_name,
            window_index: window.index,
        };
        window.panes.insert(pi + 1, new_pane.clone());
        for (i, pane) in window.panes.iter_mut().enumerate() {
            pane.index = i;
        }
        window.active_pn = pi + 1;
        self.mark_state_mutation_locked(&mut inner);
        tracing::info!(pane = %new_pane.external_id(), ?orientation, "pane split");
        Ok(new_pane)
    }

    /// Record the process spawned for a pane. Returns the updated snapshot.
    pub fn set_pane_process(
        &self,
        pane: u64,
        pid: Option<u32>,
        tty_path: Option<String>,
    ) -> Result<Pane, RegistryError> {
        let mut inner = self.inner.write();
        let (si, wi, pi) = Self::locate_pane(&inner, pane)
            .ok_or_else(|| RegistryError::NotFound(format!("pane %{pane}")))?;
        let snapshot = {
            let p = &mut inner.sessions[si].windows[wi].panes[pi];
            p.pid = pid;
            p.tty_path = tty_path;
            p.clone()
        };
        self.mark_state_mutation_locked(&mut inner);
        Ok(snapshot)
    }

    /// Make the given pane the active pane of its window.
    pub fn set_active_pane(&self, pane: u64) -> Result<Pane, RegistryError> {
        let mut inner = self.inner.write();
        let (si, wi, pi) = Self::locate_pane(&inner, pane)
            .ok_or_else(|| RegistryError::NotFound(format!("pane %{pane}")))?;
        let snapshot = {
            let window = &mut inner.sessions[si].windows[wi];
            for p in window.panes.iter_mut() {
                p.active = false;
            }
            window.panes[pi].active = true;
            window.active_pn = pi;
            window.panes[pi].clone()
        };
        self.mark_state_mutation_locked(&mut inner);
        Ok(snapshot)
    }

    /// Destroy a pane. Remaining panes are reindexed to stay contiguous and
    /// the active index is clamped; an emptied window is removed, and an
    /// emptied session with it. Returns the removed pane so the caller can
    /// signal its process after releasing the lock.
    pub fn kill_pane(&self, pane: u64) -> Result<Pane, RegistryError> {
        let mut inner = self.inner.write();
        let (si, wi, pi) = Self::locate_pane(&inner, pane)
            .ok_or_else(|| RegistryError::NotFound(format!("pane %{pane}")))?;
        let removed = inner.sessions[si].windows[wi].panes.remove(pi);

        let window_emptied = inner.sessions[si].windows[wi].panes.is_empty();
        if window_emptied {
            inner.sessions[si].windows.remove(wi);
            for (i, window) in inner.sessions[si].windows.iter_mut().enumerate() {
                window.index = i;
                for p in window.panes.iter_mut() {
                    p.window_index = i;
                }
            }
            if inner.sessions[si].windows.is_empty() {
                let session = inner.sessions.remove(si);
                tracing::info!(session = %session.name, "session destroyed (last pane killed)");
            }
        } else {
            let window = &mut inner.sessions[si].windows[wi];
            for (i, p) in window.panes.iter_mut().enumerate() {
                p.index = i;
            }
            if pi < window.active_pn {
                window.active_pn -= 1;
            }
            if window.active_pn >= window.panes.len() {
                window.active_pn = window.panes.len() - 1;
            }
            if removed.active {
                for p in window.panes.iter_mut() {
                    p.active = false;
                }
                let active_pn = window.active_pn;
                window.panes[active_pn].active = true;
            }
        }
        self.mark_state_mutation_locked(&mut inner);
        tracing::info!(pane = %removed.external_id(), "pane destroyed");
        Ok(removed)
    }

    /// Destroy a session and everything in it. Returns all removed panes so
    /// the caller can signal their processes after releasing the lock.
    pub fn kill_session(&self, name: &str) -> Result<Vec<Pane>, RegistryError> {
        let mut inner = self.inner.write();
        let si = Self::session_position(&inner, name)
            .ok_or_else(|| RegistryError::NotFound(format!("session: {name}")))?;
        let session = inner.sessions.remove(si);
        let panes: Vec<Pane> = session
            .windows
            .into_iter()
            .flat_map(|w| w.panes)
            .collect();
        self.mark_state_mutation_locked(&mut inner);
        tracing::info!(session = %name, panes = panes.len(), "session destroyed");
        Ok(panes)
    }
}
