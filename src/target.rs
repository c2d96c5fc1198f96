//! Target strings: the addressing grammar for sessions, windows and panes.
//!
//! A target is resolved in this precedence order:
//!
//! 1. empty string — the caller's own pane, else the default pane
//! 2. `%<digits>` — a pane-id literal
//! 3. `<name>` — a session; its first window's active pane
//! 4. `<name>:` / `<name>:<window>` — a window; its active pane
//! 5. `<name>:<window>.<pane>` — a specific pane
//!
//! Parsing is pure; walking the tree happens inside the
//! [`SessionManager`](crate::manager::SessionManager) lock scope.

use crate::entity::{parse_pane_id, Pane};
use crate::manager::{RegistryError, SessionManager};

/// A parsed target string, not yet checked against live state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetSpec {
    /// Empty target: the caller's pane if it exists, else the default pane
    /// (active pane of the lowest-id session's first window).
    CallerOrDefault,
    /// `%N` pane-id literal.
    PaneId(u64),
    /// Bare session name.
    Session(String),
    /// `name:[window[.pane]]`. A `None` window means the first window; a
    /// `None` pane means the window's active pane.
    Indexed {
        session: String,
        window: Option<usize>,
        pane: Option<usize>,
    },
}

/// Parse a target string into a [`TargetSpec`].
///
/// Malformed `%` literals are `NotFound` (a dangling reference); non-numeric
/// window or pane components are `InvalidIndex`. Range checks happen later,
/// against live state.
pub fn parse_target(target: &str) -> Result<TargetSpec, RegistryError> {
    if target.is_empty() {
        return Ok(TargetSpec::CallerOrDefault);
    }
    if target.starts_with('%') {
        return parse_pane_id(target)
            .map(TargetSpec::PaneId)
            .ok_or_else(|| RegistryError::NotFound(target.to_string()));
    }
    let Some((name, rest)) = target.split_once(':') else {
        return Ok(TargetSpec::Session(target.to_string()));
    };
    let (window_part, pane_part) = match rest.split_once('.') {
        Some((w, p)) => (w, Some(p)),
        None => (rest, None),
    };
    let window = parse_index(window_part, target)?;
    let pane = match pane_part {
        Some(p) => parse_index(p, target)?,
        None => None,
    };
    Ok(TargetSpec::Indexed {
        session: name.to_string(),
        window,
        pane,
    })
}

/// Parse one index component. Empty means "unspecified"; anything else must
/// be an unsigned decimal integer.
fn parse_index(part: &str, target: &str) -> Result<Option<usize>, RegistryError> {
    if part.is_empty() {
        return Ok(None);
    }
    if !part.bytes().all(|b| b.is_ascii_digit()) {
        return Err(RegistryError::InvalidIndex(target.to_string()));
    }
    part.parse()
        .map(Some)
        .map_err(|_| RegistryError::InvalidIndex(target.to_string()))
}

/// A direction for pane navigation. Left/up step toward lower display
/// indexes, right/down toward higher ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Left,
    Right,
    Up,
    Down,
}

/// Resolve the pane reached by moving `direction` from the caller's current
/// pane. `None` is the neutral direction and returns the current pane.
///
/// The pane list is re-fetched from the registry and the caller's position
/// re-derived from that fresh list, because a cached index can go stale
/// between the initial resolution and this step: the caller's pane may have
/// been destroyed or moved concurrently. A pane missing from the fresh list
/// falls back to position 0 instead of failing. Movement clamps at the ends
/// of the list; there is no wraparound.
pub fn navigate(
    manager: &SessionManager,
    target: &str,
    caller: Option<u64>,
    direction: Option<Direction>,
) -> Result<Pane, RegistryError> {
    let current = manager.resolve_target(target, caller)?;
    let panes = manager.list_panes_by_window_target(&current.window_target(), None, false)?;
    if panes.is_empty() {
        return Err(RegistryError::NoPanes);
    }
    let pos = position_in(&panes, current.id);
    let dest = match direction {
        None => pos,
        Some(Direction::Left) | Some(Direction::Up) => pos.saturating_sub(1),
        Some(Direction::Right) | Some(Direction::Down) => (pos + 1).min(panes.len() - 1),
    };
    Ok(panes[dest].clone())
}

/// The position of `pane_id` in a freshly fetched pane list, falling back
/// to the first pane when the id is no longer present.
pub fn position_in(panes: &[Pane], pane_id: u64) -> usize {
    panes.iter().position(|p| p.id == pane_id).unwrap_or(0)
}
