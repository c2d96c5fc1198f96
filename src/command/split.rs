//! split-window: divide a pane and hand the new half to the backend.

use std::path::PathBuf;

use crate::entity::Session;
use crate::format::expand_format;
use crate::manager::{RegistryError, SplitOrientation};

use super::{Request, Response, Router};

/// Resolve the target pane, split it, then spawn a process into the new
/// pane. The spawn happens outside the registry lock; when it fails the new
/// pane is destroyed again rather than left hanging without a process.
pub(crate) fn run(router: &Router, req: &Request) -> Result<Response, RegistryError> {
    let target = router.manager().resolve_target(&req.target(), req.caller())?;
    let orientation = if req.flag_bool("h") {
        SplitOrientation::Horizontal
    } else {
        SplitOrientation::Vertical
    };

    let session = router.manager().get_session_by_id(target.session_id);
    let cwd = resolve_workdir(req.flag_str("c").as_deref(), session.as_ref());

    let pane = router.manager().split_pane(target.id, orientation)?;
    let pane = match router.attach_process(&pane, cwd) {
        Ok(pane) => pane,
        Err(response) => return Ok(response),
    };

    if req.flag_bool("P") {
        let ctx = router.manager().format_context(pane.id);
        let fmt = req
            .flag_str("F")
            .unwrap_or_else(|| "#{session_name}:#{window_index}.#{pane_index}".to_string());
        return Ok(Response::ok(format!("{}\n", expand_format(&fmt, &ctx))));
    }
    Ok(Response::ok(""))
}

/// Working-directory resolution order for a new pane: the explicit flag if
/// non-blank, the session's worktree override, the session root when it
/// still refers to an existing directory, then the server's own working
/// directory. Filesystem checks run on snapshots, never under the registry
/// lock.
pub fn resolve_workdir(flag: Option<&str>, session: Option<&Session>) -> Option<PathBuf> {
    if let Some(dir) = flag {
        if !dir.trim().is_empty() {
            return Some(PathBuf::from(dir));
        }
    }
    if let Some(session) = session {
        if let Some(worktree) = &session.worktree {
            return Some(worktree.path.clone());
        }
        if let Some(root) = &session.root_path {
            if root.is_dir() {
                return Some(root.clone());
            }
        }
    }
    std::env::current_dir().ok()
}
