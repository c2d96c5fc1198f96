//! select-pane: directional movement within a window.

use crate::manager::RegistryError;
use crate::target::{navigate, Direction};

use super::{Request, Response, Router};

/// Move from the current pane in the flagged direction and activate the
/// destination. With no direction flag the current pane is re-activated.
pub(crate) fn run(router: &Router, req: &Request) -> Result<Response, RegistryError> {
    let direction = if req.flag_bool("L") {
        Some(Direction::Left)
    } else if req.flag_bool("R") {
        Some(Direction::Right)
    } else if req.flag_bool("U") {
        Some(Direction::Up)
    } else if req.flag_bool("D") {
        Some(Direction::Down)
    } else {
        None
    };
    let pane = navigate(router.manager(), &req.target(), req.caller(), direction)?;
    router.manager().set_active_pane(pane.id)?;
    Ok(Response::ok(""))
}
