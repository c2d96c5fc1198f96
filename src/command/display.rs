//! display-message: expand a format string against a target pane.

use crate::format::expand_format;
use crate::manager::RegistryError;

use super::{Request, Response, Router};

/// Without the `p` flag there is nothing to print and the command is a
/// no-op. With it, positional arguments are joined into one format string
/// and expanded against the resolved pane; a blank message prints a bare
/// newline.
pub(crate) fn run(router: &Router, req: &Request) -> Result<Response, RegistryError> {
    if !req.flag_bool("p") {
        return Ok(Response::ok(""));
    }
    let pane = router.manager().resolve_target(&req.target(), req.caller())?;
    let message = req.args.join(" ");
    if message.trim().is_empty() {
        return Ok(Response::ok("\n"));
    }
    let ctx = router.manager().format_context(pane.id);
    Ok(Response::ok(format!("{}\n", expand_format(&message, &ctx))))
}
