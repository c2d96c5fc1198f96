//! Command dispatch.
//!
//! A request moves through `Received → Resolved → Executed → Responded`:
//! the router resolves targets through the registry, hands the resolved
//! pane(s) to the command handler, and turns every error into a failure
//! response. Resolution failures short-circuit without invoking a handler.

pub mod display;
pub mod select;
pub mod split;
pub mod worker;

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::entity::{parse_pane_id, Pane};
use crate::format::{
    expand_format, FormatContext, DEFAULT_PANE_FORMAT, DEFAULT_SESSION_FORMAT,
    DEFAULT_WINDOW_FORMAT,
};
use crate::manager::{RegistryError, SessionManager};
use crate::pty::{PaneBackend, PaneHandle, SpawnContext};

/// A dynamically typed flag value.
///
/// Transports deliver flags as whatever their callers parsed; the coercions
/// below define the fallback for every unexpected type, so handlers never
/// need to care what actually arrived.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FlagValue {
    Bool(bool),
    Int(i64),
    Str(String),
}

impl FlagValue {
    pub fn as_bool(&self) -> bool {
        match self {
            FlagValue::Bool(b) => *b,
            FlagValue::Int(i) => *i != 0,
            FlagValue::Str(s) => !s.is_empty() && s != "0" && s != "false",
        }
    }

    pub fn as_int(&self) -> i64 {
        match self {
            FlagValue::Bool(b) => *b as i64,
            FlagValue::Int(i) => *i,
            FlagValue::Str(s) => s.parse().unwrap_or(0),
        }
    }

    pub fn as_string(&self) -> String {
        match self {
            FlagValue::Bool(true) => "1".to_string(),
            FlagValue::Bool(false) => String::new(),
            FlagValue::Int(i) => i.to_string(),
            FlagValue::Str(s) => s.clone(),
        }
    }
}

/// An inbound request, already parsed by the transport layer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Request {
    pub command: String,
    #[serde(default)]
    pub flags: HashMap<String, FlagValue>,
    #[serde(default)]
    pub args: Vec<String>,
    /// The requesting client's own pane, `%N` or empty.
    #[serde(default)]
    pub caller_pane: String,
}

impl Request {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ..Default::default()
        }
    }

    /// Caller pane id, if the caller identified itself with a valid `%N`.
    pub fn caller(&self) -> Option<u64> {
        parse_pane_id(&self.caller_pane)
    }

    pub fn flag_bool(&self, name: &str) -> bool {
        self.flags.get(name).map(FlagValue::as_bool).unwrap_or(false)
    }

    pub fn flag_str(&self, name: &str) -> Option<String> {
        self.flags.get(name).map(FlagValue::as_string)
    }

    /// The `t` flag: the target string, empty when absent.
    pub fn target(&self) -> String {
        self.flag_str("t").unwrap_or_default()
    }
}

/// The outbound response handed back to the transport layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl Response {
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            exit_code: 0,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// A failure response. stderr is always non-empty and newline-terminated.
    pub fn failure(message: impl Into<String>) -> Self {
        let mut message: String = message.into();
        if message.is_empty() {
            message = "unknown error".to_string();
        }
        if !message.ends_with('\n') {
            message.push('\n');
        }
        Self {
            exit_code: 1,
            stdout: String::new(),
            stderr: message,
        }
    }

    pub fn is_success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Dispatches requests to command handlers.
#[derive(Clone)]
pub struct Router {
    manager: SessionManager,
    backend: Arc<dyn PaneBackend>,
    default_size: (u16, u16),
    shell: Option<String>,
}

impl Router {
    pub fn new(manager: SessionManager, backend: Arc<dyn PaneBackend>) -> Self {
        Self {
            manager,
            backend,
            default_size: (80, 24),
            shell: None,
        }
    }

    /// Default width/height for sessions created without `x`/`y` flags.
    pub fn with_default_size(mut self, width: u16, height: u16) -> Self {
        self.default_size = (width, height);
        self
    }

    /// Shell override passed to the backend for every spawn.
    pub fn with_shell(mut self, shell: Option<String>) -> Self {
        self.shell = shell;
        self
    }

    pub fn manager(&self) -> &SessionManager {
        &self.manager
    }

    /// Execute one request to completion and produce its response.
    pub fn dispatch(&self, req: &Request) -> Response {
        tracing::debug!(command = %req.command, caller = %req.caller_pane, "request received");
        let result = match req.command.as_str() {
            "display-message" => display::run(self, req),
            "split-window" => split::run(self, req),
            "select-pane" => select::run(self, req),
            "new-session" => self.new_session(req),
            "kill-pane" => self.kill_pane(req),
            "kill-session" => self.kill_session(req),
            "list-sessions" => self.list_sessions(req),
            "list-windows" => self.list_windows(req),
            "list-panes" => self.list_panes(req),
            other => return Response::failure(format!("unknown command: {other}")),
        };
        match result {
            Ok(response) => response,
            Err(err) => Response::failure(err.to_string()),
        }
    }

    /// Spawn a process for a freshly created pane and record it.
    ///
    /// Called after the registry mutation, never under its lock. When the
    /// pane was concurrently destroyed before the process could be attached,
    /// the process is released again instead of leaking.
    pub(crate) fn attach_process(
        &self,
        pane: &Pane,
        cwd: Option<std::path::PathBuf>,
    ) -> Result<Pane, Response> {
        let ctx = SpawnContext {
            rows: pane.height,
            cols: pane.width,
            cwd,
            shell: self.shell.clone(),
        };
        let handle = match self.backend.spawn(pane.id, &ctx) {
            Ok(handle) => handle,
            Err(err) => {
                let _ = self.manager.kill_pane(pane.id);
                return Err(Response::failure(format!("{}: {err}", pane.external_id())));
            }
        };
        let PaneHandle {
            pid,
            tty_path,
            reader,
        } = handle;
        let updated = match self.manager.set_pane_process(pane.id, pid, tty_path) {
            Ok(updated) => updated,
            Err(err) => {
                self.backend.release(pane.id);
                return Err(Response::failure(err.to_string()));
            }
        };
        if let Some(reader) = reader {
            self.watch_output(updated.external_id(), reader);
        }
        Ok(updated)
    }

    /// Drain a pane's output on a blocking thread, stamping activity on
    /// every chunk. Exits when the pty closes.
    fn watch_output(&self, pane_id: String, mut reader: Box<dyn std::io::Read + Send>) {
        let manager = self.manager.clone();
        tokio::task::spawn_blocking(move || {
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                let mut buf = [0u8; 4096];
                loop {
                    match reader.read(&mut buf) {
                        Ok(0) | Err(_) => break,
                        Ok(_) => {
                            if manager.update_activity_by_pane_id(&pane_id) {
                                tracing::debug!(pane = %pane_id, "output woke idle session");
                            }
                        }
                    }
                }
            }));
            if let Err(e) = result {
                tracing::error!(pane = %pane_id, "pane output watcher panicked: {:?}", e);
            }
        });
    }

    // ── Built-in handlers ──────────────────────────────────────────────

    fn new_session(&self, req: &Request) -> Result<Response, RegistryError> {
        let window_name = req.flag_str("n").unwrap_or_default();
        let width = req
            .flags
            .get("x")
            .map(|v| v.as_int().clamp(1, u16::MAX as i64) as u16)
            .unwrap_or(self.default_size.0);
        let height = req
            .flags
            .get("y")
            .map(|v| v.as_int().clamp(1, u16::MAX as i64) as u16)
            .unwrap_or(self.default_size.1);

        let (session, pane) = match req.flag_str("s") {
            Some(name) => self.manager.create_session(&name, &window_name, width, height)?,
            None => self.create_auto_named(&window_name, width, height)?,
        };
        if let Some(dir) = req.flag_str("c").filter(|d| !d.trim().is_empty()) {
            self.manager
                .set_root_path(&session.name, std::path::PathBuf::from(&dir))?;
        }
        let cwd = split::resolve_workdir(
            req.flag_str("c").as_deref(),
            self.manager.get_session(&session.name).as_ref(),
        );
        let pane = match self.attach_process(&pane, cwd) {
            Ok(pane) => pane,
            Err(response) => return Ok(response),
        };
        if req.flag_bool("P") {
            let ctx = self.manager.format_context(pane.id);
            let fmt = req
                .flag_str("F")
                .unwrap_or_else(|| "#{session_name}".to_string());
            return Ok(Response::ok(format!("{}\n", expand_format(&fmt, &ctx))));
        }
        Ok(Response::ok(""))
    }

    /// Pick the first free numeric name, retrying on a lost race.
    fn create_auto_named(
        &self,
        window_name: &str,
        width: u16,
        height: u16,
    ) -> Result<(crate::entity::Session, Pane), RegistryError> {
        let mut candidate = 0u64;
        loop {
            match self
                .manager
                .create_session(&candidate.to_string(), window_name, width, height)
            {
                Err(RegistryError::DuplicateName(_)) => candidate += 1,
                other => return other,
            }
        }
    }

    fn kill_pane(&self, req: &Request) -> Result<Response, RegistryError> {
        let pane = self.manager.resolve_target(&req.target(), req.caller())?;
        let removed = self.manager.kill_pane(pane.id)?;
        self.backend.release(removed.id);
        Ok(Response::ok(""))
    }

    fn kill_session(&self, req: &Request) -> Result<Response, RegistryError> {
        let session = self.manager.resolve_session_target(&req.target())?;
        let removed = self.manager.kill_session(&session.name)?;
        for pane in &removed {
            self.backend.release(pane.id);
        }
        Ok(Response::ok(""))
    }

    fn list_sessions(&self, req: &Request) -> Result<Response, RegistryError> {
        let fmt = req
            .flag_str("F")
            .unwrap_or_else(|| DEFAULT_SESSION_FORMAT.to_string());
        let mut out = String::new();
        for session in self.manager.sessions() {
            let ctx = FormatContext::for_session(session);
            out.push_str(&expand_format(&fmt, &ctx));
            out.push('\n');
        }
        Ok(Response::ok(out))
    }

    fn list_windows(&self, req: &Request) -> Result<Response, RegistryError> {
        let session = self.manager.resolve_session_target(&req.target())?;
        let fmt = req
            .flag_str("F")
            .unwrap_or_else(|| DEFAULT_WINDOW_FORMAT.to_string());
        let mut out = String::new();
        for window in &session.windows {
            let ctx = FormatContext::for_window(window.clone(), session.clone());
            out.push_str(&expand_format(&fmt, &ctx));
            out.push('\n');
        }
        Ok(Response::ok(out))
    }

    fn list_panes(&self, req: &Request) -> Result<Response, RegistryError> {
        let pane = self.manager.resolve_target(&req.target(), req.caller())?;
        // One consistent snapshot of the owning session; the window and its
        // pane list all come from it.
        let session = self
            .manager
            .get_session_by_id(pane.session_id)
            .ok_or_else(|| RegistryError::NotFound(pane.session_name.clone()))?;
        let window = session
            .windows
            .iter()
            .find(|w| w.index == pane.window_index)
            .ok_or_else(|| RegistryError::NotFound(pane.window_target()))?;
        let fmt = req
            .flag_str("F")
            .unwrap_or_else(|| DEFAULT_PANE_FORMAT.to_string());
        let mut out = String::new();
        for p in &window.panes {
            let ctx = FormatContext {
                pane: Some(p.clone()),
                window: Some(window.clone()),
                session: Some(session.clone()),
            };
            out.push_str(&expand_format(&fmt, &ctx));
            out.push('\n');
        }
        Ok(Response::ok(out))
    }
}
