//! `#{name}` placeholder expansion.
//!
//! Placeholders are looked up against a pane and, transitively, its window
//! and session. Unknown names expand to the empty string; numeric fields on
//! a missing context layer expand to `"0"`, string fields to `""`.

use std::time::UNIX_EPOCH;

use chrono::{DateTime, Local};

use crate::entity::{Pane, Session, Window};

/// Default line format for `list-sessions`.
pub const DEFAULT_SESSION_FORMAT: &str =
    "#{session_name}: #{session_windows} windows (created #{session_created_string})";

/// Default line format for `list-windows`.
pub const DEFAULT_WINDOW_FORMAT: &str =
    "#{window_index}: #{window_name} (#{window_panes} panes)";

/// Default line format for `list-panes`.
pub const DEFAULT_PANE_FORMAT: &str =
    "#{pane_index}: [#{pane_width}x#{pane_height}] #{pane_id}#{pane_active_suffix}";

/// The layered context a format string is expanded against. Any layer may be
/// absent; lookups fall back to the neutral value for the field's type.
#[derive(Debug, Clone, Default)]
pub struct FormatContext {
    pub pane: Option<Pane>,
    pub window: Option<Window>,
    pub session: Option<Session>,
}

impl FormatContext {
    /// Session-only context, for session list lines.
    pub fn for_session(session: Session) -> Self {
        Self {
            pane: None,
            window: None,
            session: Some(session),
        }
    }

    /// Window context carrying its owning session.
    pub fn for_window(window: Window, session: Session) -> Self {
        Self {
            pane: None,
            window: Some(window),
            session: Some(session),
        }
    }

    /// The expansion of a single placeholder name.
    pub fn value(&self, name: &str) -> String {
        match name {
            "pane_id" => self
                .pane
                .as_ref()
                .map(Pane::external_id)
                .unwrap_or_default(),
            "pane_index" => num(self.pane.as_ref().map(|p| p.index as u64)),
            "pane_width" => num(self.pane.as_ref().map(|p| p.width as u64)),
            "pane_height" => num(self.pane.as_ref().map(|p| p.height as u64)),
            "pane_active" => num(self.pane.as_ref().map(|p| p.active as u64)),
            "pane_active_suffix" => match &self.pane {
                Some(p) if p.active => " (active)".to_string(),
                _ => String::new(),
            },
            "pane_tty" => self
                .pane
                .as_ref()
                .and_then(|p| p.tty_path.clone())
                .unwrap_or_default(),
            "pane_pid" => num(self.pane.as_ref().and_then(|p| p.pid).map(u64::from)),
            "window_index" => num(self.window.as_ref().map(|w| w.index as u64)),
            "window_name" => self
                .window
                .as_ref()
                .map(|w| w.name.clone())
                .unwrap_or_default(),
            "window_panes" => num(self.window.as_ref().map(|w| w.panes.len() as u64)),
            "session_name" => self
                .session
                .as_ref()
                .map(|s| s.name.clone())
                .unwrap_or_default(),
            "session_windows" => num(self.session.as_ref().map(|s| s.windows.len() as u64)),
            "session_created" => num(self.session.as_ref().map(|s| {
                s.created_at
                    .duration_since(UNIX_EPOCH)
                    .unwrap_or_default()
                    .as_secs()
            })),
            "session_created_string" => self
                .session
                .as_ref()
                .map(|s| {
                    DateTime::<Local>::from(s.created_at)
                        .format("%a %b %e %H:%M:%S %Y")
                        .to_string()
                })
                .unwrap_or_default(),
            _ => String::new(),
        }
    }
}

fn num(v: Option<u64>) -> String {
    v.unwrap_or(0).to_string()
}

/// Expand every `#{name}` in `fmt` against `ctx`. Text outside placeholders
/// is copied verbatim; an unterminated `#{` is copied as-is.
pub fn expand_format(fmt: &str, ctx: &FormatContext) -> String {
    let mut out = String::with_capacity(fmt.len());
    let mut rest = fmt;
    while let Some(start) = rest.find("#{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                out.push_str(&ctx.value(&after[..end]));
                rest = &after[end + 1..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant, SystemTime};

    fn test_pane(index: usize, width: u16, height: u16, active: bool) -> Pane {
        Pane {
            id: 3,
            index,
            width,
            height,
            active,
            tty_path: Some("/dev/pts/7".into()),
            pid: Some(4242),
            session_id: 0,
            session_name: "demo".into(),
            window_index: 0,
        }
    }

    fn test_context() -> FormatContext {
        let pane = test_pane(1, 120, 30, true);
        let window = Window {
            index: 0,
            name: "main".into(),
            panes: vec![pane.clone()],
            active_pn: 0,
            session_id: 0,
        };
        let session = Session {
            id: 0,
            name: "demo".into(),
            created_at: SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000),
            created_instant: Instant::now(),
            last_activity: None,
            is_idle: false,
            windows: vec![window.clone()],
            root_path: None,
            worktree: None,
        };
        FormatContext {
            pane: Some(pane),
            window: Some(window),
            session: Some(session),
        }
    }

    #[test]
    fn expands_pane_geometry_line() {
        let ctx = test_context();
        assert_eq!(
            expand_format(
                "#{pane_index}:#{pane_width}x#{pane_height}#{pane_active_suffix}",
                &ctx
            ),
            "1:120x30 (active)"
        );
    }

    #[test]
    fn inactive_pane_has_no_suffix() {
        let mut ctx = test_context();
        ctx.pane.as_mut().unwrap().active = false;
        assert_eq!(expand_format("#{pane_active_suffix}", &ctx), "");
        assert_eq!(expand_format("#{pane_active}", &ctx), "0");
    }

    #[test]
    fn unknown_placeholder_expands_empty() {
        let ctx = test_context();
        assert_eq!(expand_format("a#{no_such_thing}b", &ctx), "ab");
    }

    #[test]
    fn missing_layers_give_neutral_values() {
        let ctx = FormatContext::default();
        assert_eq!(expand_format("#{pane_width}", &ctx), "0");
        assert_eq!(expand_format("#{window_panes}", &ctx), "0");
        assert_eq!(expand_format("#{session_name}", &ctx), "");
        assert_eq!(expand_format("#{pane_tty}", &ctx), "");
        assert_eq!(expand_format("#{session_created}", &ctx), "0");
    }

    #[test]
    fn window_and_session_fields() {
        let ctx = test_context();
        assert_eq!(
            expand_format("#{session_name}:#{window_index} #{window_name}", &ctx),
            "demo:0 main"
        );
        assert_eq!(expand_format("#{window_panes}", &ctx), "1");
        assert_eq!(expand_format("#{session_windows}", &ctx), "1");
        assert_eq!(expand_format("#{session_created}", &ctx), "1700000000");
    }

    #[test]
    fn created_string_uses_fixed_layout() {
        let ctx = test_context();
        let s = expand_format("#{session_created_string}", &ctx);
        // "Tue Nov 14 22:13:20 2023" modulo local timezone.
        assert_eq!(s.split_whitespace().count(), 5);
        assert!(s.ends_with("2023"));
    }

    #[test]
    fn literal_text_and_unterminated_braces() {
        let ctx = test_context();
        assert_eq!(expand_format("plain", &ctx), "plain");
        assert_eq!(expand_format("x#{pane_index", &ctx), "x#{pane_index");
        assert_eq!(expand_format("#{}", &ctx), "");
    }

    #[test]
    fn pane_tty_and_pid() {
        let ctx = test_context();
        assert_eq!(expand_format("#{pane_tty}", &ctx), "/dev/pts/7");
        assert_eq!(expand_format("#{pane_pid}", &ctx), "4242");
    }
}
