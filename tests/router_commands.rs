//! Integration tests driving the router the way a transport would.

use std::sync::Arc;

use pmux::command::{FlagValue, Request, Response, Router};
use pmux::manager::SessionManager;
use pmux::pty::NullBackend;

fn router() -> Router {
    Router::new(SessionManager::new(), Arc::new(NullBackend::new()))
}

fn send(router: &Router, command: &str, flags: &[(&str, FlagValue)], args: &[&str]) -> Response {
    let mut req = Request::new(command);
    for (k, v) in flags {
        req.flags.insert(k.to_string(), v.clone());
    }
    req.args = args.iter().map(|s| s.to_string()).collect();
    router.dispatch(&req)
}

fn s(v: &str) -> FlagValue {
    FlagValue::Str(v.to_string())
}

fn on() -> FlagValue {
    FlagValue::Bool(true)
}

#[test]
fn session_lifecycle_through_commands() {
    let r = router();

    let resp = send(
        &r,
        "new-session",
        &[("s", s("work")), ("n", s("editor")), ("x", FlagValue::Int(120)), ("y", FlagValue::Int(40))],
        &[],
    );
    assert!(resp.is_success(), "stderr: {}", resp.stderr);

    // Split twice, printing the new pane target each time.
    let resp = send(&r, "split-window", &[("t", s("work")), ("P", on())], &[]);
    assert_eq!(resp.stdout, "work:0.1\n");
    let resp = send(
        &r,
        "split-window",
        &[("t", s("work:0.0")), ("h", on()), ("P", on())],
        &[],
    );
    assert_eq!(resp.stdout, "work:0.1\n", "inserted directly after its target");

    let resp = send(&r, "list-panes", &[("t", s("work"))], &[]);
    let lines: Vec<&str> = resp.stdout.lines().collect();
    assert_eq!(lines.len(), 3);
    assert!(lines[0].starts_with("0:"));
    assert!(lines[2].starts_with("2:"));
    assert_eq!(
        lines.iter().filter(|l| l.ends_with("(active)")).count(),
        1,
        "exactly one active pane per window"
    );

    // Kill the middle pane; indexes close up.
    let resp = send(&r, "kill-pane", &[("t", s("work:0.1"))], &[]);
    assert!(resp.is_success());
    let resp = send(&r, "list-panes", &[("t", s("work"))], &[]);
    assert_eq!(resp.stdout.lines().count(), 2);
    assert!(resp.stdout.lines().all(|l| l.starts_with("0:") || l.starts_with("1:")));

    let resp = send(&r, "kill-session", &[("t", s("work"))], &[]);
    assert!(resp.is_success());
    assert!(r.manager().sessions().is_empty());
}

#[test]
fn display_message_round_trips_formats() {
    let r = router();
    send(
        &r,
        "new-session",
        &[("s", s("demo")), ("x", FlagValue::Int(120)), ("y", FlagValue::Int(30))],
        &[],
    );

    let resp = send(
        &r,
        "display-message",
        &[("p", on()), ("t", s("demo:0.0"))],
        &["#{pane_index}:#{pane_width}x#{pane_height}#{pane_active_suffix}"],
    );
    assert_eq!(resp.stdout, "0:120x30 (active)\n");

    let resp = send(
        &r,
        "display-message",
        &[("p", on()), ("t", s("demo"))],
        &["#{session_name}", "has", "#{session_windows}", "window(s)"],
    );
    assert_eq!(resp.stdout, "demo has 1 window(s)\n");
}

#[test]
fn select_pane_walks_the_window() {
    let r = router();
    send(&r, "new-session", &[("s", s("demo"))], &[]);
    send(&r, "split-window", &[("t", s("demo"))], &[]);
    send(&r, "split-window", &[("t", s("demo"))], &[]);

    // Walk to the top; further ups clamp.
    for _ in 0..4 {
        let resp = send(&r, "select-pane", &[("t", s("demo")), ("U", on())], &[]);
        assert!(resp.is_success());
    }
    let active = r
        .manager()
        .list_panes_by_window_target("demo:0", None, true)
        .unwrap();
    assert_eq!(active[0].index, 0);

    let resp = send(&r, "select-pane", &[("t", s("demo")), ("D", on())], &[]);
    assert!(resp.is_success());
    let active = r
        .manager()
        .list_panes_by_window_target("demo:0", None, true)
        .unwrap();
    assert_eq!(active[0].index, 1);
}

#[test]
fn list_windows_uses_default_format() {
    let r = router();
    send(&r, "new-session", &[("s", s("demo")), ("n", s("editor"))], &[]);
    let resp = send(&r, "list-windows", &[("t", s("demo"))], &[]);
    assert_eq!(resp.stdout, "0: editor (1 panes)\n");

    let resp = send(
        &r,
        "list-windows",
        &[("t", s("demo")), ("F", s("#{window_name}"))],
        &[],
    );
    assert_eq!(resp.stdout, "editor\n");
}

#[test]
fn every_failure_carries_a_nonzero_exit_and_stderr() {
    let r = router();
    send(&r, "new-session", &[("s", s("demo"))], &[]);

    let failures = [
        send(&r, "no-such-command", &[], &[]),
        send(&r, "kill-pane", &[("t", s("ghost"))], &[]),
        send(&r, "kill-pane", &[("t", s("demo:9"))], &[]),
        send(&r, "kill-pane", &[("t", s("demo:zero"))], &[]),
        send(&r, "split-window", &[("t", s("%404"))], &[]),
        send(&r, "list-windows", &[("t", s("missing"))], &[]),
    ];
    for resp in failures {
        assert_ne!(resp.exit_code, 0);
        assert!(!resp.stderr.is_empty(), "failures must explain themselves");
        assert!(resp.stderr.ends_with('\n'));
    }
}

#[test]
fn caller_pane_is_the_implicit_target() {
    let r = router();
    send(&r, "new-session", &[("s", s("demo"))], &[]);
    send(&r, "split-window", &[("t", s("demo"))], &[]);

    // No -t flag; the caller pane decides where the message expands.
    let mut req = Request::new("display-message");
    req.flags.insert("p".into(), on());
    req.args = vec!["#{pane_index}".into()];
    req.caller_pane = "%0".into();
    assert_eq!(r.dispatch(&req).stdout, "0\n");
    req.caller_pane = "%1".into();
    assert_eq!(r.dispatch(&req).stdout, "1\n");
    // A bogus caller falls back to the default pane (the active one).
    req.caller_pane = "nonsense".into();
    assert_eq!(r.dispatch(&req).stdout, "1\n");
}
