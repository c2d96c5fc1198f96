//! pmux — the control plane of a terminal multiplexer.
//!
//! The library maintains a hierarchy of sessions, windows and panes behind
//! a single reader/writer lock, resolves addressing strings (targets)
//! against that hierarchy, dispatches multiplexer commands through
//! panic-isolated workers, and tracks per-session activity for adaptive
//! idle polling. Process spawning sits behind the [`pty::PaneBackend`]
//! boundary; the wire transport is a newline-delimited JSON protocol over
//! a Unix socket.

pub mod activity;
pub mod client;
pub mod command;
pub mod config;
pub mod entity;
pub mod format;
pub mod manager;
pub mod pty;
pub mod server;
pub mod target;
