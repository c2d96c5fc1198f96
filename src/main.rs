//! pmux - terminal multiplexer control plane
//!
//! ## Modes
//!
//! **Server mode** (`pmux server`): starts the control daemon. Commands
//! arrive on a Unix socket as newline-delimited JSON and are executed by a
//! pool of panic-isolated workers against the session registry.
//!
//! **Send mode** (`pmux send`): connects to a running server, sends one
//! command and prints its output, exiting with the command's exit code.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use thiserror::Error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pmux::{
    activity,
    client::Client,
    command::{FlagValue, Request, Router},
    config::Config,
    manager::SessionManager,
    pty::NativeBackend,
    server,
};

/// pmux - terminal multiplexer control plane
#[derive(Parser, Debug)]
#[command(name = "pmux", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the control server daemon
    Server {
        /// Path to the Unix domain socket
        #[arg(long)]
        socket: Option<PathBuf>,

        /// Path to a TOML config file
        #[arg(long, env = "PMUX_CONFIG")]
        config: Option<PathBuf>,
    },

    /// Send a single command to a running server
    Send {
        /// Command name (e.g. display-message, split-window)
        command: String,

        /// Positional arguments for the command
        args: Vec<String>,

        /// Target session, window or pane
        #[arg(short = 't', long)]
        target: Option<String>,

        /// Extra flags as key=value pairs (bare keys mean true)
        #[arg(long = "flag", value_name = "KEY[=VALUE]")]
        flags: Vec<String>,

        /// The calling pane's id, `%N`
        #[arg(long, env = "PMUX_PANE", default_value = "")]
        caller: String,

        /// Path to the Unix domain socket
        #[arg(long)]
        socket: Option<PathBuf>,
    },
}

#[derive(Error, Debug)]
enum PmuxError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Config(#[from] pmux::config::ConfigError),
}

#[tokio::main]
async fn main() -> Result<(), PmuxError> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Server { socket, config } => run_server(socket, config).await,
        Commands::Send {
            command,
            args,
            target,
            flags,
            caller,
            socket,
        } => run_send(command, args, target, flags, caller, socket).await,
    }
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "pmux=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

// ── Server mode ────────────────────────────────────────────────────

async fn run_server(
    socket: Option<PathBuf>,
    config_path: Option<PathBuf>,
) -> Result<(), PmuxError> {
    tracing::info!("pmux server starting");

    let config = match config_path {
        Some(path) => Config::load(&path)?.unwrap_or_default(),
        None => Config::default(),
    };
    let socket_path = socket
        .or_else(|| config.socket_path.clone())
        .unwrap_or_else(server::default_socket_path);

    let manager = SessionManager::with_policy(config.idle_policy());
    let (width, height) = config.default_size();
    let router = Router::new(manager.clone(), std::sync::Arc::new(NativeBackend::new()))
        .with_default_size(width, height)
        .with_shell(config.shell.clone());

    let cancel = tokio_util::sync::CancellationToken::new();

    let server_path = socket_path.clone();
    let server_cancel = cancel.clone();
    let workers = config.worker_count();
    let server_handle = tokio::spawn(async move {
        if let Err(e) = server::serve(router, &server_path, workers, server_cancel).await {
            tracing::error!(?e, "control server error");
        }
    });

    let poller_handle = tokio::spawn(activity::run_idle_poller(manager, cancel.clone()));

    tracing::info!("pmux server ready");
    tokio::signal::ctrl_c().await?;
    tracing::info!("received Ctrl+C");

    cancel.cancel();
    let _ = server_handle.await;
    let _ = poller_handle.await;

    // Remove the socket file so a subsequent server can bind.
    if socket_path.exists() {
        let _ = std::fs::remove_file(&socket_path);
        tracing::debug!(path = %socket_path.display(), "removed socket file");
    }

    tracing::info!("pmux server exiting");
    Ok(())
}

// ── Send mode ──────────────────────────────────────────────────────

async fn run_send(
    command: String,
    args: Vec<String>,
    target: Option<String>,
    flags: Vec<String>,
    caller: String,
    socket: Option<PathBuf>,
) -> Result<(), PmuxError> {
    let socket_path = socket.unwrap_or_else(server::default_socket_path);

    let mut request = Request::new(command);
    request.args = args;
    request.caller_pane = caller;
    if let Some(target) = target {
        request.flags.insert("t".into(), FlagValue::Str(target));
    }
    for flag in flags {
        let (key, value) = parse_flag(&flag);
        request.flags.insert(key, value);
    }

    let mut client = match Client::connect(&socket_path).await {
        Ok(client) => client,
        Err(e) => {
            eprintln!(
                "pmux send: failed to connect to server at {}: {}",
                socket_path.display(),
                e
            );
            std::process::exit(1);
        }
    };

    let response = client.request(&request).await.map_err(|e| {
        eprintln!("pmux send: {}", e);
        PmuxError::Io(e)
    })?;

    print!("{}", response.stdout);
    eprint!("{}", response.stderr);
    std::process::exit(response.exit_code);
}

/// Parse a `key=value` flag argument. Bare keys become `true`; values that
/// look like booleans or integers are typed accordingly.
fn parse_flag(flag: &str) -> (String, FlagValue) {
    match flag.split_once('=') {
        None => (flag.to_string(), FlagValue::Bool(true)),
        Some((key, value)) => {
            let value = match value {
                "true" => FlagValue::Bool(true),
                "false" => FlagValue::Bool(false),
                _ => match value.parse::<i64>() {
                    Ok(n) => FlagValue::Int(n),
                    Err(_) => FlagValue::Str(value.to_string()),
                },
            };
            (key.to_string(), value)
        }
    }
}
