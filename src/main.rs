#![forbid(unsafe_code)]

//! `desktop-session-host`: host-side desktop session controller binary.
//!
//! Bootstraps configuration, starts the session controller, and serves the
//! local control socket for `desktop-session-ctl`.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use desktop_session_host::channel::server::platform_factory;
use desktop_session_host::config::GlobalConfig;
use desktop_session_host::desktop_environment::LoggingToggler;
use desktop_session_host::ipc::server::{spawn_ipc_server, IpcState};
use desktop_session_host::models::session::SessionId;
use desktop_session_host::orchestrator::controller::{ControllerDeps, SessionController};
use desktop_session_host::orchestrator::delegate::LoggingDelegate;
use desktop_session_host::orchestrator::launcher::CommandLauncher;
use desktop_session_host::{AppError, Result};

/// Environment variable holding the control socket shared secret.
const IPC_TOKEN_ENV: &str = "DESKTOP_SESSION_IPC_TOKEN";

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "desktop-session-host", about = "Desktop session controller", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long)]
    config: PathBuf,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Attach this interactive session immediately on startup.
    #[arg(long)]
    session_id: Option<u32>,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;
    info!("desktop-session-host bootstrap");

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    // ── Load configuration ──────────────────────────────
    let config = GlobalConfig::load_from_path(&args.config)?;
    info!(
        worker = %config.worker_path.display(),
        channel_dir = %config.channel_dir.display(),
        attach_timeout_seconds = config.attach_timeout_seconds,
        "configuration loaded"
    );

    // ── Start the controller ────────────────────────────
    let deps = ControllerDeps::from_config(
        &config,
        Arc::new(CommandLauncher::from_config(&config)),
        platform_factory(config.channel_dir.clone())?,
        Arc::new(LoggingToggler),
        Arc::new(LoggingDelegate),
    );

    let ct = CancellationToken::new();
    let (controller, controller_task) = SessionController::spawn(deps, ct.clone());
    info!("session controller started");

    if let Some(session_id) = args.session_id {
        controller.attach_session(SessionId(session_id))?;
    }

    // ── Start control socket ────────────────────────────
    let auth_token = std::env::var(IPC_TOKEN_ENV).ok().filter(|t| !t.is_empty());
    if auth_token.is_none() {
        info!("no ipc auth token configured; control socket is unauthenticated");
    }

    let ipc_state = Arc::new(IpcState {
        ipc_name: config.ipc_name.clone(),
        controller,
        auth_token,
    });
    let ipc_handle = spawn_ipc_server(ipc_state, ct.clone())?;

    // ── Wait for shutdown signal ────────────────────────
    shutdown_signal().await;
    info!("shutdown signal received");
    ct.cancel();

    // ── Wait for background tasks ───────────────────────
    let (controller_result, ipc_result) = tokio::join!(controller_task, ipc_handle);
    if let Err(err) = controller_result {
        error!(%err, "session controller task failed");
    }
    if let Err(err) = ipc_result {
        error!(%err, "ipc server task failed");
    }
    info!("desktop-session-host shut down");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                tracing::warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            tracing::error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(env_filter);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
