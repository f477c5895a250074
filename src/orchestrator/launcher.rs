//! Worker process launcher.
//!
//! Spawns the session worker with the channel identifier it must connect
//! back to, at [`channel_socket_path`](crate::channel::server::channel_socket_path). The launcher only reports whether the spawn itself succeeded;
//! liveness is observed through the channel, not the process handle.
//!
//! The child environment is cleared and rebuilt from [`ALLOWED_ENV_VARS`]
//! so nothing from the privileged service leaks into the session.

use std::path::PathBuf;
use std::process::Stdio;

use tokio::process::{Child, Command};
use tracing::{info, info_span};

use crate::channel::id::ChannelId;
use crate::config::GlobalConfig;
use crate::models::session::SessionId;
use crate::{AppError, Result};

// ── Environment allowlist ────────────────────────────────────────────────────

/// Environment variables inherited by the worker process.
pub const ALLOWED_ENV_VARS: &[&str] = &[
    "PATH",
    "HOME",
    "RUST_LOG",
    "LANG",
    // Display server access for capture and injection.
    "DISPLAY",
    "WAYLAND_DISPLAY",
    "XDG_RUNTIME_DIR",
    "DBUS_SESSION_BUS_ADDRESS",
    // Windows-specific variables.
    "USERPROFILE",
    "SystemRoot",
    "TEMP",
    "TMP",
    "USERNAME",
    "APPDATA",
    "LOCALAPPDATA",
];

// ── Process handle ───────────────────────────────────────────────────────────

/// Handle to a launched worker. Dropping it kills the process if it is
/// still running.
#[derive(Debug)]
pub struct SessionProcess {
    pid: Option<u32>,
    // Held so the child is killed when the handle drops.
    _child: Option<Child>,
}

impl SessionProcess {
    /// Wrap a spawned child.
    #[must_use]
    pub fn from_child(child: Child) -> Self {
        Self {
            pid: child.id(),
            _child: Some(child),
        }
    }

    /// A handle that owns no OS process, for launchers that hand the
    /// worker off to another supervisor.
    #[must_use]
    pub fn detached(pid: Option<u32>) -> Self {
        Self { pid, _child: None }
    }

    /// OS process id, if known.
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }
}

// ── Launcher ─────────────────────────────────────────────────────────────────

/// Spawns the worker process into an interactive session.
pub trait SessionLauncher: Send + Sync {
    /// Launch the worker for `session_id`, telling it to connect to
    /// `channel_id`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Spawn` if the process could not be created.
    fn launch(&self, session_id: SessionId, channel_id: &ChannelId) -> Result<SessionProcess>;
}

/// Launches the configured worker executable directly.
#[derive(Debug, Clone)]
pub struct CommandLauncher {
    worker_path: PathBuf,
    worker_args: Vec<String>,
    channel_dir: PathBuf,
}

impl CommandLauncher {
    /// Construct a launcher.
    #[must_use]
    pub fn new(worker_path: PathBuf, worker_args: Vec<String>, channel_dir: PathBuf) -> Self {
        Self {
            worker_path,
            worker_args,
            channel_dir,
        }
    }

    /// Construct a launcher from validated configuration.
    #[must_use]
    pub fn from_config(config: &GlobalConfig) -> Self {
        Self::new(
            config.worker_path.clone(),
            config.worker_args.clone(),
            config.channel_dir.clone(),
        )
    }

    /// Build the command for one launch without spawning it.
    #[must_use]
    pub fn command(&self, session_id: SessionId, channel_id: &ChannelId) -> Command {
        let mut cmd = Command::new(&self.worker_path);
        cmd.arg("--session-id")
            .arg(session_id.to_string())
            .arg("--channel-id")
            .arg(channel_id.as_str())
            .arg("--channel-dir")
            .arg(&self.channel_dir)
            .args(&self.worker_args);

        // Strip inherited environment, then inject only the safe allowlist.
        cmd.env_clear();
        for &key in ALLOWED_ENV_VARS {
            if let Ok(val) = std::env::var(key) {
                cmd.env(key, val);
            }
        }

        cmd.stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        cmd
    }
}

impl SessionLauncher for CommandLauncher {
    fn launch(&self, session_id: SessionId, channel_id: &ChannelId) -> Result<SessionProcess> {
        let span = info_span!("launch_worker", %session_id, %channel_id);
        let _guard = span.enter();

        let child = self
            .command(session_id, channel_id)
            .spawn()
            .map_err(|err| {
                AppError::Spawn(format!(
                    "failed to spawn {}: {err}",
                    self.worker_path.display()
                ))
            })?;

        let process = SessionProcess::from_child(child);
        info!(
            pid = process.pid().unwrap_or(0),
            worker = %self.worker_path.display(),
            "session worker spawned"
        );
        Ok(process)
    }
}
