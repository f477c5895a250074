//! Global configuration parsing and validation.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::models::desktop::DesktopConfig;
use crate::{AppError, Result};

fn default_attach_timeout_seconds() -> u64 {
    60
}

fn default_ipc_name() -> String {
    "desktop-session-host".into()
}

fn default_channel_dir() -> PathBuf {
    env::temp_dir()
}

/// Global configuration parsed from `config.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// Executable launched into the interactive session. Connecting peers
    /// must resolve to exactly this path.
    pub worker_path: PathBuf,
    /// Extra arguments appended after the channel arguments.
    #[serde(default)]
    pub worker_args: Vec<String>,
    /// Directory holding the per-attempt rendezvous sockets.
    #[serde(default = "default_channel_dir")]
    pub channel_dir: PathBuf,
    /// Deadline for both the initial attach and every re-attach window.
    #[serde(default = "default_attach_timeout_seconds")]
    pub attach_timeout_seconds: u64,
    /// Named pipe / Unix socket identifier for the control IPC server.
    #[serde(default = "default_ipc_name")]
    pub ipc_name: String,
    /// Desktop appearance applied while a real session is attached.
    #[serde(default)]
    pub desktop: DesktopConfig,
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string and normalize paths.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Attach / re-attach deadline as a [`Duration`].
    #[must_use]
    pub fn attach_timeout(&self) -> Duration {
        Duration::from_secs(self.attach_timeout_seconds)
    }

    fn validate(&mut self) -> Result<()> {
        if self.attach_timeout_seconds == 0 {
            return Err(AppError::Config(
                "attach_timeout_seconds must be greater than zero".into(),
            ));
        }

        if self.ipc_name.trim().is_empty() {
            return Err(AppError::Config("ipc_name must not be empty".into()));
        }

        // Peer paths resolve to canonical form, so the comparison target must be too.
        self.worker_path = self
            .worker_path
            .canonicalize()
            .map_err(|err| AppError::Config(format!("worker_path invalid: {err}")))?;

        let channel_dir = self
            .channel_dir
            .canonicalize()
            .map_err(|err| AppError::Config(format!("channel_dir invalid: {err}")))?;
        if !channel_dir.is_dir() {
            return Err(AppError::Config(format!(
                "channel_dir is not a directory: {}",
                channel_dir.display()
            )));
        }
        self.channel_dir = channel_dir;

        Ok(())
    }
}
