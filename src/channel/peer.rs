//! Identity of the process on the far end of a channel connection.

use std::path::{Path, PathBuf};

use crate::{AppError, Result};

/// Resolve the executable of a connected peer from its socket credentials.
///
/// Returns `None` when the platform does not expose the peer pid or the
/// executable link cannot be read; an unresolved peer never validates.
#[cfg(unix)]
#[must_use]
pub fn resolve_peer_path(stream: &tokio::net::UnixStream) -> Option<PathBuf> {
    let cred = stream.peer_cred().ok()?;
    let pid = cred.pid()?;
    executable_of(pid)
}

/// Executable image backing a running process.
#[cfg(target_os = "linux")]
#[must_use]
pub fn executable_of(pid: i32) -> Option<PathBuf> {
    std::fs::read_link(format!("/proc/{pid}/exe")).ok()
}

/// Executable image backing a running process.
#[cfg(not(target_os = "linux"))]
#[must_use]
pub fn executable_of(_pid: i32) -> Option<PathBuf> {
    None
}

/// Check a peer's executable against the expected worker binary.
///
/// The comparison is exact; no normalisation is applied to the peer path.
///
/// # Errors
///
/// Returns `AppError::Unauthorized` if the peer is unresolved or differs.
pub fn verify_peer(expected: &Path, peer: Option<&Path>) -> Result<()> {
    match peer {
        Some(path) if path == expected => Ok(()),
        Some(path) => Err(AppError::Unauthorized(format!(
            "unexpected peer executable: {}",
            path.display()
        ))),
        None => Err(AppError::Unauthorized(
            "peer executable could not be resolved".into(),
        )),
    }
}
