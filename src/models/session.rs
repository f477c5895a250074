//! Session controller state and identity types.

use std::fmt::{Display, Formatter};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Interactive (console) session the worker process is launched into.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct SessionId(pub u32);

impl Display for SessionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Attachment state of a [`SessionController`](crate::orchestrator::controller::SessionController).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ControllerState {
    /// No attach attempt in flight and nothing bound.
    #[default]
    Stopped,
    /// Worker spawned; waiting for it to connect back.
    Starting,
    /// A validated channel session is bound.
    Attached,
    /// The real session went away; a placeholder is bound while waiting.
    Detached,
    /// Teardown in progress. Suppresses the placeholder.
    Stopping,
}

impl ControllerState {
    /// Lowercase label used in logs and IPC responses.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stopped => "stopped",
            Self::Starting => "starting",
            Self::Attached => "attached",
            Self::Detached => "detached",
            Self::Stopping => "stopping",
        }
    }
}

impl Display for ControllerState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which session variant is bound to the proxy.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionKind {
    /// Local placeholder with static output.
    Fake,
    /// Backed by a validated worker channel.
    Channel,
}

/// Monotonic identity assigned to each session when it is bound.
///
/// Events carry the tag of the session that produced them so the controller
/// can discard anything emitted by a session that has since been replaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionTag(pub u64);

/// Why an attach attempt was abandoned.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCause {
    /// The worker process could not be created.
    SpawnFailed,
    /// The rendezvous endpoint could not be opened.
    ChannelStartFailed,
    /// No valid connection arrived after the initial attach request.
    AttachTimeout,
    /// No valid connection arrived after the real session went away.
    ReattachTimeout,
}

/// Point-in-time snapshot published by the controller.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct ControllerStatus {
    /// Current attachment state.
    pub state: ControllerState,
    /// Session most recently requested via attach.
    pub session_id: Option<SessionId>,
    /// Variant bound to the proxy, if any.
    pub bound: Option<SessionKind>,
    /// When the current channel session was accepted.
    pub attached_at: Option<DateTime<Utc>>,
}
