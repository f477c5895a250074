//! The controller's sequenced event queue.
//!
//! Every transition input (commands, accepted connections, timer firings,
//! session events) and every deferred destruction flows through one
//! unbounded channel drained by a single task, so no two transitions can
//! interleave.

use std::fmt::{Debug, Formatter};

use tokio::sync::mpsc;
use tracing::trace;

use crate::channel::server::{ChannelServer, PeerConnection};
use crate::models::desktop::DesktopConfig;
use crate::models::session::{SessionId, SessionTag};
use crate::orchestrator::launcher::SessionProcess;
use crate::session::{DesktopSession, SessionEvent};
use crate::{AppError, Result};

/// Objects whose destruction is deferred to a later mailbox turn.
pub enum Retired {
    /// A session that was unbound or replaced.
    Session(Box<dyn DesktopSession>),
    /// A channel server that served or abandoned its attempt.
    Server(Box<dyn ChannelServer>),
    /// A worker process handle from a finished attempt.
    Process(SessionProcess),
}

impl Debug for Retired {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Session(session) => write!(f, "Session({:?})", session.kind()),
            Self::Server(_) => f.write_str("Server"),
            Self::Process(process) => write!(f, "Process({:?})", process.pid()),
        }
    }
}

/// Input to the controller.
pub enum ControllerEvent {
    /// Attach the given interactive session.
    Attach(SessionId),
    /// Detach the current session.
    Detach,
    /// Update desktop appearance settings.
    Configure(DesktopConfig),
    /// A channel server produced a connection.
    NewConnection(PeerConnection),
    /// The attach timer armed with `generation` elapsed.
    TimerFired {
        /// Generation the timer was armed with.
        generation: u64,
    },
    /// An event from the session bound under `tag`.
    Session {
        /// Tag of the emitting session.
        tag: SessionTag,
        /// The event.
        event: SessionEvent,
    },
    /// Drop the contained object.
    DeleteSoon(Retired),
}

impl Debug for ControllerEvent {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Attach(id) => write!(f, "Attach({id})"),
            Self::Detach => f.write_str("Detach"),
            Self::Configure(config) => write!(f, "Configure({config:?})"),
            Self::NewConnection(connection) => write!(f, "NewConnection({connection:?})"),
            Self::TimerFired { generation } => write!(f, "TimerFired({generation})"),
            Self::Session { tag, event } => write!(f, "Session({}, {event:?})", tag.0),
            Self::DeleteSoon(retired) => write!(f, "DeleteSoon({retired:?})"),
        }
    }
}

/// Cloneable sending side of the controller queue.
#[derive(Debug, Clone)]
pub struct Mailbox(mpsc::UnboundedSender<ControllerEvent>);

/// Create a controller queue.
#[must_use]
pub fn mailbox() -> (Mailbox, mpsc::UnboundedReceiver<ControllerEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Mailbox(tx), rx)
}

impl Mailbox {
    /// Queue an event.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Controller` if the controller task has exited.
    pub fn send(&self, event: ControllerEvent) -> Result<()> {
        self.0
            .send(event)
            .map_err(|_| AppError::Controller("controller is not running".into()))
    }

    /// Queue an event, ignoring a closed controller.
    pub fn post(&self, event: ControllerEvent) {
        if let Err(err) = self.send(event) {
            trace!(%err, "event dropped");
        }
    }

    /// Destroy `retired` on a later turn rather than inline.
    pub fn delete_soon(&self, retired: Retired) {
        self.post(ControllerEvent::DeleteSoon(retired));
    }
}
