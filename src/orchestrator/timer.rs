//! Single-shot attach / re-attach timer.
//!
//! Each arm bumps a generation counter and the firing task reports the
//! generation it was armed with. The controller only acts on a firing whose
//! generation is still current, so a deadline superseded by [`stop`] or a
//! later [`start`] is a no-op even if its task already queued the event.
//!
//! [`stop`]: AttachTimer::stop
//! [`start`]: AttachTimer::start

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

use crate::models::session::ErrorCause;
use crate::orchestrator::mailbox::{ControllerEvent, Mailbox};

/// What an armed deadline guards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerPurpose {
    /// Initial attach from `Stopped`.
    Attach,
    /// Waiting for a new session after the real one went away.
    Reattach,
}

impl From<TimerPurpose> for ErrorCause {
    fn from(purpose: TimerPurpose) -> Self {
        match purpose {
            TimerPurpose::Attach => Self::AttachTimeout,
            TimerPurpose::Reattach => Self::ReattachTimeout,
        }
    }
}

/// Timer with at most one live deadline.
#[derive(Debug)]
pub struct AttachTimer {
    mailbox: Mailbox,
    generation: u64,
    purpose: Option<TimerPurpose>,
    task: Option<JoinHandle<()>>,
}

impl AttachTimer {
    /// Construct a disarmed timer posting to `mailbox`.
    #[must_use]
    pub fn new(mailbox: Mailbox) -> Self {
        Self {
            mailbox,
            generation: 0,
            purpose: None,
            task: None,
        }
    }

    /// Arm a deadline, superseding any previous one.
    pub fn start(&mut self, duration: Duration, purpose: TimerPurpose) {
        self.stop();

        let generation = self.generation;
        let mailbox = self.mailbox.clone();
        debug!(generation, ?purpose, ?duration, "attach timer armed");

        let deadline = Instant::now() + duration;
        self.purpose = Some(purpose);
        self.task = Some(tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            mailbox.post(ControllerEvent::TimerFired { generation });
        }));
    }

    /// Disarm. Any firing already queued becomes stale.
    pub fn stop(&mut self) {
        self.generation += 1;
        self.purpose = None;
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    /// Whether a deadline is pending.
    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.purpose.is_some()
    }

    /// Consume a firing. Returns the purpose only if `generation` is the
    /// live deadline.
    pub fn take_fired(&mut self, generation: u64) -> Option<TimerPurpose> {
        if generation != self.generation {
            return None;
        }
        self.task = None;
        self.purpose.take()
    }
}

impl Drop for AttachTimer {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
