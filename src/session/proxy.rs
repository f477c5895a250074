//! Stable façade over whichever session is currently bound.
//!
//! External holders keep an `Arc<SessionProxy>` for the lifetime of the
//! remote connection. The controller swaps sessions underneath it; callers
//! never see a dangling session, and every forwarding call is a no-op while
//! nothing is bound.

use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::debug;

use crate::models::desktop::{
    ClipboardEvent, ControlAction, DesktopConfig, KeyEvent, MouseEvent, Screen,
};
use crate::models::session::{SessionKind, SessionTag};
use crate::session::DesktopSession;

struct Bound {
    tag: SessionTag,
    session: Box<dyn DesktopSession>,
}

/// Forwarding façade; binding is reserved for the controller.
#[derive(Default)]
pub struct SessionProxy {
    slot: Mutex<Option<Bound>>,
}

impl std::fmt::Debug for SessionProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionProxy")
            .field("bound", &self.bound_kind())
            .finish()
    }
}

impl SessionProxy {
    /// Construct an unbound proxy.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self) -> MutexGuard<'_, Option<Bound>> {
        // Sessions never panic while holding the lock; recover if one did.
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn with_session(&self, op: impl FnOnce(&mut dyn DesktopSession)) {
        let mut slot = self.slot();
        match slot.as_mut() {
            Some(bound) => op(bound.session.as_mut()),
            None => debug!("no session bound; call ignored"),
        }
    }

    /// Bind `session`, start it, and hand back whatever was bound before
    /// (already stopped) so the caller can retire it.
    pub(crate) fn attach_and_start(
        &self,
        tag: SessionTag,
        mut session: Box<dyn DesktopSession>,
    ) -> Option<Box<dyn DesktopSession>> {
        let mut slot = self.slot();
        let previous = slot.take().map(|mut bound| {
            bound.session.stop();
            bound.session
        });
        session.start();
        *slot = Some(Bound { tag, session });
        previous
    }

    /// Stop and unbind the current session, returning it for retirement.
    pub(crate) fn stop_and_detach(&self) -> Option<Box<dyn DesktopSession>> {
        self.slot().take().map(|mut bound| {
            bound.session.stop();
            bound.session
        })
    }

    /// Whether any session is bound.
    #[must_use]
    pub fn is_bound(&self) -> bool {
        self.slot().is_some()
    }

    /// Variant of the bound session.
    #[must_use]
    pub fn bound_kind(&self) -> Option<SessionKind> {
        self.slot().as_ref().map(|bound| bound.session.kind())
    }

    /// Tag of the bound session.
    #[must_use]
    pub fn bound_tag(&self) -> Option<SessionTag> {
        self.slot().as_ref().map(|bound| bound.tag)
    }

    /// Forward a control verb.
    pub fn control(&self, action: ControlAction) {
        self.with_session(|session| session.control(action));
    }

    /// Forward configuration.
    pub fn configure(&self, config: &DesktopConfig) {
        self.with_session(|session| session.configure(config));
    }

    /// Forward a screen selection.
    pub fn select_screen(&self, screen: &Screen) {
        self.with_session(|session| session.select_screen(screen));
    }

    /// Forward a capture request.
    pub fn capture_screen(&self) {
        self.with_session(|session| session.capture_screen());
    }

    /// Forward a keystroke.
    pub fn inject_key_event(&self, event: &KeyEvent) {
        self.with_session(|session| session.inject_key_event(event));
    }

    /// Forward pointer input.
    pub fn inject_mouse_event(&self, event: &MouseEvent) {
        self.with_session(|session| session.inject_mouse_event(event));
    }

    /// Forward clipboard content.
    pub fn inject_clipboard_event(&self, event: &ClipboardEvent) {
        self.with_session(|session| session.inject_clipboard_event(event));
    }
}
