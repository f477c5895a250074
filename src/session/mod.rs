//! Desktop session variants and the proxy that fronts them.
//!
//! A [`DesktopSession`] is the logical source of screen, audio, and
//! clipboard events for one remote connection. The controller only ever
//! talks to the trait; which variant is live is an implementation detail
//! hidden behind [`proxy::SessionProxy`].

pub mod channel;
pub mod fake;
pub mod proxy;

use crate::models::desktop::{
    AudioPacket, ClipboardEvent, ControlAction, DesktopConfig, Frame, KeyEvent, MouseCursor,
    MouseEvent, Screen, ScreenList,
};
use crate::models::session::{SessionKind, SessionTag};
use crate::orchestrator::mailbox::{ControllerEvent, Mailbox};

/// Events a session reports to its controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The session is producing output.
    Started,
    /// The session ended on its own (worker exit, channel closed).
    Stopped,
    /// Frame and/or cursor update.
    ScreenCaptured {
        /// Updated frame.
        frame: Option<Frame>,
        /// Updated cursor.
        cursor: Option<MouseCursor>,
    },
    /// Captured audio.
    AudioCaptured(AudioPacket),
    /// Monitor topology changed.
    ScreenListChanged(ScreenList),
    /// Clipboard changed inside the session.
    ClipboardEvent(ClipboardEvent),
}

/// Posts a session's events to the controller mailbox, stamped with the
/// session's tag.
#[derive(Debug, Clone)]
pub struct SessionEventSink {
    tag: SessionTag,
    mailbox: Mailbox,
}

impl SessionEventSink {
    /// Build a sink for the session identified by `tag`.
    #[must_use]
    pub fn new(tag: SessionTag, mailbox: Mailbox) -> Self {
        Self { tag, mailbox }
    }

    /// Tag stamped on every emitted event.
    #[must_use]
    pub fn tag(&self) -> SessionTag {
        self.tag
    }

    /// Queue an event for the controller. Never re-enters the caller.
    pub fn emit(&self, event: SessionEvent) {
        self.mailbox.post(ControllerEvent::Session {
            tag: self.tag,
            event,
        });
    }
}

/// Capability set shared by every session variant.
///
/// All operations are fire-and-forget: results come back as
/// [`SessionEvent`]s through the session's sink.
pub trait DesktopSession: Send {
    /// Which variant this is.
    fn kind(&self) -> SessionKind;

    /// Begin producing events.
    fn start(&mut self);

    /// Stop producing events. Idempotent.
    fn stop(&mut self);

    /// Session-level control verb.
    fn control(&mut self, action: ControlAction);

    /// Apply appearance and capture settings.
    fn configure(&mut self, config: &DesktopConfig);

    /// Switch the captured monitor.
    fn select_screen(&mut self, screen: &Screen);

    /// Request an immediate capture.
    fn capture_screen(&mut self);

    /// Inject a keystroke.
    fn inject_key_event(&mut self, event: &KeyEvent);

    /// Inject pointer input.
    fn inject_mouse_event(&mut self, event: &MouseEvent);

    /// Push remote clipboard content into the session.
    fn inject_clipboard_event(&mut self, event: &ClipboardEvent);
}
