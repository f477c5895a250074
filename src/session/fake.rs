//! Placeholder session bound while no worker is attached.

use tracing::debug;

use crate::models::desktop::{
    ClipboardEvent, ControlAction, DesktopConfig, Frame, KeyEvent, MouseEvent, Screen, ScreenList,
};
use crate::models::session::SessionKind;
use crate::session::{DesktopSession, SessionEvent, SessionEventSink};

/// Width of the placeholder frame.
pub const FAKE_SCREEN_WIDTH: u32 = 800;
/// Height of the placeholder frame.
pub const FAKE_SCREEN_HEIGHT: u32 = 600;

/// Stand-in session that starts immediately, never fails, and only ever
/// produces a blank frame and a single placeholder screen.
#[derive(Debug)]
pub struct FakeSession {
    sink: SessionEventSink,
    started: bool,
}

impl FakeSession {
    /// Construct an unstarted placeholder.
    #[must_use]
    pub fn new(sink: SessionEventSink) -> Self {
        Self {
            sink,
            started: false,
        }
    }

    fn placeholder_screens() -> ScreenList {
        ScreenList {
            screens: vec![Screen {
                id: 0,
                title: "Session unavailable".into(),
            }],
            current: 0,
        }
    }
}

impl DesktopSession for FakeSession {
    fn kind(&self) -> SessionKind {
        SessionKind::Fake
    }

    fn start(&mut self) {
        if self.started {
            return;
        }
        self.started = true;
        debug!(tag = self.sink.tag().0, "fake session started");
        self.sink.emit(SessionEvent::Started);
        self.sink
            .emit(SessionEvent::ScreenListChanged(Self::placeholder_screens()));
    }

    fn stop(&mut self) {
        self.started = false;
    }

    fn control(&mut self, action: ControlAction) {
        debug!(?action, "fake session ignores control");
    }

    fn configure(&mut self, _config: &DesktopConfig) {}

    fn select_screen(&mut self, _screen: &Screen) {}

    fn capture_screen(&mut self) {
        if !self.started {
            return;
        }
        self.sink.emit(SessionEvent::ScreenCaptured {
            frame: Some(Frame::blank(FAKE_SCREEN_WIDTH, FAKE_SCREEN_HEIGHT)),
            cursor: None,
        });
    }

    fn inject_key_event(&mut self, _event: &KeyEvent) {}

    fn inject_mouse_event(&mut self, _event: &MouseEvent) {}

    fn inject_clipboard_event(&mut self, _event: &ClipboardEvent) {}
}
