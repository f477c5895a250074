//! Boundary between the controller and the rest of the host.

use tracing::{debug, info, warn};

use crate::models::desktop::{AudioPacket, ClipboardEvent, Frame, MouseCursor, ScreenList};
use crate::models::session::{ControllerState, ErrorCause};

/// Receives everything the bound session produces, verbatim, plus
/// controller lifecycle notifications.
pub trait ControllerDelegate: Send + Sync {
    /// A session (real or placeholder) started producing output.
    fn on_desktop_session_started(&self);

    /// Frame and/or cursor update.
    fn on_screen_captured(&self, frame: Option<&Frame>, cursor: Option<&MouseCursor>);

    /// Captured audio.
    fn on_audio_captured(&self, packet: &AudioPacket);

    /// Monitor topology changed.
    fn on_screen_list_changed(&self, list: &ScreenList);

    /// Clipboard changed inside the session.
    fn on_clipboard_event(&self, event: &ClipboardEvent);

    /// The controller entered `state`.
    fn on_state_changed(&self, _state: ControllerState) {}

    /// An attach attempt was abandoned. Called once per failed attempt.
    fn on_session_error(&self, _cause: ErrorCause) {}
}

/// Delegate that only logs. Used when no transport is wired up.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingDelegate;

impl ControllerDelegate for LoggingDelegate {
    fn on_desktop_session_started(&self) {
        info!("desktop session started");
    }

    fn on_screen_captured(&self, frame: Option<&Frame>, cursor: Option<&MouseCursor>) {
        debug!(
            frame = ?frame.map(|f| (f.width, f.height)),
            cursor = cursor.is_some(),
            "screen captured"
        );
    }

    fn on_audio_captured(&self, packet: &AudioPacket) {
        debug!(bytes = packet.data.len(), "audio captured");
    }

    fn on_screen_list_changed(&self, list: &ScreenList) {
        info!(screens = list.screens.len(), current = list.current, "screen list changed");
    }

    fn on_clipboard_event(&self, event: &ClipboardEvent) {
        debug!(mime_type = %event.mime_type, bytes = event.data.len(), "clipboard event");
    }

    fn on_state_changed(&self, state: ControllerState) {
        info!(%state, "controller state changed");
    }

    fn on_session_error(&self, cause: ErrorCause) {
        warn!(?cause, "desktop session unavailable");
    }
}
