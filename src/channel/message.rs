//! Messages exchanged with the worker process.
//!
//! One JSON object per line, discriminated by `type`.
//!
//! | Direction        | `type`                 |
//! |------------------|------------------------|
//! | worker → service | `screen_captured`, `audio_captured`, `screen_list_changed`, `clipboard_event` |
//! | service → worker | `control`, `configure`, `select_screen`, `capture_screen`, `key_event`, `mouse_event`, `clipboard_event` |

use serde::{Deserialize, Serialize};

use crate::models::desktop::{
    AudioPacket, ClipboardEvent, ControlAction, DesktopConfig, Frame, KeyEvent, MouseCursor,
    MouseEvent, Screen, ScreenList,
};
use crate::{AppError, Result};

/// Worker → service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DesktopToService {
    /// A new frame, a cursor change, or both.
    ScreenCaptured {
        /// Updated frame, if the screen changed.
        #[serde(default)]
        frame: Option<Frame>,
        /// Updated cursor, if it changed.
        #[serde(default)]
        cursor: Option<MouseCursor>,
    },
    /// Captured audio.
    AudioCaptured {
        /// Audio payload.
        packet: AudioPacket,
    },
    /// Monitor topology changed.
    ScreenListChanged {
        /// New list.
        list: ScreenList,
    },
    /// Clipboard changed inside the session.
    ClipboardEvent {
        /// Clipboard payload.
        event: ClipboardEvent,
    },
}

/// Service → worker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServiceToDesktop {
    /// Session-level control.
    Control {
        /// Requested action.
        action: ControlAction,
    },
    /// Appearance and capture settings.
    Configure {
        /// New configuration.
        config: DesktopConfig,
    },
    /// Switch the captured monitor.
    SelectScreen {
        /// Target screen.
        screen: Screen,
    },
    /// Request an immediate capture.
    CaptureScreen,
    /// Inject a keystroke.
    KeyEvent {
        /// Key event.
        event: KeyEvent,
    },
    /// Inject pointer input.
    MouseEvent {
        /// Mouse event.
        event: MouseEvent,
    },
    /// Push remote clipboard content into the session.
    ClipboardEvent {
        /// Clipboard payload.
        event: ClipboardEvent,
    },
}

/// Parse one inbound line.
///
/// Blank lines yield `Ok(None)`.
///
/// # Errors
///
/// Returns `AppError::Protocol` if the line is not a known message.
pub fn parse_inbound_line(line: &str) -> Result<Option<DesktopToService>> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }

    serde_json::from_str(trimmed)
        .map(Some)
        .map_err(|err| AppError::Protocol(format!("malformed message: {err}")))
}

/// Serialise an outbound message to a single line (without the terminator).
///
/// # Errors
///
/// Returns `AppError::Protocol` if serialisation fails.
pub fn encode_outbound(message: &ServiceToDesktop) -> Result<String> {
    serde_json::to_string(message)
        .map_err(|err| AppError::Protocol(format!("failed to serialise message: {err}")))
}
