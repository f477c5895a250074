//! Capture, input, and configuration payloads exchanged with the worker.
//!
//! Byte payloads are carried as standard base64 strings on the wire.

use serde::{Deserialize, Serialize};

/// Captured screen image in 32-bit BGRA.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Frame {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Row-major pixel data, `width * height * 4` bytes.
    #[serde(with = "serde_base64")]
    pub data: Vec<u8>,
}

impl Frame {
    /// A zero-filled (black) frame of the given size.
    #[must_use]
    pub fn blank(width: u32, height: u32) -> Self {
        let len = (width as usize) * (height as usize) * 4;
        Self {
            width,
            height,
            data: vec![0; len],
        }
    }
}

/// Mouse cursor image and hotspot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MouseCursor {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Hotspot X offset.
    pub hotspot_x: u32,
    /// Hotspot Y offset.
    pub hotspot_y: u32,
    /// BGRA pixel data.
    #[serde(with = "serde_base64")]
    pub data: Vec<u8>,
}

/// Encoded audio chunk produced by the worker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AudioPacket {
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Channel count.
    pub channels: u16,
    /// Opaque payload.
    #[serde(with = "serde_base64")]
    pub data: Vec<u8>,
}

/// One monitor as reported by the worker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Screen {
    /// Worker-assigned identifier.
    pub id: i64,
    /// Human-readable title.
    pub title: String,
}

/// Monitors available in the session and the one being captured.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScreenList {
    /// All known screens.
    pub screens: Vec<Screen>,
    /// Identifier of the screen currently captured.
    pub current: i64,
}

/// Clipboard content crossing the session boundary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClipboardEvent {
    /// MIME type, e.g. `text/plain; charset=UTF-8`.
    pub mime_type: String,
    /// Raw content.
    #[serde(with = "serde_base64")]
    pub data: Vec<u8>,
}

/// Keyboard event to inject.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct KeyEvent {
    /// Platform-independent USB HID usage code.
    pub usb_keycode: u32,
    /// Whether the key is pressed (`true`) or released.
    pub pressed: bool,
}

/// Mouse event to inject.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct MouseEvent {
    /// Absolute X position.
    pub x: i32,
    /// Absolute Y position.
    pub y: i32,
    /// Button and wheel bit mask.
    pub mask: u32,
}

/// Session-level control verbs forwarded to the worker.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ControlAction {
    /// Begin capturing and accepting input.
    Enable,
    /// Stop capturing and ignore input.
    Disable,
    /// Lock the interactive session.
    LockScreen,
    /// Log off the interactive user.
    Logoff,
}

/// Desktop appearance flags. `true` keeps the feature on during the session.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct DesktopConfig {
    /// Keep the desktop wallpaper.
    #[serde(default)]
    pub wallpaper: bool,
    /// Keep font smoothing (`ClearType` and similar).
    #[serde(default = "default_true")]
    pub font_smoothing: bool,
    /// Keep animations and visual effects.
    #[serde(default)]
    pub effects: bool,
}

fn default_true() -> bool {
    true
}

impl Default for DesktopConfig {
    fn default() -> Self {
        Self {
            wallpaper: false,
            font_smoothing: true,
            effects: false,
        }
    }
}

mod serde_base64 {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(|err| serde::de::Error::custom(format!("invalid base64 payload: {err}")))
    }
}
