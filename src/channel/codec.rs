//! NDJSON codec for the worker channel.
//!
//! Wraps [`tokio_util::codec::LinesCodec`] with a maximum line length so a
//! misbehaving worker cannot make the service buffer an unterminated line
//! forever.

use bytes::BytesMut;
use tokio_util::codec::{Decoder, LinesCodec, LinesCodecError};

use crate::{AppError, Result};

/// Maximum inbound line length: 64 MiB.
///
/// Frames travel inline as base64, so a 3840x2160 BGRA capture (about
/// 44 MB encoded) fits with room for the cursor.
pub const MAX_LINE_BYTES: usize = 64 * 1024 * 1024;

/// Line decoder for messages arriving from the worker.
#[derive(Debug)]
pub struct ChannelCodec(LinesCodec);

impl ChannelCodec {
    /// Create a codec with the default [`MAX_LINE_BYTES`] limit.
    #[must_use]
    pub fn new() -> Self {
        Self(LinesCodec::new_with_max_length(MAX_LINE_BYTES))
    }
}

impl Default for ChannelCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for ChannelCodec {
    type Item = String;
    type Error = AppError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        self.0.decode(src).map_err(map_codec_error)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        self.0.decode_eof(src).map_err(map_codec_error)
    }
}

fn map_codec_error(e: LinesCodecError) -> AppError {
    match e {
        LinesCodecError::MaxLineLengthExceeded => {
            AppError::Protocol(format!("line too long: exceeded {MAX_LINE_BYTES} bytes"))
        }
        LinesCodecError::Io(io_err) => AppError::Io(io_err.to_string()),
    }
}
