//! Newline framing for the agent stdio streams.
//!
//! One JSON object per `\n`-terminated UTF-8 line in both directions. The
//! decoder caps line length so a misbehaving agent cannot make the gateway
//! buffer an unterminated line forever.

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder, LinesCodec, LinesCodecError};

use crate::{AppError, Result};

/// Maximum accepted line length: 1 MiB.
pub const MAX_FRAME_BYTES: usize = 1_048_576;

/// Line codec for agent stdio with the [`MAX_FRAME_BYTES`] cap applied on
/// the inbound side.
#[derive(Debug)]
pub struct FrameCodec(LinesCodec);

impl FrameCodec {
    /// Create a codec with the default size cap.
    #[must_use]
    pub fn new() -> Self {
        Self(LinesCodec::new_with_max_length(MAX_FRAME_BYTES))
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for FrameCodec {
    type Item = String;
    type Error = AppError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<String>> {
        self.0.decode(src).map_err(map_err)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<String>> {
        self.0.decode_eof(src).map_err(map_err)
    }
}

impl Encoder<String> for FrameCodec {
    type Error = AppError;

    fn encode(&mut self, item: String, dst: &mut BytesMut) -> Result<()> {
        self.0.encode(item, dst).map_err(map_err)
    }
}

fn map_err(err: LinesCodecError) -> AppError {
    match err {
        LinesCodecError::MaxLineLengthExceeded => AppError::Protocol(format!(
            "line too long: exceeded {MAX_FRAME_BYTES} bytes"
        )),
        LinesCodecError::Io(io) => AppError::Io(io.to_string()),
    }
}
