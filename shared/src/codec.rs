//! Length-prefixed framing for [`Message`]s over a byte stream.
//!
//! A frame is a 4-byte big-endian payload length followed by the bincode payload.
//! Decoding is resumable: a partial frame reports [`Decoded::NeedMoreData`] and the
//! caller retries once more bytes arrive.

use crate::protocol::Message;
use bincode::Options;
use thiserror::Error;

pub const FRAME_HEADER_LEN: usize = 4;
pub const MAX_FRAME_SIZE: usize = 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("frame of {0} bytes exceeds the maximum frame size")]
    FrameTooLarge(usize),
    #[error("empty frame")]
    EmptyFrame,
    #[error("invalid payload: {0}")]
    InvalidPayload(String),
    #[error("failed to encode message: {0}")]
    Encode(String),
}

/// Result of one decode attempt.
#[derive(Debug, PartialEq)]
pub enum Decoded {
    Frame { message: Message, consumed: usize },
    NeedMoreData,
    Malformed(ProtocolError),
}

// The byte limit bounds every allocation bincode makes for length-prefixed fields.
fn wire_options() -> impl Options {
    bincode::DefaultOptions::new().with_limit(MAX_FRAME_SIZE as u64)
}

pub fn encode(message: &Message) -> Result<Vec<u8>, ProtocolError> {
    let payload = wire_options()
        .serialize(message)
        .map_err(|e| ProtocolError::Encode(e.to_string()))?;
    if payload.len() > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge(payload.len()));
    }

    let mut frame = Vec::with_capacity(FRAME_HEADER_LEN + payload.len());
    frame.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    frame.extend_from_slice(&payload);
    Ok(frame)
}

/// Appends the encoded frame to `out`, leaving `out` untouched on error.
pub fn encode_into(message: &Message, out: &mut Vec<u8>) -> Result<(), ProtocolError> {
    let frame = encode(message)?;
    out.extend_from_slice(&frame);
    Ok(())
}

pub fn decode(buffer: &[u8]) -> Decoded {
    if buffer.len() < FRAME_HEADER_LEN {
        return Decoded::NeedMoreData;
    }

    let mut header = [0u8; FRAME_HEADER_LEN];
    header.copy_from_slice(&buffer[..FRAME_HEADER_LEN]);
    let declared = u32::from_be_bytes(header) as usize;

    if declared > MAX_FRAME_SIZE {
        return Decoded::Malformed(ProtocolError::FrameTooLarge(declared));
    }
    if declared == 0 {
        return Decoded::Malformed(ProtocolError::EmptyFrame);
    }

    let total = FRAME_HEADER_LEN + declared;
    if buffer.len() < total {
        return Decoded::NeedMoreData;
    }

    match wire_options().deserialize::<Message>(&buffer[FRAME_HEADER_LEN..total]) {
        Ok(message) => Decoded::Frame {
            message,
            consumed: total,
        },
        Err(e) => Decoded::Malformed(ProtocolError::InvalidPayload(e.to_string())),
    }
}

/// Accumulates stream bytes and hands out complete frames.
#[derive(Debug, Default)]
pub struct FrameBuffer {
    buffer: Vec<u8>,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extend(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Decodes the next frame, dropping its bytes from the buffer.
    ///
    /// After `Malformed` the stream cannot be resynchronised; the connection has to go.
    pub fn next_frame(&mut self) -> Decoded {
        match decode(&self.buffer) {
            Decoded::Frame { message, consumed } => {
                self.buffer.drain(..consumed);
                Decoded::Frame { message, consumed }
            }
            other => other,
        }
    }

    /// Drains every complete frame currently buffered.
    pub fn drain_frames(&mut self) -> Result<Vec<Message>, ProtocolError> {
        let mut messages = Vec::new();
        loop {
            match self.next_frame() {
                Decoded::Frame { message, .. } => messages.push(message),
                Decoded::NeedMoreData => return Ok(messages),
                Decoded::Malformed(e) => return Err(e),
            }
        }
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}
