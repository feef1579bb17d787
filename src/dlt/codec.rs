//! DLT wire framing.
//!
//! Every message on the link is emitted as:
//!
//!   `<0x77 preamble><kind><length><payload bytes>`
//!
//! where `kind` is `0x01` for a request and `0x02` for a response and `length`
//! is the number of payload bytes (0..=255). There is no checksum and no escaping.
//!
//! [`encode`] builds a frame. [`FrameDecoder`] is an incremental decoder that is
//! fed bytes from a live stream and keeps partial frames across calls, so a
//! transport that returns nothing on a read timeout never costs a frame. Bytes
//! seen while hunting for the preamble are reported one at a time as
//! [`Decoded::Desync`] and discarded.
use bytes::{BufMut, Bytes, BytesMut};
use std::fmt;

use crate::error::{DltError, Result};

/// Frame start marker.
pub const PREAMBLE: u8 = 0x77;
pub const REQUEST_CODE: u8 = 0x01;
pub const RESPONSE_CODE: u8 = 0x02;
/// Preamble, kind and length.
pub const HEADER_LEN: usize = 3;
pub const MAX_PAYLOAD_LEN: usize = u8::MAX as usize;
pub const MAX_FRAME_LEN: usize = HEADER_LEN + MAX_PAYLOAD_LEN;

/// Message kind carried in byte 1 of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Request,
    Response,
    /// Any other code. The wire format does not enforce the kind, so these are
    /// still framed and delivered.
    Unknown(u8),
}

impl MessageKind {
    pub fn from_code(code: u8) -> Self {
        match code {
            REQUEST_CODE => MessageKind::Request,
            RESPONSE_CODE => MessageKind::Response,
            other => MessageKind::Unknown(other),
        }
    }

    pub fn code(self) -> u8 {
        match self {
            MessageKind::Request => REQUEST_CODE,
            MessageKind::Response => RESPONSE_CODE,
            MessageKind::Unknown(code) => code,
        }
    }

    pub fn is_known(self) -> bool {
        !matches!(self, MessageKind::Unknown(_))
    }

    fn label(self) -> &'static str {
        match self {
            MessageKind::Request => "REQUEST",
            MessageKind::Response => "RESPONSE",
            MessageKind::Unknown(_) => "UNKNOWN",
        }
    }
}

/// One complete frame. The preamble is implicit and the length is always
/// `payload.len()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub kind: MessageKind,
    pub payload: Bytes,
}

impl Frame {
    pub fn new(kind: MessageKind, payload: impl Into<Bytes>) -> Self {
        Self {
            kind,
            payload: payload.into(),
        }
    }

    /// Size on the wire.
    pub fn wire_len(&self) -> usize {
        HEADER_LEN + self.payload.len()
    }

    pub fn encode(&self) -> Result<Bytes> {
        encode(&self.payload, self.kind)
    }

    pub fn into_parts(self) -> (MessageKind, Bytes) {
        (self.kind, self.payload)
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "PREAMBLE: 0x{:02X} MSG_TYPE: 0x{:02X} - {} LENGTH: {}",
            PREAMBLE,
            self.kind.code(),
            self.kind.label(),
            self.payload.len()
        )
    }
}

/// Encode `payload` as a frame of the given kind.
///
/// Fails with [`DltError::PayloadTooLarge`] when the payload does not fit the
/// one-byte length field.
pub fn encode(payload: &[u8], kind: MessageKind) -> Result<Bytes> {
    let len = u8::try_from(payload.len()).map_err(|_| DltError::PayloadTooLarge(payload.len()))?;
    let mut out = BytesMut::with_capacity(HEADER_LEN + payload.len());
    out.put_u8(PREAMBLE);
    out.put_u8(kind.code());
    out.put_u8(len);
    out.put_slice(payload);
    Ok(out.freeze())
}

/// Outcome of feeding the decoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    /// A complete frame was recognized.
    Frame(Frame),
    /// The source ran dry before a frame completed. Partial state is kept.
    NeedMoreData,
    /// This byte arrived where a preamble was expected and was discarded.
    Desync(u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecodeState {
    Preamble,
    Kind,
    Length,
    Payload,
}

/// Incremental, byte-synchronous frame decoder.
#[derive(Debug)]
pub struct FrameDecoder {
    state: DecodeState,
    kind: MessageKind,
    expected: usize,
    payload: BytesMut,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self {
            state: DecodeState::Preamble,
            kind: MessageKind::Request,
            expected: 0,
            payload: BytesMut::with_capacity(MAX_PAYLOAD_LEN),
        }
    }

    /// True while a frame has been started but not finished.
    pub fn in_progress(&self) -> bool {
        self.state != DecodeState::Preamble
    }

    /// Drop any partial frame and go back to hunting for a preamble.
    pub fn reset(&mut self) {
        self.state = DecodeState::Preamble;
        self.expected = 0;
        self.payload.clear();
    }

    /// Feed one byte.
    ///
    /// Returns `NeedMoreData` when the byte was accepted as part of a frame
    /// that is not yet complete.
    pub fn push_byte(&mut self, byte: u8) -> Decoded {
        match self.state {
            DecodeState::Preamble => {
                if byte != PREAMBLE {
                    return Decoded::Desync(byte);
                }
                self.state = DecodeState::Kind;
                Decoded::NeedMoreData
            }
            DecodeState::Kind => {
                self.kind = MessageKind::from_code(byte);
                self.state = DecodeState::Length;
                Decoded::NeedMoreData
            }
            DecodeState::Length => {
                self.expected = byte as usize;
                self.payload.clear();
                if self.expected == 0 {
                    return self.finish();
                }
                self.state = DecodeState::Payload;
                Decoded::NeedMoreData
            }
            DecodeState::Payload => {
                self.payload.put_u8(byte);
                if self.payload.len() == self.expected {
                    return self.finish();
                }
                Decoded::NeedMoreData
            }
        }
    }

    /// Pull bytes from `source` until a frame completes, a byte is discarded,
    /// or the source is exhausted.
    ///
    /// Consumes exactly one byte per `Desync`, so resynchronizing after noise
    /// costs one call per garbage byte.
    pub fn decode_stream<I>(&mut self, source: &mut I) -> Decoded
    where
        I: Iterator<Item = u8>,
    {
        for byte in source.by_ref() {
            match self.push_byte(byte) {
                Decoded::NeedMoreData => continue,
                outcome => return outcome,
            }
        }
        Decoded::NeedMoreData
    }

    fn finish(&mut self) -> Decoded {
        let payload = self.payload.split().freeze();
        let frame = Frame {
            kind: self.kind,
            payload,
        };
        self.reset();
        Decoded::Frame(frame)
    }
}
