use crate::error::Error;
use crate::frame::OpCode;

/// A data frame (TEXT, BINARY, or a raw CONTINUATION) delivered to
/// `on_message`.
///
/// The opcode is the raw one from the wire: CONTINUATION frames of a
/// fragmented message are handed over one by one, they are not reassembled.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub opcode: OpCode,
    pub payload: Vec<u8>,
}

impl Message {
    pub fn as_text(&self) -> Result<&str, Error> {
        Ok(std::str::from_utf8(&self.payload)?)
    }

    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }
}

/// A frame queued for sending.
///
/// `compress` is reserved for a future permessage-deflate extension; it is
/// carried through the pipeline but never negotiated or applied.
#[derive(Debug, Clone)]
pub struct OutboundMessage {
    pub payload: Vec<u8>,
    pub opcode: OpCode,
    pub compress: bool,
}

impl OutboundMessage {
    pub fn text(data: impl Into<String>) -> Self {
        OutboundMessage {
            payload: data.into().into_bytes(),
            opcode: OpCode::Text,
            compress: false,
        }
    }

    pub fn binary(data: Vec<u8>) -> Self {
        OutboundMessage {
            payload: data,
            opcode: OpCode::Binary,
            compress: false,
        }
    }

    pub fn ping(data: Vec<u8>) -> Self {
        OutboundMessage {
            payload: data,
            opcode: OpCode::Ping,
            compress: false,
        }
    }

    pub fn pong(data: Vec<u8>) -> Self {
        OutboundMessage {
            payload: data,
            opcode: OpCode::Pong,
            compress: false,
        }
    }
}

/// Builds a CLOSE frame body: 2-byte big-endian status code followed by the
/// reason text, truncated at a character boundary so the whole body fits the
/// 125-byte control-frame limit.
pub(crate) fn close_body(code: u16, reason: &str) -> Vec<u8> {
    const MAX_REASON: usize = 125 - 2;

    let mut reason = reason;
    if reason.len() > MAX_REASON {
        let mut end = MAX_REASON;
        while !reason.is_char_boundary(end) {
            end -= 1;
        }
        reason = &reason[..end];
    }

    let mut body = Vec::with_capacity(2 + reason.len());
    body.extend_from_slice(&code.to_be_bytes());
    body.extend_from_slice(reason.as_bytes());
    body
}
