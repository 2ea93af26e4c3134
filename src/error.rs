use crate::frame::close_code;
use pki_types::InvalidDnsNameError;
use std::io;
use std::str::Utf8Error;
use thiserror::Error;
use url::ParseError;

#[derive(Error, Debug)]
pub enum Error {
    // Transport
    #[error("IO error happened: {source}")]
    Io {
        #[from]
        source: io::Error,
    },

    #[error("write {step} failed: {source}")]
    WriteFailed {
        step: &'static str,
        source: io::Error,
    },

    // Deadlines
    #[error("read timer expired on the socket")]
    ReadTimerExpired,

    #[error("write timer expired on the socket")]
    WriteTimerExpired,

    // Framing
    #[error("mask requirement not met")]
    MaskRequirement,

    #[error("reserved bits must be zero")]
    RsvNotZero,

    #[error("payload exceeded for control frames, size requested {0}")]
    ControlFramePayloadSize(u64),

    #[error("payload exceeded max_payload size, size requested {0}")]
    PayloadTooBig(u64),

    #[error("invalid opcode: {0}")]
    InvalidOpcode(u8),

    // Handshake
    #[error("invalid handshake request method and version")]
    InvalidHttpHandshake,

    #[error("Connection: Upgrade header missing in the request")]
    NoConnectionHeaderPresent,

    #[error("Upgrade: websocket header missing in the request")]
    NoUpgradeHeaderPresent,

    #[error("couldn't find Sec-WebSocket-Key header in the request")]
    NoSecWebsocketKey,

    #[error("server didn't upgrade the connection")]
    NoUpgrade,

    #[error("server didn't send a valid Sec-WebSocket-Accept key")]
    InvalidAcceptKey,

    #[error("incomplete HTTP message")]
    IncompleteHttpMessage,

    #[error("{source}")]
    HttpParse {
        #[from]
        source: httparse::Error,
    },

    // URL / TLS setup
    #[error("{source}")]
    UrlParse {
        #[from]
        source: ParseError,
    },

    #[error("invalid scheme in WebSocket URL")]
    InvalidSchemeUrl,

    #[error("URL has no host")]
    UrlNoHost,

    #[error("configured TLS context does not match the URL scheme `{0}`")]
    SchemeAgainstTlsConfig(String),

    #[error("{source}")]
    DomainName {
        #[from]
        source: InvalidDnsNameError,
    },

    #[error("{source}")]
    Tls {
        #[from]
        source: rustls::Error,
    },

    #[error("{source}")]
    Utf8 {
        #[from]
        source: Utf8Error,
    },
}

impl Error {
    /// The close status code a connection is torn down with when this error
    /// aborts it. Everything that is not a deadline expiry or an oversize
    /// payload counts as a protocol violation.
    pub fn close_code(&self) -> u16 {
        match self {
            Error::ReadTimerExpired | Error::WriteTimerExpired => close_code::GOING_AWAY,
            Error::PayloadTooBig(_) => close_code::MESSAGE_TOO_BIG,
            _ => close_code::PROTOCOL_ERROR,
        }
    }
}
