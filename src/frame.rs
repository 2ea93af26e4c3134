use crate::error::Error;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Close status codes the library puts on the wire.
pub mod close_code {
    /// Peer requested close.
    pub const NORMAL: u16 = 1000;
    /// Read or write deadline expired.
    pub const GOING_AWAY: u16 = 1001;
    /// Protocol violation: mask requirement, reserved bits, oversize control frame, I/O failure.
    pub const PROTOCOL_ERROR: u16 = 1002;
    /// Payload exceeded the configured maximum.
    pub const MESSAGE_TOO_BIG: u16 = 1009;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpCode {
    Continue,
    Text,
    Binary,
    Close,
    Ping,
    Pong,
}

impl OpCode {
    pub fn from(byte: u8) -> Result<Self, Error> {
        match byte {
            0x0 => Ok(OpCode::Continue),
            0x1 => Ok(OpCode::Text),
            0x2 => Ok(OpCode::Binary),
            0x8 => Ok(OpCode::Close),
            0x9 => Ok(OpCode::Ping),
            0xA => Ok(OpCode::Pong),
            other => Err(Error::InvalidOpcode(other)),
        }
    }

    pub fn as_u8(&self) -> u8 {
        match self {
            OpCode::Continue => 0x0,
            OpCode::Text => 0x1,
            OpCode::Binary => 0x2,
            OpCode::Close => 0x8,
            OpCode::Ping => 0x9,
            OpCode::Pong => 0xA,
        }
    }

    pub fn is_control(&self) -> bool {
        matches!(self, OpCode::Close | OpCode::Ping | OpCode::Pong)
    }
}

/// Largest possible header: 2 base bytes, 8 extended-length bytes, 4 mask-key bytes.
pub const MAX_HEADER_SIZE: usize = 14;

/// The decoded first two bytes of a frame.
///
/// The 7-bit `length_field` still carries the wire encoding: values 126 and
/// 127 announce 2 or 8 extended-length bytes that follow the base header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub fin: bool,
    pub rsv1: bool,
    pub rsv2: bool,
    pub rsv3: bool,
    pub opcode: OpCode,
    pub masked: bool,
    pub length_field: u8,
}

impl FrameHeader {
    /// Unpacks the two base header bytes.
    ///
    /// The first byte carries FIN, the three reserved bits and the opcode;
    /// the second carries the mask bit and the 7-bit payload length field.
    pub fn parse(bytes: [u8; 2]) -> Result<Self, Error> {
        let opcode = OpCode::from(bytes[0] & 0b0000_1111)?;
        Ok(FrameHeader {
            fin: (bytes[0] & 0b1000_0000) != 0,
            rsv1: (bytes[0] & 0b0100_0000) != 0,
            rsv2: (bytes[0] & 0b0010_0000) != 0,
            rsv3: (bytes[0] & 0b0001_0000) != 0,
            opcode,
            masked: (bytes[1] & 0b1000_0000) != 0,
            length_field: bytes[1] & 0b0111_1111,
        })
    }

    pub fn has_rsv_bits(&self) -> bool {
        self.rsv1 || self.rsv2 || self.rsv3
    }

    /// Number of extended payload-length bytes announced by the base header.
    pub fn extended_len_bytes(&self) -> usize {
        match self.length_field {
            126 => 2,
            127 => 8,
            _ => 0,
        }
    }
}

/// Packs a complete frame header into `buf`, returning the number of bytes
/// written: 2, 4 or 10, plus 4 when a mask key is present.
///
/// Reserved bits are always written as zero. Payload lengths up to 125 use
/// the 7-bit field directly; up to 65535 the 16-bit form; above that the
/// 64-bit form. Extended lengths are network byte order.
pub fn encode_header(
    buf: &mut [u8; MAX_HEADER_SIZE],
    fin: bool,
    opcode: OpCode,
    mask: Option<[u8; 4]>,
    payload_len: usize,
) -> usize {
    buf[0] = (fin as u8) << 7 | opcode.as_u8();
    let mask_bit = if mask.is_some() { 0b1000_0000 } else { 0 };

    let mut used = if payload_len <= 125 {
        buf[1] = mask_bit | payload_len as u8;
        2
    } else if payload_len <= 65535 {
        buf[1] = mask_bit | 126;
        buf[2..4].copy_from_slice(&(payload_len as u16).to_be_bytes());
        4
    } else {
        buf[1] = mask_bit | 127;
        buf[2..10].copy_from_slice(&(payload_len as u64).to_be_bytes());
        10
    };

    if let Some(key) = mask {
        buf[used..used + 4].copy_from_slice(&key);
        used += 4;
    }

    used
}

/// XORs every payload byte with `key[i % 4]`. Applying the same key twice
/// restores the original bytes, so this serves both masking and unmasking.
pub fn apply_mask(payload: &mut [u8], key: [u8; 4]) {
    for (i, byte) in payload.iter_mut().enumerate() {
        *byte ^= key[i % 4];
    }
}

/// Fresh 4-byte masking key, each byte drawn uniformly from 0..=255.
pub fn generate_mask_key() -> [u8; 4] {
    let mut rng = StdRng::from_rng(&mut rand::rng());
    [
        rng.random::<u8>(),
        rng.random::<u8>(),
        rng.random::<u8>(),
        rng.random::<u8>(),
    ]
}
