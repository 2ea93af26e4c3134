use crate::connection::{Connection, Deadline, Role};
use crate::error::Error;
use crate::executor::EndpointContext;
use crate::frame::{self, close_code, FrameHeader, OpCode};
use crate::message::{Message, OutboundMessage};
use crate::stream::MaybeTlsStream;
use log::debug;
use std::rc::Rc;
use tokio::io::{AsyncReadExt, BufReader, ReadHalf};

pub(crate) struct Frame {
    pub fin: bool,
    pub opcode: OpCode,
    pub payload: Vec<u8>,
}

/// The receive half of a connection: loops reading frames and dispatching
/// them to the user callbacks until the peer closes, a deadline fires or the
/// frame stream violates the protocol.
pub(crate) struct ReadStream {
    buf_reader: BufReader<ReadHalf<MaybeTlsStream>>,
    conn: Connection,
    role: Role,
    ctx: Rc<EndpointContext>,
}

impl ReadStream {
    pub fn new(
        buf_reader: BufReader<ReadHalf<MaybeTlsStream>>,
        conn: Connection,
        role: Role,
        ctx: Rc<EndpointContext>,
    ) -> Self {
        Self {
            buf_reader,
            conn,
            role,
            ctx,
        }
    }

    pub async fn poll_frames(mut self) {
        loop {
            match self.read_frame().await {
                Ok(frame) => match frame.opcode {
                    OpCode::Ping => {
                        self.ctx.callbacks.ping(self.conn.clone(), &frame.payload);
                        // A ping is answered with a pong carrying the same
                        // payload, queued like any other outbound frame.
                        self.conn.send(OutboundMessage::pong(frame.payload));
                    }
                    OpCode::Pong => {
                        self.ctx.callbacks.pong(self.conn.clone(), &frame.payload);
                    }
                    OpCode::Close => {
                        let (code, reason) = parse_close_body(&frame.payload);
                        self.conn.close(code, &reason);
                        break;
                    }
                    OpCode::Continue => {
                        // Fragments are not reassembled; each one is handed
                        // to the application with its raw opcode.
                        debug!(
                            "connection {}: continuation frame (fin={}) passed through",
                            self.conn.id(),
                            frame.fin
                        );
                        self.ctx.callbacks.message(
                            self.conn.clone(),
                            Message {
                                opcode: frame.opcode,
                                payload: frame.payload,
                            },
                        );
                    }
                    OpCode::Text | OpCode::Binary => {
                        self.ctx.callbacks.message(
                            self.conn.clone(),
                            Message {
                                opcode: frame.opcode,
                                payload: frame.payload,
                            },
                        );
                    }
                },
                Err(err) => {
                    self.conn.close(err.close_code(), &err.to_string());
                    break;
                }
            }
        }
    }

    /// One pass of the receive state machine: base header, extended length,
    /// mask key, payload. Each read arms the read deadline anew.
    async fn read_frame(&mut self) -> Result<Frame, Error> {
        let deadline = Deadline::read(self.ctx.config.read_timeout_secs);

        let mut base = [0u8; 2];
        Self::read_exact(&mut self.buf_reader, &deadline, &mut base).await?;
        let header = FrameHeader::parse(base)?;

        // Clients must mask, servers must not. A frame on the wrong side of
        // that rule is dropped before its payload is ever read.
        if !self.role.accepts_inbound_mask_bit(header.masked) {
            return Err(Error::MaskRequirement);
        }
        // No extension is ever negotiated, so any reserved bit fails the
        // connection.
        if header.has_rsv_bits() {
            return Err(Error::RsvNotZero);
        }

        let mut length = header.length_field as u64;
        match header.extended_len_bytes() {
            2 => {
                let mut ext = [0u8; 2];
                Self::read_exact(&mut self.buf_reader, &deadline, &mut ext).await?;
                length = u16::from_be_bytes(ext) as u64;
            }
            8 => {
                let mut ext = [0u8; 8];
                Self::read_exact(&mut self.buf_reader, &deadline, &mut ext).await?;
                length = u64::from_be_bytes(ext);
            }
            _ => {}
        }

        if header.opcode.is_control() && length > 125 {
            return Err(Error::ControlFramePayloadSize(length));
        }
        if length > self.ctx.config.max_payload as u64 {
            return Err(Error::PayloadTooBig(length));
        }

        let mask = if header.masked {
            let mut key = [0u8; 4];
            Self::read_exact(&mut self.buf_reader, &deadline, &mut key).await?;
            Some(key)
        } else {
            None
        };

        let mut payload = vec![0u8; length as usize];
        if !payload.is_empty() {
            Self::read_exact(&mut self.buf_reader, &deadline, &mut payload).await?;
        }
        if let Some(key) = mask {
            frame::apply_mask(&mut payload, key);
        }

        Ok(Frame {
            fin: header.fin,
            opcode: header.opcode,
            payload,
        })
    }

    async fn read_exact(
        reader: &mut BufReader<ReadHalf<MaybeTlsStream>>,
        deadline: &Deadline,
        buf: &mut [u8],
    ) -> Result<(), Error> {
        deadline
            .guard(async {
                reader.read_exact(buf).await?;
                Ok(())
            })
            .await
    }
}

/// A CLOSE body is a big-endian status code plus an optional reason; an
/// empty body means a plain "peer requested close".
fn parse_close_body(payload: &[u8]) -> (u16, String) {
    if payload.len() >= 2 {
        let code = u16::from_be_bytes([payload[0], payload[1]]);
        let reason = String::from_utf8_lossy(&payload[2..]).into_owned();
        (code, reason)
    } else {
        (close_code::NORMAL, String::from("peer requested close"))
    }
}
