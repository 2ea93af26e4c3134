use crate::connection::Deadline;
use crate::error::Error;
use crate::executor::{ConnState, EndpointContext};
use crate::frame::{self, OpCode, MAX_HEADER_SIZE};
use crate::message::{close_body, OutboundMessage};
use log::{debug, info};
use std::collections::{HashMap, VecDeque};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use uuid::Uuid;

/// One queued outbound frame. The queue itself belongs to the endpoint and
/// is shared by all of its connections.
pub(crate) struct SendQueueEntry {
    pub id: Uuid,
    pub message: OutboundMessage,
}

/// Serializes a single frame: header (with a fresh mask key for clients),
/// then payload. Client payloads are masked into an owned copy, the caller's
/// buffer is never touched.
pub(crate) async fn write_frame<W>(
    writer: &mut W,
    masks_outbound: bool,
    opcode: OpCode,
    payload: &[u8],
) -> Result<(), Error>
where
    W: AsyncWrite + Unpin,
{
    let mask = if masks_outbound {
        Some(frame::generate_mask_key())
    } else {
        None
    };

    let mut header = [0u8; MAX_HEADER_SIZE];
    let used = frame::encode_header(&mut header, true, opcode, mask, payload.len());

    writer
        .write_all(&header[..used])
        .await
        .map_err(|source| Error::WriteFailed {
            step: "header",
            source,
        })?;

    if let Some(key) = mask {
        let mut masked = payload.to_vec();
        frame::apply_mask(&mut masked, key);
        writer
            .write_all(&masked)
            .await
            .map_err(|source| Error::WriteFailed {
                step: "payload",
                source,
            })?;
    } else {
        writer
            .write_all(payload)
            .await
            .map_err(|source| Error::WriteFailed {
                step: "payload",
                source,
            })?;
    }

    writer
        .flush()
        .await
        .map_err(|source| Error::WriteFailed {
            step: "flush",
            source,
        })?;

    Ok(())
}

/// Drains the endpoint's send queue. The entry at the back stays in place
/// while its write is in flight and is popped only afterwards, so at any
/// instant at most one write chain is in progress per endpoint. A failed
/// write tears the owning connection down and the drain moves on.
pub(crate) async fn start_write(
    queue: &mut VecDeque<SendQueueEntry>,
    conns: &mut HashMap<Uuid, ConnState>,
    ctx: &EndpointContext,
) {
    while let Some(entry) = queue.back() {
        let id = entry.id;
        let Some(state) = conns.get_mut(&id) else {
            // connection already torn down, its queued frames are dropped
            queue.pop_back();
            continue;
        };

        let deadline = Deadline::write(ctx.config.write_timeout_secs);
        let masks = state.role.masks_outbound();
        let result = deadline
            .guard(write_frame(
                &mut state.writer,
                masks,
                entry.message.opcode,
                &entry.message.payload,
            ))
            .await;
        queue.pop_back();

        if let Err(err) = result {
            let code = err.close_code();
            let reason = err.to_string();
            close_connection(conns, id, code, &reason, ctx).await;
        }
    }
}

/// The close-initiation path. Writes the CLOSE frame directly through the
/// connection's write half, bypassing the send queue, then fires
/// `on_disconnect`, cancels the read side and shuts the transport down.
/// Removing the registry entry first makes a second close on the same
/// connection a harmless no-op.
pub(crate) async fn close_connection(
    conns: &mut HashMap<Uuid, ConnState>,
    id: Uuid,
    code: u16,
    reason: &str,
    ctx: &EndpointContext,
) {
    let Some(mut state) = conns.remove(&id) else {
        return;
    };
    state.handle.mark_closed();

    info!(
        "connection {}: sending close, code {} reason '{}'",
        id, code, reason
    );
    let body = close_body(code, reason);
    let deadline = Deadline::write(ctx.config.write_timeout_secs);
    let masks = state.role.masks_outbound();
    if let Err(err) = deadline
        .guard(write_frame(&mut state.writer, masks, OpCode::Close, &body))
        .await
    {
        // the connection is going away regardless
        debug!("connection {}: close frame write ignored: {}", id, err);
    }

    ctx.callbacks.disconnect(Some(state.handle.clone()), code, reason);

    state.reader.abort();
    if let Err(err) = state.writer.shutdown().await {
        debug!("connection {}: transport shutdown ignored: {}", id, err);
    }
}
