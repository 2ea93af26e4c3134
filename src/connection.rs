use crate::error::Error;
use crate::executor::Command;
use crate::message::OutboundMessage;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tokio::time::{timeout, Duration};
use uuid::Uuid;

/// Which side of the handshake this connection is. Clients mask every
/// outbound frame and reject masked inbound frames; servers do the opposite.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Role {
    Client,
    Server,
}

impl Role {
    pub(crate) fn masks_outbound(&self) -> bool {
        matches!(self, Role::Client)
    }

    /// A server requires masked inbound frames, a client unmasked ones.
    pub(crate) fn accepts_inbound_mask_bit(&self, masked: bool) -> bool {
        match self {
            Role::Client => !masked,
            Role::Server => masked,
        }
    }
}

// Connection ids are random UUIDs rather than incrementing counters.
pub(crate) fn generate_new_uuid() -> Uuid {
    let mut rng = StdRng::from_rng(&mut rand::rng());
    let buf = rng.random::<[u8; 16]>();

    Uuid::new_v8(buf)
}

/// Handle to a live session, handed to every callback.
///
/// Cloning is cheap and the handle may outlive the session: `send` and
/// `close` on a torn-down connection are harmless no-ops. Both operations
/// post to the endpoint's worker thread, so they can be called from anywhere.
#[derive(Clone)]
pub struct Connection {
    id: Uuid,
    peer: SocketAddr,
    open: Arc<AtomicBool>,
    cmd_tx: UnboundedSender<Command>,
}

impl Connection {
    pub(crate) fn new(peer: SocketAddr, cmd_tx: UnboundedSender<Command>) -> Self {
        Connection {
            id: generate_new_uuid(),
            peer,
            open: Arc::new(AtomicBool::new(true)),
            cmd_tx,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Relaxed)
    }

    pub fn address(&self) -> String {
        self.peer.ip().to_string()
    }

    pub fn port(&self) -> u16 {
        self.peer.port()
    }

    pub fn is_v4(&self) -> bool {
        self.peer.is_ipv4()
    }

    pub fn is_v6(&self) -> bool {
        self.peer.is_ipv6()
    }

    pub fn is_loopback(&self) -> bool {
        self.peer.ip().is_loopback()
    }

    /// Queues a message for delivery. Failures never surface here; anything
    /// fatal ends up in `on_disconnect`.
    pub fn send(&self, message: OutboundMessage) {
        let _ = self.cmd_tx.send(Command::Send {
            id: self.id,
            message,
        });
    }

    /// Initiates the close protocol: a CLOSE frame with the given status
    /// code and reason, then `on_disconnect` and transport shutdown.
    /// Closing an already-closing connection is harmless.
    pub fn close(&self, code: u16, reason: &str) {
        let _ = self.cmd_tx.send(Command::Close {
            id: self.id,
            code,
            reason: reason.to_owned(),
        });
    }

    pub(crate) fn mark_closed(&self) {
        self.open.store(false, Ordering::Relaxed);
    }
}

/// One direction's expiry timer. Arming wraps the pending I/O future; an
/// elapsed timer surfaces as the direction's timeout error, which tears the
/// connection down with close code 1001. Zero seconds disables the timer.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Deadline {
    secs: u64,
    expired: fn() -> Error,
}

impl Deadline {
    pub(crate) fn read(secs: u64) -> Self {
        Deadline {
            secs,
            expired: || Error::ReadTimerExpired,
        }
    }

    pub(crate) fn write(secs: u64) -> Self {
        Deadline {
            secs,
            expired: || Error::WriteTimerExpired,
        }
    }

    pub(crate) async fn guard<T, F>(&self, fut: F) -> Result<T, Error>
    where
        F: Future<Output = Result<T, Error>>,
    {
        if self.secs == 0 {
            return fut.await;
        }
        match timeout(Duration::from_secs(self.secs), fut).await {
            Ok(result) => result,
            Err(_elapsed) => Err((self.expired)()),
        }
    }
}
