use crate::callbacks::Callbacks;
use crate::config::EndpointConfig;
use crate::connection::{Connection, Role};
use crate::message::OutboundMessage;
use crate::read::ReadStream;
use crate::stream::MaybeTlsStream;
use crate::write::{self, SendQueueEntry};
use log::debug;
use std::collections::{HashMap, VecDeque};
use std::io;
use std::rc::Rc;
use std::thread;
use tokio::io::{BufReader, ReadHalf, WriteHalf};
use tokio::runtime;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::{JoinHandle, LocalSet};
use uuid::Uuid;

/// Work posted to the endpoint's worker thread. `send` and `close` from any
/// thread become commands; the worker processes them in posting order.
pub(crate) enum Command {
    Register(Box<ConnState>),
    Send { id: Uuid, message: OutboundMessage },
    Close { id: Uuid, code: u16, reason: String },
    Shutdown,
}

/// Executor-side state of one connection: the write half of its transport
/// and the handle of the task driving its read half.
pub(crate) struct ConnState {
    pub handle: Connection,
    pub role: Role,
    pub writer: WriteHalf<MaybeTlsStream>,
    pub reader: JoinHandle<()>,
}

/// Everything the worker-side tasks share: configuration, the user
/// callbacks and a sender to post further commands.
pub(crate) struct EndpointContext {
    pub config: EndpointConfig,
    pub callbacks: Callbacks,
    pub cmd_tx: UnboundedSender<Command>,
}

/// The per-endpoint worker: one OS thread running a current-thread runtime
/// inside a LocalSet. Every completion, timer expiry and user callback
/// executes on this thread, so the send queue and the connection registry
/// need no locking.
pub(crate) struct Executor {
    cmd_tx: UnboundedSender<Command>,
    worker: Option<thread::JoinHandle<()>>,
}

impl Executor {
    /// Builds the runtime, then hands `setup` the shared context from inside
    /// the LocalSet so it can spawn the accept loop or the connect task.
    pub fn spawn<F>(
        name: &str,
        config: EndpointConfig,
        callbacks: Callbacks,
        setup: F,
    ) -> io::Result<Executor>
    where
        F: FnOnce(Rc<EndpointContext>) + Send + 'static,
    {
        let rt = runtime::Builder::new_current_thread().enable_all().build()?;
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let worker_tx = cmd_tx.clone();

        let worker = thread::Builder::new()
            .name(name.to_owned())
            .spawn(move || {
                let local = LocalSet::new();
                local.block_on(&rt, async move {
                    let ctx = Rc::new(EndpointContext {
                        config,
                        callbacks,
                        cmd_tx: worker_tx,
                    });
                    setup(ctx.clone());
                    drive(cmd_rx, ctx).await;
                });
            })?;

        Ok(Executor {
            cmd_tx,
            worker: Some(worker),
        })
    }
}

impl Drop for Executor {
    fn drop(&mut self) {
        let _ = self.cmd_tx.send(Command::Shutdown);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

/// Spawns the read task for a freshly handshaken connection and enters it
/// into the registry. Registration is posted before `on_connect` runs, so a
/// `close` issued from inside the callback finds the connection.
pub(crate) fn register_connection(
    ctx: &Rc<EndpointContext>,
    conn: Connection,
    role: Role,
    reader: BufReader<ReadHalf<MaybeTlsStream>>,
    writer: WriteHalf<MaybeTlsStream>,
    headers: &HashMap<String, String>,
) {
    let read_stream = ReadStream::new(reader, conn.clone(), role, ctx.clone());
    let reader_task = tokio::task::spawn_local(read_stream.poll_frames());

    let state = ConnState {
        handle: conn.clone(),
        role,
        writer,
        reader: reader_task,
    };
    let _ = ctx.cmd_tx.send(Command::Register(Box::new(state)));

    ctx.callbacks.connect(conn, headers);
}

/// The command loop owning the connection registry and the send queue.
/// Entries are pushed to the front and consumed from the back, which gives
/// FIFO delivery per connection.
async fn drive(mut cmd_rx: UnboundedReceiver<Command>, ctx: Rc<EndpointContext>) {
    let mut conns: HashMap<Uuid, ConnState> = HashMap::new();
    let mut queue: VecDeque<SendQueueEntry> = VecDeque::new();

    while let Some(command) = cmd_rx.recv().await {
        match command {
            Command::Register(state) => {
                conns.insert(state.handle.id(), *state);
            }
            Command::Send { id, message } => {
                queue.push_front(SendQueueEntry { id, message });
                if queue.len() == 1 {
                    write::start_write(&mut queue, &mut conns, &ctx).await;
                }
            }
            Command::Close { id, code, reason } => {
                write::close_connection(&mut conns, id, code, &reason, &ctx).await;
            }
            Command::Shutdown => break,
        }
    }

    debug!("endpoint worker stopping, dropping {} connections", conns.len());
    for (_, state) in conns.drain() {
        state.reader.abort();
    }
}
