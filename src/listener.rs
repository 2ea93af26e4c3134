use crate::callbacks::Callbacks;
use crate::config::{EndpointConfig, TlsServerIdentity};
use crate::connection::{Connection, Deadline, Role};
use crate::error::Error;
use crate::executor::{register_connection, EndpointContext, Executor};
use crate::handshake;
use crate::message::Message;
use crate::stream::MaybeTlsStream;
use log::{debug, error, info, warn};
use pki_types::{CertificateDer, PrivateKeyDer};
use rustls::ServerConfig;
use rustls_pemfile::{certs, private_key};
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, ErrorKind};
use std::net::TcpListener as StdTcpListener;
use std::path::Path;
use std::rc::Rc;
use std::sync::Arc;
use tokio::io::{split, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::{TlsAcceptor, TlsStream};

/// A server endpoint. Bind it, register callbacks, then `start_listening`;
/// from that point every accepted connection is handshaken and served on the
/// endpoint's worker thread.
pub struct Listener {
    socket: StdTcpListener,
    config: EndpointConfig,
    callbacks: Callbacks,
    tls: Option<Arc<ServerConfig>>,
}

impl Listener {
    /// Binds a plain-TCP listener. Port 0 asks the OS for an ephemeral port;
    /// `port()` reports the one actually bound.
    pub fn bind(port: u16) -> io::Result<Listener> {
        let socket = StdTcpListener::bind(("0.0.0.0", port))?;
        socket.set_nonblocking(true)?;
        Ok(Listener {
            socket,
            config: EndpointConfig::default(),
            callbacks: Callbacks::default(),
            tls: None,
        })
    }

    /// Binds a TLS listener. The certificate chain and private key are
    /// loaded from PEM files up front, so configuration errors surface here
    /// rather than at the first accepted connection.
    pub fn bind_tls(port: u16, identity: TlsServerIdentity) -> Result<Listener, Error> {
        let mut listener = Listener::bind(port)?;
        listener.tls = Some(load_server_tls(&identity)?);
        Ok(listener)
    }

    pub fn port(&self) -> io::Result<u16> {
        Ok(self.socket.local_addr()?.port())
    }

    pub fn set_read_timeout(&mut self, seconds: u64) {
        self.config.read_timeout_secs = seconds;
    }

    pub fn read_timeout(&self) -> u64 {
        self.config.read_timeout_secs
    }

    pub fn set_write_timeout(&mut self, seconds: u64) {
        self.config.write_timeout_secs = seconds;
    }

    pub fn write_timeout(&self) -> u64 {
        self.config.write_timeout_secs
    }

    pub fn set_max_payload(&mut self, bytes: usize) {
        self.config.max_payload = bytes;
    }

    pub fn max_payload(&self) -> usize {
        self.config.max_payload
    }

    pub fn on_connect(
        &mut self,
        callback: impl Fn(Connection, &HashMap<String, String>) + Send + 'static,
    ) {
        self.callbacks.on_connect = Some(Box::new(callback));
    }

    pub fn on_message(&mut self, callback: impl Fn(Connection, Message) + Send + 'static) {
        self.callbacks.on_message = Some(Box::new(callback));
    }

    pub fn on_disconnect(
        &mut self,
        callback: impl Fn(Option<Connection>, u16, &str) + Send + 'static,
    ) {
        self.callbacks.on_disconnect = Some(Box::new(callback));
    }

    pub fn on_ping(&mut self, callback: impl Fn(Connection, &[u8]) + Send + 'static) {
        self.callbacks.on_ping = Some(Box::new(callback));
    }

    pub fn on_pong(&mut self, callback: impl Fn(Connection, &[u8]) + Send + 'static) {
        self.callbacks.on_pong = Some(Box::new(callback));
    }

    pub fn on_http_upgrade(&mut self, callback: impl Fn(Connection) + Send + 'static) {
        self.callbacks.on_http_upgrade = Some(Box::new(callback));
    }

    /// Starts the accept loop on the endpoint's worker thread. Dropping the
    /// returned handle tears the whole endpoint down: pending work is
    /// cancelled and the worker thread joined.
    pub fn start_listening(self) -> io::Result<ListenerHandle> {
        let port = self.port()?;
        let socket = self.socket;
        let tls = self.tls;

        let executor = Executor::spawn(
            "wsocket-listener",
            self.config,
            self.callbacks,
            move |ctx| {
                tokio::task::spawn_local(accept_loop(ctx, socket, tls));
            },
        )?;

        Ok(ListenerHandle {
            _executor: executor,
            port,
        })
    }
}

pub struct ListenerHandle {
    _executor: Executor,
    port: u16,
}

impl ListenerHandle {
    pub fn port(&self) -> u16 {
        self.port
    }
}

async fn accept_loop(
    ctx: Rc<EndpointContext>,
    socket: StdTcpListener,
    tls: Option<Arc<ServerConfig>>,
) {
    let listener = match TcpListener::from_std(socket) {
        Ok(listener) => listener,
        Err(err) => {
            error!("listener setup failed: {}", err);
            return;
        }
    };
    let acceptor = tls.map(TlsAcceptor::from);

    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                debug!("accepted tcp connection from {}", peer);
                let ctx = ctx.clone();
                let acceptor = acceptor.clone();
                tokio::task::spawn_local(accept_connection(ctx, stream, acceptor));
            }
            Err(err) => {
                warn!("accept failed: {}", err);
            }
        }
    }
}

/// Per-connection accept path: optional TLS handshake, websocket upgrade,
/// then registration with the read loop running.
async fn accept_connection(
    ctx: Rc<EndpointContext>,
    stream: TcpStream,
    acceptor: Option<TlsAcceptor>,
) {
    let stream = match acceptor {
        Some(acceptor) => match acceptor.accept(stream).await {
            Ok(tls_stream) => MaybeTlsStream::Secure(TlsStream::from(tls_stream)),
            Err(err) => {
                warn!("tls accept failed: {}", err);
                return;
            }
        },
        None => MaybeTlsStream::Plain(stream),
    };
    let peer = match stream.peer_addr() {
        Ok(peer) => peer,
        Err(err) => {
            warn!("peer address unavailable: {}", err);
            return;
        }
    };

    let (read_half, write_half) = split(stream);
    let mut reader = BufReader::new(read_half);
    let mut writer = write_half;

    let read_deadline = Deadline::read(ctx.config.read_timeout_secs);
    let request = match handshake::read_upgrade_request(&mut reader, &read_deadline).await {
        Ok(request) => request,
        Err(err) => {
            // malformed handshake: the peer is dropped silently
            info!("handshake with {} failed: {}", peer, err);
            return;
        }
    };

    let conn = Connection::new(peer, ctx.cmd_tx.clone());
    ctx.callbacks.http_upgrade(conn.clone());

    let accept = handshake::generate_accept_value(&request.key);
    let response = handshake::upgrade_response(&accept);
    let write_deadline = Deadline::write(ctx.config.write_timeout_secs);
    let written = write_deadline
        .guard(async {
            writer.write_all(response.as_bytes()).await?;
            Ok(())
        })
        .await;
    if let Err(err) = written {
        info!("writing 101 response to {} failed: {}", peer, err);
        return;
    }

    info!("connection {} established with {}", conn.id(), peer);
    register_connection(&ctx, conn, Role::Server, reader, writer, &request.headers);
}

fn load_server_tls(identity: &TlsServerIdentity) -> Result<Arc<ServerConfig>, Error> {
    let certs = load_certs(&identity.cert_chain_path)?;
    let key = load_key(&identity.private_key_path)?;
    let config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)?;
    Ok(Arc::new(config))
}

fn load_certs(path: &Path) -> io::Result<Vec<CertificateDer<'static>>> {
    certs(&mut std::io::BufReader::new(File::open(path)?)).collect()
}

fn load_key(path: &Path) -> io::Result<PrivateKeyDer<'static>> {
    private_key(&mut std::io::BufReader::new(File::open(path)?))?.ok_or(io::Error::new(
        ErrorKind::Other,
        "no private key found".to_string(),
    ))
}
