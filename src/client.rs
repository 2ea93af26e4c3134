use crate::callbacks::Callbacks;
use crate::config::EndpointConfig;
use crate::connection::{Connection, Deadline, Role};
use crate::error::Error;
use crate::executor::{register_connection, EndpointContext, Executor};
use crate::handshake;
use crate::message::Message;
use crate::stream::MaybeTlsStream;
use log::{debug, error, info};
use pki_types::ServerName;
use rustls::{ClientConfig, RootCertStore};
use rustls_pemfile::certs;
use std::collections::HashMap;
use std::fs::File;
use std::io;
use std::path::Path;
use std::rc::Rc;
use std::sync::Arc;
use tokio::io::{split, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio_rustls::{TlsConnector, TlsStream};
use url::Url;

/// A client endpoint. Construct it, register callbacks, then `connect`;
/// resolution, the TCP/TLS connect and the opening handshake all run on the
/// endpoint's worker thread and report failures through `on_disconnect`.
pub struct Client {
    config: EndpointConfig,
    callbacks: Callbacks,
    tls: Option<Arc<ClientConfig>>,
}

impl Client {
    /// A plain-TCP client.
    pub fn new() -> Client {
        Client {
            config: EndpointConfig::default(),
            callbacks: Callbacks::default(),
            tls: None,
        }
    }

    /// A TLS client. The CA certificates from the given PEM file are added
    /// on top of the webpki default verify roots.
    pub fn with_ca(ca_cert_path: impl AsRef<Path>) -> Result<Client, Error> {
        let mut roots = RootCertStore {
            roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
        };
        for cert in certs(&mut std::io::BufReader::new(File::open(ca_cert_path)?)) {
            roots.add(cert?)?;
        }
        let config = ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth();

        Ok(Client {
            config: EndpointConfig::default(),
            callbacks: Callbacks::default(),
            tls: Some(Arc::new(config)),
        })
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

    /// Connects to host:port, TLS when a context is configured, plain TCP
    /// otherwise. The request path of the upgrade is "/".
    pub fn connect(self, host: impl Into<String>, port: u16) -> io::Result<ClientHandle> {
        self.connect_with_path(host.into(), port, String::from("/"))
    }

    /// ws:// or wss:// URL form of `connect`. The scheme selects the
    /// transport: wss with no configured TLS context falls back to the
    /// webpki default verify roots.
    pub fn connect_url(mut self, url: &str) -> Result<ClientHandle, Error> {
        let parsed = Url::parse(url)?;
        let use_tls = match parsed.scheme() {
            "ws" if self.tls.is_some() => {
                return Err(Error::SchemeAgainstTlsConfig(parsed.scheme().to_owned()))
            }
            "ws" => false,
            "wss" => true,
            _ => return Err(Error::InvalidSchemeUrl),
        };

        let host = parsed.host_str().ok_or(Error::UrlNoHost)?.to_owned();
        let port = parsed.port().unwrap_or(if use_tls { 443 } else { 80 });
        let path = match parsed.query() {
            Some(query) => format!("{}?{}", parsed.path(), query),
            None => parsed.path().to_owned(),
        };

        if use_tls && self.tls.is_none() {
            self.tls = Some(default_tls_config());
        }

        Ok(self.connect_with_path(host, port, path)?)
    }

    fn connect_with_path(self, host: String, port: u16, path: String) -> io::Result<ClientHandle> {
        let tls = self.tls;
        let executor = Executor::spawn("wsocket-client", self.config, self.callbacks, move |ctx| {
            tokio::task::spawn_local(run_connect(ctx, host, port, path, tls));
        })?;
        Ok(ClientHandle {
            _executor: executor,
        })
    }
}

impl Default for Client {
    fn default() -> Self {
        Client::new()
    }
}

/// Keeps the endpoint's worker thread alive. Dropping it cancels pending
/// work and joins the thread.
pub struct ClientHandle {
    _executor: Executor,
}

fn default_tls_config() -> Arc<ClientConfig> {
    let roots = RootCertStore {
        roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
    };
    Arc::new(
        ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth(),
    )
}

/// Worker-side connect path: resolve + TCP connect, optional TLS handshake,
/// websocket upgrade, then registration. Failures before the connection is
/// established surface as `on_disconnect(None, 0, reason)`.
async fn run_connect(
    ctx: Rc<EndpointContext>,
    host: String,
    port: u16,
    path: String,
    tls: Option<Arc<ClientConfig>>,
) {
    let addr = format!("{}:{}", host, port);
    let stream = match TcpStream::connect(&addr).await {
        Ok(stream) => stream,
        Err(err) => {
            fail_connect(&ctx, format!("failed async_connect: {}", err));
            return;
        }
    };
    let peer = match stream.peer_addr() {
        Ok(peer) => peer,
        Err(err) => {
            fail_connect(&ctx, format!("peer address unavailable: {}", err));
            return;
        }
    };

    let stream = match tls {
        Some(config) => {
            let server_name = match ServerName::try_from(host.clone()) {
                Ok(name) => name,
                Err(err) => {
                    fail_connect(&ctx, format!("invalid server name: {}", err));
                    return;
                }
            };
            debug!("verifying certificate chain for {}", host);
            let connector = TlsConnector::from(config);
            match connector.connect(server_name, stream).await {
                Ok(tls_stream) => MaybeTlsStream::Secure(TlsStream::from(tls_stream)),
                Err(err) => {
                    fail_connect(&ctx, format!("failed tls handshake: {}", err));
                    return;
                }
            }
        }
        None => MaybeTlsStream::Plain(stream),
    };

    let (read_half, write_half) = split(stream);
    let mut reader = BufReader::new(read_half);
    let mut writer = write_half;

    let key = handshake::generate_websocket_key();
    let host_header = format!("{}:{}", host, port);
    let request = handshake::upgrade_request(&path, &host_header, &key);

    let write_deadline = Deadline::write(ctx.config.write_timeout_secs);
    let written = write_deadline
        .guard(async {
            writer.write_all(request.as_bytes()).await?;
            Ok(())
        })
        .await;
    if let Err(err) = written {
        fail_connect(&ctx, format!("failed sending handshake: {}", err));
        return;
    }

    let expected = handshake::generate_accept_value(&key);
    let read_deadline = Deadline::read(ctx.config.read_timeout_secs);
    let headers = match handshake::read_upgrade_response(&mut reader, &read_deadline, &expected).await
    {
        Ok(headers) => headers,
        Err(err) => {
            fail_connect(&ctx, format!("websocket handshake failed: {}", err));
            return;
        }
    };

    let conn = Connection::new(peer, ctx.cmd_tx.clone());
    info!("connection {} established with {}", conn.id(), addr);
    ctx.callbacks.http_upgrade(conn.clone());
    register_connection(&ctx, conn, Role::Client, reader, writer, &headers);
}

fn fail_connect(ctx: &EndpointContext, reason: String) {
    error!("{}", reason);
    ctx.callbacks.disconnect(None, 0, &reason);
}
