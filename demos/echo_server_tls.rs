use log::{error, info};
use wsocket::{Listener, OutboundMessage, TlsServerIdentity};

fn main() -> Result<(), wsocket::Error> {
    env_logger::init();

    let identity = TlsServerIdentity::new("server.crt", "server.key");
    let mut listener = Listener::bind_tls(9003, identity)?;
    listener.on_message(|conn, message| {
        conn.send(OutboundMessage {
            payload: message.payload,
            opcode: message.opcode,
            compress: false,
        });
    });
    listener.on_disconnect(|_, code, reason| {
        info!("client disconnected, code {} reason '{}'", code, reason);
    });

    match listener.start_listening() {
        Ok(handle) => {
            info!("echoing websocket frames over TLS on port {}", handle.port());
            loop {
                std::thread::park();
            }
        }
        Err(err) => {
            error!("could not start listening: {}", err);
            Err(err.into())
        }
    }
}
