use log::{error, info};
use wsocket::{Listener, OutboundMessage};

fn main() -> std::io::Result<()> {
    env_logger::init();

    let mut listener = Listener::bind(9002)?;
    listener.on_connect(|conn, _headers| {
        info!(
            "client {} connected from {}:{}",
            conn.id(),
            conn.address(),
            conn.port()
        );
    });
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
    listener.on_ping(|conn, payload| {
        info!("ping from {} ({} bytes)", conn.id(), payload.len());
    });

    match listener.start_listening() {
        Ok(handle) => {
            info!("echoing websocket frames on port {}", handle.port());
            loop {
                std::thread::park();
            }
        }
        Err(err) => {
            error!("could not start listening: {}", err);
            Err(err)
        }
    }
}
