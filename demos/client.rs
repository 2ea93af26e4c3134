use log::{error, info};
use std::sync::mpsc;
use wsocket::{close_code, Client, OutboundMessage};

fn main() -> std::io::Result<()> {
    env_logger::init();

    let mut client = Client::new();
    client.on_connect(|conn, _headers| {
        info!("connected to {}:{}", conn.address(), conn.port());
        conn.send(OutboundMessage::text("hello over websocket"));
    });
    client.on_message(|conn, message| {
        match message.as_text() {
            Ok(text) => info!("echo: {}", text),
            Err(_) => info!("echo: {} binary bytes", message.payload.len()),
        }
        conn.close(close_code::NORMAL, "done");
    });

    let (done_tx, done_rx) = mpsc::channel();
    client.on_disconnect(move |_, code, reason| {
        info!("disconnected, code {} reason '{}'", code, reason);
        let _ = done_tx.send(());
    });

    let _handle = client.connect("127.0.0.1", 9002)?;

    if done_rx.recv().is_err() {
        error!("client endpoint went away without disconnecting");
    }
    Ok(())
}
