use crate::connection::Connection;
use crate::message::Message;
use std::collections::HashMap;

pub(crate) type ConnectFn = Box<dyn Fn(Connection, &HashMap<String, String>) + Send>;
pub(crate) type MessageFn = Box<dyn Fn(Connection, Message) + Send>;
pub(crate) type DisconnectFn = Box<dyn Fn(Option<Connection>, u16, &str) + Send>;
pub(crate) type PayloadFn = Box<dyn Fn(Connection, &[u8]) + Send>;
pub(crate) type UpgradeFn = Box<dyn Fn(Connection) + Send>;

/// The user-registered handlers of an endpoint.
///
/// Registration happens before the endpoint starts; afterwards the set moves
/// onto the worker thread and every invocation happens there.
/// `on_disconnect` receives `None` when the failure precedes an established
/// connection (connect, TLS or handshake errors on the client side).
#[derive(Default)]
pub(crate) struct Callbacks {
    pub on_connect: Option<ConnectFn>,
    pub on_message: Option<MessageFn>,
    pub on_disconnect: Option<DisconnectFn>,
    pub on_ping: Option<PayloadFn>,
    pub on_pong: Option<PayloadFn>,
    pub on_http_upgrade: Option<UpgradeFn>,
}

impl Callbacks {
    pub fn connect(&self, conn: Connection, headers: &HashMap<String, String>) {
        if let Some(callback) = &self.on_connect {
            callback(conn, headers);
        }
    }

    pub fn message(&self, conn: Connection, message: Message) {
        if let Some(callback) = &self.on_message {
            callback(conn, message);
        }
    }

    pub fn disconnect(&self, conn: Option<Connection>, code: u16, reason: &str) {
        if let Some(callback) = &self.on_disconnect {
            callback(conn, code, reason);
        }
    }

    pub fn ping(&self, conn: Connection, payload: &[u8]) {
        if let Some(callback) = &self.on_ping {
            callback(conn, payload);
        }
    }

    pub fn pong(&self, conn: Connection, payload: &[u8]) {
        if let Some(callback) = &self.on_pong {
            callback(conn, payload);
        }
    }

    pub fn http_upgrade(&self, conn: Connection) {
        if let Some(callback) = &self.on_http_upgrade {
            callback(conn);
        }
    }
}
