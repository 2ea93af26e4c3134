use crate::connection::Deadline;
use crate::error::Error;
use base64::prelude::BASE64_STANDARD;
use base64::Engine;
use bytes::BytesMut;
use rand::random;
use sha1::{Digest, Sha1};
use std::collections::HashMap;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

pub(crate) const WS_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

// Upper bound on handshake size, so a peer cannot feed us headers forever.
const MAX_HANDSHAKE_BYTES: usize = 16 * 1024;

/// base64(SHA1(key || GUID)), the value the server must echo in
/// Sec-WebSocket-Accept.
pub(crate) fn generate_accept_value(key: &str) -> String {
    let mut sha1 = Sha1::new();
    sha1.update(key.as_bytes());
    sha1.update(WS_GUID.as_bytes());
    BASE64_STANDARD.encode(sha1.finalize())
}

/// Random 16-byte nonce, base64 encoded, for Sec-WebSocket-Key.
pub(crate) fn generate_websocket_key() -> String {
    let random_bytes: [u8; 16] = random();
    BASE64_STANDARD.encode(random_bytes)
}

pub(crate) fn upgrade_request(path: &str, host: &str, key: &str) -> String {
    format!(
        "GET {} HTTP/1.1\r\nHost: {}\r\nConnection: Upgrade\r\nUpgrade: websocket\r\nSec-WebSocket-Key: {}\r\nSec-WebSocket-Version: 13\r\n\r\n",
        path, host, key
    )
}

pub(crate) fn upgrade_response(accept: &str) -> String {
    format!(
        "HTTP/1.1 101 Switching Protocols\r\nConnection: Upgrade\r\nUpgrade: websocket\r\nSec-WebSocket-Accept: {}\r\n\r\n",
        accept
    )
}

/// Reads header lines up to and including the blank line that terminates
/// them, bounded in both size and time.
///
/// Reading line by line matters: anything the peer pipelines after the
/// handshake stays inside the BufReader, which lives on as the connection's
/// frame reader.
async fn read_until_headers_end<R>(reader: &mut R, deadline: &Deadline) -> Result<BytesMut, Error>
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = BytesMut::with_capacity(1024);
    let mut line = Vec::with_capacity(256);
    loop {
        line.clear();
        let read = deadline
            .guard(async { Ok(reader.read_until(b'\n', &mut line).await?) })
            .await?;
        if read == 0 {
            return Err(Error::IncompleteHttpMessage);
        }
        buf.extend_from_slice(&line);
        if line == b"\r\n" {
            return Ok(buf);
        }
        if buf.len() >= MAX_HANDSHAKE_BYTES {
            return Err(Error::IncompleteHttpMessage);
        }
    }
}

fn collect_headers(headers: &[httparse::Header<'_>]) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for header in headers {
        map.insert(
            header.name.to_ascii_lowercase(),
            String::from_utf8_lossy(header.value).trim().to_string(),
        );
    }
    map
}

pub(crate) struct UpgradeRequest {
    pub headers: HashMap<String, String>,
    pub key: String,
}

/// Server side: parses the GET Upgrade request and extracts the websocket
/// key. Header names are lowercased in the returned map.
pub(crate) async fn read_upgrade_request<R>(
    reader: &mut R,
    deadline: &Deadline,
) -> Result<UpgradeRequest, Error>
where
    R: AsyncBufRead + Unpin,
{
    let buf = read_until_headers_end(reader, deadline).await?;

    let mut header_storage = [httparse::EMPTY_HEADER; 64];
    let mut request = httparse::Request::new(&mut header_storage);
    if request.parse(&buf)?.is_partial() {
        return Err(Error::IncompleteHttpMessage);
    }
    if request.method != Some("GET") || request.version != Some(1) {
        return Err(Error::InvalidHttpHandshake);
    }

    let headers = collect_headers(request.headers);
    let connection_upgrades = headers
        .get("connection")
        .map(|value| value.to_ascii_lowercase().contains("upgrade"))
        .unwrap_or(false);
    if !connection_upgrades {
        return Err(Error::NoConnectionHeaderPresent);
    }
    let upgrades_websocket = headers
        .get("upgrade")
        .map(|value| value.eq_ignore_ascii_case("websocket"))
        .unwrap_or(false);
    if !upgrades_websocket {
        return Err(Error::NoUpgradeHeaderPresent);
    }

    let key = headers
        .get("sec-websocket-key")
        .cloned()
        .ok_or(Error::NoSecWebsocketKey)?;

    Ok(UpgradeRequest { headers, key })
}

/// Client side: parses the 101 response and checks Sec-WebSocket-Accept
/// byte-for-byte against the value computed from the key we sent.
pub(crate) async fn read_upgrade_response<R>(
    reader: &mut R,
    deadline: &Deadline,
    expected_accept: &str,
) -> Result<HashMap<String, String>, Error>
where
    R: AsyncBufRead + Unpin,
{
    let buf = read_until_headers_end(reader, deadline).await?;

    let mut header_storage = [httparse::EMPTY_HEADER; 64];
    let mut response = httparse::Response::new(&mut header_storage);
    if response.parse(&buf)?.is_partial() {
        return Err(Error::IncompleteHttpMessage);
    }
    if response.code != Some(101) {
        return Err(Error::NoUpgrade);
    }

    let headers = collect_headers(response.headers);
    match headers.get("sec-websocket-accept") {
        Some(accept) if accept == expected_accept => Ok(headers),
        _ => Err(Error::InvalidAcceptKey),
    }
}
