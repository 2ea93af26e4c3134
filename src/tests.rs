#[cfg(test)]
mod tests {
    use crate::error::Error;
    use crate::frame::{
        apply_mask, close_code, encode_header, generate_mask_key, FrameHeader, OpCode,
        MAX_HEADER_SIZE,
    };
    use crate::handshake::{generate_accept_value, generate_websocket_key, upgrade_request, upgrade_response};
    use crate::message::{close_body, OutboundMessage};
    use crate::{Client, Listener};
    use std::io::{Read, Write};
    use std::sync::mpsc;
    use std::time::Duration;

    const WAIT: Duration = Duration::from_secs(10);

    #[test]
    fn test_opcode() {
        let res = OpCode::from(0x0).unwrap();
        assert_eq!(res, OpCode::Continue);

        let opcode = OpCode::Text;
        assert_eq!(opcode.as_u8(), 0x1);

        assert!(OpCode::Close.is_control());
        assert!(OpCode::Ping.is_control());
        assert!(!OpCode::Text.is_control());

        assert!(OpCode::from(0x3).is_err());
    }

    #[test]
    fn test_header_length_forms() {
        let mut buf = [0u8; MAX_HEADER_SIZE];

        // 7-bit form, up to 125
        assert_eq!(encode_header(&mut buf, true, OpCode::Text, None, 0), 2);
        assert_eq!(buf[1], 0);
        assert_eq!(encode_header(&mut buf, true, OpCode::Text, None, 125), 2);
        assert_eq!(buf[1], 125);

        // 16-bit form, 126..=65535
        assert_eq!(encode_header(&mut buf, true, OpCode::Text, None, 126), 4);
        assert_eq!(buf[1], 126);
        assert_eq!(u16::from_be_bytes([buf[2], buf[3]]), 126);
        assert_eq!(encode_header(&mut buf, true, OpCode::Text, None, 65535), 4);
        assert_eq!(u16::from_be_bytes([buf[2], buf[3]]), 65535);

        // 64-bit form above that
        assert_eq!(encode_header(&mut buf, true, OpCode::Binary, None, 65536), 10);
        assert_eq!(buf[1], 127);
        let mut be = [0u8; 8];
        be.copy_from_slice(&buf[2..10]);
        assert_eq!(u64::from_be_bytes(be), 65536);

        // the mask key adds four bytes and sets the mask bit
        let used = encode_header(&mut buf, true, OpCode::Text, Some([9, 8, 7, 6]), 5);
        assert_eq!(used, 6);
        assert_eq!(buf[1] & 0x80, 0x80);
        assert_eq!(buf[1] & 0x7F, 5);
        assert_eq!(&buf[2..6], &[9, 8, 7, 6]);
    }

    #[test]
    fn test_header_parse() {
        // FIN + text, masked, length 5
        let header = FrameHeader::parse([0x81, 0x85]).unwrap();
        assert!(header.fin);
        assert!(!header.has_rsv_bits());
        assert_eq!(header.opcode, OpCode::Text);
        assert!(header.masked);
        assert_eq!(header.length_field, 5);
        assert_eq!(header.extended_len_bytes(), 0);

        // unmasked close announcing the 16-bit form
        let header = FrameHeader::parse([0x88, 126]).unwrap();
        assert_eq!(header.opcode, OpCode::Close);
        assert!(!header.masked);
        assert_eq!(header.extended_len_bytes(), 2);

        let header = FrameHeader::parse([0x82, 127]).unwrap();
        assert_eq!(header.extended_len_bytes(), 8);

        // reserved bits survive parsing and are flagged
        let header = FrameHeader::parse([0xC1, 0x00]).unwrap();
        assert!(header.has_rsv_bits());

        assert!(FrameHeader::parse([0x83, 0x00]).is_err());
    }

    #[test]
    fn test_encode_parse_roundtrip() {
        let mut buf = [0u8; MAX_HEADER_SIZE];
        for (len, expected_ext) in [(0usize, 0usize), (125, 0), (126, 2), (65535, 2), (65536, 8)] {
            encode_header(&mut buf, true, OpCode::Binary, None, len);
            let header = FrameHeader::parse([buf[0], buf[1]]).unwrap();
            assert!(header.fin);
            assert_eq!(header.opcode, OpCode::Binary);
            assert_eq!(header.extended_len_bytes(), expected_ext);
            if expected_ext == 0 {
                assert_eq!(header.length_field as usize, len);
            }
        }
    }

    #[test]
    fn test_masking_roundtrip() {
        let key = generate_mask_key();
        let original: Vec<u8> = (0..=255u8).collect();
        let mut masked = original.clone();
        apply_mask(&mut masked, key);
        apply_mask(&mut masked, key);
        assert_eq!(masked, original);
    }

    #[test]
    fn test_accept_value_rfc_vector() {
        // the sample key/accept pair from RFC 6455 section 1.3
        assert_eq!(
            generate_accept_value("dGhlIHNhbXBsZSBub25jZQ=="),
            "s3pPLMBiTxaQ9kYGzzhZRbK+xOo="
        );
    }

    #[test]
    fn test_websocket_key_is_16_random_bytes() {
        let first = generate_websocket_key();
        let second = generate_websocket_key();
        assert_ne!(first, second);
        use base64::prelude::BASE64_STANDARD;
        use base64::Engine;
        assert_eq!(BASE64_STANDARD.decode(first).unwrap().len(), 16);
    }

    #[test]
    fn test_upgrade_request_format() {
        let request = upgrade_request("/chat", "localhost:9002", "dGhlIHNhbXBsZSBub25jZQ==");
        assert!(request.starts_with("GET /chat HTTP/1.1\r\n"));
        assert!(request.contains("Host: localhost:9002\r\n"));
        assert!(request.contains("Connection: Upgrade\r\n"));
        assert!(request.contains("Upgrade: websocket\r\n"));
        assert!(request.contains("Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n"));
        assert!(request.contains("Sec-WebSocket-Version: 13\r\n"));
        assert!(request.ends_with("\r\n\r\n"));
    }

    #[test]
    fn test_upgrade_response_format() {
        let response = upgrade_response("s3pPLMBiTxaQ9kYGzzhZRbK+xOo=");
        assert!(response.starts_with("HTTP/1.1 101 Switching Protocols\r\n"));
        assert!(response.contains("Sec-WebSocket-Accept: s3pPLMBiTxaQ9kYGzzhZRbK+xOo=\r\n"));
        assert!(response.ends_with("\r\n\r\n"));
    }

    #[test]
    fn test_close_body_layout_and_truncation() {
        let body = close_body(1000, "bye");
        assert_eq!(body.len(), 5);
        assert_eq!(u16::from_be_bytes([body[0], body[1]]), 1000);
        assert_eq!(&body[2..], b"bye");

        let body = close_body(1002, &"x".repeat(500));
        assert_eq!(body.len(), 125);

        // truncation never splits a multi-byte character
        let body = close_body(1002, &"é".repeat(200));
        assert!(body.len() <= 125);
        assert!(std::str::from_utf8(&body[2..]).is_ok());
    }

    #[test]
    fn test_error_close_codes() {
        assert_eq!(Error::ReadTimerExpired.close_code(), close_code::GOING_AWAY);
        assert_eq!(Error::WriteTimerExpired.close_code(), close_code::GOING_AWAY);
        assert_eq!(Error::PayloadTooBig(2000).close_code(), close_code::MESSAGE_TOO_BIG);
        assert_eq!(Error::MaskRequirement.close_code(), close_code::PROTOCOL_ERROR);
        assert_eq!(Error::RsvNotZero.close_code(), close_code::PROTOCOL_ERROR);
        assert_eq!(
            Error::ControlFramePayloadSize(126).close_code(),
            close_code::PROTOCOL_ERROR
        );
    }

    #[test]
    fn test_outbound_message_constructors() {
        assert_eq!(OutboundMessage::text("hi").opcode, OpCode::Text);
        assert_eq!(OutboundMessage::binary(vec![1]).opcode, OpCode::Binary);
        assert_eq!(OutboundMessage::ping(vec![]).opcode, OpCode::Ping);
        assert_eq!(OutboundMessage::pong(vec![]).opcode, OpCode::Pong);
        assert!(!OutboundMessage::text("hi").compress);
    }

    // ---- end-to-end scenarios over loopback ----

    fn read_http_headers(sock: &mut std::net::TcpStream) -> Vec<u8> {
        let mut buf = Vec::new();
        let mut byte = [0u8; 1];
        while !buf.ends_with(b"\r\n\r\n") {
            sock.read_exact(&mut byte).unwrap();
            buf.push(byte[0]);
        }
        buf
    }

    #[test]
    fn handshake_round_trip_delivers_text() {
        let mut listener = Listener::bind(0).unwrap();
        let (srv_conn_tx, srv_conn_rx) = mpsc::channel();
        let (msg_tx, msg_rx) = mpsc::channel();
        listener.on_connect(move |conn, headers| {
            assert!(headers.contains_key("sec-websocket-key"));
            assert!(conn.is_loopback());
            srv_conn_tx.send(()).unwrap();
        });
        listener.on_message(move |_, message| {
            msg_tx.send(message).unwrap();
        });
        let server = listener.start_listening().unwrap();

        let mut client = Client::new();
        let (cli_conn_tx, cli_conn_rx) = mpsc::channel();
        client.on_connect(move |conn, headers| {
            assert!(headers.contains_key("sec-websocket-accept"));
            conn.send(OutboundMessage::text("hello"));
            cli_conn_tx.send(()).unwrap();
        });
        let _client = client.connect("127.0.0.1", server.port()).unwrap();

        srv_conn_rx.recv_timeout(WAIT).unwrap();
        cli_conn_rx.recv_timeout(WAIT).unwrap();
        let message = msg_rx.recv_timeout(WAIT).unwrap();
        assert_eq!(message.opcode, OpCode::Text);
        assert_eq!(message.payload, vec![0x68, 0x65, 0x6C, 0x6C, 0x6F]);
    }

    #[test]
    fn large_binary_uses_64_bit_length_form() {
        let mut listener = Listener::bind(0).unwrap();
        let (msg_tx, msg_rx) = mpsc::channel();
        listener.on_message(move |_, message| {
            msg_tx.send(message).unwrap();
        });
        let server = listener.start_listening().unwrap();

        let mut client = Client::new();
        client.on_connect(move |conn, _| {
            conn.send(OutboundMessage::binary(vec![0xAB; 70_000]));
        });
        let _client = client.connect("127.0.0.1", server.port()).unwrap();

        let message = msg_rx.recv_timeout(WAIT).unwrap();
        assert_eq!(message.opcode, OpCode::Binary);
        assert_eq!(message.payload.len(), 70_000);
        assert!(message.payload.iter().all(|byte| *byte == 0xAB));
    }

    #[test]
    fn ping_gets_ponged_and_traffic_continues() {
        let mut listener = Listener::bind(0).unwrap();
        let (ping_tx, ping_rx) = mpsc::channel();
        let (msg_tx, msg_rx) = mpsc::channel();
        listener.on_ping(move |_, payload| {
            ping_tx.send(payload.to_vec()).unwrap();
        });
        listener.on_message(move |_, message| {
            msg_tx.send(message.payload).unwrap();
        });
        let server = listener.start_listening().unwrap();

        let mut client = Client::new();
        let (conn_tx, conn_rx) = mpsc::channel();
        let (pong_tx, pong_rx) = mpsc::channel();
        client.on_connect(move |conn, _| {
            conn_tx.send(conn).unwrap();
        });
        client.on_pong(move |_, payload| {
            pong_tx.send(payload.to_vec()).unwrap();
        });
        let _client = client.connect("127.0.0.1", server.port()).unwrap();

        let conn = conn_rx.recv_timeout(WAIT).unwrap();
        conn.send(OutboundMessage::text("first"));
        assert_eq!(msg_rx.recv_timeout(WAIT).unwrap(), b"first".to_vec());

        conn.send(OutboundMessage::ping(vec![0x01, 0x02, 0x03]));
        assert_eq!(ping_rx.recv_timeout(WAIT).unwrap(), vec![0x01, 0x02, 0x03]);
        assert_eq!(pong_rx.recv_timeout(WAIT).unwrap(), vec![0x01, 0x02, 0x03]);

        conn.send(OutboundMessage::text("second"));
        assert_eq!(msg_rx.recv_timeout(WAIT).unwrap(), b"second".to_vec());
    }

    #[test]
    fn oversize_payload_closes_with_1009() {
        let mut listener = Listener::bind(0).unwrap();
        listener.set_max_payload(1024);
        let (srv_disc_tx, srv_disc_rx) = mpsc::channel();
        listener.on_disconnect(move |_, code, _| {
            srv_disc_tx.send(code).unwrap();
        });
        let server = listener.start_listening().unwrap();

        let mut client = Client::new();
        let (cli_disc_tx, cli_disc_rx) = mpsc::channel();
        client.on_connect(move |conn, _| {
            conn.send(OutboundMessage::binary(vec![0x55; 2000]));
        });
        client.on_disconnect(move |_, code, _| {
            cli_disc_tx.send(code).unwrap();
        });
        let _client = client.connect("127.0.0.1", server.port()).unwrap();

        assert_eq!(
            srv_disc_rx.recv_timeout(WAIT).unwrap(),
            close_code::MESSAGE_TOO_BIG
        );
        assert_eq!(
            cli_disc_rx.recv_timeout(WAIT).unwrap(),
            close_code::MESSAGE_TOO_BIG
        );
    }

    #[test]
    fn read_deadline_closes_idle_connection() {
        let mut listener = Listener::bind(0).unwrap();
        listener.set_read_timeout(1);
        let (srv_disc_tx, srv_disc_rx) = mpsc::channel();
        listener.on_disconnect(move |_, code, _| {
            srv_disc_tx.send(code).unwrap();
        });
        let server = listener.start_listening().unwrap();

        let mut client = Client::new();
        client.set_read_timeout(1);
        let (cli_disc_tx, cli_disc_rx) = mpsc::channel();
        client.on_disconnect(move |_, code, _| {
            cli_disc_tx.send(code).unwrap();
        });
        let _client = client.connect("127.0.0.1", server.port()).unwrap();

        assert_eq!(
            srv_disc_rx.recv_timeout(WAIT).unwrap(),
            close_code::GOING_AWAY
        );
        assert_eq!(
            cli_disc_rx.recv_timeout(WAIT).unwrap(),
            close_code::GOING_AWAY
        );
    }

    #[test]
    fn close_code_propagates_to_peer() {
        let mut listener = Listener::bind(0).unwrap();
        listener.on_connect(move |conn, _| {
            conn.close(4001, "bye");
        });
        let server = listener.start_listening().unwrap();

        let mut client = Client::new();
        let (disc_tx, disc_rx) = mpsc::channel();
        client.on_disconnect(move |conn, code, reason| {
            assert!(conn.is_some());
            disc_tx.send((code, reason.to_owned())).unwrap();
        });
        let _client = client.connect("127.0.0.1", server.port()).unwrap();

        let (code, reason) = disc_rx.recv_timeout(WAIT).unwrap();
        assert_eq!(code, 4001);
        assert_eq!(reason, "bye");
    }

    #[test]
    fn close_is_idempotent() {
        let mut listener = Listener::bind(0).unwrap();
        let (conn_tx, conn_rx) = mpsc::channel();
        let (disc_tx, disc_rx) = mpsc::channel();
        listener.on_connect(move |conn, _| {
            conn_tx.send(conn).unwrap();
        });
        listener.on_disconnect(move |_, code, _| {
            disc_tx.send(code).unwrap();
        });
        let server = listener.start_listening().unwrap();

        let client = Client::new();
        let _client = client.connect("127.0.0.1", server.port()).unwrap();

        let conn = conn_rx.recv_timeout(WAIT).unwrap();
        assert!(conn.is_open());
        conn.close(close_code::NORMAL, "bye");
        conn.close(close_code::NORMAL, "bye");

        assert_eq!(disc_rx.recv_timeout(WAIT).unwrap(), close_code::NORMAL);
        std::thread::sleep(Duration::from_millis(300));
        assert!(disc_rx.try_recv().is_err());
        assert!(!conn.is_open());
    }

    #[test]
    fn server_rejects_unmasked_frames() {
        let mut listener = Listener::bind(0).unwrap();
        let (disc_tx, disc_rx) = mpsc::channel();
        let (msg_tx, msg_rx) = mpsc::channel();
        listener.on_disconnect(move |_, code, _| {
            disc_tx.send(code).unwrap();
        });
        listener.on_message(move |_, message| {
            msg_tx.send(message).unwrap();
        });
        let server = listener.start_listening().unwrap();

        let mut sock = std::net::TcpStream::connect(("127.0.0.1", server.port())).unwrap();
        sock.set_read_timeout(Some(WAIT)).unwrap();
        sock.write_all(
            upgrade_request("/", "127.0.0.1", "dGhlIHNhbXBsZSBub25jZQ==").as_bytes(),
        )
        .unwrap();
        let _response = read_http_headers(&mut sock);

        // unmasked TEXT "hello" from a client violates the mask requirement
        sock.write_all(&[0x81, 0x05, b'h', b'e', b'l', b'l', b'o']).unwrap();

        assert_eq!(
            disc_rx.recv_timeout(WAIT).unwrap(),
            close_code::PROTOCOL_ERROR
        );

        // the wire shows a CLOSE frame carrying 1002, and the payload was
        // never delivered
        let mut head = [0u8; 2];
        sock.read_exact(&mut head).unwrap();
        assert_eq!(head[0], 0x88);
        let len = (head[1] & 0x7F) as usize;
        let mut body = vec![0u8; len];
        sock.read_exact(&mut body).unwrap();
        assert_eq!(
            u16::from_be_bytes([body[0], body[1]]),
            close_code::PROTOCOL_ERROR
        );
        assert!(msg_rx.try_recv().is_err());
    }

    #[test]
    fn server_rejects_oversize_control_frames() {
        let mut listener = Listener::bind(0).unwrap();
        let (disc_tx, disc_rx) = mpsc::channel();
        listener.on_disconnect(move |_, code, _| {
            disc_tx.send(code).unwrap();
        });
        let server = listener.start_listening().unwrap();

        let mut sock = std::net::TcpStream::connect(("127.0.0.1", server.port())).unwrap();
        sock.set_read_timeout(Some(WAIT)).unwrap();
        sock.write_all(
            upgrade_request("/", "127.0.0.1", "dGhlIHNhbXBsZSBub25jZQ==").as_bytes(),
        )
        .unwrap();
        let _response = read_http_headers(&mut sock);

        // masked PING announcing a 126-byte body via the 16-bit length form
        let mut ping = vec![0x89, 0x80 | 126, 0x00, 0x7E, 0, 0, 0, 0];
        ping.extend_from_slice(&[0u8; 126]);
        sock.write_all(&ping).unwrap();

        assert_eq!(
            disc_rx.recv_timeout(WAIT).unwrap(),
            close_code::PROTOCOL_ERROR
        );
    }

    #[test]
    fn client_masks_outbound_and_rejects_masked_inbound() {
        let raw_server = std::net::TcpListener::bind(("127.0.0.1", 0)).unwrap();
        let port = raw_server.local_addr().unwrap().port();

        let mut client = Client::new();
        let (disc_tx, disc_rx) = mpsc::channel();
        client.on_connect(move |conn, _| {
            conn.send(OutboundMessage::text("abc"));
        });
        client.on_disconnect(move |_, code, _| {
            disc_tx.send(code).unwrap();
        });
        let _client = client.connect("127.0.0.1", port).unwrap();

        let (mut sock, _) = raw_server.accept().unwrap();
        sock.set_read_timeout(Some(WAIT)).unwrap();
        let request = read_http_headers(&mut sock);
        let request_text = String::from_utf8_lossy(&request).into_owned();
        let key = request_text
            .lines()
            .find_map(|line| line.strip_prefix("Sec-WebSocket-Key: "))
            .unwrap()
            .trim()
            .to_owned();
        sock.write_all(upgrade_response(&generate_accept_value(&key)).as_bytes())
            .unwrap();

        // every client frame must carry the mask bit and a 4-byte key
        let mut head = [0u8; 2];
        sock.read_exact(&mut head).unwrap();
        assert_eq!(head[0], 0x81);
        assert_eq!(head[1] & 0x80, 0x80);
        let len = (head[1] & 0x7F) as usize;
        assert_eq!(len, 3);
        let mut mask_key = [0u8; 4];
        sock.read_exact(&mut mask_key).unwrap();
        let mut payload = vec![0u8; len];
        sock.read_exact(&mut payload).unwrap();
        apply_mask(&mut payload, mask_key);
        assert_eq!(payload, b"abc");

        // a masked frame from the server violates the mask rule for clients
        sock.write_all(&[0x81, 0x83, 1, 2, 3, 4, b'x' ^ 1, b'y' ^ 2, b'z' ^ 3])
            .unwrap();
        assert_eq!(
            disc_rx.recv_timeout(WAIT).unwrap(),
            close_code::PROTOCOL_ERROR
        );
    }

    #[test]
    fn server_rejects_reserved_bits() {
        let mut listener = Listener::bind(0).unwrap();
        let (disc_tx, disc_rx) = mpsc::channel();
        listener.on_disconnect(move |_, code, _| {
            disc_tx.send(code).unwrap();
        });
        let server = listener.start_listening().unwrap();

        let mut sock = std::net::TcpStream::connect(("127.0.0.1", server.port())).unwrap();
        sock.set_read_timeout(Some(WAIT)).unwrap();
        sock.write_all(
            upgrade_request("/", "127.0.0.1", "dGhlIHNhbXBsZSBub25jZQ==").as_bytes(),
        )
        .unwrap();
        let _response = read_http_headers(&mut sock);

        // masked TEXT with RSV1 set and no negotiated extension
        sock.write_all(&[0xC1, 0x80, 0, 0, 0, 0]).unwrap();

        assert_eq!(
            disc_rx.recv_timeout(WAIT).unwrap(),
            close_code::PROTOCOL_ERROR
        );
    }
}
