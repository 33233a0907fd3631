use std::fs;
use std::net::SocketAddr;
use std::sync::Arc;

use dtnweb::config::{Config, DomainConfig};
use dtnweb::event::{ChannelHandler, Inbound};
use dtnweb::server::Webserver;
use dtnweb::server::connection::{Connection, ConnectionError, Flow, Kind, Output};
use dtnweb::websocket::frame::{Opcode, encode_frame};
use tempfile::TempDir;
use tokio::sync::mpsc::UnboundedReceiver;

const DOMAIN: &str = "example.com";
const UPGRADE: &[u8] = b"GET /ws HTTP/1.1\r\nHost: example.com\r\nUpgrade: websocket\r\nConnection: Upgrade\r\nSec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\nSec-WebSocket-Version: 13\r\n\r\n";
const MASK: [u8; 4] = [0x37, 0xfa, 0x21, 0x3d];

struct Site {
    _root: TempDir,
    server: Webserver,
    events: UnboundedReceiver<Inbound>,
}

fn site() -> Site {
    let root = tempfile::tempdir().unwrap();
    fs::write(root.path().join("hello.txt"), b"0123456789").unwrap();
    fs::create_dir(root.path().join("docs")).unwrap();
    fs::write(root.path().join("docs").join("index.html"), b"<h1>docs</h1>").unwrap();

    let config = Config {
        default_domain: DOMAIN.to_string(),
        domains: vec![DomainConfig {
            name: DOMAIN.to_string(),
            root: root.path().to_path_buf(),
            certificate: None,
            key: None,
        }],
        ..Config::default()
    };
    let (handler, events) = ChannelHandler::new();
    Site {
        _root: root,
        server: Webserver::new(config, Arc::new(handler)),
        events,
    }
}

fn remote() -> SocketAddr {
    "127.0.0.1:40000".parse().unwrap()
}

/// Concatenates queued output, reading file bodies to the end.
fn bytes(out: Vec<Output>) -> Vec<u8> {
    let mut bytes = Vec::new();
    for output in out {
        match output {
            Output::Bytes(b) => bytes.extend_from_slice(&b),
            Output::File(body) => {
                for chunk in body {
                    bytes.extend_from_slice(&chunk.unwrap());
                }
            }
        }
    }
    bytes
}

fn written(out: Vec<Output>) -> String {
    String::from_utf8(bytes(out)).unwrap()
}

fn get(conn: &mut Connection, target: &str, extra: &str) -> String {
    let request = format!("GET {target} HTTP/1.1\r\nHost: example.com\r\n{extra}\r\n");
    let mut out = Vec::new();
    assert_eq!(conn.io(DOMAIN, request.as_bytes(), &mut out).unwrap(), Flow::Continue);
    written(out)
}

async fn upgraded(site: &mut Site) -> Connection {
    let (mut conn, _rx) = site.server.accept(remote()).await.unwrap();
    let mut out = Vec::new();
    conn.io(DOMAIN, UPGRADE, &mut out).unwrap();
    let reply = written(out);
    assert!(reply.starts_with("HTTP/1.1 101 "), "{reply}");
    assert!(reply.contains("Sec-WebSocket-Accept: s3pPLMBiTxaQ9kYGzzhZRbK+xOo=\r\n"));
    assert_eq!(conn.kind(), Kind::WebSocket);
    assert_eq!(
        site.events.try_recv().unwrap(),
        Inbound::Open { socket: conn.socket(), domain: DOMAIN.to_string() }
    );
    conn
}

fn client_frame(opcode: Opcode, fin: bool, payload: &[u8]) -> Vec<u8> {
    encode_frame(opcode, fin, payload, Some(MASK))
}

#[tokio::test]
async fn test_serves_whole_file() {
    let site = site();
    let (mut conn, _rx) = site.server.accept(remote()).await.unwrap();

    let reply = get(&mut conn, "/hello.txt", "");
    assert!(reply.starts_with("HTTP/1.1 200 OK\r\n"), "{reply}");
    assert!(reply.contains("Content-Type: text/plain"));
    assert!(reply.contains("Content-Length: 10\r\n"));
    assert!(reply.contains("Accept-Ranges: bytes\r\n"));
    assert!(reply.ends_with("\r\n\r\n0123456789"));
}

#[tokio::test]
async fn test_serves_byte_range() {
    let site = site();
    let (mut conn, _rx) = site.server.accept(remote()).await.unwrap();

    let reply = get(&mut conn, "/hello.txt", "Range: bytes=0-3\r\n");
    assert!(reply.starts_with("HTTP/1.1 206 "), "{reply}");
    assert!(reply.contains("Content-Range: bytes 0-3/10\r\n"));
    assert!(reply.contains("Content-Length: 4\r\n"));
    assert!(reply.ends_with("\r\n\r\n0123"));

    let reply = get(&mut conn, "/hello.txt", "Range: bytes=7-\r\n");
    assert!(reply.contains("Content-Range: bytes 7-9/10\r\n"));
    assert!(reply.ends_with("\r\n\r\n789"));
}

#[tokio::test]
async fn test_unsatisfiable_range() {
    let site = site();
    let (mut conn, _rx) = site.server.accept(remote()).await.unwrap();

    let reply = get(&mut conn, "/hello.txt", "Range: bytes=20-30\r\n");
    assert!(reply.starts_with("HTTP/1.1 416 "), "{reply}");
    assert!(reply.contains("Content-Range: bytes */10\r\n"));
}

#[tokio::test]
async fn test_directory_serves_index() {
    let site = site();
    let (mut conn, _rx) = site.server.accept(remote()).await.unwrap();

    let reply = get(&mut conn, "/docs/", "");
    assert!(reply.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(reply.contains("Content-Type: text/html"));
    assert!(reply.ends_with("<h1>docs</h1>"));
}

#[tokio::test]
async fn test_missing_file_is_404() {
    let site = site();
    let (mut conn, _rx) = site.server.accept(remote()).await.unwrap();

    let reply = get(&mut conn, "/nope.txt", "");
    assert!(reply.starts_with("HTTP/1.1 404 Not Found\r\n"), "{reply}");
}

#[tokio::test]
async fn test_only_get_is_allowed() {
    let site = site();
    let (mut conn, _rx) = site.server.accept(remote()).await.unwrap();

    let mut out = Vec::new();
    let request = b"POST /hello.txt HTTP/1.1\r\nHost: example.com\r\nContent-Length: 2\r\n\r\nhi";
    conn.io(DOMAIN, request, &mut out).unwrap();
    let reply = written(out);
    assert!(reply.starts_with("HTTP/1.1 405 "), "{reply}");
    assert!(reply.contains("Allow: GET\r\n"));
}

#[tokio::test]
async fn test_pipelined_requests_answered_in_order() {
    let site = site();
    let (mut conn, _rx) = site.server.accept(remote()).await.unwrap();

    let mut out = Vec::new();
    let requests = b"GET /hello.txt HTTP/1.1\r\nHost: example.com\r\nRange: bytes=0-1\r\n\r\nGET /nope HTTP/1.1\r\nHost: example.com\r\n\r\n";
    conn.io(DOMAIN, requests, &mut out).unwrap();
    let reply = written(out);
    let first = reply.find("HTTP/1.1 206 ").unwrap();
    let second = reply.find("HTTP/1.1 404 ").unwrap();
    assert!(first < second);
    assert_eq!(conn.pending(), 0);
}

#[tokio::test]
async fn test_partial_request_is_kept() {
    let site = site();
    let (mut conn, _rx) = site.server.accept(remote()).await.unwrap();

    let mut out = Vec::new();
    conn.io(DOMAIN, b"GET /hello.txt HTTP/1.1\r\nHo", &mut out).unwrap();
    assert!(out.is_empty());
    assert_eq!(conn.pending(), 27);

    conn.io(DOMAIN, b"st: example.com\r\n\r\n", &mut out).unwrap();
    assert!(written(out).ends_with("0123456789"));
    assert_eq!(conn.pending(), 0);
}

#[tokio::test]
async fn test_host_must_name_bound_domain() {
    let site = site();
    let (mut conn, _rx) = site.server.accept(remote()).await.unwrap();

    let mut out = Vec::new();
    let err = conn
        .io(DOMAIN, b"GET / HTTP/1.1\r\nHost: other.org\r\n\r\n", &mut out)
        .unwrap_err();
    assert!(matches!(err, ConnectionError::HostMismatch(_)));
    assert!(out.is_empty());

    let (mut conn, _rx) = site.server.accept(remote()).await.unwrap();
    let err = conn.io(DOMAIN, b"GET / HTTP/1.1\r\n\r\n", &mut out).unwrap_err();
    assert!(matches!(err, ConnectionError::HostMismatch(_)));
}

#[tokio::test]
async fn test_host_with_port_matches() {
    let site = site();
    let (mut conn, _rx) = site.server.accept(remote()).await.unwrap();

    let mut out = Vec::new();
    conn.io(DOMAIN, b"GET /hello.txt HTTP/1.1\r\nHost: EXAMPLE.com:8443\r\n\r\n", &mut out)
        .unwrap();
    assert!(written(out).starts_with("HTTP/1.1 200 OK\r\n"));
}

#[tokio::test]
async fn test_domain_is_bound_by_first_call() {
    let site = site();
    let (mut conn, _rx) = site.server.accept(remote()).await.unwrap();

    let mut out = Vec::new();
    conn.io(DOMAIN, b"GET /hello", &mut out).unwrap();
    assert_eq!(conn.domain(), Some(DOMAIN));

    let err = conn.io("other.org", b".txt HTTP/1.1\r\n", &mut out).unwrap_err();
    assert!(matches!(err, ConnectionError::DomainMismatch { .. }));
}

#[tokio::test]
async fn test_malformed_request_is_an_error() {
    let site = site();
    let (mut conn, _rx) = site.server.accept(remote()).await.unwrap();

    let mut out = Vec::new();
    let err = conn.io(DOMAIN, b"GET / HTTP/1.1\r\nBroken\r\n\r\n", &mut out).unwrap_err();
    assert!(matches!(err, ConnectionError::Parse(_)));
}

#[tokio::test]
async fn test_unsupported_websocket_version_stays_http() {
    let site = site();
    let (mut conn, _rx) = site.server.accept(remote()).await.unwrap();

    let request = String::from_utf8(UPGRADE.to_vec()).unwrap().replace("Version: 13", "Version: 8");
    let mut out = Vec::new();
    conn.io(DOMAIN, request.as_bytes(), &mut out).unwrap();
    let reply = written(out);
    assert!(reply.starts_with("HTTP/1.1 426 "), "{reply}");
    assert!(reply.contains("Sec-WebSocket-Version: 13\r\n"));
    assert_eq!(conn.kind(), Kind::Http);
}

#[tokio::test]
async fn test_text_message_becomes_event() {
    let mut site = site();
    let mut conn = upgraded(&mut site).await;

    let mut out = Vec::new();
    let payload = br#"{"event":"get","uuid":"u-1","parameter":{"key":"a"}}"#;
    let flow = conn.io(DOMAIN, &client_frame(Opcode::Text, true, payload), &mut out).unwrap();
    assert_eq!(flow, Flow::Continue);
    assert!(out.is_empty());

    match site.events.try_recv().unwrap() {
        Inbound::Event { socket, event } => {
            assert_eq!(socket, conn.socket());
            assert_eq!(event.event, "get");
            assert_eq!(event.uuid, "u-1");
            assert_eq!(event.parameter["key"], "a");
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn test_fragmented_message_is_reassembled() {
    let mut site = site();
    let mut conn = upgraded(&mut site).await;

    let mut wire = client_frame(Opcode::Text, false, br#"{"event":"#);
    wire.extend(client_frame(Opcode::Ping, true, b"mid"));
    wire.extend(client_frame(Opcode::Continuation, true, br#""split"}"#));

    let mut out = Vec::new();
    conn.io(DOMAIN, &wire, &mut out).unwrap();
    match site.events.try_recv().unwrap() {
        Inbound::Event { event, .. } => assert_eq!(event.event, "split"),
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(bytes(out), encode_frame(Opcode::Pong, true, b"mid", None));
}

#[tokio::test]
async fn test_undecodable_message_is_dropped() {
    let mut site = site();
    let mut conn = upgraded(&mut site).await;

    let mut out = Vec::new();
    let flow = conn.io(DOMAIN, &client_frame(Opcode::Text, true, b"not json"), &mut out).unwrap();
    assert_eq!(flow, Flow::Continue);
    assert!(site.events.try_recv().is_err());
}

#[tokio::test]
async fn test_ping_is_answered_with_pong() {
    let mut site = site();
    let mut conn = upgraded(&mut site).await;

    let mut out = Vec::new();
    conn.io(DOMAIN, &client_frame(Opcode::Ping, true, b"hi"), &mut out).unwrap();
    assert_eq!(bytes(out), encode_frame(Opcode::Pong, true, b"hi", None));
}

#[tokio::test]
async fn test_close_is_echoed() {
    let mut site = site();
    let mut conn = upgraded(&mut site).await;

    let mut out = Vec::new();
    let flow = conn
        .io(DOMAIN, &client_frame(Opcode::Close, true, &[0x03, 0xe8, b'b', b'y', b'e']), &mut out)
        .unwrap();
    assert_eq!(flow, Flow::Close);
    assert_eq!(bytes(out), encode_frame(Opcode::Close, true, &[0x03, 0xe8], None));

    let socket = conn.socket();
    drop(conn);
    assert_eq!(site.events.try_recv().unwrap(), Inbound::Close { socket });
}

#[tokio::test]
async fn test_protocol_error_after_upgrade() {
    let mut site = site();
    let mut conn = upgraded(&mut site).await;

    let mut out = Vec::new();
    let err = conn
        .io(DOMAIN, &client_frame(Opcode::Continuation, true, b"x"), &mut out)
        .unwrap_err();
    assert!(matches!(err, ConnectionError::Fragment(_)));
}
