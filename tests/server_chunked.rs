//! End-to-end coverage of the server lifecycle (§4.K) driving a chunked
//! request body through the real accept loop and the reverse proxy
//! handler (§4.I): a client sends a `Transfer-Encoding: chunked` POST,
//! the server decodes it via `BodyReader` and replays it to a stub
//! upstream, which echoes back a fixed response the client then reads
//! off the proxied connection.
//!
//! Pipelining and keep-alive are out of scope (§1 Non-goals) — every
//! connection here is one request, one response, one close.

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::thread;
use std::time::Duration;

use server_proxy::config::{AppConfig, RouteConfig, ServerConfig};

/// Accepts exactly one connection, reads it to EOF (the proxy
/// half-closes its write side once the decoded request body has been
/// forwarded), and replies with a fixed, `Content-Length`-framed
/// response — standing in for a real origin server.
fn spawn_stub_upstream() -> (u16, thread::JoinHandle<Vec<u8>>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind stub upstream");
    let port = listener.local_addr().unwrap().port();
    let handle = thread::spawn(move || {
        let (mut conn, _) = listener.accept().expect("accept from proxy");
        let mut received = Vec::new();
        conn.read_to_end(&mut received).expect("read proxied request");
        let body = b"relayed";
        let response = format!("HTTP/1.1 200 OK\r\nContent-Length: {}\r\n\r\n", body.len());
        conn.write_all(response.as_bytes()).unwrap();
        conn.write_all(body).unwrap();
        received
    });
    (port, handle)
}

fn free_port() -> u16 {
    TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap().port()
}

#[test]
fn chunked_request_body_is_decoded_and_relayed_through_the_proxy_handler() {
    let (upstream_port, upstream) = spawn_stub_upstream();
    let proxy_port = free_port();

    let route = RouteConfig {
        path: "/relay".to_string(),
        methods: vec!["POST".to_string()],
        proxy_pass: Some(format!("127.0.0.1:{upstream_port}")),
        ..Default::default()
    };
    let server_cfg = ServerConfig {
        host: "127.0.0.1".to_string(),
        ports: vec![proxy_port],
        server_name: "_".to_string(),
        default_server: true,
        routes: vec![route],
        ..Default::default()
    };
    let config = AppConfig { servers: vec![server_cfg] };

    thread::spawn(move || {
        if let Err(e) = server_proxy::rt::block_on(server_proxy::server::run(config)) {
            panic!("server run failed: {e}");
        }
    });

    // Give the listener thread time to bind before the client connects.
    thread::sleep(Duration::from_millis(200));

    let mut client = TcpStream::connect(("127.0.0.1", proxy_port)).expect("connect to proxy");
    client.set_read_timeout(Some(Duration::from_secs(5))).unwrap();

    let head = "POST /relay HTTP/1.1\r\nHost: 127.0.0.1\r\nTransfer-Encoding: chunked\r\n\r\n";
    client.write_all(head.as_bytes()).unwrap();
    client.write_all(b"5\r\nHello\r\n").unwrap();
    client.write_all(b"7\r\n World!\r\n").unwrap();
    client.write_all(b"0\r\n\r\n").unwrap();

    let mut response = Vec::new();
    client.read_to_end(&mut response).expect("read proxied response");
    let response = String::from_utf8_lossy(&response);
    assert!(response.starts_with("HTTP/1.1 200 OK\r\n"), "unexpected response: {response}");
    assert!(response.ends_with("relayed"));

    let forwarded = upstream.join().expect("stub upstream thread");
    let forwarded_text = String::from_utf8_lossy(&forwarded);
    assert!(forwarded_text.ends_with("Hello World!"), "upstream did not see decoded body: {forwarded_text}");
    assert!(!forwarded_text.contains("Transfer-Encoding"), "chunked framing should not reach upstream");
}
