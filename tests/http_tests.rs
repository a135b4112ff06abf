//! Integration coverage for the HTTP wire codec (§4.D) above what the
//! per-module unit tests already exercise: a full request parse running
//! into a body read, chunked framing, and the `client_max_body_size`
//! cutoff.

use server_proxy::http::{parse_request, reason_phrase, write_response_head, BodyReader, Response};
use server_proxy::io::{AsyncBufReader, AsyncIo};

/// A connected socket pair pre-loaded with `bytes`, mirroring the library's
/// own `#[cfg(test)]`-only `test_stream_with` helper — unavailable here
/// since an integration test links `server_proxy` without that cfg.
fn primed_stream(bytes: &[u8]) -> AsyncIo<mio::net::UnixStream> {
    use std::io::Write as _;
    use std::net::Shutdown;
    let (a, mut b) = mio::net::UnixStream::pair().expect("socketpair");
    b.write_all(bytes).expect("prime test socket");
    b.shutdown(Shutdown::Write).expect("shutdown test socket");
    AsyncIo::new(a)
}

fn parse(bytes: &[u8]) -> server_proxy::http::Request {
    server_proxy::rt::block_on(async {
        let mut buf = AsyncBufReader::new(primed_stream(bytes));
        parse_request(&mut buf).await
    })
    .expect("block_on")
    .expect("parse")
}

#[test]
fn fixed_length_body_round_trips_through_body_reader() {
    let raw = b"POST /upload HTTP/1.1\r\nHost: x\r\nContent-Length: 11\r\n\r\nhello world";
    server_proxy::rt::block_on(async {
        let mut buf = AsyncBufReader::new(primed_stream(raw));
        let req = parse_request(&mut buf).await.unwrap();
        assert_eq!(req.method, "POST");
        let mut body = BodyReader::for_headers(&mut buf, &req.headers, 1024);
        let data = body.read_to_vec().await.unwrap();
        assert_eq!(data, b"hello world");
        assert!(!body.limit_exceeded());
    })
    .unwrap();
}

#[test]
fn chunked_body_decodes_across_multiple_chunks() {
    let raw = b"POST /upload HTTP/1.1\r\nHost: x\r\nTransfer-Encoding: chunked\r\n\r\n5\r\nhello\r\n6\r\n world\r\n0\r\n\r\n";
    server_proxy::rt::block_on(async {
        let mut buf = AsyncBufReader::new(primed_stream(raw));
        let req = parse_request(&mut buf).await.unwrap();
        let mut body = BodyReader::for_headers(&mut buf, &req.headers, 1024);
        let data = body.read_to_vec().await.unwrap();
        assert_eq!(data, b"hello world");
    })
    .unwrap();
}

#[test]
fn body_read_stops_at_client_max_body_size() {
    let raw = b"POST /upload HTTP/1.1\r\nHost: x\r\nContent-Length: 20\r\n\r\n01234567890123456789";
    server_proxy::rt::block_on(async {
        let mut buf = AsyncBufReader::new(primed_stream(raw));
        let req = parse_request(&mut buf).await.unwrap();
        let mut body = BodyReader::for_headers(&mut buf, &req.headers, 10);
        let data = body.read_to_vec().await.unwrap();
        assert!(body.limit_exceeded());
        assert!(data.len() <= 20);
    })
    .unwrap();
}

#[test]
fn request_with_query_string_splits_path_and_query() {
    let req = parse(b"GET /search?q=rust+lang HTTP/1.1\r\nHost: x\r\n\r\n");
    assert_eq!(req.path(), "/search");
    assert_eq!(req.target.query(), Some("q=rust+lang"));
}

#[test]
fn response_head_is_written_through_async_io() {
    let resp = Response::new(404).with_fixed_body(0, "text/plain");
    server_proxy::rt::block_on(async {
        let (a, mut b) = mio::net::UnixStream::pair().expect("socketpair");
        let mut io = AsyncIo::new(a);
        write_response_head(&mut io, &resp).await.unwrap();
        drop(io);
        let mut out = Vec::new();
        std::io::Read::read_to_end(&mut b, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("HTTP/1.1 404 Not Found\r\n"));
        assert!(text.contains("Content-Length: 0\r\n"));
    })
    .unwrap();
}

#[test]
fn reason_phrase_covers_every_status_this_core_emits() {
    for status in [200, 301, 400, 403, 404, 405, 413, 414, 431, 500, 502, 504] {
        assert_ne!(reason_phrase(status), "Unknown");
    }
}
