//! Covers the static handler's per-extension `Content-Encoding: deflate`
//! policy (§2 component C, §3 "per-extension encoding policies") end to
//! end: a route serving a real file, a server configured to deflate that
//! file's extension, and a client that does or doesn't advertise support.

use server_proxy::config::{RouteConfig, ServerConfig};
use server_proxy::deflate::inflate;
use server_proxy::handlers::static_file;
use server_proxy::http::HeaderMap;
use server_proxy::io::AsyncIo;
use server_proxy::routing::RouteTable;

fn write_temp(name: &str, contents: &[u8]) -> std::path::PathBuf {
    let dir = std::env::temp_dir().join("server_proxy_static_encoding_tests");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join(name);
    std::fs::write(&path, contents).unwrap();
    path
}

fn headers_with(accept_encoding: Option<&str>) -> HeaderMap {
    let mut h = HeaderMap::new();
    if let Some(v) = accept_encoding {
        h.set("Accept-Encoding", v);
    }
    h
}

fn server_for_dir(dir: &std::path::Path, deflate_extensions: &[&str]) -> ServerConfig {
    let route = RouteConfig { root: dir.to_str().unwrap().to_string(), ..Default::default() };
    ServerConfig {
        routes: vec![route],
        deflate_extensions: deflate_extensions.iter().map(|s| s.to_string()).collect(),
        ..Default::default()
    }
}

#[test]
fn serves_deflate_encoded_body_when_extension_and_accept_encoding_match() {
    let body = b"hello hello hello hello hello compressible text".repeat(4);
    let path = write_temp("doc.html", &body);
    let server = server_for_dir(path.parent().unwrap(), &["html"]);
    let resolved = RouteTable::new(&server).resolve("/doc.html", "GET").unwrap();
    let headers = headers_with(Some("gzip, deflate"));

    let (a, mut b) = mio::net::UnixStream::pair().expect("socketpair");
    let status = server_proxy::rt::block_on(async {
        let mut io = AsyncIo::new(a);
        static_file::serve(&mut io, &resolved, &path, "/doc.html", &server, &headers).await
    })
    .unwrap()
    .unwrap();
    assert_eq!(status, 200);

    let mut out = Vec::new();
    std::io::Read::read_to_end(&mut b, &mut out).unwrap();
    let text = String::from_utf8_lossy(&out);
    assert!(text.contains("Content-Encoding: deflate\r\n"), "{text}");

    let header_end = out.windows(4).position(|w| w == b"\r\n\r\n").unwrap() + 4;
    let mut decompressed = Vec::new();
    inflate(&out[header_end..], &mut decompressed).unwrap();
    assert_eq!(decompressed, body);
}

#[test]
fn serves_raw_body_when_client_does_not_accept_deflate() {
    let body = b"plain text served as-is".to_vec();
    let path = write_temp("plain.html", &body);
    let server = server_for_dir(path.parent().unwrap(), &["html"]);
    let resolved = RouteTable::new(&server).resolve("/plain.html", "GET").unwrap();
    let headers = headers_with(None);

    let (a, mut b) = mio::net::UnixStream::pair().expect("socketpair");
    let status = server_proxy::rt::block_on(async {
        let mut io = AsyncIo::new(a);
        static_file::serve(&mut io, &resolved, &path, "/plain.html", &server, &headers).await
    })
    .unwrap()
    .unwrap();
    assert_eq!(status, 200);

    let mut out = Vec::new();
    std::io::Read::read_to_end(&mut b, &mut out).unwrap();
    let text = String::from_utf8(out).unwrap();
    assert!(!text.contains("Content-Encoding"));
    assert!(text.ends_with(std::str::from_utf8(&body).unwrap()));
}

#[test]
fn serves_raw_body_when_extension_not_in_deflate_list() {
    let body = b"some png-ish bytes".to_vec();
    let path = write_temp("image.png", &body);
    let server = server_for_dir(path.parent().unwrap(), &["html"]);
    let resolved = RouteTable::new(&server).resolve("/image.png", "GET").unwrap();
    let headers = headers_with(Some("deflate"));

    let (a, mut b) = mio::net::UnixStream::pair().expect("socketpair");
    let status = server_proxy::rt::block_on(async {
        let mut io = AsyncIo::new(a);
        static_file::serve(&mut io, &resolved, &path, "/image.png", &server, &headers).await
    })
    .unwrap()
    .unwrap();
    assert_eq!(status, 200);

    let mut out = Vec::new();
    std::io::Read::read_to_end(&mut b, &mut out).unwrap();
    let text = String::from_utf8(out).unwrap();
    assert!(!text.contains("Content-Encoding"));
}
