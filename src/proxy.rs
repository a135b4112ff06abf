//! Reverse proxy handler (§4.I): opens a TCP connection to the
//! configured upstream, replays the client's request line and headers
//! (stripping hop-by-hop fields), then runs the two directions —
//! client→upstream body, upstream→client status/headers/body —
//! concurrently via [`crate::rt::join::join2`]. Grounded on the same
//! duplex-bridge shape as [`crate::cgi::handle_cgi`], generalized from a
//! child process's three pipes to one upstream socket's two directions;
//! the upstream connection is split into independent read/write halves
//! via `try_clone` the same way [`crate::fastcgi::FastCgiConnection`]
//! splits its socket, so the two directions never contend for the same
//! `&mut AsyncIo`.

use std::io::{self, Read, Write};
use std::net::ToSocketAddrs;
use std::os::fd::AsRawFd;

use mio::event::Source;
use mio::net::TcpStream;

use crate::http::{
    parse_response, write_chunk, write_chunked_terminator, write_response_head, BodyReader, HeaderMap,
    Request,
};
use crate::io::{async_write_all, AsyncBufReader, AsyncIo};
use crate::rt::join::join2;

/// Headers RFC 7230 §6.1 scopes to a single hop; neither the request
/// sent upstream nor the response replayed to the client should carry
/// these through unchanged.
const HOP_BY_HOP: &[&str] = &["Connection", "Keep-Alive", "Transfer-Encoding", "Upgrade"];

fn strip_hop_by_hop(headers: &mut HeaderMap) {
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
}

fn write_request_line(out: &mut Vec<u8>, request: &Request) {
    out.extend_from_slice(request.method.as_bytes());
    out.push(b' ');
    out.extend_from_slice(request.target.to_string().as_bytes());
    out.extend_from_slice(b" HTTP/1.1\r\n");
}

/// Proxies `request`/`body` to `upstream` (a `host:port` string from the
/// route's `proxy_pass`), writing the replayed response directly to
/// `client`. Returns the status code replayed, or `502` if the upstream
/// connection or response could not be established.
pub async fn handle_proxy<S>(
    client: &mut AsyncIo<S>,
    request: &Request,
    body: &mut BodyReader<'_, S>,
    upstream: &str,
) -> io::Result<u16>
where
    S: Read + Write + Source + AsRawFd,
{
    let addr = match upstream.to_socket_addrs().ok().and_then(|mut it| it.next()) {
        Some(a) => a,
        None => return write_bad_gateway(client).await,
    };

    let std_write = match std::net::TcpStream::connect(addr) {
        Ok(s) => s,
        Err(_) => return write_bad_gateway(client).await,
    };
    let std_read = match std_write.try_clone() {
        Ok(s) => s,
        Err(_) => return write_bad_gateway(client).await,
    };
    if std_write.set_nonblocking(true).is_err() || std_read.set_nonblocking(true).is_err() {
        return write_bad_gateway(client).await;
    }
    let mut up_write = AsyncIo::new(TcpStream::from_std(std_write));
    let mut up_read = AsyncBufReader::new(AsyncIo::new(TcpStream::from_std(std_read)));

    let mut head = Vec::new();
    write_request_line(&mut head, request);
    let mut req_headers = request.headers.clone();
    strip_hop_by_hop(&mut req_headers);
    req_headers.write_to(&mut head);

    if async_write_all(&mut up_write, &head).await.is_err() {
        return write_bad_gateway(client).await;
    }

    let sent_status = std::cell::Cell::new(0u16);

    let pump_request_body = async {
        let mut buf = [0u8; 8192];
        loop {
            let n = match body.read(&mut buf).await {
                Ok(n) => n,
                Err(_) => break,
            };
            if n == 0 {
                break;
            }
            if async_write_all(&mut up_write, &buf[..n]).await.is_err() {
                break;
            }
        }
        let _ = up_write.get_mut().shutdown(std::net::Shutdown::Write);
    };

    let pump_response = async {
        let resp = match parse_response(&mut up_read).await {
            Ok(r) => r,
            Err(_) => {
                // Malformed upstream response (§7: upstream wire-parse
                // failure maps to 502) — nothing has been written to the
                // client yet, so send the 502 here rather than leaving it
                // to the post-join guard.
                let _ = write_bad_gateway(client).await;
                sent_status.set(502);
                return;
            }
        };
        sent_status.set(resp.status);

        let mut resp_headers = resp.headers.clone();
        strip_hop_by_hop(&mut resp_headers);
        let use_chunked = !resp_headers.has("Content-Length");

        let mut out = crate::http::Response::with_reason(resp.status, resp.reason.clone());
        for (k, v) in resp_headers.iter() {
            out.headers.set(k, v);
        }
        if use_chunked {
            out.headers.set("Transfer-Encoding", "chunked");
        }
        if write_response_head(client, &out).await.is_err() {
            return;
        }

        let mut remaining = resp_headers.content_length();
        let mut buf = [0u8; 8192];
        loop {
            if let Some(0) = remaining {
                break;
            }
            let n = match up_read.read_some(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(n) => n,
            };
            if let Some(r) = remaining.as_mut() {
                *r = r.saturating_sub(n);
            }
            let res = if use_chunked {
                write_chunk(client, &buf[..n]).await
            } else {
                async_write_all(client, &buf[..n]).await
            };
            if res.is_err() {
                break;
            }
        }
        if use_chunked {
            let _ = write_chunked_terminator(client).await;
        }
    };

    join2(pump_request_body, pump_response).await;

    if sent_status.get() == 0 {
        return write_bad_gateway(client).await;
    }
    Ok(sent_status.get())
}

async fn write_bad_gateway<S>(client: &mut AsyncIo<S>) -> io::Result<u16>
where
    S: Read + Write + Source + AsRawFd,
{
    let resp = crate::http::Response::new(502);
    write_response_head(client, &resp).await?;
    Ok(502)
}
