//! Response construction and wire serialization (§4.D "Writer" +
//! "Response parse", the latter needed by the proxy handler to replay an
//! upstream response). Generalizes the teacher's `HttpResponse` (a
//! `HashMap<String,String>` plus ad hoc `to_pascal_case`) onto the shared
//! [`HeaderMap`], which already owns canonicalization.

use std::io::{self, Read, Write};
use std::os::fd::AsRawFd;

use mio::event::Source;

use crate::io::{async_write_all, AsyncBufReader};

use super::error::HttpParseError;
use super::message::HeaderMap;
use super::request::{parse_headers, Version, MAX_HEADER_LINE, MAX_VERSION_LINE};

#[derive(Debug, Clone)]
pub struct Response {
    pub version: Version,
    pub status: u16,
    pub reason: String,
    pub headers: HeaderMap,
}

impl Response {
    pub fn new(status: u16) -> Self {
        Self {
            version: Version::HTTP_1_1,
            status,
            reason: reason_phrase(status).to_string(),
            headers: HeaderMap::new(),
        }
    }

    pub fn with_reason(status: u16, reason: impl Into<String>) -> Self {
        Self { version: Version::HTTP_1_1, status, reason: reason.into(), headers: HeaderMap::new() }
    }

    pub fn header(mut self, key: &str, value: impl Into<String>) -> Self {
        self.headers.set(key, value);
        self
    }

    /// Sets `Content-Length` and `Content-Type` and returns the body
    /// bytes to write after the header block — kept separate from the
    /// `Response` value itself since streaming bodies (static files,
    /// CGI/proxy passthrough) never materialize the whole body in memory.
    pub fn with_fixed_body(mut self, len: usize, content_type: &str) -> Self {
        self.headers.set("Content-Length", len.to_string());
        self.headers.set("Content-Type", content_type);
        self
    }

    /// Serializes the status line and headers (not the body) to `out`.
    /// Every response this core sends is framed either by
    /// `Content-Length` or `Transfer-Encoding: chunked`, and every one
    /// carries `Connection: close` per the no-keep-alive non-goal (§1).
    pub fn write_head(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(format!("{} {} {}\r\n", self.version, self.status, self.reason).as_bytes());
        let mut headers = self.headers.clone();
        headers.set("Connection", "close");
        headers.write_to(out);
    }

    pub fn to_head_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.write_head(&mut out);
        out
    }
}

pub fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        204 => "No Content",
        301 => "Moved Permanently",
        302 => "Found",
        303 => "See Other",
        307 => "Temporary Redirect",
        308 => "Permanent Redirect",
        400 => "Bad Request",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        408 => "Request Timeout",
        413 => "Payload Too Large",
        414 => "URI Too Long",
        431 => "Request Header Fields Too Large",
        500 => "Internal Server Error",
        501 => "Not Implemented",
        502 => "Bad Gateway",
        504 => "Gateway Timeout",
        _ => "Unknown",
    }
}

pub fn mime_type_for(extension: Option<&str>) -> &'static str {
    match extension {
        Some("html") | Some("htm") => "text/html",
        Some("css") => "text/css",
        Some("js") | Some("mjs") => "application/javascript",
        Some("json") => "application/json",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("svg") => "image/svg+xml",
        Some("txt") => "text/plain",
        Some("pdf") => "application/pdf",
        Some("wasm") => "application/wasm",
        _ => "application/octet-stream",
    }
}

fn parse_status_line(line: &[u8]) -> Result<(Version, u16, String), HttpParseError> {
    let s = std::str::from_utf8(line).map_err(|_| HttpParseError::Malformed("status line"))?;
    let mut parts = s.splitn(3, ' ');
    let version_str = parts.next().ok_or(HttpParseError::Malformed("status line"))?;
    let status_str = parts.next().ok_or(HttpParseError::Malformed("status line"))?;
    let reason = parts.next().unwrap_or("").to_string();

    let rest = version_str.strip_prefix("HTTP/").ok_or(HttpParseError::Malformed("status line"))?;
    let (major, minor) = rest.split_once('.').ok_or(HttpParseError::Malformed("status line"))?;
    let version = Version {
        major: major.parse().map_err(|_| HttpParseError::Malformed("version"))?,
        minor: minor.parse().map_err(|_| HttpParseError::Malformed("version"))?,
    };
    let status: u16 = status_str.parse().map_err(|_| HttpParseError::Malformed("status code"))?;
    Ok((version, status, reason))
}

/// Parses an upstream response's status line and headers — used by the
/// proxy handler (§4.I) to replay what it read from the origin. A
/// malformed response here is the `upstream`/`wire-parse` case in §7,
/// mapped by the caller to `502`, never `400`.
pub async fn parse_response<S>(reader: &mut AsyncBufReader<S>) -> Result<Response, HttpParseError>
where
    S: Read + Write + Source + AsRawFd,
{
    let line = reader.read_until(b"\r\n", MAX_VERSION_LINE + MAX_HEADER_LINE).await?;
    let (version, status, reason) = parse_status_line(&line)?;
    let headers = parse_headers(reader).await?;
    Ok(Response { version, status, reason, headers })
}

/// Writes a response head through an [`crate::io::AsyncIo`], flushing
/// only once the whole head has been accepted (buffered output semantics
/// from §4.A: visible to the peer no later than the next flush, never
/// implicitly on drop).
pub async fn write_response_head<S>(io: &mut crate::io::AsyncIo<S>, resp: &Response) -> io::Result<()>
where
    S: Read + Write + Source + AsRawFd,
{
    let bytes = resp.to_head_bytes();
    async_write_all(io, &bytes).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_status_line_and_headers() {
        let resp = Response::new(200).with_fixed_body(5, "text/plain");
        let mut out = Vec::new();
        resp.write_head(&mut out);
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(text.contains("Content-Length: 5\r\n"));
        assert!(text.contains("Content-Type: text/plain\r\n"));
        assert!(text.ends_with("\r\n\r\n"));
    }

    #[test]
    fn parses_upstream_status_line() {
        let bytes = b"HTTP/1.1 301 Moved\r\nLocation: /new\r\nContent-Length: 0\r\n\r\n";
        let resp = crate::rt::block_on(async {
            let mut buf = AsyncBufReader::new(crate::io::test_stream_with(bytes));
            parse_response(&mut buf).await
        })
        .unwrap()
        .unwrap();
        assert_eq!(resp.status, 301);
        assert_eq!(resp.reason, "Moved");
        assert_eq!(resp.headers.get("Location"), Some("/new"));
    }
}
