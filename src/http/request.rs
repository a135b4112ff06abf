//! Request-line, header, and (via [`super::body`]) body parsing off a
//! buffered async stream — the wire-level half of §4.D. Replaces the
//! teacher's single-shot, growable-`Vec<u8>` `HttpRequest::proces_request`
//! state machine with a grammar parser that reads exactly as many bytes
//! as each field needs, enforcing every bound as it goes rather than
//! after the fact.

use std::io::{self, Read, Write};
use std::os::fd::AsRawFd;

use mio::event::Source;

use crate::io::AsyncBufReader;

use super::error::HttpParseError;
use super::message::HeaderMap;
use super::uri::RequestTarget;

pub const MAX_METHOD: usize = 256;
pub const MAX_TARGET: usize = 4096;
pub const MAX_VERSION_LINE: usize = 32;
pub const MAX_HEADER_LINE: usize = 256 + 4096 + 2;
pub const MAX_HEADER_KEY: usize = 256;
pub const MAX_HEADER_VALUE: usize = 4096;
pub const MAX_HEADER_COUNT: usize = 256;
pub const MAX_HEADER_BYTES: usize = 65536;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Version {
    pub major: u8,
    pub minor: u8,
}

impl Version {
    pub const HTTP_1_1: Version = Version { major: 1, minor: 1 };
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "HTTP/{}.{}", self.major, self.minor)
    }
}

#[derive(Debug, Clone)]
pub struct Request {
    pub method: String,
    pub target: RequestTarget,
    pub version: Version,
    pub headers: HeaderMap,
}

impl Request {
    pub fn path(&self) -> &str {
        self.target.path().unwrap_or("/")
    }
}

fn is_token_char(b: u8) -> bool {
    b.is_ascii_alphanumeric()
        || matches!(b, b'!' | b'#' | b'$' | b'%' | b'&' | b'\'' | b'*' | b'+' | b'-' | b'.' | b'^' | b'_' | b'`' | b'|' | b'~')
}

fn validate_method(method: &[u8]) -> Result<(), HttpParseError> {
    if method.is_empty() || !method.iter().all(|&b| is_token_char(b)) {
        return Err(HttpParseError::Malformed("method"));
    }
    Ok(())
}

fn validate_target(target: &[u8]) -> Result<(), HttpParseError> {
    if target.is_empty() || target.iter().any(|&b| b < 0x20 || b == 0x7f) {
        return Err(HttpParseError::Malformed("request-target"));
    }
    Ok(())
}

fn parse_version_line(line: &[u8]) -> Result<Version, HttpParseError> {
    let s = std::str::from_utf8(line).map_err(|_| HttpParseError::Malformed("version"))?;
    let rest = s.strip_prefix("HTTP/").ok_or(HttpParseError::Malformed("version"))?;
    let (major, minor) = rest.split_once('.').ok_or(HttpParseError::Malformed("version"))?;
    let major: u8 = major.parse().map_err(|_| HttpParseError::Malformed("version"))?;
    let minor: u8 = minor.parse().map_err(|_| HttpParseError::Malformed("version"))?;
    Ok(Version { major, minor })
}

/// Collapses internal whitespace runs to a single space and trims the
/// ends, per §4.D's header-value lexical rule.
fn collapse_ws(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut in_ws = false;
    for c in s.trim().chars() {
        if c == ' ' || c == '\t' {
            if !in_ws {
                out.push(' ');
                in_ws = true;
            }
        } else {
            out.push(c);
            in_ws = false;
        }
    }
    out
}

fn split_header_line(line: &str) -> Result<(String, String), HttpParseError> {
    let (key, value) = line.split_once(':').ok_or(HttpParseError::Malformed("header line"))?;
    let key = key.trim();
    if key.is_empty() || key.as_bytes().iter().any(|&b| !is_token_char(b)) {
        return Err(HttpParseError::Malformed("header key"));
    }
    Ok((key.to_string(), collapse_ws(value)))
}

pub async fn parse_headers<S>(reader: &mut AsyncBufReader<S>) -> Result<HeaderMap, HttpParseError>
where
    S: Read + Write + Source + AsRawFd,
{
    let mut headers = HeaderMap::new();
    let mut total_bytes = 0usize;
    let mut count = 0usize;
    let mut last_key: Option<String> = None;

    loop {
        let line = reader.read_until(b"\r\n", MAX_HEADER_LINE).await?;
        if line.is_empty() {
            break;
        }
        total_bytes += line.len() + 2;
        if total_bytes > MAX_HEADER_BYTES {
            return Err(HttpParseError::HeaderBytesTooLong);
        }

        if (line[0] == b' ' || line[0] == b'\t') && last_key.is_some() {
            let extra = collapse_ws(&String::from_utf8_lossy(&line));
            headers.append_fold(last_key.as_deref().unwrap(), &extra);
            continue;
        }

        count += 1;
        if count > MAX_HEADER_COUNT {
            return Err(HttpParseError::TooManyHeaders);
        }

        let line_str = String::from_utf8_lossy(&line).into_owned();
        let (key, value) = split_header_line(&line_str)?;
        if key.len() > MAX_HEADER_KEY {
            return Err(HttpParseError::HeaderKeyTooLong);
        }
        if value.len() > MAX_HEADER_VALUE {
            return Err(HttpParseError::HeaderValueTooLong);
        }
        headers.append(&key, &value);
        last_key = Some(key);
    }

    Ok(headers)
}

/// Parses one request off `reader`. Leaves the body untouched — callers
/// construct a [`super::body::BodyReader`] from the returned headers once
/// they know `client_max_body_size` for the resolved server block.
/// Maps a `read_until` bound-exceeded error to the specific taxonomy
/// variant for the field being read, leaving every other I/O error (EOF,
/// connection reset) to flow through unchanged.
fn bound_or(err: io::Error, too_long: HttpParseError) -> HttpParseError {
    if err.kind() == io::ErrorKind::InvalidData {
        too_long
    } else {
        HttpParseError::from(err)
    }
}

pub async fn parse_request<S>(reader: &mut AsyncBufReader<S>) -> Result<Request, HttpParseError>
where
    S: Read + Write + Source + AsRawFd,
{
    let method_bytes = reader
        .read_until(b" ", MAX_METHOD)
        .await
        .map_err(|e| bound_or(e, HttpParseError::MethodTooLong))?;
    validate_method(&method_bytes)?;
    let method = String::from_utf8_lossy(&method_bytes).into_owned();

    let target_bytes = reader
        .read_until(b" ", MAX_TARGET)
        .await
        .map_err(|e| bound_or(e, HttpParseError::TargetTooLong))?;
    validate_target(&target_bytes)?;
    let target_str = String::from_utf8_lossy(&target_bytes).into_owned();

    let version_line = reader.read_until(b"\r\n", MAX_VERSION_LINE).await?;
    let version = parse_version_line(&version_line)?;

    let target = RequestTarget::parse(&method, &target_str)?;
    let headers = parse_headers(reader).await?;

    Ok(Request { method, target, version, headers })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::test_stream_with;

    fn parse_bytes(bytes: &[u8]) -> Result<Request, HttpParseError> {
        crate::rt::block_on(async {
            let mut buf = AsyncBufReader::new(test_stream_with(bytes));
            parse_request(&mut buf).await
        })
        .expect("block_on")
    }

    #[test]
    fn minimal_get_request() {
        let req = parse_bytes(b"GET /index.html HTTP/1.1\r\nHost: example\r\n\r\n").unwrap();
        assert_eq!(req.method, "GET");
        assert_eq!(req.path(), "/index.html");
        assert_eq!(req.version, Version::HTTP_1_1);
        assert_eq!(req.headers.get("Host"), Some("example"));
    }

    #[test]
    fn method_bound_exceeded_is_fatal() {
        let mut bytes = vec![b'A'; 300];
        bytes.extend_from_slice(b" / HTTP/1.1\r\n\r\n");
        let err = parse_bytes(&bytes).unwrap_err();
        assert_eq!(err.status_code(), 400);
    }

    #[test]
    fn obs_fold_collapses_to_single_space() {
        let req = parse_bytes(b"GET / HTTP/1.1\r\nX-Long: first\r\n second\r\n\r\n").unwrap();
        assert_eq!(req.headers.get("X-Long"), Some("first second"));
    }

    #[test]
    fn repeated_headers_join_with_comma() {
        let req = parse_bytes(b"GET / HTTP/1.1\r\nX-A: 1\r\nX-A: 2\r\n\r\n").unwrap();
        assert_eq!(req.headers.get("X-A"), Some("1, 2"));
    }
}
