//! Request-target grammar (RFC 7230 §5.3): the four forms a request line
//! can carry, plus percent-decoding and `.`/`..` segment normalization for
//! the origin-form path. Generalizes the teacher's `HttpRequest::url`
//! (a single decoded `String`) into the closed set of forms the wire
//! grammar actually allows, so `CONNECT`/`OPTIONS *` stop being silently
//! coerced into a path.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UriError {
    /// A `%` was not followed by two hex digits.
    BadPercentEncoding,
    /// The request-target did not match the form its method requires.
    BadForm,
}

impl fmt::Display for UriError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UriError::BadPercentEncoding => write!(f, "invalid percent-encoding"),
            UriError::BadForm => write!(f, "request-target does not match expected form"),
        }
    }
}

/// The four request-target variants RFC 7230 §5.3 allows, dispatched on
/// in [`RequestTarget::parse`] by the request method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestTarget {
    /// `/path[?query]` — ordinary requests.
    Origin { path: String, query: Option<String> },
    /// `scheme://authority/path[?query]` — forward proxy requests.
    Absolute(String),
    /// `host:port` — `CONNECT` only.
    Authority { host: String, port: Option<u16> },
    /// `*` — `OPTIONS` only.
    Asterisk,
}

impl RequestTarget {
    pub fn parse(method: &str, raw: &str) -> Result<Self, UriError> {
        if method.eq_ignore_ascii_case("CONNECT") {
            return parse_authority(raw).map(|(host, port)| RequestTarget::Authority { host, port });
        }
        if method.eq_ignore_ascii_case("OPTIONS") && raw == "*" {
            return Ok(RequestTarget::Asterisk);
        }
        if raw == "*" {
            return Err(UriError::BadForm);
        }
        if raw.starts_with('/') {
            let (raw_path, query) = split_query(raw);
            let path = normalize_path(raw_path)?;
            return Ok(RequestTarget::Origin { path, query });
        }
        // absolute-form: scheme present (`http://...`).
        if raw.contains("://") {
            return Ok(RequestTarget::Absolute(raw.to_string()));
        }
        Err(UriError::BadForm)
    }

    /// The path to route on. Only meaningful for origin-form; callers that
    /// reach a handler needing a path have already rejected the other
    /// forms (asterisk-form only reaches `OPTIONS`, authority-form only
    /// `CONNECT`, neither of which this core routes to a file/CGI/proxy
    /// handler).
    pub fn path(&self) -> Option<&str> {
        match self {
            RequestTarget::Origin { path, .. } => Some(path.as_str()),
            _ => None,
        }
    }

    pub fn query(&self) -> Option<&str> {
        match self {
            RequestTarget::Origin { query, .. } => query.as_deref(),
            _ => None,
        }
    }
}

impl fmt::Display for RequestTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestTarget::Origin { path, query } => {
                write!(f, "{path}")?;
                if let Some(q) = query {
                    write!(f, "?{q}")?;
                }
                Ok(())
            }
            RequestTarget::Absolute(s) => write!(f, "{s}"),
            RequestTarget::Authority { host, port } => match port {
                Some(p) => write!(f, "{host}:{p}"),
                None => write!(f, "{host}"),
            },
            RequestTarget::Asterisk => write!(f, "*"),
        }
    }
}

fn split_query(raw: &str) -> (&str, Option<String>) {
    match raw.split_once('?') {
        Some((p, q)) => (p, Some(q.to_string())),
        None => (raw, None),
    }
}

fn parse_authority(raw: &str) -> Result<(String, Option<u16>), UriError> {
    match raw.rsplit_once(':') {
        Some((host, port)) => {
            let port = port.parse::<u16>().map_err(|_| UriError::BadForm)?;
            Ok((host.to_string(), Some(port)))
        }
        None => Ok((raw.to_string(), None)),
    }
}

/// Percent-decodes a single path segment. `%` must be followed by exactly
/// two hex digits; anything else is a fatal parse error rather than a
/// passthrough, per §4.D.
fn percent_decode(segment: &str) -> Result<Vec<u8>, UriError> {
    let bytes = segment.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hi = bytes.get(i + 1).copied();
            let lo = bytes.get(i + 2).copied();
            let (hi, lo) = match (hi, lo) {
                (Some(h), Some(l)) => (h, l),
                _ => return Err(UriError::BadPercentEncoding),
            };
            let (hi, lo) = match (hex_val(hi), hex_val(lo)) {
                (Some(h), Some(l)) => (h, l),
                _ => return Err(UriError::BadPercentEncoding),
            };
            out.push((hi << 4) | lo);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    Ok(out)
}

fn hex_val(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

/// Splits on `/`, percent-decodes each segment, then resolves `.` and
/// `..` (popping the previous segment, never escaping the root) — the
/// normalization `normalize(normalize(p)) == normalize(p)` idempotence
/// and traversal-rejection invariants from §8 both fall out of rebuilding
/// the path from this resolved stack rather than string-substituting `..`.
pub fn normalize_path(raw_path: &str) -> Result<String, UriError> {
    let mut stack: Vec<String> = Vec::new();
    for raw_seg in raw_path.split('/') {
        if raw_seg.is_empty() {
            continue;
        }
        let decoded = percent_decode(raw_seg)?;
        let seg = String::from_utf8_lossy(&decoded).into_owned();
        match seg.as_str() {
            "." => continue,
            ".." => {
                stack.pop();
            }
            _ => stack.push(seg),
        }
    }
    if stack.is_empty() {
        Ok("/".to_string())
    } else {
        Ok(format!("/{}", stack.join("/")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_percent_encoded_segments() {
        assert_eq!(normalize_path("/hello%20world").unwrap(), "/hello world");
    }

    #[test]
    fn resolves_dot_and_dotdot() {
        assert_eq!(normalize_path("/a/./b/../c").unwrap(), "/a/c");
    }

    #[test]
    fn traversal_never_escapes_root() {
        assert_eq!(normalize_path("/../../etc/passwd").unwrap(), "/etc/passwd");
        assert_eq!(normalize_path("/%2e%2e/etc/passwd").unwrap(), "/etc/passwd");
    }

    #[test]
    fn normalize_is_idempotent() {
        let once = normalize_path("/a/../b/./c/").unwrap();
        let twice = normalize_path(&once).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn bad_percent_encoding_is_fatal() {
        assert_eq!(normalize_path("/100%").unwrap_err(), UriError::BadPercentEncoding);
        assert_eq!(normalize_path("/100%zz").unwrap_err(), UriError::BadPercentEncoding);
    }

    #[test]
    fn dispatches_connect_to_authority_form() {
        let t = RequestTarget::parse("CONNECT", "example.com:443").unwrap();
        assert_eq!(t, RequestTarget::Authority { host: "example.com".into(), port: Some(443) });
    }

    #[test]
    fn dispatches_options_asterisk() {
        let t = RequestTarget::parse("OPTIONS", "*").unwrap();
        assert_eq!(t, RequestTarget::Asterisk);
    }

    #[test]
    fn origin_form_splits_query() {
        let t = RequestTarget::parse("GET", "/search?q=rust").unwrap();
        assert_eq!(t.path(), Some("/search"));
        assert_eq!(t.query(), Some("q=rust"));
    }
}
