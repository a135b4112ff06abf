use std::fmt;
use std::io;

/// Everything that can go wrong turning bytes into a [`super::Request`] or
/// [`super::Response`]: grammar violations and the size bounds of §4.D,
/// both of which the connection driver maps to a specific status code
/// rather than a blanket 400 (see §7).
#[derive(Debug)]
pub enum HttpParseError {
    Io(io::Error),
    Eof,
    Malformed(&'static str),
    MethodTooLong,
    TargetTooLong,
    ReasonTooLong,
    HeaderKeyTooLong,
    HeaderValueTooLong,
    TooManyHeaders,
    HeaderBytesTooLong,
    Uri(crate::http::uri::UriError),
}

impl fmt::Display for HttpParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HttpParseError::Io(e) => write!(f, "{e}"),
            HttpParseError::Eof => write!(f, "connection closed before a full message arrived"),
            HttpParseError::Malformed(what) => write!(f, "malformed {what}"),
            HttpParseError::MethodTooLong => write!(f, "method exceeds bound"),
            HttpParseError::TargetTooLong => write!(f, "request-target exceeds bound"),
            HttpParseError::ReasonTooLong => write!(f, "reason phrase exceeds bound"),
            HttpParseError::HeaderKeyTooLong => write!(f, "header key exceeds bound"),
            HttpParseError::HeaderValueTooLong => write!(f, "header value exceeds bound"),
            HttpParseError::TooManyHeaders => write!(f, "too many headers"),
            HttpParseError::HeaderBytesTooLong => write!(f, "total header size exceeds bound"),
            HttpParseError::Uri(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for HttpParseError {}

impl From<io::Error> for HttpParseError {
    fn from(e: io::Error) -> Self {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            HttpParseError::Eof
        } else {
            HttpParseError::Io(e)
        }
    }
}

impl From<crate::http::uri::UriError> for HttpParseError {
    fn from(e: crate::http::uri::UriError) -> Self {
        HttpParseError::Uri(e)
    }
}

impl HttpParseError {
    /// Which status a 1.1 connection driver raises for this failure, per
    /// the error-kind table in §7 (`size-bound` splits into 414 for the
    /// target and 431 for headers; everything else here is `wire-parse`).
    pub fn status_code(&self) -> u16 {
        match self {
            // Only the request-target has a dedicated status (414 "URI Too
            // Long"); an over-long method is wire-parse like any other
            // malformed request line (S6).
            HttpParseError::TargetTooLong => 414,
            HttpParseError::HeaderKeyTooLong
            | HttpParseError::HeaderValueTooLong
            | HttpParseError::TooManyHeaders
            | HttpParseError::HeaderBytesTooLong => 431,
            _ => 400,
        }
    }
}
