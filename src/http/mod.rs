//! HTTP/1.1 wire codec (§4.D): header representation, request-target
//! grammar, request/response parsing, and body framing. Connection
//! lifecycle (accept, dispatch, half-close) lives in [`crate::server`];
//! this module only turns bytes into typed messages and back.

pub mod body;
pub mod error;
pub mod message;
pub mod request;
pub mod response;
pub mod uri;

pub use body::{write_chunk, write_chunked_terminator, BodyReader};
pub use error::HttpParseError;
pub use message::{canonical_key, HeaderMap};
pub use request::{parse_headers, parse_request, Request, Version};
pub use response::{mime_type_for, parse_response, reason_phrase, write_response_head, Response};
pub use uri::{normalize_path, RequestTarget, UriError};
