//! Synthetic redirect handler: a route whose config carries `redirection`
//! returns a `Location` response with no body lookup at all, bypassing
//! every other backend. Mirrors the teacher's `HttpResponse::redirect`
//! reason-phrase table, now sourced from [`crate::http::response::reason_phrase`].

use std::io::{self, Read, Write};
use std::os::fd::AsRawFd;

use mio::event::Source;

use crate::http::{write_response_head, Response};
use crate::io::AsyncIo;

pub async fn serve<S>(client: &mut AsyncIo<S>, location: &str, code: Option<u16>) -> io::Result<u16>
where
    S: Read + Write + Source + AsRawFd,
{
    let status = code.unwrap_or(302);
    let resp = Response::new(status).header("Location", location).with_fixed_body(0, "text/plain");
    write_response_head(client, &resp).await?;
    Ok(status)
}
