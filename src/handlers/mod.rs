//! Backend handlers: static files, redirects, and the generic status
//! error page writer every backend falls back to on failure. CGI,
//! FastCGI, and proxy dispatch live in their own top-level modules
//! ([`crate::cgi`], [`crate::fastcgi`], [`crate::proxy`]) since each owns
//! a process/connection lifecycle well beyond "write a response".

pub mod redirect;
pub mod static_file;

use std::io::{self, Read, Write};
use std::os::fd::AsRawFd;

use mio::event::Source;

use crate::config::ServerConfig;
use crate::http::{reason_phrase, write_response_head, Response};
use crate::io::{async_write_all, AsyncIo};

/// Writes a status-only error response, using the server block's custom
/// error page for that status if one is configured and readable, or a
/// minimal generated body otherwise.
pub async fn write_error<S>(client: &mut AsyncIo<S>, server: &ServerConfig, status: u16) -> io::Result<u16>
where
    S: Read + Write + Source + AsRawFd,
{
    if let Some(page_path) = server.error_pages.get(&status) {
        if let Ok(body) = std::fs::read(page_path) {
            let resp = Response::new(status).with_fixed_body(body.len(), "text/html");
            write_response_head(client, &resp).await?;
            async_write_all(client, &body).await?;
            return Ok(status);
        }
    }

    let body = format!("{status} {}", reason_phrase(status));
    let resp = Response::new(status).with_fixed_body(body.len(), "text/plain");
    write_response_head(client, &resp).await?;
    async_write_all(client, body.as_bytes()).await?;
    Ok(status)
}
