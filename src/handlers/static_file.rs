//! Static file handler (§4.F). Generalizes the teacher's `handle_get`
//! (which built an `ActiveAction::FileDownload(File, usize)` for the
//! connection driver to pump later) into one function that opens, writes
//! the head, and streams the body itself — the connection driver no
//! longer needs a variant per backend to know how to finish a response.

use std::io::{self, Read, Write};
use std::os::fd::AsRawFd;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};

use mio::event::Source;

use crate::config::ServerConfig;
use crate::http::{mime_type_for, write_response_head, HeaderMap, Response};
use crate::io::{async_write_all, AsyncIo};
use crate::routing::ResolvedRoute;

/// Resolves `{root, path-prefix, request path}` into an on-disk path the
/// way §4.E hands a handler its `file` input: strip the matched prefix
/// off the request path, then join what's left onto the route's root.
pub fn resolve_path(route: &ResolvedRoute<'_>, request_path: &str) -> PathBuf {
    let residual = request_path.strip_prefix(route.path).unwrap_or(request_path);
    let mut path = PathBuf::from(route.root);
    path.push(residual.trim_start_matches('/'));
    path
}

/// Serves `path` (already resolved via [`resolve_path`]) to `client`,
/// writing the full response itself. Directory requests fall back to
/// `route.default_file` if set, to an autoindex listing if enabled, or
/// to `403` if neither applies — the file-not-found/permission-denied
/// split on open failure matches the teacher's `handle_get`.
///
/// When the file's extension is named in `server.deflate_extensions` and
/// the request's `Accept-Encoding` lists `deflate`, the body is run
/// through [`crate::deflate::deflate`] and sent with `Content-Encoding:
/// deflate` instead of the raw bytes (§2 component C: "may wrap the
/// response stream when content-encoding is applied").
pub async fn serve<S>(
    client: &mut AsyncIo<S>,
    route: &ResolvedRoute<'_>,
    path: &Path,
    request_path: &str,
    server: &ServerConfig,
    request_headers: &HeaderMap,
) -> io::Result<u16>
where
    S: Read + Write + Source + AsRawFd,
{
    let mut path = path.to_path_buf();
    if path.is_dir() {
        if !route.default_file.is_empty() && path.join(route.default_file).is_file() {
            path.push(route.default_file);
        } else if route.autoindex {
            return serve_autoindex(client, &path, request_path).await;
        } else {
            return write_plain(client, 403, "directory listing denied").await;
        }
    }

    match std::fs::File::open(&path) {
        Ok(mut file) => {
            let Ok(metadata) = file.metadata() else {
                return write_plain(client, 500, "could not stat file").await;
            };
            let size = metadata.size() as usize;
            let ext = path.extension().and_then(|s| s.to_str());
            let mime = mime_type_for(ext);

            if wants_deflate(server, request_headers, ext) {
                let mut raw = Vec::with_capacity(size);
                file.read_to_end(&mut raw)?;
                let mut compressed = Vec::new();
                if crate::deflate::deflate(&raw[..], &mut compressed).is_ok() {
                    let resp = Response::new(200)
                        .with_fixed_body(compressed.len(), mime)
                        .header("Content-Encoding", "deflate");
                    write_response_head(client, &resp).await?;
                    async_write_all(client, &compressed).await?;
                    return Ok(200);
                }
                // Compression failed for some reason (shouldn't happen for
                // a well-formed input); fall through and serve the file
                // uncompressed rather than fail the request.
                let resp = Response::new(200).with_fixed_body(raw.len(), mime);
                write_response_head(client, &resp).await?;
                async_write_all(client, &raw).await?;
                return Ok(200);
            }

            let resp = Response::new(200).with_fixed_body(size, mime);
            write_response_head(client, &resp).await?;

            let mut remaining = size;
            let mut buf = [0u8; 16384];
            while remaining > 0 {
                let want = remaining.min(buf.len());
                let n = file.read(&mut buf[..want])?;
                if n == 0 {
                    break;
                }
                async_write_all(client, &buf[..n]).await?;
                remaining -= n;
            }
            Ok(200)
        }
        Err(e) => match e.kind() {
            io::ErrorKind::NotFound => write_plain(client, 404, "not found").await,
            io::ErrorKind::PermissionDenied => write_plain(client, 403, "forbidden").await,
            _ => write_plain(client, 500, "internal server error").await,
        },
    }
}

fn wants_deflate(server: &ServerConfig, request_headers: &HeaderMap, ext: Option<&str>) -> bool {
    let Some(ext) = ext else { return false };
    if !server.deflate_extensions.iter().any(|e| e == ext) {
        return false;
    }
    request_headers
        .get("Accept-Encoding")
        .map(|v| v.split(',').any(|tok| tok.trim().eq_ignore_ascii_case("deflate")))
        .unwrap_or(false)
}

async fn write_plain<S>(client: &mut AsyncIo<S>, status: u16, text: &str) -> io::Result<u16>
where
    S: Read + Write + Source + AsRawFd,
{
    let body = format!("{status} {text}");
    let resp = Response::new(status).with_fixed_body(body.len(), "text/plain");
    write_response_head(client, &resp).await?;
    async_write_all(client, body.as_bytes()).await?;
    Ok(status)
}

async fn serve_autoindex<S>(client: &mut AsyncIo<S>, dir: &Path, request_path: &str) -> io::Result<u16>
where
    S: Read + Write + Source + AsRawFd,
{
    let mut names: Vec<String> = std::fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();

    let mut body = format!("<html><head><title>Index of {request_path}</title></head><body>\n");
    body.push_str(&format!("<h1>Index of {request_path}</h1>\n<ul>\n"));
    if request_path != "/" {
        body.push_str("<li><a href=\"../\">../</a></li>\n");
    }
    for name in names {
        body.push_str(&format!("<li><a href=\"{name}\">{name}</a></li>\n"));
    }
    body.push_str("</ul></body></html>\n");

    let resp = Response::new(200).with_fixed_body(body.len(), "text/html");
    write_response_head(client, &resp).await?;
    async_write_all(client, body.as_bytes()).await?;
    Ok(200)
}
