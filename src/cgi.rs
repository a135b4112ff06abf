//! CGI handler (§4.G): spawns a child process per request, bridges its
//! stdin/stdout/stderr to the client connection as three concurrently
//! scheduled subtasks on the same executor, and translates the CGI
//! header convention (`Status:`, `Location:`) into an HTTP response.
//! Generalizes the teacher's socketpair-based `ActiveAction::Cgi` (driven
//! by hand through `handle_cgi_event` off the connection's mio `Token`)
//! into a structured-concurrency bridge using [`crate::rt::join::join3`].

use std::cell::Cell;
use std::io::{self, Read, Write};
use std::os::fd::{AsRawFd, FromRawFd, RawFd};
use std::process::{Child, Command, Stdio};

use mio::event::Source;
use mio::unix::SourceFd;
use mio::{Interest, Registry, Token};

use crate::config::ServerConfig;
use crate::routing::ResolvedRoute;
use crate::http::{
    write_chunk, write_chunked_terminator, write_response_head, BodyReader, HeaderMap, Request,
    Response,
};
use crate::io::{async_write_all, AsyncIo};
use crate::rt::join::join3;
use crate::rt::process::wait_pid;

/// One end of a pipe, wired into the reactor the same way a `TcpStream`
/// is: `Read`/`Write` go straight to the fd, `Source` registration is
/// delegated to `SourceFd`. `mio::unix::pipe` would do this for us, but
/// this core already owns a raw-fd adapter pattern at every other stream
/// boundary (see [`crate::io::AsyncIo`]'s doc comment), so a pipe is just
/// another fd wearing the same three traits.
pub struct Pipe(std::fs::File);

impl Pipe {
    fn from_raw(fd: RawFd) -> Self {
        Pipe(unsafe { std::fs::File::from_raw_fd(fd) })
    }
}

impl Read for Pipe {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.read(buf)
    }
}

impl Write for Pipe {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.write(buf)
    }
    fn flush(&mut self) -> io::Result<()> {
        self.0.flush()
    }
}

impl AsRawFd for Pipe {
    fn as_raw_fd(&self) -> RawFd {
        self.0.as_raw_fd()
    }
}

impl Source for Pipe {
    fn register(&mut self, registry: &Registry, token: Token, interests: Interest) -> io::Result<()> {
        SourceFd(&self.0.as_raw_fd()).register(registry, token, interests)
    }
    fn reregister(&mut self, registry: &Registry, token: Token, interests: Interest) -> io::Result<()> {
        SourceFd(&self.0.as_raw_fd()).reregister(registry, token, interests)
    }
    fn deregister(&mut self, registry: &Registry) -> io::Result<()> {
        SourceFd(&self.0.as_raw_fd()).deregister(registry)
    }
}

fn set_nonblocking(fd: RawFd) -> io::Result<()> {
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
    if flags < 0 {
        return Err(io::Error::last_os_error());
    }
    if unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) } < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

fn set_cloexec(fd: RawFd) -> io::Result<()> {
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFD) };
    if flags < 0 {
        return Err(io::Error::last_os_error());
    }
    if unsafe { libc::fcntl(fd, libc::F_SETFD, flags | libc::FD_CLOEXEC) } < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Creates a pipe and returns `(our_end, child_end)`. Only `our_end` is
/// made non-blocking and close-on-exec: the child's end must stay a
/// plain blocking fd, since an ordinary CGI script doing blocking stdio
/// has no idea what `EAGAIN` means.
fn pipe_pair() -> io::Result<(Pipe, std::fs::File)> {
    let mut fds = [0 as RawFd; 2];
    if unsafe { libc::pipe(fds.as_mut_ptr()) } != 0 {
        return Err(io::Error::last_os_error());
    }
    let (read_fd, write_fd) = (fds[0], fds[1]);
    let our_end = Pipe::from_raw(read_fd);
    set_nonblocking(our_end.as_raw_fd())?;
    set_cloexec(our_end.as_raw_fd())?;
    let child_end = unsafe { std::fs::File::from_raw_fd(write_fd) };
    Ok((our_end, child_end))
}

/// As [`pipe_pair`], but with the roles swapped: `our_end` is the write
/// side (for feeding the child's stdin), `child_end` the read side.
fn pipe_pair_reversed() -> io::Result<(Pipe, std::fs::File)> {
    let mut fds = [0 as RawFd; 2];
    if unsafe { libc::pipe(fds.as_mut_ptr()) } != 0 {
        return Err(io::Error::last_os_error());
    }
    let (read_fd, write_fd) = (fds[0], fds[1]);
    let our_end = Pipe::from_raw(write_fd);
    set_nonblocking(our_end.as_raw_fd())?;
    set_cloexec(our_end.as_raw_fd())?;
    let child_end = unsafe { std::fs::File::from_raw_fd(read_fd) };
    Ok((our_end, child_end))
}

/// Builds the CGI/1.1 environment per RFC 3875 §4: request metadata,
/// `REDIRECT_STATUS=200` (required by some CGI runtimes that otherwise
/// refuse to execute outside a "real" redirected request), and one
/// `HTTP_<NAME>` variable per request header.
pub fn build_cgi_env(
    request: &Request,
    script_filename: &str,
    path_info: &str,
    server: &ServerConfig,
) -> Vec<(String, String)> {
    let headers = &request.headers;
    let mut env = Vec::new();
    env.push(("GATEWAY_INTERFACE".into(), "CGI/1.1".into()));
    env.push(("SERVER_PROTOCOL".into(), request.version.to_string()));
    env.push(("SERVER_SOFTWARE".into(), "server_proxy".into()));
    env.push(("SERVER_NAME".into(), server.server_name.clone()));
    env.push(("REQUEST_METHOD".into(), request.method.clone()));
    env.push(("SCRIPT_FILENAME".into(), script_filename.to_string()));
    env.push(("PATH_INFO".into(), path_info.to_string()));
    env.push(("QUERY_STRING".into(), request.target.query().unwrap_or("").to_string()));
    env.push(("REDIRECT_STATUS".into(), "200".to_string()));

    if let Some(len) = headers.content_length() {
        env.push(("CONTENT_LENGTH".into(), len.to_string()));
    }
    if let Some(ct) = headers.get("Content-Type") {
        env.push(("CONTENT_TYPE".into(), ct.to_string()));
    }

    for (k, v) in headers.iter() {
        if k.eq_ignore_ascii_case("Content-Type") || k.eq_ignore_ascii_case("Content-Length") {
            continue;
        }
        let env_key = format!("HTTP_{}", k.to_ascii_uppercase().replace('-', "_"));
        env.push((env_key, v.to_string()));
    }

    env
}

/// Splits CGI output headers (`Status:`/`Location:`/pass-through) out of
/// the accumulated header-block text. A `Location:` with no explicit
/// `Status:` implies a `302` local redirect, per the CGI convention.
fn translate_cgi_headers(raw: &str) -> (u16, String, HeaderMap) {
    let mut status = 200u16;
    let mut reason = None;
    let mut headers = HeaderMap::new();
    let mut saw_location = false;

    for line in raw.lines() {
        let Some((key, value)) = line.split_once(':') else { continue };
        let key = key.trim();
        let value = value.trim();
        if key.eq_ignore_ascii_case("Status") {
            let mut parts = value.splitn(2, ' ');
            status = parts.next().and_then(|s| s.parse().ok()).unwrap_or(200);
            reason = parts.next().map(|s| s.to_string());
        } else {
            if key.eq_ignore_ascii_case("Location") {
                saw_location = true;
            }
            headers.append(key, value);
        }
    }

    if saw_location && reason.is_none() {
        status = 302;
    }
    let reason = reason.unwrap_or_else(|| crate::http::reason_phrase(status).to_string());
    (status, reason, headers)
}

/// Finds `\r\n\r\n` or `\n\n`, returning `(header_end, body_start)` —
/// CGI headers accept either line terminator, unlike the HTTP wire
/// grammar (§4.D).
fn find_header_end(buf: &[u8]) -> Option<(usize, usize)> {
    if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
        return Some((pos, pos + 4));
    }
    buf.windows(2).position(|w| w == b"\n\n").map(|pos| (pos, pos + 2))
}

/// Reads CGI output off `stdout` until the header block's terminating
/// blank line, returning the parsed status/reason/headers plus whatever
/// body bytes had already arrived in the same read.
async fn read_cgi_headers(stdout: &mut AsyncIo<Pipe>) -> io::Result<(u16, String, HeaderMap, Vec<u8>)> {
    let mut raw = Vec::new();
    let mut buf = [0u8; 4096];
    loop {
        if let Some((end, body_start)) = find_header_end(&raw) {
            let header_text = String::from_utf8_lossy(&raw[..end]).into_owned();
            let (status, reason, headers) = translate_cgi_headers(&header_text);
            return Ok((status, reason, headers, raw[body_start..].to_vec()));
        }
        let n = stdout.read(&mut buf).await?;
        if n == 0 {
            let header_text = String::from_utf8_lossy(&raw).into_owned();
            let (status, reason, headers) = translate_cgi_headers(&header_text);
            return Ok((status, reason, headers, Vec::new()));
        }
        raw.extend_from_slice(&buf[..n]);
    }
}

/// Runs a CGI request to completion, writing the translated response
/// (head and body) directly to `client`. `script_filename` is the
/// resolved on-disk path to the script; `path_info` is whatever remained
/// of the request path past the script's own prefix. Returns the status
/// actually sent, so the caller can write the access log line.
pub async fn handle_cgi<S>(
    client: &mut AsyncIo<S>,
    request: &Request,
    body: &mut BodyReader<'_, S>,
    route: &ResolvedRoute<'_>,
    server: &ServerConfig,
    script_filename: &str,
    path_info: &str,
) -> io::Result<u16>
where
    S: Read + Write + Source + AsRawFd,
{
    let (our_stdin, child_stdin) = pipe_pair_reversed()?;
    let (our_stdout, child_stdout) = pipe_pair()?;
    let (our_stderr, child_stderr) = pipe_pair()?;
    let mut stdin_io = AsyncIo::new(our_stdin);
    let mut stdout_io = AsyncIo::new(our_stdout);
    let mut stderr_io = AsyncIo::new(our_stderr);

    let env = build_cgi_env(request, script_filename, path_info, server);

    let mut cmd = match route.cgi_path {
        Some(bin) => {
            let mut c = Command::new(bin);
            c.arg(script_filename);
            c
        }
        None => Command::new(script_filename),
    };
    cmd.current_dir(route.root);
    cmd.env_clear();
    for (k, v) in &env {
        cmd.env(k, v);
    }
    cmd.stdin(Stdio::from(child_stdin));
    cmd.stdout(Stdio::from(child_stdout));
    cmd.stderr(Stdio::from(child_stderr));

    let mut child: Child = cmd.spawn()?;

    let sent_status = Cell::new(0u16);

    let pump_stdin = async {
        let mut buf = [0u8; 8192];
        loop {
            let n = match body.read(&mut buf).await {
                Ok(n) => n,
                Err(_) => break,
            };
            if n == 0 {
                break;
            }
            if async_write_all(&mut stdin_io, &buf[..n]).await.is_err() {
                break;
            }
        }
        // Dropping the pipe closes our write end, signalling EOF to the
        // child's stdin.
        drop(stdin_io);
    };

    let pump_stderr = async {
        let mut buf = [0u8; 4096];
        loop {
            match stderr_io.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(n) => proxy_log::trace!("cgi stderr: {}", String::from_utf8_lossy(&buf[..n])),
            }
        }
    };

    let pump_stdout = async {
        let (status, reason, headers, leftover) = match read_cgi_headers(&mut stdout_io).await {
            Ok(v) => v,
            Err(_) => (502, crate::http::reason_phrase(502).to_string(), HeaderMap::new(), Vec::new()),
        };

        let use_chunked = !headers.has("Content-Length");
        let mut resp = Response::with_reason(status, reason);
        for (k, v) in headers.iter() {
            resp.headers.set(k, v);
        }
        if use_chunked {
            resp.headers.set("Transfer-Encoding", "chunked");
        }

        if write_response_head(client, &resp).await.is_err() {
            return;
        }
        // Only mark a head as committed once it has actually gone out, so
        // the post-`wait_pid` fallback below can tell "no response sent
        // yet" from "a response was sent with no body".
        sent_status.set(status);

        if !leftover.is_empty() {
            let res = if use_chunked {
                write_chunk(client, &leftover).await
            } else {
                async_write_all(client, &leftover).await
            };
            if res.is_err() {
                return;
            }
        }

        let mut buf = [0u8; 8192];
        loop {
            match stdout_io.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    let res = if use_chunked {
                        write_chunk(client, &buf[..n]).await
                    } else {
                        async_write_all(client, &buf[..n]).await
                    };
                    if res.is_err() {
                        break;
                    }
                }
            }
        }
        if use_chunked {
            let _ = write_chunked_terminator(client).await;
        }
    };

    join3(pump_stdin, pump_stdout, pump_stderr).await;

    let exit = wait_pid(&mut child).await?;

    if !exit.success() && sent_status.get() == 0 {
        let resp = Response::new(502);
        write_response_head(client, &resp).await?;
        return Ok(502);
    }

    Ok(if sent_status.get() == 0 { 200 } else { sent_status.get() })
}
