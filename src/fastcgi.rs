//! FastCGI v1 client (§4.H): one TCP connection per upstream endpoint,
//! multiplexing concurrent requests by request-id. The socket is split
//! into independent read and write halves via `try_clone` on the
//! underlying std socket (two fds, one description) so a single reader
//! task can demultiplex inbound records while any number of request
//! tasks serialize outbound `PARAMS`/`STDIN` writes under one
//! [`crate::rt::sync::AsyncMutex`] — matching §5's "a mutex protects the
//! outbound framing... a condition variable wakes per-request readers".

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::io::{self, Read, Write};
use std::os::fd::AsRawFd;
use std::rc::Rc;

use mio::event::Source;
use mio::net::TcpStream;

use crate::config::ServerConfig;
use crate::http::{
    write_chunk, write_chunked_terminator, write_response_head, BodyReader, HeaderMap, Request, Response,
};
use crate::io::{async_write_all, AsyncIo};
use crate::rt::sync::{AsyncCondvar, AsyncMutex};

const VERSION: u8 = 1;
const TYPE_BEGIN_REQUEST: u8 = 1;
const TYPE_END_REQUEST: u8 = 3;
const TYPE_PARAMS: u8 = 4;
const TYPE_STDIN: u8 = 5;
const TYPE_STDOUT: u8 = 6;
const TYPE_STDERR: u8 = 7;

const ROLE_RESPONDER: u16 = 1;
const FLAG_KEEP_CONN: u8 = 1;

fn encode_header(rec_type: u8, request_id: u16, content_length: u16) -> [u8; 8] {
    let mut b = [0u8; 8];
    b[0] = VERSION;
    b[1] = rec_type;
    b[2..4].copy_from_slice(&request_id.to_be_bytes());
    b[4..6].copy_from_slice(&content_length.to_be_bytes());
    b[6] = 0; // padding-length: this client never pads outbound records.
    b[7] = 0; // reserved
    b
}

fn encode_param_len(len: usize, out: &mut Vec<u8>) {
    if len < 128 {
        out.push(len as u8);
    } else {
        let v = (len as u32) | 0x8000_0000;
        out.extend_from_slice(&v.to_be_bytes());
    }
}

fn encode_params(pairs: &[(String, String)]) -> Vec<u8> {
    let mut out = Vec::new();
    for (k, v) in pairs {
        encode_param_len(k.len(), &mut out);
        encode_param_len(v.len(), &mut out);
        out.extend_from_slice(k.as_bytes());
        out.extend_from_slice(v.as_bytes());
    }
    out
}

/// Per-request mailbox the reader task appends to and the request's own
/// task drains, woken through `condvar`.
struct RequestSlot {
    stdout: VecDeque<u8>,
    ended: bool,
    closed_with_error: bool,
    app_status: u32,
    condvar: AsyncCondvar,
}

impl RequestSlot {
    fn new() -> Self {
        Self {
            stdout: VecDeque::new(),
            ended: false,
            closed_with_error: false,
            app_status: 0,
            condvar: AsyncCondvar::new(),
        }
    }
}

type SlotMap = Rc<RefCell<HashMap<u16, Rc<RefCell<RequestSlot>>>>>;

/// A FastCGI client connection to one upstream. Cloning shares the
/// outbound mutex and the request table, matching §5's "FastCGI
/// connection" shared-resource description.
#[derive(Clone)]
pub struct FastCgiConnection {
    writer: AsyncMutex<AsyncIo<TcpStream>>,
    slots: SlotMap,
}

impl FastCgiConnection {
    /// Connects to `addr` and spawns the connection's single reader
    /// task. The returned connection is ready for concurrent
    /// `handle_fastcgi` calls as soon as this returns.
    pub fn connect(addr: std::net::SocketAddr) -> io::Result<Self> {
        let std_stream = std::net::TcpStream::connect(addr)?;
        std_stream.set_nonblocking(true)?;
        let read_half = std_stream.try_clone()?;
        let writer = AsyncIo::new(TcpStream::from_std(std_stream));
        let reader = AsyncIo::new(TcpStream::from_std(read_half));

        let slots: SlotMap = Rc::new(RefCell::new(HashMap::new()));
        crate::rt::spawn(reader_loop(reader, slots.clone()));

        Ok(Self { writer: AsyncMutex::new(writer), slots })
    }

    /// Smallest request-id `>= 1` not currently occupied by an open
    /// request, per §4.H.
    fn allocate_id(&self) -> u16 {
        let slots = self.slots.borrow();
        let mut id: u16 = 1;
        while slots.contains_key(&id) {
            id += 1;
        }
        id
    }
}

async fn read_exact_into(io: &mut AsyncIo<TcpStream>, buf: &mut [u8]) -> io::Result<()> {
    let mut read = 0;
    while read < buf.len() {
        let n = io.read(&mut buf[read..]).await?;
        if n == 0 {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "fastcgi connection closed mid-record"));
        }
        read += n;
    }
    Ok(())
}

/// The connection's single reader task: demultiplexes every inbound
/// record by request-id for as long as the connection lives. On a read
/// error (upstream closed, reset) every still-open request is marked
/// errored and woken, matching §4.H's "on connection close with open
/// requests, each open request receives an error".
async fn reader_loop(mut io: AsyncIo<TcpStream>, slots: SlotMap) {
    loop {
        let mut header = [0u8; 8];
        if read_exact_into(&mut io, &mut header).await.is_err() {
            break;
        }
        let request_id = u16::from_be_bytes([header[2], header[3]]);
        let content_length = u16::from_be_bytes([header[4], header[5]]);
        let padding_length = header[6];
        let rec_type = header[1];

        let mut content = vec![0u8; content_length as usize];
        if read_exact_into(&mut io, &mut content).await.is_err() {
            break;
        }
        if padding_length > 0 {
            let mut pad = vec![0u8; padding_length as usize];
            if read_exact_into(&mut io, &mut pad).await.is_err() {
                break;
            }
        }

        let slot = slots.borrow().get(&request_id).cloned();
        let Some(slot) = slot else { continue };

        match rec_type {
            TYPE_STDOUT => {
                slot.borrow_mut().stdout.extend(content);
                slot.borrow().condvar.notify_all();
            }
            TYPE_STDERR => {
                proxy_log::trace!("fastcgi stderr: {}", String::from_utf8_lossy(&content));
            }
            TYPE_END_REQUEST => {
                let mut s = slot.borrow_mut();
                if content.len() >= 4 {
                    s.app_status = u32::from_be_bytes([content[0], content[1], content[2], content[3]]);
                }
                s.ended = true;
                drop(s);
                slot.borrow().condvar.notify_all();
            }
            _ => {}
        }
    }

    for slot in slots.borrow().values() {
        let mut s = slot.borrow_mut();
        s.ended = true;
        s.closed_with_error = true;
        drop(s);
        slot.borrow().condvar.notify_all();
    }
}

/// Runs one request end-to-end over `conn`: sends `BEGIN_REQUEST`,
/// streams `PARAMS` and `STDIN` (serialized against any other request
/// sharing the connection), then waits on its own slot until
/// `END_REQUEST`, translating the accumulated stdout into an HTTP
/// response written to `client`.
pub async fn handle_fastcgi<S>(
    client: &mut AsyncIo<S>,
    conn: &FastCgiConnection,
    request: &Request,
    body: &mut BodyReader<'_, S>,
    server: &ServerConfig,
    script_filename: &str,
) -> io::Result<u16>
where
    S: Read + Write + Source + AsRawFd,
{
    let id = conn.allocate_id();
    conn.slots.borrow_mut().insert(id, Rc::new(RefCell::new(RequestSlot::new())));

    let send_result: io::Result<()> = async {
        let mut w = conn.writer.lock().await;

        let mut begin = Vec::new();
        begin.extend_from_slice(&ROLE_RESPONDER.to_be_bytes());
        begin.push(FLAG_KEEP_CONN);
        begin.extend_from_slice(&[0u8; 5]);
        async_write_all(&mut w, &encode_header(TYPE_BEGIN_REQUEST, id, begin.len() as u16)).await?;
        async_write_all(&mut w, &begin).await?;

        let mut params = vec![
            ("SCRIPT_FILENAME".to_string(), script_filename.to_string()),
            ("REQUEST_METHOD".to_string(), request.method.clone()),
            ("SERVER_NAME".to_string(), server.server_name.clone()),
            ("QUERY_STRING".to_string(), request.target.query().unwrap_or("").to_string()),
        ];
        if let Some(ct) = request.headers.get("Content-Type") {
            params.push(("CONTENT_TYPE".to_string(), ct.to_string()));
        }
        if let Some(len) = request.headers.content_length() {
            params.push(("CONTENT_LENGTH".to_string(), len.to_string()));
        }
        for (k, v) in request.headers.iter() {
            params.push((format!("HTTP_{}", k.to_ascii_uppercase().replace('-', "_")), v.to_string()));
        }

        let encoded = encode_params(&params);
        if !encoded.is_empty() {
            async_write_all(&mut w, &encode_header(TYPE_PARAMS, id, encoded.len() as u16)).await?;
            async_write_all(&mut w, &encoded).await?;
        }
        async_write_all(&mut w, &encode_header(TYPE_PARAMS, id, 0)).await?;

        let mut buf = [0u8; 8192];
        loop {
            let n = body.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            async_write_all(&mut w, &encode_header(TYPE_STDIN, id, n as u16)).await?;
            async_write_all(&mut w, &buf[..n]).await?;
        }
        async_write_all(&mut w, &encode_header(TYPE_STDIN, id, 0)).await
    }
    .await;

    if let Err(e) = send_result {
        conn.slots.borrow_mut().remove(&id);
        return Err(e);
    }

    let slot = conn.slots.borrow().get(&id).cloned().expect("slot inserted above");
    let mut stdout_buf = Vec::new();
    loop {
        let (ended, errored, drained) = {
            let mut s = slot.borrow_mut();
            let drained: Vec<u8> = s.stdout.drain(..).collect();
            (s.ended, s.closed_with_error, drained)
        };
        stdout_buf.extend(drained);
        if ended {
            if errored && stdout_buf.is_empty() {
                conn.slots.borrow_mut().remove(&id);
                return write_status_only(client, 502).await;
            }
            break;
        }
        slot.borrow().condvar.wait().await;
    }
    conn.slots.borrow_mut().remove(&id);

    let header_end = stdout_buf
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .map(|p| (p, p + 4))
        .or_else(|| stdout_buf.windows(2).position(|w| w == b"\n\n").map(|p| (p, p + 2)));

    let (status, headers, body_start) = match header_end {
        Some((end, start)) => {
            let text = String::from_utf8_lossy(&stdout_buf[..end]).into_owned();
            let mut headers = HeaderMap::new();
            let mut status = 200u16;
            for line in text.lines() {
                if let Some((k, v)) = line.split_once(':') {
                    let (k, v) = (k.trim(), v.trim());
                    if k.eq_ignore_ascii_case("Status") {
                        status = v.split_whitespace().next().and_then(|s| s.parse().ok()).unwrap_or(200);
                    } else {
                        headers.append(k, v);
                    }
                }
            }
            (status, headers, start)
        }
        None => (200, HeaderMap::new(), 0),
    };
    let app_body = &stdout_buf[body_start..];

    let use_chunked = !headers.has("Content-Length");
    let mut resp = Response::new(status);
    for (k, v) in headers.iter() {
        resp.headers.set(k, v);
    }
    if use_chunked {
        resp.headers.set("Transfer-Encoding", "chunked");
    }
    write_response_head(client, &resp).await?;
    if use_chunked {
        write_chunk(client, app_body).await?;
        write_chunked_terminator(client).await?;
    } else {
        async_write_all(client, app_body).await?;
    }

    Ok(status)
}

async fn write_status_only<S>(client: &mut AsyncIo<S>, status: u16) -> io::Result<u16>
where
    S: Read + Write + Source + AsRawFd,
{
    let resp = Response::new(status);
    write_response_head(client, &resp).await?;
    Ok(status)
}
