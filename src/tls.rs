//! TLS adapter (§4.J): wraps a byte-stream socket in a rustls session the
//! same way [`crate::cgi::Pipe`] wraps a raw fd — `Read`/`Write` pump TLS
//! records through the underlying socket, `Source` delegates registration
//! to it unchanged, so [`crate::io::AsyncIo`] drives a TLS connection
//! exactly like a plaintext one. The read/process/write loop follows
//! rustls's own non-blocking-socket integration pattern (as documented in
//! its `tlsserver`/`tlsclient` examples); SNI dispatch is built on
//! `rustls::server::ResolvesServerCert`.

use std::cell::RefCell;
use std::collections::HashMap;
use std::io::{self, Read, Write};
use std::os::fd::{AsRawFd, RawFd};
use std::rc::Rc;
use std::sync::Arc;

use mio::event::Source;
use mio::unix::SourceFd;
use mio::{Interest, Registry, Token};
use rustls::server::{ClientHello, ResolvesServerCert};
use rustls::sign::CertifiedKey;
use rustls::{ServerConfig, ServerConnection};

/// Resolves a TLS server certificate by SNI against a pre-built,
/// read-only map (§5: "TLS server name map: read-only after build; safe
/// to share"). `default` backs connections with no SNI extension or with
/// a name this map doesn't recognize — mirrors `ServerTable::resolve`'s
/// fallback-to-first-server behavior in [`crate::routing`].
pub struct SniResolver {
    by_name: HashMap<String, Arc<CertifiedKey>>,
    default: Arc<CertifiedKey>,
}

impl SniResolver {
    pub fn new(by_name: HashMap<String, Arc<CertifiedKey>>, default: Arc<CertifiedKey>) -> Self {
        Self { by_name, default }
    }
}

impl std::fmt::Debug for SniResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SniResolver").field("names", &self.by_name.keys().collect::<Vec<_>>()).finish()
    }
}

impl ResolvesServerCert for SniResolver {
    fn resolve(&self, client_hello: ClientHello<'_>) -> Option<Arc<CertifiedKey>> {
        let name = client_hello.server_name()?;
        Some(self.by_name.get(name).cloned().unwrap_or_else(|| self.default.clone()))
    }
}

/// Loads a certificate chain + private key from PEM files and builds the
/// `CertifiedKey` a [`SniResolver`] entry needs.
pub fn load_certified_key(cert_path: &str, key_path: &str) -> io::Result<CertifiedKey> {
    let cert_file = std::fs::File::open(cert_path)?;
    let mut cert_reader = io::BufReader::new(cert_file);
    let chain: Vec<_> = rustls_pemfile::certs(&mut cert_reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

    let key_file = std::fs::File::open(key_path)?;
    let mut key_reader = io::BufReader::new(key_file);
    let key = rustls_pemfile::private_key(&mut key_reader)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "no private key found"))?;

    let signing_key = rustls::crypto::ring::sign::any_supported_type(&key)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    Ok(CertifiedKey::new(chain, signing_key))
}

/// Builds the shared `rustls::ServerConfig` every TLS-enabled listener
/// uses, with SNI resolution supplied by `resolver`.
pub fn server_config(resolver: Arc<SniResolver>) -> Arc<ServerConfig> {
    let mut config = ServerConfig::builder().with_no_client_auth().with_cert_resolver(resolver);
    config.alpn_protocols = vec![b"http/1.1".to_vec()];
    Arc::new(config)
}

/// Which direction(s) of a connection a half-close affects, mirrored
/// from `std::net::Shutdown` but named for TLS semantics: a read
/// half-close just drops whatever plaintext is buffered, a write
/// half-close sends `close_notify`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shutdown {
    Read,
    Write,
    Both,
}

/// A rustls server session layered over any `Read + Write + Source +
/// AsRawFd` byte stream. `S` is almost always `mio::net::TcpStream`, but
/// nothing here assumes that — the same wrapper would work over a Unix
/// socket.
pub struct TlsStream<S> {
    sock: S,
    conn: ServerConnection,
}

impl<S: Read + Write + AsRawFd> TlsStream<S> {
    pub fn new(sock: S, config: Arc<ServerConfig>) -> io::Result<Self> {
        let conn = ServerConnection::new(config).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        Ok(Self { sock, conn })
    }

    /// Pulls ciphertext off the socket and feeds it to rustls until
    /// either plaintext becomes available or the socket would block.
    /// Called in a loop by `Read::read` since one `read_tls` may only
    /// advance the handshake without yielding application data yet.
    fn fill_plaintext(&mut self) -> io::Result<()> {
        loop {
            if self.conn.wants_write() {
                self.flush_tls()?;
            }
            match self.conn.read_tls(&mut self.sock) {
                Ok(0) => return Ok(()),
                Ok(_) => {}
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Err(e),
                Err(e) => return Err(e),
            }
            let state = self
                .conn
                .process_new_packets()
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
            if state.plaintext_bytes_to_read() > 0 || !self.conn.wants_read() {
                return Ok(());
            }
        }
    }

    /// Drains whatever TLS records rustls has queued (handshake
    /// messages, alerts, or ciphertext from a prior `Write::write`) out
    /// to the socket.
    fn flush_tls(&mut self) -> io::Result<()> {
        while self.conn.wants_write() {
            match self.conn.write_tls(&mut self.sock) {
                Ok(_) => {}
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Err(e),
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Performs the half-close semantics §4.J specifies.
    pub fn shutdown(&mut self, how: Shutdown) -> io::Result<()> {
        match how {
            Shutdown::Read => {
                let mut discard = [0u8; 4096];
                while self.conn.reader().read(&mut discard).unwrap_or(0) > 0 {}
                Ok(())
            }
            Shutdown::Write => {
                self.conn.send_close_notify();
                self.flush_tls()?;
                self.sock.flush()
            }
            Shutdown::Both => {
                self.shutdown(Shutdown::Read)?;
                self.shutdown(Shutdown::Write)
            }
        }
    }
}

impl<S: Read + Write + AsRawFd> Read for TlsStream<S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.conn.reader().read(buf) {
            Ok(0) if self.conn.wants_read() => {
                self.fill_plaintext()?;
                self.conn.reader().read(buf)
            }
            other => other,
        }
    }
}

impl<S: Read + Write + AsRawFd> Write for TlsStream<S> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.conn.writer().write(buf)?;
        self.flush_tls()?;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.flush_tls()?;
        self.sock.flush()
    }
}

impl<S: AsRawFd> AsRawFd for TlsStream<S> {
    fn as_raw_fd(&self) -> RawFd {
        self.sock.as_raw_fd()
    }
}

impl<S: AsRawFd> Source for TlsStream<S> {
    fn register(&mut self, registry: &Registry, token: Token, interests: Interest) -> io::Result<()> {
        SourceFd(&self.sock.as_raw_fd()).register(registry, token, interests)
    }
    fn reregister(&mut self, registry: &Registry, token: Token, interests: Interest) -> io::Result<()> {
        SourceFd(&self.sock.as_raw_fd()).reregister(registry, token, interests)
    }
    fn deregister(&mut self, registry: &Registry) -> io::Result<()> {
        SourceFd(&self.sock.as_raw_fd()).deregister(registry)
    }
}

/// Closes the underlying socket outright — used when a handshake fails
/// before any [`AsyncIo`](crate::io::AsyncIo) wrapper has been built
/// around the stream, so there's nothing for `Shutdown::Both` to clean
/// up on the rustls side.
pub fn hard_close<S: AsRawFd>(sock: &S) {
    let fd = sock.as_raw_fd();
    unsafe {
        libc::shutdown(fd, libc::SHUT_RDWR);
    }
}

/// One of a [`TlsStream`]'s two logical halves. Unlike a plain TCP socket
/// (which the connection driver splits with `try_clone` into two
/// independent kernel file descriptions), one rustls session is one state
/// machine — so both halves here share it through a `Rc<RefCell<_>>`
/// instead. This is sound under the cooperative scheduler's "exactly one
/// poll runs at a time" rule the same way [`crate::rt::sync::AsyncMutex`]
/// relies on it: a half's `read`/`write` never holds the borrow across an
/// `.await`, so two halves are never inside the `RefCell` simultaneously.
pub struct TlsHalf<S> {
    shared: Rc<RefCell<TlsStream<S>>>,
}

impl<S> Clone for TlsHalf<S> {
    fn clone(&self) -> Self {
        Self { shared: self.shared.clone() }
    }
}

/// Wraps `stream` in a TLS session and returns two handles onto it — one
/// for the connection driver's buffered reader, one for its writer —
/// mirroring the shape `handle_connection` already uses for plaintext
/// `TcpStream::try_clone`.
pub fn split<S: Read + Write + AsRawFd>(stream: TlsStream<S>) -> (TlsHalf<S>, TlsHalf<S>) {
    let shared = Rc::new(RefCell::new(stream));
    (TlsHalf { shared: shared.clone() }, TlsHalf { shared })
}

impl<S: Read + Write + AsRawFd> TlsHalf<S> {
    /// Runs §4.J's half-close sequence on the underlying session. Either
    /// half may call this; there is only one session to shut down.
    pub fn shutdown(&self, how: Shutdown) -> io::Result<()> {
        self.shared.borrow_mut().shutdown(how)
    }
}

impl<S: Read + Write + AsRawFd> Read for TlsHalf<S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.shared.borrow_mut().read(buf)
    }
}

impl<S: Read + Write + AsRawFd> Write for TlsHalf<S> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.shared.borrow_mut().write(buf)
    }
    fn flush(&mut self) -> io::Result<()> {
        self.shared.borrow_mut().flush()
    }
}

impl<S: AsRawFd> AsRawFd for TlsHalf<S> {
    fn as_raw_fd(&self) -> RawFd {
        self.shared.borrow().as_raw_fd()
    }
}

impl<S: AsRawFd> Source for TlsHalf<S> {
    fn register(&mut self, registry: &Registry, token: Token, interests: Interest) -> io::Result<()> {
        SourceFd(&self.as_raw_fd()).register(registry, token, interests)
    }
    fn reregister(&mut self, registry: &Registry, token: Token, interests: Interest) -> io::Result<()> {
        SourceFd(&self.as_raw_fd()).reregister(registry, token, interests)
    }
    fn deregister(&mut self, registry: &Registry) -> io::Result<()> {
        SourceFd(&self.as_raw_fd()).deregister(registry)
    }
}

impl<S: Read + Write + AsRawFd> crate::io::HalfClose for TlsHalf<S> {
    fn shutdown_write(&mut self) {
        let _ = TlsHalf::shutdown(self, Shutdown::Write);
    }
}
