//! Server lifecycle (§4.K): one listener per distinct `(host, port)`
//! pair across every configured server block, each running its own
//! `accept` loop; every accepted connection becomes one spawned task.
//! Generalizes the teacher's single hand-rolled `mio::Token` dispatch
//! loop (abandoned mid-file in `bin/main.rs`) into the same
//! task-per-connection shape [`crate::rt`] was built for.

use std::cell::RefCell;
use std::collections::HashMap;
use std::io;
use std::net::{SocketAddr, ToSocketAddrs};
use std::os::fd::AsRawFd;
use std::pin::Pin;
use std::rc::Rc;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use mio::event::Source;
use mio::net::{TcpListener, TcpStream};

use crate::config::{AppConfig, ServerConfig};
use crate::fastcgi::FastCgiConnection;
use crate::handlers;
use crate::http::{parse_request, write_response_head, BodyReader, Request, Response};
use crate::io::{AsyncBufReader, AsyncIo, HalfClose};
use crate::routing::{ResolvedRoute, RouteTable, RoutingError, ServerTable};
use crate::rt::join::{join_all, race2, Either};
use crate::rt::timer::sleep;
use crate::tls::{self, SniResolver, TlsStream};

/// How long a connection may sit after being accepted without a
/// complete request arriving, before it is closed with `408`.
const REQUEST_READ_TIMEOUT: Duration = Duration::from_secs(30);

type FastCgiConns = Rc<RefCell<HashMap<String, FastCgiConnection>>>;

struct AcceptFut<'a> {
    listener: &'a mut TcpListener,
}

impl<'a> std::future::Future for AcceptFut<'a> {
    type Output = io::Result<(TcpStream, SocketAddr)>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match this.listener.accept() {
            Ok(pair) => Poll::Ready(Ok(pair)),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                let fd = this.listener.as_raw_fd();
                let reg = crate::rt::executor::with_reactor(|r| {
                    r.register(this.listener, fd, crate::rt::Direction::Read, cx.waker().clone())
                });
                match reg {
                    Ok(()) | Err(crate::rt::ReactorError::Busy) => Poll::Pending,
                    Err(crate::rt::ReactorError::Io(e)) => Poll::Ready(Err(e)),
                }
            }
            Err(e) => Poll::Ready(Err(e)),
        }
    }
}

fn accept(listener: &mut TcpListener) -> AcceptFut<'_> {
    AcceptFut { listener }
}

/// Runs the server to completion — which, barring every listener
/// accept loop exiting on an unrecoverable error, means forever. A
/// listen endpoint runs TLS (§4.J) iff at least one server block bound
/// to it carries both `ssl_cert` and `ssl_key`; the SNI resolver built
/// for it covers every such block sharing the endpoint.
pub async fn run(config: AppConfig) -> io::Result<()> {
    let config = Rc::new(config);
    let fastcgi_conns: FastCgiConns = Rc::new(RefCell::new(HashMap::new()));

    let mut endpoints: Vec<(String, u16)> = Vec::new();
    for server in &config.servers {
        for port in &server.ports {
            let ep = (server.host.clone(), *port);
            if !endpoints.contains(&ep) {
                endpoints.push(ep);
            }
        }
    }

    let mut loops: Vec<Pin<Box<dyn std::future::Future<Output = ()>>>> = Vec::new();
    for (host, port) in &endpoints {
        let addr: SocketAddr = format!("{host}:{port}")
            .parse()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, format!("bad listen address {host}:{port}: {e}")))?;
        let listener = TcpListener::bind(addr)?;

        let tls_servers: Vec<&ServerConfig> = config
            .servers
            .iter()
            .filter(|s| &s.host == host && s.ports.contains(port) && s.ssl_cert.is_some() && s.ssl_key.is_some())
            .collect();

        if tls_servers.is_empty() {
            proxy_log::info!("listening on {addr}");
            loops.push(Box::pin(accept_loop(listener, *port, config.clone(), fastcgi_conns.clone())));
        } else {
            let tls_config = build_tls_config(&tls_servers)?;
            proxy_log::info!("listening on {addr} (tls)");
            loops.push(Box::pin(accept_loop_tls(listener, *port, tls_config, config.clone(), fastcgi_conns.clone())));
        }
    }

    join_all(loops).await;
    Ok(())
}

/// Builds the shared rustls config for one TLS-enabled listen endpoint,
/// loading every matching server block's certificate and indexing it by
/// `server_name` for SNI dispatch. The first block with `default_server`
/// set wins as the fallback for an unrecognized or absent SNI name;
/// absent that, the first block loaded does.
fn build_tls_config(servers: &[&ServerConfig]) -> io::Result<Arc<rustls::ServerConfig>> {
    let mut by_name = HashMap::new();
    let mut default: Option<Arc<rustls::sign::CertifiedKey>> = None;
    for s in servers {
        let cert_path = s.ssl_cert.as_deref().expect("filtered for ssl_cert");
        let key_path = s.ssl_key.as_deref().expect("filtered for ssl_key");
        let certified = Arc::new(tls::load_certified_key(cert_path, key_path)?);
        if default.is_none() || s.default_server {
            default = Some(certified.clone());
        }
        by_name.insert(s.server_name.clone(), certified);
    }
    let resolver = Arc::new(SniResolver::new(by_name, default.expect("non-empty tls_servers")));
    Ok(tls::server_config(resolver))
}

async fn accept_loop(mut listener: TcpListener, port: u16, config: Rc<AppConfig>, fastcgi_conns: FastCgiConns) {
    loop {
        match accept(&mut listener).await {
            Ok((stream, peer)) => {
                let config = config.clone();
                let fastcgi_conns = fastcgi_conns.clone();
                crate::rt::spawn(async move {
                    let write_half = match stream.try_clone() {
                        Ok(s) => s,
                        Err(e) => {
                            proxy_log::warn!("could not split connection for {peer}: {e}");
                            return;
                        }
                    };
                    handle_connection(stream, write_half, Some(peer), port, config, fastcgi_conns).await;
                });
            }
            Err(e) => {
                proxy_log::error!("accept failed on port {port}: {e}");
                return;
            }
        }
    }
}

/// As [`accept_loop`], but wraps each accepted socket in a rustls server
/// session before splitting it into the read/write halves the connection
/// driver shares across the request (§4.J: "the core treats a TLS socket
/// as a byte-stream implementing the same read/write/shutdown contract
/// as a plain socket").
async fn accept_loop_tls(
    mut listener: TcpListener,
    port: u16,
    tls_config: Arc<rustls::ServerConfig>,
    config: Rc<AppConfig>,
    fastcgi_conns: FastCgiConns,
) {
    loop {
        match accept(&mut listener).await {
            Ok((stream, peer)) => {
                let config = config.clone();
                let fastcgi_conns = fastcgi_conns.clone();
                let tls_config = tls_config.clone();
                crate::rt::spawn(async move {
                    let tls_stream = match TlsStream::new(stream, tls_config) {
                        Ok(s) => s,
                        Err(e) => {
                            proxy_log::warn!("tls handshake setup failed for {peer}: {e}");
                            return;
                        }
                    };
                    let (read_half, write_half) = tls::split(tls_stream);
                    handle_connection(read_half, write_half, Some(peer), port, config, fastcgi_conns).await;
                });
            }
            Err(e) => {
                proxy_log::error!("accept failed on port {port}: {e}");
                return;
            }
        }
    }
}

/// Runs one connection's request/response cycle (§4.K steps 2–7) over
/// whatever stream kind `read_half`/`write_half` are — a plain `TcpStream`
/// pair from [`accept_loop`] or a [`TlsHalf`] pair from
/// [`accept_loop_tls`]. Both halves must be the same concrete type since
/// the handler dispatch below is generic over one `S`.
async fn handle_connection<S>(
    read_half: S,
    write_half: S,
    peer: Option<SocketAddr>,
    local_port: u16,
    config: Rc<AppConfig>,
    fastcgi_conns: FastCgiConns,
) where
    S: io::Read + io::Write + Source + AsRawFd + HalfClose,
{
    let mut reader = AsyncBufReader::new(AsyncIo::new(read_half));
    let mut client = AsyncIo::new(write_half);
    let started = Instant::now();

    let request = match race2(parse_request(&mut reader), sleep(REQUEST_READ_TIMEOUT)).await {
        Either::Left(Ok(req)) => req,
        Either::Left(Err(e)) => {
            let status = e.status_code();
            let _ = write_response_head(&mut client, &Response::new(status)).await;
            finish(&mut client, peer, "-", "-", status, started);
            return;
        }
        Either::Right(()) => {
            let _ = write_response_head(&mut client, &Response::new(408)).await;
            finish(&mut client, peer, "-", "-", 408, started);
            return;
        }
    };

    let host_header = request.headers.get("Host").map(str::to_string);
    let server = match ServerTable::new(&config.servers).resolve(local_port, host_header.as_deref()) {
        Some(s) => s,
        None => {
            let _ = write_response_head(&mut client, &Response::new(404)).await;
            finish(&mut client, peer, &request.method, request.path(), 404, started);
            return;
        }
    };

    let route = match RouteTable::new(server).resolve(request.path(), &request.method) {
        Ok(r) => r,
        Err(RoutingError::NotFound) => {
            let status = handlers::write_error(&mut client, server, 404).await.unwrap_or(404);
            finish(&mut client, peer, &request.method, request.path(), status, started);
            return;
        }
        Err(RoutingError::MethodNotAllowed) => {
            let status = handlers::write_error(&mut client, server, 405).await.unwrap_or(405);
            finish(&mut client, peer, &request.method, request.path(), status, started);
            return;
        }
    };

    let max_body = server.client_max_body_size as u64;
    if let Some(len) = request.headers.content_length() {
        if len as u64 > max_body {
            let status = handlers::write_error(&mut client, server, 413).await.unwrap_or(413);
            finish(&mut client, peer, &request.method, request.path(), status, started);
            return;
        }
    }

    let mut body = BodyReader::for_headers(&mut reader, &request.headers, max_body);
    let result = dispatch(&mut client, &request, &mut body, server, &route, &fastcgi_conns).await;
    let overflowed = body.limit_exceeded();
    drop(body);

    let status = if overflowed {
        413
    } else {
        match result {
            Ok(status) => status,
            Err(e) => {
                proxy_log::error!("handler error for {} {}: {e}", request.method, request.path());
                500
            }
        }
    };

    finish(&mut client, peer, &request.method, request.path(), status, started);
}

/// Dispatches to the backend the resolved route names — exactly one of
/// redirect/proxy/fastcgi/cgi/static applies, per §4.E's closed handler
/// set.
async fn dispatch<S>(
    client: &mut AsyncIo<S>,
    request: &Request,
    body: &mut BodyReader<'_, S>,
    server: &ServerConfig,
    route: &ResolvedRoute<'_>,
    fastcgi_conns: &FastCgiConns,
) -> io::Result<u16>
where
    S: io::Read + io::Write + mio::event::Source + AsRawFd,
{
    if let Some(location) = route.redirection {
        return handlers::redirect::serve(client, location, route.redirect_code).await;
    }

    if let Some(upstream) = route.proxy_pass {
        return crate::proxy::handle_proxy(client, request, body, upstream).await;
    }

    if let Some(upstream) = route.fastcgi_pass {
        let conn = get_or_connect_fastcgi(fastcgi_conns, upstream)?;
        let script_filename = handlers::static_file::resolve_path(route, request.path())
            .to_string_lossy()
            .into_owned();
        return crate::fastcgi::handle_fastcgi(client, &conn, request, body, server, &script_filename).await;
    }

    if let Some(ext) = route.cgi_ext {
        if request.path().contains(ext) {
            let (script_filename, path_info) = resolve_cgi_script(route, request.path(), ext);
            return crate::cgi::handle_cgi(client, request, body, route, server, &script_filename, &path_info).await;
        }
    }

    let path = handlers::static_file::resolve_path(route, request.path());
    handlers::static_file::serve(client, route, &path, request.path(), server, &request.headers).await
}

/// Splits a request path at the end of its CGI-script extension, so
/// `/cgi-bin/report.cgi/2024/q1` resolves to script `report.cgi` with
/// `PATH_INFO=/2024/q1`, per RFC 3875 §4.1.5.
fn resolve_cgi_script(route: &ResolvedRoute<'_>, path: &str, ext: &str) -> (String, String) {
    match path.find(ext) {
        Some(idx) => {
            let split_at = idx + ext.len();
            let (script_path, path_info) = path.split_at(split_at);
            let full = handlers::static_file::resolve_path(route, script_path);
            (full.to_string_lossy().into_owned(), path_info.to_string())
        }
        None => {
            let full = handlers::static_file::resolve_path(route, path);
            (full.to_string_lossy().into_owned(), String::new())
        }
    }
}

fn get_or_connect_fastcgi(cache: &FastCgiConns, upstream: &str) -> io::Result<FastCgiConnection> {
    if let Some(conn) = cache.borrow().get(upstream) {
        return Ok(conn.clone());
    }
    let addr = upstream
        .to_socket_addrs()?
        .next()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, format!("unresolvable fastcgi_pass {upstream}")))?;
    let conn = FastCgiConnection::connect(addr)?;
    cache.borrow_mut().insert(upstream.to_string(), conn.clone());
    Ok(conn)
}

fn finish<S: HalfClose>(
    client: &mut AsyncIo<S>,
    peer: Option<SocketAddr>,
    method: &str,
    path: &str,
    status: u16,
    started: Instant,
) {
    client.get_mut().shutdown_write();
    let peer = peer.map(|a| a.to_string()).unwrap_or_else(|| "-".to_string());
    proxy_log::info!("{peer} \"{method} {path}\" {status} {}ms", started.elapsed().as_millis());
}
