//! End-to-end dispatch coverage: selecting a `ServerConfig` by
//! `listen`/`Host` and then a `RouteConfig` within it by path/method,
//! chained the way the connection driver (§4.K step 4) actually calls
//! them. The per-stage behavior of each table alone is already covered
//! by the `#[cfg(test)]` module in `src/routing/mod.rs`.

use server_proxy::config::{RouteConfig, ServerConfig};
use server_proxy::routing::{ResolvedRoute, RoutingError, RouteTable, ServerTable};

fn route(path: &str, methods: &[&str]) -> RouteConfig {
    RouteConfig { path: path.to_string(), methods: methods.iter().map(|s| s.to_string()).collect(), ..Default::default() }
}

fn server(name: &str, port: u16, routes: Vec<RouteConfig>) -> ServerConfig {
    ServerConfig { server_name: name.to_string(), ports: vec![port], routes, ..Default::default() }
}

fn dispatch<'a>(
    servers: &'a [ServerConfig],
    port: u16,
    host: Option<&str>,
    path: &str,
    method: &str,
) -> Result<ResolvedRoute<'a>, RoutingError> {
    let server = ServerTable::new(servers).resolve(port, host).ok_or(RoutingError::NotFound)?;
    RouteTable::new(server).resolve(path, method)
}

#[test]
fn resolves_host_then_longest_prefix() {
    let servers = vec![
        server("example.com", 80, vec![route("/", &["GET"]), route("/a", &["GET"]), route("/a/b", &["GET"])]),
    ];
    let found = dispatch(&servers, 80, Some("example.com"), "/a/b/c", "GET").unwrap();
    assert_eq!(found.path, "/a/b");
}

#[test]
fn unconfigured_path_still_falls_back_to_root_block() {
    let servers = vec![server("example.com", 80, vec![route("/", &["GET"])])];
    let found = dispatch(&servers, 80, Some("example.com"), "/unconfigured", "GET").unwrap();
    assert_eq!(found.path, "/");
}

#[test]
fn wrong_method_on_matching_path_is_method_not_allowed() {
    let servers = vec![server("example.com", 80, vec![route("/", &["GET"])])];
    let err = dispatch(&servers, 80, Some("example.com"), "/", "POST").unwrap_err();
    assert!(matches!(err, RoutingError::MethodNotAllowed));
}

#[test]
fn unknown_host_on_a_single_virtual_host_port_falls_back_to_only_server() {
    // With one server bound to the port and no default_server marked, the
    // unmatched Host still resolves to that sole block (`ServerTable`'s
    // "first block on the port" fallback) — the distinctive host-miss
    // behavior only shows up once a second server shares the port.
    let servers = vec![server("example.com", 80, vec![route("/", &["GET"])])];
    let found = dispatch(&servers, 80, Some("otherhost"), "/", "GET").unwrap();
    assert_eq!(found.path, "/");
}

#[test]
fn unknown_host_among_multiple_virtual_hosts_picks_default_server() {
    let mut b = server("b.example.com", 80, vec![route("/b-only", &["GET"])]);
    b.default_server = true;
    let servers = vec![server("a.example.com", 80, vec![route("/a-only", &["GET"])]), b];
    let err = dispatch(&servers, 80, Some("nope.example.com"), "/a-only", "GET").unwrap_err();
    assert!(matches!(err, RoutingError::NotFound));
}

#[test]
fn no_server_bound_to_the_requested_port_is_not_found() {
    let servers = vec![server("example.com", 80, vec![route("/", &["GET"])])];
    let err = dispatch(&servers, 443, Some("example.com"), "/", "GET").unwrap_err();
    assert!(matches!(err, RoutingError::NotFound));
}

#[test]
fn path_outside_every_configured_prefix_is_not_found() {
    let servers = vec![server("example.com", 80, vec![route("/a", &["GET"])])];
    let err = dispatch(&servers, 80, Some("example.com"), "/b", "GET").unwrap_err();
    assert!(matches!(err, RoutingError::NotFound));
}
