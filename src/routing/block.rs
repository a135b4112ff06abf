use crate::config::{RouteConfig, ServerConfig};

use super::filter::{method_allowed, path_prefix_matches, server_name_matches, RoutingError};

/// The handler settings a matched block resolves to, after walking back
/// up the matched chain for any field the deepest block left unset.
/// `path`/`root`/`default_file`/`autoindex` always come from the matched
/// leaf itself (every block defaults them); the four backend-selecting
/// fields come from the nearest ancestor (leaf included) that set one,
/// since a handler-less block is just a filter/grouping node.
pub struct ResolvedRoute<'a> {
    pub path: &'a str,
    pub root: &'a str,
    pub default_file: &'a str,
    pub autoindex: bool,
    pub redirection: Option<&'a str>,
    pub redirect_code: Option<u16>,
    pub cgi_ext: Option<&'a str>,
    pub cgi_path: Option<&'a str>,
    pub fastcgi_pass: Option<&'a str>,
    pub proxy_pass: Option<&'a str>,
}

fn has_handler(route: &RouteConfig) -> bool {
    route.redirection.is_some()
        || route.fastcgi_pass.is_some()
        || route.proxy_pass.is_some()
        || (route.cgi_ext.is_some() && route.cgi_path.is_some())
}

/// Builds a [`ResolvedRoute`] from a matched root-to-leaf chain: the
/// nearest ancestor (searching from the leaf back towards the root) that
/// set an explicit backend supplies the handler fields; absent any such
/// ancestor, the leaf's own (handler-less, implicitly-static) settings
/// apply.
pub fn resolve_chain<'a>(chain: &[&'a RouteConfig]) -> ResolvedRoute<'a> {
    let leaf = *chain.last().expect("a matched chain always has at least one block");
    let handler = chain.iter().rev().find(|r| has_handler(r)).copied().unwrap_or(leaf);

    ResolvedRoute {
        path: &leaf.path,
        root: &leaf.root,
        default_file: &leaf.default_file,
        autoindex: leaf.autoindex,
        redirection: handler.redirection.as_deref(),
        redirect_code: handler.redirect_code,
        cgi_ext: handler.cgi_ext.as_deref(),
        cgi_path: handler.cgi_path.as_deref(),
        fastcgi_pass: handler.fastcgi_pass.as_deref(),
        proxy_pass: handler.proxy_pass.as_deref(),
    }
}

#[derive(Default)]
struct Search<'a> {
    best_depth: usize,
    best_chain: Option<Vec<&'a RouteConfig>>,
    path_matched_wrong_method: bool,
}

/// Depth-first walk of the block forest: a block is visited only once
/// every ancestor on its path from the root accepted (§4.E: "matching
/// children are evaluated recursively"). Siblings and children are
/// walked in declaration order, and a later block only displaces the
/// current best on strictly greater depth, so the first-declared block
/// at the winning depth survives ties.
fn walk<'a>(nodes: &'a [RouteConfig], path: &str, method: &str, chain: &mut Vec<&'a RouteConfig>, search: &mut Search<'a>) {
    for node in nodes {
        if !path_prefix_matches(&node.path, path) {
            continue;
        }
        if !(node.methods.is_empty() || method_allowed(&node.methods, method)) {
            search.path_matched_wrong_method = true;
            continue;
        }

        chain.push(node);
        let depth = chain.len();
        if depth > search.best_depth {
            search.best_depth = depth;
            search.best_chain = Some(chain.clone());
        }
        walk(&node.children, path, method, chain, search);
        chain.pop();
    }
}

/// Resolves a request path + method against one server's block forest
/// (`routes`, each possibly nesting `children`). The deepest block whose
/// filter chain (root to leaf) accepts the request wins; ties are broken
/// by declaration order (§4.E).
pub struct RouteTable<'a> {
    routes: &'a [RouteConfig],
}

impl<'a> RouteTable<'a> {
    pub fn new(server: &'a ServerConfig) -> Self {
        Self { routes: &server.routes }
    }

    pub fn resolve(&self, path: &str, method: &str) -> Result<ResolvedRoute<'a>, RoutingError> {
        let mut search = Search::default();
        let mut chain = Vec::new();
        walk(self.routes, path, method, &mut chain, &mut search);

        match search.best_chain {
            Some(chain) => Ok(resolve_chain(&chain)),
            None if search.path_matched_wrong_method => Err(RoutingError::MethodNotAllowed),
            None => Err(RoutingError::NotFound),
        }
    }
}

/// Resolves which `ServerConfig` a connection belongs to, given the local
/// port it was accepted on and the request's `Host` header (absent for
/// HTTP/1.0 clients). Falls back to the block marked `default_server`,
/// then to the first block bound to that port, matching the teacher's
/// virtual-host selection.
pub struct ServerTable<'a> {
    servers: &'a [ServerConfig],
}

impl<'a> ServerTable<'a> {
    pub fn new(servers: &'a [ServerConfig]) -> Self {
        Self { servers }
    }

    pub fn resolve(&self, local_port: u16, host_header: Option<&str>) -> Option<&'a ServerConfig> {
        let on_port: Vec<&ServerConfig> =
            self.servers.iter().filter(|s| s.ports.contains(&local_port)).collect();

        if on_port.is_empty() {
            return None;
        }

        let host = host_header.map(|h| h.split(':').next().unwrap_or(h));

        if let Some(host) = host {
            if let Some(exact) = on_port.iter().find(|s| s.server_name == host) {
                return Some(exact);
            }
            if let Some(wildcard) = on_port.iter().find(|s| server_name_matches(&s.server_name, host)) {
                return Some(wildcard);
            }
        }

        if let Some(default) = on_port.iter().find(|s| s.default_server) {
            return Some(default);
        }

        on_port.first().copied()
    }
}
