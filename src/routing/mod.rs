//! Routing core: which `ServerConfig` a connection belongs to, and which
//! `RouteConfig` block within it a request resolves to. Generalizes the
//! teacher's flat `Vec<RouteConfig>` scan into a true filter forest —
//! server selection filters on `listen` (host:port) and `server_name`;
//! route selection walks the `routes`/`children` tree depth-first,
//! descending into a block's children only once the block's own
//! path-prefix/method filter accepts, so the deepest fully-accepting
//! chain wins (ties broken by declaration order) — while keeping the
//! same closed filter set the teacher's `find_route` already implemented.

mod block;
mod filter;

pub use block::{ResolvedRoute, RouteTable, ServerTable};
pub use filter::RoutingError;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RouteConfig, ServerConfig};

    fn route(path: &str, methods: &[&str]) -> RouteConfig {
        RouteConfig {
            path: path.to_string(),
            methods: methods.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    fn route_with_root(path: &str, methods: &[&str], root: &str) -> RouteConfig {
        RouteConfig { root: root.to_string(), ..route(path, methods) }
    }

    fn server(name: &str, port: u16, routes: Vec<RouteConfig>) -> ServerConfig {
        ServerConfig {
            server_name: name.to_string(),
            ports: vec![port],
            routes,
            ..Default::default()
        }
    }

    #[test]
    fn picks_longest_path_prefix() {
        let cfg = server(
            "example.com",
            80,
            vec![
                route("/", &["GET"]),
                route("/api", &["GET"]),
                route("/api/v2", &["GET"]),
            ],
        );
        let table = RouteTable::new(&cfg);
        let r = table.resolve("/api/v2/users", "GET").unwrap();
        assert_eq!(r.path, "/api/v2");
    }

    #[test]
    fn declaration_order_breaks_ties() {
        let cfg = server(
            "example.com",
            80,
            vec![route_with_root("/api", &["GET", "POST"], "first"), route_with_root("/api", &["GET", "POST"], "second")],
        );
        let table = RouteTable::new(&cfg);
        let r = table.resolve("/api", "GET").unwrap();
        assert_eq!(r.root, "first");
    }

    #[test]
    fn method_not_allowed_when_prefix_matches_but_method_does_not() {
        let cfg = server("example.com", 80, vec![route("/api", &["GET"])]);
        let table = RouteTable::new(&cfg);
        let err = table.resolve("/api", "DELETE").unwrap_err();
        assert!(matches!(err, RoutingError::MethodNotAllowed));
    }

    #[test]
    fn not_found_when_nothing_matches() {
        let cfg = server("example.com", 80, vec![route("/api", &["GET"])]);
        let table = RouteTable::new(&cfg);
        let err = table.resolve("/other", "GET").unwrap_err();
        assert!(matches!(err, RoutingError::NotFound));
    }

    #[test]
    fn server_selection_prefers_exact_name_then_default_then_first() {
        let a = server("a.example.com", 80, vec![]);
        let mut b = server("b.example.com", 80, vec![]);
        b.default_server = true;
        let servers = vec![a.clone(), b.clone()];
        let table = ServerTable::new(&servers);

        assert_eq!(table.resolve(80, Some("a.example.com")).unwrap().server_name, "a.example.com");
        assert_eq!(table.resolve(80, Some("nope.example.com")).unwrap().server_name, "b.example.com");
        assert_eq!(table.resolve(80, None).unwrap().server_name, "b.example.com");
    }

    #[test]
    fn wildcard_server_name_matches_one_label() {
        let mut wild = server("*.example.com", 80, vec![]);
        wild.default_server = false;
        let servers = vec![wild];
        let table = ServerTable::new(&servers);
        assert_eq!(table.resolve(80, Some("foo.example.com")).unwrap().server_name, "*.example.com");
        assert!(table.resolve(80, Some("example.com")).is_some());
    }

    #[test]
    fn nested_child_block_wins_over_shallower_sibling() {
        // A method-only filter nested two levels under two different
        // path-prefix blocks must out-rank a sibling that only matches
        // on path.
        let mut v2 = route("/api/v2", &[]);
        v2.children = vec![route_with_root("/api/v2", &["POST"], "deep")];
        let cfg = server("example.com", 80, vec![route_with_root("/api", &[], "shallow"), v2]);

        let table = RouteTable::new(&cfg);
        let r = table.resolve("/api/v2/users", "POST").unwrap();
        assert_eq!(r.root, "deep");
    }

    #[test]
    fn handler_less_child_falls_back_to_ancestor_handler() {
        // The matched leaf carries only a method filter; the fastcgi
        // backend is configured two levels up and must still apply.
        let mut grandparent = RouteConfig { fastcgi_pass: Some("127.0.0.1:9000".to_string()), ..route("/app", &[]) };
        let mut parent = route("/app/admin", &[]);
        parent.children = vec![route("/app/admin", &["POST"])];
        grandparent.children = vec![parent];
        let cfg = server("example.com", 80, vec![grandparent]);

        let table = RouteTable::new(&cfg);
        let r = table.resolve("/app/admin/users", "POST").unwrap();
        assert_eq!(r.fastcgi_pass, Some("127.0.0.1:9000"));
    }

    #[test]
    fn non_matching_parent_blocks_its_children_from_matching() {
        let mut parent = route("/only-get", &["GET"]);
        parent.children = vec![route("/only-get", &["POST"])];
        let cfg = server("example.com", 80, vec![parent]);

        let table = RouteTable::new(&cfg);
        let err = table.resolve("/only-get", "POST").unwrap_err();
        assert!(matches!(err, RoutingError::MethodNotAllowed));
    }
}
