use std::fmt;

/// The only two ways route resolution can fail: resolving the *server*
/// never fails (there is always a default/first fallback), so this is
/// route-level only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutingError {
    NotFound,
    MethodNotAllowed,
}

impl fmt::Display for RoutingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoutingError::NotFound => write!(f, "no route matches this path"),
            RoutingError::MethodNotAllowed => write!(f, "route matched but method is not allowed"),
        }
    }
}

impl std::error::Error for RoutingError {}

/// True if `prefix` matches `path` on a segment boundary: `/api` matches
/// `/api` and `/api/v2` but not `/apiextra`. `/` matches everything.
pub fn path_prefix_matches(prefix: &str, path: &str) -> bool {
    if prefix == "/" {
        return true;
    }
    if !path.starts_with(prefix) {
        return false;
    }
    match path.as_bytes().get(prefix.len()) {
        None => true,
        Some(b'/') => true,
        _ => false,
    }
}

pub fn method_allowed(methods: &[String], method: &str) -> bool {
    methods.iter().any(|m| m.eq_ignore_ascii_case(method))
}

/// True if `configured` matches `host`: either an exact, case-insensitive
/// match, or `configured` is a left-anchored one-label wildcard
/// (`*.example.com`) and `host` ends with `.example.com`.
pub fn server_name_matches(configured: &str, host: &str) -> bool {
    if configured.eq_ignore_ascii_case(host) {
        return true;
    }
    if let Some(suffix) = configured.strip_prefix("*.") {
        let host_suffix = format!(".{suffix}");
        return host.len() > host_suffix.len() && host.to_ascii_lowercase().ends_with(&host_suffix.to_ascii_lowercase());
    }
    false
}
