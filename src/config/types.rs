use parser_derive::YamlStruct;
use std::collections::HashMap;

// --- Constants ---
pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_SERVER_NAME: &str = "_";
pub const DEFAULT_MAX_BODY_SIZE: usize = 1_048_576; // 1MB
pub const DEFAULT_ROUTE_PATH: &str = "/";
pub const DEFAULT_ROOT: &str = "./www";
pub const DEFAULT_FILE: &str = "index.html";

/// One node of the routing forest: a path-prefix (and method) filter,
/// optional inline handler settings, and any number of nested child
/// blocks refining it further. Exactly one of `redirection`, `cgi_path`,
/// `fastcgi_pass`, `proxy_pass` is expected to be set on the block that
/// ultimately serves a request; a block with none of them is a
/// static-file block rooted at `root`. A block with no handler fields of
/// its own still matches and still holds children — request resolution
/// walks back up the matched chain to the nearest ancestor that supplies
/// a handler (`routing::block::resolve_chain`).
#[derive(Debug, Clone, YamlStruct)]
pub struct RouteConfig {
    #[field(default = "/")]
    pub path: String,
    #[field(default = "[GET, HEAD]")]
    pub methods: Vec<String>,
    pub redirection: Option<String>,
    pub redirect_code: Option<u16>,
    #[field(default = "./www")]
    pub root: String,
    #[field(default = "index.html")]
    pub default_file: String,
    #[field(default = "false")]
    pub autoindex: bool,
    pub cgi_ext: Option<String>,
    pub cgi_path: Option<String>,
    pub fastcgi_pass: Option<String>,
    pub proxy_pass: Option<String>,
    #[field(default = "[]")]
    pub children: Vec<RouteConfig>,
}

impl Default for RouteConfig {
    fn default() -> Self {
        Self {
            path: DEFAULT_ROUTE_PATH.to_string(),
            methods: vec!["GET".to_string(), "HEAD".to_string()],
            redirection: None,
            redirect_code: None,
            root: DEFAULT_ROOT.to_string(),
            default_file: DEFAULT_FILE.to_string(),
            autoindex: false,
            cgi_ext: None,
            cgi_path: None,
            fastcgi_pass: None,
            proxy_pass: None,
            children: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, YamlStruct)]
pub struct AppConfig {
    pub servers: Vec<ServerConfig>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            servers: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, YamlStruct)]
pub struct ServerConfig {
    #[field(default = "127.0.0.1")]
    pub host: String,
    #[field(default = "[8080]")]
    pub ports: Vec<u16>,
    #[field(default = "_")]
    pub server_name: String,
    #[field(default = "false")]
    pub default_server: bool,
    #[field(default = "{}")]
    pub error_pages: HashMap<u16, String>,
    #[field(default = "1048576")]
    pub client_max_body_size: usize,
    #[field(default = "./www")]
    pub root: String,
    #[field(default = "[]")]
    pub routes: Vec<RouteConfig>,
    pub ssl_cert: Option<String>,
    pub ssl_key: Option<String>,
    /// Per-extension content-encoding policy (§3 "per-extension encoding
    /// policies"): file extensions (without the leading dot) the static
    /// handler is allowed to serve `Content-Encoding: deflate` for when
    /// the client's `Accept-Encoding` permits it.
    #[field(default = "[]")]
    pub deflate_extensions: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            ports: vec![DEFAULT_PORT],
            server_name: DEFAULT_SERVER_NAME.to_string(),
            default_server: false,
            error_pages: HashMap::new(),
            client_max_body_size: DEFAULT_MAX_BODY_SIZE,
            root: DEFAULT_ROOT.to_string(),
            routes: Vec::new(),
            ssl_cert: None,
            ssl_key: None,
            deflate_extensions: Vec::new(),
        }
    }
}
