use std::collections::{HashMap, HashSet};

/// One `location` block: a URI-prefix route within a server.
#[derive(Debug, Clone)]
pub struct LocationConfig {
    pub path: String,
    pub root: String,
    pub index: String,
    pub methods: HashSet<String>,
    pub autoindex: bool,
    pub redirect: String,
    pub upload_store: String,
    pub cgi_path: String,
    pub cgi_extensions: HashSet<String>,
}

impl Default for LocationConfig {
    fn default() -> Self {
        LocationConfig {
            path: "/".to_string(),
            root: String::new(),
            index: "index.html".to_string(),
            methods: HashSet::new(),
            autoindex: false,
            redirect: String::new(),
            upload_store: String::new(),
            cgi_path: String::new(),
            cgi_extensions: HashSet::new(),
        }
    }
}

impl LocationConfig {
    pub fn method_allowed(&self, method: &str) -> bool {
        self.methods.is_empty() || self.methods.contains(method)
    }

    pub fn is_cgi_target(&self, full_path: &str) -> bool {
        if self.cgi_extensions.is_empty() {
            return false;
        }
        self.cgi_extensions
            .iter()
            .any(|ext| full_path.ends_with(ext.as_str()))
    }
}

/// One `server` block: a virtual server bound to (host, port).
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub server_names: Vec<String>,
    pub error_pages: HashMap<u16, String>,
    pub client_max_body_size: usize,
    pub locations: Vec<LocationConfig>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            host: "0.0.0.0".to_string(),
            port: 8080,
            server_names: Vec::new(),
            error_pages: HashMap::new(),
            client_max_body_size: 1_048_576,
            locations: Vec::new(),
        }
    }
}

impl ServerConfig {
    pub fn matches_host(&self, requested_host: &str) -> bool {
        self.server_names.is_empty() || self.server_names.iter().any(|n| n == requested_host)
    }
}

#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    pub servers: Vec<ServerConfig>,
}
