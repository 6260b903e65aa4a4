use crate::config::{LocationConfig, ServerConfig};

/// Virtual-host selection (spec §4.4.2): among the ServerConfigs bound to
/// the listener's (host, port) — "0.0.0.0" is a wildcard host — pick the
/// first whose `server_names` contains the Host header's hostname; if none
/// match (or a server declares no names at all), the first ServerConfig
/// bound to that pair is the unconditional default.
pub fn find_server<'a>(
    servers: &'a [ServerConfig],
    bound_host: &str,
    bound_port: u16,
    request_host: &str,
) -> Option<&'a ServerConfig> {
    let eligible: Vec<&ServerConfig> = servers
        .iter()
        .filter(|s| s.port == bound_port && (s.host == "0.0.0.0" || s.host == bound_host))
        .collect();
    if eligible.is_empty() {
        return None;
    }
    for server in &eligible {
        if !server.server_names.is_empty() && server.matches_host(request_host) {
            return Some(server);
        }
    }
    Some(eligible[0])
}

/// Longest-prefix match of the request path against each location's `path`;
/// ties go to whichever was declared first. No regex, no trailing-slash
/// normalization here.
pub fn find_location<'a>(
    locations: &'a [LocationConfig],
    path: &str,
) -> Option<&'a LocationConfig> {
    let mut best: Option<&LocationConfig> = None;
    let mut best_len = 0usize;
    for location in locations {
        if path.starts_with(location.path.as_str()) && location.path.len() > best_len {
            best_len = location.path.len();
            best = Some(location);
        }
    }
    best
}
