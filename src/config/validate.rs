use super::parser::ConfigError;
use super::types::AppConfig;

/// Applies the rejection rules from the configuration grammar: no server
/// blocks, ports outside 1..65535, a location missing `root`, and `cgi_pass`
/// without `cgi_ext`. Any violation fails the whole config load — unlike the
/// "drop the offending server and keep going" style some loaders use, a
/// config naming an interpreter with no extension to dispatch it on, or a
/// location with nowhere to serve files from, is a startup error here.
pub fn validate(config: &AppConfig) -> Result<(), ConfigError> {
    if config.servers.is_empty() {
        return Err(ConfigError {
            message: "no server blocks declared".to_string(),
            loc: None,
            context: Vec::new(),
        });
    }

    for server in &config.servers {
        if server.port == 0 {
            return Err(ConfigError {
                message: format!(
                    "server '{}' has port {} outside 1..65535",
                    server.host, server.port
                ),
                loc: None,
                context: Vec::new(),
            });
        }

        for location in &server.locations {
            if location.root.is_empty() {
                return Err(ConfigError {
                    message: format!("location '{}' has no 'root' directive", location.path),
                    loc: None,
                    context: Vec::new(),
                });
            }
            if !location.cgi_path.is_empty() && location.cgi_extensions.is_empty() {
                return Err(ConfigError {
                    message: format!(
                        "location '{}' sets 'cgi_pass' without any 'cgi_ext'",
                        location.path
                    ),
                    loc: None,
                    context: Vec::new(),
                });
            }
        }
    }

    Ok(())
}
