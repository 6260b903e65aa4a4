mod display;
mod lexer;
mod parser;
mod types;
mod validate;

pub use display::display_config;
pub use parser::{parse_config, ConfigError};
pub use types::{AppConfig, LocationConfig, ServerConfig};
pub use validate::validate;

use std::fs;
use std::path::Path;

/// Reads and parses the config file at `path`, then runs the grammar's
/// validation rules over the result.
pub fn load(path: impl AsRef<Path>) -> Result<AppConfig, ConfigError> {
    let path = path.as_ref();
    let src = fs::read_to_string(path).map_err(|e| ConfigError {
        message: format!("could not read '{}': {}", path.display(), e),
        loc: None,
        context: Vec::new(),
    })?;
    let config = parse_config(&src)?;
    validate(&config)?;
    Ok(config)
}
