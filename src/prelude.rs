pub use crate::config::{AppConfig, LocationConfig, ServerConfig};
pub use crate::error::Result;
pub use crate::http::*;

pub use mio::{
    event::Event,
    net::{TcpListener, TcpStream},
    Events, Interest, Poll, Token,
};
pub use proxy_log::{debug, errors as error, info, trace, warn};
pub use std::collections::HashMap;
pub use std::fs::{self, File, OpenOptions};
pub use std::io::{ErrorKind, Read, Write};
pub use std::net::SocketAddr;
pub use std::os::unix::fs::MetadataExt;
pub use std::path::{Path, PathBuf};
pub use std::sync::Arc;
pub use std::time::Duration;
pub use std::time::Instant;

pub use std::{
    fmt::{self, Display},
    io,
    str::FromStr,
    time::SystemTime,
};

pub use crate::server::Server;

pub const READ_BUF_SIZE: usize = 4096;

// 2xx
pub const HTTP_OK: u16 = 200;
pub const HTTP_NO_CONTENT: u16 = 204;

// 3xx
pub const HTTP_MOVED_PERMANENTLY: u16 = 301;
pub const HTTP_SEE_OTHER: u16 = 303;

// 4xx
pub const HTTP_BAD_REQUEST: u16 = 400;
pub const HTTP_FORBIDDEN: u16 = 403;
pub const HTTP_NOT_FOUND: u16 = 404;
pub const HTTP_METHOD_NOT_ALLOWED: u16 = 405;
pub const HTTP_PAYLOAD_TOO_LARGE: u16 = 413;
pub const HTTP_URI_TOO_LONG: u16 = 414;

// 5xx
pub const HTTP_INTERNAL_SERVER_ERROR: u16 = 500;
pub const GATEWAY_TIMEOUT: u16 = 504;

/// Combined request-line + header section cap (spec §4.4.1's implementer-chosen bound).
pub const MAX_HEADER_SECTION: usize = 8 * 1024;

/// Idle-connection timeout swept once per reactor tick.
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(60);

/// Upper bound on a CGI child's runtime before it is SIGKILLed and a 504 returned.
pub const CGI_TIMEOUT: Duration = Duration::from_secs(30);
