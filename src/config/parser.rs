use std::error::Error;
use std::fmt;

use super::lexer::{Lexer, Loc, Token, TokenKind};
use super::types::{AppConfig, LocationConfig, ServerConfig};

#[derive(Debug)]
pub struct ConfigError {
    pub message: String,
    pub loc: Option<Loc>,
    pub context: Vec<String>,
}

impl ConfigError {
    fn new(message: impl Into<String>, loc: Option<Loc>) -> Self {
        ConfigError {
            message: message.into(),
            loc,
            context: Vec::new(),
        }
    }

    fn with_context(mut self, ctx: impl Into<String>) -> Self {
        self.context.push(ctx.into());
        self
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.loc {
            Some(loc) => write!(f, "\x1b[31mconfig error\x1b[0m at {}: {}", loc, self.message)?,
            None => write!(f, "\x1b[31mconfig error\x1b[0m: {}", self.message)?,
        }
        for ctx in self.context.iter().rev() {
            write!(f, "\n  \x1b[38;5;244mwhile {}\x1b[0m", ctx)?;
        }
        Ok(())
    }
}

impl Error for ConfigError {}

/// Recursive-descent parser over the brace-delimited directive grammar.
pub struct ConfigParser {
    tokens: Vec<Token>,
    pos: usize,
}

impl ConfigParser {
    pub fn new(src: &str) -> Self {
        let tokens = Lexer::new(src).tokenize();
        ConfigParser { tokens, pos: 0 }
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn loc(&self) -> Loc {
        self.peek().loc
    }

    fn advance(&mut self) -> Token {
        let tok = self.tokens[self.pos.min(self.tokens.len() - 1)].clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        tok
    }

    fn skip_semicolons(&mut self) {
        while matches!(self.peek().kind, TokenKind::Semicolon) {
            self.advance();
        }
    }

    fn expect_word(&mut self) -> Result<String, ConfigError> {
        let loc = self.loc();
        match self.advance().kind {
            TokenKind::Word(w) => Ok(w),
            other => Err(ConfigError::new(
                format!("expected a word, found {:?}", other),
                Some(loc),
            )),
        }
    }

    fn expect(&mut self, expected: &TokenKind) -> Result<(), ConfigError> {
        let loc = self.loc();
        let tok = self.advance();
        if &tok.kind == expected {
            Ok(())
        } else {
            Err(ConfigError::new(
                format!("expected {:?}, found {:?}", expected, tok.kind),
                Some(loc),
            ))
        }
    }

    /// Reads words up to (but not past) the next `;`, `{`, `}` or EOF.
    fn read_args(&mut self) -> Vec<String> {
        let mut args = Vec::new();
        loop {
            match &self.peek().kind {
                TokenKind::Word(_) => {
                    if let TokenKind::Word(w) = self.advance().kind {
                        args.push(w);
                    }
                }
                _ => break,
            }
        }
        args
    }

    pub fn parse(mut self) -> Result<AppConfig, ConfigError> {
        let mut servers = Vec::new();
        loop {
            self.skip_semicolons();
            match &self.peek().kind {
                TokenKind::Eof => break,
                TokenKind::Word(w) if w == "server" => {
                    self.advance();
                    let server = self
                        .parse_server_block()
                        .map_err(|e| e.with_context("parsing a server block"))?;
                    servers.push(server);
                }
                other => {
                    return Err(ConfigError::new(
                        format!("expected 'server', found {:?}", other),
                        Some(self.loc()),
                    ));
                }
            }
        }
        if servers.is_empty() {
            return Err(ConfigError::new("no server blocks declared", None));
        }
        Ok(AppConfig { servers })
    }

    fn parse_server_block(&mut self) -> Result<ServerConfig, ConfigError> {
        self.expect(&TokenKind::LBrace)?;
        let mut cfg = ServerConfig {
            server_names: Vec::new(),
            locations: Vec::new(),
            error_pages: Default::default(),
            ..ServerConfig::default()
        };
        loop {
            self.skip_semicolons();
            match &self.peek().kind {
                TokenKind::RBrace => {
                    self.advance();
                    break;
                }
                TokenKind::Eof => {
                    return Err(ConfigError::new("unexpected end of file in server block", Some(self.loc())));
                }
                TokenKind::Word(w) => {
                    let directive = w.clone();
                    self.advance();
                    match directive.as_str() {
                        "listen" => {
                            let loc = self.loc();
                            let value = self.expect_word()?;
                            let (host, port) = value.rsplit_once(':').ok_or_else(|| {
                                ConfigError::new(
                                    format!("'listen' expects host:port, got '{}'", value),
                                    Some(loc),
                                )
                            })?;
                            let port: u16 = port.parse().map_err(|_| {
                                ConfigError::new(
                                    format!("invalid port in listen directive: '{}'", port),
                                    Some(loc),
                                )
                            })?;
                            cfg.host = host.to_string();
                            cfg.port = port;
                        }
                        "server_name" => {
                            cfg.server_names = self.read_args();
                        }
                        "error_page" => {
                            let loc = self.loc();
                            let code = self.expect_word()?;
                            let path = self.expect_word()?;
                            let code: u16 = code.parse().map_err(|_| {
                                ConfigError::new(format!("invalid status code: '{}'", code), Some(loc))
                            })?;
                            cfg.error_pages.insert(code, path);
                        }
                        "client_max_body_size" => {
                            let loc = self.loc();
                            let value = self.expect_word()?;
                            cfg.client_max_body_size = parse_size(&value).map_err(|msg| {
                                ConfigError::new(msg, Some(loc))
                            })?;
                        }
                        "location" => {
                            let loc = self.loc();
                            let path = self.expect_word()?;
                            let location = self
                                .parse_location_block(path)
                                .map_err(|e| e.with_context("parsing a location block"))?;
                            let _ = loc;
                            cfg.locations.push(location);
                        }
                        other => {
                            return Err(ConfigError::new(
                                format!("unknown server directive '{}'", other),
                                Some(self.loc()),
                            ));
                        }
                    }
                    self.skip_semicolons();
                }
                other => {
                    return Err(ConfigError::new(
                        format!("unexpected token {:?} in server block", other),
                        Some(self.loc()),
                    ));
                }
            }
        }
        Ok(cfg)
    }

    fn parse_location_block(&mut self, path: String) -> Result<LocationConfig, ConfigError> {
        self.expect(&TokenKind::LBrace)?;
        let mut loc_cfg = LocationConfig {
            path,
            root: String::new(),
            ..LocationConfig::default()
        };
        loop {
            self.skip_semicolons();
            match &self.peek().kind {
                TokenKind::RBrace => {
                    self.advance();
                    break;
                }
                TokenKind::Eof => {
                    return Err(ConfigError::new(
                        "unexpected end of file in location block",
                        Some(self.loc()),
                    ));
                }
                TokenKind::Word(w) => {
                    let directive = w.clone();
                    self.advance();
                    match directive.as_str() {
                        "root" => loc_cfg.root = self.expect_word()?,
                        "index" => loc_cfg.index = self.expect_word()?,
                        "method" => {
                            loc_cfg.methods = self.read_args().into_iter().collect();
                        }
                        "autoindex" => {
                            let loc = self.loc();
                            let value = self.expect_word()?;
                            loc_cfg.autoindex = match value.as_str() {
                                "on" => true,
                                "off" => false,
                                other => {
                                    return Err(ConfigError::new(
                                        format!("invalid value for 'autoindex': '{}'", other),
                                        Some(loc),
                                    ));
                                }
                            };
                        }
                        "return" => loc_cfg.redirect = self.expect_word()?,
                        "upload_store" => loc_cfg.upload_store = self.expect_word()?,
                        "cgi_pass" => loc_cfg.cgi_path = self.expect_word()?,
                        "cgi_ext" => {
                            loc_cfg.cgi_extensions = self.read_args().into_iter().collect();
                        }
                        other => {
                            return Err(ConfigError::new(
                                format!("unknown location directive '{}'", other),
                                Some(self.loc()),
                            ));
                        }
                    }
                    self.skip_semicolons();
                }
                other => {
                    return Err(ConfigError::new(
                        format!("unexpected token {:?} in location block", other),
                        Some(self.loc()),
                    ));
                }
            }
        }
        Ok(loc_cfg)
    }
}

fn parse_size(raw: &str) -> Result<usize, String> {
    let raw = raw.trim();
    let (digits, mult) = match raw.chars().last() {
        Some('K') | Some('k') => (&raw[..raw.len() - 1], 1024),
        Some('M') | Some('m') => (&raw[..raw.len() - 1], 1024 * 1024),
        Some('G') | Some('g') => (&raw[..raw.len() - 1], 1024 * 1024 * 1024),
        _ => (raw, 1),
    };
    digits
        .parse::<usize>()
        .map(|n| n * mult)
        .map_err(|_| format!("invalid size value '{}'", raw))
}

pub fn parse_config(src: &str) -> Result<AppConfig, ConfigError> {
    ConfigParser::new(src).parse()
}
