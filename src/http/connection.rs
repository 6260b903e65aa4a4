//! Connection (spec §4.3): owns one client socket, its in-progress Request,
//! and (after dispatch) a pending Response. `on_readable`/`on_writable` are
//! driven by the reactor once per ready fd per tick; CGI is handed back out
//! to the reactor as a `ConnEvent::NeedsCgi` rather than run inline, since
//! pumping a child process is itself a multi-tick affair (§4.5).

use std::io::{ErrorKind, Read, Write};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use mio::net::TcpStream;
use mio::Interest;

use crate::config::{LocationConfig, ServerConfig};
use crate::dispatch::{dispatch, Dispatch};
use crate::http::request::{ParseState, Request};
use crate::http::response::{error_response, Response};
use crate::router::find_server;

pub const SERVER_NAME: &str = "originserv";

pub enum ConnEvent {
    /// Nothing more to do this tick; stay registered as-is.
    Idle,
    /// A response was produced and is ready to be written; interest has
    /// already flipped to WRITABLE.
    ResponseReady,
    /// The location routed to a CGI script; the reactor owns spawning and
    /// pumping it, then calling `set_response` once it completes.
    NeedsCgi {
        full_path: String,
        server: ServerConfig,
        location: LocationConfig,
    },
    /// The peer closed or a fatal I/O error occurred; tear the connection down.
    Closed,
}

pub struct Connection {
    pub stream: TcpStream,
    pub addr: SocketAddr,
    pub request: Request,
    pub response: Option<Response>,
    pub interest: Interest,
    pub last_activity: Instant,

    servers: Arc<Vec<ServerConfig>>,
    bound_host: String,
    bound_port: u16,
}

impl Connection {
    pub fn new(
        stream: TcpStream,
        addr: SocketAddr,
        servers: Arc<Vec<ServerConfig>>,
        bound_host: String,
        bound_port: u16,
    ) -> Self {
        let max_body_size = servers
            .iter()
            .map(|s| s.client_max_body_size)
            .max()
            .unwrap_or(1_048_576);
        Connection {
            stream,
            addr,
            request: Request::new(max_body_size, 8 * 1024),
            response: None,
            interest: Interest::READABLE,
            last_activity: Instant::now(),
            servers,
            bound_host,
            bound_port,
        }
    }

    pub fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    /// Reads up to a few 4 KiB chunks into the parser, driving it as far as
    /// it will go, then dispatches once the request is complete.
    pub fn on_readable(&mut self) -> ConnEvent {
        let mut chunk = [0u8; 4096];
        loop {
            match self.stream.read(&mut chunk) {
                Ok(0) => {
                    return if self.request.state == ParseState::RequestLine {
                        ConnEvent::Closed
                    } else {
                        // A half-read request with no more bytes coming:
                        // nothing to dispatch yet, stay registered.
                        ConnEvent::Idle
                    };
                }
                Ok(n) => {
                    self.last_activity = Instant::now();
                    self.request.feed(&chunk[..n]);
                    if n < chunk.len() {
                        break;
                    }
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(_) => return ConnEvent::Closed,
            }
            if matches!(self.request.state, ParseState::Complete | ParseState::Error) {
                break;
            }
        }
        self.dispatch_if_ready()
    }

    fn dispatch_if_ready(&mut self) -> ConnEvent {
        match self.request.state {
            ParseState::Complete => {
                let host_header = self
                    .request
                    .header("Host")
                    .unwrap_or("")
                    .split(':')
                    .next()
                    .unwrap_or("")
                    .to_string();
                let Some(server) =
                    find_server(&self.servers, &self.bound_host, self.bound_port, &host_header)
                else {
                    self.set_response(Response::new(404));
                    return ConnEvent::ResponseReady;
                };
                match dispatch(&self.request, server) {
                    Dispatch::Response(response) => {
                        self.set_response(response);
                        ConnEvent::ResponseReady
                    }
                    Dispatch::Cgi { full_path, location } => ConnEvent::NeedsCgi {
                        full_path,
                        server: server.clone(),
                        location,
                    },
                }
            }
            ParseState::Error => {
                self.set_response(error_response(self.request.error_status, &Default::default()));
                ConnEvent::ResponseReady
            }
            _ => ConnEvent::Idle,
        }
    }

    /// Installs a Response to be written out and flips interest to WRITABLE.
    /// Used both by the normal dispatch path and by the reactor once a CGI
    /// exchange finishes.
    pub fn set_response(&mut self, mut response: Response) {
        let client_wants_close = self
            .request
            .header("Connection")
            .map(|v| v.eq_ignore_ascii_case("close"))
            .unwrap_or(false);
        response.keep_alive = response.keep_alive && !client_wants_close;
        response.finalize(SERVER_NAME);
        self.response = Some(response);
        self.interest = Interest::WRITABLE;
    }

    /// Sends as much of the pending response as the socket accepts; resets
    /// for the next pipelined/keep-alive request on full transmission.
    pub fn on_writable(&mut self) -> ConnEvent {
        if self.response.is_none() {
            return ConnEvent::Idle;
        }
        loop {
            let response = self.response.as_mut().unwrap();
            let bytes = response.finalize(SERVER_NAME);
            let remaining = &bytes[response.bytes_sent..];
            if remaining.is_empty() {
                break;
            }
            match self.stream.write(remaining) {
                Ok(0) => return ConnEvent::Closed,
                Ok(n) => {
                    self.response.as_mut().unwrap().bytes_sent += n;
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => return ConnEvent::Idle,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(_) => return ConnEvent::Closed,
            }
        }
        self.last_activity = Instant::now();
        self.finish_response()
    }

    fn finish_response(&mut self) -> ConnEvent {
        let close = self.should_close();
        self.response = None;
        if close {
            return ConnEvent::Closed;
        }
        self.request.reset();
        self.interest = Interest::READABLE;
        if self.request.state == ParseState::Complete || self.request.state == ParseState::Error {
            self.dispatch_if_ready()
        } else {
            ConnEvent::Idle
        }
    }

    /// The C3 close decision: after a response is fully sent, close unless
    /// its keep-alive flag says otherwise. `set_response` already folds the
    /// request's `Connection` header into that flag, so this is the single
    /// place both factors are consulted.
    fn should_close(&self) -> bool {
        self.response
            .as_ref()
            .map(|r| !r.keep_alive)
            .unwrap_or(true)
    }
}
