//! Reactor (spec §4.2): the single-threaded event loop gluing the listener
//! set, connections, and CGI exchanges together. One `Poll` drives all of
//! it; nothing here blocks except the `poll.poll()` call itself.

use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use mio::{Events, Interest, Poll, Token};

use crate::cgi::{self, CgiHandle, CgiOutcome};
use crate::config::{AppConfig, LocationConfig, ServerConfig};
use crate::error::Result;
use crate::http::connection::{ConnEvent, Connection};
use crate::http::Response;
use crate::listener::ListenerSet;
use crate::prelude::{debug, error, info, warn, IDLE_TIMEOUT};

struct CgiLink {
    handle: CgiHandle,
    client: Token,
    stdin_token: Option<Token>,
}

pub struct Server {
    servers: Arc<Vec<ServerConfig>>,
    listeners: ListenerSet,
    connections: HashMap<Token, Connection>,
    cgi_handles: HashMap<Token, CgiLink>,
    cgi_stdin_tokens: HashMap<Token, Token>,
    next_token: usize,
    shutdown: Arc<AtomicBool>,
}

impl Server {
    pub fn new(config: AppConfig, poll: &Poll) -> Result<Server> {
        let mut next_token = 0usize;
        let listeners = ListenerSet::bind_all(poll, &config, &mut next_token)?;
        info!("bound {} listener(s)", config.servers.len());
        Ok(Server {
            servers: Arc::new(config.servers),
            listeners,
            connections: HashMap::new(),
            cgi_handles: HashMap::new(),
            cgi_stdin_tokens: HashMap::new(),
            next_token,
            shutdown: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Shared with the signal handler so SIGINT/SIGTERM can request a
    /// graceful stop from outside the reactor loop.
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    fn alloc_token(&mut self) -> Token {
        let token = Token(self.next_token);
        self.next_token += 1;
        token
    }

    pub fn run(&mut self, mut poll: Poll) -> Result<()> {
        let mut events = Events::with_capacity(1024);
        while !self.shutdown.load(Ordering::SeqCst) {
            match poll.poll(&mut events, Some(Duration::from_secs(1))) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }

            for event in events.iter() {
                let token = event.token();

                if self.listeners.is_listener(token) {
                    self.accept_all(&poll, token);
                    continue;
                }
                if let Some(&stdout_token) = self.cgi_stdin_tokens.get(&token) {
                    if event.is_writable() {
                        self.pump_cgi_writable(stdout_token);
                    }
                    continue;
                }
                if self.cgi_handles.contains_key(&token) {
                    if event.is_readable() {
                        self.pump_cgi_readable(&poll, token);
                    }
                    continue;
                }
                if event.is_readable() {
                    self.handle_connection_readable(&poll, token);
                }
                if event.is_writable() {
                    self.handle_connection_writable(&poll, token);
                }
            }

            self.sweep_idle(&poll);
            self.sweep_cgi_timeouts(&poll);
        }

        info!("shutdown requested, draining in-flight work");
        self.drain_shutdown(&poll);
        Ok(())
    }

    fn accept_all(&mut self, poll: &Poll, listener_token: Token) {
        let Some((host, port)) = self.listeners.bound_addr(listener_token) else {
            return;
        };
        for (mut stream, addr) in self.listeners.accept_ready(listener_token) {
            let token = self.alloc_token();
            if let Err(e) = poll
                .registry()
                .register(&mut stream, token, Interest::READABLE)
            {
                warn!("failed to register accepted connection: {}", e);
                continue;
            }
            debug!("accepted {} on {}:{}", addr, host, port);
            let conn = Connection::new(stream, addr, Arc::clone(&self.servers), host.clone(), port);
            self.connections.insert(token, conn);
        }
    }

    fn handle_connection_readable(&mut self, poll: &Poll, token: Token) {
        let Some(conn) = self.connections.get_mut(&token) else {
            return;
        };
        match conn.on_readable() {
            ConnEvent::Closed => self.close_connection(poll, token),
            ConnEvent::ResponseReady => self.reregister_connection(poll, token),
            ConnEvent::NeedsCgi {
                full_path,
                server,
                location,
            } => self.start_cgi(poll, token, full_path, server, location),
            ConnEvent::Idle => {}
        }
    }

    fn handle_connection_writable(&mut self, poll: &Poll, token: Token) {
        let Some(conn) = self.connections.get_mut(&token) else {
            return;
        };
        match conn.on_writable() {
            ConnEvent::Closed => self.close_connection(poll, token),
            ConnEvent::ResponseReady => self.reregister_connection(poll, token),
            ConnEvent::NeedsCgi {
                full_path,
                server,
                location,
            } => self.start_cgi(poll, token, full_path, server, location),
            ConnEvent::Idle => {}
        }
    }

    fn reregister_connection(&mut self, poll: &Poll, token: Token) {
        let Some(conn) = self.connections.get_mut(&token) else {
            return;
        };
        let interest = conn.interest;
        if poll
            .registry()
            .reregister(&mut conn.stream, token, interest)
            .is_err()
        {
            let _ = poll.registry().register(&mut conn.stream, token, interest);
        }
    }

    fn close_connection(&mut self, poll: &Poll, token: Token) {
        if let Some(mut conn) = self.connections.remove(&token) {
            let _ = poll.registry().deregister(&mut conn.stream);
        }
        let orphaned: Vec<Token> = self
            .cgi_handles
            .iter()
            .filter(|(_, link)| link.client == token)
            .map(|(t, _)| *t)
            .collect();
        for cgi_token in orphaned {
            if let Some(mut link) = self.cgi_handles.remove(&cgi_token) {
                let _ = link.handle.kill_on_timeout();
                if let Some(stdin_token) = link.stdin_token {
                    self.cgi_stdin_tokens.remove(&stdin_token);
                }
            }
        }
    }

    fn start_cgi(
        &mut self,
        poll: &Poll,
        client_token: Token,
        full_path: String,
        server: ServerConfig,
        location: LocationConfig,
    ) {
        let Some(conn) = self.connections.get(&client_token) else {
            return;
        };
        match cgi::spawn(&conn.request, &server, &location, &full_path) {
            Ok(mut handle) => {
                let stdout_token = self.alloc_token();
                if let Err(e) =
                    poll.registry()
                        .register(handle.stdout_source(), stdout_token, Interest::READABLE)
                {
                    warn!("failed to register cgi stdout: {}", e);
                    return;
                }
                let stdin_token = if let Some(stdin) = handle.stdin_source() {
                    let token = self.alloc_token();
                    match poll.registry().register(stdin, token, Interest::WRITABLE) {
                        Ok(()) => {
                            self.cgi_stdin_tokens.insert(token, stdout_token);
                            Some(token)
                        }
                        Err(e) => {
                            warn!("failed to register cgi stdin: {}", e);
                            None
                        }
                    }
                } else {
                    None
                };

                if let Some(conn) = self.connections.get_mut(&client_token) {
                    let _ = poll.registry().deregister(&mut conn.stream);
                }
                self.cgi_handles.insert(
                    stdout_token,
                    CgiLink {
                        handle,
                        client: client_token,
                        stdin_token,
                    },
                );
            }
            Err(err) => {
                if let Some(conn) = self.connections.get_mut(&client_token) {
                    conn.set_response(err.response());
                    self.reregister_connection(poll, client_token);
                }
            }
        }
    }

    fn pump_cgi_writable(&mut self, stdout_token: Token) {
        let Some(link) = self.cgi_handles.get_mut(&stdout_token) else {
            return;
        };
        if let Err(e) = link.handle.on_writable() {
            error!("cgi stdin write failed: {}", e);
        }
        if !link.handle.wants_write() {
            if let Some(stdin_token) = link.stdin_token.take() {
                self.cgi_stdin_tokens.remove(&stdin_token);
            }
        }
    }

    fn pump_cgi_readable(&mut self, poll: &Poll, stdout_token: Token) {
        let outcome = {
            let Some(link) = self.cgi_handles.get_mut(&stdout_token) else {
                return;
            };
            link.handle.on_readable()
        };
        match outcome {
            Ok(CgiOutcome::Pending) => {}
            Ok(CgiOutcome::Done(response)) => self.finish_cgi(poll, stdout_token, response),
            Err(e) => {
                error!("cgi stdout read failed: {}", e);
                let mut response = Response::new(500);
                response.set_body(b"Internal Server Error: CGI execution failed".to_vec());
                self.finish_cgi(poll, stdout_token, response);
            }
        }
    }

    fn finish_cgi(&mut self, poll: &Poll, stdout_token: Token, response: Response) {
        let Some(link) = self.cgi_handles.remove(&stdout_token) else {
            return;
        };
        if let Some(stdin_token) = link.stdin_token {
            self.cgi_stdin_tokens.remove(&stdin_token);
        }
        if let Some(conn) = self.connections.get_mut(&link.client) {
            conn.set_response(response);
            self.reregister_connection(poll, link.client);
        }
    }

    fn sweep_idle(&mut self, poll: &Poll) {
        let now = Instant::now();
        let idle: Vec<Token> = self
            .connections
            .iter()
            .filter(|(_, conn)| now.duration_since(conn.last_activity) > IDLE_TIMEOUT)
            .map(|(token, _)| *token)
            .collect();
        for token in idle {
            debug!("closing idle connection {:?}", token);
            self.close_connection(poll, token);
        }
    }

    fn sweep_cgi_timeouts(&mut self, poll: &Poll) {
        let timed_out: Vec<Token> = self
            .cgi_handles
            .iter()
            .filter(|(_, link)| link.handle.timed_out())
            .map(|(token, _)| *token)
            .collect();
        for stdout_token in timed_out {
            let Some(mut link) = self.cgi_handles.remove(&stdout_token) else {
                continue;
            };
            if let Some(stdin_token) = link.stdin_token {
                self.cgi_stdin_tokens.remove(&stdin_token);
            }
            warn!("cgi child exceeded its time budget, killing it");
            let response = link.handle.kill_on_timeout();
            if let Some(conn) = self.connections.get_mut(&link.client) {
                conn.set_response(response);
                self.reregister_connection(poll, link.client);
            }
        }
    }

    /// Best-effort drain on shutdown: flush whatever responses are already
    /// buffered, then close everything.
    fn drain_shutdown(&mut self, poll: &Poll) {
        let tokens: Vec<Token> = self.connections.keys().copied().collect();
        for token in &tokens {
            if let Some(conn) = self.connections.get_mut(token) {
                if conn.response.is_some() {
                    let _ = conn.on_writable();
                }
            }
        }
        for token in tokens {
            self.close_connection(poll, token);
        }

        let cgi_tokens: Vec<Token> = self.cgi_handles.keys().copied().collect();
        for token in cgi_tokens {
            if let Some(mut link) = self.cgi_handles.remove(&token) {
                let _ = link.handle.kill_on_timeout();
            }
        }
    }
}
