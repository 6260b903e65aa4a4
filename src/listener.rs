//! Listener set (spec §4.1): one bound, listening, non-blocking socket per
//! distinct (host, port) pair across every configured server. mio binds
//! with address-reuse and a backlog well above the spec's floor of 10.

use std::collections::{HashMap, HashSet};
use std::io::{self, ErrorKind};
use std::net::SocketAddr;

use mio::net::{TcpListener, TcpStream};
use mio::{Interest, Poll, Token};

use crate::config::AppConfig;

pub struct ListenerSet {
    listeners: HashMap<Token, (TcpListener, String, u16)>,
}

impl ListenerSet {
    /// Binds one listener per distinct (host, port) found across all
    /// configured servers and registers each with the reactor.
    pub fn bind_all(poll: &Poll, config: &AppConfig, next_token: &mut usize) -> io::Result<Self> {
        let mut listeners = HashMap::new();
        let mut seen: HashSet<(String, u16)> = HashSet::new();

        for server in &config.servers {
            let key = (server.host.clone(), server.port);
            if !seen.insert(key) {
                continue;
            }
            let addr: SocketAddr = format!("{}:{}", server.host, server.port)
                .parse()
                .map_err(|e| io::Error::new(ErrorKind::InvalidInput, format!("{}", e)))?;
            let mut listener = TcpListener::bind(addr)?;
            let token = Token(*next_token);
            *next_token += 1;
            poll.registry()
                .register(&mut listener, token, Interest::READABLE)?;
            listeners.insert(token, (listener, server.host.clone(), server.port));
        }

        Ok(ListenerSet { listeners })
    }

    pub fn is_listener(&self, token: Token) -> bool {
        self.listeners.contains_key(&token)
    }

    pub fn bound_addr(&self, token: Token) -> Option<(String, u16)> {
        self.listeners
            .get(&token)
            .map(|(_, host, port)| (host.clone(), *port))
    }

    pub fn tokens(&self) -> impl Iterator<Item = Token> + '_ {
        self.listeners.keys().copied()
    }

    /// Drains ready connections off one listener. Would-block ends the
    /// drain cleanly; other accept errors are logged by the caller and
    /// otherwise ignored, per spec §4.1.
    pub fn accept_ready(&mut self, token: Token) -> Vec<(TcpStream, SocketAddr)> {
        let mut accepted = Vec::new();
        let Some((listener, _, _)) = self.listeners.get_mut(&token) else {
            return accepted;
        };
        loop {
            match listener.accept() {
                Ok(pair) => accepted.push(pair),
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) => {
                    crate::prelude::warn!("accept() failed: {}", e);
                    break;
                }
            }
        }
        accepted
    }
}
