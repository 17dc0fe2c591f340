// Copyright 2024 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! A stream socket that is either TCP or Unix domain, so the server
//! session engine and the client runtime can be written once against a
//! single type instead of duplicating every loop per transport. Mirrors
//! the way `libshpool::protocol::Client` wraps a `UnixStream`, except
//! this crate's wire format has no length prefix to negotiate and can
//! run over either transport.

use std::{
    io::{self, Read, Write},
    net::{Shutdown, TcpListener, TcpStream},
    os::unix::net::{UnixListener, UnixStream},
    path::Path,
    time::Duration,
};

use anyhow::Context;

use crate::config::ListenerConfig;

#[derive(Debug)]
pub enum Connection {
    Tcp(TcpStream),
    Unix(UnixStream),
}

impl Connection {
    pub fn try_clone(&self) -> io::Result<Connection> {
        match self {
            Connection::Tcp(s) => s.try_clone().map(Connection::Tcp),
            Connection::Unix(s) => s.try_clone().map(Connection::Unix),
        }
    }

    pub fn shutdown(&self, how: Shutdown) -> io::Result<()> {
        match self {
            Connection::Tcp(s) => s.shutdown(how),
            Connection::Unix(s) => s.shutdown(how),
        }
    }

    pub fn set_read_timeout(&self, dur: Option<Duration>) -> io::Result<()> {
        match self {
            Connection::Tcp(s) => s.set_read_timeout(dur),
            Connection::Unix(s) => s.set_read_timeout(dur),
        }
    }
}

impl Read for Connection {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Connection::Tcp(s) => s.read(buf),
            Connection::Unix(s) => s.read(buf),
        }
    }
}

impl Write for Connection {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Connection::Tcp(s) => s.write(buf),
            Connection::Unix(s) => s.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Connection::Tcp(s) => s.flush(),
            Connection::Unix(s) => s.flush(),
        }
    }
}

/// A bound listener, TCP or Unix. `bind` removes a stale Unix socket
/// file before binding over it, per spec.
pub enum Listener {
    Tcp(TcpListener),
    Unix { listener: UnixListener, path: String },
}

impl Listener {
    pub fn bind(config: &ListenerConfig) -> anyhow::Result<Listener> {
        match config {
            ListenerConfig::Tcp { host, port } => {
                let listener = TcpListener::bind((host.as_str(), *port))
                    .with_context(|| format!("binding tcp listener on {host}:{port}"))?;
                listener.set_nonblocking(true).context("setting tcp listener nonblocking")?;
                Ok(Listener::Tcp(listener))
            }
            ListenerConfig::Unix { path } => {
                if Path::new(path).exists() {
                    std::fs::remove_file(path)
                        .with_context(|| format!("removing stale unix socket at {path}"))?;
                }
                let listener = UnixListener::bind(path)
                    .with_context(|| format!("binding unix listener at {path}"))?;
                listener.set_nonblocking(true).context("setting unix listener nonblocking")?;
                Ok(Listener::Unix { listener, path: path.clone() })
            }
        }
    }

    /// Non-blocking accept: `Ok(None)` means no pending connection yet,
    /// distinct from a hard I/O error, so the accept loop can poll
    /// against a stop signal instead of blocking forever in
    /// `incoming()` the way `libshpool::daemon::server::Server::serve`
    /// does for its single long-lived daemon socket.
    pub fn try_accept(&self) -> io::Result<Option<Connection>> {
        match self {
            Listener::Tcp(l) => match l.accept() {
                Ok((stream, _addr)) => Ok(Some(Connection::Tcp(stream))),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
                Err(e) => Err(e),
            },
            Listener::Unix { listener, .. } => match listener.accept() {
                Ok((stream, _addr)) => Ok(Some(Connection::Unix(stream))),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
                Err(e) => Err(e),
            },
        }
    }

    /// Removes the Unix socket file, if any. Safe to call more than
    /// once; called on server `stop()` regardless of the error path, per
    /// spec.
    pub fn remove_socket_file(&self) {
        if let Listener::Unix { path, .. } = self {
            let _ = std::fs::remove_file(path);
        }
    }
}

/// Dials a `ListenerConfig` as a client. Named `dial` rather than
/// `connect` to avoid colliding with `std::net`'s trait method when both
/// are in scope at a call site.
pub fn dial(config: &ListenerConfig) -> anyhow::Result<Connection> {
    match config {
        ListenerConfig::Tcp { host, port } => {
            let stream = TcpStream::connect((host.as_str(), *port))
                .with_context(|| format!("connecting to {host}:{port}"))?;
            Ok(Connection::Tcp(stream))
        }
        ListenerConfig::Unix { path } => {
            let stream =
                UnixStream::connect(path).with_context(|| format!("connecting to {path}"))?;
            Ok(Connection::Unix(stream))
        }
    }
}
