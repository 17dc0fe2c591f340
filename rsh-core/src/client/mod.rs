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

//! The client runtime: connection establishment, the reader/writer
//! loops, the input pump, request/reply correlation, and reconnection.
//! Grounded in `libshpool::attach`'s `pipe_bytes`, which runs a
//! `thread::scope` with a stdin-to-socket thread and a socket-to-stdout
//! thread over cloned `UnixStream` handles; this client follows the same
//! split, except the bytes it shuttles are framed messages rather than a
//! raw tty byte stream, and a dropped connection may be retried rather
//! than ending the process.

mod pending;

pub use pending::PendingTable;

use std::{
    io::{self, Read, Write},
    net::Shutdown,
    sync::{
        atomic::{AtomicBool, AtomicU32, Ordering},
        Arc, Mutex,
    },
    thread,
    time::Instant,
};

use anyhow::Context;
use rsh_protocol::{
    AuthRequestPayload, AuthResponsePayload, AuthType, DisconnectPayload, ErrorCode, InputPayload,
    LineReader, Message, Payload, PongPayload,
};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::{config::ClientConfig, consts, transport, transport::Connection};

/// Event sink the embedder supplies; every method defaults to a no-op, so
/// a caller overrides only the events it cares about. This is the
/// client's public readable output stream plus its `connect`/`error`/
/// `disconnect` events (this core has no terminal of its own to write
/// into).
pub trait ClientHandler: Send + Sync {
    fn on_connect(&self) {}
    fn on_output(&self, _content: &str) {}
    fn on_error(&self, _message: &str, _code: ErrorCode) {}
    fn on_disconnect(&self, _reason: &str) {}
}

pub struct NullHandler;
impl ClientHandler for NullHandler {}

struct Shared {
    config: ClientConfig,
    handler: Arc<dyn ClientHandler>,
    pending: PendingTable,
    connected: AtomicBool,
    manual_disconnect: AtomicBool,
    session_id: Mutex<Option<String>>,
    last_activity: Mutex<Instant>,
    outbound_tx: Mutex<Option<crossbeam_channel::Sender<Message>>>,
    conn_for_shutdown: Mutex<Option<Connection>>,
    reconnect_attempts: AtomicU32,
    input_tx: crossbeam_channel::Sender<Vec<u8>>,
}

/// A handle the caller writes local input bytes into; each `write` call
/// is forwarded as one INPUT frame by the input-pump thread. Implements
/// `std::io::Write` so it composes with anything that copies from a
/// reader, e.g. `std::io::copy(&mut stdin, &mut client.input_writer())`.
pub struct ClientInputWriter {
    tx: crossbeam_channel::Sender<Vec<u8>>,
}

impl Write for ClientInputWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.tx
            .send(buf.to_vec())
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "client is gone"))?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

pub struct Client {
    shared: Arc<Shared>,
}

impl Client {
    /// Dials `config.target`, authenticates if credentials are
    /// configured, and starts the reader/writer/input-pump loops. Blocks
    /// until the initial connection (and auth handshake, if any)
    /// succeeds or fails outright; a connection lost afterward is
    /// retried in the background per `config.auto_reconnect`.
    #[instrument(skip_all)]
    pub fn connect(config: ClientConfig, handler: Arc<dyn ClientHandler>) -> anyhow::Result<Client> {
        let (input_tx, input_rx) = crossbeam_channel::unbounded();
        let shared = Arc::new(Shared {
            config,
            handler,
            pending: PendingTable::new(),
            connected: AtomicBool::new(false),
            manual_disconnect: AtomicBool::new(false),
            session_id: Mutex::new(None),
            last_activity: Mutex::new(Instant::now()),
            outbound_tx: Mutex::new(None),
            conn_for_shutdown: Mutex::new(None),
            reconnect_attempts: AtomicU32::new(0),
            input_tx,
        });

        establish(&shared)?;

        {
            let shared = shared.clone();
            thread::spawn(move || input_pump(shared, input_rx));
        }

        Ok(Client { shared })
    }

    pub fn input_writer(&self) -> ClientInputWriter {
        ClientInputWriter { tx: self.shared.input_tx.clone() }
    }

    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }

    pub fn session_id(&self) -> Option<String> {
        self.shared.session_id.lock().unwrap().clone()
    }

    /// Manual disconnect: cancels any scheduled reconnect, clears
    /// `autoReconnect`, best-effort sends DISCONNECT, then performs the
    /// same teardown as a local disconnect.
    pub fn disconnect(&self) {
        self.shared.manual_disconnect.store(true, Ordering::SeqCst);
        if self.shared.connected.load(Ordering::SeqCst) {
            enqueue(
                &self.shared,
                Message::new(
                    new_message_id(),
                    now_ms(),
                    Payload::Disconnect(DisconnectPayload { reason: "client disconnect".to_string() }),
                ),
            );
        }
        local_disconnect(&self.shared, "client disconnect");
    }
}

fn new_message_id() -> String {
    Uuid::new_v4().to_string()
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn enqueue(shared: &Arc<Shared>, msg: Message) {
    if let Some(tx) = shared.outbound_tx.lock().unwrap().as_ref() {
        let _ = tx.send(msg);
    }
}

/// Dials the connection, spawns its reader/writer threads, and runs the
/// auth handshake. Called once from `Client::connect` and again, from a
/// background thread, by each reconnect attempt.
fn establish(shared: &Arc<Shared>) -> anyhow::Result<()> {
    let target = shared
        .config
        .target
        .clone()
        .ok_or_else(|| anyhow::anyhow!("client config has no connection target"))?;
    let conn = transport::dial(&target).context("dialing server")?;
    let write_conn = conn.try_clone().context("cloning connection for writer loop")?;
    let shutdown_conn = conn.try_clone().context("cloning connection for shutdown handle")?;
    *shared.conn_for_shutdown.lock().unwrap() = Some(shutdown_conn);

    let (tx, rx) = crossbeam_channel::bounded(consts::OUTBOUND_QUEUE_CAPACITY);
    *shared.outbound_tx.lock().unwrap() = Some(tx);
    shared.connected.store(true, Ordering::SeqCst);
    shared.manual_disconnect.store(false, Ordering::SeqCst);

    {
        let shared = shared.clone();
        thread::spawn(move || writer_loop(shared, write_conn, rx));
    }
    {
        let shared = shared.clone();
        thread::spawn(move || reader_loop(shared, conn));
    }

    if let Err(e) = authenticate_if_configured(shared) {
        local_disconnect(shared, "authentication failed");
        return Err(e);
    }

    shared.reconnect_attempts.store(0, Ordering::SeqCst);
    shared.handler.on_connect();
    Ok(())
}

/// Every connection must clear the `Accepted -> Authenticated` gate with
/// an `AUTH_REQUEST`, even against a server configured for `none` auth
/// (there is no way to skip the handshake outright, only to send a
/// trivially-accepted one).
fn authenticate_if_configured(shared: &Arc<Shared>) -> anyhow::Result<()> {
    let payload = if let Some(creds) = &shared.config.credentials {
        AuthRequestPayload {
            auth_type: AuthType::Basic,
            username: Some(creds.username.clone()),
            password: Some(creds.password.clone()),
            token: None,
        }
    } else if let Some(token) = &shared.config.token {
        AuthRequestPayload { auth_type: AuthType::Token, username: None, password: None, token: Some(token.clone()) }
    } else {
        AuthRequestPayload { auth_type: AuthType::None, username: None, password: None, token: None }
    };

    let id = new_message_id();
    let rx = shared.pending.insert(id.clone(), "auth_response");
    enqueue(shared, Message::new(id.clone(), now_ms(), Payload::AuthRequest(payload)));

    let reply = match rx.recv_timeout(shared.config.request_timeout()) {
        Ok(Ok(msg)) => msg,
        Ok(Err(reason)) => anyhow::bail!("auth_request failed: {reason}"),
        Err(_) => {
            shared.pending.expire(&id);
            anyhow::bail!("auth_request timed out");
        }
    };

    match reply.payload {
        Payload::AuthResponse(AuthResponsePayload { success: true, session_id, .. }) => {
            *shared.session_id.lock().unwrap() = session_id;
            Ok(())
        }
        Payload::AuthResponse(AuthResponsePayload { success: false, error, .. }) => {
            anyhow::bail!("authentication rejected: {}", error.unwrap_or_default())
        }
        other => anyhow::bail!("unexpected reply to auth_request: {}", other.type_tag()),
    }
}

fn writer_loop(shared: Arc<Shared>, mut conn: Connection, rx: crossbeam_channel::Receiver<Message>) {
    for msg in rx.iter() {
        let line = match rsh_protocol::encode_line(&msg) {
            Ok(l) => l,
            Err(e) => {
                warn!("encoding outbound message: {:?}", e);
                continue;
            }
        };
        if let Err(e) = conn.write_all(line.as_bytes()).and_then(|_| conn.flush()) {
            debug!("client writer loop exiting on write error: {:?}", e);
            local_disconnect(&shared, "connection closed");
            return;
        }
    }
}

fn reader_loop(shared: Arc<Shared>, mut conn: Connection) {
    let mut framer = LineReader::new();
    let mut buf = vec![0u8; consts::READ_BUF_SIZE];

    loop {
        if !shared.connected.load(Ordering::SeqCst) {
            return;
        }
        let nread = match conn.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                debug!("client reader loop exiting on read error: {:?}", e);
                break;
            }
        };
        let lines = match framer.feed(&buf[..nread]) {
            Ok(lines) => lines,
            Err(e) => {
                warn!("carry-over overflow, dropping connection: {:?}", e);
                break;
            }
        };
        for line in lines {
            *shared.last_activity.lock().unwrap() = Instant::now();
            match LineReader::parse_line(&line) {
                Ok(msg) => dispatch(&shared, msg),
                Err(e) => debug!("dropping malformed frame: {:?}", e),
            }
        }
    }

    local_disconnect(&shared, "connection closed");
}

/// Inbound dispatch: routes each reply type to its handler.
fn dispatch(shared: &Arc<Shared>, msg: Message) {
    match &msg.payload {
        Payload::AuthResponse(_) | Payload::CommandResponse(_) => {
            shared.pending.resolve(msg);
        }
        Payload::Output(payload) => {
            shared.handler.on_output(&payload.content);
        }
        Payload::Error(payload) => {
            shared.handler.on_error(&payload.message, payload.code);
        }
        Payload::Ping(_) => {
            let id = msg.id.clone();
            enqueue(shared, Message::new(id, now_ms(), Payload::Pong(PongPayload { uptime: 0.0 })));
        }
        Payload::Pong(_) => {}
        Payload::Disconnect(payload) => {
            let reason = payload.reason.clone();
            local_disconnect(shared, &reason);
        }
        other => {
            let tag = other.type_tag();
            warn!("received outbound-only message type '{}'; ignoring", tag);
            shared
                .handler
                .on_error(&format!("unexpected message type '{tag}'"), ErrorCode::Unsupported);
        }
    }
}

/// Idempotent local teardown: marks not-connected, rejects pending
/// requests, drops the outbound sender (which ends the writer loop),
/// shuts down the socket, emits `disconnect`, and schedules a reconnect
/// if configured to do so.
fn local_disconnect(shared: &Arc<Shared>, reason: &str) {
    if !shared.connected.swap(false, Ordering::SeqCst) {
        return;
    }

    shared.pending.reject_all("disconnected");
    *shared.outbound_tx.lock().unwrap() = None;
    if let Some(conn) = shared.conn_for_shutdown.lock().unwrap().take() {
        let _ = conn.shutdown(Shutdown::Both);
    }
    shared.handler.on_disconnect(reason);

    if shared.manual_disconnect.load(Ordering::SeqCst) {
        return;
    }
    if !shared.config.auto_reconnect {
        return;
    }
    schedule_reconnect(shared.clone());
}

fn schedule_reconnect(shared: Arc<Shared>) {
    let attempts = shared.reconnect_attempts.fetch_add(1, Ordering::SeqCst) + 1;
    if attempts > shared.config.max_reconnect_attempts {
        warn!("giving up after {} reconnect attempts", attempts - 1);
        return;
    }
    thread::spawn(move || {
        thread::sleep(shared.config.reconnect_delay());
        if shared.manual_disconnect.load(Ordering::SeqCst) {
            return;
        }
        match establish(&shared) {
            Ok(()) => info!("reconnected after {} attempt(s)", attempts),
            Err(e) => {
                warn!("reconnect attempt {} failed: {:?}", attempts, e);
                schedule_reconnect(shared);
            }
        }
    });
}

fn input_pump(shared: Arc<Shared>, rx: crossbeam_channel::Receiver<Vec<u8>>) {
    for chunk in rx.iter() {
        if !shared.connected.load(Ordering::SeqCst) {
            continue;
        }
        let data = String::from_utf8_lossy(&chunk).into_owned();
        let session_id = shared.session_id.lock().unwrap().clone().unwrap_or_default();
        enqueue(&shared, Message::new(new_message_id(), now_ms(), Payload::Input(InputPayload { data, session_id })));
    }
}
