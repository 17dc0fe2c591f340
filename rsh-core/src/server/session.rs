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

//! One accepted connection's state machine: `Accepted -> Authenticated
//! -> Closing -> Closed`. The reader loop runs on the thread that calls
//! `run`; the writer loop runs on a spawned thread so that an
//! unresponsive peer can never stall the reader.

use std::{
    net::Shutdown,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
    thread,
    time::Instant,
};

use rsh_protocol::{
    DisconnectPayload, ErrorCode, ErrorPayload, LineReader, Message, OutputPayload, Payload,
    PongPayload,
};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::{
    config::ShellMode,
    consts,
    registry::ExecutionContext,
    server::{auth, Server},
    shell::ShellEngine,
    transport::Connection,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Accepted,
    Authenticated,
    Closing,
    Closed,
}

/// The part of a session visible outside its own reader thread: the
/// keepalive loop reads `last_activity` and enqueues PINGs through it,
/// and any thread may call `close` to begin teardown. The shell engine
/// itself is not here; in per-session mode it is single-owner,
/// constructed and dropped inside `run`, since nothing besides the
/// reader thread ever touches it.
pub struct SessionHandle {
    pub id: String,
    pub username: Mutex<Option<String>>,
    pub state: Mutex<SessionState>,
    pub connected_at: Instant,
    pub last_activity: Mutex<Instant>,
    outbound_tx: Mutex<Option<crossbeam_channel::Sender<Message>>>,
    closing: AtomicBool,
    conn_for_shutdown: Mutex<Connection>,
}

impl SessionHandle {
    pub fn touch(&self) {
        *self.last_activity.lock().unwrap() = Instant::now();
    }

    pub fn is_stale(&self, timeout: std::time::Duration) -> bool {
        self.last_activity.lock().unwrap().elapsed() > timeout
    }

    /// Best-effort, non-blocking enqueue. A full queue means the peer
    /// cannot keep up with its own output, so that session is closed
    /// with `SLOW_CONSUMER` rather than blocking the caller (which may
    /// be the shell engine itself).
    pub fn enqueue(&self, msg: Message) {
        let Some(tx) = self.outbound_tx.lock().unwrap().clone() else { return };
        match tx.try_send(msg) {
            Ok(()) => {}
            Err(crossbeam_channel::TrySendError::Full(_)) => {
                warn!("session {} outbound queue full, closing as slow consumer", self.id);
                self.close("slow consumer");
            }
            Err(crossbeam_channel::TrySendError::Disconnected(_)) => {}
        }
    }

    /// Idempotent: only the first caller actually performs teardown
    /// work. Safe to call from the reader thread, the keepalive thread,
    /// or the writer thread's error path. Shuts down only the read
    /// half so a reader blocked in `conn.read()` wakes up immediately,
    /// while the write half stays open long enough for `writer_loop` to
    /// actually deliver whatever is still queued (this disconnect
    /// message included) before `finish_outbound` lets it exit.
    pub fn close(&self, reason: &str) {
        if self.closing.swap(true, Ordering::SeqCst) {
            return;
        }
        *self.state.lock().unwrap() = SessionState::Closing;
        if let Some(tx) = self.outbound_tx.lock().unwrap().clone() {
            let _ = tx.try_send(Message::new(
                new_message_id(),
                now_ms(),
                Payload::Disconnect(DisconnectPayload { reason: reason.to_string() }),
            ));
        }
        if let Ok(conn) = self.conn_for_shutdown.lock() {
            let _ = conn.shutdown(Shutdown::Read);
        }
    }

    /// Drops the sending half of the outbound channel so `writer_loop`'s
    /// `rx.iter()` finishes once it has drained whatever is already
    /// queued, instead of blocking forever waiting for more. Call only
    /// after the reader loop has returned, so nothing can still be
    /// relying on `enqueue` to succeed.
    fn finish_outbound(&self) {
        self.outbound_tx.lock().unwrap().take();
    }
}

pub fn new_message_id() -> String {
    Uuid::new_v4().to_string()
}

pub fn new_session_id() -> String {
    Uuid::new_v4().to_string()
}

pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

pub fn output_message(content: &str) -> Message {
    Message::new(
        new_message_id(),
        now_ms(),
        Payload::Output(OutputPayload {
            content: content.to_string(),
            command_id: "shell_output".to_string(),
            final_chunk: false,
        }),
    )
}

fn error_message(reply_to: Option<&str>, code: ErrorCode, message: impl Into<String>) -> Message {
    Message::new(
        reply_to.map(str::to_string).unwrap_or_else(new_message_id),
        now_ms(),
        Payload::Error(ErrorPayload { message: message.into(), code }),
    )
}

/// Runs one accepted connection to completion: spawns the writer loop,
/// then reads and dispatches frames on the calling thread until the
/// session closes. Returns once both loops have wound down, so the
/// caller can remove the session from the server's map immediately
/// after.
#[instrument(skip_all, fields(session = %handle.id))]
pub fn run(
    server: Arc<Server>,
    handle: Arc<SessionHandle>,
    conn: Connection,
    outbound_rx: crossbeam_channel::Receiver<Message>,
) {
    let mut writer_conn = match conn.try_clone() {
        Ok(c) => c,
        Err(e) => {
            warn!("cloning connection for writer loop: {:?}", e);
            return;
        }
    };

    let writer_handle = thread::spawn(move || writer_loop(&mut writer_conn, outbound_rx));

    reader_loop(&server, &handle, conn);

    *handle.state.lock().unwrap() = SessionState::Closed;
    handle.finish_outbound();
    let _ = writer_handle.join();
    info!("session {} closed", handle.id);
}

fn writer_loop(conn: &mut Connection, rx: crossbeam_channel::Receiver<Message>) {
    use std::io::Write;
    for msg in rx.iter() {
        let line = match rsh_protocol::encode_line(&msg) {
            Ok(l) => l,
            Err(e) => {
                warn!("encoding outbound message: {:?}", e);
                continue;
            }
        };
        if let Err(e) = conn.write_all(line.as_bytes()).and_then(|_| conn.flush()) {
            debug!("writer loop exiting on write error: {:?}", e);
            return;
        }
    }
}

fn reader_loop(server: &Arc<Server>, handle: &Arc<SessionHandle>, mut conn: Connection) {
    use std::io::Read;

    let mut framer = LineReader::new();
    let mut read_buf = vec![0u8; consts::READ_BUF_SIZE];

    // Built lazily on successful authentication: a session that never
    // authenticates never gets a shell. In shared mode this stays
    // `None` forever; `dispatch_authenticated` routes INPUT to
    // `server`'s single shared engine instead.
    let mut engine: Option<ShellEngine> = None;

    loop {
        if *handle.state.lock().unwrap() == SessionState::Closing {
            break;
        }

        let nread = match conn.read(&mut read_buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                debug!("reader loop exiting on read error: {:?}", e);
                break;
            }
        };

        let lines = match framer.feed(&read_buf[..nread]) {
            Ok(lines) => lines,
            Err(e) => {
                warn!("carry-over overflow, failing connection: {:?}", e);
                break;
            }
        };

        for line in lines {
            handle.touch();
            match LineReader::parse_line(&line) {
                Ok(msg) => dispatch(server, handle, &mut engine, msg),
                Err(e) => {
                    debug!("rejecting malformed frame: {:?}", e);
                    handle.enqueue(error_message(
                        None,
                        ErrorCode::InvalidMessage,
                        format!("malformed message: {e:#}"),
                    ));
                }
            }
        }
    }

    handle.close("connection closed");
    if let Some(engine) = engine.as_mut() {
        engine.stop();
    }
    server.remove_session(&handle.id);
}

fn build_engine(server: &Arc<Server>, handle: &Arc<SessionHandle>, prompt: String) -> ShellEngine {
    let registry = server.registry.clone();
    let mut engine = ShellEngine::new(prompt, registry.clone());
    let output_handle = handle.clone();
    let exec_handle = handle.clone();
    engine.start(
        move |line: &str| {
            let mut sink = |chunk: &str| exec_handle.enqueue(output_message(chunk));
            let mut ctx = ExecutionContext::new(&mut sink);
            let result = registry.execute(line, &mut ctx);
            if result.stop_requested {
                exec_handle.close("shell exited");
            }
        },
        move |chunk: &str| output_handle.enqueue(output_message(chunk)),
    );
    engine
}

/// Dispatches one already-validated message per the current session
/// state (the accepted and authenticated dispatch tables below).
fn dispatch(
    server: &Arc<Server>,
    handle: &Arc<SessionHandle>,
    engine: &mut Option<ShellEngine>,
    msg: Message,
) {
    let state = *handle.state.lock().unwrap();
    match state {
        SessionState::Accepted => dispatch_accepted(server, handle, engine, msg),
        SessionState::Authenticated => dispatch_authenticated(server, handle, engine, msg),
        SessionState::Closing | SessionState::Closed => {}
    }
}

fn dispatch_accepted(
    server: &Arc<Server>,
    handle: &Arc<SessionHandle>,
    engine: &mut Option<ShellEngine>,
    msg: Message,
) {
    match msg.payload {
        Payload::AuthRequest(payload) => {
            let outcome = auth::authenticate(
                &server.config.auth,
                &payload,
                server.token_validator.as_deref(),
            );
            if outcome.success {
                *handle.username.lock().unwrap() = outcome.username;
                *handle.state.lock().unwrap() = SessionState::Authenticated;
                handle.enqueue(Message::new(
                    msg.id.clone(),
                    now_ms(),
                    Payload::AuthResponse(rsh_protocol::AuthResponsePayload {
                        success: true,
                        error: None,
                        session_id: Some(handle.id.clone()),
                    }),
                ));
                match server.config.shell_mode {
                    ShellMode::PerSession => {
                        *engine = Some(build_engine(server, handle, server.config.prompt.clone()));
                    }
                    ShellMode::Shared => {
                        handle.enqueue(output_message("Welcome to rsh.\n"));
                    }
                }
            } else {
                handle.enqueue(Message::new(
                    msg.id.clone(),
                    now_ms(),
                    Payload::AuthResponse(rsh_protocol::AuthResponsePayload {
                        success: false,
                        error: outcome.error,
                        session_id: None,
                    }),
                ));
                handle.close("Authentication failed");
            }
        }
        Payload::Ping(_) => {
            handle.enqueue(Message::new(
                msg.id.clone(),
                now_ms(),
                Payload::Pong(PongPayload { uptime: server.uptime_secs() }),
            ));
        }
        Payload::Disconnect(payload) => {
            handle.close(&payload.reason);
        }
        _ => {
            handle.enqueue(error_message(
                None,
                ErrorCode::AuthRequired,
                "session is not authenticated",
            ));
        }
    }
}

fn dispatch_authenticated(
    server: &Arc<Server>,
    handle: &Arc<SessionHandle>,
    engine: &mut Option<ShellEngine>,
    msg: Message,
) {
    match msg.payload {
        Payload::Input(payload) => match engine {
            Some(engine) => engine.handle_input_bytes(payload.data.as_bytes()),
            None => server.feed_shared_shell(handle, payload.data.as_bytes()),
        },
        Payload::Ping(_) => {
            handle.enqueue(Message::new(
                msg.id.clone(),
                now_ms(),
                Payload::Pong(PongPayload { uptime: server.uptime_secs() }),
            ));
        }
        Payload::Disconnect(payload) => {
            handle.close(&payload.reason);
        }
        _ => {
            handle.enqueue(error_message(None, ErrorCode::Unsupported, "unsupported message type"));
        }
    }
}

pub fn new_session_handle(
    id: String,
    outbound_tx: crossbeam_channel::Sender<Message>,
    conn: Connection,
) -> SessionHandle {
    SessionHandle {
        id,
        username: Mutex::new(None),
        state: Mutex::new(SessionState::Accepted),
        connected_at: Instant::now(),
        last_activity: Mutex::new(Instant::now()),
        outbound_tx: Mutex::new(Some(outbound_tx)),
        closing: AtomicBool::new(false),
        conn_for_shutdown: Mutex::new(conn),
    }
}
