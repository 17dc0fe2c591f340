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

//! The server session engine: the listener accept loop, the keepalive
//! timer, and the shared-shell broadcast path. Grounded in
//! `libshpool::daemon::server::Server`, which keeps a
//! `Arc<Mutex<HashMap<String, Box<shell::Session>>>>` of live sessions
//! and spawns one `std::thread` per accepted connection from a blocking
//! `listener.incoming()` loop; this server does the same, except the
//! accept loop is non-blocking so `stop()` can be observed promptly.

pub mod auth;
mod session;

pub use auth::TokenValidator;
pub use session::{SessionHandle, SessionState};

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
    thread,
    time::Instant,
};

use rsh_protocol::{Message, Payload, PingPayload};
use tracing::{info, instrument, warn};

use crate::{
    config::{ServerConfig, ShellMode},
    consts,
    registry::{CommandRegistry, ExecutionContext},
    shell::ShellEngine,
    transport::{Connection, Listener},
};

struct SharedShell {
    engine: Mutex<ShellEngine>,
    stop_requested: Arc<AtomicBool>,
}

pub struct Server {
    config: ServerConfig,
    registry: Arc<CommandRegistry>,
    token_validator: Option<Arc<dyn TokenValidator>>,
    sessions: Arc<Mutex<HashMap<String, Arc<SessionHandle>>>>,
    start_time: Instant,
    stop_flag: Arc<AtomicBool>,
    shared: Option<SharedShell>,
}

impl Server {
    pub fn new(
        config: ServerConfig,
        registry: Arc<CommandRegistry>,
        token_validator: Option<Arc<dyn TokenValidator>>,
    ) -> Arc<Server> {
        let sessions: Arc<Mutex<HashMap<String, Arc<SessionHandle>>>> =
            Arc::new(Mutex::new(HashMap::new()));
        let shared = match config.shell_mode {
            ShellMode::Shared => Some(build_shared_shell(&config, &registry, &sessions)),
            ShellMode::PerSession => None,
        };

        Arc::new(Server {
            config,
            registry,
            token_validator,
            sessions,
            start_time: Instant::now(),
            stop_flag: Arc::new(AtomicBool::new(false)),
            shared,
        })
    }

    pub fn uptime_secs(&self) -> f64 {
        self.start_time.elapsed().as_secs_f64()
    }

    /// Binds the configured listener and runs the accept loop plus the
    /// keepalive timer to completion; returns once `stop()` has been
    /// called and every session has wound down. Blocks the calling
    /// thread, the same as `daemon::run` blocking on `Server::serve` in
    /// the teacher.
    #[instrument(skip_all)]
    pub fn serve(self: Arc<Self>) -> anyhow::Result<()> {
        let listener = Listener::bind(self.config.listener())?;
        info!("listening on {:?}", self.config.listener());

        let keepalive = {
            let server = self.clone();
            thread::spawn(move || server.run_keepalive())
        };

        loop {
            if self.stop_flag.load(Ordering::SeqCst) {
                break;
            }
            match listener.try_accept() {
                Ok(Some(conn)) => self.clone().accept(conn),
                Ok(None) => thread::sleep(consts::JOIN_POLL_DURATION),
                Err(e) => warn!("accept error: {:?}", e),
            }
        }

        self.close_all_sessions("server stopping");
        self.wait_for_sessions_to_drain();
        let _ = keepalive.join();
        listener.remove_socket_file();
        Ok(())
    }

    /// Signals the accept loop and keepalive timer to stop and every
    /// live session to close. Idempotent; `serve()` performs the actual
    /// listener teardown once it observes the flag, so this method
    /// itself never blocks on I/O.
    pub fn stop(&self) {
        self.stop_flag.store(true, Ordering::SeqCst);
        self.close_all_sessions("server stopping");
    }

    fn close_all_sessions(&self, reason: &str) {
        let snapshot: Vec<Arc<SessionHandle>> =
            self.sessions.lock().unwrap().values().cloned().collect();
        for session in snapshot {
            session.close(reason);
        }
    }

    fn wait_for_sessions_to_drain(&self) {
        loop {
            if self.sessions.lock().unwrap().is_empty() {
                return;
            }
            thread::sleep(consts::JOIN_POLL_DURATION);
        }
    }

    fn accept(self: Arc<Self>, conn: Connection) {
        let too_many = self.sessions.lock().unwrap().len() >= self.config.max_connections;
        if too_many {
            warn!("rejecting connection beyond max_connections={}", self.config.max_connections);
            let _ = conn.shutdown(std::net::Shutdown::Both);
            return;
        }

        let shutdown_conn = match conn.try_clone() {
            Ok(c) => c,
            Err(e) => {
                warn!("cloning accepted connection: {:?}", e);
                return;
            }
        };

        let id = session::new_session_id();
        let (tx, rx) = crossbeam_channel::bounded(consts::OUTBOUND_QUEUE_CAPACITY);
        let handle = Arc::new(session::new_session_handle(id.clone(), tx, shutdown_conn));
        self.sessions.lock().unwrap().insert(id.clone(), handle.clone());
        info!("session {} connected", id);

        let server = self.clone();
        thread::spawn(move || {
            session::run(server, handle, conn, rx);
        });
    }

    fn remove_session(&self, id: &str) {
        if self.sessions.lock().unwrap().remove(id).is_some() {
            info!("session {} disconnected", id);
        }
    }

    fn run_keepalive(&self) {
        loop {
            thread::sleep(self.config.ping_interval());
            if self.stop_flag.load(Ordering::SeqCst) {
                return;
            }
            let timeout = consts::session_timeout(self.config.ping_interval());
            let snapshot: Vec<Arc<SessionHandle>> =
                self.sessions.lock().unwrap().values().cloned().collect();
            for session in snapshot {
                if session.is_stale(timeout) {
                    session.close("timeout");
                } else {
                    session.enqueue(Message::new(
                        session::new_message_id(),
                        session::now_ms(),
                        Payload::Ping(PingPayload::default()),
                    ));
                }
            }
        }
    }

    fn feed_shared_shell(&self, _handle: &Arc<SessionHandle>, bytes: &[u8]) {
        let Some(shared) = &self.shared else { return };
        shared.engine.lock().unwrap().handle_input_bytes(bytes);
        if shared.stop_requested.swap(false, Ordering::SeqCst) {
            shared.engine.lock().unwrap().stop();
            self.close_all_sessions("shell exited");
        }
    }
}

fn build_shared_shell(
    config: &ServerConfig,
    registry: &Arc<CommandRegistry>,
    sessions: &Arc<Mutex<HashMap<String, Arc<SessionHandle>>>>,
) -> SharedShell {
    let mut engine = ShellEngine::new(config.prompt.clone(), registry.clone());
    let stop_requested = Arc::new(AtomicBool::new(false));

    let sessions_for_output = sessions.clone();
    let sessions_for_exec = sessions.clone();
    let registry_for_exec = registry.clone();
    let stop_for_exec = stop_requested.clone();

    engine.start(
        move |line: &str| {
            let mut sink = |chunk: &str| broadcast_output(&sessions_for_exec, chunk);
            let mut ctx = ExecutionContext::new(&mut sink);
            let result = registry_for_exec.execute(line, &mut ctx);
            if result.stop_requested {
                stop_for_exec.store(true, Ordering::SeqCst);
            }
        },
        move |chunk: &str| broadcast_output(&sessions_for_output, chunk),
    );

    SharedShell { engine: Mutex::new(engine), stop_requested }
}

fn broadcast_output(sessions: &Arc<Mutex<HashMap<String, Arc<SessionHandle>>>>, chunk: &str) {
    let snapshot: Vec<Arc<SessionHandle>> = sessions.lock().unwrap().values().cloned().collect();
    for session in snapshot {
        if *session.state.lock().unwrap() == SessionState::Authenticated {
            session.enqueue(session::output_message(chunk));
        }
    }
}
