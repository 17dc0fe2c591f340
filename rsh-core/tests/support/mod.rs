// This module is used from multiple integration test files, each of
// which gets compiled into its own binary. Not all binaries use all of
// it.
#![allow(dead_code)]

use std::{
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

use rsh_core::{config::ServerConfig, registry::CommandRegistry, server::Server};
use tempfile::TempDir;

/// A server running on its own thread. The caller owns the `TempDir`
/// backing its Unix socket path (via `socket_path()`) and must keep it
/// alive for as long as this handle, and any later server reusing the
/// same path, are in use.
pub struct RunningServer {
    pub server: Arc<Server>,
    handle: Option<thread::JoinHandle<()>>,
}

impl RunningServer {
    pub fn stop(mut self) {
        self.server.stop();
        if let Some(h) = self.handle.take() {
            let _ = h.join();
        }
    }
}

/// A fresh Unix socket path inside a hermetic tempdir, the way
/// `libshpool`'s own tests build a scratch `runtime_dir` per test rather
/// than risking collisions on a shared path.
pub fn socket_path() -> (TempDir, String) {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("rsh-test.sock").to_string_lossy().into_owned();
    (dir, path)
}

/// Spawns a server with the given config (with builtins registered) on
/// its own thread and waits until its Unix socket is accepting
/// connections before returning.
pub fn spawn_server(config: ServerConfig, socket_path: &str) -> RunningServer {
    let mut registry = CommandRegistry::new();
    rsh_core::builtins::register_all(&mut registry);
    let server = Server::new(config, Arc::new(registry), None);
    let server_for_thread = server.clone();
    let handle = thread::spawn(move || {
        let _ = server_for_thread.serve();
    });

    wait_until(Duration::from_secs(2), Duration::from_millis(10), || {
        std::os::unix::net::UnixStream::connect(socket_path).is_ok()
    });

    RunningServer { server, handle: Some(handle) }
}

/// Polls `pred` until it returns true or `total` elapses, sleeping
/// `interval` between attempts. Returns whether `pred` ever succeeded.
pub fn wait_until(total: Duration, interval: Duration, mut pred: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + total;
    loop {
        if pred() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(interval);
    }
}
