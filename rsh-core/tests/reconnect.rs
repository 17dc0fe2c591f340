//! Covers the auto-reconnect scenario: the server goes away, the client
//! notices and starts retrying, and a fresh server bound on the same
//! socket path picks the client back up with a new session id.

mod support;

use std::time::Duration;

use ntest::timeout;

use rsh_core::{
    client::{Client, ClientHandler},
    config::{AuthConfig, ClientConfig, ListenerConfig, ServerConfig},
};

struct NullHandler;
impl ClientHandler for NullHandler {}

fn server_config(socket: &str) -> ServerConfig {
    ServerConfig {
        listener: ListenerConfig::Unix { path: socket.to_string() },
        auth: AuthConfig::None,
        ping_interval_ms: 30_000,
        max_connections: 10,
        prompt: "rsh> ".to_string(),
        shell_mode: Default::default(),
    }
}

fn client_config(socket: &str) -> ClientConfig {
    ClientConfig {
        target: Some(ListenerConfig::Unix { path: socket.to_string() }),
        credentials: None,
        token: None,
        auto_reconnect: true,
        reconnect_delay_ms: 50,
        max_reconnect_attempts: 20,
        request_timeout_ms: 5_000,
    }
}

#[test]
#[timeout(10000)]
fn client_reconnects_with_a_fresh_session_after_server_restart() {
    let (_dir, socket) = support::socket_path();

    let server_a = support::spawn_server(server_config(&socket), &socket);

    let client = Client::connect(client_config(&socket), std::sync::Arc::new(NullHandler))
        .expect("connects to the first server");
    assert!(client.is_connected());
    let first_session = client.session_id().expect("authenticated with no auth configured");

    // Stopping server A closes the client's socket out from under it,
    // which should trip `local_disconnect` and schedule a reconnect
    // since `auto_reconnect` is set.
    server_a.stop();

    support::wait_until(Duration::from_secs(2), Duration::from_millis(20), || {
        !client.is_connected()
    });
    assert!(!client.is_connected(), "client should notice server A is gone");

    // `_dir` is still in scope, so the socket path is still a valid
    // directory for server B to bind into; the reconnect loop is left
    // retrying against that same path in the background.
    let server_b = support::spawn_server(server_config(&socket), &socket);

    let reconnected = support::wait_until(Duration::from_secs(5), Duration::from_millis(20), || {
        client.is_connected()
    });
    assert!(reconnected, "client should reconnect once server B is listening");

    let second_session = client.session_id().expect("re-authenticated against server B");
    assert_ne!(first_session, second_session, "a restart must hand out a fresh session id");

    client.disconnect();
    server_b.stop();
}
