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

use std::io::{Read, Write};
use std::sync::Arc;

use anyhow::Context;
use tracing::{error, info};

use rsh_core::client::{Client, ClientHandler};
use rsh_core::config::{ClientConfig, Credentials, ListenerConfig};
use rsh_protocol::ErrorCode;

struct StdioHandler;

impl ClientHandler for StdioHandler {
    fn on_connect(&self) {
        info!("connected");
    }

    fn on_output(&self, content: &str) {
        let mut stdout = std::io::stdout();
        let _ = stdout.write_all(content.as_bytes());
        let _ = stdout.flush();
    }

    fn on_error(&self, message: &str, code: ErrorCode) {
        eprintln!("rsh: error ({code:?}): {message}");
    }

    fn on_disconnect(&self, reason: &str) {
        eprintln!("rsh: disconnected: {reason}");
    }
}

/// Loads a `ClientConfig`, applies the CLI's `--host`/`--port`/`--socket`
/// and `--user` overrides, connects, and bridges the process's own
/// stdin/stdout to the session the way `libshpool::attach::Client::pipe_bytes`
/// bridges a local tty to a remote shell, except the bytes it pipes are
/// INPUT/OUTPUT frames, not a raw byte stream, since there is no PTY.
pub fn run(
    config_path: Option<String>,
    host: Option<String>,
    port: Option<u16>,
    socket: Option<String>,
    user: Option<String>,
) -> anyhow::Result<()> {
    let mut config = ClientConfig::from_file(&config_path).context("loading client config")?;

    if let Some(socket) = socket {
        config.target = Some(ListenerConfig::Unix { path: socket });
    } else if let (Some(host), Some(port)) = (host, port) {
        config.target = Some(ListenerConfig::Tcp { host, port });
    }

    if let Some(username) = user {
        let password = std::env::var("RSH_PASSWORD").unwrap_or_default();
        config.credentials = Some(Credentials { username, password });
    }

    let handler: Arc<dyn ClientHandler> = Arc::new(StdioHandler);
    let client = Client::connect(config, handler).context("connecting to rsh server")?;

    let mut writer = client.input_writer();
    let mut stdin = std::io::stdin().lock();
    let mut buf = vec![0u8; 4096];
    loop {
        let nread = match stdin.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                error!("reading stdin: {:?}", e);
                break;
            }
        };
        if writer.write_all(&buf[..nread]).is_err() {
            break;
        }
    }

    client.disconnect();
    Ok(())
}
