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

use std::fs;

use anyhow::Context;
use serde::Deserialize;
use tracing::{info, instrument};

use crate::consts;

/// Which kind of stream socket a server listens on, or a client dials.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum ListenerConfig {
    Tcp { host: String, port: u16 },
    Unix { path: String },
}

impl Default for ListenerConfig {
    fn default() -> Self {
        ListenerConfig::Unix { path: "/tmp/rsh.sock".to_string() }
    }
}

fn default_listener() -> ListenerConfig {
    ListenerConfig::default()
}

/// A user entry for `basic` auth: the stored hash is lowercase hex SHA-256
/// of the password, never the password itself.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BasicUser {
    pub username: String,
    pub password_hash: String,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum AuthConfig {
    #[default]
    None,
    Basic {
        users: Vec<BasicUser>,
    },
    /// The validator itself is supplied programmatically by the embedder,
    /// not via TOML; this variant only says "token auth is in effect".
    Token,
}

/// Whether one shell engine's state is shared across every connected
/// session, or each session gets its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShellMode {
    #[default]
    PerSession,
    Shared,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    #[serde(default = "default_listener")]
    pub listener: ListenerConfig,
    pub auth: AuthConfig,
    pub ping_interval_ms: u64,
    pub max_connections: usize,
    pub prompt: String,
    pub shell_mode: ShellMode,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            listener: ListenerConfig::default(),
            auth: AuthConfig::default(),
            ping_interval_ms: consts::DEFAULT_PING_INTERVAL.as_millis() as u64,
            max_connections: consts::DEFAULT_MAX_CONNECTIONS,
            prompt: consts::DEFAULT_PROMPT.to_string(),
            shell_mode: ShellMode::default(),
        }
    }
}

impl ServerConfig {
    pub fn ping_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.ping_interval_ms)
    }

    pub fn listener(&self) -> &ListenerConfig {
        &self.listener
    }

    /// Mirrors `libshpool::config::read_config`: fall back to defaults
    /// when no file is given, otherwise parse and fail loudly.
    #[instrument(skip_all)]
    pub fn from_file(path: &Option<String>) -> anyhow::Result<ServerConfig> {
        match path {
            Some(path) => {
                info!("parsing explicitly passed in server config ({})", path);
                let raw = fs::read_to_string(path).context("reading server config toml")?;
                Self::from_str(&raw)
            }
            None => Ok(ServerConfig::default()),
        }
    }

    pub fn from_str(raw: &str) -> anyhow::Result<ServerConfig> {
        toml::from_str(raw).context("parsing server config toml")
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub target: Option<ListenerConfig>,
    pub credentials: Option<Credentials>,
    pub token: Option<String>,
    pub auto_reconnect: bool,
    pub reconnect_delay_ms: u64,
    pub max_reconnect_attempts: u32,
    pub request_timeout_ms: u64,
}

impl ClientConfig {
    pub fn reconnect_delay(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn request_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.request_timeout_ms)
    }

    #[instrument(skip_all)]
    pub fn from_file(path: &Option<String>) -> anyhow::Result<ClientConfig> {
        match path {
            Some(path) => {
                info!("parsing explicitly passed in client config ({})", path);
                let raw = fs::read_to_string(path).context("reading client config toml")?;
                toml::from_str(&raw).context("parsing client config toml")
            }
            None => Ok(ClientConfig::default()),
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        // serde(default) above only covers missing TOML keys; this impl
        // covers the zero-arg `ClientConfig::default()` call sites.
        ClientConfig {
            target: None,
            credentials: None,
            token: None,
            auto_reconnect: consts::DEFAULT_AUTO_RECONNECT,
            reconnect_delay_ms: consts::DEFAULT_RECONNECT_DELAY.as_millis() as u64,
            max_reconnect_attempts: consts::DEFAULT_MAX_RECONNECT_ATTEMPTS,
            request_timeout_ms: consts::DEFAULT_REQUEST_TIMEOUT.as_millis() as u64,
        }
    }
}
