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

use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use rsh_core::{
    builtins,
    config::ServerConfig,
    registry::CommandRegistry,
    server::Server,
};

/// Loads a `ServerConfig`, registers the built-in demo command set, and
/// blocks running the session engine to completion. `token` auth has no
/// CLI-supplied validator (the spec treats the validator as externally
/// provided, not TOML-configurable), so a server configured for it will
/// reject every TOKEN auth attempt until embedded as a library with one.
pub fn run(config_path: Option<String>) -> anyhow::Result<()> {
    let config = ServerConfig::from_file(&config_path).context("loading server config")?;

    let mut registry = CommandRegistry::new();
    builtins::register_all(&mut registry);

    info!("starting rsh server on {:?}", config.listener());
    let server = Server::new(config, Arc::new(registry), None);
    server.serve()
}
