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

//! rsh-core implements the shell framework that rsh-protocol's wire
//! format carries: argument parsing, the command registry, the
//! line-editing shell engine, and the server and client runtimes that
//! drive them over a stream socket.

pub mod builtins;
pub mod client;
pub mod config;
pub mod consts;
pub mod logging;
pub mod parser;
pub mod registry;
pub mod server;
pub mod shell;
pub mod transport;

pub use server::Server;
