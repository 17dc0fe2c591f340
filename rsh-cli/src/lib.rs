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

//! The `rsh` binary's `clap` surface: `serve` runs the session engine
//! against a listener, `connect` dials one and bridges the process's own
//! stdin/stdout to the session. Grounded in `libshpool::{Args, Commands}`
//! and `shpool/src/main.rs`'s three-line delegation to the library.

mod connect;
mod serve;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[clap(author, about, version)]
pub struct Args {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[clap(about = "Runs the session engine, accepting connections on a TCP or Unix listener")]
    Serve {
        #[clap(short, long, action, help = "a toml file containing server configuration")]
        config: Option<String>,

        #[clap(short, long, action = clap::ArgAction::Count, help = "show more in logs, may be provided multiple times")]
        verbose: u8,
    },

    #[clap(about = "Connects to a running rsh server and bridges stdin/stdout to the shell")]
    Connect {
        #[clap(long, help = "server host (use with --port for a TCP target)")]
        host: Option<String>,

        #[clap(long, help = "server port (use with --host for a TCP target)")]
        port: Option<u16>,

        #[clap(long, help = "unix socket path (alternative to --host/--port)")]
        socket: Option<String>,

        #[clap(short, long, help = "username to authenticate with (basic auth)")]
        user: Option<String>,

        #[clap(short, long, action, help = "a toml file containing client configuration")]
        config: Option<String>,

        #[clap(short, long, action = clap::ArgAction::Count, help = "show more in logs, may be provided multiple times")]
        verbose: u8,
    },
}

pub fn run(args: Args) -> anyhow::Result<()> {
    match args.command {
        Commands::Serve { config, verbose } => {
            rsh_core::logging::init(verbose);
            serve::run(config)
        }
        Commands::Connect { host, port, socket, user, config, verbose } => {
            rsh_core::logging::init(verbose);
            connect::run(config, host, port, socket, user)
        }
    }
}
