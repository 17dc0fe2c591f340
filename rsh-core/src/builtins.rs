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

//! A handful of self-contained commands used to exercise the registry
//! end to end. Filesystem and process commands are an external
//! collaborator's job, not this crate's; these builtins never touch
//! either.

use crate::registry::{Command, CommandRegistry};

/// Registers `help`, `echo` (with `normal`/`reverse` subcommands, as in
/// spec scenario 4), and `exit` on `registry`. Callers building their
/// own shell are free to skip this and register only what they need;
/// `rsh-cli serve` calls it for the demo shell.
pub fn register_all(registry: &mut CommandRegistry) {
    registry.register(help_command());
    registry.register(echo_command());
    registry.register(exit_command());
}

fn help_command() -> Command {
    Command::new("help").description("list available commands").action(|ctx, _args| {
        ctx.emit("Type a command name, or '<command> --help' for details.");
        Ok(())
    })
}

fn echo_command() -> Command {
    Command::new("echo")
        .description("echo the given words back")
        .subcommand(Command::new("normal").description("echo the words verbatim").action(
            |ctx, args| {
                ctx.emit(&args.positional.join(" "));
                Ok(())
            },
        ))
        .subcommand(Command::new("reverse").description("echo the words reversed").action(
            |ctx, args| {
                let joined = args.positional.join(" ");
                ctx.emit(&joined.chars().rev().collect::<String>());
                Ok(())
            },
        ))
}

fn exit_command() -> Command {
    Command::new("exit").description("end the session").action(|ctx, _args| {
        ctx.request_stop();
        Ok(())
    })
}
