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

//! The command registry: hierarchical subcommand storage, resolution,
//! help generation, execution, and tab-completion suggestions.
//!
//! Global process-wide command tables, the way the source this was
//! distilled from used them, make testing and multi-tenant embedding
//! painful. A `CommandRegistry` here is instance-scoped: callers build
//! one per shell engine and pass it in explicitly.

use std::cell::Cell;

use tracing::warn;

use crate::parser::{self, ParameterDefinition, ParsedArguments};

pub type Action = Box<dyn Fn(&mut ExecutionContext, &ParsedArguments) -> anyhow::Result<()> + Send + Sync>;
pub type Lifecycle = Box<dyn Fn() -> anyhow::Result<()> + Send + Sync>;
pub type HealthCheck = Box<dyn Fn() -> anyhow::Result<bool> + Send + Sync>;
pub type ArgumentSuggestions = Box<dyn Fn(&[String], &str) -> Vec<String> + Send + Sync>;

/// A single command or subcommand node. Subcommands are kept in an
/// ordered `Vec` rather than a map so registration order survives into
/// help and suggestion output; uniqueness of names within one node is
/// enforced by `Command::add_subcommand`, not by the type.
pub struct Command {
    pub name: String,
    pub description: String,
    pub subcommands: Vec<Command>,
    pub parameters: Vec<ParameterDefinition>,
    pub action: Option<Action>,
    pub init: Option<Lifecycle>,
    pub cleanup: Option<Lifecycle>,
    pub health_check: Option<HealthCheck>,
    pub argument_suggestions: Option<ArgumentSuggestions>,
}

impl Command {
    pub fn new(name: impl Into<String>) -> Self {
        Command {
            name: name.into(),
            description: String::new(),
            subcommands: Vec::new(),
            parameters: Vec::new(),
            action: None,
            init: None,
            cleanup: None,
            health_check: None,
            argument_suggestions: None,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn parameter(mut self, param: ParameterDefinition) -> Self {
        self.parameters.push(param);
        self
    }

    pub fn action<F>(mut self, action: F) -> Self
    where
        F: Fn(&mut ExecutionContext, &ParsedArguments) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.action = Some(Box::new(action));
        self
    }

    pub fn argument_suggestions<F>(mut self, f: F) -> Self
    where
        F: Fn(&[String], &str) -> Vec<String> + Send + Sync + 'static,
    {
        self.argument_suggestions = Some(Box::new(f));
        self
    }

    /// Adds `sub` as a subcommand, overwriting any existing subcommand of
    /// the same name with a warning (the same overwrite-not-hard-error
    /// policy `CommandRegistry::register` applies at the top level).
    pub fn subcommand(mut self, sub: Command) -> Self {
        if let Some(idx) = self.subcommands.iter().position(|c| c.name == sub.name) {
            warn!("overwriting existing subcommand '{}' of '{}'", sub.name, self.name);
            self.subcommands.remove(idx);
        }
        self.subcommands.push(sub);
        self
    }
}

/// Passed to an action/help renderer; wraps the one place command output
/// may go. Held as a trait object rather than a generic so `Command`
/// doesn't need a type parameter threaded through the whole registry.
pub struct ExecutionContext<'a> {
    sink: &'a mut dyn FnMut(&str),
    stop_requested: Cell<bool>,
}

impl<'a> ExecutionContext<'a> {
    pub fn new(sink: &'a mut dyn FnMut(&str)) -> Self {
        ExecutionContext { sink, stop_requested: Cell::new(false) }
    }

    pub fn emit(&mut self, chunk: &str) {
        (self.sink)(chunk)
    }

    /// Lets a builtin such as `exit` ask the session hosting this shell to
    /// tear down once the action returns, without the registry needing a
    /// handle back into the server or client runtime.
    pub fn request_stop(&self) {
        self.stop_requested.set(true);
    }
}

#[derive(Debug, Clone, Default)]
pub struct ExecutionResult {
    pub success: bool,
    pub error: Option<String>,
    pub stop_requested: bool,
}

struct Resolved<'a> {
    command: &'a Command,
    path: Vec<String>,
    tail: Vec<String>,
}

#[derive(Default)]
pub struct CommandRegistry {
    commands: Vec<Command>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        CommandRegistry::default()
    }

    /// Registering a name that already exists overwrites it with a
    /// visible warning rather than a hard error; the displaced command's
    /// `cleanup` and the new one's `init` both run best-effort.
    pub fn register(&mut self, command: Command) {
        if let Some(idx) = self.commands.iter().position(|c| c.name == command.name) {
            warn!("overwriting existing command '{}'", command.name);
            let old = self.commands.remove(idx);
            if let Some(cleanup) = &old.cleanup {
                if let Err(e) = cleanup() {
                    warn!("cleanup for replaced command '{}' failed: {e:#}", old.name);
                }
            }
        }
        if let Some(init) = &command.init {
            if let Err(e) = init() {
                warn!("init for command '{}' failed: {e:#}", command.name);
            }
        }
        self.commands.push(command);
    }

    pub fn unregister(&mut self, name: &str) {
        if let Some(idx) = self.commands.iter().position(|c| c.name == name) {
            let removed = self.commands.remove(idx);
            if let Some(cleanup) = &removed.cleanup {
                if let Err(e) = cleanup() {
                    warn!("cleanup for unregistered command '{}' failed: {e:#}", removed.name);
                }
            }
        }
    }

    pub fn top_level_names(&self) -> Vec<String> {
        self.commands.iter().map(|c| c.name.clone()).collect()
    }

    /// Whether `path` (a whitespace-joined command path, as produced by
    /// `suggestions`) names a leaf command with no subcommands of its
    /// own. Used by the shell engine to decide whether to append a
    /// trailing space after a single-match tab completion.
    pub fn is_terminal_command(&self, path: &str) -> bool {
        let tokens: Vec<String> = path.split_whitespace().map(|s| s.to_string()).collect();
        match self.resolve(&tokens) {
            Some(r) if r.tail.is_empty() => r.command.subcommands.is_empty(),
            _ => false,
        }
    }

    fn resolve<'a>(&'a self, tokens: &[String]) -> Option<Resolved<'a>> {
        let first = tokens.first()?;
        let mut node = self.commands.iter().find(|c| c.name == *first)?;
        let mut path = vec![node.name.clone()];
        let mut idx = 1;
        while idx < tokens.len() {
            match node.subcommands.iter().find(|c| c.name == tokens[idx]) {
                Some(sub) => {
                    node = sub;
                    path.push(sub.name.clone());
                    idx += 1;
                }
                None => break,
            }
        }
        Some(Resolved { command: node, path, tail: tokens[idx..].to_vec() })
    }

    fn best_match(&self, unknown: &str) -> Option<String> {
        self.commands
            .iter()
            .map(|c| (c.name.as_str(), common_prefix_len(&c.name, unknown)))
            .filter(|(_, len)| *len > 0)
            .max_by_key(|(_, len)| *len)
            .map(|(name, _)| name.to_string())
    }

    /// Renders a help block for a resolved command: description, usage
    /// line, option table, subcommand table. Returned as text, not
    /// printed; callers decide where it goes.
    pub fn render_help(&self, command: &Command, path: &[String]) -> String {
        let mut out = String::new();
        if !command.description.is_empty() {
            out.push_str(&command.description);
            out.push('\n');
        }
        let usage_suffix = if command.subcommands.is_empty() { "" } else { " [<subcommand>]" };
        out.push_str(&format!("usage: {} [options]{usage_suffix}\n", path.join(" ")));

        if !command.parameters.is_empty() {
            out.push_str("options:\n");
            for p in &command.parameters {
                let alias = p.alias.map(|a| format!("-{a}, ")).unwrap_or_default();
                let required = if p.required { " (required)" } else { "" };
                out.push_str(&format!(
                    "  {alias}--{:<12} {}{}\n",
                    p.name, p.description, required
                ));
            }
        }

        if !command.subcommands.is_empty() {
            out.push_str("subcommands:\n");
            for sub in &command.subcommands {
                out.push_str(&format!("  {:<14} {}\n", sub.name, sub.description));
            }
        }

        out
    }

    /// Parses the tail of a resolved command and invokes its action, or
    /// writes help/errors to the context instead. This is the entry
    /// point the shell engine's input processor calls with each
    /// submitted line.
    pub fn execute(&self, line: &str, ctx: &mut ExecutionContext) -> ExecutionResult {
        let tokens: Vec<String> = line.split_whitespace().map(|s| s.to_string()).collect();
        if tokens.is_empty() {
            return ExecutionResult { success: true, error: None, stop_requested: false };
        }

        let resolved = match self.resolve(&tokens) {
            Some(r) => r,
            None => {
                let mut msg = format!("Unknown command '{}'", tokens[0]);
                if let Some(best) = self.best_match(&tokens[0]) {
                    msg.push_str(&format!(" Did you mean '{best}'?"));
                }
                ctx.emit(&msg);
                return ExecutionResult { success: false, error: Some(msg), stop_requested: false };
            }
        };

        let parsed = parser::parse(&resolved.tail, &resolved.command.parameters);
        if !parsed.errors.is_empty() {
            for e in &parsed.errors {
                ctx.emit(&format!("  - {e}"));
            }
            return ExecutionResult {
                success: false,
                error: Some(parsed.errors.join("; ")),
                stop_requested: false,
            };
        }

        if parsed.help_requested {
            ctx.emit(&self.render_help(resolved.command, &resolved.path));
            return ExecutionResult { success: true, error: None, stop_requested: false };
        }

        let result = match &resolved.command.action {
            Some(action) => match action(ctx, &parsed) {
                Ok(()) => ExecutionResult { success: true, error: None, stop_requested: false },
                Err(e) => {
                    ctx.emit(&format!("error: {e:#}"));
                    ExecutionResult {
                        success: false,
                        error: Some(e.to_string()),
                        stop_requested: false,
                    }
                }
            },
            None => ExecutionResult { success: true, error: None, stop_requested: false },
        };
        ExecutionResult { stop_requested: ctx.stop_requested.get(), ..result }
    }

    /// Tab-completion suggestions for a partial input string, per the
    /// navigate-as-deep-as-possible algorithm.
    pub fn suggestions(&self, input: &str) -> Vec<String> {
        let ends_with_ws = input.is_empty() || input.ends_with(char::is_whitespace);
        let tokens: Vec<String> = input.split_whitespace().map(|s| s.to_string()).collect();
        let consume_len = if ends_with_ws { tokens.len() } else { tokens.len().saturating_sub(1) };

        let mut node_commands: &[Command] = &self.commands;
        let mut current: Option<&Command> = None;
        let mut path: Vec<String> = Vec::new();
        let mut idx = 0;
        while idx < consume_len {
            match node_commands.iter().find(|c| c.name == tokens[idx]) {
                Some(c) => {
                    current = Some(c);
                    node_commands = &c.subcommands;
                    path.push(tokens[idx].clone());
                    idx += 1;
                }
                None => break,
            }
        }

        if ends_with_ws {
            if let Some(cmd) = current {
                if let Some(f) = &cmd.argument_suggestions {
                    let result = f(&[], "");
                    if !result.is_empty() {
                        return result;
                    }
                }
                return cmd
                    .subcommands
                    .iter()
                    .map(|c| format!("{} {}", path.join(" "), c.name))
                    .collect();
            }
            return self.top_level_names();
        }

        let partial = tokens.last().cloned().unwrap_or_default();
        let candidates: &[Command] = match current {
            Some(c) => &c.subcommands,
            None => &self.commands,
        };
        let matches: Vec<String> = candidates
            .iter()
            .filter(|c| c.name.starts_with(&partial))
            .map(|c| if path.is_empty() { c.name.clone() } else { format!("{} {}", path.join(" "), c.name) })
            .collect();
        if !matches.is_empty() {
            return matches;
        }

        if let Some(cmd) = current {
            if let Some(f) = &cmd.argument_suggestions {
                let args_before_partial = &tokens[path.len()..tokens.len().saturating_sub(1)];
                let result: Vec<String> =
                    f(args_before_partial, &partial).into_iter().filter(|s| s.starts_with(&partial)).collect();
                if !result.is_empty() {
                    return result;
                }
            }
        }

        Vec::new()
    }
}

fn common_prefix_len(a: &str, b: &str) -> usize {
    a.chars().zip(b.chars()).take_while(|(x, y)| x == y).count()
}

/// The longest shared leading string of a non-empty suggestion set, used
/// to implement partial autocomplete.
pub fn common_prefix(strs: &[String]) -> String {
    let mut iter = strs.iter();
    let Some(first) = iter.next() else {
        return String::new();
    };
    let mut prefix: Vec<char> = first.chars().collect();
    for s in iter {
        let chars: Vec<char> = s.chars().collect();
        let mut i = 0;
        while i < prefix.len() && i < chars.len() && prefix[i] == chars[i] {
            i += 1;
        }
        prefix.truncate(i);
        if prefix.is_empty() {
            break;
        }
    }
    prefix.into_iter().collect()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::parser::ParameterType;
    use std::sync::{Arc, Mutex};

    fn echo_registry() -> CommandRegistry {
        let mut registry = CommandRegistry::new();
        registry.register(
            Command::new("echo")
                .description("echoes its argument")
                .subcommand(
                    Command::new("normal").description("echo verbatim").action(|ctx, args| {
                        ctx.emit(args.positional.join(" ").as_str());
                        Ok(())
                    }),
                )
                .subcommand(Command::new("reverse").description("echo reversed").action(
                    |ctx, args| {
                        let joined = args.positional.join(" ");
                        ctx.emit(&joined.chars().rev().collect::<String>());
                        Ok(())
                    },
                )),
        );
        registry.register(Command::new("help").description("show help"));
        registry
    }

    fn capture() -> (Arc<Mutex<Vec<String>>>, impl FnMut(&str)) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let log_clone = log.clone();
        let sink = move |s: &str| log_clone.lock().unwrap().push(s.to_string());
        (log, sink)
    }

    #[test]
    fn resolves_nested_subcommand() {
        let registry = echo_registry();
        let (log, mut sink) = capture();
        let mut ctx = ExecutionContext::new(&mut sink);
        let result = registry.execute("echo normal hello world", &mut ctx);
        assert!(result.success);
        assert_eq!(log.lock().unwrap().as_slice(), ["hello world"]);
    }

    #[test]
    fn unknown_command_reports_suggestion() {
        let registry = echo_registry();
        let (log, mut sink) = capture();
        let mut ctx = ExecutionContext::new(&mut sink);
        let result = registry.execute("ech normal", &mut ctx);
        assert!(!result.success);
        assert!(log.lock().unwrap()[0].contains("Unknown command"));
    }

    #[test]
    fn register_overwrites_with_warning_not_error() {
        let mut registry = CommandRegistry::new();
        registry.register(Command::new("dup").description("first"));
        registry.register(Command::new("dup").description("second"));
        assert_eq!(registry.top_level_names(), vec!["dup".to_string()]);
    }

    #[test]
    fn suggestions_on_whitespace_return_subcommands() {
        let registry = echo_registry();
        let suggestions = registry.suggestions("echo ");
        assert!(suggestions.contains(&"echo normal".to_string()));
        assert!(suggestions.contains(&"echo reverse".to_string()));
    }

    #[test]
    fn suggestions_filter_by_partial_prefix() {
        let registry = echo_registry();
        let suggestions = registry.suggestions("echo n");
        assert_eq!(suggestions, vec!["echo normal".to_string()]);
    }

    #[test]
    fn suggestions_at_depth_zero_filter_top_level() {
        let registry = echo_registry();
        let suggestions = registry.suggestions("ec");
        assert_eq!(suggestions, vec!["echo".to_string()]);
    }

    #[test]
    fn common_prefix_of_suggestions() {
        let prefix = common_prefix(&["echo normal".to_string(), "echo reverse".to_string()]);
        assert_eq!(prefix, "echo ");
    }

    #[test]
    fn help_flag_emits_help_not_error() {
        let registry = echo_registry();
        let (log, mut sink) = capture();
        let mut ctx = ExecutionContext::new(&mut sink);
        let result = registry.execute("echo --help", &mut ctx);
        assert!(result.success);
        assert!(log.lock().unwrap()[0].contains("usage:"));
    }

    #[test]
    fn argument_suggestions_used_when_present() {
        let mut registry = CommandRegistry::new();
        registry.register(Command::new("greet").argument_suggestions(|_args, partial| {
            vec!["alice".to_string(), "bob".to_string()]
                .into_iter()
                .filter(|n| n.starts_with(partial))
                .collect()
        }));
        let suggestions = registry.suggestions("greet a");
        assert_eq!(suggestions, vec!["alice".to_string()]);
    }

    #[test]
    fn parameter_type_is_reexported_for_callers() {
        let _ = ParameterType::String;
    }
}
