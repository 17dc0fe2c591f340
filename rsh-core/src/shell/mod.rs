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

//! Line-edit state and the ESC/CSI escape-sequence state machine that
//! turns raw input bytes into buffer edits, history navigation, tab
//! completion, and submission. Terminal rendering (screen buffers,
//! cursor/scroll, color) is an external collaborator; this engine only
//! emits the redraw escape sequences a terminal is expected to honor.

use std::sync::Arc;

use crate::registry::{common_prefix, CommandRegistry};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EscapeState {
    Ground,
    GotEsc,
    InCsi,
}

pub struct ShellEngine {
    buffer: String,
    cursor: usize,
    history: Vec<String>,
    /// -1 means "editing the live buffer"; otherwise indexes from the
    /// most recent history entry.
    history_index: i64,
    temp_buffer: String,
    prompt: String,
    running: bool,
    escape_state: EscapeState,
    csi_params: String,
    registry: Arc<CommandRegistry>,
    input_processor: Box<dyn FnMut(&str) + Send>,
    output_sink: Box<dyn FnMut(&str) + Send>,
}

impl ShellEngine {
    pub fn new(prompt: impl Into<String>, registry: Arc<CommandRegistry>) -> Self {
        ShellEngine {
            buffer: String::new(),
            cursor: 0,
            history: Vec::new(),
            history_index: -1,
            temp_buffer: String::new(),
            prompt: prompt.into(),
            running: false,
            escape_state: EscapeState::Ground,
            csi_params: String::new(),
            registry,
            input_processor: Box::new(|_| {}),
            output_sink: Box::new(|_| {}),
        }
    }

    /// Marks the engine running, wires in the processor/sink pair, and
    /// emits a welcome message followed by the initial prompt.
    pub fn start(
        &mut self,
        input_processor: impl FnMut(&str) + Send + 'static,
        output_sink: impl FnMut(&str) + Send + 'static,
    ) {
        self.input_processor = Box::new(input_processor);
        self.output_sink = Box::new(output_sink);
        self.running = true;
        (self.output_sink)("Welcome to rsh.\n");
        self.emit_prompt();
    }

    pub fn stop(&mut self) {
        (self.output_sink)("\nSession terminated.\n");
        self.running = false;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn history(&self) -> &[String] {
        &self.history
    }

    /// Consumes raw input bytes: a server gets these from a session's
    /// INPUT frames, a local shell from its own tty.
    pub fn handle_input_bytes(&mut self, bytes: &[u8]) {
        for ch in String::from_utf8_lossy(bytes).chars() {
            self.handle_char(ch);
        }
    }

    fn handle_char(&mut self, ch: char) {
        match self.escape_state {
            EscapeState::Ground => self.handle_ground_char(ch),
            EscapeState::GotEsc => {
                if ch == '[' {
                    self.escape_state = EscapeState::InCsi;
                    self.csi_params.clear();
                } else {
                    self.escape_state = EscapeState::Ground;
                }
            }
            EscapeState::InCsi => {
                if ch.is_ascii_digit() || ch == ';' {
                    self.csi_params.push(ch);
                } else if ('@'..='~').contains(&ch) {
                    self.handle_csi_final(ch);
                    self.escape_state = EscapeState::Ground;
                } else {
                    self.escape_state = EscapeState::Ground;
                }
            }
        }
    }

    fn handle_ground_char(&mut self, ch: char) {
        match ch {
            '\u{1b}' => self.escape_state = EscapeState::GotEsc,
            '\r' | '\n' => self.submit(),
            '\u{03}' => self.ctrl_c(),
            '\u{7f}' | '\u{08}' => self.backspace(),
            '\u{09}' => self.tab_complete(),
            c if (c as u32) >= 0x20 => self.insert_char(c),
            _ => {}
        }
    }

    /// Only the sequences spec'd out in the recognized-sequence table
    /// have an effect here; everything else (including the reserved
    /// scroll sequences) is discarded silently, matching the shell
    /// engine's scope boundary with the external terminal renderer.
    fn handle_csi_final(&mut self, final_byte: char) {
        match (self.csi_params.as_str(), final_byte) {
            ("", 'A') => self.history_prev(),
            ("", 'B') => self.history_next(),
            ("", 'C') => self.cursor_right(),
            ("", 'D') => self.cursor_left(),
            ("5", '~') | ("6", '~') => {}
            _ => {}
        }
    }

    fn char_to_byte_idx(&self, char_idx: usize) -> usize {
        self.buffer.char_indices().nth(char_idx).map(|(i, _)| i).unwrap_or(self.buffer.len())
    }

    fn buffer_len_chars(&self) -> usize {
        self.buffer.chars().count()
    }

    fn insert_char(&mut self, c: char) {
        let byte_idx = self.char_to_byte_idx(self.cursor);
        self.buffer.insert(byte_idx, c);
        self.cursor += 1;
        self.redraw();
    }

    fn backspace(&mut self) {
        if self.cursor == 0 {
            return;
        }
        let start = self.char_to_byte_idx(self.cursor - 1);
        let end = self.char_to_byte_idx(self.cursor);
        self.buffer.replace_range(start..end, "");
        self.cursor -= 1;
        self.redraw();
    }

    fn cursor_left(&mut self) {
        if self.cursor > 0 {
            self.cursor -= 1;
        }
        self.redraw();
    }

    fn cursor_right(&mut self) {
        if self.cursor < self.buffer_len_chars() {
            self.cursor += 1;
        }
        self.redraw();
    }

    fn ctrl_c(&mut self) {
        (self.output_sink)("^C");
        self.buffer.clear();
        self.cursor = 0;
        self.history_index = -1;
        self.temp_buffer.clear();
        self.emit_prompt();
    }

    fn submit(&mut self) {
        (self.output_sink)("\n");
        let trimmed = self.buffer.trim().to_string();
        if !trimmed.is_empty() && self.history.last() != Some(&trimmed) {
            self.history.push(trimmed.clone());
        }
        self.buffer.clear();
        self.cursor = 0;
        self.history_index = -1;
        self.temp_buffer.clear();
        if !trimmed.is_empty() {
            (self.input_processor)(&trimmed);
        }
        if self.running {
            self.emit_prompt();
        }
    }

    fn load_from_history(&mut self) {
        let idx = self.history.len() - 1 - self.history_index as usize;
        self.buffer = self.history[idx].clone();
        self.cursor = self.buffer_len_chars();
        self.redraw();
    }

    fn history_prev(&mut self) {
        if self.history.is_empty() {
            return;
        }
        if self.history_index == -1 {
            self.temp_buffer = self.buffer.clone();
            self.history_index = 0;
        } else if (self.history_index as usize) < self.history.len() - 1 {
            self.history_index += 1;
        }
        self.load_from_history();
    }

    fn history_next(&mut self) {
        if self.history_index == -1 {
            return;
        }
        if self.history_index == 0 {
            self.history_index = -1;
            self.buffer = self.temp_buffer.clone();
            self.cursor = self.buffer_len_chars();
            self.redraw();
            return;
        }
        self.history_index -= 1;
        self.load_from_history();
    }

    fn current_token_start_char(&self) -> usize {
        let prefix: String = self.buffer.chars().take(self.cursor).collect();
        match prefix.rfind(char::is_whitespace) {
            Some(byte_idx) => prefix[..byte_idx].chars().count() + 1,
            None => 0,
        }
    }

    fn replace_token_span(&mut self, completion: &str, append_space: bool) {
        let token_start = self.current_token_start_char();
        let before: String = self.buffer.chars().take(token_start).collect();
        let after: String = self.buffer.chars().skip(self.cursor).collect();
        let mut new_buf = before;
        new_buf.push_str(completion);
        if append_space {
            new_buf.push(' ');
        }
        self.cursor = new_buf.chars().count();
        new_buf.push_str(&after);
        self.buffer = new_buf;
    }

    fn tab_complete(&mut self) {
        let input_so_far: String = self.buffer.chars().take(self.cursor).collect();
        let suggestions = self.registry.suggestions(&input_so_far);
        if suggestions.is_empty() {
            return;
        }

        if suggestions.len() == 1 {
            let terminal = self.registry.is_terminal_command(&suggestions[0]);
            self.replace_token_span(&suggestions[0], terminal);
            self.redraw();
            return;
        }

        for s in &suggestions {
            (self.output_sink)(s);
        }
        let prefix = common_prefix(&suggestions);
        let token_len = input_so_far.chars().rev().take_while(|c| !c.is_whitespace()).count();
        if prefix.chars().count() > token_len {
            self.replace_token_span(&prefix, false);
        }
        self.emit_prompt_with_buffer();
    }

    fn emit_prompt(&mut self) {
        let line = self.prompt.clone();
        (self.output_sink)(&line);
    }

    fn emit_prompt_with_buffer(&mut self) {
        let line = format!("{}{}", self.prompt, self.buffer);
        (self.output_sink)(&line);
    }

    fn redraw(&mut self) {
        let col = self.prompt.chars().count() + self.cursor + 1;
        let line = format!("\x1b[2K\x1b[G{}{}\x1b[{}G", self.prompt, self.buffer, col);
        (self.output_sink)(&line);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::registry::Command;
    use std::sync::Mutex;

    fn registry_with_echo() -> Arc<CommandRegistry> {
        let mut registry = CommandRegistry::new();
        registry.register(
            Command::new("echo")
                .subcommand(Command::new("normal"))
                .subcommand(Command::new("reverse")),
        );
        Arc::new(registry)
    }

    fn engine_with_sinks() -> (ShellEngine, Arc<Mutex<Vec<String>>>, Arc<Mutex<Vec<String>>>) {
        let mut engine = ShellEngine::new("$ ", registry_with_echo());
        let processed = Arc::new(Mutex::new(Vec::new()));
        let output = Arc::new(Mutex::new(Vec::new()));
        let processed_clone = processed.clone();
        let output_clone = output.clone();
        engine.start(
            move |line: &str| processed_clone.lock().unwrap().push(line.to_string()),
            move |chunk: &str| output_clone.lock().unwrap().push(chunk.to_string()),
        );
        (engine, processed, output)
    }

    #[test]
    fn typing_then_enter_submits_to_processor() {
        let (mut engine, processed, _output) = engine_with_sinks();
        engine.handle_input_bytes(b"hello\n");
        assert_eq!(processed.lock().unwrap().as_slice(), ["hello"]);
        assert_eq!(engine.buffer(), "");
        assert_eq!(engine.cursor(), 0);
    }

    #[test]
    fn duplicate_adjacent_history_suppressed() {
        let (mut engine, _processed, _output) = engine_with_sinks();
        engine.handle_input_bytes(b"ls\n");
        engine.handle_input_bytes(b"ls\n");
        assert_eq!(engine.history(), ["ls".to_string()]);
    }

    #[test]
    fn backspace_removes_preceding_char() {
        let (mut engine, _processed, _output) = engine_with_sinks();
        engine.handle_input_bytes(b"ab");
        engine.handle_input_bytes(&[0x7f]);
        assert_eq!(engine.buffer(), "a");
        assert_eq!(engine.cursor(), 1);
    }

    #[test]
    fn ctrl_c_resets_buffer_and_reemits_prompt() {
        let (mut engine, _processed, output) = engine_with_sinks();
        engine.handle_input_bytes(b"partial");
        engine.handle_input_bytes(&[0x03]);
        assert_eq!(engine.buffer(), "");
        assert_eq!(engine.cursor(), 0);
        assert!(output.lock().unwrap().last().unwrap() == "$ ");
    }

    #[test]
    fn history_navigation_up_then_down_restores_live_buffer() {
        let (mut engine, _processed, _output) = engine_with_sinks();
        engine.handle_input_bytes(b"first\n");
        engine.handle_input_bytes(b"second\n");
        engine.handle_input_bytes(b"editing");
        // ESC [ A = history previous
        engine.handle_input_bytes(b"\x1b[A");
        assert_eq!(engine.buffer(), "second");
        engine.handle_input_bytes(b"\x1b[A");
        assert_eq!(engine.buffer(), "first");
        // ESC [ B = history next, back to "second" then live buffer.
        engine.handle_input_bytes(b"\x1b[B");
        assert_eq!(engine.buffer(), "second");
        engine.handle_input_bytes(b"\x1b[B");
        assert_eq!(engine.buffer(), "editing");
    }

    #[test]
    fn cursor_left_right_move_within_bounds() {
        let (mut engine, _processed, _output) = engine_with_sinks();
        engine.handle_input_bytes(b"ab");
        engine.handle_input_bytes(b"\x1b[D");
        assert_eq!(engine.cursor(), 1);
        engine.handle_input_bytes(b"\x1b[D\x1b[D\x1b[D");
        assert_eq!(engine.cursor(), 0);
        engine.handle_input_bytes(b"\x1b[C\x1b[C\x1b[C\x1b[C");
        assert_eq!(engine.cursor(), 2);
    }

    #[test]
    fn tab_with_single_suggestion_completes_and_adds_space() {
        let (mut engine, _processed, _output) = engine_with_sinks();
        engine.handle_input_bytes(b"hel");
        engine.handle_input_bytes(&[0x09]);
        assert_eq!(engine.buffer(), "help ");
    }

    #[test]
    fn tab_completing_a_parent_command_adds_no_space() {
        let (mut engine, _processed, _output) = engine_with_sinks();
        engine.handle_input_bytes(b"ech");
        engine.handle_input_bytes(&[0x09]);
        assert_eq!(engine.buffer(), "echo");
    }

    #[test]
    fn tab_with_multiple_suggestions_completes_common_prefix() {
        let (mut engine, _processed, output) = engine_with_sinks();
        engine.handle_input_bytes(b"echo ");
        engine.handle_input_bytes(&[0x09]);
        let printed = output.lock().unwrap();
        assert!(printed.iter().any(|s| s == "echo normal"));
        assert!(printed.iter().any(|s| s == "echo reverse"));
    }

    #[test]
    fn reserved_scroll_sequences_are_ignored() {
        let (mut engine, _processed, _output) = engine_with_sinks();
        engine.handle_input_bytes(b"text");
        engine.handle_input_bytes(b"\x1b[5~\x1b[6~");
        assert_eq!(engine.buffer(), "text");
    }
}
