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

use anyhow::{anyhow, Context};

use crate::message::Message;

/// Above this many bytes of unterminated carry-over, a connection is
/// presumed to be misbehaving (or malicious) rather than merely slow, and
/// the read loop should fail the connection instead of growing the buffer
/// without bound.
pub const MAX_CARRYOVER_BYTES: usize = 1024 * 1024;

/// Accumulates bytes read off a socket and splits them into newline
/// terminated frames, the way a reader loop in `libshpool::daemon::server`
/// consumes a `UnixStream` a chunk at a time. Unlike the teacher's
/// length-prefixed `rmp_serde` framing, the wire format here is UTF-8 JSON
/// terminated by a single `\n`, so the reader just needs to track a
/// carry-over string across reads.
#[derive(Debug, Default)]
pub struct LineReader {
    carry: String,
}

impl LineReader {
    pub fn new() -> Self {
        LineReader { carry: String::new() }
    }

    /// Feed freshly read bytes in. Returns the complete, trimmed,
    /// non-empty lines found so far; any trailing partial line remains
    /// buffered for the next call.
    pub fn feed(&mut self, bytes: &[u8]) -> anyhow::Result<Vec<String>> {
        let chunk = std::str::from_utf8(bytes).context("frame is not valid utf-8")?;
        self.carry.push_str(chunk);

        let mut lines = Vec::new();
        while let Some(idx) = self.carry.find('\n') {
            let line: String = self.carry.drain(..=idx).collect();
            let trimmed = line.trim();
            if !trimmed.is_empty() {
                lines.push(trimmed.to_string());
            }
        }

        if self.carry.len() > MAX_CARRYOVER_BYTES {
            return Err(anyhow!(
                "pending carry-over of {} bytes exceeds cap of {} bytes, failing connection",
                self.carry.len(),
                MAX_CARRYOVER_BYTES
            ));
        }

        Ok(lines)
    }

    /// Parse one already-framed line into a `Message`. Kept separate from
    /// `feed` so callers can decide how to react to a single bad frame
    /// (ERROR-and-continue on the server, discard-and-continue on the
    /// client) without losing the other lines in the same read.
    pub fn parse_line(line: &str) -> anyhow::Result<Message> {
        serde_json::from_str(line).context("validating message against the wire schema")
    }
}

/// Encode a message as a single `\n`-terminated JSON line, ready to be
/// written to a socket.
pub fn encode_line(msg: &Message) -> anyhow::Result<String> {
    let mut line = serde_json::to_string(msg).context("encoding message")?;
    line.push('\n');
    Ok(line)
}
