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

//! The client's outstanding-request table: at most one entry per message
//! id, removed on resolve, reject, or expiry. The deadline itself is
//! enforced by the caller blocking on `Receiver::recv_timeout` and
//! calling `expire` if it elapses; this table only ever holds the
//! resolution channel, not a timer of its own.

use std::collections::HashMap;
use std::sync::Mutex;

use rsh_protocol::Message;

struct Entry {
    expected_type: &'static str,
    tx: crossbeam_channel::Sender<Result<Message, String>>,
}

#[derive(Default)]
pub struct PendingTable {
    entries: Mutex<HashMap<String, Entry>>,
}

impl PendingTable {
    pub fn new() -> Self {
        PendingTable::default()
    }

    pub fn insert(
        &self,
        id: String,
        expected_type: &'static str,
    ) -> crossbeam_channel::Receiver<Result<Message, String>> {
        let (tx, rx) = crossbeam_channel::bounded(1);
        self.entries.lock().unwrap().insert(id, Entry { expected_type, tx });
        rx
    }

    /// Looks `msg.id` up and, if present, resolves it: a matching `type`
    /// tag succeeds, any other reply type rejects with a descriptive
    /// reason. An id with no pending entry is silently ignored (it
    /// already resolved, was rejected, or expired).
    pub fn resolve(&self, msg: Message) {
        let entry = self.entries.lock().unwrap().remove(&msg.id);
        if let Some(entry) = entry {
            if msg.type_tag() == entry.expected_type {
                let _ = entry.tx.send(Ok(msg));
            } else {
                let _ = entry.tx.send(Err(format!("unexpected reply type '{}'", msg.type_tag())));
            }
        }
    }

    /// Removes `id` without resolving it, for the caller's own
    /// recv-timeout path: a reply that arrives after this point finds no
    /// entry and is dropped by `resolve`.
    pub fn expire(&self, id: &str) {
        self.entries.lock().unwrap().remove(id);
    }

    /// Rejects every outstanding request with `reason`, for local
    /// disconnect per spec.
    pub fn reject_all(&self, reason: &str) {
        let entries: Vec<Entry> = self.entries.lock().unwrap().drain().map(|(_, e)| e).collect();
        for entry in entries {
            let _ = entry.tx.send(Err(reason.to_string()));
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use rsh_protocol::{AuthResponsePayload, Payload, PingPayload};

    #[test]
    fn resolve_delivers_matching_reply() {
        let table = PendingTable::new();
        let rx = table.insert("1".to_string(), "auth_response");
        table.resolve(Message::new(
            "1",
            0,
            Payload::AuthResponse(AuthResponsePayload { success: true, error: None, session_id: None }),
        ));
        assert!(rx.recv().unwrap().is_ok());
    }

    #[test]
    fn resolve_rejects_mismatched_type() {
        let table = PendingTable::new();
        let rx = table.insert("1".to_string(), "auth_response");
        table.resolve(Message::new("1", 0, Payload::Ping(PingPayload::default())));
        assert!(rx.recv().unwrap().is_err());
    }

    #[test]
    fn resolve_on_unknown_id_is_noop() {
        let table = PendingTable::new();
        table.resolve(Message::new("missing", 0, Payload::Ping(PingPayload::default())));
    }

    #[test]
    fn expired_entry_drops_late_reply() {
        let table = PendingTable::new();
        let rx = table.insert("1".to_string(), "auth_response");
        table.expire("1");
        table.resolve(Message::new(
            "1",
            0,
            Payload::AuthResponse(AuthResponsePayload::default()),
        ));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn reject_all_rejects_every_entry() {
        let table = PendingTable::new();
        let rx1 = table.insert("1".to_string(), "auth_response");
        let rx2 = table.insert("2".to_string(), "auth_response");
        table.reject_all("disconnected");
        assert_eq!(rx1.recv().unwrap().unwrap_err(), "disconnected");
        assert_eq!(rx2.recv().unwrap().unwrap_err(), "disconnected");
    }
}
