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

use std::time::Duration;

pub const DEFAULT_PING_INTERVAL: Duration = Duration::from_millis(30_000);
pub const DEFAULT_MAX_CONNECTIONS: usize = 10;
pub const DEFAULT_PROMPT: &str = "rsh> ";

pub const DEFAULT_AUTO_RECONNECT: bool = true;
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_millis(5_000);
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_millis(30_000);

/// How long a session may go without an inbound frame before the
/// keepalive loop considers it dead: `2 * pingInterval`, per spec.
pub fn session_timeout(ping_interval: Duration) -> Duration {
    ping_interval * 2
}

/// Capacity of a session's bounded outbound queue. Once full, the
/// session is the one dropped, not the shell engine blocked.
pub const OUTBOUND_QUEUE_CAPACITY: usize = 256;

/// Read buffer size for a single socket read.
pub const READ_BUF_SIZE: usize = 1024 * 16;

pub const JOIN_POLL_DURATION: Duration = Duration::from_millis(100);
