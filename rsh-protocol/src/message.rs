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

use serde::{Deserialize, Serialize};

/// A single framed message. The `type` tag lives on `payload` and is
/// flattened into this struct so the wire shape is exactly
/// `{"id": ..., "type": ..., "timestamp": ..., "payload": {...}}`: `type`
/// determines `payload`'s schema exactly, and serde's adjacently tagged
/// enum representation rejects any mismatch between the two at decode time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub timestamp: i64,
    #[serde(flatten)]
    pub payload: Payload,
}

impl Message {
    pub fn new(id: impl Into<String>, timestamp: i64, payload: Payload) -> Self {
        Message { id: id.into(), timestamp, payload }
    }

    /// The string tag this message carries on the wire, e.g. "auth_request".
    pub fn type_tag(&self) -> &'static str {
        self.payload.type_tag()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum Payload {
    AuthRequest(AuthRequestPayload),
    AuthResponse(AuthResponsePayload),
    CommandRequest(CommandRequestPayload),
    CommandResponse(CommandResponsePayload),
    Input(InputPayload),
    Output(OutputPayload),
    Error(ErrorPayload),
    Ping(PingPayload),
    Pong(PongPayload),
    Disconnect(DisconnectPayload),
}

impl Payload {
    pub fn type_tag(&self) -> &'static str {
        match self {
            Payload::AuthRequest(_) => "auth_request",
            Payload::AuthResponse(_) => "auth_response",
            Payload::CommandRequest(_) => "command_request",
            Payload::CommandResponse(_) => "command_response",
            Payload::Input(_) => "input",
            Payload::Output(_) => "output",
            Payload::Error(_) => "error",
            Payload::Ping(_) => "ping",
            Payload::Pong(_) => "pong",
            Payload::Disconnect(_) => "disconnect",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthType {
    Basic,
    Token,
    None,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AuthRequestPayload {
    pub auth_type: AuthType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl Default for AuthType {
    fn default() -> Self {
        AuthType::None
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AuthResponsePayload {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

/// Reserved for forward compatibility. The spec defines no semantics for
/// these beyond accept-and-possibly-ERROR; see
/// `rsh_core::server::dispatch` for how the server responds to them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct CommandRequestPayload {
    #[serde(default)]
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct CommandResponsePayload {
    #[serde(default)]
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct InputPayload {
    #[serde(default)]
    pub data: String,
    #[serde(default)]
    pub session_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct OutputPayload {
    #[serde(default)]
    pub content: String,
    #[serde(default, rename = "commandId")]
    pub command_id: String,
    #[serde(default, rename = "final")]
    pub final_chunk: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    AuthRequired,
    AuthFailed,
    InvalidMessage,
    Unsupported,
    ProcessingError,
    SlowConsumer,
    Internal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ErrorPayload {
    pub message: String,
    pub code: ErrorCode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct PingPayload {}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct PongPayload {
    #[serde(default)]
    pub uptime: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct DisconnectPayload {
    #[serde(default)]
    pub reason: String,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn round_trip_auth_request() {
        let msg = Message::new(
            "abc123",
            1_700_000_000_000,
            Payload::AuthRequest(AuthRequestPayload {
                auth_type: AuthType::Basic,
                username: Some(String::from("u")),
                password: Some(String::from("p")),
                token: None,
            }),
        );

        let encoded = serde_json::to_string(&msg).expect("serialize");
        assert!(encoded.contains("\"type\":\"auth_request\""));
        let decoded: Message = serde_json::from_str(&encoded).expect("deserialize");
        assert_eq!(decoded, msg);
    }

    #[test]
    fn rejects_payload_type_mismatch() {
        // `type` says ping, but payload carries auth_request's shape.
        let bad = r#"{"id":"x","timestamp":0,"type":"ping","payload":{"authType":"none"}}"#;
        let result: Result<Message, _> = serde_json::from_str(bad);
        assert!(result.is_err());
    }

    #[test]
    fn rejects_unknown_type_tag() {
        let bad = r#"{"id":"x","timestamp":0,"type":"frobnicate","payload":{}}"#;
        let result: Result<Message, _> = serde_json::from_str(bad);
        assert!(result.is_err());
    }

    #[test]
    fn type_tag_matches_payload() {
        let msg = Message::new("x", 0, Payload::Ping(PingPayload::default()));
        assert_eq!(msg.type_tag(), "ping");
    }

    #[test]
    fn decodes_into_the_variant_named_by_type() {
        use assert_matches::assert_matches;

        let line = r#"{"id":"x","timestamp":0,"type":"pong","payload":{"uptime":12.5}}"#;
        let msg: Message = serde_json::from_str(line).expect("deserialize");
        assert_matches!(msg.payload, Payload::Pong(PongPayload { uptime }) if uptime == 12.5);
    }
}
