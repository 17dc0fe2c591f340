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

//! The wire types shared by the rsh server and client: the message
//! envelope, the closed set of payload variants, and the newline-delimited
//! JSON framing codec used to move them across a stream socket.

mod codec;
mod message;

pub use codec::{encode_line, LineReader, MAX_CARRYOVER_BYTES};
pub use message::{
    AuthRequestPayload, AuthResponsePayload, AuthType, CommandRequestPayload,
    CommandResponsePayload, DisconnectPayload, ErrorCode, ErrorPayload, InputPayload, Message,
    OutputPayload, Payload, PingPayload, PongPayload,
};
