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

//! Credential checking for `AUTH_REQUEST`. Kept separate from
//! `server::session` so the three auth types (`none`, `basic`, `token`)
//! can be unit tested without a socket in the loop.

use rsh_protocol::{AuthRequestPayload, AuthType};
use sha2::{Digest, Sha256};

use crate::config::AuthConfig;

/// Supplied by the embedder; `token` auth defers entirely to this rather
/// than having any opinion of its own about what a valid token looks
/// like.
pub trait TokenValidator: Send + Sync {
    fn validate(&self, token: &str) -> bool;
}

pub struct Outcome {
    pub success: bool,
    pub error: Option<String>,
    pub username: Option<String>,
}

fn fail(message: impl Into<String>) -> Outcome {
    Outcome { success: false, error: Some(message.into()), username: None }
}

fn ok(username: Option<String>) -> Outcome {
    Outcome { success: true, error: None, username }
}

pub fn sha256_hex(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// Checks `payload` against `config`. A mismatch between the client's
/// requested `authType` and the server's configured type is always a
/// failure, regardless of which type was requested.
pub fn authenticate(
    config: &AuthConfig,
    payload: &AuthRequestPayload,
    token_validator: Option<&dyn TokenValidator>,
) -> Outcome {
    match (config, payload.auth_type) {
        (AuthConfig::None, AuthType::None) => ok(payload.username.clone()),
        (AuthConfig::Basic { users }, AuthType::Basic) => {
            let Some(username) = &payload.username else {
                return fail("missing username");
            };
            let Some(password) = &payload.password else {
                return fail("missing password");
            };
            match users.iter().find(|u| &u.username == username) {
                None => fail("Invalid username"),
                Some(user) => {
                    if sha256_hex(password) == user.password_hash.to_lowercase() {
                        ok(Some(username.clone()))
                    } else {
                        fail("Invalid password")
                    }
                }
            }
        }
        (AuthConfig::Token, AuthType::Token) => {
            let Some(token) = &payload.token else {
                return fail("missing token");
            };
            match token_validator {
                Some(validator) if validator.validate(token) => ok(payload.username.clone()),
                Some(_) => fail("Invalid token"),
                None => fail("token validation is not configured"),
            }
        }
        _ => fail("type mismatch"),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::BasicUser;

    fn basic_config() -> AuthConfig {
        AuthConfig::Basic {
            users: vec![BasicUser {
                username: "u".to_string(),
                password_hash: sha256_hex("p"),
            }],
        }
    }

    fn request(auth_type: AuthType) -> AuthRequestPayload {
        AuthRequestPayload { auth_type, username: None, password: None, token: None }
    }

    #[test]
    fn none_auth_always_succeeds_when_configured() {
        let outcome = authenticate(&AuthConfig::None, &request(AuthType::None), None);
        assert!(outcome.success);
    }

    #[test]
    fn basic_auth_succeeds_with_correct_password() {
        let payload = AuthRequestPayload {
            auth_type: AuthType::Basic,
            username: Some("u".to_string()),
            password: Some("p".to_string()),
            token: None,
        };
        let outcome = authenticate(&basic_config(), &payload, None);
        assert!(outcome.success);
        assert_eq!(outcome.username.as_deref(), Some("u"));
    }

    #[test]
    fn basic_auth_fails_with_wrong_password() {
        let payload = AuthRequestPayload {
            auth_type: AuthType::Basic,
            username: Some("u".to_string()),
            password: Some("q".to_string()),
            token: None,
        };
        let outcome = authenticate(&basic_config(), &payload, None);
        assert!(!outcome.success);
        assert_eq!(outcome.error.as_deref(), Some("Invalid password"));
    }

    #[test]
    fn mismatched_auth_type_fails() {
        let outcome = authenticate(&basic_config(), &request(AuthType::None), None);
        assert!(!outcome.success);
        assert_eq!(outcome.error.as_deref(), Some("type mismatch"));
    }

    struct AlwaysValid;
    impl TokenValidator for AlwaysValid {
        fn validate(&self, _token: &str) -> bool {
            true
        }
    }

    #[test]
    fn token_auth_delegates_to_validator() {
        let payload = AuthRequestPayload {
            auth_type: AuthType::Token,
            username: None,
            password: None,
            token: Some("abc".to_string()),
        };
        let outcome = authenticate(&AuthConfig::Token, &payload, Some(&AlwaysValid));
        assert!(outcome.success);
    }

    #[test]
    fn token_auth_without_validator_fails() {
        let payload = AuthRequestPayload {
            auth_type: AuthType::Token,
            username: None,
            password: None,
            token: Some("abc".to_string()),
        };
        let outcome = authenticate(&AuthConfig::Token, &payload, None);
        assert!(!outcome.success);
    }
}
