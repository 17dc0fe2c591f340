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

//! Tokenizes an argv tail against a parameter schema. Tokens are already
//! whitespace-split opaque strings; quoting semantics are the caller's
//! problem, not this module's.

use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterType {
    String,
    Number,
    Boolean,
}

#[derive(Debug, Clone)]
pub struct ParameterDefinition {
    pub name: String,
    pub description: String,
    pub param_type: ParameterType,
    pub required: bool,
    pub alias: Option<char>,
    pub is_flag: bool,
}

impl ParameterDefinition {
    pub fn new(name: impl Into<String>, param_type: ParameterType) -> Self {
        ParameterDefinition {
            name: name.into(),
            description: String::new(),
            param_type,
            required: false,
            alias: None,
            is_flag: false,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn alias(mut self, alias: char) -> Self {
        self.alias = Some(alias);
        self
    }

    /// A flag implies boolean and takes no value; it is never required in
    /// the validation sense since its absence just means false.
    pub fn flag(mut self) -> Self {
        self.is_flag = true;
        self.param_type = ParameterType::Boolean;
        self.required = false;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    String(String),
    Number(f64),
    Boolean(bool),
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::String(s) => write!(f, "{s}"),
            ParamValue::Number(n) => write!(f, "{n}"),
            ParamValue::Boolean(b) => write!(f, "{b}"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedArguments {
    pub options: HashMap<String, ParamValue>,
    pub positional: Vec<String>,
    pub errors: Vec<String>,
    pub help_requested: bool,
}

impl ParsedArguments {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn get_string(&self, name: &str) -> Option<&str> {
        match self.options.get(name) {
            Some(ParamValue::String(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn get_bool(&self, name: &str) -> bool {
        matches!(self.options.get(name), Some(ParamValue::Boolean(true)))
    }

    pub fn get_number(&self, name: &str) -> Option<f64> {
        match self.options.get(name) {
            Some(ParamValue::Number(n)) => Some(*n),
            _ => None,
        }
    }
}

fn find_by_name<'a>(
    schema: &'a [ParameterDefinition],
    name: &str,
) -> Option<&'a ParameterDefinition> {
    schema.iter().find(|p| p.name == name)
}

fn find_by_alias(schema: &[ParameterDefinition], alias: char) -> Option<&ParameterDefinition> {
    schema.iter().find(|p| p.alias == Some(alias))
}

fn convert(def: &ParameterDefinition, raw: &str) -> Result<ParamValue, String> {
    match def.param_type {
        ParameterType::String => Ok(ParamValue::String(raw.to_string())),
        ParameterType::Number => raw
            .parse::<f64>()
            .map(ParamValue::Number)
            .map_err(|_| format!("'{raw}' is not a valid number for option '{}'", def.name)),
        ParameterType::Boolean => match raw {
            "true" => Ok(ParamValue::Boolean(true)),
            "false" => Ok(ParamValue::Boolean(false)),
            other => Err(format!("'{other}' is not a valid boolean for option '{}'", def.name)),
        },
    }
}

/// Parse a raw token stream against a parameter schema, per the
/// token-recognition order: `--help`/`--?`, `--name=value`, `--name value`,
/// `--flag`, `-x`, then positional.
pub fn parse(tokens: &[String], schema: &[ParameterDefinition]) -> ParsedArguments {
    let mut result = ParsedArguments::default();
    let mut i = 0;

    while i < tokens.len() {
        let tok = &tokens[i];

        if tok == "--help" || tok == "--?" {
            result.help_requested = true;
            return result;
        }

        if let Some(rest) = tok.strip_prefix("--") {
            if let Some(eq) = rest.find('=') {
                let name = &rest[..eq];
                let value = &rest[eq + 1..];
                match find_by_name(schema, name) {
                    Some(def) if def.is_flag => {
                        result.errors.push(format!("flag '{name}' does not take a value"));
                    }
                    Some(def) => match convert(def, value) {
                        Ok(v) => {
                            result.options.insert(def.name.clone(), v);
                        }
                        Err(e) => result.errors.push(e),
                    },
                    None => result.errors.push(format!("unknown option '--{name}'")),
                }
                i += 1;
                continue;
            }

            match find_by_name(schema, rest) {
                Some(def) if def.is_flag => {
                    result.options.insert(def.name.clone(), ParamValue::Boolean(true));
                    i += 1;
                }
                Some(def) => {
                    let next = tokens.get(i + 1);
                    match next {
                        Some(v) if !v.starts_with('-') => {
                            match convert(def, v) {
                                Ok(parsed) => {
                                    result.options.insert(def.name.clone(), parsed);
                                }
                                Err(e) => result.errors.push(e),
                            }
                            i += 2;
                        }
                        _ => {
                            result.errors.push(format!("option '--{rest}' requires a value"));
                            i += 1;
                        }
                    }
                }
                None => {
                    result.errors.push(format!("unknown option '--{rest}'"));
                    i += 1;
                }
            }
            continue;
        }

        if let Some(rest) = tok.strip_prefix('-') {
            if rest.chars().count() != 1 {
                result.errors.push(format!("invalid short option '-{rest}'"));
                i += 1;
                continue;
            }
            let alias = rest.chars().next().unwrap();
            match find_by_alias(schema, alias) {
                Some(def) if def.is_flag => {
                    result.options.insert(def.name.clone(), ParamValue::Boolean(true));
                    i += 1;
                }
                Some(def) => {
                    let next = tokens.get(i + 1);
                    match next {
                        Some(v) if !v.starts_with('-') => {
                            match convert(def, v) {
                                Ok(parsed) => {
                                    result.options.insert(def.name.clone(), parsed);
                                }
                                Err(e) => result.errors.push(e),
                            }
                            i += 2;
                        }
                        _ => {
                            result.errors.push(format!("option '-{alias}' requires a value"));
                            i += 1;
                        }
                    }
                }
                None => {
                    result.errors.push(format!("unknown option '-{alias}'"));
                    i += 1;
                }
            }
            continue;
        }

        result.positional.push(tok.clone());
        i += 1;
    }

    for def in schema {
        if def.required && !result.options.contains_key(&def.name) {
            result.errors.push(format!("missing required option '--{}'", def.name));
        }
    }

    result
}

#[cfg(test)]
mod test {
    use super::*;

    fn schema() -> Vec<ParameterDefinition> {
        vec![
            ParameterDefinition::new("name", ParameterType::String).required().alias('n'),
            ParameterDefinition::new("count", ParameterType::Number),
            ParameterDefinition::new("verbose", ParameterType::Boolean).flag().alias('v'),
        ]
    }

    #[test]
    fn parses_long_option_with_equals() {
        let tokens = vec!["--name=bob".to_string()];
        let parsed = parse(&tokens, &schema());
        assert!(parsed.is_ok());
        assert_eq!(parsed.get_string("name"), Some("bob"));
    }

    #[test]
    fn parses_long_option_with_space_separated_value() {
        let tokens = vec!["--name".to_string(), "bob".to_string()];
        let parsed = parse(&tokens, &schema());
        assert_eq!(parsed.get_string("name"), Some("bob"));
    }

    #[test]
    fn option_requires_value_error() {
        let tokens = vec!["--name".to_string()];
        let parsed = parse(&tokens, &schema());
        assert!(parsed.errors.iter().any(|e| e.contains("requires a value")));
    }

    #[test]
    fn flag_sets_boolean_true() {
        let tokens = vec!["--name=bob".to_string(), "--verbose".to_string()];
        let parsed = parse(&tokens, &schema());
        assert!(parsed.get_bool("verbose"));
    }

    #[test]
    fn flag_rejects_attached_value() {
        let tokens = vec!["--name=bob".to_string(), "--verbose=true".to_string()];
        let parsed = parse(&tokens, &schema());
        assert!(parsed.errors.iter().any(|e| e.contains("does not take a value")));
    }

    #[test]
    fn short_alias_consumes_value() {
        let tokens = vec!["-n".to_string(), "bob".to_string()];
        let parsed = parse(&tokens, &schema());
        assert_eq!(parsed.get_string("name"), Some("bob"));
    }

    #[test]
    fn multi_char_short_option_rejected() {
        let tokens = vec!["-abc".to_string()];
        let parsed = parse(&tokens, &schema());
        assert!(parsed.errors.iter().any(|e| e.contains("invalid short option")));
    }

    #[test]
    fn unknown_option_continues_parsing() {
        let tokens = vec!["--bogus".to_string(), "--name=bob".to_string()];
        let parsed = parse(&tokens, &schema());
        assert!(parsed.errors.iter().any(|e| e.contains("unknown option")));
        assert_eq!(parsed.get_string("name"), Some("bob"));
    }

    #[test]
    fn missing_required_reported_after_stream_consumed() {
        let tokens: Vec<String> = vec![];
        let parsed = parse(&tokens, &schema());
        assert!(parsed.errors.iter().any(|e| e.contains("missing required")));
    }

    #[test]
    fn help_flag_stops_parsing_immediately() {
        let tokens = vec!["--help".to_string(), "--name=bob".to_string()];
        let parsed = parse(&tokens, &schema());
        assert!(parsed.help_requested);
        assert!(parsed.options.is_empty());
    }

    #[test]
    fn leftover_tokens_become_positional() {
        let tokens = vec!["--name=bob".to_string(), "extra1".to_string(), "extra2".to_string()];
        let parsed = parse(&tokens, &schema());
        assert_eq!(parsed.positional, vec!["extra1".to_string(), "extra2".to_string()]);
    }

    #[test]
    fn number_conversion_failure_is_error() {
        let tokens = vec!["--name=bob".to_string(), "--count=notanumber".to_string()];
        let parsed = parse(&tokens, &schema());
        assert!(parsed.errors.iter().any(|e| e.contains("not a valid number")));
    }
}
