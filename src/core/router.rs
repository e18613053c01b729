//! Inbound frame router
//!
//! Turns a raw text frame into something the session can act on. Frames that
//! cannot be answered (malformed JSON, unknown frame type, unknown endpoint)
//! are logged and dropped; the connection stays open.

use serde_json::{Map, Value};
use tracing::warn;

use super::protocol::{Endpoint, Inbound, RpcCall};

/// A frame the session has to act on
#[derive(Debug, Clone, PartialEq)]
pub enum Routed {
    /// Well formed request
    Call { id: String, call: RpcCall },
    /// Known endpoint with data it cannot use; answered with an error reply
    Invalid { id: String, message: String },
    /// Config entries to write
    Config(Map<String, Value>),
}

/// Route one text frame, None when it is dropped
pub fn route(text: &str) -> Option<Routed> {
    let frame: Inbound = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(e) => {
            warn!(error = %e, len = text.len(), "[ws] Dropping malformed frame");
            return None;
        }
    };

    match frame {
        Inbound::Config { payload } => Some(Routed::Config(payload)),
        Inbound::Rpc { endpoint, id, data } => {
            let endpoint = match endpoint.parse::<Endpoint>() {
                Ok(endpoint) => endpoint,
                Err(unknown) => {
                    warn!(endpoint = %unknown.0, id = %id, "[ws] Dropping call to unknown endpoint");
                    return None;
                }
            };
            Some(match parse_call(endpoint, data) {
                Ok(call) => Routed::Call { id, call },
                Err(message) => Routed::Invalid { id, message },
            })
        }
    }
}

/// Validate the data of a call to `endpoint`
pub fn parse_call(endpoint: Endpoint, data: Value) -> Result<RpcCall, String> {
    match endpoint {
        Endpoint::TrialsReport => match data {
            Value::String(username) if !username.trim().is_empty() => Ok(RpcCall::TrialsReport {
                username: username.trim().to_string(),
            }),
            _ => Err("Invalid username".to_string()),
        },
        Endpoint::ActiveAdvisors => Ok(RpcCall::ActiveAdvisors),
        Endpoint::ConfigSet => match data {
            Value::Object(entries) => Ok(RpcCall::ConfigSet { entries }),
            other => Err(format!("config.set expects an object, got {}", kind(&other))),
        },
        Endpoint::ConfigGet => match data {
            Value::String(key) => Ok(RpcCall::ConfigGet { keys: vec![key] }),
            Value::Array(items) => items
                .into_iter()
                .map(|item| match item {
                    Value::String(key) => Ok(key),
                    other => Err(format!("config.get keys must be strings, got {}", kind(&other))),
                })
                .collect::<Result<Vec<_>, _>>()
                .map(|keys| RpcCall::ConfigGet { keys }),
            other => Err(format!("config.get expects keys, got {}", kind(&other))),
        },
        Endpoint::ConfigAll => Ok(RpcCall::ConfigAll),
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
