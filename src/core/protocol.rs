//! WebSocket protocol types
//!
//! JSON frames exchanged between the overlay UI and the local server. Every
//! frame is an object tagged by `type`. These types are transport independent
//! and can be tested without a socket.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::loadout::Loadout;
use super::trials::TrialsCardView;
use super::types::FireteamMember;

// =============================================================================
// ENDPOINTS
// =============================================================================

/// The closed set of RPC endpoints served locally
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    TrialsReport,
    ActiveAdvisors,
    ConfigSet,
    ConfigGet,
    ConfigAll,
}

impl Endpoint {
    pub const ALL: [Endpoint; 5] = [
        Endpoint::TrialsReport,
        Endpoint::ActiveAdvisors,
        Endpoint::ConfigSet,
        Endpoint::ConfigGet,
        Endpoint::ConfigAll,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Endpoint::TrialsReport => "destiny.trials.report",
            Endpoint::ActiveAdvisors => "destiny.active.advisors",
            Endpoint::ConfigSet => "config.set",
            Endpoint::ConfigGet => "config.get",
            Endpoint::ConfigAll => "config.all",
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Name that is not one of [`Endpoint::ALL`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownEndpoint(pub String);

impl FromStr for Endpoint {
    type Err = UnknownEndpoint;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Endpoint::ALL
            .into_iter()
            .find(|e| e.as_str() == s)
            .ok_or_else(|| UnknownEndpoint(s.to_string()))
    }
}

// =============================================================================
// INBOUND (UI → server)
// =============================================================================

/// Frames received from the UI
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Inbound {
    /// Request to one of the endpoints
    Rpc {
        endpoint: String,
        id: String,
        #[serde(default)]
        data: Value,
    },
    /// Config entries to write and broadcast
    Config { payload: Map<String, Value> },
}

/// A request with its data validated for the endpoint
#[derive(Debug, Clone, PartialEq)]
pub enum RpcCall {
    TrialsReport { username: String },
    ActiveAdvisors,
    ConfigSet { entries: Map<String, Value> },
    ConfigGet { keys: Vec<String> },
    ConfigAll,
}

impl RpcCall {
    pub fn endpoint(&self) -> Endpoint {
        match self {
            RpcCall::TrialsReport { .. } => Endpoint::TrialsReport,
            RpcCall::ActiveAdvisors => Endpoint::ActiveAdvisors,
            RpcCall::ConfigSet { .. } => Endpoint::ConfigSet,
            RpcCall::ConfigGet { .. } => Endpoint::ConfigGet,
            RpcCall::ConfigAll => Endpoint::ConfigAll,
        }
    }

    /// Data the UI would send for this call
    pub fn data(&self) -> Value {
        match self {
            RpcCall::TrialsReport { username } => Value::String(username.clone()),
            RpcCall::ConfigSet { entries } => Value::Object(entries.clone()),
            RpcCall::ConfigGet { keys } => {
                Value::Array(keys.iter().cloned().map(Value::String).collect())
            }
            RpcCall::ActiveAdvisors | RpcCall::ConfigAll => Value::Null,
        }
    }
}

// =============================================================================
// OUTBOUND (server → UI)
// =============================================================================

/// Error payload of a failed report lookup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl ErrorBody {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
        }
    }

    pub fn with_code(message: impl Into<String>, code: &str) -> Self {
        Self {
            message: message.into(),
            code: Some(code.to_string()),
        }
    }

    /// As the first element of an RPC reply
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Frames sent to the UI
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Outbound {
    /// Reply to a request, correlated by id
    Rpc { id: String, args: Vec<Value> },
    /// Full or partial configuration
    Config { payload: Map<String, Value> },
    /// Result of a report lookup or refresh
    Report {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        loadout: Option<Vec<Loadout>>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        err: Option<ErrorBody>,
    },
    /// Fireteam of the searched player, sent before the loadouts
    Fireteam { fireteam: Vec<FireteamMember> },
    /// Accepted trials card of the configured player
    Trials { card: TrialsCardView },
}

impl Outbound {
    pub fn reply(id: impl Into<String>, args: Vec<Value>) -> Self {
        Outbound::Rpc {
            id: id.into(),
            args,
        }
    }

    pub fn loadout(loadout: Vec<Loadout>) -> Self {
        Outbound::Report {
            loadout: Some(loadout),
            err: None,
        }
    }

    pub fn report_error(err: ErrorBody) -> Self {
        Outbound::Report {
            loadout: None,
            err: Some(err),
        }
    }

    /// Encode as a text frame
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

// =============================================================================
// TESTS
// =============================================================================
