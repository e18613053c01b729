//! Error types shared by the report engine, the card poller and the store

use thiserror::Error;

/// Failure of a single upstream call
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    /// The upstream answered with a non-success HTTP status
    #[error("upstream returned HTTP {0}")]
    Status(u16),
    /// Connection, TLS or timeout failure
    #[error("upstream unreachable: {0}")]
    Transport(String),
    /// The body could not be decoded into the expected shape
    #[error("invalid upstream response: {0}")]
    Decode(String),
    /// The platform envelope carried an error code
    #[error("platform error {code} ({status}): {message}")]
    Platform {
        code: i64,
        status: String,
        message: String,
    },
}

/// Failure of a report lookup
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReportError {
    /// The username search returned no match
    #[error("Invalid username")]
    InvalidUsername { username: String },
    /// The account has no character to build a loadout from
    #[error("no characters found for membership {membership_id}")]
    NoCharacters { membership_id: String },
    #[error(transparent)]
    Api(#[from] ApiError),
    /// A fan-out worker panicked
    #[error("loadout worker failed")]
    Worker,
}

impl ReportError {
    /// Short machine readable code sent along with the message
    pub fn code(&self) -> &'static str {
        match self {
            ReportError::InvalidUsername { .. } => "invalid_username",
            ReportError::NoCharacters { .. } => "no_characters",
            ReportError::Api(_) => "upstream",
            ReportError::Worker => "worker",
        }
    }
}

/// Failure to read or persist the configuration store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("config store I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("config store is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}
