//! Server module - everything that touches the outside world
//!
//! This module contains:
//! - Settings file loading
//! - Logging setup
//! - Upstream HTTP clients
//! - The local WebSocket server

pub mod http;
pub mod logging;
pub mod settings;
pub mod websocket;

pub use http::HttpUpstream;
pub use settings::{Settings, SettingsError};
pub use websocket::{LocalServer, ServerHandle};
