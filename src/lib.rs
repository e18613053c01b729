// Anubis companion server

//! Local companion server for the Anubis trials overlay.
//!
//! The overlay UI connects over a local WebSocket and asks for fireteam
//! reports, the trials card of the signed-in player and its own stored
//! configuration. [`core`] holds the transport independent logic and
//! [`server`] the settings, logging, HTTP clients and socket server.

pub mod core;
pub mod server;
