//! RPC client - the UI side of the socket protocol
//!
//! Encodes requests with fresh ids, correlates replies by id and keeps a local
//! copy of the configuration up to date from config frames.

use std::collections::HashMap;

use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use parking_lot::Mutex;
use serde_json::{Map, Value};
use tracing::debug;
use uuid::Uuid;

use super::protocol::{Endpoint, Inbound, Outbound, RpcCall};

/// An encoded request waiting for its reply
#[derive(Debug)]
pub struct Request {
    pub id: String,
    /// Text frame to send
    pub frame: String,
    /// Receives the reply args once
    pub reply: Receiver<Vec<Value>>,
}

/// What [`RpcClient::handle_text`] did with a frame
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    /// Reply delivered to its pending request
    Reply { id: String },
    /// Config entries applied to the local cache
    Config(Map<String, Value>),
    /// Any other frame, passed through
    Message(Outbound),
    /// Unparsable frame or reply to an unknown id
    Dropped,
}

#[derive(Default)]
pub struct RpcClient {
    pending: Mutex<HashMap<String, Sender<Vec<Value>>>>,
    config: Mutex<Map<String, Value>>,
    key_subscribers: Mutex<Vec<(String, Sender<Value>)>>,
}

impl RpcClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Encode a call to `endpoint` under a fresh id
    pub fn request(&self, endpoint: Endpoint, data: Value) -> Result<Request, serde_json::Error> {
        let id = Uuid::new_v4().to_string();
        let frame = serde_json::to_string(&Inbound::Rpc {
            endpoint: endpoint.as_str().to_string(),
            id: id.clone(),
            data,
        })?;

        let (tx, reply) = bounded(1);
        self.pending.lock().insert(id.clone(), tx);
        Ok(Request { id, frame, reply })
    }

    /// Encode an already validated call
    pub fn call(&self, call: &RpcCall) -> Result<Request, serde_json::Error> {
        self.request(call.endpoint(), call.data())
    }

    /// Encode a config frame
    pub fn config_frame(payload: Map<String, Value>) -> Result<String, serde_json::Error> {
        serde_json::to_string(&Inbound::Config { payload })
    }

    /// Handle one frame received from the server
    pub fn handle_text(&self, text: &str) -> ClientEvent {
        let frame: Outbound = match serde_json::from_str(text) {
            Ok(frame) => frame,
            Err(e) => {
                debug!(error = %e, "[ws] Dropping unparsable server frame");
                return ClientEvent::Dropped;
            }
        };

        match frame {
            Outbound::Rpc { id, args } => {
                let Some(tx) = self.pending.lock().remove(&id) else {
                    debug!(id = %id, "[ws] Dropping reply to unknown request");
                    return ClientEvent::Dropped;
                };
                let _ = tx.send(args);
                ClientEvent::Reply { id }
            }
            Outbound::Config { payload } => {
                self.apply_config(&payload);
                ClientEvent::Config(payload)
            }
            other => ClientEvent::Message(other),
        }
    }

    /// Cached config value
    pub fn config(&self, key: &str) -> Option<Value> {
        self.config.lock().get(key).cloned()
    }

    /// Receive every new value of `key`
    pub fn subscribe_key(&self, key: &str) -> Receiver<Value> {
        let (tx, rx) = unbounded();
        self.key_subscribers.lock().push((key.to_string(), tx));
        rx
    }

    /// Requests still waiting for a reply
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    fn apply_config(&self, payload: &Map<String, Value>) {
        {
            let mut config = self.config.lock();
            for (key, value) in payload {
                config.insert(key.clone(), value.clone());
            }
        }

        self.key_subscribers.lock().retain(|(key, tx)| match payload.get(key) {
            Some(value) => tx.send(value.clone()).is_ok(),
            None => true,
        });
    }
}
