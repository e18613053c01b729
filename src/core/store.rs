//! Configuration store
//!
//! Flat key → JSON value map shared by every connection. Values are persisted
//! to a JSON file, overlaid on built-in defaults, and every write is broadcast
//! to the subscribers.

use std::fs;
use std::path::{Path, PathBuf};

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

use super::error::StoreError;

/// A single write to the store
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigChange {
    pub key: String,
    pub value: Value,
}

struct Subscriber {
    key: Option<String>,
    tx: Sender<ConfigChange>,
}

pub struct ConfigStore {
    path: Option<PathBuf>,
    defaults: Map<String, Value>,
    values: Mutex<Map<String, Value>>,
    subscribers: Mutex<Vec<Subscriber>>,
}

/// Values used when nothing was stored under a key
pub fn default_values() -> Map<String, Value> {
    let mut defaults = Map::new();
    defaults.insert("width".to_string(), json!(800));
    defaults.insert("height".to_string(), json!(600));
    defaults.insert("platform".to_string(), json!(2));
    defaults
}

impl ConfigStore {
    /// Store that is never written to disk
    pub fn in_memory() -> Self {
        Self {
            path: None,
            defaults: default_values(),
            values: Mutex::new(Map::new()),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    /// Open the store backed by `path`; a missing file starts empty
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let values = if path.exists() {
            let contents = fs::read_to_string(&path)?;
            let values: Map<String, Value> = if contents.trim().is_empty() {
                Map::new()
            } else {
                serde_json::from_str(&contents)?
            };
            info!(path = %path.display(), keys = values.len(), "[store] Loaded config");
            values
        } else {
            debug!(path = %path.display(), "[store] No stored config, using defaults");
            Map::new()
        };

        Ok(Self {
            path: Some(path),
            defaults: default_values(),
            values: Mutex::new(values),
            subscribers: Mutex::new(Vec::new()),
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Value of `key`, falling back to the defaults
    ///
    /// An empty object is what unknown keys used to be stored as, so it reads
    /// as missing.
    pub fn get(&self, key: &str) -> Option<Value> {
        let stored = self
            .values
            .lock()
            .get(key)
            .filter(|v| !is_empty_object(v))
            .cloned();
        stored.or_else(|| self.defaults.get(key).cloned())
    }

    /// Typed read; None when missing or of the wrong shape
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.get(key)?;
        match serde_json::from_value(value) {
            Ok(v) => Some(v),
            Err(e) => {
                warn!(key, error = %e, "[store] Ignoring value of unexpected shape");
                None
            }
        }
    }

    /// Several keys at once; missing keys map to null
    pub fn gets(&self, keys: &[&str]) -> Map<String, Value> {
        keys.iter()
            .map(|key| (key.to_string(), self.get(key).unwrap_or(Value::Null)))
            .collect()
    }

    /// Defaults overlaid with every stored value
    pub fn all(&self) -> Map<String, Value> {
        let mut all = self.defaults.clone();
        for (key, value) in self.values.lock().iter() {
            if !is_empty_object(value) {
                all.insert(key.clone(), value.clone());
            }
        }
        all
    }

    /// Store and persist a value, then broadcast the change
    pub fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        {
            let mut values = self.values.lock();
            let previous = values.insert(key.to_string(), value.clone());
            if let Err(e) = self.persist(&values) {
                match previous {
                    Some(previous) => values.insert(key.to_string(), previous),
                    None => values.remove(key),
                };
                return Err(e);
            }
        }

        debug!(key, "[store] Config updated");
        self.broadcast(ConfigChange {
            key: key.to_string(),
            value,
        });
        Ok(())
    }

    /// Receive every change
    pub fn subscribe(&self) -> Receiver<ConfigChange> {
        self.add_subscriber(None)
    }

    /// Receive changes of a single key
    pub fn subscribe_key(&self, key: &str) -> Receiver<ConfigChange> {
        self.add_subscriber(Some(key.to_string()))
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }

    fn add_subscriber(&self, key: Option<String>) -> Receiver<ConfigChange> {
        let (tx, rx) = unbounded();
        self.subscribers.lock().push(Subscriber { key, tx });
        rx
    }

    fn broadcast(&self, change: ConfigChange) {
        // Subscribers whose receiver is gone are pruned on their next delivery
        self.subscribers.lock().retain(|sub| {
            if sub.key.as_deref().is_some_and(|k| k != change.key) {
                return true;
            }
            sub.tx.send(change.clone()).is_ok()
        });
    }

    fn persist(&self, values: &Map<String, Value>) -> Result<(), StoreError> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(values)?)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }
}

fn is_empty_object(value: &Value) -> bool {
    matches!(value, Value::Object(map) if map.is_empty())
}
