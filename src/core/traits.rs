//! Core traits - abstractions over the upstream HTTP APIs
//!
//! The report engine and the card poller only talk to these traits. The
//! actual implementations live in `server::http` and use `ureq`; tests use the
//! mocks below.

use std::sync::Arc;

use serde_json::Value;

use super::error::ApiError;
use super::types::{Account, FireteamMember, Inventory, Platform, PlayerMatch};

// =============================================================================
// PLATFORM API
// =============================================================================

/// User, character and inventory lookups against the game platform
pub trait PlatformApi: Send + Sync {
    /// Search players by display name
    fn search_player(&self, platform: Platform, name: &str) -> Result<Vec<PlayerMatch>, ApiError>;

    /// Account summary with all characters
    fn account(&self, platform: Platform, membership_id: &str) -> Result<Account, ApiError>;

    /// Inventory summary of one character, including definitions
    fn inventory(
        &self,
        platform: Platform,
        membership_id: &str,
        character_id: &str,
    ) -> Result<Inventory, ApiError>;

    /// Raw advisors payload of one character
    fn advisors(
        &self,
        platform: Platform,
        membership_id: &str,
        character_id: &str,
    ) -> Result<Value, ApiError>;
}

// =============================================================================
// FIRETEAM API
// =============================================================================

/// Current fireteam of a player, with ratings
pub trait FireteamApi: Send + Sync {
    fn fireteam(&self, membership_id: &str, mode: u32) -> Result<Vec<FireteamMember>, ApiError>;
}

// =============================================================================
// TRIALS REPORT API
// =============================================================================

/// Optional third party match statistics
pub trait TrialsReportApi: Send + Sync {
    /// Report of a player, None when the service has nothing on them
    fn report(&self, membership_id: &str) -> Result<Option<Value>, ApiError>;
}

// =============================================================================
// AUTHENTICATION
// =============================================================================

/// Source of the platform access token
///
/// Sign-in and token refresh happen in the desktop shell; this side only
/// reads whatever token is current.
pub trait TokenSource: Send + Sync {
    fn access_token(&self) -> Option<String>;
}

/// A token that never changes, read from the settings file
#[derive(Debug, Clone, Default)]
pub struct StaticToken(pub Option<String>);

impl TokenSource for StaticToken {
    fn access_token(&self) -> Option<String> {
        self.0.clone().filter(|t| !t.is_empty())
    }
}

// =============================================================================
// UPSTREAM BUNDLE
// =============================================================================

/// All upstream collaborators, cheap to clone
#[derive(Clone)]
pub struct Upstream {
    pub platform: Arc<dyn PlatformApi>,
    pub fireteam: Arc<dyn FireteamApi>,
    pub trials_report: Arc<dyn TrialsReportApi>,
}

impl Upstream {
    /// Use one object for every API
    pub fn from_single<T>(api: Arc<T>) -> Self
    where
        T: PlatformApi + FireteamApi + TrialsReportApi + 'static,
    {
        Self {
            platform: api.clone(),
            fireteam: api.clone(),
            trials_report: api,
        }
    }
}

// =============================================================================
// TEST MOCKS
// =============================================================================

#[cfg(test)]
pub mod mocks {
    use super::*;
    use crossbeam_channel::{bounded, Receiver, Sender};
    use parking_lot::Mutex;
    use serde_json::json;
    use std::collections::{HashMap, HashSet};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct CallGate {
        started: Sender<()>,
        release: Receiver<()>,
    }

    /// In-memory upstream for tests
    ///
    /// Every player named `name` gets membership id `id-name` and a single
    /// character `char-name`.
    #[derive(Default)]
    pub struct MockUpstream {
        players: Mutex<HashSet<String>>,
        fireteams: Mutex<HashMap<String, Vec<FireteamMember>>>,
        reports: Mutex<HashMap<String, Value>>,
        advisors: Mutex<Option<Value>>,
        failing_accounts: Mutex<HashSet<String>>,
        report_delay: Mutex<Option<Duration>>,
        report_fails: Mutex<bool>,
        search_gates: Mutex<HashMap<String, CallGate>>,
        account_gates: Mutex<HashMap<String, CallGate>>,
        pub search_calls: AtomicUsize,
        pub inventory_calls: AtomicUsize,
        pub advisors_calls: AtomicUsize,
    }

    pub fn member(name: &str, elo: Option<f64>) -> FireteamMember {
        FireteamMember {
            membership_id: format!("id-{}", name),
            membership_type: Platform::PlayStation,
            name: name.to_string(),
            kills: 100,
            deaths: 50,
            assists: 25,
            elo,
        }
    }

    pub fn advisors_payload(wins: u32, losses: i32) -> Value {
        json!({
            "activities": {"trials": {"extended": {"scoreCard": {
                "wins": wins,
                "losses": losses,
                "maxWins": 9,
                "maxLosses": 3,
                "ticketItem": {"nodes": [
                    {"isActivated": false},
                    {"isActivated": false},
                    {"isActivated": false}
                ]}
            }}}}
        })
    }

    impl MockUpstream {
        pub fn new() -> Self {
            Self::default()
        }

        /// Register a searchable player the fireteam API does not know
        pub fn with_player(self, name: &str) -> Self {
            self.players.lock().insert(name.to_string());
            self
        }

        /// Register a searchable player whose fireteam is `mates` (Elo per mate)
        pub fn with_fireteam(self, name: &str, mates: &[(&str, Option<f64>)]) -> Self {
            self.players.lock().insert(name.to_string());
            let members = mates.iter().map(|(n, elo)| member(n, *elo)).collect();
            self.fireteams.lock().insert(format!("id-{}", name), members);
            self
        }

        pub fn with_report(self, name: &str, report: Value) -> Self {
            self.reports.lock().insert(format!("id-{}", name), report);
            self
        }

        pub fn set_advisors(&self, advisors: Option<Value>) {
            *self.advisors.lock() = advisors;
        }

        pub fn fail_account(&self, name: &str) {
            self.failing_accounts.lock().insert(format!("id-{}", name));
        }

        pub fn heal_account(&self, name: &str) {
            self.failing_accounts.lock().remove(&format!("id-{}", name));
        }

        /// Make the trials report slow, as if it was about to time out
        pub fn delay_reports(&self, delay: Duration) {
            *self.report_delay.lock() = Some(delay);
        }

        /// Make the trials report fail like a timed out request
        pub fn fail_reports(&self) {
            *self.report_fails.lock() = true;
        }

        /// Block the next search for `name` until the returned sender fires
        ///
        /// The returned receiver fires once the search has started.
        pub fn gate_search(&self, name: &str) -> (Receiver<()>, Sender<()>) {
            let (started_tx, started_rx) = bounded(1);
            let (release_tx, release_rx) = bounded(1);
            self.search_gates.lock().insert(
                name.to_string(),
                CallGate {
                    started: started_tx,
                    release: release_rx,
                },
            );
            (started_rx, release_tx)
        }

        /// Block the next account fetch of member `name`, like [`Self::gate_search`]
        pub fn gate_account(&self, name: &str) -> (Receiver<()>, Sender<()>) {
            let (started_tx, started_rx) = bounded(1);
            let (release_tx, release_rx) = bounded(1);
            self.account_gates.lock().insert(
                format!("id-{}", name),
                CallGate {
                    started: started_tx,
                    release: release_rx,
                },
            );
            (started_rx, release_tx)
        }
    }

    impl PlatformApi for MockUpstream {
        fn search_player(
            &self,
            platform: Platform,
            name: &str,
        ) -> Result<Vec<PlayerMatch>, ApiError> {
            self.search_calls.fetch_add(1, Ordering::SeqCst);
            let gate = self.search_gates.lock().remove(name);
            if let Some(gate) = gate {
                let _ = gate.started.send(());
                let _ = gate.release.recv();
            }
            if !self.players.lock().contains(name) {
                return Ok(Vec::new());
            }
            Ok(vec![PlayerMatch {
                membership_id: format!("id-{}", name),
                membership_type: platform,
                display_name: name.to_string(),
            }])
        }

        fn account(&self, _platform: Platform, membership_id: &str) -> Result<Account, ApiError> {
            let gate = self.account_gates.lock().remove(membership_id);
            if let Some(gate) = gate {
                let _ = gate.started.send(());
                let _ = gate.release.recv();
            }
            if self.failing_accounts.lock().contains(membership_id) {
                return Err(ApiError::Status(500));
            }
            let name = membership_id.trim_start_matches("id-");
            let account = serde_json::from_value(json!({"characters": [
                {"characterBase": {
                    "characterId": format!("old-{}", name),
                    "dateLastPlayed": "2016-01-01T00:00:00Z"
                }},
                {"characterBase": {
                    "characterId": format!("char-{}", name),
                    "dateLastPlayed": "2016-09-10T20:00:00Z",
                    "powerLevel": 335,
                    "classHash": 2271682572u32,
                    "stats": {"STAT_INTELLECT": {"value": 180}}
                },
                "characterLevel": 40}
            ]}))
            .map_err(|e| ApiError::Decode(e.to_string()))?;
            Ok(account)
        }

        fn inventory(
            &self,
            _platform: Platform,
            _membership_id: &str,
            character_id: &str,
        ) -> Result<Inventory, ApiError> {
            self.inventory_calls.fetch_add(1, Ordering::SeqCst);
            if !character_id.starts_with("char-") {
                return Err(ApiError::Decode("stale character".to_string()));
            }
            serde_json::from_value(json!({
                "items": [{"itemHash": 1, "bucketHash": 1498876634u32, "transferStatus": 1}],
                "definitions": {"items": {"1": {"itemName": "Thorn"}}}
            }))
            .map_err(|e| ApiError::Decode(e.to_string()))
        }

        fn advisors(
            &self,
            _platform: Platform,
            _membership_id: &str,
            _character_id: &str,
        ) -> Result<Value, ApiError> {
            self.advisors_calls.fetch_add(1, Ordering::SeqCst);
            self.advisors
                .lock()
                .clone()
                .ok_or(ApiError::Status(503))
        }
    }

    impl FireteamApi for MockUpstream {
        fn fireteam(
            &self,
            membership_id: &str,
            _mode: u32,
        ) -> Result<Vec<FireteamMember>, ApiError> {
            self.fireteams
                .lock()
                .get(membership_id)
                .cloned()
                .ok_or(ApiError::Status(404))
        }
    }

    impl TrialsReportApi for MockUpstream {
        fn report(&self, membership_id: &str) -> Result<Option<Value>, ApiError> {
            let delay = *self.report_delay.lock();
            if let Some(delay) = delay {
                std::thread::sleep(delay);
            }
            if *self.report_fails.lock() {
                return Err(ApiError::Transport("timed out".to_string()));
            }
            Ok(self.reports.lock().get(membership_id).cloned())
        }
    }
}
