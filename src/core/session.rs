//! Connection session - one per connected UI
//!
//! The session answers RPC calls, writes config frames to the store, and turns
//! the output of its report engine, card poller and store subscription into
//! outbound frames. It is transport independent: the WebSocket loop feeds it
//! text frames and sends whatever [`Session::drain`] returns.
//!
//! Closing the session stops every timer it owns; nothing is emitted after.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, Sender};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::core::card::{CardPoller, CardSource};
use crate::core::constants::CARD_POLL_INTERVAL;
use crate::core::protocol::{ErrorBody, Outbound, RpcCall};
use crate::core::report::{LookupOutcome, ReportEngine, ReportEvent, ReportSettings};
use crate::core::router::{route, Routed};
use crate::core::store::{ConfigChange, ConfigStore};
use crate::core::traits::Upstream;
use crate::core::trials::TrialsCard;

// =============================================================================
// SETTINGS
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSettings {
    pub report: ReportSettings,
    pub card_poll_interval: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            report: ReportSettings::default(),
            card_poll_interval: CARD_POLL_INTERVAL,
        }
    }
}

// =============================================================================
// SESSION
// =============================================================================

pub struct Session {
    id: u64,
    store: Arc<ConfigStore>,
    report: Arc<ReportEngine>,
    card_source: Arc<CardSource>,
    poller: CardPoller,
    outbound_tx: Sender<Outbound>,
    outbound_rx: Receiver<Outbound>,
    report_rx: Receiver<ReportEvent>,
    card_rx: Receiver<TrialsCard>,
    config_rx: Receiver<ConfigChange>,
    closed: bool,
}

impl Session {
    /// Create the session; the first frame it yields is the full config
    pub fn open(
        id: u64,
        store: Arc<ConfigStore>,
        upstream: Upstream,
        settings: SessionSettings,
    ) -> Self {
        let (outbound_tx, outbound_rx) = unbounded();
        let (report_tx, report_rx) = unbounded();
        let (card_tx, card_rx) = unbounded();

        let config_rx = store.subscribe();
        let _ = outbound_tx.send(Outbound::Config {
            payload: store.all(),
        });

        let card_source = Arc::new(CardSource::new(
            Arc::clone(&upstream.platform),
            Arc::clone(&store),
        ));
        let poller = CardPoller::start(
            Arc::clone(&card_source),
            settings.card_poll_interval,
            card_tx,
        );
        let report = Arc::new(ReportEngine::new(
            upstream,
            Arc::clone(&store),
            settings.report,
            report_tx,
        ));

        info!(session = id, "[ws] Session opened");
        Self {
            id,
            store,
            report,
            card_source,
            poller,
            outbound_tx,
            outbound_rx,
            report_rx,
            card_rx,
            config_rx,
            closed: false,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Handle one inbound text frame
    pub fn handle_text(&self, text: &str) {
        if self.closed {
            return;
        }
        match route(text) {
            None => {}
            Some(Routed::Config(payload)) => self.write_config(payload),
            Some(Routed::Invalid { id, message }) => {
                debug!(session = self.id, id = %id, message = %message, "[ws] Invalid call data");
                self.reply(id, vec![ErrorBody::new(message).to_value()]);
            }
            Some(Routed::Call { id, call }) => self.dispatch(id, call),
        }
    }

    /// Frames ready to send, in order
    pub fn drain(&self) -> Vec<Outbound> {
        if self.closed {
            return Vec::new();
        }

        let mut frames: Vec<Outbound> = self.outbound_rx.try_iter().collect();
        frames.extend(self.report_rx.try_iter().map(|event| match event {
            ReportEvent::Fireteam(fireteam) => Outbound::Fireteam { fireteam },
            ReportEvent::Loadout(loadout) => Outbound::loadout(loadout),
            ReportEvent::Failed(e) => {
                Outbound::report_error(ErrorBody::with_code(e.to_string(), e.code()))
            }
        }));
        frames.extend(
            self.card_rx
                .try_iter()
                .map(|card| Outbound::Trials { card: card.view() }),
        );
        frames.extend(self.config_rx.try_iter().map(|change| {
            let mut payload = Map::new();
            payload.insert(change.key, change.value);
            Outbound::Config { payload }
        }));
        frames
    }

    /// Stop every timer and drop pending output; idempotent
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.report.destroy();
        self.poller.stop();
        info!(session = self.id, "[ws] Session closed");
    }

    fn reply(&self, id: String, args: Vec<Value>) {
        let _ = self.outbound_tx.send(Outbound::reply(id, args));
    }

    fn write_config(&self, payload: Map<String, Value>) {
        for (key, value) in payload {
            if let Err(e) = self.store.set(&key, value) {
                warn!(session = self.id, key = %key, error = %e, "[config] Failed to store value");
            }
        }
    }

    fn dispatch(&self, id: String, call: RpcCall) {
        debug!(session = self.id, id = %id, endpoint = %call.endpoint(), "[ws] Call");
        match call {
            RpcCall::TrialsReport { username } => self.spawn_lookup(id, username),
            RpcCall::ActiveAdvisors => self.spawn_advisors(id),
            RpcCall::ConfigSet { entries } => {
                for (key, value) in &entries {
                    if let Err(e) = self.store.set(key, value.clone()) {
                        warn!(session = self.id, key = %key, error = %e, "[config] Failed to store value");
                        self.reply(id, vec![ErrorBody::new(e.to_string()).to_value()]);
                        return;
                    }
                }
                self.reply(id, vec![Value::Null, Value::Object(entries)]);
            }
            RpcCall::ConfigGet { keys } => {
                let keys: Vec<&str> = keys.iter().map(String::as_str).collect();
                let values = self.store.gets(&keys);
                self.reply(id, vec![Value::Null, Value::Object(values)]);
            }
            RpcCall::ConfigAll => {
                self.reply(id, vec![Value::Null, Value::Object(self.store.all())]);
            }
        }
    }

    /// Search, reply once the player is found, then resolve in the background
    fn spawn_lookup(&self, id: String, username: String) {
        let engine = Arc::clone(&self.report);
        let tx = self.outbound_tx.clone();
        let session = self.id;

        let spawned = thread::Builder::new()
            .name(format!("lookup-{}", session))
            .spawn(move || {
                let search = match engine.search(&username) {
                    Ok(search) => search,
                    Err(e) => {
                        info!(session, username = %username, error = %e, "[report] Search failed");
                        let body = ErrorBody::with_code(e.to_string(), e.code());
                        let _ = tx.send(Outbound::reply(id, vec![body.to_value()]));
                        return;
                    }
                };
                let _ = tx.send(Outbound::reply(id, Vec::new()));

                // Failures of the current lookup arrive as report events
                match engine.resolve(search) {
                    Ok(LookupOutcome::Emitted(loadout)) => {
                        debug!(session, members = loadout.len(), "[report] Lookup done")
                    }
                    Ok(LookupOutcome::Discarded) => {
                        debug!(session, username = %username, "[report] Lookup superseded")
                    }
                    Err(e) => info!(session, username = %username, error = %e, "[report] Lookup failed"),
                }
            });

        if let Err(e) = spawned {
            warn!(session, error = %e, "[report] Failed to spawn lookup");
        }
    }

    fn spawn_advisors(&self, id: String) {
        let source = Arc::clone(&self.card_source);
        let tx = self.outbound_tx.clone();
        let session = self.id;

        let spawned = thread::Builder::new()
            .name(format!("advisors-{}", session))
            .spawn(move || {
                let args = match source.fetch() {
                    Ok(card) => vec![
                        Value::Null,
                        card.map(|c| serde_json::to_value(c.view()).unwrap_or(Value::Null))
                            .unwrap_or(Value::Null),
                    ],
                    Err(e) => {
                        warn!(session, error = %e, "[card] Advisors call failed");
                        vec![ErrorBody::with_code(e.to_string(), e.code()).to_value()]
                    }
                };
                let _ = tx.send(Outbound::reply(id, args));
            });

        if let Err(e) = spawned {
            warn!(session, error = %e, "[card] Failed to spawn advisors call");
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::traits::mocks::{advisors_payload, MockUpstream};
    use serde_json::json;
    use std::sync::atomic::Ordering;
    use std::time::Instant;

    const WAIT: Duration = Duration::from_secs(3);

    fn settings(refresh: Duration) -> SessionSettings {
        SessionSettings {
            report: ReportSettings {
                refresh_interval: refresh,
                ..Default::default()
            },
            card_poll_interval: Duration::from_secs(60),
        }
    }

    fn open(mock: MockUpstream, refresh: Duration) -> (Arc<MockUpstream>, Arc<ConfigStore>, Session) {
        let mock = Arc::new(mock);
        let store = Arc::new(ConfigStore::in_memory());
        let session = Session::open(
            1,
            Arc::clone(&store),
            Upstream::from_single(Arc::clone(&mock)),
            settings(refresh),
        );
        (mock, store, session)
    }

    fn rpc(endpoint: &str, id: &str, data: Value) -> String {
        json!({"type": "rpc", "endpoint": endpoint, "id": id, "data": data}).to_string()
    }

    /// Drain until a frame matches, returning everything drained so far
    fn wait_for(session: &Session, pred: impl Fn(&Outbound) -> bool) -> Vec<Outbound> {
        let deadline = Instant::now() + WAIT;
        let mut seen = Vec::new();
        while Instant::now() < deadline {
            let frames = session.drain();
            let found = frames.iter().any(&pred);
            seen.extend(frames);
            if found {
                return seen;
            }
            thread::sleep(Duration::from_millis(5));
        }
        panic!("No matching frame, got {:?}", seen);
    }

    fn is_reply(frame: &Outbound, expected: &str) -> bool {
        matches!(frame, Outbound::Rpc { id, .. } if id == expected)
    }

    fn reply_args(frames: &[Outbound], expected: &str) -> Vec<Value> {
        frames
            .iter()
            .find_map(|f| match f {
                Outbound::Rpc { id, args } if id == expected => Some(args.clone()),
                _ => None,
            })
            .unwrap()
    }

    #[test]
    fn test_first_frame_is_full_config() {
        let (_mock, _store, session) = open(MockUpstream::new(), Duration::from_secs(60));
        match session.drain().first() {
            Some(Outbound::Config { payload }) => {
                assert_eq!(payload.get("width"), Some(&json!(800)));
                assert_eq!(payload.get("platform"), Some(&json!(2)));
            }
            other => panic!("Expected Config, got {:?}", other),
        }
    }

    #[test]
    fn test_config_calls() {
        let (_mock, store, session) = open(MockUpstream::new(), Duration::from_secs(60));
        session.drain();

        session.handle_text(&rpc("config.set", "1", json!({"username": "lead"})));
        session.handle_text(&rpc("config.get", "2", json!(["username", "missing"])));
        session.handle_text(&rpc("config.all", "3", Value::Null));
        let frames = session.drain();

        assert_eq!(
            reply_args(&frames, "1"),
            vec![Value::Null, json!({"username": "lead"})]
        );
        assert_eq!(
            reply_args(&frames, "2"),
            vec![Value::Null, json!({"username": "lead", "missing": null})]
        );
        assert_eq!(reply_args(&frames, "3")[1]["height"], json!(600));
        assert_eq!(store.get("username"), Some(json!("lead")));

        // The write is broadcast back as a config frame
        assert!(frames.iter().any(|f| matches!(
            f,
            Outbound::Config { payload } if payload.get("username") == Some(&json!("lead"))
        )));
    }

    #[test]
    fn test_config_frame_written_to_store() {
        let (_mock, store, session) = open(MockUpstream::new(), Duration::from_secs(60));
        session.handle_text(&json!({"type": "config", "payload": {"width": 1024}}).to_string());
        assert_eq!(store.get("width"), Some(json!(1024)));
    }

    #[test]
    fn test_invalid_data_gets_error_reply() {
        let (_mock, _store, session) = open(MockUpstream::new(), Duration::from_secs(60));
        session.drain();
        session.handle_text(&rpc("config.set", "9", json!("nope")));
        let frames = session.drain();
        let args = reply_args(&frames, "9");
        assert_eq!(args.len(), 1);
        assert!(args[0]["message"].is_string());
    }

    #[test]
    fn test_unknown_endpoint_not_answered() {
        let (_mock, _store, session) = open(MockUpstream::new(), Duration::from_secs(60));
        session.drain();
        session.handle_text(&rpc("destiny.unknown", "5", Value::Null));
        session.handle_text("garbage");
        thread::sleep(Duration::from_millis(20));
        assert!(session.drain().is_empty());
    }

    #[test]
    fn test_trials_report_flow() {
        let mock = MockUpstream::new().with_fireteam("lead", &[("x", Some(1100.0)), ("y", Some(1400.0))]);
        let (_mock, _store, session) = open(mock, Duration::from_secs(60));
        session.drain();

        session.handle_text(&rpc("destiny.trials.report", "r1", json!("lead")));
        let frames = wait_for(&session, |f| matches!(f, Outbound::Report { loadout: Some(_), .. }));

        let reply_at = frames.iter().position(|f| is_reply(f, "r1")).unwrap();
        let fireteam_at = frames
            .iter()
            .position(|f| matches!(f, Outbound::Fireteam { .. }))
            .unwrap();
        assert!(reply_at < fireteam_at);
        assert_eq!(reply_args(&frames, "r1"), Vec::<Value>::new());

        match frames.last() {
            Some(Outbound::Report { loadout: Some(loadout), err: None }) => {
                let names: Vec<_> = loadout.iter().map(|l| l.guardian.name.as_str()).collect();
                assert_eq!(names, vec!["y", "x"]);
            }
            other => panic!("Expected loadout, got {:?}", other),
        }
    }

    #[test]
    fn test_trials_report_invalid_username() {
        let (_mock, _store, session) = open(MockUpstream::new(), Duration::from_secs(60));
        session.drain();
        session.handle_text(&rpc("destiny.trials.report", "r2", json!("nobody")));
        let frames = wait_for(&session, |f| is_reply(f, "r2"));
        assert_eq!(
            reply_args(&frames, "r2"),
            vec![json!({"message": "Invalid username", "code": "invalid_username"})]
        );
    }

    #[test]
    fn test_trials_report_fan_out_failure() {
        let mock = MockUpstream::new().with_fireteam("lead", &[("x", None)]);
        mock.fail_account("x");
        let (_mock, _store, session) = open(mock, Duration::from_secs(60));
        session.drain();

        session.handle_text(&rpc("destiny.trials.report", "r3", json!("lead")));
        let frames = wait_for(&session, |f| matches!(f, Outbound::Report { err: Some(_), .. }));
        assert!(frames.iter().any(|f| is_reply(f, "r3")));

        // The error follows the fireteam it belongs to
        let fireteam_at = frames
            .iter()
            .position(|f| matches!(f, Outbound::Fireteam { .. }))
            .unwrap();
        let err_at = frames
            .iter()
            .position(|f| matches!(f, Outbound::Report { err: Some(_), .. }))
            .unwrap();
        assert!(fireteam_at < err_at);
    }

    #[test]
    fn test_superseded_lookup_failure_not_sent() {
        let mock = MockUpstream::new()
            .with_player("a")
            .with_fireteam("b", &[("b1", Some(1000.0))]);
        let (started, release) = mock.gate_search("a");
        let (_mock, _store, session) = open(mock, Duration::from_secs(60));
        session.drain();

        session.handle_text(&rpc("destiny.trials.report", "ra", json!("a")));
        started.recv_timeout(WAIT).unwrap();

        session.handle_text(&rpc("destiny.trials.report", "rb", json!("b")));
        let mut frames = wait_for(&session, |f| matches!(f, Outbound::Report { loadout: Some(_), .. }));

        release.send(()).unwrap();
        frames.extend(wait_for(&session, |f| is_reply(f, "ra")));
        thread::sleep(Duration::from_millis(50));
        frames.extend(session.drain());

        assert!(
            frames
                .iter()
                .all(|f| !matches!(f, Outbound::Report { err: Some(_), .. })),
            "stale failure sent: {:?}",
            frames
        );
        match frames.iter().rev().find(|f| matches!(f, Outbound::Report { .. })) {
            Some(Outbound::Report { loadout: Some(loadout), .. }) => {
                assert_eq!(loadout[0].guardian.name, "b1")
            }
            other => panic!("Expected b's loadout last, got {:?}", other),
        }
    }

    #[test]
    fn test_active_advisors() {
        let mock = MockUpstream::new().with_fireteam("lead", &[]);
        mock.set_advisors(Some(advisors_payload(2, -1)));
        let (_mock, store, session) = open(mock, Duration::from_secs(60));
        store.set("username", json!("lead")).unwrap();
        session.drain();

        session.handle_text(&rpc("destiny.active.advisors", "a1", Value::Null));
        let frames = wait_for(&session, |f| is_reply(f, "a1"));
        let args = reply_args(&frames, "a1");
        assert_eq!(args[0], Value::Null);
        assert_eq!(args[1]["losses"], json!(0));
        assert_eq!(args[1]["mercy"], json!(true));
    }

    #[test]
    fn test_active_advisors_without_player() {
        let (_mock, _store, session) = open(MockUpstream::new(), Duration::from_secs(60));
        session.drain();
        session.handle_text(&rpc("destiny.active.advisors", "a2", Value::Null));
        let frames = wait_for(&session, |f| is_reply(f, "a2"));
        assert_eq!(reply_args(&frames, "a2"), vec![Value::Null, Value::Null]);
    }

    #[test]
    fn test_close_stops_refresh_timer() {
        let refresh = Duration::from_millis(30);
        let mock = MockUpstream::new().with_fireteam("lead", &[("x", None)]);
        let (mock, _store, mut session) = open(mock, refresh);

        session.handle_text(&rpc("destiny.trials.report", "r4", json!("lead")));
        wait_for(&session, |f| matches!(f, Outbound::Report { loadout: Some(_), .. }));
        // Let at least one refresh happen
        wait_for(&session, |f| matches!(f, Outbound::Report { loadout: Some(_), .. }));

        session.close();
        session.close();
        assert!(session.is_closed());

        let calls = mock.inventory_calls.load(Ordering::SeqCst);
        thread::sleep(refresh * 5);
        assert_eq!(mock.inventory_calls.load(Ordering::SeqCst), calls);
        assert!(session.drain().is_empty());
    }
}
