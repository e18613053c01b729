//! Report engine - fireteam lookup, loadout fan-out and periodic refresh
//!
//! A lookup resolves a username to a membership, fetches the fireteam and then
//! builds one loadout per member. Every lookup claims a generation; results of
//! a generation that is no longer current are discarded instead of emitted, so
//! a slow lookup for an earlier username can never overwrite a later one.
//!
//! After a lookup the engine keeps the fireteam and refreshes its loadouts on
//! a timer until the next lookup or [`ReportEngine::destroy`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::Sender;
use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::constants::{REPORT_REFRESH_INTERVAL, TRIALS_FIRETEAM_MODE};
use super::error::ReportError;
use super::loadout::{sort_by_elo, Loadout};
use super::store::ConfigStore;
use super::timer::{RefreshTimer, Reschedule};
use super::traits::Upstream;
use super::types::{FireteamMember, Platform, PlayerMatch};

// =============================================================================
// PUBLIC TYPES
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportSettings {
    pub refresh_interval: Duration,
    pub fireteam_mode: u32,
}

impl Default for ReportSettings {
    fn default() -> Self {
        Self {
            refresh_interval: REPORT_REFRESH_INTERVAL,
            fireteam_mode: TRIALS_FIRETEAM_MODE,
        }
    }
}

/// Output of the engine, in emission order
#[derive(Debug, Clone, PartialEq)]
pub enum ReportEvent {
    /// Fireteam of the searched player, before any loadout
    Fireteam(Vec<FireteamMember>),
    /// Merged loadouts, sorted by Elo
    Loadout(Vec<Loadout>),
    /// The current lookup failed after its player was found
    Failed(ReportError),
}

/// A resolved username, bound to the generation that searched it
#[derive(Debug, Clone, PartialEq)]
pub struct Search {
    pub generation: u64,
    pub player: PlayerMatch,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LookupOutcome {
    /// Loadouts were emitted
    Emitted(Vec<Loadout>),
    /// A newer lookup started meanwhile; nothing was emitted
    Discarded,
}

// =============================================================================
// ENGINE STATE
// =============================================================================

#[derive(Default)]
struct ReportState {
    username: Option<String>,
    player: Option<PlayerMatch>,
    fireteam: Vec<FireteamMember>,
    reports: HashMap<String, Value>,
    loadout: Vec<Loadout>,
}

struct ReportInner {
    upstream: Upstream,
    store: Arc<ConfigStore>,
    settings: ReportSettings,
    generation: AtomicU64,
    destroyed: AtomicBool,
    state: Mutex<ReportState>,
    events: Sender<ReportEvent>,
}

pub struct ReportEngine {
    inner: Arc<ReportInner>,
    timer: Mutex<RefreshTimer>,
}

impl ReportEngine {
    pub fn new(
        upstream: Upstream,
        store: Arc<ConfigStore>,
        settings: ReportSettings,
        events: Sender<ReportEvent>,
    ) -> Self {
        let inner = Arc::new(ReportInner {
            upstream,
            store,
            settings,
            generation: AtomicU64::new(0),
            destroyed: AtomicBool::new(false),
            state: Mutex::new(ReportState::default()),
            events,
        });

        let refresher = Arc::clone(&inner);
        let timer = RefreshTimer::spawn("report", move |generation| refresher.refresh(generation));

        Self {
            inner,
            timer: Mutex::new(timer),
        }
    }

    /// Resolve a username to a membership and claim a new generation
    ///
    /// Cancels the refresh of the previous lookup.
    pub fn search(&self, username: &str) -> Result<Search, ReportError> {
        let generation = {
            let mut state = self.inner.state.lock();
            state.username = Some(username.to_string());
            self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1
        };
        self.timer.lock().clear();

        let platform = self.inner.platform();
        info!(username, %platform, generation, "[report] Searching player");

        let player = self
            .inner
            .upstream
            .platform
            .search_player(platform, username)?
            .into_iter()
            .next()
            .ok_or_else(|| ReportError::InvalidUsername {
                username: username.to_string(),
            })?;

        let mut state = self.inner.state.lock();
        if self.inner.is_current(generation) {
            state.player = Some(player.clone());
        }
        Ok(Search { generation, player })
    }

    /// Fetch fireteam and loadouts of a searched player and emit them
    pub fn resolve(&self, search: Search) -> Result<LookupOutcome, ReportError> {
        let inner = &self.inner;
        let Search { generation, player } = search;

        let fireteam = match inner
            .upstream
            .fireteam
            .fireteam(&player.membership_id, inner.settings.fireteam_mode)
        {
            Ok(fireteam) => fireteam,
            Err(e) => {
                warn!(error = %e, generation, "[report] Fireteam lookup failed");
                return inner.fail(generation, e.into());
            }
        };

        {
            let mut state = inner.state.lock();
            if !inner.is_current(generation) {
                debug!(generation, "[report] Discarding stale fireteam");
                return Ok(LookupOutcome::Discarded);
            }
            state.fireteam = fireteam.clone();
            state.reports.clear();
            state.loadout.clear();
            inner.emit(ReportEvent::Fireteam(fireteam.clone()));
        }
        info!(player = %player.display_name, members = fireteam.len(), "[report] Fireteam found");

        let (loadouts, reports) = thread::scope(|s| {
            let reports = s.spawn(|| inner.fetch_reports(&fireteam));
            let loadouts = inner.fetch_loadouts(&fireteam);
            (loadouts, reports.join().unwrap_or_default())
        });

        let mut loadouts = match loadouts {
            Ok(loadouts) => loadouts,
            Err(e) => {
                warn!(error = %e, generation, "[report] Loadout fan-out failed");
                {
                    let mut state = inner.state.lock();
                    if !inner.is_current(generation) {
                        debug!(generation, "[report] Discarding stale failure");
                        return Ok(LookupOutcome::Discarded);
                    }
                    state.reports = reports;
                    inner.emit(ReportEvent::Failed(e.clone()));
                }
                self.arm(generation);
                return Err(e);
            }
        };
        merge_reports(&mut loadouts, &reports);

        {
            let mut state = inner.state.lock();
            if !inner.is_current(generation) {
                debug!(generation, "[report] Discarding stale loadouts");
                return Ok(LookupOutcome::Discarded);
            }
            state.reports = reports;
            state.loadout = loadouts.clone();
            inner.emit(ReportEvent::Loadout(loadouts.clone()));
        }

        self.arm(generation);
        Ok(LookupOutcome::Emitted(loadouts))
    }

    /// [`search`](Self::search) followed by [`resolve`](Self::resolve)
    pub fn lookup(&self, username: &str) -> Result<LookupOutcome, ReportError> {
        let search = self.search(username)?;
        self.resolve(search)
    }

    /// Stop refreshing and invalidate any lookup in flight; idempotent
    pub fn destroy(&self) {
        if self.inner.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        self.timer.lock().destroy();
        debug!("[report] Engine destroyed");
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.destroyed.load(Ordering::SeqCst)
    }

    pub fn generation(&self) -> u64 {
        self.inner.generation.load(Ordering::SeqCst)
    }

    /// Username of the latest search
    pub fn username(&self) -> Option<String> {
        self.inner.state.lock().username.clone()
    }

    /// Last emitted loadouts
    pub fn current_loadout(&self) -> Vec<Loadout> {
        self.inner.state.lock().loadout.clone()
    }

    fn arm(&self, generation: u64) {
        self.timer
            .lock()
            .arm(self.inner.settings.refresh_interval, generation);
    }
}

impl Drop for ReportEngine {
    fn drop(&mut self) {
        self.destroy();
    }
}

impl ReportInner {
    fn is_current(&self, generation: u64) -> bool {
        !self.destroyed.load(Ordering::SeqCst)
            && self.generation.load(Ordering::SeqCst) == generation
    }

    fn platform(&self) -> Platform {
        self.store.get_as::<Platform>("platform").unwrap_or_default()
    }

    fn emit(&self, event: ReportEvent) {
        let _ = self.events.send(event);
    }

    /// Emit the failure of a current lookup, or discard it when superseded
    fn fail(&self, generation: u64, err: ReportError) -> Result<LookupOutcome, ReportError> {
        let _state = self.state.lock();
        if !self.is_current(generation) {
            debug!(generation, error = %err, "[report] Discarding stale failure");
            return Ok(LookupOutcome::Discarded);
        }
        self.emit(ReportEvent::Failed(err.clone()));
        Err(err)
    }

    /// One loadout per member, in fireteam order; any failure fails them all
    fn fetch_loadouts(&self, fireteam: &[FireteamMember]) -> Result<Vec<Loadout>, ReportError> {
        thread::scope(|s| {
            let handles: Vec<_> = fireteam
                .iter()
                .map(|member| s.spawn(move || self.fetch_loadout(member)))
                .collect();
            handles
                .into_iter()
                .map(|handle| handle.join().unwrap_or(Err(ReportError::Worker)))
                .collect()
        })
    }

    fn fetch_loadout(&self, member: &FireteamMember) -> Result<Loadout, ReportError> {
        let platform = &self.upstream.platform;
        let account = platform.account(member.membership_type, &member.membership_id)?;
        let character = account
            .last_played()
            .ok_or_else(|| ReportError::NoCharacters {
                membership_id: member.membership_id.clone(),
            })?;
        let inventory = platform.inventory(
            member.membership_type,
            &member.membership_id,
            &character.character_base.character_id,
        )?;
        Ok(Loadout::build(member, character, &inventory))
    }

    /// Trials reports by membership id; failures are logged and skipped
    fn fetch_reports(&self, fireteam: &[FireteamMember]) -> HashMap<String, Value> {
        thread::scope(|s| {
            let handles: Vec<_> = fireteam
                .iter()
                .map(|member| {
                    s.spawn(move || {
                        let id = &member.membership_id;
                        match self.upstream.trials_report.report(id) {
                            Ok(report) => report.map(|r| (id.clone(), r)),
                            Err(e) => {
                                warn!(membership_id = %id, error = %e, "[report] Trials report unavailable");
                                None
                            }
                        }
                    })
                })
                .collect();
            handles
                .into_iter()
                .filter_map(|handle| handle.join().ok().flatten())
                .collect()
        })
    }

    /// Timer callback: rebuild the loadouts of the known fireteam
    fn refresh(&self, generation: u64) -> Reschedule {
        if !self.is_current(generation) {
            debug!(generation, "[report] Stale refresh, stopping");
            return Reschedule::Stop;
        }

        let fireteam = self.state.lock().fireteam.clone();
        match self.fetch_loadouts(&fireteam) {
            Ok(mut loadouts) => {
                let mut state = self.state.lock();
                if !self.is_current(generation) {
                    return Reschedule::Stop;
                }
                merge_reports(&mut loadouts, &state.reports);
                state.loadout = loadouts.clone();
                debug!(members = loadouts.len(), "[report] Refreshed loadouts");
                self.emit(ReportEvent::Loadout(loadouts));
            }
            Err(e) => {
                warn!(error = %e, "[report] Refresh failed, retrying next cycle");
            }
        }
        Reschedule::After(self.settings.refresh_interval)
    }
}

/// Attach trials reports and sort by Elo
fn merge_reports(loadouts: &mut [Loadout], reports: &HashMap<String, Value>) {
    for loadout in loadouts.iter_mut() {
        loadout.report = reports.get(loadout.membership_id()).cloned();
    }
    sort_by_elo(loadouts);
}

// =============================================================================
// TESTS
// =============================================================================
