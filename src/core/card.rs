//! Trials card polling
//!
//! [`CardSource`] fetches the card of the player configured under the
//! `username` and `platform` keys. [`CardPoller`] calls it on a timer and only
//! forwards cards the [`StaleGate`] accepts.

use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::Sender;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::error::ReportError;
use super::staleness::{StaleGate, Verdict};
use super::store::ConfigStore;
use super::timer::{RefreshTimer, Reschedule};
use super::traits::PlatformApi;
use super::trials::{Boons, TrialsCard};
use super::types::Platform;

/// Resolved membership and character of the configured player
#[derive(Debug, Clone, PartialEq)]
struct Identity {
    username: String,
    platform: Platform,
    membership_id: String,
    character_id: String,
}

pub struct CardSource {
    platform: Arc<dyn PlatformApi>,
    store: Arc<ConfigStore>,
    identity: Mutex<Option<Identity>>,
}

impl CardSource {
    pub fn new(platform: Arc<dyn PlatformApi>, store: Arc<ConfigStore>) -> Self {
        Self {
            platform,
            store,
            identity: Mutex::new(None),
        }
    }

    pub fn store(&self) -> &Arc<ConfigStore> {
        &self.store
    }

    /// Current card of the configured player
    ///
    /// None when no player is configured or the player has no trials activity.
    pub fn fetch(&self) -> Result<Option<TrialsCard>, ReportError> {
        let Some(username) = self
            .store
            .get_as::<String>("username")
            .filter(|u| !u.trim().is_empty())
        else {
            return Ok(None);
        };
        let platform = self.store.get_as::<Platform>("platform").unwrap_or_default();

        let identity = self.identity(&username, platform)?;
        let advisors = self.platform.advisors(
            platform,
            &identity.membership_id,
            &identity.character_id,
        )?;

        let Some(card) = TrialsCard::from_advisors(&advisors) else {
            debug!(username = %username, "[card] No trials activity");
            return Ok(None);
        };
        let boons = self.store.get_as::<Boons>("boons").unwrap_or_default();
        Ok(Some(card.with_fake_boons(&boons)))
    }

    /// Drop the cached membership so the next fetch searches again
    pub fn forget(&self) {
        *self.identity.lock() = None;
    }

    fn identity(&self, username: &str, platform: Platform) -> Result<Identity, ReportError> {
        if let Some(identity) = self.identity.lock().as_ref() {
            if identity.username == username && identity.platform == platform {
                return Ok(identity.clone());
            }
        }

        let player = self
            .platform
            .search_player(platform, username)?
            .into_iter()
            .next()
            .ok_or_else(|| ReportError::InvalidUsername {
                username: username.to_string(),
            })?;
        let account = self.platform.account(platform, &player.membership_id)?;
        let character = account
            .last_played()
            .ok_or_else(|| ReportError::NoCharacters {
                membership_id: player.membership_id.clone(),
            })?;

        let identity = Identity {
            username: username.to_string(),
            platform,
            membership_id: player.membership_id,
            character_id: character.character_base.character_id.clone(),
        };
        info!(username, character = %identity.character_id, "[card] Tracking player");
        *self.identity.lock() = Some(identity.clone());
        Ok(identity)
    }
}

/// Polls a [`CardSource`] and forwards accepted cards
pub struct CardPoller {
    timer: RefreshTimer,
}

impl CardPoller {
    /// Start polling now, then every `interval`
    pub fn start(source: Arc<CardSource>, interval: Duration, cards: Sender<TrialsCard>) -> Self {
        let username_changes = source.store().subscribe_key("username");
        let mut gate = StaleGate::new();

        let timer = RefreshTimer::spawn("card", move |_| {
            if username_changes.try_iter().count() > 0 {
                debug!("[card] Player changed, resetting card");
                source.forget();
                gate.reset();
            }

            match source.fetch() {
                Ok(Some(card)) => {
                    if gate.offer(card.clone()) == Verdict::Accept && cards.send(card).is_err() {
                        return Reschedule::Stop;
                    }
                }
                Ok(None) => {}
                Err(e) => warn!(error = %e, "[card] Poll failed"),
            }
            Reschedule::After(interval)
        });
        timer.arm(Duration::ZERO, 0);

        Self { timer }
    }

    pub fn is_running(&self) -> bool {
        self.timer.is_running()
    }

    /// Stop polling; idempotent
    pub fn stop(&mut self) {
        self.timer.destroy();
    }
}
