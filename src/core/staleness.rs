//! Staleness policy for trials card updates
//!
//! The advisors endpoint can answer out of order or repeat an older answer
//! while a match result propagates. A polled card only replaces the displayed
//! one when it moves the card forward.

use serde_json::Value;
use tracing::debug;

use super::trials::TrialsCard;

/// Outcome of offering a new snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Replace the displayed snapshot
    Accept,
    /// Identical to the displayed snapshot, nothing to do
    Same,
    /// Older or out of order, ignore it
    Decline,
}

fn serialized(card: &TrialsCard) -> Option<Value> {
    serde_json::to_value(card).ok()
}

/// Decide whether `next` supersedes `previous`
pub fn check(previous: Option<&TrialsCard>, next: &TrialsCard) -> Verdict {
    let Some(previous) = previous else {
        return Verdict::Accept;
    };

    if serialized(previous) == serialized(next) {
        return Verdict::Same;
    }

    if next.wins > previous.wins
        || next.losses > previous.losses
        || (!previous.mercy && next.mercy)
    {
        return Verdict::Accept;
    }

    Verdict::Decline
}

/// Holds the displayed snapshot and filters incoming ones through [`check`]
#[derive(Debug, Default)]
pub struct StaleGate {
    current: Option<TrialsCard>,
}

impl StaleGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<&TrialsCard> {
        self.current.as_ref()
    }

    /// Offer a snapshot; it becomes current only when accepted
    pub fn offer(&mut self, next: TrialsCard) -> Verdict {
        let verdict = check(self.current.as_ref(), &next);
        match verdict {
            Verdict::Accept => self.current = Some(next),
            Verdict::Same => {}
            Verdict::Decline => {
                debug!(
                    wins = next.wins,
                    losses = next.losses,
                    "[card] Declined out of order snapshot"
                );
            }
        }
        verdict
    }

    /// Forget the displayed snapshot (the tracked player changed)
    pub fn reset(&mut self) {
        self.current = None;
    }
}
