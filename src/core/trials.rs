//! Trials card - win/loss progress of the current trials passage
//!
//! The card is derived from the advisors payload of the platform API. The raw
//! loss count is kept as reported (`-1` once mercy has been used) and only
//! clamped in the rendered view.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::constants::{LIGHTHOUSE_WINS, MERCY_USED_LOSSES};

// =============================================================================
// BOONS
// =============================================================================

/// Purchasable boons of a trials passage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Boons {
    #[serde(default)]
    pub mercy: bool,
    #[serde(default)]
    pub favor: bool,
    #[serde(default)]
    pub boldness: bool,
}

impl Boons {
    pub fn any(&self) -> bool {
        self.mercy || self.favor || self.boldness
    }
}

// =============================================================================
// UPSTREAM SHAPE
// =============================================================================

/// `activities.trials.extended.scoreCard` of the advisors payload
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreCard {
    #[serde(default)]
    pub wins: u32,
    #[serde(default)]
    pub losses: i32,
    #[serde(default)]
    pub max_wins: u32,
    #[serde(default)]
    pub max_losses: u32,
    #[serde(default)]
    pub ticket_item: Option<TicketItem>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TicketItem {
    #[serde(default)]
    pub nodes: Vec<TicketNode>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketNode {
    #[serde(default)]
    pub is_activated: bool,
}

impl ScoreCard {
    /// Extract the score card from an advisors payload
    ///
    /// Returns None when the player has no trials activity.
    pub fn from_advisors(advisors: &Value) -> Option<Self> {
        let card = advisors.pointer("/activities/trials/extended/scoreCard")?;
        serde_json::from_value(card.clone()).ok()
    }

    fn node(&self, index: usize) -> bool {
        self.ticket_item
            .as_ref()
            .and_then(|t| t.nodes.get(index))
            .map(|n| n.is_activated)
            .unwrap_or(false)
    }
}

// =============================================================================
// TRIALS CARD
// =============================================================================

/// Snapshot of a trials card
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrialsCard {
    pub wins: u32,
    /// Raw losses; `-1` encodes "mercy used"
    pub losses: i32,
    pub max_wins: u32,
    pub max_losses: u32,
    pub boons: Boons,
    /// Mercy has been used on this card
    pub mercy: bool,
    /// Enough wins to reach the lighthouse
    pub lighthouse: bool,
    #[serde(skip)]
    boons_applied: bool,
}

impl TrialsCard {
    pub fn new(wins: u32, losses: i32, max_wins: u32, max_losses: u32, boons: Boons) -> Self {
        let mut card = Self {
            wins,
            losses,
            max_wins,
            max_losses,
            boons,
            mercy: false,
            lighthouse: false,
            boons_applied: false,
        };
        card.derive();
        card
    }

    pub fn from_score_card(score: &ScoreCard) -> Self {
        let boons = Boons {
            mercy: score.node(0),
            favor: score.node(1),
            boldness: score.node(2),
        };
        Self::new(
            score.wins,
            score.losses,
            score.max_wins,
            score.max_losses,
            boons,
        )
    }

    pub fn from_advisors(advisors: &Value) -> Option<Self> {
        ScoreCard::from_advisors(advisors).map(|s| Self::from_score_card(&s))
    }

    /// Pretend the given boons were bought, for streaming without buying them
    ///
    /// Applied at most once per card.
    pub fn with_fake_boons(mut self, fake: &Boons) -> Self {
        if self.boons_applied || !fake.any() {
            return self;
        }

        if fake.mercy {
            self.boons.mercy = true;
            if self.losses > 0 {
                self.losses -= 1;
            }
        }
        // The first win cannot be told apart from a boldness win in the
        // advisors data, so boldness only counts once a win exists.
        if fake.boldness && self.wins > 0 {
            self.wins += 1;
        }
        if fake.favor {
            self.wins += 1;
        }
        if self.max_wins > 0 {
            self.wins = self.wins.min(self.max_wins);
        }

        self.boons_applied = true;
        self.derive();
        self
    }

    fn derive(&mut self) {
        if self.losses == MERCY_USED_LOSSES {
            self.boons.mercy = true;
        }
        self.lighthouse = self.wins >= LIGHTHOUSE_WINS;
        self.mercy = self.boons.mercy && self.losses == MERCY_USED_LOSSES;
    }

    /// Loss count to render, never negative
    pub fn displayed_losses(&self) -> u32 {
        self.losses.max(0) as u32
    }

    /// One entry per slot of the card, true when filled
    pub fn won(&self) -> Vec<bool> {
        (0..self.max_wins).map(|i| i < self.wins).collect()
    }

    pub fn lost(&self) -> Vec<bool> {
        let losses = self.displayed_losses();
        (0..self.max_losses).map(|i| i < losses).collect()
    }

    pub fn view(&self) -> TrialsCardView {
        TrialsCardView {
            wins: self.wins,
            losses: self.displayed_losses(),
            max_wins: self.max_wins,
            max_losses: self.max_losses,
            boons: self.boons,
            mercy: self.mercy,
            lighthouse: self.lighthouse,
            won: self.won(),
            lost: self.lost(),
        }
    }
}

/// Rendered form of a card as sent to the UI
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrialsCardView {
    pub wins: u32,
    pub losses: u32,
    pub max_wins: u32,
    pub max_losses: u32,
    pub boons: Boons,
    pub mercy: bool,
    pub lighthouse: bool,
    pub won: Vec<bool>,
    pub lost: Vec<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn advisors(wins: u32, losses: i32, nodes: [bool; 3]) -> Value {
        json!({
            "activities": {
                "trials": {
                    "extended": {
                        "scoreCard": {
                            "wins": wins,
                            "losses": losses,
                            "maxWins": 9,
                            "maxLosses": 3,
                            "ticketItem": {
                                "nodes": [
                                    {"isActivated": nodes[0]},
                                    {"isActivated": nodes[1]},
                                    {"isActivated": nodes[2]}
                                ]
                            }
                        }
                    }
                }
            }
        })
    }

    #[test]
    fn test_from_advisors() {
        let card = TrialsCard::from_advisors(&advisors(4, 1, [false, true, false])).unwrap();
        assert_eq!(card.wins, 4);
        assert_eq!(card.losses, 1);
        assert_eq!(card.max_wins, 9);
        assert_eq!(card.max_losses, 3);
        assert!(card.boons.favor);
        assert!(!card.boons.mercy);
        assert!(!card.mercy);
        assert!(!card.lighthouse);
    }

    #[test]
    fn test_no_trials_activity() {
        let value = json!({"activities": {"nightfall": {}}});
        assert!(TrialsCard::from_advisors(&value).is_none());
    }

    #[test]
    fn test_missing_ticket_item() {
        let value = json!({"activities": {"trials": {"extended": {"scoreCard": {
            "wins": 2, "losses": 0, "maxWins": 9, "maxLosses": 3
        }}}}});
        let card = TrialsCard::from_advisors(&value).unwrap();
        assert_eq!(card.boons, Boons::default());
    }

    #[test]
    fn test_mercy_used_renders_zero_losses() {
        let card = TrialsCard::from_advisors(&advisors(3, -1, [false, false, false])).unwrap();
        assert_eq!(card.losses, -1);
        assert_eq!(card.displayed_losses(), 0);
        assert!(card.mercy);
        assert!(card.boons.mercy);
        assert_eq!(card.lost(), vec![false, false, false]);

        let view = card.view();
        assert_eq!(view.losses, 0);
        assert!(view.mercy);
    }

    #[test]
    fn test_lighthouse() {
        let card = TrialsCard::new(9, 2, 9, 3, Boons::default());
        assert!(card.lighthouse);
        let card = TrialsCard::new(8, 2, 9, 3, Boons::default());
        assert!(!card.lighthouse);
    }

    #[test]
    fn test_progress_dots() {
        let card = TrialsCard::new(2, 1, 4, 3, Boons::default());
        assert_eq!(card.won(), vec![true, true, false, false]);
        assert_eq!(card.lost(), vec![true, false, false]);
    }

    #[test]
    fn test_fake_mercy_removes_a_loss() {
        let card = TrialsCard::new(3, 2, 9, 3, Boons::default()).with_fake_boons(&Boons {
            mercy: true,
            ..Default::default()
        });
        assert_eq!(card.losses, 1);
        assert!(card.boons.mercy);
        assert!(!card.mercy);
    }

    #[test]
    fn test_fake_boldness_needs_a_win() {
        let fake = Boons {
            boldness: true,
            ..Default::default()
        };
        let card = TrialsCard::new(0, 0, 9, 3, Boons::default()).with_fake_boons(&fake);
        assert_eq!(card.wins, 0);
        let card = TrialsCard::new(1, 0, 9, 3, Boons::default()).with_fake_boons(&fake);
        assert_eq!(card.wins, 2);
    }

    #[test]
    fn test_fake_boons_applied_once() {
        let fake = Boons {
            mercy: true,
            favor: true,
            boldness: true,
        };
        let card = TrialsCard::new(7, 2, 9, 3, Boons::default())
            .with_fake_boons(&fake)
            .with_fake_boons(&fake);
        assert_eq!(card.wins, 9);
        assert_eq!(card.losses, 1);
        assert!(card.lighthouse);
    }

    #[test]
    fn test_fake_boons_keep_mercy_used() {
        let card = TrialsCard::new(2, -1, 9, 3, Boons::default()).with_fake_boons(&Boons {
            mercy: true,
            ..Default::default()
        });
        assert_eq!(card.losses, -1);
        assert!(card.mercy);
    }

    #[test]
    fn test_view_serialization() {
        let card = TrialsCard::new(1, 0, 2, 1, Boons::default());
        let json = serde_json::to_value(card.view()).unwrap();
        assert_eq!(json["maxWins"], 2);
        assert_eq!(json["won"], json!([true, false]));
        assert_eq!(json["lighthouse"], false);
    }
}
