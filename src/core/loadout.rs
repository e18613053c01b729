//! Loadout derivation
//!
//! Builds the per-member view shown in a fireteam report from the character
//! summary, the inventory and the definition tables that come with it.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::constants::*;
use super::types::{Character, CharacterBase, FireteamMember, Inventory, InventoryItem};

// =============================================================================
// SLOTS
// =============================================================================

/// Equipment slot, backed by an inventory bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Slot {
    Primary,
    Special,
    Heavy,
    Ghost,
    Helmet,
    Gauntlets,
    Chest,
    Legs,
    ClassItem,
    Artifact,
}

impl Slot {
    pub const ALL: [Slot; 10] = [
        Slot::Primary,
        Slot::Special,
        Slot::Heavy,
        Slot::Ghost,
        Slot::Helmet,
        Slot::Gauntlets,
        Slot::Chest,
        Slot::Legs,
        Slot::ClassItem,
        Slot::Artifact,
    ];

    pub fn bucket_hash(self) -> u32 {
        match self {
            Slot::Primary => BUCKET_PRIMARY,
            Slot::Special => BUCKET_SPECIAL,
            Slot::Heavy => BUCKET_HEAVY,
            Slot::Ghost => BUCKET_GHOST,
            Slot::Helmet => BUCKET_HELMET,
            Slot::Gauntlets => BUCKET_GAUNTLETS,
            Slot::Chest => BUCKET_CHEST,
            Slot::Legs => BUCKET_LEGS,
            Slot::ClassItem => BUCKET_CLASS_ITEM,
            Slot::Artifact => BUCKET_ARTIFACT,
        }
    }
}

// =============================================================================
// CLASSES
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Class {
    Warlock,
    Hunter,
    Titan,
    Unknown,
}

impl Class {
    pub fn from_hash(hash: u32) -> Self {
        match hash {
            CLASS_WARLOCK => Class::Warlock,
            CLASS_HUNTER => Class::Hunter,
            CLASS_TITAN => Class::Titan,
            _ => Class::Unknown,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Subclass {
    Sunbreaker,
    Defender,
    Striker,
    Sunsinger,
    Voidwalker,
    Stormcaller,
    Gunslinger,
    Nightstalker,
    Bladedancer,
}

impl Subclass {
    pub fn from_hash(hash: u32) -> Option<Self> {
        Some(match hash {
            SUBCLASS_SUNBREAKER => Subclass::Sunbreaker,
            SUBCLASS_DEFENDER => Subclass::Defender,
            SUBCLASS_STRIKER => Subclass::Striker,
            SUBCLASS_SUNSINGER => Subclass::Sunsinger,
            SUBCLASS_VOIDWALKER => Subclass::Voidwalker,
            SUBCLASS_STORMCALLER => Subclass::Stormcaller,
            SUBCLASS_GUNSLINGER => Subclass::Gunslinger,
            SUBCLASS_NIGHTSTALKER => Subclass::Nightstalker,
            SUBCLASS_BLADEDANCER => Subclass::Bladedancer,
            _ => return None,
        })
    }

    /// Subclass of a character, read from its first peer view equipment entry
    pub fn of(base: &CharacterBase) -> Option<Self> {
        let first = base.peer_view.as_ref()?.equipment.first()?;
        Self::from_hash(first.item_hash)
    }

    /// Supers that recharge on the shorter intellect schedule
    fn has_fast_super(self) -> bool {
        matches!(
            self,
            Subclass::Sunsinger | Subclass::Defender | Subclass::Striker | Subclass::Nightstalker
        )
    }

    /// Melee abilities that recharge on the longer strength schedule
    fn has_slow_melee(self) -> bool {
        matches!(self, Subclass::Gunslinger | Subclass::Nightstalker)
    }
}

// =============================================================================
// LEAGUES
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum League {
    Bronze,
    Silver,
    Gold,
    Platinum,
    Diamond,
}

impl League {
    /// League of an Elo rating; None outside the rated range
    pub fn from_rating(rating: f64) -> Option<Self> {
        let rating = rating.round();
        match rating as i64 {
            0..=1099 => Some(League::Bronze),
            1100..=1299 => Some(League::Silver),
            1300..=1499 => Some(League::Gold),
            1500..=1699 => Some(League::Platinum),
            1700..=9999 => Some(League::Diamond),
            _ => None,
        }
    }
}

// =============================================================================
// STATS
// =============================================================================

/// Character stat that drives an ability cooldown
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbilityStat {
    Discipline,
    Intellect,
    Strength,
}

const COOLDOWN_DEFAULT: [&str; 6] = ["1:00", "0:55", "0:49", "0:42", "0:34", "0:25"];
const COOLDOWN_SUPER_FAST: [&str; 6] = ["5:00", "4:46", "4:31", "4:15", "3:58", "3:40"];
const COOLDOWN_SUPER_SLOW: [&str; 6] = ["5:30", "5:14", "4:57", "4:39", "4:20", "4:00"];
const COOLDOWN_MELEE_SLOW: [&str; 6] = ["1:10", "1:04", "0:57", "0:49", "0:40", "0:29"];

/// Tier (0..=5) of a stat value
pub fn tier(value: u32) -> u8 {
    (value.min(MAX_STAT_VALUE) / (MAX_STAT_VALUE / STAT_TIERS)) as u8
}

/// Ability cooldown at a given tier for a subclass
pub fn cooldown(stat: AbilityStat, subclass: Option<Subclass>, tier: u8) -> Option<&'static str> {
    let table = match stat {
        AbilityStat::Discipline => &COOLDOWN_DEFAULT,
        AbilityStat::Intellect => match subclass {
            Some(s) if s.has_fast_super() => &COOLDOWN_SUPER_FAST,
            _ => &COOLDOWN_SUPER_SLOW,
        },
        AbilityStat::Strength => match subclass {
            Some(s) if s.has_slow_melee() => &COOLDOWN_MELEE_SLOW,
            _ => &COOLDOWN_DEFAULT,
        },
    };
    table.get(tier as usize).copied()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatTier {
    pub value: u32,
    pub tier: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cooldown: Option<String>,
}

impl StatTier {
    fn new(stat: AbilityStat, value: u32, subclass: Option<Subclass>) -> Self {
        let tier = tier(value);
        Self {
            value,
            tier,
            cooldown: cooldown(stat, subclass, tier).map(str::to_string),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Build {
    pub discipline: StatTier,
    pub intellect: StatTier,
    pub strength: StatTier,
    pub armor: u32,
    pub agility: u32,
    pub recovery: u32,
}

impl Build {
    fn of(base: &CharacterBase, subclass: Option<Subclass>) -> Self {
        Self {
            discipline: StatTier::new(
                AbilityStat::Discipline,
                base.stat("STAT_DISCIPLINE"),
                subclass,
            ),
            intellect: StatTier::new(
                AbilityStat::Intellect,
                base.stat("STAT_INTELLECT"),
                subclass,
            ),
            strength: StatTier::new(AbilityStat::Strength, base.stat("STAT_STRENGTH"), subclass),
            armor: base.stat("STAT_ARMOR"),
            agility: base.stat("STAT_AGILITY"),
            recovery: base.stat("STAT_RECOVERY"),
        }
    }
}

// =============================================================================
// EMBLEM
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Emblem {
    pub icon: String,
    pub background: String,
    pub name: String,
    pub light_level: u32,
    pub level: u32,
    pub grimoire: u32,
    /// Minutes played this session
    pub playtime: u32,
    pub class_name: Class,
}

// =============================================================================
// EQUIPMENT
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Element {
    pub name: String,
    pub title: String,
    pub icon: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquippedStat {
    pub name: String,
    pub title: String,
    pub minimum: i32,
    pub maximum: i32,
    pub value: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquippedItem {
    pub slot: Slot,
    pub name: String,
    pub title: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub icon: String,
    pub stats: Vec<EquippedStat>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub element: Option<Element>,
}

/// The item equipped in a slot, resolved against the definition tables
pub fn equipped(inventory: &Inventory, slot: Slot) -> Option<EquippedItem> {
    let bucket = slot.bucket_hash();
    // Looking up yourself returns the whole vault too; only keep what is worn.
    let item: &InventoryItem = inventory
        .items
        .iter()
        .rev()
        .find(|i| i.transfer_status == TRANSFER_STATUS_EQUIPPED && i.bucket_hash == bucket)?;

    let defs = &inventory.definitions;
    let definition = defs.items.get(&item.item_hash).cloned().unwrap_or_default();

    let stats = item
        .stats
        .iter()
        .map(|stat| {
            let def = defs.stats.get(&stat.stat_hash).cloned().unwrap_or_default();
            EquippedStat {
                name: def.stat_name,
                title: def.stat_description,
                minimum: stat.minimum,
                maximum: stat.maximum_value,
                value: stat.value,
            }
        })
        .collect();

    let element = defs
        .damage_types
        .get(&item.damage_type_hash)
        .map(|d| Element {
            name: d.damage_type_name.clone(),
            title: d.description.clone(),
            icon: d.icon_path.clone(),
        });

    Some(EquippedItem {
        slot,
        name: definition.item_name,
        title: definition.item_description,
        kind: definition.item_type_name,
        icon: definition.icon,
        stats,
        element,
    })
}

// =============================================================================
// LOADOUT
// =============================================================================

/// Everything the report shows about one fireteam member
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Loadout {
    pub guardian: FireteamMember,
    pub emblem: Emblem,
    pub build: Build,
    #[serde(default)]
    pub subclass: Option<Subclass>,
    #[serde(default)]
    pub league: Option<League>,
    pub equipped: Vec<EquippedItem>,
    /// Third party trials report, when it was available
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report: Option<Value>,
}

impl Loadout {
    pub fn build(member: &FireteamMember, character: &Character, inventory: &Inventory) -> Self {
        let base = &character.character_base;
        let subclass = Subclass::of(base);

        Self {
            guardian: member.clone(),
            emblem: Emblem {
                icon: character.emblem_path.clone(),
                background: character.background_path.clone(),
                name: member.name.clone(),
                light_level: base.power_level,
                level: character.character_level,
                grimoire: base.grimoire_score,
                playtime: base.minutes_played_this_session,
                class_name: Class::from_hash(base.class_hash),
            },
            build: Build::of(base, subclass),
            subclass,
            league: member.elo.and_then(League::from_rating),
            equipped: Slot::ALL
                .iter()
                .filter_map(|slot| equipped(inventory, *slot))
                .collect(),
            report: None,
        }
    }

    pub fn membership_id(&self) -> &str {
        &self.guardian.membership_id
    }
}

/// Sort loadouts by Elo, highest first; unrated members keep their order at the end
pub fn sort_by_elo(loadouts: &mut [Loadout]) {
    loadouts.sort_by(|a, b| match (a.guardian.elo, b.guardian.elo) {
        (Some(x), Some(y)) => y.total_cmp(&x),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => std::cmp::Ordering::Equal,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Platform;
    use serde_json::json;

    fn member(name: &str, elo: Option<f64>) -> FireteamMember {
        FireteamMember {
            membership_id: format!("id-{}", name),
            membership_type: Platform::PlayStation,
            name: name.to_string(),
            kills: 10,
            deaths: 5,
            assists: 2,
            elo,
        }
    }

    fn character() -> Character {
        serde_json::from_value(json!({
            "characterBase": {
                "characterId": "c1",
                "dateLastPlayed": "2016-09-10T20:00:00Z",
                "minutesPlayedThisSession": "42",
                "powerLevel": 335,
                "classHash": CLASS_HUNTER,
                "grimoireScore": 4500,
                "stats": {
                    "STAT_DISCIPLINE": {"value": 150},
                    "STAT_INTELLECT": {"value": 300},
                    "STAT_STRENGTH": {"value": 59},
                    "STAT_ARMOR": {"value": 3},
                    "STAT_AGILITY": {"value": 8},
                    "STAT_RECOVERY": {"value": 4}
                },
                "peerView": {"equipment": [{"itemHash": SUBCLASS_GUNSLINGER}]}
            },
            "emblemPath": "/emblem.jpg",
            "backgroundPath": "/bg.jpg",
            "characterLevel": 40
        }))
        .unwrap()
    }

    fn inventory() -> Inventory {
        serde_json::from_value(json!({
            "items": [
                {"itemHash": 1, "bucketHash": BUCKET_PRIMARY, "transferStatus": 1,
                 "damageTypeHash": 7,
                 "stats": [{"statHash": 100, "value": 45, "minimum": 0, "maximumValue": 100}]},
                {"itemHash": 2, "bucketHash": BUCKET_PRIMARY, "transferStatus": 0},
                {"itemHash": 3, "bucketHash": BUCKET_HELMET, "transferStatus": 1}
            ],
            "definitions": {
                "items": {
                    "1": {"itemName": "Thorn", "itemDescription": "Rise.", "itemTypeName": "Hand Cannon", "icon": "/thorn.png"},
                    "2": {"itemName": "Vault Item"},
                    "3": {"itemName": "Celestial Nighthawk"}
                },
                "stats": {"100": {"statName": "Impact", "statDescription": "Damage per shot"}},
                "damageTypes": {"7": {"damageTypeName": "Kinetic", "description": "Plain", "iconPath": "/k.png"}}
            }
        }))
        .unwrap()
    }

    #[test]
    fn test_tier() {
        assert_eq!(tier(0), 0);
        assert_eq!(tier(59), 0);
        assert_eq!(tier(60), 1);
        assert_eq!(tier(299), 4);
        assert_eq!(tier(300), 5);
        assert_eq!(tier(1000), 5);
    }

    #[test]
    fn test_cooldowns_per_subclass() {
        assert_eq!(
            cooldown(AbilityStat::Intellect, Some(Subclass::Defender), 5),
            Some("3:40")
        );
        assert_eq!(
            cooldown(AbilityStat::Intellect, Some(Subclass::Voidwalker), 5),
            Some("4:00")
        );
        assert_eq!(
            cooldown(AbilityStat::Strength, Some(Subclass::Gunslinger), 0),
            Some("1:10")
        );
        assert_eq!(cooldown(AbilityStat::Discipline, None, 2), Some("0:49"));
        assert_eq!(cooldown(AbilityStat::Discipline, None, 9), None);
    }

    #[test]
    fn test_league() {
        assert_eq!(League::from_rating(0.0), Some(League::Bronze));
        assert_eq!(League::from_rating(1099.4), Some(League::Bronze));
        assert_eq!(League::from_rating(1099.6), Some(League::Silver));
        assert_eq!(League::from_rating(1450.0), Some(League::Gold));
        assert_eq!(League::from_rating(1650.0), Some(League::Platinum));
        assert_eq!(League::from_rating(2100.0), Some(League::Diamond));
        assert_eq!(League::from_rating(-5.0), None);
    }

    #[test]
    fn test_equipped_ignores_unequipped_items() {
        let inv = inventory();
        let primary = equipped(&inv, Slot::Primary).unwrap();
        assert_eq!(primary.name, "Thorn");
        assert_eq!(primary.kind, "Hand Cannon");
        assert_eq!(primary.stats.len(), 1);
        assert_eq!(primary.stats[0].name, "Impact");
        assert_eq!(primary.stats[0].maximum, 100);
        assert_eq!(primary.element.as_ref().unwrap().name, "Kinetic");
        assert!(equipped(&inv, Slot::Heavy).is_none());
    }

    #[test]
    fn test_build_loadout() {
        let loadout = Loadout::build(&member("a", Some(1520.0)), &character(), &inventory());
        assert_eq!(loadout.emblem.class_name, Class::Hunter);
        assert_eq!(loadout.emblem.playtime, 42);
        assert_eq!(loadout.emblem.light_level, 335);
        assert_eq!(loadout.subclass, Some(Subclass::Gunslinger));
        assert_eq!(loadout.league, Some(League::Platinum));
        assert_eq!(loadout.build.intellect.tier, 5);
        assert_eq!(loadout.build.intellect.cooldown.as_deref(), Some("4:00"));
        assert_eq!(loadout.build.strength.tier, 0);
        assert_eq!(loadout.build.strength.cooldown.as_deref(), Some("1:10"));
        assert_eq!(loadout.build.armor, 3);
        assert_eq!(loadout.equipped.len(), 2);
        assert!(loadout.report.is_none());
    }

    #[test]
    fn test_sort_by_elo() {
        let c = character();
        let inv = Inventory::default();
        let mut loadouts = vec![
            Loadout::build(&member("low", Some(1100.0)), &c, &inv),
            Loadout::build(&member("none", None), &c, &inv),
            Loadout::build(&member("high", Some(1800.0)), &c, &inv),
        ];
        sort_by_elo(&mut loadouts);
        let names: Vec<&str> = loadouts.iter().map(|l| l.guardian.name.as_str()).collect();
        assert_eq!(names, vec!["high", "low", "none"]);
    }

    #[test]
    fn test_loadout_serialization_skips_missing_report() {
        let loadout = Loadout::build(&member("a", None), &character(), &Inventory::default());
        let json = serde_json::to_value(&loadout).unwrap();
        assert!(json.get("report").is_none());
        assert_eq!(json["emblem"]["className"], "Hunter");
    }
}
