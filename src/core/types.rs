//! Core types - upstream data structures
//!
//! These types mirror the JSON returned by the platform API and the fireteam
//! API. They are deserialized once per poll cycle and never mutated.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use num_enum::{IntoPrimitive, TryFromPrimitive};
use serde::{Deserialize, Serialize};

use super::constants::PLATFORM_SUCCESS_CODE;
use super::error::ApiError;

// =============================================================================
// PLATFORM
// =============================================================================

/// Membership type of an account
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    IntoPrimitive,
    TryFromPrimitive,
)]
#[serde(try_from = "u8", into = "u8")]
#[repr(u8)]
pub enum Platform {
    Xbox = 1,
    #[default]
    PlayStation = 2,
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", u8::from(*self))
    }
}

// =============================================================================
// PLAYERS
// =============================================================================

/// A username search hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerMatch {
    pub membership_id: String,
    pub membership_type: Platform,
    #[serde(default)]
    pub display_name: String,
}

/// A member of a fireteam as reported by the fireteam API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FireteamMember {
    pub membership_id: String,
    pub membership_type: Platform,
    #[serde(default)]
    pub name: String,
    #[serde(default, deserialize_with = "lenient::count")]
    pub kills: u32,
    #[serde(default, deserialize_with = "lenient::count")]
    pub deaths: u32,
    #[serde(default, deserialize_with = "lenient::count")]
    pub assists: u32,
    /// Elo rating, absent when the fireteam API has none
    #[serde(default, deserialize_with = "lenient::rating")]
    pub elo: Option<f64>,
}

// =============================================================================
// ACCOUNT
// =============================================================================

/// Account summary: the characters of a membership
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Account {
    #[serde(default)]
    pub characters: Vec<Character>,
}

impl Account {
    /// The character that was played last
    pub fn last_played(&self) -> Option<&Character> {
        self.characters
            .iter()
            .max_by_key(|c| c.character_base.date_last_played)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Character {
    pub character_base: CharacterBase,
    #[serde(default)]
    pub emblem_path: String,
    #[serde(default)]
    pub background_path: String,
    #[serde(default, deserialize_with = "lenient::count")]
    pub character_level: u32,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CharacterBase {
    pub character_id: String,
    pub date_last_played: DateTime<Utc>,
    #[serde(default, deserialize_with = "lenient::count")]
    pub minutes_played_this_session: u32,
    #[serde(default, deserialize_with = "lenient::count")]
    pub power_level: u32,
    #[serde(default)]
    pub class_hash: u32,
    #[serde(default, deserialize_with = "lenient::count")]
    pub grimoire_score: u32,
    #[serde(default)]
    pub stats: HashMap<String, StatValue>,
    #[serde(default)]
    pub peer_view: Option<PeerView>,
}

impl CharacterBase {
    /// Value of a named stat such as `STAT_DISCIPLINE`, 0 when missing
    pub fn stat(&self, name: &str) -> u32 {
        self.stats.get(name).map(|s| s.value).unwrap_or(0)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StatValue {
    #[serde(default, deserialize_with = "lenient::count")]
    pub value: u32,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PeerView {
    #[serde(default)]
    pub equipment: Vec<PeerEquipment>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerEquipment {
    pub item_hash: u32,
}

// =============================================================================
// INVENTORY
// =============================================================================

/// Inventory summary of a character with its definition tables
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct Inventory {
    #[serde(default)]
    pub items: Vec<InventoryItem>,
    #[serde(default)]
    pub definitions: Definitions,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryItem {
    pub item_hash: u32,
    pub bucket_hash: u32,
    #[serde(default)]
    pub transfer_status: u32,
    #[serde(default)]
    pub damage_type_hash: u32,
    #[serde(default)]
    pub stats: Vec<ItemStat>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemStat {
    pub stat_hash: u32,
    #[serde(default)]
    pub value: i32,
    #[serde(default)]
    pub minimum: i32,
    #[serde(default)]
    pub maximum_value: i32,
}

/// Static lookup tables returned alongside an inventory
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Definitions {
    #[serde(default)]
    pub items: HashMap<u32, ItemDefinition>,
    #[serde(default)]
    pub stats: HashMap<u32, StatDefinition>,
    #[serde(default)]
    pub damage_types: HashMap<u32, DamageTypeDefinition>,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemDefinition {
    #[serde(default)]
    pub item_name: String,
    #[serde(default)]
    pub item_description: String,
    #[serde(default)]
    pub item_type_name: String,
    #[serde(default)]
    pub icon: String,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatDefinition {
    #[serde(default)]
    pub stat_name: String,
    #[serde(default)]
    pub stat_description: String,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DamageTypeDefinition {
    #[serde(default)]
    pub damage_type_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub icon_path: String,
}

// =============================================================================
// PLATFORM ENVELOPE
// =============================================================================

/// Wrapper around every platform API response
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope<T> {
    #[serde(rename = "Response")]
    pub response: Option<T>,
    #[serde(rename = "ErrorCode", default)]
    pub error_code: i64,
    #[serde(rename = "ErrorStatus", default)]
    pub error_status: String,
    #[serde(rename = "Message", default)]
    pub message: String,
}

impl<T> Envelope<T> {
    /// Unwrap the response, turning platform error codes into errors
    pub fn into_result(self) -> Result<T, ApiError> {
        self.checked()?
            .ok_or_else(|| ApiError::Decode("missing Response".to_string()))
    }

    /// Like [`into_result`](Self::into_result), reading a null Response as empty
    pub fn into_result_or_default(self) -> Result<T, ApiError>
    where
        T: Default,
    {
        Ok(self.checked()?.unwrap_or_default())
    }

    fn checked(self) -> Result<Option<T>, ApiError> {
        if self.error_code != PLATFORM_SUCCESS_CODE {
            return Err(ApiError::Platform {
                code: self.error_code,
                status: self.error_status,
                message: self.message,
            });
        }
        Ok(self.response)
    }
}

/// Account and inventory responses nest their payload under `data`
#[derive(Debug, Clone, Deserialize)]
pub struct DataWrapper<T> {
    pub data: T,
}

/// The inventory summary keeps the definitions next to `data`
#[derive(Debug, Clone, Deserialize)]
pub struct InventoryResponse {
    pub data: InventoryData,
    #[serde(default)]
    pub definitions: Definitions,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InventoryData {
    #[serde(default)]
    pub items: Vec<InventoryItem>,
}

impl From<InventoryResponse> for Inventory {
    fn from(resp: InventoryResponse) -> Self {
        Inventory {
            items: resp.data.items,
            definitions: resp.definitions,
        }
    }
}

// =============================================================================
// LENIENT NUMBERS
// =============================================================================

/// Deserializers for numbers the upstream sends either as JSON numbers or as
/// numeric strings
mod lenient {
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    fn as_f64(value: &Value) -> Option<f64> {
        match value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
    }

    pub fn count<'de, D: Deserializer<'de>>(de: D) -> Result<u32, D::Error> {
        let value = Value::deserialize(de)?;
        Ok(as_f64(&value)
            .filter(|v| v.is_finite() && *v > 0.0)
            .map(|v| v.round().min(u32::MAX as f64) as u32)
            .unwrap_or(0))
    }

    pub fn rating<'de, D: Deserializer<'de>>(de: D) -> Result<Option<f64>, D::Error> {
        let value = Value::deserialize(de)?;
        Ok(as_f64(&value).filter(|v| v.is_finite() && *v != 0.0))
    }
}
