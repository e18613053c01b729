//! Constants - timings, upstream identifiers and game hash tables

use std::time::Duration;

// =============================================================================
// TIMINGS
// =============================================================================

/// Delay between two refreshes of a fireteam report
pub const REPORT_REFRESH_INTERVAL: Duration = Duration::from_secs(10);

/// Delay between two polls of the trials card
pub const CARD_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Timeout applied to every upstream HTTP call
pub const UPSTREAM_TIMEOUT: Duration = Duration::from_secs(10);

/// Sleep between two iterations of a connection loop
pub const CONNECTION_POLL_DELAY: Duration = Duration::from_millis(10);

// =============================================================================
// UPSTREAM
// =============================================================================

/// Fireteam API game mode for Trials of Osiris
pub const TRIALS_FIRETEAM_MODE: u32 = 14;

/// Bungie `ErrorCode` of a successful response
pub const PLATFORM_SUCCESS_CODE: i64 = 1;

/// Inventory `transferStatus` of an item that is currently equipped
pub const TRANSFER_STATUS_EQUIPPED: u32 = 1;

// =============================================================================
// TRIALS CARD
// =============================================================================

/// Wins required to reach the lighthouse
pub const LIGHTHOUSE_WINS: u32 = 9;

/// Raw losses value reported once mercy has been used
pub const MERCY_USED_LOSSES: i32 = -1;

// =============================================================================
// CHARACTER STATS
// =============================================================================

/// Stat value where the tier calculation caps
pub const MAX_STAT_VALUE: u32 = 300;

/// Number of tiers a capped stat is split into
pub const STAT_TIERS: u32 = 5;

// Class hashes
pub const CLASS_WARLOCK: u32 = 2271682572;
pub const CLASS_HUNTER: u32 = 671679327;
pub const CLASS_TITAN: u32 = 3655393761;

// Subclass talent grid hashes (first peer view equipment entry)
pub const SUBCLASS_SUNBREAKER: u32 = 21395672;
pub const SUBCLASS_DEFENDER: u32 = 2007186000;
pub const SUBCLASS_STRIKER: u32 = 2455559914;
pub const SUBCLASS_SUNSINGER: u32 = 3658182170;
pub const SUBCLASS_VOIDWALKER: u32 = 3828867689;
pub const SUBCLASS_STORMCALLER: u32 = 1256644900;
pub const SUBCLASS_GUNSLINGER: u32 = 1716862031;
pub const SUBCLASS_NIGHTSTALKER: u32 = 4143670657;
pub const SUBCLASS_BLADEDANCER: u32 = 2962927168;

// Inventory bucket hashes
pub const BUCKET_PRIMARY: u32 = 1498876634;
pub const BUCKET_SPECIAL: u32 = 2465295065;
pub const BUCKET_HEAVY: u32 = 953998645;
pub const BUCKET_GHOST: u32 = 4023194814;
pub const BUCKET_HELMET: u32 = 3448274439;
pub const BUCKET_CHEST: u32 = 14239492;
pub const BUCKET_GAUNTLETS: u32 = 3551918588;
pub const BUCKET_LEGS: u32 = 20886954;
pub const BUCKET_CLASS_ITEM: u32 = 1585787867;
pub const BUCKET_ARTIFACT: u32 = 434908299;
