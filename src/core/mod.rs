//! Core module - transport independent logic
//!
//! Report lookups, trials card polling, the socket protocol and the config
//! store. Nothing here opens a socket; upstream APIs are reached through the
//! traits in [`traits`] so every piece can be tested with mocks.

pub mod card;
pub mod client;
pub mod constants;
pub mod error;
pub mod loadout;
pub mod protocol;
pub mod report;
pub mod router;
pub mod session;
pub mod staleness;
pub mod store;
pub mod timer;
pub mod traits;
pub mod trials;
pub mod types;

pub use card::{CardPoller, CardSource};
pub use client::{ClientEvent, RpcClient};
pub use error::{ApiError, ReportError, StoreError};
pub use loadout::Loadout;
pub use protocol::{Endpoint, Inbound, Outbound, RpcCall};
pub use report::{LookupOutcome, ReportEngine, ReportEvent, ReportSettings};
pub use session::{Session, SessionSettings};
pub use staleness::{StaleGate, Verdict};
pub use store::{ConfigChange, ConfigStore};
pub use traits::{FireteamApi, PlatformApi, StaticToken, TokenSource, TrialsReportApi, Upstream};
pub use trials::{Boons, TrialsCard};
pub use types::{FireteamMember, Platform};
