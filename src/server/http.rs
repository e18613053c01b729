//! Upstream HTTP clients
//!
//! Blocking `ureq` calls against the platform API, the fireteam API and the
//! trials report API. Every call shares one agent with the configured timeout.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;
use ureq::{Agent, AgentBuilder};

use super::settings::ApiSettings;
use crate::core::error::ApiError;
use crate::core::traits::{FireteamApi, PlatformApi, TokenSource, TrialsReportApi};
use crate::core::types::{
    Account, DataWrapper, Envelope, FireteamMember, Inventory, InventoryResponse, Platform,
    PlayerMatch,
};

pub struct HttpUpstream {
    agent: Agent,
    api_key: String,
    token: Arc<dyn TokenSource>,
    platform_url: String,
    fireteam_url: String,
    trials_report_url: String,
}

impl HttpUpstream {
    pub fn new(settings: &ApiSettings, token: Arc<dyn TokenSource>) -> Self {
        let agent = AgentBuilder::new().timeout(settings.timeout()).build();
        Self {
            agent,
            api_key: settings.key.clone(),
            token,
            platform_url: settings.platform_url.trim_end_matches('/').to_string(),
            fireteam_url: settings.fireteam_url.trim_end_matches('/').to_string(),
            trials_report_url: settings.trials_report_url.trim_end_matches('/').to_string(),
        }
    }

    /// GET a JSON document
    fn get_json<T: DeserializeOwned>(&self, url: &str, authenticated: bool) -> Result<T, ApiError> {
        debug!(url, "[http] GET");
        let mut request = self.agent.get(url);
        if authenticated {
            if !self.api_key.is_empty() {
                request = request.set("X-API-Key", &self.api_key);
            }
            if let Some(token) = self.token.access_token() {
                request = request.set("Authorization", &format!("Bearer {}", token));
            }
        }

        let response = request.call().map_err(map_error)?;
        response
            .into_json::<T>()
            .map_err(|e| ApiError::Decode(e.to_string()))
    }

    /// GET a platform endpoint and unwrap its envelope
    fn platform_get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.platform_envelope::<T>(path)?.into_result()
    }

    fn platform_envelope<T: DeserializeOwned>(&self, path: &str) -> Result<Envelope<T>, ApiError> {
        let url = format!("{}/{}", self.platform_url, path);
        self.get_json(&url, true)
    }
}

fn map_error(err: ureq::Error) -> ApiError {
    match err {
        ureq::Error::Status(code, _) => ApiError::Status(code),
        ureq::Error::Transport(transport) => ApiError::Transport(transport.to_string()),
    }
}

fn segment(value: &str) -> String {
    urlencoding::encode(value).into_owned()
}

impl PlatformApi for HttpUpstream {
    fn search_player(&self, platform: Platform, name: &str) -> Result<Vec<PlayerMatch>, ApiError> {
        // No match may come back as a null Response
        self.platform_envelope(&format!("SearchDestinyPlayer/{}/{}/", platform, segment(name)))?
            .into_result_or_default()
    }

    fn account(&self, platform: Platform, membership_id: &str) -> Result<Account, ApiError> {
        let wrapper: DataWrapper<Account> =
            self.platform_get(&format!("{}/Account/{}/", platform, segment(membership_id)))?;
        Ok(wrapper.data)
    }

    fn inventory(
        &self,
        platform: Platform,
        membership_id: &str,
        character_id: &str,
    ) -> Result<Inventory, ApiError> {
        let response: InventoryResponse = self.platform_get(&format!(
            "{}/Account/{}/Character/{}/Inventory/Summary/?definitions=true",
            platform,
            segment(membership_id),
            segment(character_id)
        ))?;
        Ok(response.into())
    }

    fn advisors(
        &self,
        platform: Platform,
        membership_id: &str,
        character_id: &str,
    ) -> Result<Value, ApiError> {
        let wrapper: DataWrapper<Value> = self.platform_get(&format!(
            "{}/Account/{}/Character/{}/Advisors/V2/",
            platform,
            segment(membership_id),
            segment(character_id)
        ))?;
        Ok(wrapper.data)
    }
}

impl FireteamApi for HttpUpstream {
    fn fireteam(&self, membership_id: &str, mode: u32) -> Result<Vec<FireteamMember>, ApiError> {
        let url = format!(
            "{}/fireteam/{}/{}",
            self.fireteam_url,
            mode,
            segment(membership_id)
        );
        self.get_json(&url, false)
    }
}

impl TrialsReportApi for HttpUpstream {
    fn report(&self, membership_id: &str) -> Result<Option<Value>, ApiError> {
        let url = format!("{}/anubis/{}", self.trials_report_url, segment(membership_id));
        let body: Value = self.get_json(&url, false)?;
        Ok(match body {
            Value::Array(mut items) if !items.is_empty() => Some(items.swap_remove(0)),
            Value::Array(_) | Value::Null => None,
            other => Some(other),
        })
    }
}
