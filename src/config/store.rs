//! Credential store: resolves named profiles from the configuration agent.
//!
//! Every call to [`CredentialStore::fetch`] re-fetches all profiles; nothing
//! is cached. The three fetches fan out concurrently and the whole fetch
//! fails fast on the first error, dropping the remaining in-flight requests.

use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use url::Url;

use crate::config::schema::AgentSettings;
use crate::config::snapshot::ConfigSnapshot;
use crate::config::ConfigError;

/// JSON shape of the overlay OAuth client profile.
#[derive(Debug, Deserialize)]
struct OverlayOAuthProfile {
    id: String,
    secret: String,
}

/// Client for the configuration agent's profile endpoint.
pub struct CredentialStore {
    http: reqwest::Client,
    agent: AgentSettings,
}

impl CredentialStore {
    pub fn new(agent: AgentSettings) -> Self {
        Self {
            http: reqwest::Client::new(),
            agent,
        }
    }

    /// Resolve all profiles into one immutable snapshot.
    pub async fn fetch(&self) -> Result<ConfigSnapshot, ConfigError> {
        let (raw_target, auth_token, oauth) = tokio::try_join!(
            self.fetch_raw(&self.agent.profiles.target_uri),
            self.fetch_raw(&self.agent.profiles.auth_token),
            self.fetch_json::<OverlayOAuthProfile>(&self.agent.profiles.overlay_oauth_client),
        )?;

        let target = Url::parse(&raw_target).map_err(|source| ConfigError::TargetUrl {
            profile: self.agent.profiles.target_uri.clone(),
            source,
        })?;
        if target.host_str().is_none() {
            return Err(ConfigError::Validation(format!(
                "target url from profile {} has no host",
                self.agent.profiles.target_uri
            )));
        }

        Ok(ConfigSnapshot {
            target,
            auth_token,
            overlay_client_id: oauth.id,
            overlay_client_secret: oauth.secret,
        })
    }

    async fn fetch_raw(&self, profile: &str) -> Result<String, ConfigError> {
        let url = format!(
            "{}/applications/{}/environments/{}/configurations/{}",
            self.agent.base_url.trim_end_matches('/'),
            self.agent.application,
            self.agent.environment,
            profile,
        );

        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.agent.access_token)
            .send()
            .await?;

        if response.status() != StatusCode::OK {
            return Err(ConfigError::AgentStatus {
                profile: profile.to_string(),
                status: response.status().as_u16(),
            });
        }

        Ok(response.text().await?)
    }

    async fn fetch_json<T: DeserializeOwned>(&self, profile: &str) -> Result<T, ConfigError> {
        let raw = self.fetch_raw(profile).await?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::Decode {
            profile: profile.to_string(),
            source,
        })
    }
}
