//! Overlay control plane client.
//!
//! Two calls: an OAuth client-credentials grant for a short-lived access
//! token, and a join-key mint scoped to a restrictive capability set. Join
//! keys are non-reusable, ephemeral, pre-authorized, and tagged for this
//! gateway's identity, so a leaked key admits nothing beyond one short-lived
//! tagged node.

use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;

use crate::overlay::OverlayError;

/// Seconds before an unused join key expires.
const JOIN_KEY_EXPIRY_SECS: u64 = 300;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct KeyResponse {
    key: String,
}

/// Client for the overlay network's control plane API.
pub struct ControlPlane {
    http: reqwest::Client,
    base_url: String,
}

impl ControlPlane {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    /// Exchange the long-lived OAuth client pair for a short-lived access
    /// token.
    pub async fn access_token(
        &self,
        client_id: &str,
        client_secret: &str,
    ) -> Result<String, OverlayError> {
        let response = self
            .http
            .post(format!("{}/oauth/token", self.base_url.trim_end_matches('/')))
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", client_id),
                ("client_secret", client_secret),
            ])
            .send()
            .await?;

        if response.status() != StatusCode::OK {
            return Err(OverlayError::TokenExchange(response.status().as_u16()));
        }

        let token: TokenResponse = response.json().await?;
        Ok(token.access_token)
    }

    /// Mint a single-use, pre-authorized join key tagged for this gateway.
    pub async fn mint_join_key(&self, access_token: &str, tag: &str) -> Result<String, OverlayError> {
        let body = json!({
            "description": "tailgate gateway node",
            "expirySeconds": JOIN_KEY_EXPIRY_SECS,
            "capabilities": {
                "devices": {
                    "create": {
                        "reusable": false,
                        "ephemeral": true,
                        "preauthorized": true,
                        "tags": [tag],
                    }
                }
            },
        });

        let response = self
            .http
            .post(format!("{}/api/v2/keys", self.base_url.trim_end_matches('/')))
            .bearer_auth(access_token)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(OverlayError::KeyMint(response.status().as_u16()));
        }

        let key: KeyResponse = response.json().await?;
        Ok(key.key)
    }
}
