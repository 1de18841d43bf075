//! Overlay session lifecycle.
//!
//! A session is one ephemeral node on the overlay network, admitted through
//! the local overlay daemon with a freshly minted join key. While the node is
//! up the daemon routes overlay traffic and resolves overlay hostnames, so
//! dialing a target is a plain TCP connect. Leaving the network removes the
//! ephemeral node; its identity is never reused.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;

use crate::config::schema::OverlaySettings;
use crate::overlay::control::ControlPlane;
use crate::overlay::{Dialer, Opener, OverlayError, Session};

const STATUS_POLL_INTERVAL: Duration = Duration::from_millis(500);
const STATUS_POLL_ATTEMPTS: u32 = 60;

#[derive(Debug, Serialize)]
struct JoinRequest<'a> {
    auth_key: &'a str,
    hostname: &'a str,
    state_dir: &'a str,
    ephemeral: bool,
}

#[derive(Debug, Deserialize)]
struct JoinResponse {
    node_id: String,
}

#[derive(Debug, Deserialize)]
struct NodeStatus {
    state: String,
}

/// One ephemeral overlay node identity.
pub struct OverlaySession {
    http: reqwest::Client,
    daemon_url: String,
    hostname: String,
    node_id: String,
}

impl OverlaySession {
    /// Exchange credentials for a join key, admit a node through the local
    /// daemon, and wait for it to come up.
    pub async fn open(
        settings: &OverlaySettings,
        client_id: &str,
        client_secret: &str,
    ) -> Result<Self, OverlayError> {
        let control = ControlPlane::new(settings.control_url.clone());
        let access_token = control.access_token(client_id, client_secret).await?;
        let join_key = control.mint_join_key(&access_token, &settings.tag).await?;

        let http = reqwest::Client::new();
        let daemon_url = settings.daemon_url.trim_end_matches('/').to_string();

        let response = http
            .post(format!("{daemon_url}/v1/join"))
            .json(&JoinRequest {
                auth_key: &join_key,
                hostname: &settings.hostname,
                state_dir: &settings.state_dir,
                ephemeral: true,
            })
            .send()
            .await?;

        if response.status() != StatusCode::OK {
            return Err(OverlayError::Join(response.status().as_u16()));
        }

        let joined: JoinResponse = response.json().await?;
        let session = Self {
            http,
            daemon_url,
            hostname: settings.hostname.clone(),
            node_id: joined.node_id,
        };

        session.wait_until_running().await?;

        tracing::info!(
            hostname = %session.hostname,
            node_id = %session.node_id,
            "overlay node up"
        );

        Ok(session)
    }

    async fn wait_until_running(&self) -> Result<(), OverlayError> {
        for _ in 0..STATUS_POLL_ATTEMPTS {
            let response = self
                .http
                .get(format!("{}/v1/nodes/{}", self.daemon_url, self.node_id))
                .send()
                .await?;

            if response.status() == StatusCode::OK {
                let status: NodeStatus = response.json().await?;
                if status.state.eq_ignore_ascii_case("running") {
                    return Ok(());
                }
            }

            tokio::time::sleep(STATUS_POLL_INTERVAL).await;
        }

        Err(OverlayError::NeverRunning {
            hostname: self.hostname.clone(),
        })
    }
}

#[async_trait]
impl Dialer for OverlaySession {
    async fn dial(&self, host: &str, port: u16) -> std::io::Result<TcpStream> {
        // Overlay routing and name resolution are handled by the daemon while
        // this node is up.
        TcpStream::connect((host, port)).await
    }
}

#[async_trait]
impl Session for OverlaySession {
    async fn close(&self) -> Result<(), OverlayError> {
        let response = self
            .http
            .post(format!("{}/v1/leave/{}", self.daemon_url, self.node_id))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(OverlayError::Leave(response.status().as_u16()));
        }

        tracing::info!(
            hostname = %self.hostname,
            node_id = %self.node_id,
            "overlay node left the network"
        );

        Ok(())
    }
}

/// Production [`Opener`] backed by the control plane and local daemon.
pub struct OverlayOpener {
    settings: OverlaySettings,
}

impl OverlayOpener {
    pub fn new(settings: OverlaySettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl Opener for OverlayOpener {
    async fn open(
        &self,
        client_id: &str,
        client_secret: &str,
    ) -> Result<Arc<dyn Session>, OverlayError> {
        let session = OverlaySession::open(&self.settings, client_id, client_secret).await?;
        Ok(Arc::new(session))
    }
}
