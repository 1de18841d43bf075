//! Overlay network access.
//!
//! The gateway reaches its backend through a private overlay network. This
//! module owns the session lifecycle: exchanging long-lived OAuth credentials
//! for a short-lived join key, admitting an ephemeral node through the local
//! overlay daemon, and tearing the node down when the session is superseded.
//!
//! The rest of the crate depends only on the narrow [`Dialer`] / [`Session`]
//! capabilities, never on the concrete session type, so tests can substitute
//! a fake dialer.

pub mod control;
pub mod session;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::net::TcpStream;

pub use control::ControlPlane;
pub use session::{OverlayOpener, OverlaySession};

/// Something that can dial a network address.
#[async_trait]
pub trait Dialer: Send + Sync {
    async fn dial(&self, host: &str, port: u16) -> std::io::Result<TcpStream>;
}

/// One ephemeral overlay node: dialable while referenced, closed exactly once
/// by the coordinator after it has been superseded.
#[async_trait]
pub trait Session: Dialer {
    /// Tear the node down. Not assumed idempotent; callers guarantee
    /// at-most-once close.
    async fn close(&self) -> Result<(), OverlayError>;
}

/// Factory for overlay sessions, keyed by OAuth client credentials.
#[async_trait]
pub trait Opener: Send + Sync {
    async fn open(
        &self,
        client_id: &str,
        client_secret: &str,
    ) -> Result<Arc<dyn Session>, OverlayError>;
}

/// Errors from the overlay control plane or the local daemon.
#[derive(Debug, Error)]
pub enum OverlayError {
    #[error("overlay request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("token exchange rejected with status {0}")]
    TokenExchange(u16),

    #[error("join key mint rejected with status {0}")]
    KeyMint(u16),

    #[error("daemon join rejected with status {0}")]
    Join(u16),

    #[error("daemon leave rejected with status {0}")]
    Leave(u16),

    #[error("overlay node {hostname} did not reach running state")]
    NeverRunning { hostname: String },
}
