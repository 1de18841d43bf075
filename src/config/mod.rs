//! Configuration subsystem.
//!
//! Split in two layers: static [`schema::Settings`] loaded once at startup,
//! and dynamic [`snapshot::ConfigSnapshot`] values resolved by the
//! [`store::CredentialStore`] on every reload cycle.

pub mod schema;
pub mod snapshot;
pub mod store;
pub mod validation;

use thiserror::Error;

pub use schema::Settings;
pub use snapshot::ConfigSnapshot;
pub use store::CredentialStore;

/// Errors from loading static settings or fetching dynamic profiles.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read settings file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to parse settings file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid settings: {0}")]
    Validation(String),

    #[error("config agent request failed: {0}")]
    Agent(#[from] reqwest::Error),

    #[error("config agent returned status {status} for profile {profile}")]
    AgentStatus { profile: String, status: u16 },

    #[error("failed to decode profile {profile}: {source}")]
    Decode {
        profile: String,
        source: serde_json::Error,
    },

    #[error("invalid target url in profile {profile}: {source}")]
    TargetUrl {
        profile: String,
        source: url::ParseError,
    },
}
