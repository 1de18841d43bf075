//! Immutable configuration snapshots.
//!
//! A snapshot is the fully-resolved output of one reload cycle. It is never
//! mutated in place; a later reload produces a brand-new value. Change
//! detection compares all four fields, since partial comparison risks serving
//! a stale target or token indefinitely.

use std::fmt;

use url::Url;

/// Fully-resolved dynamic configuration for one reload cycle.
#[derive(Clone, PartialEq, Eq)]
pub struct ConfigSnapshot {
    /// Backend base URL on the overlay network (scheme, host, base path,
    /// fixed query).
    pub target: Url,

    /// Auth token injected into qualifying web-services calls.
    pub auth_token: String,

    /// OAuth client id used to join the overlay network.
    pub overlay_client_id: String,

    /// OAuth client secret paired with `overlay_client_id`.
    pub overlay_client_secret: String,
}

impl ConfigSnapshot {
    /// True when the overlay credential pair differs from `other`, which
    /// forces a brand-new overlay session instead of reusing the current one.
    pub fn overlay_credentials_changed(&self, other: &ConfigSnapshot) -> bool {
        self.overlay_client_id != other.overlay_client_id
            || self.overlay_client_secret != other.overlay_client_secret
    }
}

impl fmt::Debug for ConfigSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigSnapshot")
            .field("target", &self.target.as_str())
            .field("auth_token", &"<redacted>")
            .field("overlay_client_id", &self.overlay_client_id)
            .field("overlay_client_secret", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> ConfigSnapshot {
        ConfigSnapshot {
            target: Url::parse("http://printserver.tail.net:9191/base").unwrap(),
            auth_token: "token-a".into(),
            overlay_client_id: "client-a".into(),
            overlay_client_secret: "secret-a".into(),
        }
    }

    #[test]
    fn equal_snapshots_compare_equal() {
        assert_eq!(snapshot(), snapshot());
    }

    #[test]
    fn any_field_difference_breaks_equality() {
        let base = snapshot();

        let mut changed = snapshot();
        changed.target = Url::parse("http://moved.tail.net:9191/base").unwrap();
        assert_ne!(base, changed);

        let mut changed = snapshot();
        changed.auth_token = "token-b".into();
        assert_ne!(base, changed);

        let mut changed = snapshot();
        changed.overlay_client_id = "client-b".into();
        assert_ne!(base, changed);

        let mut changed = snapshot();
        changed.overlay_client_secret = "secret-b".into();
        assert_ne!(base, changed);
    }

    #[test]
    fn credential_change_detection_ignores_target_and_token() {
        let base = snapshot();

        let mut changed = snapshot();
        changed.auth_token = "token-b".into();
        changed.target = Url::parse("http://moved.tail.net/base").unwrap();
        assert!(!base.overlay_credentials_changed(&changed));

        let mut changed = snapshot();
        changed.overlay_client_secret = "secret-b".into();
        assert!(base.overlay_credentials_changed(&changed));
    }

    #[test]
    fn debug_output_redacts_secrets() {
        let rendered = format!("{:?}", snapshot());
        assert!(!rendered.contains("token-a"));
        assert!(!rendered.contains("secret-a"));
        assert!(rendered.contains("client-a"));
    }
}
