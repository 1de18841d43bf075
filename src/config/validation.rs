//! Semantic validation of static settings.
//!
//! Serde handles the syntactic layer; this module checks the values make
//! sense together. All failures are collected and reported at once rather
//! than stopping at the first.

use std::fmt;

use crate::config::schema::Settings;

/// A single validation failure.
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate settings after deserialization and environment overrides.
pub fn validate_settings(settings: &Settings) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let mut require = |field: &'static str, ok: bool, message: &str| {
        if !ok {
            errors.push(ValidationError {
                field,
                message: message.to_string(),
            });
        }
    };

    require(
        "agent.application",
        !settings.agent.application.is_empty(),
        "must not be empty",
    );
    require(
        "agent.environment",
        !settings.agent.environment.is_empty(),
        "must not be empty",
    );
    require(
        "agent.profiles.target_uri",
        !settings.agent.profiles.target_uri.is_empty(),
        "must not be empty",
    );
    require(
        "agent.profiles.auth_token",
        !settings.agent.profiles.auth_token.is_empty(),
        "must not be empty",
    );
    require(
        "agent.profiles.overlay_oauth_client",
        !settings.agent.profiles.overlay_oauth_client.is_empty(),
        "must not be empty",
    );
    require(
        "proxy.prefix",
        settings.proxy.prefix.starts_with('/') && settings.proxy.prefix.len() > 1,
        "must start with '/' and not be the root path",
    );
    require(
        "proxy.web_services_path",
        settings.proxy.web_services_path.starts_with('/'),
        "must start with '/'",
    );
    require(
        "proxy.trigger_header",
        !settings.proxy.trigger_header.is_empty(),
        "must not be empty",
    );
    require(
        "tenant.domain_template",
        settings.tenant.domain_template.contains("{{tenant_id}}"),
        "must contain the {{tenant_id}} placeholder",
    );
    require(
        "reload.interval_secs",
        settings.reload.interval_secs > 0,
        "must be greater than zero",
    );
    require(
        "reload.tick_timeout_secs",
        settings.reload.tick_timeout_secs > 0,
        "must be greater than zero",
    );
    require(
        "server.shutdown_grace_secs",
        settings.server.shutdown_grace_secs > 0,
        "must be greater than zero",
    );

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
