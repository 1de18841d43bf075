//! Static settings schema.
//!
//! Everything here is fixed for the lifetime of the process: loaded once at
//! startup from a TOML file plus a handful of environment overrides, then
//! passed by reference into the components that need it. Dynamic values
//! (target, tokens, overlay credentials) live in
//! [`ConfigSnapshot`](crate::config::snapshot::ConfigSnapshot) instead and
//! are refreshed by the reload loop.

use std::env;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::validation::validate_settings;
use crate::config::ConfigError;

/// Root static configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct Settings {
    /// Listener and shutdown settings.
    pub server: ServerSettings,

    /// Remote configuration agent coordinates.
    pub agent: AgentSettings,

    /// Overlay network control plane and local daemon.
    pub overlay: OverlaySettings,

    /// Proxy mount point and credential-injection rules.
    pub proxy: ProxySettings,

    /// Tenant validation settings.
    pub tenant: TenantSettings,

    /// Reload loop cadence.
    pub reload: ReloadSettings,

    /// Metrics exposition.
    pub observability: ObservabilitySettings,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Bind address (e.g., "0.0.0.0:8080"). The `PORT` environment variable
    /// overrides the port component.
    pub bind_address: String,

    /// Hard deadline for graceful shutdown, kept just under the platform's
    /// termination grace period.
    pub shutdown_grace_secs: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            shutdown_grace_secs: 25,
        }
    }
}

/// Coordinates of the configuration agent that serves named profiles.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AgentSettings {
    /// Base URL of the agent.
    pub base_url: String,

    /// Application name in the agent's namespace.
    pub application: String,

    /// Environment name in the agent's namespace.
    pub environment: String,

    /// Bearer token for agent requests. Overridden by `CONFIG_AGENT_TOKEN`.
    pub access_token: String,

    /// Names of the profiles resolved on every reload.
    pub profiles: ProfileNames,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:2772".to_string(),
            application: "tailgate".to_string(),
            environment: "production".to_string(),
            access_token: String::new(),
            profiles: ProfileNames::default(),
        }
    }
}

/// Named configuration profiles fetched from the agent.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProfileNames {
    /// String profile holding the backend's overlay URL.
    pub target_uri: String,

    /// String profile holding the web-services auth token.
    pub auth_token: String,

    /// JSON profile holding the overlay OAuth client pair.
    pub overlay_oauth_client: String,
}

impl Default for ProfileNames {
    fn default() -> Self {
        Self {
            target_uri: "server-overlay-uri".to_string(),
            auth_token: "server-auth-token".to_string(),
            overlay_oauth_client: "overlay-oauth-client".to_string(),
        }
    }
}

/// Overlay network settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OverlaySettings {
    /// Control plane base URL (token exchange, join-key mint).
    pub control_url: String,

    /// Local overlay daemon base URL (node join/leave).
    pub daemon_url: String,

    /// Stable hostname for this gateway's overlay node.
    pub hostname: String,

    /// Private working directory for overlay node state.
    pub state_dir: String,

    /// ACL tag stamped onto minted join keys.
    pub tag: String,
}

impl Default for OverlaySettings {
    fn default() -> Self {
        Self {
            control_url: "https://overlay.example.com".to_string(),
            daemon_url: "http://localhost:4580".to_string(),
            hostname: "tailgate".to_string(),
            state_dir: "/var/lib/tailgate".to_string(),
            tag: "tag:tailgate".to_string(),
        }
    }
}

/// Proxy mount point and injection rules.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProxySettings {
    /// Path prefix the proxy is mounted under. Stripped before forwarding.
    pub prefix: String,

    /// Backend web-services endpoint path that qualifies for injection.
    pub web_services_path: String,

    /// Inbound header whose truthy value requests auth-token injection.
    pub trigger_header: String,
}

impl Default for ProxySettings {
    fn default() -> Self {
        Self {
            prefix: "/proxy".to_string(),
            web_services_path: "/rpc/api/xmlrpc".to_string(),
            trigger_header: "X-Gateway-Inject-Auth-Token".to_string(),
        }
    }
}

/// Tenant validation settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TenantSettings {
    /// Tenant identifier. Overridden by `TENANT_ID`.
    pub tenant_id: String,

    /// Expected forwarded-host template; `{{tenant_id}}` is substituted.
    pub domain_template: String,

    /// Header carrying the shared router secret.
    pub secret_header: String,

    /// Expected router secret. Overridden by `ROUTER_SECRET`.
    pub secret: String,
}

impl Default for TenantSettings {
    fn default() -> Self {
        Self {
            tenant_id: String::new(),
            domain_template: "{{tenant_id}}.api.example.com".to_string(),
            secret_header: "X-Router-Secret".to_string(),
            secret: String::new(),
        }
    }
}

/// Reload loop cadence.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ReloadSettings {
    /// Interval between reload ticks in seconds.
    pub interval_secs: u64,

    /// Timeout applied to a single reload tick in seconds.
    pub tick_timeout_secs: u64,
}

impl Default for ReloadSettings {
    fn default() -> Self {
        Self {
            interval_secs: 60,
            tick_timeout_secs: 30,
        }
    }
}

/// Metrics exposition settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilitySettings {
    /// Enable the Prometheus metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilitySettings {
    fn default() -> Self {
        Self {
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

impl Settings {
    /// Load settings from a TOML file, apply environment overrides, and
    /// validate.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let settings: Settings = toml::from_str(&content)?;
        settings.finalize()
    }

    /// Build settings from defaults plus environment overrides, for
    /// deployments that configure everything through the environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Settings::default().finalize()
    }

    fn finalize(mut self) -> Result<Self, ConfigError> {
        if let Ok(port) = env::var("PORT") {
            let port: u16 = port
                .parse()
                .map_err(|_| ConfigError::Validation(format!("invalid PORT value: {port}")))?;
            let host = self
                .server
                .bind_address
                .rsplit_once(':')
                .map(|(host, _)| host.to_string())
                .unwrap_or_else(|| self.server.bind_address.clone());
            self.server.bind_address = format!("{host}:{port}");
        }
        if let Ok(token) = env::var("CONFIG_AGENT_TOKEN") {
            self.agent.access_token = token;
        }
        if let Ok(tenant_id) = env::var("TENANT_ID") {
            self.tenant.tenant_id = tenant_id;
        }
        if let Ok(secret) = env::var("ROUTER_SECRET") {
            self.tenant.secret = secret;
        }

        validate_settings(&self).map_err(|errors| {
            let joined = errors
                .iter()
                .map(|e| e.to_string())
                .collect::<Vec<_>>()
                .join(", ");
            ConfigError::Validation(joined)
        })?;

        Ok(self)
    }

    /// The forwarded-host value required by the tenant validator.
    pub fn expected_forwarded_host(&self) -> String {
        self.tenant
            .domain_template
            .replace("{{tenant_id}}", &self.tenant.tenant_id)
    }
}
