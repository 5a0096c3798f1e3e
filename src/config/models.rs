//! Configuration data structures for Zentro.
//!
//! These types map directly to JSON (also YAML / TOML) configuration files. They are
//! serde-friendly and carry defaults so that minimal configs remain concise. A route's
//! filter settings are kept untyped here; each filter reads its own typed settings when
//! the route set is turned into an executable snapshot.
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Cooldown applied to an unhealthy upstream when none is configured (seconds).
pub const DEFAULT_HEALTH_COOLDOWN_SECS: u64 = 5;
/// Failures before an upstream is marked unhealthy when none is configured.
pub const DEFAULT_HEALTH_FAILURES: u32 = 3;
/// Upstream request timeout when none is configured (seconds).
pub const DEFAULT_UPSTREAM_TIMEOUT_SECS: u64 = 30;

fn default_listen_addr() -> String {
    "0.0.0.0:8787".to_string()
}

fn default_upstream_timeout_secs() -> u64 {
    DEFAULT_UPSTREAM_TIMEOUT_SECS
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Root configuration document.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GatewayConfig {
    /// Address the gateway listens on (e.g. "0.0.0.0:8787")
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Gateway-wide defaults (upstream health, timeouts)
    #[serde(default)]
    pub config: DefaultsConfig,

    /// Descriptive and gateway-wide settings
    #[serde(default)]
    pub settings: GlobalSettings,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Ordered route catalog; the first matching route wins
    #[serde(default)]
    pub routes: Vec<RouteConfig>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            config: DefaultsConfig::default(),
            settings: GlobalSettings::default(),
            logging: LoggingConfig::default(),
            routes: Vec::new(),
        }
    }
}

impl GatewayConfig {
    /// A small but complete configuration, used by `zentro init`.
    pub fn example() -> Self {
        Self {
            routes: vec![
                RouteConfig::new("users", "/api/users")
                    .with_upstreams(["http://127.0.0.1:9001", "http://127.0.0.1:9002"])
                    .with_methods(["GET", "POST"])
                    .with_filter(FilterSpec::new("StripPrefix").with_setting("prefix", "/api"))
                    .with_filter(
                        FilterSpec::new("AddHeader")
                            .with_setting("type", "response")
                            .with_setting("headers", serde_json::json!({"X-Served-By": "zentro"})),
                    ),
                RouteConfig::new("legacy", "/old").with_filter(
                    FilterSpec::new("RedirectTo")
                        .with_setting("url", "/api/users")
                        .with_setting("status_code", 301),
                ),
            ],
            ..Self::default()
        }
    }
}

/// Defaults shared by every route unless a route overrides them.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DefaultsConfig {
    #[serde(default)]
    pub health: HealthConfig,

    /// Upstream request timeout in seconds (0 means the default)
    #[serde(default = "default_upstream_timeout_secs")]
    pub upstream_timeout_secs: u64,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            health: HealthConfig::default(),
            upstream_timeout_secs: DEFAULT_UPSTREAM_TIMEOUT_SECS,
        }
    }
}

/// Passive health policy for a route's upstreams.
///
/// A zero value in either field stands for "use the default".
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
pub struct HealthConfig {
    /// Seconds an unhealthy upstream waits before a probe request is allowed
    #[serde(default)]
    pub cooldown: u64,
    /// Proxy failures that mark a healthy upstream unhealthy
    #[serde(default)]
    pub failures: u32,
}

impl HealthConfig {
    /// Replace zero fields with the gateway defaults. Idempotent.
    pub fn with_defaults(self) -> Self {
        Self {
            cooldown: if self.cooldown == 0 {
                DEFAULT_HEALTH_COOLDOWN_SECS
            } else {
                self.cooldown
            },
            failures: if self.failures == 0 {
                DEFAULT_HEALTH_FAILURES
            } else {
                self.failures
            },
        }
    }
}

/// Gateway-wide descriptive settings.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct GlobalSettings {
    pub name: String,
    pub environment: String,
    pub admin_email: String,
    /// Advertised requests-per-second budget; informational, not enforced
    pub global_rate_limiting: u32,
    /// Informational flag carried for the admin surface; CORS itself is a per-route filter
    pub cors: bool,
}

impl Default for GlobalSettings {
    fn default() -> Self {
        Self {
            name: "Zentro gateway".to_string(),
            environment: "Development".to_string(),
            admin_email: "dev@localhost".to_string(),
            global_rate_limiting: 10_000,
            cors: true,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LoggingConfig {
    /// Filter directive, e.g. "info" or "zentro=debug,info"
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

/// A declarative route: matching predicates, upstream pool and filter chain.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct RouteConfig {
    /// Unique id; assigned by the loader when absent
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// Request path must start with this prefix (empty matches everything)
    #[serde(default)]
    pub path_prefix: String,
    /// Allowed methods, compared case-sensitively (empty allows any method)
    #[serde(default)]
    pub methods: Vec<String>,
    /// Headers that must be present with exactly these values
    #[serde(default)]
    pub headers: HashMap<String, String>,
    /// Query parameters that must be present with exactly these values
    #[serde(default)]
    pub query_params: HashMap<String, String>,
    /// Exact host to match (empty matches any host)
    #[serde(default)]
    pub host: String,
    /// Upstream base URLs, in round-robin order
    #[serde(default)]
    pub upstreams: Vec<String>,
    /// Absent means enabled
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub auth: AuthConfig,
    /// Filters in execution order
    #[serde(default)]
    pub filters: Vec<FilterSpec>,
    /// Per-route override of the gateway health defaults
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health: Option<HealthConfig>,
}

impl RouteConfig {
    pub fn new(name: impl Into<String>, path_prefix: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path_prefix: path_prefix.into(),
            ..Self::default()
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.unwrap_or(true)
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_upstreams<I, S>(mut self, upstreams: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.upstreams = upstreams.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_methods<I, S>(mut self, methods: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.methods = methods.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_query_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query_params.insert(name.into(), value.into());
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = Some(enabled);
        self
    }

    pub fn with_auth(mut self, auth: AuthConfig) -> Self {
        self.auth = auth;
        self
    }

    pub fn with_filter(mut self, filter: FilterSpec) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn with_health(mut self, health: HealthConfig) -> Self {
        self.health = Some(health);
        self
    }
}

/// Route-level authentication; when enabled an `Auth` filter runs before every other filter.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct AuthConfig {
    #[serde(default)]
    pub enabled: bool,
    /// One of "bearer", "basic", "api-key"
    #[serde(default, rename = "type")]
    pub auth_type: String,
    /// Header carrying the credential (defaults to Authorization)
    #[serde(default)]
    pub header: String,
}

/// Untyped filter declaration as it appears in the route catalog.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct FilterSpec {
    pub name: String,
    #[serde(default)]
    pub settings: serde_json::Map<String, serde_json::Value>,
}

impl FilterSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            settings: serde_json::Map::new(),
        }
    }

    pub fn with_setting(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.settings.insert(key.to_string(), value.into());
        self
    }
}
